//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了变更目录：已知命名空间、所有变更描述以及由它们推导出的失效表。
//! 运维控制台的完整失效边在 `Catalog::console` 中声明。

use crate::config::InvalidationOverride;
use crate::error::{Result, SyncError};
use crate::gateway::Operation;
use crate::invalidation::{InvalidationMap, InvalidationTarget};
use crate::key::CacheKey;
use crate::mutation::MutationDescriptor;
use std::collections::BTreeMap;
use tracing::info;

/// 控制台读取使用的命名空间
pub const CONSOLE_NAMESPACES: &[&str] = &[
    "tickets",
    "ticket",
    "campaigns",
    "campaign",
    "feedback",
    "crm-alerts",
    "subscriptions",
    "subscription",
    "departments",
];

/// 变更目录
///
/// 变更描述和失效表始终保持一致：覆盖项先写入失效表，再同步回描述
#[derive(Debug, Clone)]
pub struct Catalog {
    map: InvalidationMap,
    descriptors: BTreeMap<String, MutationDescriptor>,
}

impl Catalog {
    /// 由命名空间和变更描述构建目录
    ///
    /// 重复的变更名称返回配置错误。构建后需调用 `validate`。
    pub fn new<'a>(
        namespaces: impl IntoIterator<Item = &'a str>,
        descriptors: Vec<MutationDescriptor>,
    ) -> Result<Self> {
        let mut map = namespaces
            .into_iter()
            .fold(InvalidationMap::new(), |map, ns| map.with_namespace(ns));
        let mut registry = BTreeMap::new();

        for descriptor in descriptors {
            map.declare(descriptor.name.clone(), descriptor.invalidates.clone())?;
            registry.insert(descriptor.name.clone(), descriptor);
        }

        Ok(Self {
            map,
            descriptors: registry,
        })
    }

    /// 运维控制台的目录
    pub fn console() -> Result<Self> {
        Self::new(CONSOLE_NAMESPACES.iter().copied(), console_descriptors())
    }

    /// 应用配置覆盖项
    ///
    /// 覆盖项追加的目标同步到对应描述
    pub fn apply_overrides(&mut self, overrides: &[InvalidationOverride]) -> Result<()> {
        if overrides.is_empty() {
            return Ok(());
        }
        self.map.apply_overrides(overrides)?;
        for item in overrides {
            if let (Some(descriptor), Some(targets)) = (
                self.descriptors.get_mut(&item.mutation),
                self.map.targets(&item.mutation),
            ) {
                descriptor.invalidates = targets.to_vec();
                info!(
                    "Invalidation override applied to {}: {:?}",
                    item.mutation, item.namespaces
                );
            }
        }
        Ok(())
    }

    /// 验证目录
    ///
    /// 在失效表自身校验之外，确认每个描述在表中都有对应条目
    pub fn validate(&self) -> Result<()> {
        self.map.validate()?;
        for (name, descriptor) in &self.descriptors {
            match self.map.targets(name) {
                Some(targets) if targets == descriptor.invalidates.as_slice() => {}
                Some(_) => {
                    return Err(SyncError::Config(format!(
                        "mutation '{}' disagrees with the invalidation map",
                        name
                    )))
                }
                None => {
                    return Err(SyncError::Config(format!(
                        "mutation '{}' has no invalidation entry",
                        name
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn map(&self) -> &InvalidationMap {
        &self.map
    }

    pub fn descriptor(&self, name: &str) -> Option<&MutationDescriptor> {
        self.descriptors.get(name)
    }

    /// 所有变更描述，按名称排序
    pub fn descriptors(&self) -> impl Iterator<Item = &MutationDescriptor> {
        self.descriptors.values()
    }
}

fn action(name: &str) -> Operation {
    Operation::Action(name.to_string())
}

fn ns(name: &str) -> InvalidationTarget {
    InvalidationTarget::namespace(name)
}

fn by_id(resource: &str) -> InvalidationTarget {
    InvalidationTarget::key(resource, "id", "id")
}

/// 控制台的全部变更
fn console_descriptors() -> Vec<MutationDescriptor> {
    vec![
        // tickets
        MutationDescriptor::new("tickets.create", "tickets", Operation::Create)
            .invalidates(vec![ns("tickets")])
            .on_success("Ticket created"),
        MutationDescriptor::new("tickets.update", "tickets", Operation::Update)
            .invalidates(vec![ns("tickets"), by_id("ticket")])
            .on_success("Ticket updated"),
        MutationDescriptor::new("tickets.delete", "tickets", Operation::Delete)
            .invalidates(vec![ns("tickets"), by_id("ticket")])
            .on_success("Ticket deleted"),
        MutationDescriptor::new("tickets.assign", "tickets", action("assign"))
            .invalidates(vec![ns("tickets"), by_id("ticket")])
            .on_success("Ticket assigned"),
        MutationDescriptor::new("tickets.addComment", "ticket-comments", Operation::Create)
            .invalidates(vec![InvalidationTarget::key("ticket", "id", "ticketId")])
            .on_success("Comment added"),
        // campaigns
        MutationDescriptor::new("campaigns.create", "campaigns", Operation::Create)
            .invalidates(vec![ns("campaigns")])
            .on_success("Campaign created"),
        MutationDescriptor::new("campaigns.update", "campaigns", Operation::Update)
            .invalidates(vec![ns("campaigns"), by_id("campaign")])
            .on_success("Campaign updated"),
        MutationDescriptor::new("campaigns.delete", "campaigns", Operation::Delete)
            .invalidates(vec![ns("campaigns"), by_id("campaign")])
            .on_success("Campaign deleted"),
        MutationDescriptor::new("campaigns.launch", "campaigns", action("launch"))
            .invalidates(vec![ns("campaigns"), by_id("campaign")])
            .on_success("Campaign launched"),
        // feedback
        MutationDescriptor::new("feedback.create", "feedback", Operation::Create)
            .invalidates(vec![ns("feedback"), ns("crm-alerts"), ns("tickets")])
            .on_success("Feedback submitted"),
        MutationDescriptor::new("feedback.updateStatus", "feedback", action("status"))
            .invalidates(vec![ns("feedback")])
            .on_success("Feedback status updated"),
        // crm alerts
        MutationDescriptor::new("crmAlerts.acknowledge", "crm-alerts", action("acknowledge"))
            .invalidates(vec![ns("crm-alerts")])
            .on_success("Alert acknowledged"),
        MutationDescriptor::new("crmAlerts.resolve", "crm-alerts", action("resolve"))
            .invalidates(vec![ns("crm-alerts"), ns("tickets")])
            .on_success("Alert resolved"),
        // subscriptions
        MutationDescriptor::new("subscriptions.create", "subscriptions", Operation::Create)
            .invalidates(vec![ns("subscriptions")])
            .on_success("Subscription created"),
        MutationDescriptor::new("subscriptions.cancel", "subscriptions", action("cancel"))
            .invalidates(vec![ns("subscriptions"), by_id("subscription")])
            .on_success("Subscription cancelled"),
        MutationDescriptor::new("subscriptions.renew", "subscriptions", action("renew"))
            .invalidates(vec![ns("subscriptions"), by_id("subscription")])
            .on_success("Subscription renewed"),
        // no cached reads depend on these
        MutationDescriptor::new("uploads.delete", "uploads", Operation::Delete)
            .on_success("File deleted"),
        MutationDescriptor::new("reports.downloadPdf", "reports", action("pdf"))
            .on_success("Report downloaded")
            .on_failure("Could not download the report. Please try again."),
    ]
}

/// 控制台读取使用的缓存键
pub mod keys {
    use super::*;

    /// 工单列表
    pub fn tickets(filters: &serde_json::Value) -> Result<CacheKey> {
        CacheKey::from_json("tickets", filters)
    }

    /// 工单详情
    pub fn ticket(id: &str) -> CacheKey {
        CacheKey::new("ticket").with("id", id)
    }

    /// 活动列表
    pub fn campaigns(filters: &serde_json::Value) -> Result<CacheKey> {
        CacheKey::from_json("campaigns", filters)
    }

    /// 活动详情
    pub fn campaign(id: &str) -> CacheKey {
        CacheKey::new("campaign").with("id", id)
    }

    /// 订阅详情
    pub fn subscription(id: &str) -> CacheKey {
        CacheKey::new("subscription").with("id", id)
    }

    /// 部门列表
    pub fn departments(include_inactive: bool) -> CacheKey {
        CacheKey::new("departments").with("includeInactive", include_inactive)
    }
}
