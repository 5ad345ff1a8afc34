//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效表：每个变更在成功后需要失效哪些缓存键前缀。
//! 失效边在构建时静态声明，不从响应内容动态推导。

use crate::config::InvalidationOverride;
use crate::error::{Result, SyncError};
use crate::key::{CacheKey, KeyPattern, ParamValue};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

lazy_static! {
    static ref NAMESPACE_PATTERN: Regex = Regex::new(r"^[a-z][a-z0-9-]*$").unwrap();
}

/// 失效目标
///
/// 失效边是静态的；`Key` 目标的参数在执行时从变更输入中绑定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    /// 整个命名空间
    Namespace(String),
    /// 单个键，`bindings` 为 (键参数名, 输入字段名)
    Key {
        resource: String,
        bindings: Vec<(String, String)>,
    },
}

impl InvalidationTarget {
    /// 命名空间目标
    pub fn namespace(name: impl Into<String>) -> Self {
        InvalidationTarget::Namespace(name.into())
    }

    /// 单键目标，键参数 `param` 取自输入字段 `field`
    pub fn key(resource: impl Into<String>, param: impl Into<String>, field: impl Into<String>) -> Self {
        InvalidationTarget::Key {
            resource: resource.into(),
            bindings: vec![(param.into(), field.into())],
        }
    }

    /// 目标所属的命名空间
    pub fn resource(&self) -> &str {
        match self {
            InvalidationTarget::Namespace(name) => name,
            InvalidationTarget::Key { resource, .. } => resource,
        }
    }

    /// 根据变更输入解析为具体的匹配模式
    ///
    /// 输入缺少绑定字段（或字段不是基本类型）时放宽为整个命名空间，
    /// 保证不会漏掉应失效的条目
    pub fn resolve(&self, input: &Value) -> KeyPattern {
        match self {
            InvalidationTarget::Namespace(name) => KeyPattern::Namespace(name.clone()),
            InvalidationTarget::Key { resource, bindings } => {
                let mut key = CacheKey::new(resource.clone());
                for (param, field) in bindings {
                    match input.get(field).map(ParamValue::from_json) {
                        Some(Ok(value)) if value != ParamValue::Null => {
                            key.params.insert(param.clone(), value);
                        }
                        _ => {
                            warn!(
                                "Input field '{}' missing for {}, widening to namespace",
                                field, resource
                            );
                            return KeyPattern::Namespace(resource.clone());
                        }
                    }
                }
                KeyPattern::Exact(key)
            }
        }
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationTarget::Namespace(name) => write!(f, "{}", name),
            InvalidationTarget::Key { resource, bindings } => {
                write!(f, "{}{{", resource)?;
                for (i, (param, field)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}<-{}", param, field)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// 失效表
///
/// 变更名称 → 有序的失效目标列表，外加已知命名空间集合
#[derive(Debug, Clone, Default)]
pub struct InvalidationMap {
    namespaces: BTreeSet<String>,
    edges: BTreeMap<String, Vec<InvalidationTarget>>,
}

impl InvalidationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命名空间
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.insert(namespace.into());
        self
    }

    /// 声明一个变更的失效目标
    ///
    /// 重复声明同一变更会返回配置错误
    pub fn declare(
        &mut self,
        mutation: impl Into<String>,
        targets: Vec<InvalidationTarget>,
    ) -> Result<()> {
        let mutation = mutation.into();
        if self.edges.contains_key(&mutation) {
            return Err(SyncError::Config(format!(
                "mutation '{}' declared more than once",
                mutation
            )));
        }
        self.edges.insert(mutation, targets);
        Ok(())
    }

    /// 获取变更的失效目标
    pub fn targets(&self, mutation: &str) -> Option<&[InvalidationTarget]> {
        self.edges.get(mutation).map(Vec::as_slice)
    }

    pub fn contains(&self, mutation: &str) -> bool {
        self.edges.contains_key(mutation)
    }

    /// 已知命名空间
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }

    /// 所有失效边 (变更, 目标)
    pub fn edges(&self) -> impl Iterator<Item = (&str, &[InvalidationTarget])> {
        self.edges.iter().map(|(m, t)| (m.as_str(), t.as_slice()))
    }

    /// 会使某命名空间失效的所有变更
    pub fn mutations_affecting(&self, namespace: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, targets)| targets.iter().any(|t| t.resource() == namespace))
            .map(|(m, _)| m.as_str())
            .collect()
    }

    /// 应用配置中的覆盖项
    ///
    /// 覆盖项只能为已声明的变更追加命名空间目标，内置目标始终保留
    pub fn apply_overrides(&mut self, overrides: &[InvalidationOverride]) -> Result<()> {
        for item in overrides {
            let targets = self.edges.get_mut(&item.mutation).ok_or_else(|| {
                SyncError::Config(format!(
                    "invalidation override for unknown mutation '{}'",
                    item.mutation
                ))
            })?;
            for namespace in &item.namespaces {
                let target = InvalidationTarget::Namespace(namespace.clone());
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        Ok(())
    }

    /// 验证引用完整性
    ///
    /// - 命名空间名称合法
    /// - 每个目标引用的命名空间都已注册
    /// - 单键目标至少有一个绑定
    pub fn validate(&self) -> Result<()> {
        for namespace in &self.namespaces {
            if !NAMESPACE_PATTERN.is_match(namespace) {
                return Err(SyncError::Config(format!(
                    "invalid namespace name '{}'",
                    namespace
                )));
            }
        }

        for (mutation, targets) in &self.edges {
            if mutation.trim().is_empty() {
                return Err(SyncError::Config("empty mutation name".to_string()));
            }
            for target in targets {
                if !self.namespaces.contains(target.resource()) {
                    return Err(SyncError::Config(format!(
                        "mutation '{}' invalidates unknown namespace '{}'",
                        mutation,
                        target.resource()
                    )));
                }
                if let InvalidationTarget::Key { bindings, .. } = target {
                    if bindings.is_empty() {
                        return Err(SyncError::Config(format!(
                            "mutation '{}' declares a key target without bindings",
                            mutation
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
