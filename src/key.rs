//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存键：资源名称加上有序的基本类型参数集合。

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// 缓存键参数值
///
/// 只允许基本类型，保证键可以做完全相等比较
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ParamValue {
    /// 从JSON值转换
    ///
    /// 浮点数、数组和对象不被接受
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(ParamValue::Null),
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::Number(n) => n.as_i64().map(ParamValue::Int).ok_or_else(|| {
                SyncError::InvalidKey(format!("non-integer number parameter: {}", n))
            }),
            Value::String(s) => Ok(ParamValue::Str(s.clone())),
            other => Err(SyncError::InvalidKey(format!(
                "non-primitive parameter: {}",
                other
            ))),
        }
    }

    /// 转换为JSON值
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// 缓存键
///
/// 由资源名称（命名空间）和参数集合组成。参数使用 `BTreeMap` 保存，
/// 因此两个键相等当且仅当资源名称相同且参数深度相等，与插入顺序无关。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// 资源名称
    pub resource: String,
    /// 参数集合
    pub params: BTreeMap<String, ParamValue>,
}

impl CacheKey {
    /// 创建不带参数的缓存键
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    /// 追加一个参数
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// 从JSON对象创建缓存键
    ///
    /// # 参数
    ///
    /// * `resource` - 资源名称
    /// * `params` - JSON对象，`null` 视为空参数集合
    ///
    /// # 返回值
    ///
    /// 返回缓存键，参数不是基本类型时返回错误
    pub fn from_json(resource: impl Into<String>, params: &Value) -> Result<Self> {
        let mut key = Self::new(resource);
        match params {
            Value::Null => {}
            Value::Object(map) => {
                for (name, value) in map {
                    key.params
                        .insert(name.clone(), ParamValue::from_json(value)?);
                }
            }
            other => {
                return Err(SyncError::InvalidKey(format!(
                    "parameters must be an object, got {}",
                    other
                )))
            }
        }
        Ok(key)
    }

    /// 将参数集合转换为JSON对象，用于交给网关
    pub fn params_json(&self) -> Value {
        Value::Object(
            self.params
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// 资源名称是否等于给定命名空间
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.resource == namespace
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.resource)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// 缓存键匹配模式
///
/// 精确匹配单个键，或按命名空间（资源名称）前缀匹配该命名空间下的所有键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPattern {
    /// 精确匹配
    Exact(CacheKey),
    /// 命名空间匹配，忽略参数
    Namespace(String),
}

impl KeyPattern {
    /// 判断键是否匹配
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::Namespace(namespace) => key.in_namespace(namespace),
        }
    }

    /// 模式所属的命名空间
    pub fn namespace(&self) -> &str {
        match self {
            KeyPattern::Exact(key) => &key.resource,
            KeyPattern::Namespace(namespace) => namespace,
        }
    }
}

impl From<CacheKey> for KeyPattern {
    fn from(key: CacheKey) -> Self {
        KeyPattern::Exact(key)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Exact(key) => write!(f, "{}", key),
            KeyPattern::Namespace(namespace) => write!(f, "{}{{*}}", namespace),
        }
    }
}
