//! 资源标识
//!
//! 资源是一次受保护的操作或代码路径，以名称加流量方向唯一标识。
//! 参数值（ParamValue）是热点参数限流的计数键，要求可哈希且相等性稳定。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 流量方向
///
/// 出站由调用端触发，入站由服务端触发。方向参与资源标识的相等性比较。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficDirection {
    /// 入站流量（服务端视角）
    In,
    /// 出站流量（调用端视角）
    Out,
}

impl TrafficDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficDirection::In => "in",
            TrafficDirection::Out => "out",
        }
    }
}

impl Default for TrafficDirection {
    fn default() -> Self {
        TrafficDirection::Out
    }
}

/// 资源标识
///
/// 相等性由名称与方向共同决定；同名不同方向视为两个资源。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    /// 资源名
    pub name: String,
    /// 流量方向
    pub direction: TrafficDirection,
}

impl ResourceIdentity {
    pub fn new(name: impl Into<String>, direction: TrafficDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    /// 出站资源（默认方向）
    pub fn outbound(name: impl Into<String>) -> Self {
        Self::new(name, TrafficDirection::Out)
    }

    /// 入站资源
    pub fn inbound(name: impl Into<String>) -> Self {
        Self::new(name, TrafficDirection::In)
    }

    /// 带方向后缀的键名
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.direction.as_str())
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.direction.as_str())
    }
}

/// 参数值
///
/// 热点参数限流按调用参数的具体取值计数。取值必须可哈希，因此不接受
/// 浮点数。整数统一归一化：能放入i64的值一律存为I64，保证同一数值经
/// 不同整型进入时相等性一致。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// 布尔
    Bool(bool),
    /// 有符号整数
    I64(i64),
    /// 大于i64::MAX的无符号整数
    U64(u64),
    /// 字符串
    String(String),
}

impl ParamValue {
    /// 归一化的无符号整数入口
    pub fn from_u64(value: u64) -> Self {
        if value <= i64::MAX as u64 {
            ParamValue::I64(value as i64)
        } else {
            ParamValue::U64(value)
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::I64(v) => write!(f, "{}", v),
            ParamValue::U64(v) => write!(f, "{}", v),
            ParamValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::I64(value as i64)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::I64(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::I64(value as i64)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::from_u64(value)
    }
}
