//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。规则拒绝（BlockError）是高频、预期内的
//! 结果，不代表程序缺陷；使用错误（Usage）代表调用方违反了进入/退出约定。

use thiserror::Error;

/// Admitron 错误类型
#[derive(Error, Debug)]
pub enum AdmitronError {
    /// 请求被规则拒绝
    #[error("{0}")]
    Blocked(#[from] BlockError),

    /// 使用错误（重复退出、退出顺序错误、上下文误用）
    #[error("使用错误: {0}")]
    Usage(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AdmitronError {
    /// 是否为规则拒绝（可降级处理，而非程序错误）
    pub fn is_blocked(&self) -> bool {
        matches!(self, AdmitronError::Blocked(_))
    }

    /// 取出拒绝详情
    pub fn as_block(&self) -> Option<&BlockError> {
        match self {
            AdmitronError::Blocked(block) => Some(block),
            _ => None,
        }
    }
}

/// 拒绝原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BlockReason {
    /// 流量控制拒绝（QPS超限）
    FlowControl,
    /// 熔断降级拒绝（熔断器打开）
    Degrade,
    /// 热点参数拒绝（参数值令牌耗尽）
    ParamFlow,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BlockReason::FlowControl => "流量控制",
            BlockReason::Degrade => "熔断降级",
            BlockReason::ParamFlow => "热点参数",
        };
        write!(f, "{}", label)
    }
}

/// 拒绝详情
///
/// 由规则检查器产生，携带资源名、拒绝分类和说明。
#[derive(Error, Debug, Clone, PartialEq)]
#[error("资源 {resource} 被{reason}拒绝: {message}")]
pub struct BlockError {
    /// 被拒绝的资源名
    pub resource: String,
    /// 拒绝分类
    pub reason: BlockReason,
    /// 说明信息
    pub message: String,
}

impl BlockError {
    pub fn new(
        resource: impl Into<String>,
        reason: BlockReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            reason,
            message: message.into(),
        }
    }

    /// 流量控制拒绝
    pub fn flow(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(resource, BlockReason::FlowControl, message)
    }

    /// 熔断降级拒绝
    pub fn degrade(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(resource, BlockReason::Degrade, message)
    }

    /// 热点参数拒绝
    pub fn param_flow(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(resource, BlockReason::ParamFlow, message)
    }
}

/// 受保护调用的完成结果
///
/// 退出Entry时上报，驱动成功/异常计数与熔断统计。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 成功完成
    Success,
    /// 业务异常
    Error,
}
