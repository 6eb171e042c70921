//! 流量控制
//!
//! 按QPS对资源做准入控制：统计窗口内已放行的调用数加上本次请求量不得
//! 超过阈值（非1秒窗口按窗口长度折算容量）。阈值之外没有突发余量，突发
//! 语义属于热点参数流控。
//!
//! 规则默认作用于资源的全量统计；`limit_origin` 指定调用方时只核算该
//! 调用方的分来源计数，其他来源不受此条规则约束。

use crate::constants::{DEFAULT_FLOW_WINDOW_MS, MS_PER_SECOND, RULE_ORIGIN_DEFAULT};
use crate::error::{AdmitronError, BlockError};
use crate::node::ClusterNode;
use crate::sliding_window::MetricEvent;
use ahash::AHashMap;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

lazy_static! {
    static ref FLOW_RULES: RwLock<Arc<AHashMap<String, Vec<Arc<FlowRule>>>>> =
        RwLock::new(Arc::new(AHashMap::new()));
}

/// 流控规则
///
/// # 参数
/// - `resource`: 资源名
/// - `threshold`: 每秒放行量，按 `window_ms` 折算为窗口容量
/// - `limit_origin`: 约束的调用方，`default` 表示全量统计
/// - `window_ms`: 统计窗口长度（毫秒），上限一分钟
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRule {
    pub resource: String,
    pub threshold: f64,
    #[serde(default = "default_limit_origin")]
    pub limit_origin: String,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_limit_origin() -> String {
    RULE_ORIGIN_DEFAULT.to_string()
}

fn default_window_ms() -> u64 {
    DEFAULT_FLOW_WINDOW_MS
}

impl FlowRule {
    pub fn new(resource: impl Into<String>, threshold: f64) -> Self {
        Self {
            resource: resource.into(),
            threshold,
            limit_origin: default_limit_origin(),
            window_ms: DEFAULT_FLOW_WINDOW_MS,
        }
    }

    pub fn with_limit_origin(mut self, origin: impl Into<String>) -> Self {
        self.limit_origin = origin.into();
        self
    }

    pub fn with_window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    /// 校验规则
    pub fn validate(&self) -> Result<(), String> {
        if self.resource.is_empty() {
            return Err("resource 不能为空".to_string());
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err("threshold 必须为非负有限值".to_string());
        }
        if self.limit_origin.is_empty() {
            return Err("limit_origin 不能为空".to_string());
        }
        if self.window_ms == 0 || self.window_ms > 60 * MS_PER_SECOND {
            return Err("window_ms 必须在1毫秒到1分钟之间".to_string());
        }
        Ok(())
    }

    /// 窗口容量（阈值按窗口长度折算）
    fn capacity(&self) -> f64 {
        self.threshold * (self.window_ms as f64 / MS_PER_SECOND as f64)
    }
}

/// 原子加载流控规则集，整体替换现有规则
///
/// 任一规则非法则整批拒绝，现有规则集不变。
///
/// # 返回
/// - `Ok(())`: 已替换
/// - `Err(AdmitronError::Config)`: 存在非法规则
pub fn load_flow_rules(rules: Vec<FlowRule>) -> Result<(), AdmitronError> {
    for rule in &rules {
        rule.validate()
            .map_err(|e| AdmitronError::Config(format!("流控规则非法: {}", e)))?;
    }

    let mut map: AHashMap<String, Vec<Arc<FlowRule>>> = AHashMap::new();
    for rule in rules {
        map.entry(rule.resource.clone())
            .or_default()
            .push(Arc::new(rule));
    }

    let total: usize = map.values().map(Vec::len).sum();
    *FLOW_RULES.write() = Arc::new(map);
    info!("流控规则已加载: {} 条", total);
    Ok(())
}

/// 查询资源的流控规则
pub fn flow_rules_for(resource: &str) -> Vec<Arc<FlowRule>> {
    FLOW_RULES.read().get(resource).cloned().unwrap_or_default()
}

/// 流控检查
///
/// 逐条规则检查：窗口内已放行量加本次请求量超过折算容量即拒绝。
/// `limit_origin` 指定调用方的规则只在来源匹配时核算对应分来源计数。
pub(crate) fn check(
    resource: &str,
    cluster: &ClusterNode,
    origin: &str,
    batch_count: u64,
    now_ms: u64,
) -> Result<(), BlockError> {
    let rules = {
        let guard = FLOW_RULES.read();
        match guard.get(resource) {
            Some(rules) => rules.clone(),
            None => return Ok(()),
        }
    };

    for rule in &rules {
        let origin_stats;
        let stats = if rule.limit_origin == RULE_ORIGIN_DEFAULT {
            cluster.stats()
        } else if rule.limit_origin == origin {
            origin_stats = cluster.origin_stats(origin);
            origin_stats.as_ref()
        } else {
            continue;
        };

        let passed = stats.window_sum(MetricEvent::Pass, rule.window_ms, now_ms);
        let wanted = passed.saturating_add(batch_count) as f64;
        if wanted > rule.capacity() {
            debug!(
                resource,
                passed,
                threshold = rule.threshold,
                window_ms = rule.window_ms,
                "流控拒绝"
            );
            return Err(BlockError::flow(
                resource,
                format!(
                    "窗口内已放行 {} 次, 本次 {} 次超过阈值 {}",
                    passed, batch_count, rule.threshold
                ),
            ));
        }
    }
    Ok(())
}
