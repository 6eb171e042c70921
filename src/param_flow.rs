//! 热点参数流控
//!
//! 按调用时携带的参数值做细粒度流控：同一资源下不同的参数值各自持有
//! 独立的令牌窗口，热点值被限住时冷门值不受影响。规则可为特定参数值
//! 指定独立阈值（特定项不享受突发额度），阈值为0表示该值一律拒绝。
//!
//! 规则集整体原子替换：并发检查要么看到旧规则集要么看到新规则集。规则
//! 变更后其旧计量一并丢弃，新窗口从零起步。

use crate::constants::{DEFAULT_PARAM_DURATION_SECS, MS_PER_SECOND};
use crate::error::{AdmitronError, BlockError};
use crate::param_metric::ParameterMetric;
use crate::resource::ParamValue;
use ahash::AHashMap;
use dashmap::DashMap;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

lazy_static! {
    static ref PARAM_RULES: RwLock<Arc<AHashMap<String, Vec<Arc<ParamFlowRule>>>>> =
        RwLock::new(Arc::new(AHashMap::new()));
    static ref PARAM_METRICS: DashMap<Arc<ParamFlowRule>, Arc<ParameterMetric>> = DashMap::new();
}

/// 特定参数值的独立阈值项
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecificItem {
    /// 参数值
    pub value: ParamValue,
    /// 该值的每周期令牌数，0表示一律拒绝
    pub threshold: u64,
}

/// 热点参数流控规则
///
/// # 参数
/// - `resource`: 资源名
/// - `param_index`: 参数位置索引，调用未携带该位置参数时本规则跳过
/// - `threshold`: 默认每周期令牌数
/// - `duration_secs`: 统计周期（秒）
/// - `burst_count`: 突发额度，只在新窗口或空闲后的窗口起点发放
/// - `specific_items`: 特定参数值的独立阈值，覆盖默认阈值
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamFlowRule {
    pub resource: String,
    pub param_index: usize,
    pub threshold: u64,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default)]
    pub burst_count: u64,
    #[serde(default)]
    pub specific_items: Vec<SpecificItem>,
}

fn default_duration_secs() -> u64 {
    DEFAULT_PARAM_DURATION_SECS
}

impl ParamFlowRule {
    pub fn new(resource: impl Into<String>, param_index: usize, threshold: u64) -> Self {
        Self {
            resource: resource.into(),
            param_index,
            threshold,
            duration_secs: DEFAULT_PARAM_DURATION_SECS,
            burst_count: 0,
            specific_items: Vec::new(),
        }
    }

    pub fn with_duration_secs(mut self, duration_secs: u64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn with_burst(mut self, burst_count: u64) -> Self {
        self.burst_count = burst_count;
        self
    }

    pub fn with_specific_item(mut self, value: impl Into<ParamValue>, threshold: u64) -> Self {
        self.specific_items.push(SpecificItem {
            value: value.into(),
            threshold,
        });
        self
    }

    /// 校验规则
    ///
    /// # 返回
    /// - `Ok(())`: 合法
    /// - `Err(String)`: 首个违规项的说明
    pub fn validate(&self) -> Result<(), String> {
        if self.resource.is_empty() {
            return Err("resource 不能为空".to_string());
        }
        if self.duration_secs == 0 {
            return Err("duration_secs 必须大于0".to_string());
        }
        Ok(())
    }

    /// 解析参数值的生效阈值与突发额度
    ///
    /// 特定项覆盖默认阈值且不享受突发额度。
    fn effective_limits(&self, value: &ParamValue) -> (u64, u64) {
        for item in &self.specific_items {
            if &item.value == value {
                return (item.threshold, 0);
            }
        }
        (self.threshold, self.burst_count)
    }

    fn duration_ms(&self) -> u64 {
        self.duration_secs.saturating_mul(MS_PER_SECOND)
    }
}

/// 原子加载热点参数规则集，整体替换现有规则
///
/// 任一规则非法则整批拒绝，现有规则集不变。替换成功后，不在新规则集中
/// 的规则其参数计量随之丢弃。
///
/// # 返回
/// - `Ok(())`: 已替换
/// - `Err(AdmitronError::Config)`: 存在非法规则
pub fn load_param_rules(rules: Vec<ParamFlowRule>) -> Result<(), AdmitronError> {
    for rule in &rules {
        rule.validate()
            .map_err(|e| AdmitronError::Config(format!("热点参数规则非法: {}", e)))?;
    }

    let mut map: AHashMap<String, Vec<Arc<ParamFlowRule>>> = AHashMap::new();
    for rule in rules {
        map.entry(rule.resource.clone())
            .or_default()
            .push(Arc::new(rule));
    }

    let total: usize = map.values().map(Vec::len).sum();
    let map = Arc::new(map);
    *PARAM_RULES.write() = Arc::clone(&map);

    // 丢弃不再被任何规则引用的计量
    PARAM_METRICS.retain(|rule, _| {
        map.get(&rule.resource)
            .map(|rules| rules.iter().any(|r| r == rule))
            .unwrap_or(false)
    });

    info!("热点参数规则已加载: {} 条", total);
    Ok(())
}

/// 查询资源的热点参数规则
pub fn param_rules_for(resource: &str) -> Vec<Arc<ParamFlowRule>> {
    PARAM_RULES
        .read()
        .get(resource)
        .cloned()
        .unwrap_or_default()
}

/// 取或建规则的参数计量
fn metric_for(rule: &Arc<ParamFlowRule>) -> Arc<ParameterMetric> {
    if let Some(metric) = PARAM_METRICS.get(rule) {
        return Arc::clone(metric.value());
    }
    Arc::clone(
        PARAM_METRICS
            .entry(Arc::clone(rule))
            .or_insert_with(|| Arc::new(ParameterMetric::new()))
            .value(),
    )
}

/// 热点参数检查
///
/// 逐条规则检查调用携带的参数值，任一规则拒绝即整体拒绝；调用未携带
/// 规则索引位置的参数时该规则跳过。
pub(crate) fn check(
    resource: &str,
    args: &[ParamValue],
    batch_count: u64,
    now_ms: u64,
) -> Result<(), BlockError> {
    let rules = {
        let guard = PARAM_RULES.read();
        match guard.get(resource) {
            Some(rules) => rules.clone(),
            None => return Ok(()),
        }
    };

    for rule in &rules {
        let value = match args.get(rule.param_index) {
            Some(value) => value,
            None => continue,
        };

        let (threshold, burst) = rule.effective_limits(value);
        if threshold == 0 {
            debug!(resource, %value, "热点参数拒绝: 阈值为0");
            return Err(BlockError::param_flow(
                resource,
                format!("参数值 {} 一律拒绝", value),
            ));
        }

        let metric = metric_for(rule);
        let window = metric.window_for(value, now_ms, threshold, burst);
        if !window.try_acquire(batch_count, now_ms, rule.duration_ms(), threshold, burst) {
            debug!(resource, %value, threshold, "热点参数拒绝: 令牌耗尽");
            return Err(BlockError::param_flow(
                resource,
                format!("参数值 {} 超过阈值 {}", value, threshold),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 1_700_000_000_000;

    #[test]
    fn test_rule_validation() {
        assert!(ParamFlowRule::new("r", 0, 5).validate().is_ok());
        assert!(ParamFlowRule::new("", 0, 5).validate().is_err());
        assert!(ParamFlowRule::new("r", 0, 5)
            .with_duration_secs(0)
            .validate()
            .is_err());
        // 阈值0合法, 语义为一律拒绝
        assert!(ParamFlowRule::new("r", 0, 0).validate().is_ok());
    }

    #[test]
    fn test_invalid_batch_leaves_rules_untouched() {
        let _guard = crate::test_support::registry_lock();
        let resource = "param_invalid_batch";
        load_param_rules(vec![ParamFlowRule::new(resource, 0, 5)]).unwrap();
        assert_eq!(param_rules_for(resource).len(), 1);

        let result = load_param_rules(vec![
            ParamFlowRule::new(resource, 0, 9),
            ParamFlowRule::new("", 0, 1),
        ]);
        assert!(result.is_err());

        // 整批拒绝: 旧规则集原样保留
        let kept = param_rules_for(resource);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].threshold, 5);
    }

    #[test]
    fn test_values_limited_independently() {
        let _guard = crate::test_support::registry_lock();
        let resource = "param_independent_values";
        load_param_rules(vec![ParamFlowRule::new(resource, 0, 3)]).unwrap();

        let hot = [ParamValue::from("hot")];
        let cold = [ParamValue::from("cold")];

        for _ in 0..3 {
            assert!(check(resource, &hot, 1, BASE).is_ok());
        }
        assert!(check(resource, &hot, 1, BASE).is_err());

        // 热点值被限不影响其他值
        assert!(check(resource, &cold, 1, BASE).is_ok());
    }

    #[test]
    fn test_missing_param_skips_rule() {
        let _guard = crate::test_support::registry_lock();
        let resource = "param_missing_index";
        load_param_rules(vec![ParamFlowRule::new(resource, 2, 1)]).unwrap();

        // 只带两个参数, 索引2不存在: 规则跳过, 不限流
        let args = [ParamValue::from("a"), ParamValue::from("b")];
        for _ in 0..10 {
            assert!(check(resource, &args, 1, BASE).is_ok());
        }
    }

    #[test]
    fn test_specific_item_overrides_default() {
        let _guard = crate::test_support::registry_lock();
        let resource = "param_specific_item";
        load_param_rules(vec![ParamFlowRule::new(resource, 0, 2)
            .with_specific_item("vip", 5)
            .with_specific_item("banned", 0)])
        .unwrap();

        let vip = [ParamValue::from("vip")];
        for _ in 0..5 {
            assert!(check(resource, &vip, 1, BASE).is_ok());
        }
        assert!(check(resource, &vip, 1, BASE).is_err());

        let normal = [ParamValue::from("normal")];
        for _ in 0..2 {
            assert!(check(resource, &normal, 1, BASE).is_ok());
        }
        assert!(check(resource, &normal, 1, BASE).is_err());

        // 阈值0: 首次即拒
        let banned = [ParamValue::from("banned")];
        let err = check(resource, &banned, 1, BASE).unwrap_err();
        assert_eq!(err.reason, crate::error::BlockReason::ParamFlow);
    }

    #[test]
    fn test_batch_count_consumes_tokens() {
        let _guard = crate::test_support::registry_lock();
        let resource = "param_batch_tokens";
        load_param_rules(vec![ParamFlowRule::new(resource, 0, 9)]).unwrap();

        let args = [ParamValue::from(42i64)];
        for _ in 0..3 {
            assert!(check(resource, &args, 3, BASE).is_ok());
        }
        assert!(check(resource, &args, 3, BASE).is_err());
        // 剩0个令牌, 单个也拒绝
        assert!(check(resource, &args, 1, BASE).is_err());
    }

    #[test]
    fn test_long_duration_denies_until_window_rolls() {
        let _guard = crate::test_support::registry_lock();
        let resource = "param_long_duration";
        load_param_rules(vec![ParamFlowRule::new(resource, 0, 5).with_duration_secs(60)]).unwrap();

        let args = [ParamValue::from("steady")];
        for _ in 0..5 {
            assert!(check(resource, &args, 1, BASE).is_ok());
        }
        // 60秒窗口内持续拒绝
        for offset in [0, 1_000, 10_000, 30_000] {
            assert!(check(resource, &args, 1, BASE + offset).is_err());
        }

        // 71秒处进入新窗口, 再次放满阈值
        for _ in 0..5 {
            assert!(check(resource, &args, 1, BASE + 71_000).is_ok());
        }
        assert!(check(resource, &args, 1, BASE + 71_000).is_err());
    }

    #[test]
    fn test_large_clock_jumps_admit_exact_threshold() {
        use crate::constants::SECONDS_PER_DAY;

        let _guard = crate::test_support::registry_lock();
        let resource = "param_clock_jump";
        load_param_rules(vec![ParamFlowRule::new(resource, 0, 3)]).unwrap();

        // 窗口重建按到期时刻一步算出, 跨天跳变不逐格追赶也不溢出
        let day_ms = SECONDS_PER_DAY * MS_PER_SECOND;
        let args = [ParamValue::from("jump")];
        for offset in [0, day_ms, 2 * day_ms] {
            let now = BASE + offset;
            for _ in 0..3 {
                assert!(check(resource, &args, 1, now).is_ok());
            }
            assert!(check(resource, &args, 1, now).is_err());
        }
    }

    #[test]
    fn test_rule_change_resets_metric() {
        let _guard = crate::test_support::registry_lock();
        let resource = "param_rule_change";
        load_param_rules(vec![ParamFlowRule::new(resource, 0, 2)]).unwrap();

        let args = [ParamValue::from("key")];
        assert!(check(resource, &args, 2, BASE).is_ok());
        assert!(check(resource, &args, 1, BASE).is_err());

        // 阈值变更是新规则: 计量从零起步
        load_param_rules(vec![ParamFlowRule::new(resource, 0, 4)]).unwrap();
        for _ in 0..4 {
            assert!(check(resource, &args, 1, BASE).is_ok());
        }
        assert!(check(resource, &args, 1, BASE).is_err());
    }

    #[test]
    fn test_rule_serde_round_trip() {
        let rule = ParamFlowRule::new("api/query", 1, 100)
            .with_duration_secs(10)
            .with_burst(20)
            .with_specific_item("vip", 500)
            .with_specific_item(7i64, 0);

        let json = serde_json::to_string(&rule).unwrap();
        let back: ParamFlowRule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule, back);

        // 省略可选字段时取默认值
        let minimal: ParamFlowRule =
            serde_json::from_str(r#"{"resource":"r","param_index":0,"threshold":5}"#).unwrap();
        assert_eq!(minimal.duration_secs, DEFAULT_PARAM_DURATION_SECS);
        assert_eq!(minimal.burst_count, 0);
        assert!(minimal.specific_items.is_empty());
    }
}
