//! 熔断降级
//!
//! 按资源跟踪评估窗口内的异常比例、异常数或平均响应时间，超过阈值即
//! 熔断：熔断期间所有调用直接拒绝，持续 `time_window_secs` 秒后自动
//! 恢复，从干净窗口重新评估。没有半开探测状态，恢复即完全恢复。
//!
//! 熔断器自带统计，与节点计数互不干扰：拒绝不产生完成事件，熔断期间
//! 的在途完成也不计入评估，保证恢复时的窗口确实是干净的。

use crate::constants::{DEFAULT_MIN_REQUEST_AMOUNT, MS_PER_SECOND};
use crate::error::{AdmitronError, BlockError, Outcome};
use crate::sliding_window::{MetricEvent, SlidingCounter};
use ahash::AHashMap;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

lazy_static! {
    static ref BREAKERS: RwLock<Arc<AHashMap<String, Vec<Arc<Breaker>>>>> =
        RwLock::new(Arc::new(AHashMap::new()));
}

/// 熔断判据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeGrade {
    /// 窗口内 异常数/完成数 超过阈值（0.0~1.0）
    ExceptionRatio,
    /// 窗口内异常数超过阈值
    ExceptionCount,
    /// 窗口内平均响应时间（毫秒）超过阈值
    AverageRt,
}

/// 熔断规则
///
/// # 参数
/// - `resource`: 资源名
/// - `grade`: 熔断判据
/// - `threshold`: 判据阈值，比例取0.0~1.0，响应时间取毫秒
/// - `time_window_secs`: 评估窗口长度，同时是熔断持续时长（秒）
/// - `min_request_amount`: 最小请求数，窗口内完成数不足时不触发熔断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradeRule {
    pub resource: String,
    pub grade: DegradeGrade,
    pub threshold: f64,
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,
    #[serde(default = "default_min_request_amount")]
    pub min_request_amount: u64,
}

fn default_time_window() -> u64 {
    1
}

fn default_min_request_amount() -> u64 {
    DEFAULT_MIN_REQUEST_AMOUNT
}

impl DegradeRule {
    pub fn new(resource: impl Into<String>, grade: DegradeGrade, threshold: f64) -> Self {
        Self {
            resource: resource.into(),
            grade,
            threshold,
            time_window_secs: default_time_window(),
            min_request_amount: DEFAULT_MIN_REQUEST_AMOUNT,
        }
    }

    pub fn with_time_window_secs(mut self, time_window_secs: u64) -> Self {
        self.time_window_secs = time_window_secs;
        self
    }

    pub fn with_min_request_amount(mut self, min_request_amount: u64) -> Self {
        self.min_request_amount = min_request_amount;
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
        if self.grade == DegradeGrade::ExceptionRatio && self.threshold > 1.0 {
            return Err("异常比例阈值不能超过1.0".to_string());
        }
        if self.time_window_secs == 0 {
            return Err("time_window_secs 必须大于0".to_string());
        }
        Ok(())
    }
}

/// 一条规则的熔断器实体
///
/// 统计窗口与熔断持续时长相同；`open_until` 为0表示从未熔断过。
struct Breaker {
    rule: DegradeRule,
    open_until: AtomicU64,
    counter: SlidingCounter,
}

impl Breaker {
    fn new(rule: DegradeRule) -> Self {
        let window_ms = rule.time_window_secs.saturating_mul(MS_PER_SECOND);
        Self {
            counter: SlidingCounter::new(rule.time_window_secs as usize, window_ms),
            open_until: AtomicU64::new(0),
            rule,
        }
    }

    fn open_window_ms(&self) -> u64 {
        self.rule.time_window_secs.saturating_mul(MS_PER_SECOND)
    }

    /// 评估并决定是否放行
    ///
    /// 熔断中直接拒绝；否则计算判据，超过阈值时竞争开启（恰好一个胜者
    /// 发布截止时刻），本次调用同样拒绝。
    fn try_pass(&self, now_ms: u64) -> Result<(), BlockError> {
        let open_until = self.open_until.load(Ordering::SeqCst);
        if now_ms < open_until {
            debug!(resource = %self.rule.resource, "熔断拒绝: 熔断中");
            return Err(BlockError::degrade(
                &self.rule.resource,
                format!("熔断中, 剩余 {} 毫秒", open_until - now_ms),
            ));
        }

        let success = self.counter.interval_sum(MetricEvent::Success, now_ms);
        let exceptions = self.counter.interval_sum(MetricEvent::Exception, now_ms);
        let completions = success + exceptions;
        // min_request_amount 为0时仍需至少一次完成, 比例判据不能除零
        if completions == 0 || completions < self.rule.min_request_amount {
            return Ok(());
        }

        let live = match self.rule.grade {
            DegradeGrade::ExceptionRatio => exceptions as f64 / completions as f64,
            DegradeGrade::ExceptionCount => exceptions as f64,
            DegradeGrade::AverageRt => self.counter.average_rt(now_ms),
        };
        if live <= self.rule.threshold {
            return Ok(());
        }

        let until = now_ms + self.open_window_ms();
        if self
            .open_until
            .compare_exchange(open_until, until, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!(
                resource = %self.rule.resource,
                grade = ?self.rule.grade,
                live,
                threshold = self.rule.threshold,
                time_window_secs = self.rule.time_window_secs,
                "熔断开启"
            );
        }
        Err(BlockError::degrade(
            &self.rule.resource,
            format!("判据 {:.4} 超过阈值 {}", live, self.rule.threshold),
        ))
    }

    /// 记录一次完成
    ///
    /// 熔断期间的在途完成不计入，恢复后的评估窗口保持干净。
    fn on_completed(&self, outcome: Outcome, rt_ms: u64, now_ms: u64) {
        if now_ms < self.open_until.load(Ordering::SeqCst) {
            return;
        }
        let event = match outcome {
            Outcome::Success => MetricEvent::Success,
            Outcome::Error => MetricEvent::Exception,
        };
        self.counter.record(event, 1, now_ms);
        self.counter.record(MetricEvent::RtSum, rt_ms, now_ms);
    }
}

/// 原子加载熔断规则集，整体替换现有规则
///
/// 任一规则非法则整批拒绝，现有规则集不变。替换成功后所有熔断器回到
/// 关闭状态并从零统计。
///
/// # 返回
/// - `Ok(())`: 已替换
/// - `Err(AdmitronError::Config)`: 存在非法规则
pub fn load_degrade_rules(rules: Vec<DegradeRule>) -> Result<(), AdmitronError> {
    for rule in &rules {
        rule.validate()
            .map_err(|e| AdmitronError::Config(format!("熔断规则非法: {}", e)))?;
    }

    let mut map: AHashMap<String, Vec<Arc<Breaker>>> = AHashMap::new();
    for rule in rules {
        map.entry(rule.resource.clone())
            .or_default()
            .push(Arc::new(Breaker::new(rule)));
    }

    let total: usize = map.values().map(Vec::len).sum();
    *BREAKERS.write() = Arc::new(map);
    info!("熔断规则已加载: {} 条", total);
    Ok(())
}

/// 查询资源的熔断规则
pub fn degrade_rules_for(resource: &str) -> Vec<DegradeRule> {
    BREAKERS
        .read()
        .get(resource)
        .map(|breakers| breakers.iter().map(|b| b.rule.clone()).collect())
        .unwrap_or_default()
}

/// 熔断检查
pub(crate) fn check(resource: &str, now_ms: u64) -> Result<(), BlockError> {
    let breakers = {
        let guard = BREAKERS.read();
        match guard.get(resource) {
            Some(breakers) => breakers.clone(),
            None => return Ok(()),
        }
    };
    for breaker in &breakers {
        breaker.try_pass(now_ms)?;
    }
    Ok(())
}

/// 完成事件回报
///
/// Entry退出时调用，喂给该资源的所有熔断器。
pub(crate) fn on_completed(resource: &str, outcome: Outcome, rt_ms: u64, now_ms: u64) {
    let breakers = {
        let guard = BREAKERS.read();
        match guard.get(resource) {
            Some(breakers) => breakers.clone(),
            None => return,
        }
    };
    for breaker in &breakers {
        breaker.on_completed(outcome, rt_ms, now_ms);
    }
}
