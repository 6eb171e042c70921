//! 测试通用工具模块
//!
//! 提供测试中常用的工具函数和辅助结构。

#![allow(dead_code)]

use admitron::{DegradeGrade, DegradeRule, FlowRule, ParamFlowRule};
use lazy_static::lazy_static;
use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;

lazy_static! {
    static ref RULE_LOCK: Mutex<()> = Mutex::new(());
}

/// 串行化触碰全局规则表的用例
///
/// 规则表整体替换是进程级的，并行用例各自加载会互相覆盖，整个用例期间
/// 持有本锁。
pub fn rule_lock() -> MutexGuard<'static, ()> {
    RULE_LOCK.lock()
}

/// 初始化测试日志输出（重复调用安全）
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// 等待指定毫秒
pub fn wait_millis(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}

/// 等待指定秒数
pub fn wait_secs(secs: u64) {
    std::thread::sleep(Duration::from_secs(secs));
}

/// 创建简单的QPS流控规则
pub fn simple_flow_rule(resource: &str, threshold: f64) -> FlowRule {
    FlowRule::new(resource, threshold)
}

/// 创建异常比例熔断规则
pub fn ratio_degrade_rule(resource: &str, ratio: f64, window_secs: u64) -> DegradeRule {
    DegradeRule::new(resource, DegradeGrade::ExceptionRatio, ratio)
        .with_time_window_secs(window_secs)
        .with_min_request_amount(3)
}

/// 创建热点参数规则（首个参数位置）
pub fn hotspot_rule(resource: &str, threshold: u64) -> ParamFlowRule {
    ParamFlowRule::new(resource, 0, threshold)
}
