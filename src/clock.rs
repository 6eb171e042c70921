//! 毫秒时钟
//!
//! 所有计数与规则判定以同一毫秒墙钟为时间基准。单元测试构建下时钟可被
//! 冻结并手动推进，以便确定性地回放时间序列（跨天跳变、毫秒级步进）。

use std::time::{SystemTime, UNIX_EPOCH};

/// 当前Unix毫秒时间戳
///
/// 测试构建下若本线程时钟被冻结，返回受控值；否则返回系统时间。
pub fn current_time_millis() -> u64 {
    #[cfg(test)]
    {
        if let Some(frozen) = mock::frozen_now() {
            return frozen;
        }
    }

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
