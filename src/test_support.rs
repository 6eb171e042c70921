//! 测试辅助
//!
//! 规则表是进程级整体替换的，并行用例各自加载会互相覆盖。触碰规则表的
//! 用例先取本锁，整个用例期间持有。

use lazy_static::lazy_static;
use parking_lot::{Mutex, MutexGuard};

lazy_static! {
    static ref RULE_REGISTRY_LOCK: Mutex<()> = Mutex::new(());
}

/// 串行化触碰全局规则表的用例
pub(crate) fn registry_lock() -> MutexGuard<'static, ()> {
    RULE_REGISTRY_LOCK.lock()
}
