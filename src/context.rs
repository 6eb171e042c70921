//! 调用上下文
//!
//! 每个执行线程至多绑定一个调用上下文（CallContext），覆盖一条同步调用
//! 链的生命周期。上下文在首次受保护调用时按默认名惰性创建，也可通过
//! `enter_context` 显式命名创建。
//!
//! # 清理纪律
//!
//! - 惰性创建的默认上下文在最外层Entry退出后自动解绑
//! - 显式命名的上下文由 `exit_context` 解绑，且要求链上已无存活Entry
//! - 异步Entry从不占据 `current_entry`，不影响上下文的清理时机
//!
//! 上下文栈只会被持有它的线程触碰，跨线程不可见。

use crate::constants::DEFAULT_CONTEXT_NAME;
use crate::entry::Entry;
use crate::error::AdmitronError;
use crate::node::{resolve_entrance, EntranceNode};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, error};

/// 调用上下文
///
/// `(名称, 来源, 入口节点, 当前Entry)` 的线程内绑定。
pub struct CallContext {
    name: String,
    origin: String,
    entrance: Arc<EntranceNode>,
    current_entry: Option<Arc<Entry>>,
    /// 是否为惰性创建（决定最外层Entry退出后是否自动解绑）
    auto_created: bool,
}

impl CallContext {
    fn new(name: &str, origin: &str, auto_created: bool) -> Self {
        Self {
            name: name.to_string(),
            origin: origin.to_string(),
            entrance: resolve_entrance(name),
            current_entry: None,
            auto_created,
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<CallContext>> = RefCell::new(None);
}

/// 绑定快照
///
/// Entry生命周期在进入时读取的上下文视图。
pub(crate) struct BoundContext {
    pub(crate) origin: String,
    pub(crate) entrance: Arc<EntranceNode>,
    pub(crate) current_entry: Option<Arc<Entry>>,
}

/// 显式进入命名上下文
///
/// 未绑定时创建并绑定；已绑定同名上下文时为幂等空操作；已绑定其他
/// 名称时拒绝并返回使用错误。
pub fn enter_context(name: &str, origin: &str) -> Result<(), AdmitronError> {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_ref() {
            None => {
                debug!("绑定调用上下文: name={}, origin={}", name, origin);
                *slot = Some(CallContext::new(name, origin, false));
                Ok(())
            }
            Some(existing) if existing.name == name => Ok(()),
            Some(existing) => {
                error!(
                    "上下文冲突: 线程已绑定 {}, 无法进入 {}",
                    existing.name, name
                );
                Err(AdmitronError::Usage(format!(
                    "线程已绑定上下文 {}, 无法进入 {}",
                    existing.name, name
                )))
            }
        }
    })
}

/// 退出当前上下文
///
/// 链上仍有存活Entry或线程未绑定上下文时拒绝。
pub fn exit_context() -> Result<(), AdmitronError> {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_ref() {
            None => Err(AdmitronError::Usage(
                "线程未绑定上下文, 无法退出".to_string(),
            )),
            Some(context) if context.current_entry.is_some() => {
                error!("上下文 {} 仍有存活Entry, 拒绝退出", context.name);
                Err(AdmitronError::Usage(format!(
                    "上下文 {} 仍有存活Entry, 拒绝退出",
                    context.name
                )))
            }
            Some(context) => {
                debug!("解绑调用上下文: name={}", context.name);
                *slot = None;
                Ok(())
            }
        }
    })
}

/// 线程是否已绑定上下文
pub fn is_bound() -> bool {
    CURRENT.with(|cell| cell.borrow().is_some())
}

/// 当前上下文名称
pub fn current_context_name() -> Option<String> {
    CURRENT.with(|cell| cell.borrow().as_ref().map(|context| context.name.clone()))
}

/// 当前上下文的栈顶Entry
pub fn current_entry() -> Option<Arc<Entry>> {
    CURRENT.with(|cell| {
        cell.borrow()
            .as_ref()
            .and_then(|context| context.current_entry.clone())
    })
}

/// 读取绑定快照，未绑定时按默认名惰性创建
pub(crate) fn ensure_bound() -> BoundContext {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        let context = slot.get_or_insert_with(|| {
            debug!("惰性绑定默认上下文");
            CallContext::new(DEFAULT_CONTEXT_NAME, "", true)
        });
        BoundContext {
            origin: context.origin.clone(),
            entrance: context.entrance.clone(),
            current_entry: context.current_entry.clone(),
        }
    })
}

/// 将新Entry压为栈顶
pub(crate) fn push_current_entry(entry: Arc<Entry>) {
    CURRENT.with(|cell| {
        if let Some(context) = cell.borrow_mut().as_mut() {
            context.current_entry = Some(entry);
        }
    });
}

/// 弹出栈顶Entry
///
/// 仅当栈顶与 `expected` 为同一实例时弹出并恢复其父Entry，返回true；
/// 否则保持现状返回false，由调用方上报使用错误。
pub(crate) fn pop_current_entry(expected: &Arc<Entry>, parent: Option<Arc<Entry>>) -> bool {
    let popped = CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_mut() {
            Some(context) => match context.current_entry.as_ref() {
                Some(current) if Arc::ptr_eq(current, expected) => {
                    context.current_entry = parent;
                    true
                }
                _ => false,
            },
            None => false,
        }
    });
    if popped {
        clear_if_auto_idle();
    }
    popped
}

/// 惰性创建的上下文在链清空后自动解绑
pub(crate) fn clear_if_auto_idle() {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        let idle_auto = matches!(
            slot.as_ref(),
            Some(context) if context.auto_created && context.current_entry.is_none()
        );
        if idle_auto {
            debug!("默认上下文已空闲, 自动解绑");
            *slot = None;
        }
    });
}
