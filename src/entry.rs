//! 受保护调用的生命周期
//!
//! Entry代表一次在途的受保护调用，生命周期严格为 创建 -> (嵌套子调用) ->
//! 退出，且退出恰好一次。重复退出与乱序退出是使用错误：前者拒绝并跳过
//! 重复计数，后者按栈顶向下级联收尾后上报。
//!
//! 同步Entry通过线程上下文构成调用栈；异步Entry以 (资源, 调用ID) 为键
//! 独立登记，从不触碰线程上下文。

use crate::clock::current_time_millis;
use crate::context;
use crate::degrade;
use crate::error::{AdmitronError, Outcome};
use crate::node::TreeNode;
use crate::resource::ResourceIdentity;
use dashmap::DashMap;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

lazy_static! {
    /// 在途调用登记表: (资源名, 调用ID) -> Entry
    static ref IN_FLIGHT: DashMap<(String, Uuid), Arc<Entry>> = DashMap::new();
}

/// 一次在途的受保护调用
pub struct Entry {
    identity: ResourceIdentity,
    node: Arc<TreeNode>,
    origin: String,
    parent: Option<Arc<Entry>>,
    batch_count: u64,
    created_ms: u64,
    is_async: bool,
    invocation_id: Uuid,
    exited: AtomicBool,
}

impl Entry {
    /// 创建并登记一次在途调用
    pub(crate) fn register(
        identity: ResourceIdentity,
        node: Arc<TreeNode>,
        origin: String,
        parent: Option<Arc<Entry>>,
        batch_count: u64,
        is_async: bool,
        at_ms: u64,
    ) -> Arc<Entry> {
        let entry = Arc::new(Entry {
            identity,
            node,
            origin,
            parent,
            batch_count,
            created_ms: at_ms,
            is_async,
            invocation_id: Uuid::new_v4(),
            exited: AtomicBool::new(false),
        });
        IN_FLIGHT.insert(
            (entry.identity.name.clone(), entry.invocation_id),
            entry.clone(),
        );
        entry
    }

    pub fn resource(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count
    }

    /// 所关联的树节点
    pub fn node(&self) -> &Arc<TreeNode> {
        &self.node
    }

    /// 父Entry（调用栈上一层）
    pub fn parent(&self) -> Option<&Arc<Entry>> {
        self.parent.as_ref()
    }

    /// 成功退出，响应时间取实际耗时
    pub fn exit(self: &Arc<Self>) -> Result<(), AdmitronError> {
        self.exit_with_outcome(Outcome::Success, None)
    }

    /// 成功退出并指定响应时间
    pub fn exit_with_rt(self: &Arc<Self>, rt_ms: u64) -> Result<(), AdmitronError> {
        self.exit_with_outcome(Outcome::Success, Some(rt_ms))
    }

    /// 以业务异常退出
    pub fn exit_err(self: &Arc<Self>) -> Result<(), AdmitronError> {
        self.exit_with_outcome(Outcome::Error, None)
    }

    /// 退出并上报结果
    ///
    /// 完成计数落入树节点、聚合节点与来源计数器，并喂给熔断统计；之后
    /// 从在途登记表移除。同步Entry随后弹栈，栈顶不匹配时按栈顶向下
    /// 级联收尾后上报乱序错误。
    pub fn exit_with_outcome(
        self: &Arc<Self>,
        outcome: Outcome,
        rt_override: Option<u64>,
    ) -> Result<(), AdmitronError> {
        if self
            .exited
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            error!("Entry重复退出: resource={}", self.identity);
            return Err(AdmitronError::Usage(format!(
                "Entry重复退出: {}",
                self.identity
            )));
        }

        let now = current_time_millis();
        let rt_ms = rt_override.unwrap_or_else(|| now.saturating_sub(self.created_ms));

        self.node.stats().record_complete(outcome, rt_ms, now);
        self.node
            .cluster()
            .stats()
            .record_complete(outcome, rt_ms, now);
        if !self.origin.is_empty() {
            self.node
                .cluster()
                .origin_stats(&self.origin)
                .record_complete(outcome, rt_ms, now);
        }
        degrade::on_completed(&self.identity.name, outcome, rt_ms, now);

        IN_FLIGHT.remove(&(self.identity.name.clone(), self.invocation_id));

        if self.is_async {
            return Ok(());
        }

        if context::pop_current_entry(self, self.parent.clone()) {
            return Ok(());
        }

        // 栈顶不是自己: 若自己确在栈上，则级联收尾栈顶到自己之间的Entry
        error!("Entry退出顺序错误: resource={}", self.identity);
        if self.on_current_stack() {
            let mut guard = 0;
            while let Some(top) = context::current_entry() {
                if Arc::ptr_eq(&top, self) {
                    context::pop_current_entry(self, self.parent.clone());
                    break;
                }
                if top.exit().is_err() {
                    break;
                }
                guard += 1;
                if guard > 64 {
                    break;
                }
            }
        }
        Err(AdmitronError::Usage(format!(
            "Entry退出顺序错误: {}",
            self.identity
        )))
    }

    /// 自己是否在当前线程的调用栈上
    fn on_current_stack(self: &Arc<Self>) -> bool {
        let mut cursor = context::current_entry();
        while let Some(entry) = cursor {
            if Arc::ptr_eq(&entry, self) {
                return true;
            }
            cursor = entry.parent.clone();
        }
        false
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("identity", &self.identity)
            .field("origin", &self.origin)
            .field("batch_count", &self.batch_count)
            .field("created_ms", &self.created_ms)
            .field("is_async", &self.is_async)
            .field("invocation_id", &self.invocation_id)
            .field("exited", &self.exited)
            .finish_non_exhaustive()
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        if !self.exited.load(Ordering::SeqCst) {
            warn!(
                "Entry未退出即被丢弃: resource={}, invocation_id={}",
                self.identity, self.invocation_id
            );
        }
    }
}

/// 指定资源的在途调用数
pub fn in_flight_count(resource: &str) -> usize {
    IN_FLIGHT
        .iter()
        .filter(|entry| entry.key().0 == resource)
        .count()
}
