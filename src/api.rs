//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 准入入口
//!
//! 所有受保护调用的唯一入口：`EntryBuilder` 描述一次调用（资源、方向、
//! 调用方、批量、参数值、是否异步），`enter` 在执行受保护体之前同步完成
//! 全部规则检查。放行返回在途Entry，由调用方在完成时退出回报；拒绝计入
//! 节点的拒绝数并返回 `Blocked`，受保护体不执行。
//!
//! `guarded` / `guarded_async` 是面向闭包的收口封装，保证Entry在所有
//! 路径上恰好退出一次，拒绝与失败时由调用方给的兜底闭包产生替代结果。
//! `guarded_value` 改为从兜底注册表取替代值，见 [`crate::fallback`]。
//!
//! # 示例
//! ```
//! use admitron::api;
//!
//! let result: Result<u32, &str> = api::guarded(
//!     "demo/load",
//!     || Ok(42),
//!     |_cause| Err("degraded"),
//! );
//! assert_eq!(result, Ok(42));
//! ```

use crate::clock::current_time_millis;
use crate::constants::{MAX_BATCH_COUNT, MIN_BATCH_COUNT};
use crate::context;
use crate::degrade;
use crate::entry::Entry;
use crate::error::AdmitronError;
use crate::fallback;
use crate::flow_control;
use crate::node::{self, EntranceNode};
use crate::param_flow;
use crate::resource::{ParamValue, ResourceIdentity, TrafficDirection};
use crate::sliding_window::StatsSnapshot;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// 受保护调用的构建器
///
/// # 参数
/// - `resource`: 资源名，方向默认为出站
/// - `origin`: 调用方标识，缺省沿用上下文的origin
/// - `batch_count`: 本次请求量，计数与令牌均按该值核算
/// - `is_async`: 异步调用不参与线程栈，直接挂在入口节点下
/// - `params`: 携带的参数值，供热点参数规则按位置取用
///
/// # 示例
/// ```
/// use admitron::api::EntryBuilder;
///
/// let entry = EntryBuilder::new("demo/query")
///     .origin("gateway")
///     .param("user-1001")
///     .enter()
///     .unwrap();
/// entry.exit().unwrap();
/// ```
pub struct EntryBuilder {
    identity: ResourceIdentity,
    origin: Option<String>,
    batch_count: u64,
    is_async: bool,
    params: Vec<ParamValue>,
}

impl EntryBuilder {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            identity: ResourceIdentity::outbound(resource),
            origin: None,
            batch_count: MIN_BATCH_COUNT,
            is_async: false,
            params: Vec::new(),
        }
    }

    /// 资源方向
    pub fn direction(mut self, direction: TrafficDirection) -> Self {
        self.identity.direction = direction;
        self
    }

    /// 调用方标识，覆盖上下文的origin
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// 本次请求量
    pub fn batch_count(mut self, batch_count: u64) -> Self {
        self.batch_count = batch_count;
        self
    }

    /// 声明为异步调用
    pub fn is_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// 追加一个参数值
    pub fn param(mut self, value: impl Into<ParamValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// 追加整组参数值
    pub fn params(mut self, values: impl IntoIterator<Item = ParamValue>) -> Self {
        self.params.extend(values);
        self
    }

    /// 执行准入检查
    ///
    /// 依次运行流控、熔断、热点参数检查。放行时计入通过数并返回在途
    /// Entry（同步调用压为当前栈顶）；拒绝时计入拒绝数并返回 `Blocked`，
    /// 不产生Entry。
    ///
    /// # 返回
    /// - `Ok(entry)`: 放行
    /// - `Err(AdmitronError::Blocked)`: 规则拒绝
    /// - `Err(AdmitronError::Usage)`: 请求量越界
    pub fn enter(self) -> Result<Arc<Entry>, AdmitronError> {
        if self.batch_count < MIN_BATCH_COUNT || self.batch_count > MAX_BATCH_COUNT {
            return Err(AdmitronError::Usage(format!(
                "batch_count 必须在 {} 到 {} 之间: {}",
                MIN_BATCH_COUNT, MAX_BATCH_COUNT, self.batch_count
            )));
        }

        let now = current_time_millis();
        let bound = context::ensure_bound();
        let origin = match &self.origin {
            Some(origin) => origin.clone(),
            None => bound.origin.clone(),
        };

        // 异步调用不嵌套在同步栈顶之下, 直接作为入口的兄弟子树
        let node = if self.is_async {
            bound
                .entrance
                .resolve_in_context(bound.entrance.node(), &self.identity)
        } else {
            let parent_node = bound
                .current_entry
                .as_ref()
                .map(|entry| entry.node().clone())
                .unwrap_or_else(|| bound.entrance.node().clone());
            bound.entrance.resolve_in_context(&parent_node, &self.identity)
        };
        let cluster = node.cluster().clone();

        let decision = flow_control::check(
            &self.identity.name,
            &cluster,
            &origin,
            self.batch_count,
            now,
        )
        .and_then(|_| degrade::check(&self.identity.name, now))
        .and_then(|_| param_flow::check(&self.identity.name, &self.params, self.batch_count, now));

        if let Err(block) = decision {
            node.stats().record_block(self.batch_count, now);
            cluster.stats().record_block(self.batch_count, now);
            if !origin.is_empty() {
                cluster
                    .origin_stats(&origin)
                    .record_block(self.batch_count, now);
            }
            // 拒绝不产生Entry, 惰性上下文不能因此滞留
            context::clear_if_auto_idle();
            return Err(AdmitronError::Blocked(block));
        }

        node.stats().record_pass(self.batch_count, now);
        cluster.stats().record_pass(self.batch_count, now);
        if !origin.is_empty() {
            cluster
                .origin_stats(&origin)
                .record_pass(self.batch_count, now);
        }

        let parent = if self.is_async {
            None
        } else {
            bound.current_entry.clone()
        };
        let entry = Entry::register(
            self.identity,
            node,
            origin,
            parent,
            self.batch_count,
            self.is_async,
            now,
        );
        if !entry.is_async() {
            context::push_current_entry(entry.clone());
        }
        Ok(entry)
    }
}

/// 同步准入快捷方式
pub fn enter(resource: &str) -> Result<Arc<Entry>, AdmitronError> {
    EntryBuilder::new(resource).enter()
}

/// 执行受保护的同步调用
///
/// 准入通过后执行 `body`，按结果退出Entry；拒绝时执行注册的兜底回调
/// 以便统一打点，再由 `fallback` 闭包产生替代结果。`body` 的错误记为
/// 异常后原样返回。
pub fn guarded<T, E, F, FB>(resource: &str, body: F, fallback: FB) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    FB: FnOnce(&AdmitronError) -> Result<T, E>,
{
    match EntryBuilder::new(resource).enter() {
        Ok(entry) => {
            let result = body();
            let exited = match &result {
                Ok(_) => entry.exit(),
                Err(_) => entry.exit_err(),
            };
            if let Err(e) = exited {
                error!("受保护调用退出失败: {}", e);
            }
            result
        }
        Err(cause) => {
            // 类型化封装的替代结果由调用侧闭包给出, 注册回调的返回值不采用
            fallback::invoke(&ResourceIdentity::outbound(resource), &cause);
            fallback(&cause)
        }
    }
}

/// 执行受保护调用并以注册回调兜底
///
/// 与 [`guarded`] 的区别在于替代结果来自兜底注册表：拒绝或体执行失败时
/// 依次查资源级回调、全局缺省回调，命中即返回其替代值；未注册任何回调
/// 时原样返回错误。失败照常记入异常统计。
pub fn guarded_value<F>(resource: &str, body: F) -> Result<serde_json::Value, AdmitronError>
where
    F: FnOnce() -> Result<serde_json::Value, AdmitronError>,
{
    let identity = ResourceIdentity::outbound(resource);
    match EntryBuilder::new(resource).enter() {
        Ok(entry) => match body() {
            Ok(value) => {
                if let Err(e) = entry.exit() {
                    error!("受保护调用退出失败: {}", e);
                }
                Ok(value)
            }
            Err(cause) => {
                if let Err(e) = entry.exit_err() {
                    error!("受保护调用退出失败: {}", e);
                }
                fallback::invoke(&identity, &cause).ok_or(cause)
            }
        },
        Err(cause) => fallback::invoke(&identity, &cause).ok_or(cause),
    }
}

/// 执行受保护的异步调用
///
/// Entry以异步方式进入，不绑定为当前栈顶，外围同步上下文的生命周期
/// 不受本次调用影响。
pub async fn guarded_async<T, E, F, Fut, FB>(resource: &str, body: F, fallback: FB) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    FB: FnOnce(&AdmitronError) -> Result<T, E>,
{
    match EntryBuilder::new(resource).is_async(true).enter() {
        Ok(entry) => {
            let result = body().await;
            let exited = match &result {
                Ok(_) => entry.exit(),
                Err(_) => entry.exit_err(),
            };
            if let Err(e) = exited {
                error!("受保护调用退出失败: {}", e);
            }
            result
        }
        Err(cause) => {
            fallback::invoke(&ResourceIdentity::outbound(resource), &cause);
            fallback(&cause)
        }
    }
}

/// 资源的实时统计快照（任一方向）
pub fn resource_snapshot(resource: &str) -> Option<StatsSnapshot> {
    node::find_cluster_by_name(resource).map(|cluster| cluster.snapshot())
}

/// 命名上下文的入口节点
pub fn entrance_of(context_name: &str) -> Arc<EntranceNode> {
    node::resolve_entrance(context_name)
}
