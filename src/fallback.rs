//! 兜底注册表
//!
//! 准入拒绝与受保护体失败都属预期路径。类型化的 `guarded` 封装由调用侧
//! 闭包产生替代结果；本模块另行维护进程级的兜底回调注册表：全局缺省一条，
//! 按资源覆盖若干条，回调产出 `serde_json::Value` 形式的替代值。
//! `guarded_value` 直接把该替代值交还调用方；类型化封装走兜底时也会执行
//! 生效的注册回调，供适配层统一打点或上报，但替代结果仍由调用侧闭包给出。
//!
//! # 特性
//!
//! - **两级注册**: 资源级回调优先，其次全局缺省
//! - **热替换**: 运行期可随时更换或移除
//! - **决策之外**: 回调只在封装层触发，规则检查器从不调用

use crate::error::AdmitronError;
use crate::resource::ResourceIdentity;
use ahash::AHashMap;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// 兜底回调签名
///
/// 入参为被保护的资源与触发原因（规则拒绝或体执行失败），返回交还
/// 调用方的替代值。
pub type FallbackFn = Arc<dyn Fn(&ResourceIdentity, &AdmitronError) -> Value + Send + Sync>;

lazy_static! {
    static ref DEFAULT_FALLBACK: RwLock<Option<FallbackFn>> = RwLock::new(None);
    static ref RESOURCE_FALLBACKS: RwLock<AHashMap<String, FallbackFn>> =
        RwLock::new(AHashMap::new());
}

/// 安装全局缺省兜底回调，替换已有回调
pub fn set_default_fallback<F>(fallback: F)
where
    F: Fn(&ResourceIdentity, &AdmitronError) -> Value + Send + Sync + 'static,
{
    *DEFAULT_FALLBACK.write() = Some(Arc::new(fallback));
    debug!("缺省兜底回调已安装");
}

/// 清除全局缺省兜底回调
pub fn clear_default_fallback() {
    *DEFAULT_FALLBACK.write() = None;
}

/// 为单个资源安装兜底回调，优先于全局缺省
pub fn set_resource_fallback<F>(resource: impl Into<String>, fallback: F)
where
    F: Fn(&ResourceIdentity, &AdmitronError) -> Value + Send + Sync + 'static,
{
    let resource = resource.into();
    RESOURCE_FALLBACKS
        .write()
        .insert(resource.clone(), Arc::new(fallback));
    debug!(resource = %resource, "资源级兜底回调已安装");
}

/// 移除单个资源的兜底回调
pub fn remove_resource_fallback(resource: &str) {
    RESOURCE_FALLBACKS.write().remove(resource);
}

/// 解析资源生效的兜底回调
pub fn fallback_of(resource: &str) -> Option<FallbackFn> {
    if let Some(found) = RESOURCE_FALLBACKS.read().get(resource) {
        return Some(found.clone());
    }
    DEFAULT_FALLBACK.read().clone()
}

/// 执行生效的兜底回调并返回替代值
///
/// 回调在读锁外执行，回调内可以再注册或移除回调。未注册任何回调时
/// 返回 `None`。
pub(crate) fn invoke(identity: &ResourceIdentity, cause: &AdmitronError) -> Option<Value> {
    let fallback = fallback_of(&identity.name)?;
    debug!(resource = %identity, %cause, "走兜底路径");
    Some(fallback(identity, cause))
}
