//! 统计节点树
//!
//! 实现资源统计的两层结构：全局聚合节点（ClusterNode）按资源唯一、跨调用
//! 链共享；树节点（TreeNode）按调用链组织，记录链内视角的统计。入口节点
//! （EntranceNode）是一棵链树的根，对应一个命名上下文。
//!
//! # 特性
//!
//! - **懒创建**: 节点在首次触达时创建，进程生命周期内保留，只增不减
//! - **恰好一次**: 并发首达同一资源时只有一个创建者，其余复用同一实例
//! - **双粒度统计**: 每节点同时维护秒级与分钟级计数器，覆盖长短窗口查询

use crate::clock::current_time_millis;
use crate::error::Outcome;
use crate::resource::ResourceIdentity;
use crate::sliding_window::{MetricEvent, SlidingCounter, StatsSnapshot};
use dashmap::DashMap;
use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// 资源 -> 全局聚合节点
    static ref CLUSTER_NODES: DashMap<ResourceIdentity, Arc<ClusterNode>> = DashMap::new();
    /// 上下文名 -> 入口节点
    static ref ENTRANCE_NODES: DashMap<String, Arc<EntranceNode>> = DashMap::new();
}

/// 节点统计集
///
/// 秒级计数器（2个500ms桶）回答QPS类查询，分钟级计数器（60个1秒桶）
/// 覆盖最长60秒的规则窗口。写入同时落在两个粒度上。
pub struct NodeStats {
    second: SlidingCounter,
    minute: SlidingCounter,
}

impl NodeStats {
    fn new() -> Self {
        Self {
            second: SlidingCounter::per_second(),
            minute: SlidingCounter::per_minute(),
        }
    }

    /// 记录放行
    pub fn record_pass(&self, amount: u64, at_ms: u64) {
        self.second.record(MetricEvent::Pass, amount, at_ms);
        self.minute.record(MetricEvent::Pass, amount, at_ms);
    }

    /// 记录拒绝
    pub fn record_block(&self, amount: u64, at_ms: u64) {
        self.second.record(MetricEvent::Block, amount, at_ms);
        self.minute.record(MetricEvent::Block, amount, at_ms);
    }

    /// 记录完成（成功或异常）及响应时间
    pub fn record_complete(&self, outcome: Outcome, rt_ms: u64, at_ms: u64) {
        let event = match outcome {
            Outcome::Success => MetricEvent::Success,
            Outcome::Error => MetricEvent::Exception,
        };
        self.second.record(event, 1, at_ms);
        self.minute.record(event, 1, at_ms);
        self.second.record(MetricEvent::RtSum, rt_ms, at_ms);
        self.minute.record(MetricEvent::RtSum, rt_ms, at_ms);
    }

    /// 任意窗口求和，按窗口长度选择计数粒度
    pub fn window_sum(&self, event: MetricEvent, window_ms: u64, at_ms: u64) -> u64 {
        if window_ms <= self.second.interval_ms() {
            self.second.window_sum(event, window_ms, at_ms)
        } else {
            self.minute.window_sum(event, window_ms, at_ms)
        }
    }

    /// 秒级放行QPS
    pub fn pass_qps(&self, at_ms: u64) -> f64 {
        self.second.rate_per_second(MetricEvent::Pass, at_ms)
    }

    /// 秒级拒绝QPS
    pub fn block_qps(&self, at_ms: u64) -> f64 {
        self.second.rate_per_second(MetricEvent::Block, at_ms)
    }

    /// 当前快照
    pub fn snapshot(&self, at_ms: u64) -> StatsSnapshot {
        self.second.snapshot(at_ms)
    }
}

/// 全局聚合节点
///
/// 每个资源进程内唯一，被所有触达该资源的调用链共享。除聚合计数外，
/// 按来源（origin）维护二级计数器，支撑限定来源的规则。
pub struct ClusterNode {
    identity: ResourceIdentity,
    stats: NodeStats,
    /// 来源 -> 该来源的独立计数器
    origins: DashMap<String, Arc<NodeStats>>,
}

impl ClusterNode {
    fn new(identity: ResourceIdentity) -> Self {
        Self {
            identity,
            stats: NodeStats::new(),
            origins: DashMap::new(),
        }
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// 聚合计数器
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// 指定来源的计数器，首次访问时创建
    pub fn origin_stats(&self, origin: &str) -> Arc<NodeStats> {
        if let Some(existing) = self.origins.get(origin) {
            return existing.clone();
        }
        self.origins
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(NodeStats::new()))
            .value()
            .clone()
    }

    /// 当前快照
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(current_time_millis())
    }
}

/// 调用链树节点
///
/// 记录一条链内视角的统计，并持有子节点表（按子资源标识去重）。同一
/// 资源的所有树节点共享同一个全局聚合节点。
pub struct TreeNode {
    identity: ResourceIdentity,
    cluster: Arc<ClusterNode>,
    children: DashMap<ResourceIdentity, Arc<TreeNode>>,
    stats: NodeStats,
}

impl TreeNode {
    fn new(identity: ResourceIdentity) -> Self {
        let cluster = resolve_cluster_node(&identity);
        Self {
            identity,
            cluster,
            children: DashMap::new(),
            stats: NodeStats::new(),
        }
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// 所属全局聚合节点
    pub fn cluster(&self) -> &Arc<ClusterNode> {
        &self.cluster
    }

    /// 链内计数器
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// 获取或创建子节点
    ///
    /// 同一（父节点, 子资源标识）只创建一次，之后恒返回同一实例。
    pub fn resolve_child(&self, identity: &ResourceIdentity) -> Arc<TreeNode> {
        if let Some(existing) = self.children.get(identity) {
            return existing.clone();
        }
        self.children
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(TreeNode::new(identity.clone())))
            .value()
            .clone()
    }

    /// 查找已存在的子节点
    pub fn find_child(&self, identity: &ResourceIdentity) -> Option<Arc<TreeNode>> {
        self.children.get(identity).map(|child| child.clone())
    }

    /// 子节点数量
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// 子节点快照列表
    pub fn children(&self) -> Vec<Arc<TreeNode>> {
        self.children.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// 入口节点
///
/// 一个命名上下文对应一棵链树的根。除树根外，入口节点还维护本上下文内
/// "资源 -> 树节点"的登记表：同一资源在一个上下文内只有一个树节点，
/// 经由不同父节点再次触达时复用首次创建的那个。
pub struct EntranceNode {
    node: Arc<TreeNode>,
    resource_nodes: DashMap<ResourceIdentity, Arc<TreeNode>>,
}

impl EntranceNode {
    fn new(context_name: &str) -> Self {
        Self {
            node: Arc::new(TreeNode::new(ResourceIdentity::inbound(context_name))),
            resource_nodes: DashMap::new(),
        }
    }

    /// 树根节点
    pub fn node(&self) -> &Arc<TreeNode> {
        &self.node
    }

    /// 在本上下文内解析资源的树节点
    ///
    /// 未登记时在 `parent` 下创建并登记；已登记时直接复用，不再追加链接。
    pub fn resolve_in_context(
        &self,
        parent: &Arc<TreeNode>,
        identity: &ResourceIdentity,
    ) -> Arc<TreeNode> {
        if let Some(existing) = self.resource_nodes.get(identity) {
            return existing.clone();
        }
        self.resource_nodes
            .entry(identity.clone())
            .or_insert_with(|| parent.resolve_child(identity))
            .value()
            .clone()
    }
}

/// 解析资源的全局聚合节点
///
/// 并发首达时只有一个创建者，其余调用方看到同一实例。
pub fn resolve_cluster_node(identity: &ResourceIdentity) -> Arc<ClusterNode> {
    if let Some(existing) = CLUSTER_NODES.get(identity) {
        return existing.clone();
    }
    CLUSTER_NODES
        .entry(identity.clone())
        .or_insert_with(|| Arc::new(ClusterNode::new(identity.clone())))
        .value()
        .clone()
}

/// 查找已存在的全局聚合节点（只查不建）
pub fn find_cluster_node(identity: &ResourceIdentity) -> Option<Arc<ClusterNode>> {
    CLUSTER_NODES.get(identity).map(|node| node.clone())
}

/// 按资源名查找全局聚合节点（任一方向）
pub fn find_cluster_by_name(name: &str) -> Option<Arc<ClusterNode>> {
    CLUSTER_NODES
        .iter()
        .find(|entry| entry.key().name == name)
        .map(|entry| entry.value().clone())
}

/// 解析命名上下文的入口节点，首次使用时创建
pub fn resolve_entrance(context_name: &str) -> Arc<EntranceNode> {
    if let Some(existing) = ENTRANCE_NODES.get(context_name) {
        return existing.clone();
    }
    ENTRANCE_NODES
        .entry(context_name.to_string())
        .or_insert_with(|| Arc::new(EntranceNode::new(context_name)))
        .value()
        .clone()
}
