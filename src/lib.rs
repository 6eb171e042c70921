//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Admitron - Call-Level Admission Control and Resilience Framework
//!
//! Provides QPS flow control, circuit breaking, and per-parameter-value
//! hotspot flow control over a call-chain statistics tree.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use admitron::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`EntryBuilder`] / [`enter`] - Admission check producing a live [`Entry`]
//! - [`guarded`] / [`guarded_async`] - Closure wrappers with fallback substitution
//! - [`FlowRule`], [`DegradeRule`], [`ParamFlowRule`] - The three rule families
//! - [`RuleDocument`] - JSON/YAML rule loading
//! - [`AdmitronError`] - Error taxonomy (blocked / usage / config)
//!
//! ## Statistics
//!
//! Bucketed sliding counters ([`SlidingCounter`]) aggregated per resource
//! ([`ClusterNode`]), per call chain ([`TreeNode`]), and per caller origin.
//!
//! # Examples
//!
//! ```rust
//! use admitron::prelude::*;
//!
//! // api/search 每秒最多放行2次
//! load_flow_rules(vec![FlowRule::new("api/search", 2.0)]).unwrap();
//!
//! for _ in 0..2 {
//!     let entry = enter("api/search").unwrap();
//!     entry.exit().unwrap();
//! }
//! assert!(enter("api/search").is_err());
//! ```
//!
//! # Features
//!
//! - **Call-chain statistics tree**: per-context entrance nodes, chain-local and
//!   resource-wide counters, origin-scoped sub-counters
//! - **QPS flow control**: sliding-window pass counting with window-scaled capacity
//! - **Circuit breaking**: exception ratio/count and average-RT grades with
//!   timed open period and clean-window recovery
//! - **Hotspot parameter flow control**: exact token admission per parameter
//!   value with burst capacity and LRU-bounded value maps
//! - **Atomic rule reload**: whole-set replacement, readers never observe a
//!   half-updated rule set
//! - **Non-blocking hot path**: compare-and-swap loops instead of locks on
//!   every admission-time counter

pub mod prelude;

pub mod api;
pub mod clock;
pub mod config;
pub mod constants;
pub mod context;
pub mod degrade;
pub mod entry;
pub mod error;
pub mod fallback;
pub mod flow_control;
pub mod node;
pub mod param_flow;
pub mod param_metric;
pub mod resource;
pub mod sliding_window;

#[cfg(test)]
mod test_support;

// 重新导出常用类型
pub use api::{
    enter, entrance_of, guarded, guarded_async, guarded_value, resource_snapshot, EntryBuilder,
};
pub use clock::current_time_millis;
pub use config::RuleDocument;
pub use context::{current_context_name, current_entry, enter_context, exit_context, is_bound};
pub use degrade::{degrade_rules_for, load_degrade_rules, DegradeGrade, DegradeRule};
pub use entry::{in_flight_count, Entry};
pub use error::{AdmitronError, BlockError, BlockReason, Outcome};
pub use fallback::{
    clear_default_fallback, fallback_of, remove_resource_fallback, set_default_fallback,
    set_resource_fallback, FallbackFn,
};
pub use flow_control::{flow_rules_for, load_flow_rules, FlowRule};
pub use node::{
    find_cluster_by_name, resolve_entrance, ClusterNode, EntranceNode, NodeStats, TreeNode,
};
pub use param_flow::{load_param_rules, param_rules_for, ParamFlowRule, SpecificItem};
pub use param_metric::{ParamWindow, ParameterMetric};
pub use resource::{ParamValue, ResourceIdentity, TrafficDirection};
pub use sliding_window::{MetricEvent, SlidingCounter, StatsSnapshot};
