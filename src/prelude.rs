//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Admitron,
//! allowing users to import them with a single `use admitron::prelude::*;`
//! statement instead of importing each type individually.

// Core entry points - always available
pub use crate::api::{enter, guarded, guarded_async, guarded_value, resource_snapshot, EntryBuilder};
pub use crate::context::{enter_context, exit_context};
pub use crate::entry::Entry;
pub use crate::error::{AdmitronError, BlockError, BlockReason, Outcome};

// Resource model
pub use crate::resource::{ParamValue, ResourceIdentity, TrafficDirection};

// Rules and loading
pub use crate::config::RuleDocument;
pub use crate::degrade::{load_degrade_rules, DegradeGrade, DegradeRule};
pub use crate::flow_control::{load_flow_rules, FlowRule};
pub use crate::param_flow::{load_param_rules, ParamFlowRule, SpecificItem};

// Statistics
pub use crate::sliding_window::{MetricEvent, SlidingCounter, StatsSnapshot};

// Fallback registry
pub use crate::fallback::{
    clear_default_fallback, remove_resource_fallback, set_default_fallback, set_resource_fallback,
};
