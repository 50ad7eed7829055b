//! Priority management for registered job sources.
//!
//! Sources are registered with importance/urgency ratings, resource
//! requirements, and dependencies, then scored on demand with a weighted
//! composite of five sub-scores. The manager turns scores into a
//! dependency-respecting execution order and keeps an append-only audit log
//! of every priority adjustment, including automatic demotions triggered by
//! sustained failures.

mod manager;
mod order;
mod score;
mod source;

pub use manager::{
    AdjustmentReason, PriorityAdjustment, PriorityConfig, PriorityError, PriorityManager,
    MIN_SAMPLES_FOR_DEMOTION,
};
pub use order::{ExecutionOrder, ScheduledJob};
pub use score::{
    PriorityScore, DEFAULT_PERFORMANCE_SCORE, ERROR_RATE_WINDOW, OUTCOME_HISTORY_LEN,
    WEIGHT_IMPORTANCE, WEIGHT_PERFORMANCE, WEIGHT_RESOURCE, WEIGHT_TIME, WEIGHT_URGENCY,
};
pub use source::{JobSource, PriorityLevel, ResourceKind, MAX_RATING, MIN_RATING};
