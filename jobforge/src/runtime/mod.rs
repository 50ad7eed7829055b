//! Runtime orchestration: component construction, background loops, and
//! deterministic shutdown.

mod config;
mod orchestrator;

pub use config::{
    LoopIntervals, RuntimeConfig, DEFAULT_BALANCE_INTERVAL, DEFAULT_PRIORITY_REVIEW_INTERVAL,
    DEFAULT_SAMPLE_INTERVAL,
};
pub use orchestrator::{Runtime, BALANCE_GROW_FACTOR};
