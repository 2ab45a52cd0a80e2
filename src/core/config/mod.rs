//! Configuration management for the ensemble pipeline.
//!
//! This module provides the run configuration, per-class decision parameters,
//! the parallel policy, and the validation traits shared by all of them.

pub mod decision;
pub mod ensemble;
pub mod errors;
pub mod parallel;

// Re-export commonly used types
pub use decision::{ClassDecisions, DecisionMode, DecisionParameters};
pub use ensemble::{
    CheckpointKind, DecisionOrder, EnsembleConfig, parse_fold_list, parse_min_areas,
};
pub use errors::{ConfigError, ConfigValidator, ConfigValidatorExt};
pub use parallel::ParallelPolicy;
