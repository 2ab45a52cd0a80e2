//! The core module of the ensemble pipeline.
//!
//! This module contains the fundamental components shared by every stage:
//! - Configuration management and validation
//! - Constants used throughout the pipeline
//! - Error handling
//! - The array types exchanged between stages
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

pub use config::{
    CheckpointKind, ClassDecisions, ConfigError, ConfigValidator, ConfigValidatorExt,
    DecisionMode, DecisionOrder, DecisionParameters, EnsembleConfig, ParallelPolicy,
};
pub use constants::*;
pub use errors::{SegError, SegResult};
pub use types::{BinaryMask, ProbabilityBatch, ProbabilityMap, VoteMap};
