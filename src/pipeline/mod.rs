//! The ensemble pipeline.
//!
//! This module combines per-fold probability maps into final masks and
//! assembles them into a submission: accumulation across folds, per-image
//! finalization, table building, and the file formats around them.

pub mod accumulator;
mod config;
pub mod ensemble;
pub mod persistence;
pub mod runner;
pub mod stats;
pub mod submission;

pub use accumulator::{Accumulator, AccumulatorEntry};
pub use config::{ConfigFormat, ConfigLoader};
pub use ensemble::{EnsembleAggregator, EnsembleResult, FinalizedPrediction};
pub use persistence::{RawMeans, load_raw_means, read_raw_means, save_raw_means, write_raw_means};
pub use runner::{EnsembleRunner, FoldInference, PredictionBatch, RunOutput};
pub use stats::EnsembleStats;
pub use submission::{
    ArtifactNames, ClassPrediction, SubmissionBuilder, SubmissionRow, SubmissionTable,
    SubmissionTemplate,
};
