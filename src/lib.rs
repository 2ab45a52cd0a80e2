//! # Seg Ensemble
//!
//! Turns per-fold segmentation probability maps into a run-length encoded
//! submission table.
//!
//! ## Features
//!
//! - Resolution normalization of probability maps
//! - Dual-threshold (hysteresis) and single-threshold mask decisions
//! - 8-connected component filtering by minimum area
//! - Fold ensembling with decisions before or after averaging
//! - Column-major run-length encoding and decoding
//! - Submission assembly in template order
//!
//! ## Modules
//!
//! * [`core`] - Configuration, error handling, constants and array types
//! * [`processors`] - Normalization, thresholding, component filtering and RLE
//! * [`pipeline`] - Fold aggregation, submission building and persistence
//! * [`utils`] - Logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use seg_ensemble::prelude::*;
//! use ndarray::Array3;
//! use std::collections::HashMap;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EnsembleConfig::new(vec![0, 1])
//!     .with_class_names(["Fish"])
//!     .with_output_shape(4, 4)
//!     .with_decisions(ClassDecisions::shared(0.6, 0.4, DecisionMode::Hysteresis, &[0]));
//!
//! let mut aggregator = EnsembleAggregator::new(config)?;
//! aggregator.add(0, "a.jpg", Array3::from_elem((1, 8, 8), 0.9).view())?;
//! aggregator.add(1, "a.jpg", Array3::from_elem((1, 8, 8), 0.7).view())?;
//!
//! let predictions: HashMap<_, _> = aggregator.finalize().into_class_predictions(1)?;
//! let template = SubmissionTemplate::from_keys(["a.jpg_Fish", "b.jpg_Fish"]);
//! let table = SubmissionBuilder::new(["Fish"]).build(&template, &predictions)?;
//!
//! assert_eq!(table.get("a.jpg_Fish"), Some("1 16"));
//! assert_eq!(table.get("b.jpg_Fish"), Some(""));
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod core;

pub mod pipeline;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
///
/// Bring the essentials into scope with a single use statement:
///
/// ```rust
/// use seg_ensemble::prelude::*;
/// ```
///
/// For lower-level stages (component labelling, normalization, persistence),
/// import directly from `seg_ensemble::processors` or `seg_ensemble::pipeline`.
pub mod prelude {
    // Configuration
    pub use crate::core::config::{
        CheckpointKind, ClassDecisions, DecisionMode, DecisionOrder, DecisionParameters,
        EnsembleConfig,
    };

    // Ensemble and submission
    pub use crate::pipeline::{
        EnsembleAggregator, EnsembleRunner, FoldInference, PredictionBatch, RunOutput,
        SubmissionBuilder, SubmissionTable, SubmissionTemplate,
    };

    // Encoding
    pub use crate::processors::{decode_rle, encode_mask};

    // Error Handling
    pub use crate::core::{SegError, SegResult};
}
