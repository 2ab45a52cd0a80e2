//! Array types exchanged between pipeline stages.

use ndarray::{Array2, Array3, Array4};

/// Per-class probabilities for one image, shape `(classes, height, width)`.
pub type ProbabilityMap = Array3<f32>;

/// A batch of probability maps, shape `(batch, classes, height, width)`.
pub type ProbabilityBatch = Array4<f32>;

/// One decided channel, shape `(height, width)`, every element 0 or 1.
pub type BinaryMask = Array2<u8>;

/// Per-pixel fold votes for every class, shape `(classes, height, width)`.
pub type VoteMap = Array3<u16>;
