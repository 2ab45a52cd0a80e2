//! Mask processing stages.
//!
//! # Modules
//!
//! * `normalize` - Resamples probability maps to the canonical resolution
//! * `threshold` - Dual-threshold (hysteresis) and post-process decisions
//! * `components` - 8-connected component labelling and area filtering
//! * `rle` - Column-major run-length encoding and decoding

pub mod components;
pub mod normalize;
pub mod rle;
pub mod threshold;

pub use components::{ComponentFilter, MaskDecision};
pub use normalize::MaskNormalizer;
pub use rle::{decode_rle, encode_mask};
pub use threshold::{ThresholdDecider, decide_channels};
