//! Constants used throughout the pipeline.
//!
//! Default decision parameters, the canonical submission resolution, and the
//! column names of the submission table.

/// The default top (seed) threshold of the dual-threshold decision.
pub const DEFAULT_TOP_THRESHOLD: f32 = 0.6;

/// The default bottom (extent) threshold of the dual-threshold decision.
pub const DEFAULT_BOTTOM_THRESHOLD: f32 = 0.4;

/// The default cutoff used by the post-process-only decision mode.
pub const DEFAULT_POSTPROCESS_THRESHOLD: f32 = 0.5;

/// The default class names, in channel order.
pub const DEFAULT_CLASS_NAMES: [&str; 4] = ["Fish", "Flower", "Gravel", "Sugar"];

/// The default minimum component area per class, in pixels, in channel order.
pub const DEFAULT_MIN_AREAS: [usize; 4] = [12800, 8192, 10113, 10113];

/// The canonical submission resolution as (height, width).
pub const DEFAULT_OUTPUT_SHAPE: (usize, usize) = (350, 525);

/// The default threshold for parallel finalization.
///
/// Finalization runs on the rayon pool once the number of accumulated images
/// exceeds this value.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4;

/// Name of the composite key column in the submission table.
pub const KEY_COLUMN: &str = "Image_Label";

/// Name of the run-length column in the submission table.
pub const RLE_COLUMN: &str = "EncodedPixels";
