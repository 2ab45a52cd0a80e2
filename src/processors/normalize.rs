//! Resolution normalization for probability maps.
//!
//! Different inference configurations may return maps at a resolution other
//! than the canonical submission resolution. Every channel is resampled
//! independently so that all later stages see one fixed shape.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::core::{ProbabilityMap, SegError, SegResult};

/// Brings probability maps to a fixed `(classes, height, width)` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskNormalizer {
    /// Expected number of channels.
    pub num_classes: usize,
    /// Target height.
    pub height: usize,
    /// Target width.
    pub width: usize,
}

impl MaskNormalizer {
    /// Creates a normalizer for the given class count and target resolution.
    pub fn new(num_classes: usize, height: usize, width: usize) -> Self {
        Self {
            num_classes,
            height,
            width,
        }
    }

    /// Target shape as `[classes, height, width]`.
    pub fn target_shape(&self) -> [usize; 3] {
        [self.num_classes, self.height, self.width]
    }

    /// Normalizes one probability map.
    ///
    /// A map already at the target resolution is copied unchanged; otherwise
    /// each channel is resampled with bilinear interpolation.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the channel count differs from `num_classes`
    /// or if either spatial dimension of the input is zero.
    pub fn normalize(&self, map: ArrayView3<'_, f32>) -> SegResult<ProbabilityMap> {
        let (channels, src_h, src_w) = map.dim();
        if channels != self.num_classes {
            return Err(SegError::shape(
                "probability map channels",
                self.target_shape(),
                [channels, src_h, src_w],
            ));
        }
        if src_h == 0 || src_w == 0 {
            return Err(SegError::shape(
                "probability map resolution",
                self.target_shape(),
                [channels, src_h, src_w],
            ));
        }

        if (src_h, src_w) == (self.height, self.width) {
            return Ok(map.to_owned());
        }

        tracing::trace!(
            "Resizing probability map from {}x{} to {}x{}",
            src_h,
            src_w,
            self.height,
            self.width
        );

        let mut resized = Array3::<f32>::zeros((channels, self.height, self.width));
        for (ch, mut out) in resized.axis_iter_mut(Axis(0)).enumerate() {
            out.assign(&resize_channel(
                map.index_axis(Axis(0), ch),
                self.height,
                self.width,
            ));
        }
        Ok(resized)
    }
}

/// Resamples one channel with bilinear interpolation on pixel centers.
///
/// Each output pixel samples the source at `(x + 0.5) * src_w / width - 0.5`
/// (and likewise for rows), clamped to the source grid, and blends the four
/// surrounding source pixels. Unlike a filtering resize this never widens
/// the kernel when shrinking.
fn resize_channel(channel: ArrayView2<'_, f32>, height: usize, width: usize) -> Array2<f32> {
    let (src_h, src_w) = channel.dim();
    let rows = sample_positions(src_h, height);
    let cols = sample_positions(src_w, width);

    Array2::from_shape_fn((height, width), |(y, x)| {
        let (y0, y1, wy) = rows[y];
        let (x0, x1, wx) = cols[x];
        let top = channel[[y0, x0]] * (1.0 - wx) + channel[[y0, x1]] * wx;
        let bottom = channel[[y1, x0]] * (1.0 - wx) + channel[[y1, x1]] * wx;
        top * (1.0 - wy) + bottom * wy
    })
}

/// Source neighbours and blend weight for every output coordinate on one axis.
fn sample_positions(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = src_len as f32 / dst_len as f32;
    let last = src_len - 1;
    (0..dst_len)
        .map(|i| {
            let pos = ((i as f32 + 0.5) * scale - 0.5).clamp(0.0, last as f32);
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(last);
            (lo, hi, pos - lo as f32)
        })
        .collect()
}
