//! Connected-component labelling and area filtering for binary masks.
//!
//! Components are 8-connected. Labelling goes through `imageproc`, so the mask
//! is converted to a [`GrayImage`] first.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use ndarray::{Array2, ArrayView2};

use crate::core::BinaryMask;

/// A binary mask together with the number of components it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskDecision {
    /// The decided mask, every element 0 or 1.
    pub mask: BinaryMask,
    /// Number of connected components retained in `mask`.
    pub components: usize,
}

impl MaskDecision {
    /// An all-background decision of the given shape.
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            mask: Array2::zeros((height, width)),
            components: 0,
        }
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> usize {
        self.mask.iter().filter(|&&v| v != 0).count()
    }
}

/// Component labels of a mask, row-major, `0` for background.
pub(crate) struct ComponentLabels {
    labels: Vec<u32>,
    areas: Vec<usize>,
    height: usize,
    width: usize,
}

impl ComponentLabels {
    /// Labels the 8-connected components of all non-zero pixels.
    pub(crate) fn label(mask: ArrayView2<'_, u8>) -> Self {
        let (height, width) = mask.dim();
        if height == 0 || width == 0 {
            return Self {
                labels: Vec::new(),
                areas: vec![0],
                height,
                width,
            };
        }

        let gray_img = GrayImage::from_fn(width as u32, height as u32, |x, y| {
            let pixel_value = if mask[[y as usize, x as usize]] != 0 {
                255
            } else {
                0
            };
            Luma([pixel_value])
        });

        let labels = connected_components(&gray_img, Connectivity::Eight, Luma([0u8])).into_raw();
        let max_label = labels.iter().copied().max().unwrap_or(0) as usize;
        let mut areas = vec![0usize; max_label + 1];
        for &label in &labels {
            if label != 0 {
                areas[label as usize] += 1;
            }
        }

        Self {
            labels,
            areas,
            height,
            width,
        }
    }

    /// Label at `(y, x)`.
    pub(crate) fn at(&self, y: usize, x: usize) -> u32 {
        self.labels[y * self.width + x]
    }

    /// Pixel count of a label.
    pub(crate) fn area(&self, label: u32) -> usize {
        self.areas.get(label as usize).copied().unwrap_or(0)
    }

    /// Number of label slots, including the background slot `0`.
    pub(crate) fn slots(&self) -> usize {
        self.areas.len()
    }

    /// Renders the components accepted by `keep` into a binary mask.
    pub(crate) fn render(&self, keep: impl Fn(u32) -> bool) -> MaskDecision {
        let kept: Vec<bool> = (0..self.slots() as u32)
            .map(|label| label != 0 && self.area(label) > 0 && keep(label))
            .collect();
        let components = kept.iter().filter(|&&k| k).count();

        let mask = Array2::from_shape_fn((self.height, self.width), |(y, x)| {
            u8::from(kept[self.at(y, x) as usize])
        });

        MaskDecision { mask, components }
    }
}

/// Removes connected components smaller than a minimum area.
///
/// Whether a component survives depends only on its own pixel count, so the
/// result does not depend on the order in which components are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentFilter {
    /// Components with strictly fewer pixels than this are removed.
    pub min_area: usize,
}

impl ComponentFilter {
    /// Creates a filter with the given minimum area.
    pub fn new(min_area: usize) -> Self {
        Self { min_area }
    }

    /// Applies the filter.
    ///
    /// Any non-zero input value counts as foreground; the output mask is
    /// strictly 0/1. A minimum area of 0 keeps every component.
    pub fn apply(&self, mask: ArrayView2<'_, u8>) -> MaskDecision {
        let labels = ComponentLabels::label(mask);
        labels.render(|label| labels.area(label) >= self.min_area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_diagonal_pixels_are_one_component() {
        let mask = array![[1u8, 0, 0], [0, 1, 0], [0, 0, 1]];
        let result = ComponentFilter::new(0).apply(mask.view());
        assert_eq!(result.components, 1);
        assert_eq!(result.mask, mask);
    }

    #[test]
    fn test_small_components_removed() {
        let mask = array![
            [1u8, 1, 0, 0, 0],
            [1, 1, 0, 0, 1],
            [0, 0, 0, 0, 0],
            [0, 0, 0, 1, 1],
        ];
        let result = ComponentFilter::new(2).apply(mask.view());
        assert_eq!(result.components, 2);
        assert_eq!(
            result.mask,
            array![
                [1u8, 1, 0, 0, 0],
                [1, 1, 0, 0, 0],
                [0, 0, 0, 0, 0],
                [0, 0, 0, 1, 1],
            ]
        );

        let result = ComponentFilter::new(4).apply(mask.view());
        assert_eq!(result.components, 1);
        assert_eq!(result.area(), 4);

        let result = ComponentFilter::new(5).apply(mask.view());
        assert_eq!(result, MaskDecision::empty(4, 5));
    }

    #[test]
    fn test_all_zero_mask() {
        let mask = Array2::<u8>::zeros((6, 7));
        let result = ComponentFilter::new(3).apply(mask.view());
        assert_eq!(result.components, 0);
        assert_eq!(result.mask, mask);
    }

    #[test]
    fn test_zero_min_area_is_noop() {
        let mask = array![[1u8, 0, 1], [0, 0, 0], [1, 0, 0]];
        let result = ComponentFilter::new(0).apply(mask.view());
        assert_eq!(result.mask, mask);
        assert_eq!(result.components, 3);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let mask = array![
            [1u8, 1, 1, 0, 0, 0],
            [0, 0, 1, 0, 1, 0],
            [0, 0, 0, 0, 1, 0],
            [1, 0, 0, 0, 0, 0],
        ];
        let filter = ComponentFilter::new(3);
        let once = filter.apply(mask.view());
        let twice = filter.apply(once.mask.view());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_binary_input_is_normalized() {
        let mask = array![[2u8, 7], [0, 0]];
        let result = ComponentFilter::new(0).apply(mask.view());
        assert_eq!(result.mask, array![[1u8, 1], [0, 0]]);
    }

    #[test]
    fn test_empty_shape() {
        let mask = Array2::<u8>::zeros((0, 4));
        let result = ComponentFilter::new(1).apply(mask.view());
        assert_eq!(result.mask.dim(), (0, 4));
        assert_eq!(result.components, 0);
    }
}
