//! Per-image running sums across folds.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use ndarray::Array3;

use crate::core::{SegError, SegResult};

/// Running elementwise sum for one image and the folds that contributed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorEntry<A> {
    /// Elementwise sum of every contribution, shape `(classes, height, width)`.
    pub sum: Array3<A>,
    /// Folds that contributed, in arrival order.
    pub folds: Vec<u32>,
}

impl<A> AccumulatorEntry<A> {
    /// Number of contributions summed so far.
    pub fn fold_count(&self) -> usize {
        self.folds.len()
    }
}

/// Running sums keyed by image identifier.
///
/// Entries for different images are independent. All contributions to one
/// image must share a shape and come from distinct folds.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator<A> {
    entries: BTreeMap<String, AccumulatorEntry<A>>,
}

impl<A> Accumulator<A>
where
    A: Clone + AddAssign<A>,
{
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Adds one fold's contribution for an image.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the contribution's shape differs from the
    /// running sum, and an invalid-input error if the fold already contributed
    /// to this image. The running sum is left untouched in both cases.
    pub fn add(&mut self, image_id: &str, fold: u32, contribution: Array3<A>) -> SegResult<()> {
        match self.entries.get_mut(image_id) {
            Some(entry) => {
                if entry.folds.contains(&fold) {
                    return Err(SegError::invalid_input(format!(
                        "fold {} already contributed to image '{}'",
                        fold, image_id
                    )));
                }
                if entry.sum.dim() != contribution.dim() {
                    return Err(SegError::shape(
                        format!("image '{}' accumulation", image_id),
                        entry.sum.shape(),
                        contribution.shape(),
                    ));
                }
                entry.sum += &contribution;
                entry.folds.push(fold);
            }
            None => {
                self.entries.insert(
                    image_id.to_string(),
                    AccumulatorEntry {
                        sum: contribution,
                        folds: vec![fold],
                    },
                );
            }
        }
        Ok(())
    }

    /// Drops the entry for an image, returning it if present.
    pub fn discard(&mut self, image_id: &str) -> Option<AccumulatorEntry<A>> {
        self.entries.remove(image_id)
    }

    /// Returns the entry for an image.
    pub fn get(&self, image_id: &str) -> Option<&AccumulatorEntry<A>> {
        self.entries.get(image_id)
    }

    /// Number of images with at least one contribution.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the accumulator, yielding entries ordered by image identifier.
    pub fn into_entries(self) -> Vec<(String, AccumulatorEntry<A>)> {
        self.entries.into_iter().collect()
    }
}

impl<A> Default for Accumulator<A>
where
    A: Clone + AddAssign<A>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sums_across_folds() {
        let mut acc = Accumulator::<f32>::new();
        acc.add("a", 0, Array3::from_elem((1, 2, 2), 0.25)).unwrap();
        acc.add("a", 1, Array3::from_elem((1, 2, 2), 0.5)).unwrap();
        acc.add("b", 0, Array3::from_elem((1, 2, 2), 1.0)).unwrap();

        assert_eq!(acc.len(), 2);
        let entry = acc.get("a").unwrap();
        assert_eq!(entry.fold_count(), 2);
        assert!(entry.sum.iter().all(|&v| (v - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_shape_mismatch_leaves_sum_untouched() {
        let mut acc = Accumulator::<u16>::new();
        acc.add("a", 0, Array3::from_elem((1, 2, 2), 1)).unwrap();
        let err = acc.add("a", 1, Array3::from_elem((1, 3, 2), 1)).unwrap_err();
        assert!(matches!(err, SegError::Shape { .. }));

        let entry = acc.get("a").unwrap();
        assert_eq!(entry.folds, vec![0]);
        assert!(entry.sum.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_duplicate_fold_rejected() {
        let mut acc = Accumulator::<u16>::new();
        acc.add("a", 3, Array3::zeros((1, 1, 1))).unwrap();
        assert!(acc.add("a", 3, Array3::zeros((1, 1, 1))).is_err());
    }

    #[test]
    fn test_entries_are_ordered_by_id() {
        let mut acc = Accumulator::<f32>::new();
        for id in ["c", "a", "b"] {
            acc.add(id, 0, Array3::zeros((1, 1, 1))).unwrap();
        }
        assert!(acc.discard("b").is_some());
        let ids: Vec<String> = acc.into_entries().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
