//! Fold ensemble aggregation.
//!
//! The [`EnsembleAggregator`] consumes one probability map per image per fold,
//! normalizes it to the output resolution, and folds it into a per-image
//! running sum. Depending on [`DecisionOrder`], the decision rule runs on every
//! fold's map before summation (producing a vote map) or once on the mean map
//! after all folds have been seen. With raw means enabled no decision runs and
//! the mean probability maps are returned for persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use ndarray::{Array3, ArrayView3, ArrayView4, Axis};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::accumulator::{Accumulator, AccumulatorEntry};
use super::stats::EnsembleStats;
use super::submission::ClassPrediction;
use crate::core::config::{ConfigValidatorExt, DecisionOrder, EnsembleConfig};
use crate::core::{ProbabilityMap, SegError, SegResult, VoteMap};
use crate::processors::{MaskNormalizer, decide_channels};

/// The finalized prediction for one image.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizedPrediction {
    /// Masks decided once on the mean map, shape `(classes, height, width)`.
    Masks(Array3<u8>),
    /// Summed per-fold decisions; each pixel holds the number of agreeing folds.
    Votes {
        /// Vote counts, shape `(classes, height, width)`.
        votes: VoteMap,
        /// Number of folds that voted.
        folds: usize,
    },
    /// Undecided mean probabilities.
    Mean(ProbabilityMap),
}

impl FinalizedPrediction {
    /// Binary masks for encoding.
    ///
    /// Vote maps are cut at `min_votes`: a pixel is foreground when at least
    /// that many folds decided it was. Returns `None` for undecided means.
    pub fn masks(&self, min_votes: u16) -> Option<Array3<u8>> {
        match self {
            Self::Masks(masks) => Some(masks.clone()),
            Self::Votes { votes, .. } => Some(votes.mapv(|v| u8::from(v >= min_votes))),
            Self::Mean(_) => None,
        }
    }

    /// Shape as `(classes, height, width)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::Masks(masks) => masks.dim(),
            Self::Votes { votes, .. } => votes.dim(),
            Self::Mean(mean) => mean.dim(),
        }
    }
}

/// Output of [`EnsembleAggregator::finalize`].
#[derive(Debug)]
pub struct EnsembleResult {
    /// Finalized predictions keyed by image identifier.
    pub predictions: BTreeMap<String, FinalizedPrediction>,
    /// Images dropped because of shape, fold or input errors, with the cause.
    pub rejected: BTreeMap<String, SegError>,
    /// Run statistics.
    pub stats: EnsembleStats,
}

impl EnsembleResult {
    /// Converts decided predictions into per-class masks for the submission builder.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error if the run kept raw means.
    pub fn into_class_predictions(
        self,
        min_votes: u16,
    ) -> SegResult<HashMap<String, Vec<ClassPrediction>>> {
        self.predictions
            .into_iter()
            .map(|(image_id, prediction)| {
                let masks = prediction.masks(min_votes).ok_or_else(|| {
                    SegError::invalid_input(format!(
                        "image '{}' holds raw mean probabilities, not decided masks",
                        image_id
                    ))
                })?;
                let per_class = masks
                    .outer_iter()
                    .map(|mask| ClassPrediction::Mask(mask.to_owned()))
                    .collect();
                Ok((image_id, per_class))
            })
            .collect()
    }

    /// Extracts the mean probability maps of a raw-means run.
    ///
    /// Decided predictions are skipped.
    pub fn into_means(self) -> BTreeMap<String, ProbabilityMap> {
        self.predictions
            .into_iter()
            .filter_map(|(image_id, prediction)| match prediction {
                FinalizedPrediction::Mean(mean) => Some((image_id, mean)),
                _ => None,
            })
            .collect()
    }
}

/// Accumulated state; summed values are probabilities or fold votes.
#[derive(Debug)]
enum AccumulatorState {
    Probabilities(Accumulator<f32>),
    Votes(Accumulator<u16>),
}

impl AccumulatorState {
    fn discard(&mut self, image_id: &str) {
        match self {
            Self::Probabilities(acc) => {
                acc.discard(image_id);
            }
            Self::Votes(acc) => {
                acc.discard(image_id);
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Probabilities(acc) => acc.len(),
            Self::Votes(acc) => acc.len(),
        }
    }
}

/// Combines per-fold probability maps into one prediction per image.
///
/// The aggregator owns its accumulator; it is built fresh for each run and
/// consumed by [`finalize`](Self::finalize).
#[derive(Debug)]
pub struct EnsembleAggregator {
    config: EnsembleConfig,
    normalizer: MaskNormalizer,
    state: AccumulatorState,
    rejected: BTreeMap<String, SegError>,
    folds_seen: BTreeSet<u32>,
    stats: EnsembleStats,
}

impl EnsembleAggregator {
    /// Creates an aggregator after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns a parameter error if the configuration is invalid.
    pub fn new(config: EnsembleConfig) -> SegResult<Self> {
        let config = config.validated()?;
        let (height, width) = config.output_shape;
        let normalizer = MaskNormalizer::new(config.num_classes(), height, width);
        let state = if config.order == DecisionOrder::BeforeMean && !config.persist_raw_means {
            AccumulatorState::Votes(Accumulator::new())
        } else {
            AccumulatorState::Probabilities(Accumulator::new())
        };

        debug!(
            "Ensemble over folds {:?}, order {:?}, raw means {}",
            config.folds, config.order, config.persist_raw_means
        );

        Ok(Self {
            config,
            normalizer,
            state,
            rejected: BTreeMap::new(),
            folds_seen: BTreeSet::new(),
            stats: EnsembleStats::new(),
        })
    }

    /// The run configuration.
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Number of images with an open accumulator entry.
    pub fn pending_images(&self) -> usize {
        self.state.len()
    }

    /// Returns true if the image was rejected by an earlier error.
    pub fn is_rejected(&self, image_id: &str) -> bool {
        self.rejected.contains_key(image_id)
    }

    /// Adds one fold's probability map for an image.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error if `fold` is not part of the configured
    /// fold list. Shape errors and repeated folds reject the image: its entry
    /// is discarded, later maps for it are ignored, and the error is returned.
    pub fn add(&mut self, fold: u32, image_id: &str, map: ArrayView3<'_, f32>) -> SegResult<()> {
        self.check_fold(fold)?;
        if self.rejected.contains_key(image_id) {
            debug!("Ignoring fold {} map for rejected image '{}'", fold, image_id);
            return Ok(());
        }

        match self.accumulate(fold, image_id, map) {
            Ok(()) => {
                self.folds_seen.insert(fold);
                self.stats.maps_added += 1;
                Ok(())
            }
            Err(e) => {
                let e = e.for_image(image_id);
                warn!("Rejecting image '{}': {}", image_id, e);
                self.state.discard(image_id);
                let returned = e.duplicate();
                self.rejected.insert(image_id.to_string(), e);
                Err(returned)
            }
        }
    }

    /// Adds a batch of maps, shape `(batch, classes, height, width)`, for one fold.
    ///
    /// Image-level failures reject only the affected images and are logged;
    /// the rest of the batch is still accumulated. Returns the number of maps
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the batch size differs from the number of
    /// identifiers, and an invalid-input error for an unknown fold.
    pub fn add_batch(
        &mut self,
        fold: u32,
        image_ids: &[String],
        batch: ArrayView4<'_, f32>,
    ) -> SegResult<usize> {
        self.check_fold(fold)?;
        let batch_size = batch.len_of(Axis(0));
        if batch_size != image_ids.len() {
            return Err(SegError::shape(
                format!("fold {} batch", fold),
                image_ids.len(),
                batch_size,
            ));
        }

        let mut accepted = 0;
        for (image_id, map) in image_ids.iter().zip(batch.outer_iter()) {
            if self.rejected.contains_key(image_id.as_str()) {
                continue;
            }
            if self.add(fold, image_id, map).is_ok() {
                accepted += 1;
            }
        }
        debug!("Fold {}: accumulated {}/{} maps", fold, accepted, batch_size);
        Ok(accepted)
    }

    /// Finalizes every image.
    ///
    /// Images whose fold set differs from the configuration are rejected with
    /// a fold-count error rather than averaged over fewer folds.
    pub fn finalize(self) -> EnsembleResult {
        let start = Instant::now();
        let Self {
            config,
            state,
            mut rejected,
            folds_seen,
            mut stats,
            ..
        } = self;

        let expected = config.folds.len();
        let policy = config.parallel.clone();

        let results: Vec<(String, SegResult<FinalizedPrediction>)> = match state {
            AccumulatorState::Probabilities(acc) => {
                let entries = acc.into_entries();
                let finalize = |(image_id, entry): (String, AccumulatorEntry<f32>)| {
                    let result = finalize_mean(&config, &image_id, entry, expected);
                    (image_id, result)
                };
                if policy.use_parallel(entries.len()) {
                    debug!("Finalizing {} images in parallel", entries.len());
                    policy.install(|| entries.into_par_iter().map(finalize).collect())
                } else {
                    entries.into_iter().map(finalize).collect()
                }
            }
            AccumulatorState::Votes(acc) => acc
                .into_entries()
                .into_iter()
                .map(|(image_id, entry)| {
                    let result = finalize_votes(&image_id, entry, expected);
                    (image_id, result)
                })
                .collect(),
        };

        let mut predictions = BTreeMap::new();
        for (image_id, result) in results {
            match result {
                Ok(prediction) => {
                    predictions.insert(image_id, prediction);
                }
                Err(e) => {
                    warn!("Rejecting image '{}': {}", image_id, e);
                    rejected.insert(image_id, e);
                }
            }
        }

        stats.folds_seen = folds_seen.len();
        stats.images_finalized = predictions.len();
        stats.images_rejected = rejected.len();
        stats.finalize_time = start.elapsed();
        info!(
            "Finalized {} images from {} folds ({} rejected)",
            stats.images_finalized, stats.folds_seen, stats.images_rejected
        );

        EnsembleResult {
            predictions,
            rejected,
            stats,
        }
    }

    fn check_fold(&self, fold: u32) -> SegResult<()> {
        if self.config.folds.contains(&fold) {
            Ok(())
        } else {
            Err(SegError::invalid_input(format!(
                "fold {} is not in the configured fold list {:?}",
                fold, self.config.folds
            )))
        }
    }

    fn accumulate(&mut self, fold: u32, image_id: &str, map: ArrayView3<'_, f32>) -> SegResult<()> {
        let (_, height, width) = map.dim();
        let normalized = self.normalizer.normalize(map)?;
        if (height, width) != (self.normalizer.height, self.normalizer.width) {
            self.stats.maps_resized += 1;
        }

        match &mut self.state {
            AccumulatorState::Probabilities(acc) => acc.add(image_id, fold, normalized),
            AccumulatorState::Votes(acc) => {
                let (masks, _) = decide_channels(normalized.view(), &self.config.decisions)?;
                acc.add(image_id, fold, masks.mapv(u16::from))
            }
        }
    }
}

fn check_fold_count(image_id: &str, actual: usize, expected: usize) -> SegResult<()> {
    if actual != expected {
        return Err(SegError::FoldCount {
            image_id: image_id.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn finalize_mean(
    config: &EnsembleConfig,
    image_id: &str,
    entry: AccumulatorEntry<f32>,
    expected: usize,
) -> SegResult<FinalizedPrediction> {
    check_fold_count(image_id, entry.fold_count(), expected)?;
    let num_folds = entry.fold_count() as f32;
    let mean = entry.sum.mapv_into(|v| v / num_folds);

    if config.persist_raw_means {
        return Ok(FinalizedPrediction::Mean(mean));
    }

    let (masks, components) =
        decide_channels(mean.view(), &config.decisions).map_err(|e| e.for_image(image_id))?;
    tracing::trace!("Image '{}' components per class: {:?}", image_id, components);
    Ok(FinalizedPrediction::Masks(masks))
}

fn finalize_votes(
    image_id: &str,
    entry: AccumulatorEntry<u16>,
    expected: usize,
) -> SegResult<FinalizedPrediction> {
    check_fold_count(image_id, entry.fold_count(), expected)?;
    let folds = entry.fold_count();
    Ok(FinalizedPrediction::Votes {
        votes: entry.sum,
        folds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ClassDecisions, DecisionMode, ParallelPolicy};
    use ndarray::Array4;

    fn config(folds: Vec<u32>, order: DecisionOrder) -> EnsembleConfig {
        EnsembleConfig::new(folds)
            .with_class_names(["fish"])
            .with_output_shape(5, 5)
            .with_order(order)
            .with_decisions(ClassDecisions::shared(0.5, 0.5, DecisionMode::Hysteresis, &[0]))
    }

    fn aggregator(folds: Vec<u32>, order: DecisionOrder) -> EnsembleAggregator {
        EnsembleAggregator::new(config(folds, order)).unwrap()
    }

    fn uniform(value: f32) -> Array3<f32> {
        Array3::from_elem((1, 5, 5), value)
    }

    #[test]
    fn test_two_fold_scenario_both_orders() {
        let mut before = aggregator(vec![0, 1], DecisionOrder::BeforeMean);
        let mut after = aggregator(vec![0, 1], DecisionOrder::AfterMean);
        for fold in [0, 1] {
            before.add(fold, "img", uniform(0.7).view()).unwrap();
            after.add(fold, "img", uniform(0.7).view()).unwrap();
        }

        let before = before.finalize();
        match &before.predictions["img"] {
            FinalizedPrediction::Votes { votes, folds } => {
                assert_eq!(*folds, 2);
                assert!(votes.iter().all(|&v| v == 2));
            }
            other => panic!("expected votes, got {:?}", other),
        }

        let after = after.finalize();
        let after_masks = after.predictions["img"].masks(1).unwrap();
        assert!(after_masks.iter().all(|&v| v == 1));
        assert_eq!(before.predictions["img"].masks(2).unwrap(), after_masks);
    }

    #[test]
    fn test_identical_maps_agree_for_any_fold_count() {
        let map = Array3::from_shape_fn((1, 5, 5), |(_, y, x)| {
            if (1..4).contains(&y) && x < 3 { 0.8 } else { 0.1 }
        });
        for n in 1..=4u32 {
            let folds: Vec<u32> = (0..n).collect();
            let mut before = aggregator(folds.clone(), DecisionOrder::BeforeMean);
            let mut after = aggregator(folds.clone(), DecisionOrder::AfterMean);
            for &fold in &folds {
                before.add(fold, "img", map.view()).unwrap();
                after.add(fold, "img", map.view()).unwrap();
            }
            let unanimous = before.finalize().predictions["img"].masks(n as u16).unwrap();
            let decided = after.finalize().predictions["img"].masks(1).unwrap();
            assert_eq!(unanimous, decided, "{} folds", n);
            assert_eq!(decided.iter().filter(|&&v| v == 1).count(), 9);
        }
    }

    #[test]
    fn test_partial_votes_are_preserved() {
        let mut agg = aggregator(vec![0, 1], DecisionOrder::BeforeMean);
        agg.add(0, "img", uniform(0.9).view()).unwrap();
        agg.add(1, "img", uniform(0.1).view()).unwrap();
        let result = agg.finalize();
        let prediction = &result.predictions["img"];
        match prediction {
            FinalizedPrediction::Votes { votes, .. } => assert!(votes.iter().all(|&v| v == 1)),
            other => panic!("expected votes, got {:?}", other),
        }
        assert!(prediction.masks(1).unwrap().iter().all(|&v| v == 1));
        assert!(prediction.masks(2).unwrap().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_raw_means_skip_decisions() {
        let cfg = config(vec![0, 1], DecisionOrder::BeforeMean).with_raw_means(true);
        let mut agg = EnsembleAggregator::new(cfg).unwrap();
        agg.add(0, "img", uniform(0.2).view()).unwrap();
        agg.add(1, "img", uniform(0.6).view()).unwrap();
        let result = agg.finalize();
        assert_eq!(result.predictions["img"].masks(1), None);

        let means = result.into_means();
        assert!(means["img"].iter().all(|&v| (v - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_missing_fold_is_flagged_not_diluted() {
        let mut agg = aggregator(vec![0, 1], DecisionOrder::AfterMean);
        agg.add(0, "full", uniform(0.7).view()).unwrap();
        agg.add(1, "full", uniform(0.7).view()).unwrap();
        agg.add(0, "partial", uniform(0.7).view()).unwrap();

        let result = agg.finalize();
        assert!(result.predictions.contains_key("full"));
        assert!(matches!(
            result.rejected.get("partial"),
            Some(SegError::FoldCount { expected: 2, actual: 1, .. })
        ));
        assert_eq!(result.stats.images_rejected, 1);
    }

    #[test]
    fn test_unknown_fold_is_an_error() {
        let mut agg = aggregator(vec![0], DecisionOrder::AfterMean);
        assert!(agg.add(5, "img", uniform(0.7).view()).is_err());
        assert_eq!(agg.pending_images(), 0);
        assert!(!agg.is_rejected("img"));
    }

    #[test]
    fn test_shape_error_rejects_image() {
        let mut agg = aggregator(vec![0, 1], DecisionOrder::AfterMean);
        agg.add(0, "img", uniform(0.7).view()).unwrap();
        let wrong_channels = Array3::<f32>::zeros((2, 5, 5));
        let err = agg.add(1, "img", wrong_channels.view()).unwrap_err();
        assert!(matches!(err, SegError::Shape { .. }));
        assert!(err.to_string().contains("image 'img'"));
        assert!(agg.is_rejected("img"));
        assert_eq!(agg.pending_images(), 0);

        let result = agg.finalize();
        assert!(result.predictions.is_empty());
        assert!(matches!(result.rejected["img"], SegError::Shape { .. }));
    }

    #[test]
    fn test_add_batch_resizes_and_counts() {
        let mut agg = aggregator(vec![0], DecisionOrder::AfterMean);
        let batch = Array4::<f32>::from_elem((3, 1, 10, 10), 0.9);
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(agg.add_batch(0, &ids, batch.view()).unwrap(), 3);

        let result = agg.finalize();
        assert_eq!(result.stats.maps_added, 3);
        assert_eq!(result.stats.maps_resized, 3);
        for id in &ids {
            assert_eq!(result.predictions[id].dim(), (1, 5, 5));
        }
    }

    #[test]
    fn test_batch_rejection_keeps_error_kind() {
        let mut agg = aggregator(vec![0], DecisionOrder::AfterMean);
        let batch = Array4::<f32>::zeros((1, 2, 5, 5));
        let ids = vec!["img".to_string()];
        assert_eq!(agg.add_batch(0, &ids, batch.view()).unwrap(), 0);

        let result = agg.finalize();
        assert!(matches!(result.rejected["img"], SegError::Shape { .. }));
        assert!(result.rejected["img"].to_string().contains("image 'img'"));
    }

    #[test]
    fn test_duplicate_fold_rejection_is_reported() {
        let mut agg = aggregator(vec![0, 1], DecisionOrder::AfterMean);
        agg.add(0, "img", uniform(0.7).view()).unwrap();
        let err = agg.add(0, "img", uniform(0.7).view()).unwrap_err();
        assert!(matches!(err, SegError::InvalidInput { .. }));

        let result = agg.finalize();
        assert!(matches!(result.rejected["img"], SegError::InvalidInput { .. }));
        assert!(result.rejected["img"].to_string().contains("already contributed"));
    }

    #[test]
    fn test_add_batch_rejects_size_mismatch() {
        let mut agg = aggregator(vec![0], DecisionOrder::AfterMean);
        let batch = Array4::<f32>::zeros((2, 1, 5, 5));
        let ids = vec!["a".to_string()];
        assert!(matches!(
            agg.add_batch(0, &ids, batch.view()),
            Err(SegError::Shape { .. })
        ));
    }

    #[test]
    fn test_parallel_finalize_matches_sequential() {
        let build = |threshold: usize| {
            let cfg = config(vec![0, 1], DecisionOrder::AfterMean)
                .with_parallel(ParallelPolicy::new().with_image_threshold(threshold));
            let mut agg = EnsembleAggregator::new(cfg).unwrap();
            for i in 0..8 {
                let id = format!("img{}", i);
                agg.add(0, &id, uniform(0.1 * i as f32).view()).unwrap();
                agg.add(1, &id, uniform(0.05 * i as f32).view()).unwrap();
            }
            agg.finalize().predictions
        };
        assert_eq!(build(0), build(100));
    }

    #[test]
    fn test_invalid_config_is_parameter_error() {
        let err = EnsembleAggregator::new(config(vec![], DecisionOrder::AfterMean)).unwrap_err();
        assert!(err.is_parameter_error());
    }

    #[test]
    fn test_into_class_predictions() {
        let mut agg = aggregator(vec![0], DecisionOrder::AfterMean);
        agg.add(0, "img", uniform(0.9).view()).unwrap();
        let predictions = agg.finalize().into_class_predictions(1).unwrap();
        assert_eq!(predictions["img"].len(), 1);
    }
}
