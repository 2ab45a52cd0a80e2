//! Fold-by-fold ensemble runs.
//!
//! The model itself stays behind [`FoldInference`]: the runner asks it to load
//! each fold's checkpoint in turn, streams the predicted batches into an
//! [`EnsembleAggregator`], and turns the finalized result into either a
//! submission table or the raw mean maps.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::ensemble::{EnsembleAggregator, EnsembleResult};
use super::persistence::RawMeans;
use super::submission::{SubmissionBuilder, SubmissionTable, SubmissionTemplate};
use crate::core::config::{CheckpointKind, EnsembleConfig};
use crate::core::{ProbabilityBatch, SegResult};

/// One batch of predictions for a fold.
#[derive(Debug, Clone)]
pub struct PredictionBatch {
    /// Image identifiers, one per batch entry.
    pub image_ids: Vec<String>,
    /// Probability maps, shape `(batch, classes, height, width)`.
    pub maps: ProbabilityBatch,
}

/// A model that produces per-fold probability maps.
pub trait FoldInference {
    /// Loads the checkpoint of one fold.
    fn load_fold(&mut self, fold: u32, checkpoint: CheckpointKind) -> SegResult<()>;

    /// Runs the loaded fold over the whole test set.
    fn predict(&mut self) -> SegResult<Vec<PredictionBatch>>;
}

/// What a run produced.
#[derive(Debug)]
pub enum RunOutput {
    /// Decided masks assembled into a submission.
    Submission(SubmissionTable),
    /// Undecided mean maps.
    RawMeans(RawMeans),
}

/// Drives an [`EnsembleAggregator`] from a [`FoldInference`] model.
#[derive(Debug, Clone)]
pub struct EnsembleRunner {
    config: EnsembleConfig,
}

impl EnsembleRunner {
    /// Creates a runner for a configuration.
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// The run configuration.
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Runs every configured fold and finalizes the ensemble.
    ///
    /// # Errors
    ///
    /// Returns the first configuration or inference error. Image-level errors
    /// are recorded in the result instead.
    pub fn accumulate<M: FoldInference>(&self, model: &mut M) -> SegResult<EnsembleResult> {
        let mut aggregator = EnsembleAggregator::new(self.config.clone())?;

        for &fold in &self.config.folds {
            let start = Instant::now();
            debug!("Loading fold {} ({})", fold, self.config.checkpoint.file_name(fold));
            model.load_fold(fold, self.config.checkpoint)?;

            let batches = model.predict()?;
            let mut accepted = 0usize;
            for batch in &batches {
                accepted += aggregator.add_batch(fold, &batch.image_ids, batch.maps.view())?;
            }
            info!(
                "Fold {}: {} maps from {} batches in {:.2}s",
                fold,
                accepted,
                batches.len(),
                start.elapsed().as_secs_f64()
            );
        }

        let result = aggregator.finalize();
        debug!("{}", result.stats);
        Ok(result)
    }

    /// Runs the ensemble and assembles its output.
    ///
    /// With raw means enabled the template is not consulted.
    pub fn run<M: FoldInference>(
        &self,
        model: &mut M,
        template: &SubmissionTemplate,
    ) -> SegResult<RunOutput> {
        let result = self.accumulate(model)?;
        for (image_id, error) in &result.rejected {
            warn!("Image '{}' left out of the ensemble: {}", image_id, error);
        }

        if self.config.persist_raw_means {
            return Ok(RunOutput::RawMeans(result.into_means()));
        }

        let predictions = result.into_class_predictions(self.config.min_votes)?;
        let table = SubmissionBuilder::new(self.config.class_names.iter().cloned())
            .build(template, &predictions)?;
        info!("Submission has {} rows, {} with masks", table.len(), table.non_empty());
        Ok(RunOutput::Submission(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SegError;
    use crate::core::config::{ClassDecisions, DecisionMode, DecisionOrder};
    use ndarray::Array4;
    use std::collections::HashMap;

    /// Serves fixed per-fold maps for two images.
    struct MockModel {
        loaded: Vec<(u32, CheckpointKind)>,
        current: Option<u32>,
        maps: HashMap<u32, Array4<f32>>,
        fail_on: Option<u32>,
    }

    impl MockModel {
        fn new(maps: HashMap<u32, Array4<f32>>) -> Self {
            Self {
                loaded: Vec::new(),
                current: None,
                maps,
                fail_on: None,
            }
        }
    }

    #[derive(Debug)]
    struct MockFailure;

    impl std::fmt::Display for MockFailure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "checkpoint missing")
        }
    }

    impl std::error::Error for MockFailure {}

    impl FoldInference for MockModel {
        fn load_fold(&mut self, fold: u32, checkpoint: CheckpointKind) -> SegResult<()> {
            if self.fail_on == Some(fold) {
                return Err(SegError::inference_error(MockFailure));
            }
            self.loaded.push((fold, checkpoint));
            self.current = Some(fold);
            Ok(())
        }

        fn predict(&mut self) -> SegResult<Vec<PredictionBatch>> {
            let fold = self
                .current
                .ok_or_else(|| SegError::invalid_input("no fold loaded"))?;
            let maps = self.maps[&fold].clone();
            Ok(vec![PredictionBatch {
                image_ids: vec!["a.jpg".to_string(), "b.jpg".to_string()],
                maps,
            }])
        }
    }

    fn config() -> EnsembleConfig {
        EnsembleConfig::new(vec![0, 1])
            .with_class_names(["Fish", "Sugar"])
            .with_output_shape(4, 4)
            .with_decisions(ClassDecisions::shared(0.6, 0.4, DecisionMode::Hysteresis, &[0, 0]))
    }

    fn maps() -> HashMap<u32, Array4<f32>> {
        // Image a: Fish high in fold 0 only. Image b: Sugar high everywhere.
        let mut fold0 = Array4::<f32>::zeros((2, 2, 4, 4));
        let mut fold1 = Array4::<f32>::zeros((2, 2, 4, 4));
        fold0.slice_mut(ndarray::s![0, 0, .., ..]).fill(0.9);
        fold0.slice_mut(ndarray::s![1, 1, .., ..]).fill(0.8);
        fold1.slice_mut(ndarray::s![1, 1, .., ..]).fill(0.8);
        HashMap::from([(0, fold0), (1, fold1)])
    }

    fn template() -> SubmissionTemplate {
        SubmissionTemplate::from_keys([
            "a.jpg_Fish",
            "a.jpg_Sugar",
            "b.jpg_Fish",
            "b.jpg_Sugar",
            "c.jpg_Fish",
        ])
    }

    #[test]
    fn test_after_mean_run() {
        let mut model = MockModel::new(maps());
        let runner = EnsembleRunner::new(config().with_checkpoint(CheckpointKind::BestLoss));
        let RunOutput::Submission(table) = runner.run(&mut model, &template()).unwrap() else {
            panic!("expected a submission");
        };

        assert_eq!(
            model.loaded,
            vec![(0, CheckpointKind::BestLoss), (1, CheckpointKind::BestLoss)]
        );
        assert_eq!(table.len(), 5);
        // Fish mean 0.45 never reaches the top threshold.
        assert_eq!(table.get("a.jpg_Fish"), Some(""));
        assert_eq!(table.get("b.jpg_Sugar"), Some("1 16"));
        assert_eq!(table.get("c.jpg_Fish"), Some(""));
    }

    #[test]
    fn test_before_mean_run_uses_vote_cut() {
        let mut model = MockModel::new(maps());
        let runner = EnsembleRunner::new(config().with_order(DecisionOrder::BeforeMean));
        let RunOutput::Submission(table) = runner.run(&mut model, &template()).unwrap() else {
            panic!("expected a submission");
        };
        // One vote out of two is enough with the default cut.
        assert_eq!(table.get("a.jpg_Fish"), Some("1 16"));

        let mut model = MockModel::new(maps());
        let runner = EnsembleRunner::new(
            config()
                .with_order(DecisionOrder::BeforeMean)
                .with_min_votes(2),
        );
        let RunOutput::Submission(table) = runner.run(&mut model, &template()).unwrap() else {
            panic!("expected a submission");
        };
        assert_eq!(table.get("a.jpg_Fish"), Some(""));
        assert_eq!(table.get("b.jpg_Sugar"), Some("1 16"));
    }

    #[test]
    fn test_raw_means_run() {
        let mut model = MockModel::new(maps());
        let runner = EnsembleRunner::new(config().with_raw_means(true));
        let RunOutput::RawMeans(means) = runner.run(&mut model, &template()).unwrap() else {
            panic!("expected raw means");
        };
        assert_eq!(means.len(), 2);
        assert!((means["a.jpg"][[0, 0, 0]] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_inference_failure_aborts() {
        let mut model = MockModel::new(maps());
        model.fail_on = Some(1);
        let err = EnsembleRunner::new(config())
            .run(&mut model, &template())
            .unwrap_err();
        assert!(matches!(err, SegError::Inference(_)));
    }
}
