//! Run configuration for the fold ensemble.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::decision::ClassDecisions;
use super::errors::{ConfigError, ConfigValidator};
use super::parallel::ParallelPolicy;
use crate::core::constants::{DEFAULT_CLASS_NAMES, DEFAULT_OUTPUT_SHAPE};

/// Where the decision rule is applied relative to fold averaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DecisionOrder {
    /// Decide every fold's map, then sum the binary votes.
    BeforeMean,
    /// Average the raw maps, then decide once.
    #[default]
    AfterMean,
}

/// Which checkpoint of each fold the inference collaborator should load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CheckpointKind {
    /// The last checkpoint written during training.
    #[default]
    Latest,
    /// The checkpoint with the best validation loss.
    BestLoss,
}

impl CheckpointKind {
    /// Checkpoint file name for a fold, e.g. `kfold_3_bestloss.pt`.
    pub fn file_name(&self, fold: u32) -> String {
        format!("kfold_{}_{}.pt", fold, self)
    }

    /// Returns true for [`CheckpointKind::BestLoss`].
    pub fn is_best(&self) -> bool {
        matches!(self, Self::BestLoss)
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointKind::Latest => write!(f, "latest"),
            CheckpointKind::BestLoss => write!(f, "bestloss"),
        }
    }
}

/// Complete configuration of an ensemble-and-decode run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Class names in channel order.
    #[serde(default = "EnsembleConfig::default_class_names")]
    pub class_names: Vec<String>,

    /// Canonical output resolution as (height, width).
    #[serde(default = "EnsembleConfig::default_output_shape")]
    pub output_shape: (usize, usize),

    /// Folds whose predictions are combined.
    pub folds: Vec<u32>,

    /// Whether decisions are applied before or after averaging.
    #[serde(default)]
    pub order: DecisionOrder,

    /// Skip every decision and keep the mean probability maps.
    #[serde(default)]
    pub persist_raw_means: bool,

    /// Per-class decision parameters.
    #[serde(default)]
    pub decisions: ClassDecisions,

    /// Minimum number of fold votes for a pixel to be encoded as foreground
    /// when decisions are applied before averaging.
    #[serde(default = "EnsembleConfig::default_min_votes")]
    pub min_votes: u16,

    /// Which checkpoint of each fold to load.
    #[serde(default)]
    pub checkpoint: CheckpointKind,

    /// Parallel finalization policy.
    #[serde(default)]
    pub parallel: ParallelPolicy,
}

impl EnsembleConfig {
    /// Creates a configuration for the given folds with default everything else.
    pub fn new(folds: Vec<u32>) -> Self {
        Self {
            folds,
            ..Self::default()
        }
    }

    /// Set the class names.
    pub fn with_class_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.class_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the output resolution as (height, width).
    pub fn with_output_shape(mut self, height: usize, width: usize) -> Self {
        self.output_shape = (height, width);
        self
    }

    /// Set the decision order.
    pub fn with_order(mut self, order: DecisionOrder) -> Self {
        self.order = order;
        self
    }

    /// Keep raw mean maps instead of deciding.
    pub fn with_raw_means(mut self, persist: bool) -> Self {
        self.persist_raw_means = persist;
        self
    }

    /// Set the per-class decision table.
    pub fn with_decisions(mut self, decisions: ClassDecisions) -> Self {
        self.decisions = decisions;
        self
    }

    /// Set the vote cut used for decide-before-mean output.
    pub fn with_min_votes(mut self, min_votes: u16) -> Self {
        self.min_votes = min_votes;
        self
    }

    /// Set the checkpoint kind.
    pub fn with_checkpoint(mut self, checkpoint: CheckpointKind) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Set the parallel policy.
    pub fn with_parallel(mut self, parallel: ParallelPolicy) -> Self {
        self.parallel = parallel;
        self
    }

    /// Number of classes (channels) per probability map.
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Fold list concatenated into one tag, e.g. `"0123"`, as used in artifact names.
    pub fn fold_tag(&self) -> String {
        self.folds.iter().map(|f| f.to_string()).collect()
    }

    fn default_class_names() -> Vec<String> {
        DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn default_output_shape() -> (usize, usize) {
        DEFAULT_OUTPUT_SHAPE
    }

    fn default_min_votes() -> u16 {
        1
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            class_names: Self::default_class_names(),
            output_shape: Self::default_output_shape(),
            folds: Vec::new(),
            order: DecisionOrder::default(),
            persist_raw_means: false,
            decisions: ClassDecisions::default(),
            min_votes: Self::default_min_votes(),
            checkpoint: CheckpointKind::default(),
            parallel: ParallelPolicy::default(),
        }
    }
}

impl ConfigValidator for EnsembleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.folds.is_empty() {
            return Err(ConfigError::EmptyFoldList);
        }
        let mut seen = HashSet::new();
        for &fold in &self.folds {
            if !seen.insert(fold) {
                return Err(ConfigError::DuplicateFold { fold });
            }
        }

        self.validate_positive_usize(self.class_names.len(), "class count")?;
        let mut names = HashSet::new();
        for name in &self.class_names {
            if name.is_empty() || !names.insert(name.as_str()) {
                return Err(ConfigError::InvalidConfig {
                    message: format!("class names must be unique and non-empty, got '{}'", name),
                });
            }
        }

        let (height, width) = self.output_shape;
        self.validate_positive_usize(height, "output height")?;
        self.validate_positive_usize(width, "output width")?;

        if !self.persist_raw_means {
            self.validate_class_table(
                self.decisions.len(),
                self.class_names.len(),
                "decision table",
            )?;
            self.decisions.validate()?;
        }

        if self.order == DecisionOrder::BeforeMean {
            self.validate_positive_usize(self.min_votes as usize, "min votes")?;
            if self.min_votes as usize > self.folds.len() {
                return Err(ConfigError::InvalidConfig {
                    message: format!(
                        "min votes {} exceeds the number of folds {}",
                        self.min_votes,
                        self.folds.len()
                    ),
                });
            }
        }

        if let Some(threads) = self.parallel.max_threads {
            self.validate_positive_usize(threads, "max threads")?;
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Parses a fold selection such as `"0123"` (one digit per fold) or `"0,1,12"`.
pub fn parse_fold_list(value: &str) -> Result<Vec<u32>, ConfigError> {
    let parse_err = |reason: String| ConfigError::Parse {
        field: "fold list".to_string(),
        value: value.to_string(),
        reason,
    };

    let trimmed = value.trim();
    let folds: Vec<u32> = if trimmed.contains(',') {
        trimmed
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u32>()
                    .map_err(|e| parse_err(format!("'{}': {}", part, e)))
            })
            .collect::<Result<_, _>>()?
    } else {
        trimmed
            .chars()
            .map(|c| {
                c.to_digit(10)
                    .ok_or_else(|| parse_err(format!("'{}' is not a digit", c)))
            })
            .collect::<Result<_, _>>()?
    };

    if folds.is_empty() {
        return Err(ConfigError::EmptyFoldList);
    }
    Ok(folds)
}

/// Parses a comma-separated per-class area list such as `"12800,8192,10113,10113"`.
///
/// Negative or non-numeric entries are rejected, as is a list whose length
/// differs from `num_classes`.
pub fn parse_min_areas(value: &str, num_classes: usize) -> Result<Vec<usize>, ConfigError> {
    let areas: Vec<usize> = value
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<usize>().map_err(|e| ConfigError::Parse {
                field: "minimum area".to_string(),
                value: part.to_string(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<_, _>>()?;

    if areas.len() != num_classes {
        return Err(ConfigError::ClassCountMismatch {
            table: "minimum area list".to_string(),
            expected: num_classes,
            actual: areas.len(),
        });
    }
    Ok(areas)
}
