//! Decision parameters for turning probability channels into binary masks.

use serde::{Deserialize, Serialize};

use super::errors::{ConfigError, ConfigValidator};
use crate::core::constants::{
    DEFAULT_BOTTOM_THRESHOLD, DEFAULT_MIN_AREAS, DEFAULT_POSTPROCESS_THRESHOLD,
    DEFAULT_TOP_THRESHOLD,
};

/// Selects how a probability channel is turned into a mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum DecisionMode {
    /// Dual-threshold hysteresis: regions are seeded at `top` and grown to `bottom`.
    #[default]
    Hysteresis,
    /// Single cutoff followed by area filtering only.
    PostProcess {
        /// Probability cutoff, independent of `top` and `bottom`.
        threshold: f32,
    },
}

impl DecisionMode {
    /// Post-process mode with the default cutoff.
    pub fn post_process() -> Self {
        Self::PostProcess {
            threshold: DEFAULT_POSTPROCESS_THRESHOLD,
        }
    }
}

/// Decision parameters for one class channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionParameters {
    /// Seed threshold; a region needs at least one pixel at or above it.
    pub top: f32,
    /// Extent threshold; region boundaries are drawn at this value.
    pub bottom: f32,
    /// Components with fewer pixels than this are removed.
    pub min_area: usize,
    /// Which decision rule to apply.
    #[serde(default)]
    pub mode: DecisionMode,
}

impl DecisionParameters {
    /// Creates hysteresis parameters.
    pub fn new(top: f32, bottom: f32, min_area: usize) -> Self {
        Self {
            top,
            bottom,
            min_area,
            mode: DecisionMode::Hysteresis,
        }
    }

    /// Sets the decision mode.
    pub fn with_mode(mut self, mode: DecisionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the minimum component area.
    pub fn with_min_area(mut self, min_area: usize) -> Self {
        self.min_area = min_area;
        self
    }
}

impl Default for DecisionParameters {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_THRESHOLD, DEFAULT_BOTTOM_THRESHOLD, 0)
    }
}

impl ConfigValidator for DecisionParameters {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_probability(self.top, "top threshold")?;
        self.validate_probability(self.bottom, "bottom threshold")?;
        if self.bottom > self.top {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "bottom threshold {} must not exceed top threshold {}",
                    self.bottom, self.top
                ),
            });
        }
        if let DecisionMode::PostProcess { threshold } = self.mode {
            self.validate_probability(threshold, "post-process threshold")?;
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Per-class decision parameters, indexed by channel.
///
/// Thresholds are usually shared across classes while areas differ, so the
/// common constructor is [`ClassDecisions::shared`]; individual classes can be
/// overridden afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassDecisions {
    per_class: Vec<DecisionParameters>,
}

impl ClassDecisions {
    /// Creates a table from explicit per-class parameters.
    pub fn new(per_class: Vec<DecisionParameters>) -> Self {
        Self { per_class }
    }

    /// Creates a table with shared thresholds and mode, and one area per class.
    pub fn shared(top: f32, bottom: f32, mode: DecisionMode, min_areas: &[usize]) -> Self {
        Self {
            per_class: min_areas
                .iter()
                .map(|&area| DecisionParameters::new(top, bottom, area).with_mode(mode))
                .collect(),
        }
    }

    /// Replaces the parameters of one class.
    ///
    /// An out-of-range class index is a configuration error.
    pub fn with_override(
        mut self,
        class_index: usize,
        params: DecisionParameters,
    ) -> Result<Self, ConfigError> {
        let len = self.per_class.len();
        let slot = self
            .per_class
            .get_mut(class_index)
            .ok_or_else(|| ConfigError::InvalidConfig {
                message: format!(
                    "class index {} out of range for {} classes",
                    class_index, len
                ),
            })?;
        *slot = params;
        Ok(self)
    }

    /// Returns the parameters for a channel.
    pub fn get(&self, class_index: usize) -> Option<&DecisionParameters> {
        self.per_class.get(class_index)
    }

    /// Number of classes covered by the table.
    pub fn len(&self) -> usize {
        self.per_class.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.per_class.is_empty()
    }

    /// Iterates over the per-class parameters in channel order.
    pub fn iter(&self) -> impl Iterator<Item = &DecisionParameters> {
        self.per_class.iter()
    }

    /// Minimum areas in channel order.
    pub fn min_areas(&self) -> Vec<usize> {
        self.per_class.iter().map(|p| p.min_area).collect()
    }
}

impl Default for ClassDecisions {
    fn default() -> Self {
        Self::shared(
            DEFAULT_TOP_THRESHOLD,
            DEFAULT_BOTTOM_THRESHOLD,
            DecisionMode::Hysteresis,
            &DEFAULT_MIN_AREAS,
        )
    }
}

impl ConfigValidator for ClassDecisions {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_positive_usize(self.per_class.len(), "decision table length")?;
        for (idx, params) in self.per_class.iter().enumerate() {
            params.validate().map_err(|e| ConfigError::InvalidConfig {
                message: format!("class {}: {}", idx, e),
            })?;
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_decisions_are_valid() {
        let decisions = ClassDecisions::default();
        assert_eq!(decisions.len(), 4);
        assert_eq!(decisions.min_areas(), DEFAULT_MIN_AREAS.to_vec());
        assert!(decisions.validate().is_ok());
    }

    #[test]
    fn test_bottom_above_top_is_rejected() {
        let params = DecisionParameters::new(0.4, 0.6, 0);
        assert!(params.validate().is_err());

        let params = DecisionParameters::new(0.5, 0.5, 0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_post_process_threshold_is_checked() {
        let params = DecisionParameters::default()
            .with_mode(DecisionMode::PostProcess { threshold: 1.5 });
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_override_single_class() {
        let decisions = ClassDecisions::shared(0.6, 0.4, DecisionMode::Hysteresis, &[10, 20])
            .with_override(1, DecisionParameters::new(0.7, 0.3, 5))
            .unwrap();
        assert_eq!(decisions.get(0).unwrap().top, 0.6);
        assert_eq!(decisions.get(1).unwrap().top, 0.7);
        assert_eq!(decisions.min_areas(), vec![10, 5]);

        assert!(decisions.with_override(2, DecisionParameters::default()).is_err());
    }

    #[test]
    fn test_decisions_from_json() {
        let json = r#"[
            {"top": 0.6, "bottom": 0.4, "min_area": 100},
            {"top": 0.5, "bottom": 0.5, "min_area": 0, "mode": {"type": "PostProcess", "threshold": 0.45}}
        ]"#;
        let decisions: ClassDecisions = serde_json::from_str(json).unwrap();
        assert_eq!(decisions.get(0).unwrap().mode, DecisionMode::Hysteresis);
        assert_eq!(
            decisions.get(1).unwrap().mode,
            DecisionMode::PostProcess { threshold: 0.45 }
        );
    }
}
