//! Run statistics for the ensemble aggregator.

use std::fmt;
use std::time::Duration;

/// Counters collected while accumulating and finalizing an ensemble run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsembleStats {
    /// Number of probability maps added across all folds.
    pub maps_added: usize,
    /// Number of maps that had to be resampled to the output resolution.
    pub maps_resized: usize,
    /// Number of distinct folds that contributed at least one map.
    pub folds_seen: usize,
    /// Number of images finalized successfully.
    pub images_finalized: usize,
    /// Number of images rejected because of shape or fold errors.
    pub images_rejected: usize,
    /// Time spent finalizing.
    pub finalize_time: Duration,
}

impl EnsembleStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of images that were rejected, as a percentage (0.0 to 100.0).
    pub fn rejection_rate(&self) -> f64 {
        let total = self.images_finalized + self.images_rejected;
        if total == 0 {
            0.0
        } else {
            (self.images_rejected as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for EnsembleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ensemble Statistics:")?;
        writeln!(f, "  Maps added: {}", self.maps_added)?;
        writeln!(f, "  Maps resized: {}", self.maps_resized)?;
        writeln!(f, "  Folds seen: {}", self.folds_seen)?;
        writeln!(f, "  Images finalized: {}", self.images_finalized)?;
        writeln!(
            f,
            "  Images rejected: {} ({:.1}%)",
            self.images_rejected,
            self.rejection_rate()
        )?;
        write!(
            f,
            "  Finalize time: {:.2}ms",
            self.finalize_time.as_secs_f64() * 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_rate() {
        let mut stats = EnsembleStats::new();
        assert_eq!(stats.rejection_rate(), 0.0);

        stats.images_finalized = 3;
        stats.images_rejected = 1;
        assert_eq!(stats.rejection_rate(), 25.0);
    }

    #[test]
    fn test_display() {
        let stats = EnsembleStats {
            maps_added: 8,
            folds_seen: 2,
            images_finalized: 4,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Maps added: 8"));
        assert!(text.contains("Images rejected: 0 (0.0%)"));
    }
}
