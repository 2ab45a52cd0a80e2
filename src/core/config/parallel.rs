//! Parallel processing configuration.

use serde::{Deserialize, Serialize};

use crate::core::constants::DEFAULT_PARALLEL_THRESHOLD;

/// Controls when finalization of accumulated images runs on the rayon pool.
///
/// Accumulator entries for different images are independent, so finalization
/// is split by image identifier without any locking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelPolicy {
    /// Maximum number of threads to use for parallel processing.
    /// If None, rayon's global pool is used (typically one thread per CPU core).
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Number of images to finalize sequentially (<= this uses sequential).
    #[serde(default = "ParallelPolicy::default_image_threshold")]
    pub image_threshold: usize,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of threads.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the image processing threshold.
    pub fn with_image_threshold(mut self, threshold: usize) -> Self {
        self.image_threshold = threshold;
        self
    }

    /// Returns true when `image_count` images should be processed in parallel.
    pub fn use_parallel(&self, image_count: usize) -> bool {
        image_count > self.image_threshold && self.max_threads != Some(1)
    }

    /// Runs `op` on a dedicated pool when `max_threads` is set, or on the global
    /// pool otherwise.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match self.max_threads {
            Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(op),
                Err(e) => {
                    tracing::warn!("Failed to build a {}-thread pool: {}", threads, e);
                    op()
                }
            },
            None => op(),
        }
    }

    fn default_image_threshold() -> usize {
        DEFAULT_PARALLEL_THRESHOLD
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            image_threshold: Self::default_image_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_parallel() {
        let policy = ParallelPolicy::new().with_image_threshold(2);
        assert!(!policy.use_parallel(2));
        assert!(policy.use_parallel(3));

        let single = policy.with_max_threads(Some(1));
        assert!(!single.use_parallel(100));
    }

    #[test]
    fn test_install_runs_closure() {
        let policy = ParallelPolicy::new().with_max_threads(Some(2));
        assert_eq!(policy.install(|| 40 + 2), 42);
    }

    #[test]
    fn test_policy_defaults_from_json() {
        let policy: ParallelPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ParallelPolicy::default());
    }
}
