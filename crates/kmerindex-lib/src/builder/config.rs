//! Build configuration for index construction
//!
//! Parameters for partitioning, seed search and resource usage.

use crate::constants::{DEFAULT_MAX_SEED_ATTEMPTS, DEFAULT_NUM_BUCKETS, DEFAULT_SEED};
use std::path::PathBuf;

/// Configuration parameters for building a k-mer index
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// Number of partitions (buckets) the key space is split into
    pub num_buckets: usize,

    /// Number of threads for parallel operations (0 = all available cores)
    pub num_threads: usize,

    /// First seed tried for every bucket's perfect hash
    pub seed: u32,

    /// Seeds tried per bucket before the build fails
    pub max_seed_attempts: u32,

    /// Merge partitions in parallel instead of one at a time
    pub pipelined_merge: bool,

    /// Verbose output during construction
    pub verbose: bool,

    /// Directory for temporary files during construction
    pub tmp_dirname: PathBuf,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            num_buckets: DEFAULT_NUM_BUCKETS,
            num_threads: 0, // 0 = use all available cores
            seed: DEFAULT_SEED,
            max_seed_attempts: DEFAULT_MAX_SEED_ATTEMPTS,
            pipelined_merge: false,
            verbose: true,
            tmp_dirname: PathBuf::from("kmerindex_tmp"),
        }
    }
}

impl BuildConfiguration {
    /// Create a new build configuration with the given number of buckets
    pub fn new(num_buckets: usize) -> Result<Self, String> {
        let config = Self {
            num_buckets,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_seed_attempts == 0 {
            return Err("max_seed_attempts must be at least 1".to_string());
        }
        if self
            .seed
            .checked_add(self.max_seed_attempts - 1)
            .is_none()
        {
            return Err(format!(
                "seed range overflows: seed={}, max_seed_attempts={}",
                self.seed, self.max_seed_attempts
            ));
        }
        if self.tmp_dirname.as_os_str().is_empty() {
            return Err("tmp_dirname must not be empty".to_string());
        }
        Ok(())
    }

    /// Log configuration parameters via tracing
    pub fn print(&self) {
        tracing::info!("Build Configuration:");
        tracing::info!("  num_buckets = {}", self.num_buckets);
        if self.num_threads == 0 {
            tracing::info!("  num_threads = all available cores");
        } else {
            tracing::info!("  num_threads = {}", self.num_threads);
        }
        tracing::debug!("  seed = {}", self.seed);
        tracing::debug!("  max_seed_attempts = {}", self.max_seed_attempts);
        tracing::info!("  pipelined_merge = {}", self.pipelined_merge);
        tracing::debug!("  verbose = {}", self.verbose);
        tracing::debug!("  tmp_dirname = {:?}", self.tmp_dirname);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BuildConfiguration::default();
        assert_eq!(config.num_buckets, DEFAULT_NUM_BUCKETS);
        assert_eq!(config.seed, DEFAULT_SEED);
        assert!(!config.pipelined_merge);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_new_config() {
        let config = BuildConfiguration::new(64).unwrap();
        assert_eq!(config.num_buckets, 64);

        // Zero buckets is a valid (empty) index
        assert!(BuildConfiguration::new(0).is_ok());
    }

    #[test]
    fn test_validate_zero_attempts() {
        let config = BuildConfiguration {
            max_seed_attempts: 0,
            ..BuildConfiguration::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_seed_overflow() {
        let config = BuildConfiguration {
            seed: u32::MAX,
            max_seed_attempts: 2,
            ..BuildConfiguration::default()
        };
        assert!(config.validate().is_err());

        let config = BuildConfiguration {
            seed: u32::MAX,
            max_seed_attempts: 1,
            ..BuildConfiguration::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_tmp_dir() {
        let config = BuildConfiguration {
            tmp_dirname: PathBuf::new(),
            ..BuildConfiguration::default()
        };
        assert!(config.validate().is_err());
    }
}
