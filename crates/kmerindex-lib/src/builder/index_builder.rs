//! Index builder orchestration
//!
//! Coordinates the pipeline that turns a key source into a [`KmerIndex`]:
//! 1. Split keys into `B` raw partition files
//! 2. Sort and deduplicate each partition, accumulating offsets in order
//! 3. Build one perfect-hash table per bucket, in parallel
//! 4. Assemble the index

use crate::builder::config::BuildConfiguration;
use crate::builder::merge::{merge_bucket, MappedRecords};
use crate::builder::workdir::WorkDir;
use crate::domain::KeyDomain;
use crate::error::IndexError;
use crate::hasher::KeyInput;
use crate::index::KmerIndex;
use crate::mphf::{BucketTable, TableError};
use crate::offsets::OffsetsVector;
use crate::splitter::{bucket_of, Splitter};
use rayon::prelude::*;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stage of a build. Stages are visited strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    /// Nothing done yet
    Empty,
    /// Raw partitions written
    Split,
    /// Partitions deduplicated and offsets known
    Merged,
    /// Every bucket table built
    BucketsBuilt,
    /// Index assembled
    Ready,
}

impl BuildStage {
    /// The only stage reachable from this one
    pub fn next(self) -> Option<BuildStage> {
        match self {
            BuildStage::Empty => Some(BuildStage::Split),
            BuildStage::Split => Some(BuildStage::Merged),
            BuildStage::Merged => Some(BuildStage::BucketsBuilt),
            BuildStage::BucketsBuilt => Some(BuildStage::Ready),
            BuildStage::Ready => None,
        }
    }
}

/// Tracks the current stage and rejects skipped or repeated transitions
#[derive(Debug)]
pub struct StageTracker {
    stage: BuildStage,
}

impl StageTracker {
    /// Start in [`BuildStage::Empty`]
    pub fn new() -> Self {
        Self {
            stage: BuildStage::Empty,
        }
    }

    /// Current stage
    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Move to `to`, which must directly follow the current stage
    pub fn advance(&mut self, to: BuildStage) -> Result<(), IndexError> {
        if self.stage.next() != Some(to) {
            return Err(IndexError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        debug!("Build stage {:?} -> {:?}", self.stage, to);
        self.stage = to;
        Ok(())
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing k-mer indices
pub struct IndexBuilder<D: KeyDomain> {
    config: BuildConfiguration,
    _domain: PhantomData<fn() -> D>,
}

impl<D: KeyDomain> IndexBuilder<D> {
    /// Create a new index builder with the given configuration
    pub fn new(config: BuildConfiguration) -> Result<Self, IndexError> {
        config.validate().map_err(IndexError::Config)?;
        Ok(Self {
            config,
            _domain: PhantomData,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    /// Build an index over every distinct key produced by `splitter`
    ///
    /// # Parallelism
    /// The number of threads is controlled by `config.num_threads`:
    /// - `0`: use all available CPU cores (rayon default)
    /// - `N`: use exactly N threads
    ///
    /// Temporary files live under `config.tmp_dirname` and are removed when
    /// the build returns, whatever the outcome.
    pub fn build<S>(&self, splitter: &S) -> Result<KmerIndex<D>, IndexError>
    where
        S: Splitter<D> + Sync + ?Sized,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .build()
            .map_err(|e| IndexError::ThreadPool(e.to_string()))?;

        pool.install(|| self.build_inner(splitter))
    }

    /// Inner build logic, runs inside the rayon thread pool
    fn build_inner<S>(&self, splitter: &S) -> Result<KmerIndex<D>, IndexError>
    where
        S: Splitter<D> + ?Sized,
    {
        if self.config.verbose {
            self.config.print();
        }
        info!("Building k-mer index");

        let num_buckets = self.config.num_buckets;
        let work_dir = WorkDir::new(&self.config.tmp_dirname)?;
        let mut tracker = StageTracker::new();

        info!("Step 1: Splitting keys into {} buckets...", num_buckets);
        let raw_paths = splitter.split(&work_dir, num_buckets)?;
        if raw_paths.len() != num_buckets {
            return Err(IndexError::PartitionCount {
                expected: num_buckets,
                actual: raw_paths.len(),
            });
        }
        tracker.advance(BuildStage::Split)?;

        info!("Step 2: Merging partitions...");
        let (unique_paths, offsets) = self.merge_partitions(&work_dir, &raw_paths)?;
        info!("  {} distinct keys", offsets.total());
        tracker.advance(BuildStage::Merged)?;

        info!("Step 3: Building {} bucket tables...", num_buckets);
        let tables = self.build_tables(&unique_paths)?;
        tracker.advance(BuildStage::BucketsBuilt)?;

        let index = KmerIndex::from_parts(tables, offsets);
        tracker.advance(BuildStage::Ready)?;

        info!("Index Build Complete");
        info!(
            "Total memory: {:.2} MB",
            index.memory_footprint() as f64 / (1024.0 * 1024.0)
        );
        Ok(index)
    }

    /// Deduplicate every partition and compute the offsets in partition order
    fn merge_partitions(
        &self,
        work_dir: &WorkDir,
        raw_paths: &[PathBuf],
    ) -> Result<(Vec<PathBuf>, OffsetsVector), IndexError> {
        let unique_paths: Vec<PathBuf> = (0..raw_paths.len())
            .map(|bucket| work_dir.unique_path(bucket))
            .collect();

        let counts: Vec<u64> = if self.config.pipelined_merge {
            raw_paths
                .par_iter()
                .zip(unique_paths.par_iter())
                .map(|(raw, unique)| merge_bucket::<D>(raw, unique))
                .collect::<Result<_, _>>()?
        } else {
            raw_paths
                .iter()
                .zip(&unique_paths)
                .map(|(raw, unique)| merge_bucket::<D>(raw, unique))
                .collect::<Result<_, _>>()?
        };

        let mut offsets = OffsetsVector::new();
        for count in counts {
            offsets.push_count(count);
        }
        Ok((unique_paths, offsets))
    }

    /// Build all tables; each worker fills only its own slot
    fn build_tables(&self, unique_paths: &[PathBuf]) -> Result<Vec<BucketTable>, IndexError> {
        let num_buckets = unique_paths.len();
        let mut tables = vec![BucketTable::default(); num_buckets];

        tables
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(bucket, slot)| -> Result<(), IndexError> {
                *slot = self.build_table(bucket, &unique_paths[bucket], num_buckets)?;
                Ok(())
            })?;

        Ok(tables)
    }

    fn build_table(
        &self,
        bucket: usize,
        path: &Path,
        num_buckets: usize,
    ) -> Result<BucketTable, IndexError> {
        let mapped = MappedRecords::<D::Record>::open(path)?;
        let mut hashes = Vec::with_capacity(mapped.len());
        for record in mapped.records() {
            let hash = KeyInput::<D>::Record(record).domain_hash();
            let expected = bucket_of(hash, num_buckets);
            if expected != bucket {
                return Err(IndexError::MisroutedRecord { bucket, expected });
            }
            hashes.push(hash);
        }
        mapped.remove()?;

        let table = BucketTable::build(&hashes, self.config.seed, self.config.max_seed_attempts)
            .map_err(|e| match e {
                TableError::Exhausted { attempts } => {
                    IndexError::SeedSearchExhausted { bucket, attempts }
                }
            })?;

        debug!(
            "Bucket {}: {} keys, seed {}, {} bytes",
            bucket,
            table.num_keys(),
            table.seed(),
            table.mem_size()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KmerDomain;
    use crate::kmer::Kmer;
    use crate::splitter::KeySplitter;
    use tempfile::TempDir;

    type D = KmerDomain<9>;

    fn config_in(tmp: &TempDir, num_buckets: usize) -> BuildConfiguration {
        BuildConfiguration {
            num_buckets,
            num_threads: 2,
            verbose: false,
            tmp_dirname: tmp.path().to_path_buf(),
            ..BuildConfiguration::default()
        }
    }

    #[test]
    fn test_stage_order_is_enforced() {
        let mut tracker = StageTracker::new();
        assert!(tracker.advance(BuildStage::Merged).is_err());
        tracker.advance(BuildStage::Split).unwrap();
        assert!(tracker.advance(BuildStage::Split).is_err());
        tracker.advance(BuildStage::Merged).unwrap();
        tracker.advance(BuildStage::BucketsBuilt).unwrap();
        tracker.advance(BuildStage::Ready).unwrap();
        assert_eq!(tracker.stage(), BuildStage::Ready);

        match tracker.advance(BuildStage::Empty) {
            Err(IndexError::InvalidTransition { from, to }) => {
                assert_eq!(from, BuildStage::Ready);
                assert_eq!(to, BuildStage::Empty);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BuildConfiguration {
            max_seed_attempts: 0,
            ..BuildConfiguration::default()
        };
        assert!(matches!(
            IndexBuilder::<D>::new(config),
            Err(IndexError::Config(_))
        ));
    }

    #[test]
    fn test_build_small_index() {
        let tmp = TempDir::new().unwrap();
        let keys: Vec<Kmer<9>> = ["ACGTACGTA", "CCCCCCCCC", "GATTACAGA", "ACGTACGTA"]
            .iter()
            .map(|s| Kmer::from_str(s).unwrap())
            .collect();

        let builder = IndexBuilder::<D>::new(config_in(&tmp, 3)).unwrap();
        let index = builder.build(&KeySplitter::<D>::new(&keys)).unwrap();

        assert_eq!(index.num_keys(), 3);
        assert_eq!(index.num_buckets(), 3);
        let mut ids: Vec<u64> = keys.iter().map(|k| index.lookup(k)).collect();
        assert_eq!(ids[0], ids[3]);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    struct ShortSplitter;

    impl Splitter<D> for ShortSplitter {
        fn split(&self, work_dir: &WorkDir, num_buckets: usize) -> Result<Vec<PathBuf>, IndexError> {
            let path = work_dir.raw_path(0);
            std::fs::write(&path, b"").map_err(|e| IndexError::io(&path, e))?;
            Ok(vec![path; num_buckets.saturating_sub(1)])
        }
    }

    #[test]
    fn test_partition_count_checked() {
        let tmp = TempDir::new().unwrap();
        let builder = IndexBuilder::<D>::new(config_in(&tmp, 4)).unwrap();
        let err = builder.build(&ShortSplitter).unwrap_err();
        assert!(matches!(
            err,
            IndexError::PartitionCount {
                expected: 4,
                actual: 3
            }
        ));
    }
}
