//! Partitioning keys into bucket files
//!
//! A [`Splitter`] writes every input key, as its raw record, to the partition
//! file of bucket [`bucket_of`]`(hash, B)`. The index routes lookups through
//! the same function, so a key is always queried against the table built from
//! its own partition.

use crate::builder::parse::for_each_kmer;
use crate::builder::WorkDir;
use crate::domain::{KeyDomain, KmerDomain};
use crate::error::IndexError;
use crate::hasher::KeyInput;
use crate::kmer::{Kmer, KmerBits};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::{debug, info};

/// Per-partition write buffer
const PARTITION_BUFFER_BYTES: usize = 64 * 1024;

/// Bucket of a domain hash among `num_buckets` buckets.
///
/// `num_buckets` must be non-zero.
#[inline]
pub fn bucket_of(hash: u64, num_buckets: usize) -> usize {
    (hash % num_buckets as u64) as usize
}

/// Source of keys for an index build
pub trait Splitter<D: KeyDomain> {
    /// Write every key to the raw partition files of `work_dir`.
    ///
    /// Returns exactly `num_buckets` paths, one per bucket in order, each a
    /// whole number of `D::RECORD_SIZE` records. Duplicates are allowed.
    fn split(&self, work_dir: &WorkDir, num_buckets: usize) -> Result<Vec<PathBuf>, IndexError>;
}

/// Buffered writers for the raw partitions of one split
pub struct PartitionWriter<D: KeyDomain> {
    writers: Vec<BufWriter<File>>,
    paths: Vec<PathBuf>,
    counts: Vec<u64>,
    _domain: PhantomData<fn() -> D>,
}

impl<D: KeyDomain> PartitionWriter<D> {
    /// Create the `num_buckets` raw partition files
    pub fn create(work_dir: &WorkDir, num_buckets: usize) -> Result<Self, IndexError> {
        let mut writers = Vec::with_capacity(num_buckets);
        let mut paths = Vec::with_capacity(num_buckets);
        for bucket in 0..num_buckets {
            let path = work_dir.raw_path(bucket);
            let file = File::create(&path).map_err(|e| IndexError::io(&path, e))?;
            writers.push(BufWriter::with_capacity(PARTITION_BUFFER_BYTES, file));
            paths.push(path);
        }
        Ok(Self {
            writers,
            paths,
            counts: vec![0; num_buckets],
            _domain: PhantomData,
        })
    }

    /// Route one key to its partition
    #[inline]
    pub fn push(&mut self, key: &D::Key) -> Result<(), IndexError> {
        self.push_record(&D::to_record(key))
    }

    /// Route one raw record to its partition
    pub fn push_record(&mut self, record: &D::Record) -> Result<(), IndexError> {
        if self.writers.is_empty() {
            return Err(IndexError::Config(
                "cannot partition keys into zero buckets".to_string(),
            ));
        }
        let bucket = bucket_of(KeyInput::<D>::Record(record).domain_hash(), self.writers.len());
        self.writers[bucket]
            .write_all(record.as_ref())
            .map_err(|e| IndexError::io(&self.paths[bucket], e))?;
        self.counts[bucket] += 1;
        Ok(())
    }

    /// Records written so far
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Flush all partitions and return their paths
    pub fn finish(self) -> Result<Vec<PathBuf>, IndexError> {
        for (bucket, mut writer) in self.writers.into_iter().enumerate() {
            writer
                .flush()
                .map_err(|e| IndexError::io(&self.paths[bucket], e))?;
            debug!("Partition {}: {} records", bucket, self.counts[bucket]);
        }
        Ok(self.paths)
    }
}

/// Splits an in-memory slice of keys
pub struct KeySplitter<'a, D: KeyDomain> {
    keys: &'a [D::Key],
}

impl<'a, D: KeyDomain> KeySplitter<'a, D> {
    /// Wrap a slice of keys (duplicates allowed)
    pub fn new(keys: &'a [D::Key]) -> Self {
        Self { keys }
    }
}

impl<D: KeyDomain> Splitter<D> for KeySplitter<'_, D> {
    fn split(&self, work_dir: &WorkDir, num_buckets: usize) -> Result<Vec<PathBuf>, IndexError> {
        let mut writer = PartitionWriter::<D>::create(work_dir, num_buckets)?;
        for key in self.keys {
            writer.push(key)?;
        }
        info!("Partitioned {} keys into {} buckets", writer.total(), num_buckets);
        writer.finish()
    }
}

/// Splits the k-mers of FASTA/FASTQ or plain-text sequence files
#[derive(Debug, Clone)]
pub struct SequenceSplitter<const K: usize> {
    files: Vec<PathBuf>,
    canonical: bool,
}

impl<const K: usize> SequenceSplitter<K> {
    /// Split the k-mers of `files`; with `canonical`, each k-mer is replaced
    /// by the smaller of itself and its reverse complement
    pub fn new(files: Vec<PathBuf>, canonical: bool) -> Self {
        Self { files, canonical }
    }
}

impl<const K: usize> Splitter<KmerDomain<K>> for SequenceSplitter<K>
where
    Kmer<K>: KmerBits,
{
    fn split(&self, work_dir: &WorkDir, num_buckets: usize) -> Result<Vec<PathBuf>, IndexError> {
        let mut writer = PartitionWriter::<KmerDomain<K>>::create(work_dir, num_buckets)?;
        for file in &self.files {
            info!("Reading k-mers from {:?}", file);
            for_each_kmer::<K, _>(file, self.canonical, |kmer| writer.push(&kmer))?;
        }
        info!(
            "Partitioned {} k-mers (k = {}) into {} buckets",
            writer.total(),
            K,
            num_buckets
        );
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records;
    use std::fs;
    use tempfile::TempDir;

    type D = KmerDomain<7>;

    fn sample_keys() -> Vec<Kmer<7>> {
        ["ACGTACG", "TTTTTTT", "GATTACA", "CCCGGGA", "ACGTACG", "TGCATGC"]
            .iter()
            .map(|s| Kmer::from_str(s).unwrap())
            .collect()
    }

    #[test]
    fn test_bucket_of() {
        assert_eq!(bucket_of(10, 3), 1);
        assert_eq!(bucket_of(u64::MAX, 1), 0);
    }

    #[test]
    fn test_every_record_lands_in_its_query_bucket() {
        let tmp = TempDir::new().unwrap();
        let work = WorkDir::new(tmp.path()).unwrap();
        let keys = sample_keys();

        let paths = KeySplitter::<D>::new(&keys).split(&work, 4).unwrap();
        assert_eq!(paths.len(), 4);

        let mut seen = 0;
        for (bucket, path) in paths.iter().enumerate() {
            let bytes = fs::read(path).unwrap();
            for record in records::<[u8; 8]>(&bytes) {
                let key = D::from_record(record);
                let query_hash = KeyInput::<D>::Key(&key).domain_hash();
                assert_eq!(bucket_of(query_hash, 4), bucket);
                seen += 1;
            }
        }
        assert_eq!(seen, keys.len());
    }

    #[test]
    fn test_zero_buckets() {
        let tmp = TempDir::new().unwrap();
        let work = WorkDir::new(tmp.path()).unwrap();

        let empty: Vec<Kmer<7>> = Vec::new();
        assert!(KeySplitter::<D>::new(&empty).split(&work, 0).unwrap().is_empty());

        let err = KeySplitter::<D>::new(&sample_keys()).split(&work, 0).unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));
    }

    #[test]
    fn test_sequence_splitter_counts_kmers() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("reads.fa");
        fs::write(&input, ">r1\nACGTACGTAC\n>r2\nACGNACGTTTA\n").unwrap();
        let work = WorkDir::new(tmp.path().join("work")).unwrap();

        let splitter = SequenceSplitter::<7>::new(vec![input], false);
        let paths = splitter.split(&work, 3).unwrap();

        let total: u64 = paths
            .iter()
            .map(|p| fs::metadata(p).unwrap().len() / 8)
            .sum();
        // 4 windows in r1, 1 clean window after the N in r2
        assert_eq!(total, 5);
    }
}
