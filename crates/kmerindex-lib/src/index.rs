//! The assembled minimal perfect hash index
//!
//! A [`KmerIndex`] owns one [`BucketTable`] per bucket and the offsets that
//! turn a bucket-local index into a global identifier:
//!
//! `id(key) = offsets[bucket_of(key)] + table[bucket_of(key)].index_of(key)`
//!
//! Identifiers of the indexed keys form exactly `[0, num_keys)`.
//!
//! ## Binary layout
//!
//! All integers are little-endian:
//!
//! ```text
//! [num_buckets: u64]
//! num_buckets × [num_keys: u64][seed: u32][fmph function, absent when num_keys = 0]
//! [offsets: (num_buckets + 1) × u64]
//! ```

use crate::domain::KeyDomain;
use crate::error::IndexError;
use crate::hasher::KeyInput;
use crate::mphf::{read_u64, BucketTable};
use crate::offsets::OffsetsVector;
use crate::splitter::bucket_of;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use tracing::info;

/// Upper bound on tables preallocated from an untrusted header
const MAX_PREALLOCATED_TABLES: usize = 1 << 16;

/// Minimal perfect hash over a set of keys of domain `D`
pub struct KmerIndex<D: KeyDomain> {
    tables: Vec<BucketTable>,
    offsets: OffsetsVector,
    _domain: PhantomData<fn() -> D>,
}

impl<D: KeyDomain> KmerIndex<D> {
    pub(crate) fn from_parts(tables: Vec<BucketTable>, offsets: OffsetsVector) -> Self {
        debug_assert_eq!(offsets.num_buckets(), tables.len());
        debug_assert!(tables
            .iter()
            .enumerate()
            .all(|(i, t)| offsets.bucket_len(i) == t.num_keys()));
        Self {
            tables,
            offsets,
            _domain: PhantomData,
        }
    }

    /// Identifier of `key` in `[0, num_keys)`.
    ///
    /// Only meaningful for keys the index was built from; any other key gets an
    /// arbitrary value or a panic. Panics on an index with zero buckets.
    #[inline]
    pub fn lookup(&self, key: &D::Key) -> u64 {
        self.lookup_hash(KeyInput::<D>::Key(key).domain_hash())
    }

    /// Identifier of the key stored as `record`; same contract as [`lookup`](Self::lookup)
    #[inline]
    pub fn lookup_record(&self, record: &D::Record) -> u64 {
        self.lookup_hash(KeyInput::<D>::Record(record).domain_hash())
    }

    /// Like [`lookup`](Self::lookup), but `None` instead of a panic when the
    /// index has no buckets or the key's table rejects it.
    ///
    /// A `Some` for a key outside the indexed set is still arbitrary.
    pub fn try_lookup(&self, key: &D::Key) -> Option<u64> {
        if self.tables.is_empty() {
            return None;
        }
        let hash = KeyInput::<D>::Key(key).domain_hash();
        let bucket = bucket_of(hash, self.tables.len());
        let local = self.tables[bucket].index_of(hash)?;
        Some(self.offsets.access(bucket) + local)
    }

    #[inline]
    fn lookup_hash(&self, hash: u64) -> u64 {
        let bucket = self.bucket_of_hash(hash);
        match self.tables[bucket].index_of(hash) {
            Some(local) => self.offsets.access(bucket) + local,
            None => panic!("key is not in the indexed set (bucket {})", bucket),
        }
    }

    #[inline]
    fn bucket_of_hash(&self, hash: u64) -> usize {
        assert!(
            !self.tables.is_empty(),
            "lookup in an index with zero buckets"
        );
        bucket_of(hash, self.tables.len())
    }

    /// Bucket a key is routed to. Panics on an index with zero buckets.
    #[inline]
    pub fn bucket_of_key(&self, key: &D::Key) -> usize {
        self.bucket_of_hash(KeyInput::<D>::Key(key).domain_hash())
    }

    /// Number of buckets
    pub fn num_buckets(&self) -> usize {
        self.tables.len()
    }

    /// Number of distinct keys indexed
    pub fn num_keys(&self) -> u64 {
        self.offsets.total()
    }

    /// Per-bucket offsets (`num_buckets + 1` entries)
    pub fn offsets(&self) -> &OffsetsVector {
        &self.offsets
    }

    /// Table of one bucket
    pub fn table(&self, bucket: usize) -> &BucketTable {
        &self.tables[bucket]
    }

    /// Bytes used by all bucket tables
    pub fn memory_footprint(&self) -> usize {
        self.tables.iter().map(BucketTable::mem_size).sum()
    }

    /// Print a space breakdown of the index
    pub fn print_space_breakdown(&self) {
        let num_keys = self.num_keys().max(1) as f64;
        let tables_bytes = self.memory_footprint() as f64;
        let offsets_bytes = self.offsets.num_bytes() as f64;
        let total = tables_bytes + offsets_bytes;
        let perc = |x: f64| -> f64 { x * 100.0 / total };

        let largest = self.tables.iter().map(BucketTable::num_keys).max().unwrap_or(0);
        let empty = self.tables.iter().filter(|t| t.num_keys() == 0).count();

        info!(
            "total index size: {} [B] -- {:.5} [MB] ({:.5} [bits/key])",
            total as u64,
            total / 1_000_000.0,
            total * 8.0 / num_keys
        );
        info!("keys: {}, buckets: {}", self.num_keys(), self.num_buckets());
        info!("  largest bucket: {} keys, empty buckets: {}", largest, empty);
        info!("SPACE BREAKDOWN:");
        info!(
            "  tables: {:.5} [bits/key] -- {:.4}%",
            tables_bytes * 8.0 / num_keys,
            perc(tables_bytes)
        );
        info!(
            "  offsets: {:.5} [bits/key] -- {:.4}%",
            offsets_bytes * 8.0 / num_keys,
            perc(offsets_bytes)
        );
        info!("  --------------");
        info!("  total: {:.5} [bits/key]", total * 8.0 / num_keys);
    }

    /// Write the index to a stream
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), IndexError> {
        writer.write_all(&(self.tables.len() as u64).to_le_bytes())?;
        for table in &self.tables {
            table.write_to(&mut *writer)?;
        }
        self.offsets.write_to(&mut *writer)?;
        Ok(())
    }

    /// Read an index written by [`serialize`](Self::serialize).
    ///
    /// Truncated streams, tables inconsistent with their headers and offsets
    /// that disagree with the table sizes are rejected as
    /// [`IndexError::Corrupt`].
    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self, IndexError> {
        let num_buckets = read_u64(&mut *reader).map_err(IndexError::from_decode)?;
        let num_buckets = usize::try_from(num_buckets)
            .map_err(|_| IndexError::Corrupt(format!("bucket count {} too large", num_buckets)))?;

        let mut tables = Vec::with_capacity(num_buckets.min(MAX_PREALLOCATED_TABLES));
        for _ in 0..num_buckets {
            tables.push(BucketTable::read_from(&mut *reader).map_err(IndexError::from_decode)?);
        }

        let offsets = OffsetsVector::read_from(&mut *reader, num_buckets)?;
        for (bucket, table) in tables.iter().enumerate() {
            if offsets.bucket_len(bucket) != table.num_keys() {
                return Err(IndexError::Corrupt(format!(
                    "offsets give bucket {} {} keys, its table has {}",
                    bucket,
                    offsets.bucket_len(bucket),
                    table.num_keys()
                )));
            }
        }

        Ok(Self::from_parts(tables, offsets))
    }

    /// Serialize the index to a file
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let file = File::create(path).map_err(|e| IndexError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        self.serialize(&mut writer).map_err(|e| with_path(e, path))?;
        writer.flush().map_err(|e| IndexError::io(path, e))?;
        info!("Saved index ({} keys) to {:?}", self.num_keys(), path);
        Ok(())
    }

    /// Load an index from a file written by [`save`](Self::save).
    ///
    /// Bytes after the offsets are rejected.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let file = File::open(path).map_err(|e| IndexError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let index = Self::deserialize(&mut reader).map_err(|e| with_path(e, path))?;

        let mut trailing = [0u8; 1];
        let extra = reader.read(&mut trailing).map_err(|e| IndexError::io(path, e))?;
        if extra != 0 {
            return Err(IndexError::Corrupt(format!(
                "trailing bytes after index in {}",
                path.display()
            )));
        }
        info!("Loaded index ({} keys) from {:?}", index.num_keys(), path);
        Ok(index)
    }
}

/// Attach `path` to a bare stream error
fn with_path(err: IndexError, path: &Path) -> IndexError {
    match err {
        IndexError::Stream(source) => IndexError::io(path, source),
        other => other,
    }
}

impl<D: KeyDomain> fmt::Debug for KmerIndex<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmerIndex")
            .field("num_buckets", &self.num_buckets())
            .field("num_keys", &self.num_keys())
            .field("memory_footprint", &self.memory_footprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildConfiguration, IndexBuilder};
    use crate::domain::KmerDomain;
    use crate::kmer::Kmer;
    use crate::splitter::KeySplitter;
    use tempfile::TempDir;

    type D = KmerDomain<11>;

    fn keys(n: u64) -> Vec<Kmer<11>> {
        // Distinct 22-bit patterns
        (0..n).map(|i| Kmer::new(i.wrapping_mul(0x9E37) & 0x3F_FFFF)).collect()
    }

    fn build(keys: &[Kmer<11>], num_buckets: usize, tmp: &TempDir) -> KmerIndex<D> {
        let config = BuildConfiguration {
            num_buckets,
            num_threads: 2,
            verbose: false,
            tmp_dirname: tmp.path().join("work"),
            ..BuildConfiguration::default()
        };
        IndexBuilder::<D>::new(config)
            .unwrap()
            .build(&KeySplitter::<D>::new(keys))
            .unwrap()
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_index_is_send_sync() {
        assert_send_sync::<KmerIndex<D>>();
    }

    #[test]
    fn test_lookup_record_agrees_with_lookup() {
        let tmp = TempDir::new().unwrap();
        let keys = keys(500);
        let index = build(&keys, 5, &tmp);

        for key in &keys {
            assert_eq!(index.lookup(key), index.lookup_record(&key.to_record()));
            let bucket = index.bucket_of_key(key);
            let id = index.lookup(key);
            assert!(index.offsets().access(bucket) <= id);
            assert!(id < index.offsets().access(bucket + 1));
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let keys = keys(300);
        let index = build(&keys, 4, &tmp);

        let mut buf = Vec::new();
        index.serialize(&mut buf).unwrap();
        let loaded = KmerIndex::<D>::deserialize(&mut buf.as_slice()).unwrap();

        assert_eq!(loaded.num_keys(), 300);
        assert_eq!(loaded.offsets(), index.offsets());
        for key in &keys {
            assert_eq!(loaded.lookup(key), index.lookup(key));
        }
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let tmp = TempDir::new().unwrap();
        let index = build(&keys(100), 3, &tmp);
        let mut buf = Vec::new();
        index.serialize(&mut buf).unwrap();

        for cut in [0, 4, 8, 20, buf.len() / 2, buf.len() - 1] {
            let err = KmerIndex::<D>::deserialize(&mut &buf[..cut]).unwrap_err();
            assert!(matches!(err, IndexError::Corrupt(_)), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn test_inconsistent_offsets_rejected() {
        let tmp = TempDir::new().unwrap();
        let index = build(&keys(100), 2, &tmp);
        let mut buf = Vec::new();
        index.serialize(&mut buf).unwrap();

        // Last offset is offsets[2]; bump it past the table sizes
        let last = buf.len() - 8;
        buf[last..].copy_from_slice(&101u64.to_le_bytes());
        let err = KmerIndex::<D>::deserialize(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
    }

    #[test]
    fn test_save_load_rejects_trailing_bytes() {
        let tmp = TempDir::new().unwrap();
        let index = build(&keys(50), 2, &tmp);
        let path = tmp.path().join("index.bin");

        index.save(&path).unwrap();
        let loaded = KmerIndex::<D>::load(&path).unwrap();
        assert_eq!(loaded.num_keys(), 50);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.push(0);
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            KmerIndex::<D>::load(&path),
            Err(IndexError::Corrupt(_))
        ));
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.idx");
        let err = KmerIndex::<D>::load(&path).unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
        assert!(err.to_string().contains("absent.idx"));
    }

    #[test]
    #[should_panic(expected = "zero buckets")]
    fn test_lookup_without_buckets_panics_with_message() {
        let tmp = TempDir::new().unwrap();
        let index = build(&[], 0, &tmp);
        assert_eq!(index.try_lookup(&Kmer::new(5)), None);
        index.lookup(&Kmer::new(5));
    }

    #[test]
    #[should_panic(expected = "zero buckets")]
    fn test_bucket_of_key_without_buckets_panics_with_message() {
        let tmp = TempDir::new().unwrap();
        let index = build(&[], 0, &tmp);
        index.bucket_of_key(&Kmer::new(5));
    }

    #[test]
    fn test_k63_keys_with_many_single_key_buckets() {
        let tmp = TempDir::new().unwrap();
        let keys: Vec<Kmer<63>> = (0..200u128)
            .map(|i| Kmer::new(i.wrapping_mul(0x9E37_79B9_7F4A_7C15) & ((1u128 << 126) - 1)))
            .collect();

        for num_buckets in [1, 199, 200, 1000] {
            let config = BuildConfiguration {
                num_buckets,
                num_threads: 2,
                verbose: false,
                tmp_dirname: tmp.path().join("work"),
                ..BuildConfiguration::default()
            };
            let index = IndexBuilder::<KmerDomain<63>>::new(config)
                .unwrap()
                .build(&KeySplitter::<KmerDomain<63>>::new(&keys))
                .unwrap();

            let mut buf = Vec::new();
            index.serialize(&mut buf).unwrap();
            let loaded = KmerIndex::<KmerDomain<63>>::deserialize(&mut buf.as_slice()).unwrap();

            let mut ids: Vec<u64> = keys.iter().map(|k| index.lookup(k)).collect();
            for (key, &id) in keys.iter().zip(&ids) {
                assert_eq!(loaded.lookup(key), id);
            }
            ids.sort_unstable();
            assert_eq!(ids, (0..200).collect::<Vec<u64>>(), "B = {}", num_buckets);
        }
    }
}
