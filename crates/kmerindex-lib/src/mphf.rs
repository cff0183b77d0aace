//! Per-bucket minimal perfect hash tables
//!
//! Each bucket gets a fingerprinting MPHF (`ph::fmph`) built over the domain
//! hashes of its distinct keys. The hash family is [`SeededHasher`]: the
//! table's seed and the fmph level number together seed every evaluation, so
//! retrying a bucket with the next seed gives it an independent family.
//!
//! Keys whose domain hashes collide can never be separated, whatever the
//! seed. Those are detected up front and reported like any other failed seed
//! search.

use crate::constants::TABLE_LEVEL_SIZE_PERCENT;
use crate::hasher::SeededHasher;
use ph::fmph::{self, BuildConf};
use ph::GetSize;
use std::fmt;
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::trace;

/// The MPHF type stored in every non-empty bucket
pub type TableFunction = fmph::Function<SeededHasher>;

/// Reasons a table cannot be built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// No seed within the budget produced a perfect hash
    #[error("no collision-free seed found in {attempts} attempts")]
    Exhausted {
        /// Seeds tried
        attempts: u32,
    },
}

/// Minimal perfect hash over the keys of one bucket
#[derive(Clone, Default)]
pub struct BucketTable {
    num_keys: u64,
    seed: u32,
    function: Option<TableFunction>,
}

fn build_conf(seed: u32) -> BuildConf<SeededHasher> {
    // Buckets are already built in parallel, one per worker
    BuildConf::hash_lsize_mt(SeededHasher::new(seed), TABLE_LEVEL_SIZE_PERCENT, false)
}

/// True when two domain hashes are equal
fn has_duplicate(hashes: &[u64]) -> bool {
    let mut sorted = hashes.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).any(|w| w[0] == w[1])
}

impl BucketTable {
    /// Build a table over the domain hashes of a bucket's distinct keys.
    ///
    /// Seeds `first_seed, first_seed + 1, ...` are tried until one succeeds or
    /// `max_attempts` seeds have failed.
    pub fn build(hashes: &[u64], first_seed: u32, max_attempts: u32) -> Result<Self, TableError> {
        if hashes.is_empty() {
            return Ok(Self {
                seed: first_seed,
                ..Self::default()
            });
        }
        let num_keys = hashes.len() as u64;

        if has_duplicate(hashes) {
            trace!("{} keys share domain hashes, no seed can separate them", num_keys);
            return Err(TableError::Exhausted {
                attempts: max_attempts,
            });
        }

        for attempt in 0..max_attempts {
            let seed = first_seed.wrapping_add(attempt);
            let keys = hashes.to_vec();
            if let Some(function) = TableFunction::try_with_conf_stats(keys, build_conf(seed), &mut ()) {
                return Ok(Self {
                    num_keys,
                    seed,
                    function: Some(function),
                });
            }
            trace!("seed {} failed on {} keys", seed, num_keys);
        }

        Err(TableError::Exhausted {
            attempts: max_attempts,
        })
    }

    /// Local index in `[0, num_keys)` of the key with this domain hash.
    ///
    /// `None` for an empty table. A key the table was not built from gets
    /// either `None` or an arbitrary index.
    #[inline]
    pub fn index_of(&self, domain_hash: u64) -> Option<u64> {
        self.function.as_ref()?.get(&domain_hash)
    }

    /// Number of keys the table was built from
    #[inline]
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Seed that produced this table
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Heap and inline bytes used by the table
    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.function.as_ref().map_or(0, |f| f.size_bytes_dyn())
    }

    /// Write the table in its self-delimiting binary form:
    /// `[num_keys: u64][seed: u32]` followed, for a non-empty table, by the
    /// fmph function.
    pub fn write_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&self.num_keys.to_le_bytes())?;
        writer.write_all(&self.seed.to_le_bytes())?;
        if let Some(function) = &self.function {
            function.write(writer)?;
        }
        Ok(())
    }

    /// Read a table written by [`BucketTable::write_to`].
    ///
    /// A function that does not cover exactly `num_keys` keys is rejected
    /// with [`io::ErrorKind::InvalidData`].
    pub fn read_from(reader: &mut dyn Read) -> io::Result<Self> {
        let num_keys = read_u64(reader)?;
        let seed = read_u32(reader)?;
        if num_keys == 0 {
            return Ok(Self {
                seed,
                ..Self::default()
            });
        }

        let function = TableFunction::read_with_hasher(reader, SeededHasher::new(seed))?;
        let covered = function.len() as u64;
        if covered != num_keys {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("table claims {} keys but its function covers {}", num_keys, covered),
            ));
        }

        Ok(Self {
            num_keys,
            seed,
            function: Some(function),
        })
    }
}

impl fmt::Debug for BucketTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketTable")
            .field("num_keys", &self.num_keys)
            .field("seed", &self.seed)
            .field("mem_size", &self.mem_size())
            .finish()
    }
}

pub(crate) fn read_u64(reader: &mut dyn Read) -> io::Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_u32(reader: &mut dyn Read) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xxhash_rust::xxh3::xxh3_64;

    fn sample_hashes(n: u64) -> Vec<u64> {
        (0..n).map(|i| xxh3_64(&i.to_le_bytes())).collect()
    }

    fn assert_minimal_perfect(table: &BucketTable, hashes: &[u64]) {
        let mut seen = vec![false; hashes.len()];
        for &h in hashes {
            let idx = table.index_of(h).unwrap() as usize;
            assert!(idx < hashes.len(), "index {} out of range", idx);
            assert!(!seen[idx], "index {} assigned twice", idx);
            seen[idx] = true;
        }
    }

    fn bytes_of(table: &BucketTable) -> Vec<u8> {
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_build_is_minimal_perfect() {
        for n in [1u64, 2, 3, 7, 64, 1000, 20_000] {
            let hashes = sample_hashes(n);
            let table = BucketTable::build(&hashes, 1, 100).unwrap();
            assert_eq!(table.num_keys(), n);
            assert_minimal_perfect(&table, &hashes);
        }
    }

    #[test]
    fn test_empty_table() {
        let table = BucketTable::build(&[], 5, 100).unwrap();
        assert_eq!(table.num_keys(), 0);
        assert_eq!(table.seed(), 5);
        assert_eq!(table.index_of(123), None);
    }

    #[test]
    fn test_duplicate_hashes_exhaust_seeds() {
        let hashes = vec![42u64, 42, 7];
        let err = BucketTable::build(&hashes, 1, 8).unwrap_err();
        assert_eq!(err, TableError::Exhausted { attempts: 8 });
    }

    #[test]
    fn test_zero_attempts() {
        let hashes = sample_hashes(10);
        assert_eq!(
            BucketTable::build(&hashes, 1, 0).unwrap_err(),
            TableError::Exhausted { attempts: 0 }
        );
    }

    #[test]
    fn test_seed_selects_hash_family() {
        let hashes = sample_hashes(500);
        let a = BucketTable::build(&hashes, 3, 100).unwrap();
        let b = BucketTable::build(&hashes, 3, 100).unwrap();
        let c = BucketTable::build(&hashes, 4, 100).unwrap();

        assert_eq!(bytes_of(&a), bytes_of(&b));
        assert_eq!(c.seed(), 4);
        assert_ne!(bytes_of(&a), bytes_of(&c));
        assert_minimal_perfect(&c, &hashes);
    }

    #[test]
    fn test_write_read_preserves_lookups() {
        let hashes = sample_hashes(3000);
        let table = BucketTable::build(&hashes, 1, 100).unwrap();

        let buf = bytes_of(&table);
        let loaded = BucketTable::read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(loaded.num_keys(), table.num_keys());
        assert_eq!(loaded.seed(), table.seed());
        for &h in &hashes {
            assert_eq!(loaded.index_of(h), table.index_of(h));
        }
        assert_eq!(bytes_of(&loaded), buf);
    }

    #[test]
    fn test_empty_table_is_header_only() {
        let table = BucketTable::build(&[], 9, 100).unwrap();
        let buf = bytes_of(&table);
        assert_eq!(buf.len(), 12);

        let loaded = BucketTable::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.num_keys(), 0);
        assert_eq!(loaded.seed(), 9);
    }

    #[test]
    fn test_read_rejects_inconsistent_header() {
        let table = BucketTable::build(&sample_hashes(100), 1, 100).unwrap();
        let buf = bytes_of(&table);

        // Claim one more key than the function covers
        let mut tampered = buf.clone();
        tampered[..8].copy_from_slice(&101u64.to_le_bytes());
        let err = BucketTable::read_from(&mut tampered.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        // Truncated function words
        let truncated = &buf[..buf.len() - 4];
        let err = BucketTable::read_from(&mut &truncated[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
