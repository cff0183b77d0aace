//! Seeded hashing of keys for perfect-hash construction
//!
//! Tables are built from raw records read back from disk but queried with
//! typed keys. Both forms go through [`KeyInput::domain_hash`], which encodes a
//! typed key as its record before hashing, so the two paths cannot drift
//! apart. The domain hash is then mixed with a 32-bit seed using XXH3, giving
//! a fresh, independent hash for every retry of a bucket's seed search.
//!
//! [`SeededHasher`] is also the hash family of the bucket tables: as a
//! [`BuildSeededHasher`] it combines its own seed with the per-level seed the
//! table construction asks for.

use crate::domain::KeyDomain;
use ph::BuildSeededHasher;
use std::hash::Hasher;
use xxhash_rust::xxh3::{xxh3_128_with_seed, xxh3_64_with_seed};

/// A key in either of its two forms
pub enum KeyInput<'a, D: KeyDomain> {
    /// Raw on-disk record
    Record(&'a D::Record),
    /// Typed in-memory key
    Key(&'a D::Key),
}

impl<D: KeyDomain> Clone for KeyInput<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: KeyDomain> Copy for KeyInput<'_, D> {}

impl<D: KeyDomain> KeyInput<'_, D> {
    /// Domain hash of the key, identical for both forms of the same key
    #[inline]
    pub fn domain_hash(&self) -> u64 {
        match self {
            KeyInput::Record(record) => D::hash_record(record.as_ref()),
            KeyInput::Key(key) => D::hash_record(D::to_record(key).as_ref()),
        }
    }
}

/// Reseedable 32-bit and 128-bit hashes over a key's domain hash
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeededHasher {
    seed: u32,
}

impl SeededHasher {
    /// Create a hasher for the given seed
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Get the seed value
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// 32-bit seeded hash of a key
    #[inline]
    pub fn hash32<D: KeyDomain>(&self, input: KeyInput<'_, D>) -> u32 {
        self.mix32(input.domain_hash())
    }

    /// 128-bit seeded hash of a key
    #[inline]
    pub fn hash128<D: KeyDomain>(&self, input: KeyInput<'_, D>) -> u128 {
        self.mix128(input.domain_hash())
    }

    /// Mix an already computed domain hash down to 32 bits
    #[inline]
    pub fn mix32(&self, domain_hash: u64) -> u32 {
        xxh3_64_with_seed(&domain_hash.to_le_bytes(), self.seed as u64) as u32
    }

    /// Mix an already computed domain hash into 128 bits
    #[inline]
    pub fn mix128(&self, domain_hash: u64) -> u128 {
        xxh3_128_with_seed(&domain_hash.to_le_bytes(), self.seed as u64)
    }
}

impl BuildSeededHasher for SeededHasher {
    type Hasher = LevelHasher;

    #[inline]
    fn build_hasher(&self, level: u32) -> LevelHasher {
        LevelHasher {
            seed: ((self.seed as u64) << 32) | level as u64,
            state: 0,
        }
    }
}

/// Streaming XXH3 state for one (table seed, level) pair
#[derive(Clone, Copy, Debug)]
pub struct LevelHasher {
    seed: u64,
    state: u64,
}

impl Hasher for LevelHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.state = xxh3_64_with_seed(bytes, self.seed ^ self.state);
    }

    // Little-endian regardless of platform
    #[inline]
    fn write_u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KmerDomain;
    use crate::kmer::Kmer;

    type D = KmerDomain<21>;

    #[test]
    fn test_record_and_key_hash_identically() {
        let kmer: Kmer<21> = Kmer::from_str("ACGTACGTTTGCAGGCATCAA").unwrap();
        let record = kmer.to_record();
        let hasher = SeededHasher::new(7);

        assert_eq!(
            KeyInput::<D>::Record(&record).domain_hash(),
            KeyInput::<D>::Key(&kmer).domain_hash()
        );
        assert_eq!(
            hasher.hash32(KeyInput::<D>::Record(&record)),
            hasher.hash32(KeyInput::<D>::Key(&kmer))
        );
        assert_eq!(
            hasher.hash128(KeyInput::<D>::Record(&record)),
            hasher.hash128(KeyInput::<D>::Key(&kmer))
        );
    }

    #[test]
    fn test_seed_changes_hash() {
        let kmer: Kmer<21> = Kmer::from_str("ACGTACGTTTGCAGGCATCAA").unwrap();
        let input = KeyInput::<D>::Key(&kmer);

        let h1 = SeededHasher::new(1);
        let h2 = SeededHasher::new(1);
        let h3 = SeededHasher::new(2);

        assert_eq!(h1.hash128(input), h2.hash128(input));
        assert_ne!(h1.hash128(input), h3.hash128(input));
        assert_ne!(h1.hash32(input), h3.hash32(input));
    }

    #[test]
    fn test_mix_is_pure() {
        let hasher = SeededHasher::new(42);
        assert_eq!(hasher.seed(), 42);
        assert_eq!(hasher.mix32(12345), hasher.mix32(12345));
        assert_ne!(hasher.mix128(12345), hasher.mix128(12346));
    }

    #[test]
    fn test_level_hashes_depend_on_seed_and_level() {
        let a = SeededHasher::new(1);
        let b = SeededHasher::new(2);
        let domain_hash = 0xDEAD_BEEF_u64;

        assert_eq!(a.hash_one(domain_hash, 0), a.hash_one(domain_hash, 0));
        assert_ne!(a.hash_one(domain_hash, 0), a.hash_one(domain_hash, 1));
        assert_ne!(a.hash_one(domain_hash, 0), b.hash_one(domain_hash, 0));
    }
}
