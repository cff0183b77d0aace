//! Key domains: the fixed-width key type, its raw record and its hash
//!
//! The index never looks inside a key. It only needs to turn a key into a
//! fixed-stride byte record (the form written to partition files), compare
//! records as bytes, and hash them. Everything that makes a k-mer a k-mer lives
//! behind [`KeyDomain`].

use crate::kmer::{Kmer, KmerBits};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// A fixed-width record that can be viewed in place inside a mapped file.
///
/// # Safety
/// Implementors must have alignment 1, no padding and accept every bit
/// pattern. Only byte arrays qualify.
pub unsafe trait RawRecord:
    Copy + Ord + Send + Sync + fmt::Debug + AsRef<[u8]> + AsMut<[u8]> + 'static
{
}

// SAFETY: `[u8; N]` has alignment 1 and every bit pattern is a valid value.
unsafe impl<const N: usize> RawRecord for [u8; N] {}

/// The key type indexed by a [`KmerIndex`](crate::index::KmerIndex).
///
/// The record is the on-disk form of a key and may be wider than the key
/// itself. Record equality must coincide with key equality, and
/// [`KeyDomain::hash_record`] is the single hash every component routes
/// through: partitioning, table construction and lookups.
pub trait KeyDomain: Send + Sync + 'static {
    /// In-memory key
    type Key: Send + Sync;
    /// On-disk record of a key
    type Record: RawRecord;

    /// Bytes per record in partition files
    const RECORD_SIZE: usize = std::mem::size_of::<Self::Record>();

    /// Encode a key as its record
    fn to_record(key: &Self::Key) -> Self::Record;

    /// Decode a record back into a key
    fn from_record(record: &Self::Record) -> Self::Key;

    /// Canonical hash of a record's bytes
    #[inline]
    fn hash_record(record: &[u8]) -> u64 {
        xxh3_64(record)
    }
}

/// Domain of 2-bit packed DNA k-mers of length `K`
#[derive(Debug, Clone, Copy, Default)]
pub struct KmerDomain<const K: usize>;

impl<const K: usize> KeyDomain for KmerDomain<K>
where
    Kmer<K>: KmerBits,
{
    type Key = Kmer<K>;
    type Record = <Kmer<K> as KmerBits>::Record;

    #[inline]
    fn to_record(key: &Kmer<K>) -> Self::Record {
        key.to_record()
    }

    #[inline]
    fn from_record(record: &Self::Record) -> Kmer<K> {
        Kmer::from_record(record)
    }
}

/// View a byte buffer as a slice of records.
///
/// Panics if the record type is zero-sized or the buffer is not a whole
/// number of records.
pub(crate) fn records<R: RawRecord>(bytes: &[u8]) -> &[R] {
    let stride = std::mem::size_of::<R>();
    assert!(stride > 0 && bytes.len() % stride == 0);
    // SAFETY: RawRecord guarantees alignment 1 and no invalid bit patterns,
    // and the length is a whole number of records.
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const R, bytes.len() / stride) }
}

/// Mutable counterpart of [`records`].
pub(crate) fn records_mut<R: RawRecord>(bytes: &mut [u8]) -> &mut [R] {
    let stride = std::mem::size_of::<R>();
    assert!(stride > 0 && bytes.len() % stride == 0);
    // SAFETY: see `records`; the exclusive borrow carries over.
    unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut R, bytes.len() / stride) }
}
