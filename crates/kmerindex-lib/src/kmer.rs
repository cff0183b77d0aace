//! K-mer representation with const generics and optimal storage
//!
//! K-mers are packed two bits per base, base `i` of the string at bits
//! `2i..2i+2`. Storage is selected per K (u64 for K ≤ 31, u128 for K > 31)
//! and doubles as the on-disk record: the little-endian bytes of the storage
//! word, with the unused high bits zeroed as padding.

use crate::domain::RawRecord;
use crate::encoding::{decode_base, encode_base, EncodingError};
use std::fmt;
use std::hash::Hash;
use std::ops::{BitAnd, BitOr, Not, Shl, Shr};

/// Trait defining storage and record layout for a given K
///
/// Implemented for all odd K from 3 to 63.
pub trait KmerBits: Sized {
    /// The underlying storage type (u64 or u128)
    type Storage: Copy
        + Ord
        + Hash
        + Default
        + fmt::Debug
        + Send
        + Sync
        + From<u8>
        + BitAnd<Output = Self::Storage>
        + BitOr<Output = Self::Storage>
        + Not<Output = Self::Storage>
        + Shl<usize, Output = Self::Storage>
        + Shr<usize, Output = Self::Storage>;

    /// Fixed-stride on-disk form of the storage word
    type Record: RawRecord;

    /// Number of bits in the storage type
    const BITS: usize;

    /// Convert storage to u8 (truncates)
    fn to_u8(val: Self::Storage) -> u8;

    /// Little-endian bytes of the storage word
    fn to_record(val: Self::Storage) -> Self::Record;

    /// Inverse of [`KmerBits::to_record`]
    fn from_record(record: &Self::Record) -> Self::Storage;

    /// Reverse complement of a packed k-mer
    fn reverse_complement_bits(val: Self::Storage) -> Self::Storage;
}

#[inline]
fn reverse_complement_u64(x: u64, k: usize) -> u64 {
    // Complement: XOR with 0xAAAA... flips A<->T, C<->G
    let mut x = x ^ 0xAAAA_AAAA_AAAA_AAAAu64;
    x = ((x >> 2) & 0x3333_3333_3333_3333u64) | ((x & 0x3333_3333_3333_3333u64) << 2);
    x = ((x >> 4) & 0x0F0F_0F0F_0F0F_0F0Fu64) | ((x & 0x0F0F_0F0F_0F0F_0F0Fu64) << 4);
    x = x.swap_bytes();
    x >> (64 - k * 2)
}

#[inline]
fn reverse_complement_u128(x: u128, k: usize) -> u128 {
    let mut x = x ^ 0xAAAA_AAAA_AAAA_AAAA_AAAA_AAAA_AAAA_AAAAu128;
    x = ((x >> 2) & 0x3333_3333_3333_3333_3333_3333_3333_3333u128)
        | ((x & 0x3333_3333_3333_3333_3333_3333_3333_3333u128) << 2);
    x = ((x >> 4) & 0x0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0Fu128)
        | ((x & 0x0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0Fu128) << 4);
    x = x.swap_bytes();
    x >> (128 - k * 2)
}

macro_rules! impl_kmer_bits {
    ($storage:ty, $bytes:literal, $rc:ident; $($k:literal),* $(,)?) => {
        $(
            impl KmerBits for Kmer<$k> {
                type Storage = $storage;
                type Record = [u8; $bytes];
                const BITS: usize = $bytes * 8;

                #[inline]
                fn to_u8(val: Self::Storage) -> u8 {
                    val as u8
                }

                #[inline]
                fn to_record(val: Self::Storage) -> Self::Record {
                    val.to_le_bytes()
                }

                #[inline]
                fn from_record(record: &Self::Record) -> Self::Storage {
                    <$storage>::from_le_bytes(*record)
                }

                #[inline]
                fn reverse_complement_bits(val: Self::Storage) -> Self::Storage {
                    $rc(val, $k)
                }
            }
        )*
    };
}

impl_kmer_bits!(u64, 8, reverse_complement_u64; 3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 25, 27, 29, 31);
impl_kmer_bits!(u128, 16, reverse_complement_u128; 33, 35, 37, 39, 41, 43, 45, 47, 49, 51, 53, 55, 57, 59, 61, 63);

/// Run `$body` with `$K` bound to the runtime k-mer length `$k` as a const.
///
/// Panics on an unsupported `k`; validate with
/// [`is_valid_k`](crate::constants::is_valid_k) first.
#[macro_export]
macro_rules! dispatch_on_k {
    ($k:expr, $K:ident => $body:expr) => {
        match $k {
            3 => { const $K: usize = 3; $body }
            5 => { const $K: usize = 5; $body }
            7 => { const $K: usize = 7; $body }
            9 => { const $K: usize = 9; $body }
            11 => { const $K: usize = 11; $body }
            13 => { const $K: usize = 13; $body }
            15 => { const $K: usize = 15; $body }
            17 => { const $K: usize = 17; $body }
            19 => { const $K: usize = 19; $body }
            21 => { const $K: usize = 21; $body }
            23 => { const $K: usize = 23; $body }
            25 => { const $K: usize = 25; $body }
            27 => { const $K: usize = 27; $body }
            29 => { const $K: usize = 29; $body }
            31 => { const $K: usize = 31; $body }
            33 => { const $K: usize = 33; $body }
            35 => { const $K: usize = 35; $body }
            37 => { const $K: usize = 37; $body }
            39 => { const $K: usize = 39; $body }
            41 => { const $K: usize = 41; $body }
            43 => { const $K: usize = 43; $body }
            45 => { const $K: usize = 45; $body }
            47 => { const $K: usize = 47; $body }
            49 => { const $K: usize = 49; $body }
            51 => { const $K: usize = 51; $body }
            53 => { const $K: usize = 53; $body }
            55 => { const $K: usize = 55; $body }
            57 => { const $K: usize = 57; $body }
            59 => { const $K: usize = 59; $body }
            61 => { const $K: usize = 61; $body }
            63 => { const $K: usize = 63; $body }
            other => panic!("unsupported k-mer length: {}", other),
        }
    };
}

/// K-mer with compile-time length and packed storage
///
/// # Example
/// ```
/// use kmerindex_lib::kmer::Kmer;
///
/// let kmer: Kmer<5> = Kmer::from_str("ACGTG").unwrap();
/// assert_eq!(kmer.reverse_complement().to_string(), "CACGT");
/// ```
#[derive(Clone, Copy)]
pub struct Kmer<const K: usize>
where
    Kmer<K>: KmerBits,
{
    bits: <Kmer<K> as KmerBits>::Storage,
}

impl<const K: usize> Kmer<K>
where
    Kmer<K>: KmerBits,
{
    /// Create a new k-mer from raw bits
    #[inline]
    pub fn new(bits: <Kmer<K> as KmerBits>::Storage) -> Self {
        Self { bits }
    }

    /// Get the raw bits
    #[inline]
    pub fn bits(&self) -> <Kmer<K> as KmerBits>::Storage {
        self.bits
    }

    /// Create a k-mer from a DNA string
    ///
    /// # Errors
    /// Returns an error if the string length doesn't match K or contains invalid bases.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, EncodingError> {
        <Self as std::str::FromStr>::from_str(s)
    }

    /// Create a k-mer from the first K bytes of an ASCII sequence
    ///
    /// # Errors
    /// Returns an error if the slice is shorter than K or contains invalid bases.
    pub fn from_ascii(seq: &[u8]) -> Result<Self, EncodingError> {
        if seq.len() < K {
            return Err(EncodingError::LengthMismatch {
                expected: K,
                actual: seq.len(),
            });
        }
        let mut bits = <Kmer<K> as KmerBits>::Storage::from(0u8);
        for (i, &base) in seq[..K].iter().enumerate() {
            let encoded = <Kmer<K> as KmerBits>::Storage::from(encode_base(base)?);
            bits = bits | (encoded << (i * 2));
        }
        Ok(Self { bits })
    }

    /// Get the reverse complement of this k-mer
    #[inline]
    pub fn reverse_complement(&self) -> Self {
        Self {
            bits: <Kmer<K> as KmerBits>::reverse_complement_bits(self.bits),
        }
    }

    /// Get the canonical representation (minimum of forward and reverse complement)
    pub fn canonical(&self) -> Self {
        let rc = self.reverse_complement();
        if self.bits <= rc.bits {
            *self
        } else {
            rc
        }
    }

    /// Extract a base at a specific position (0-indexed)
    pub fn get_base(&self, pos: usize) -> u8 {
        assert!(pos < K, "Position {} out of bounds for k-mer of length {}", pos, K);
        let three = <Kmer<K> as KmerBits>::Storage::from(0b11u8);
        <Kmer<K> as KmerBits>::to_u8((self.bits >> (pos * 2)) & three)
    }

    /// Slide the window one base to the right.
    ///
    /// Drops the first base and appends the 2-bit encoded `base` as the last one.
    #[inline]
    pub fn roll(self, base: u8) -> Self {
        debug_assert!(base <= 0b11, "Base value must be 0-3");
        let incoming = <Kmer<K> as KmerBits>::Storage::from(base) << ((K - 1) * 2);
        Self {
            bits: (self.bits >> 2) | incoming,
        }
    }

    /// On-disk record of this k-mer
    #[inline]
    pub fn to_record(&self) -> <Kmer<K> as KmerBits>::Record {
        <Kmer<K> as KmerBits>::to_record(self.bits)
    }

    /// Rebuild a k-mer from its on-disk record
    #[inline]
    pub fn from_record(record: &<Kmer<K> as KmerBits>::Record) -> Self {
        Self {
            bits: <Kmer<K> as KmerBits>::from_record(record),
        }
    }
}

impl<const K: usize> PartialEq for Kmer<K>
where
    Kmer<K>: KmerBits,
{
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<const K: usize> Eq for Kmer<K> where Kmer<K>: KmerBits {}

impl<const K: usize> PartialOrd for Kmer<K>
where
    Kmer<K>: KmerBits,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<const K: usize> Ord for Kmer<K>
where
    Kmer<K>: KmerBits,
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bits.cmp(&other.bits)
    }
}

impl<const K: usize> Hash for Kmer<K>
where
    Kmer<K>: KmerBits,
{
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<const K: usize> fmt::Debug for Kmer<K>
where
    Kmer<K>: KmerBits,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kmer<{}>(\"{}\")", K, self)
    }
}

impl<const K: usize> fmt::Display for Kmer<K>
where
    Kmer<K>: KmerBits,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pos in 0..K {
            write!(f, "{}", decode_base(self.get_base(pos)) as char)?;
        }
        Ok(())
    }
}

impl<const K: usize> Default for Kmer<K>
where
    Kmer<K>: KmerBits,
{
    fn default() -> Self {
        Self {
            bits: <Kmer<K> as KmerBits>::Storage::default(),
        }
    }
}

impl<const K: usize> std::str::FromStr for Kmer<K>
where
    Kmer<K>: KmerBits,
{
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != K {
            return Err(EncodingError::LengthMismatch {
                expected: K,
                actual: s.len(),
            });
        }
        Self::from_ascii(s.as_bytes())
    }
}

/// Type alias for 31-mers
pub type Kmer31 = Kmer<31>;
/// Type alias for 21-mers
pub type Kmer21 = Kmer<21>;
/// Type alias for 63-mers
pub type Kmer63 = Kmer<63>;
