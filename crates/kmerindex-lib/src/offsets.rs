//! Per-bucket offsets into the global identifier space
//!
//! `offsets[i]` is the number of distinct keys in buckets `0..i`, so a key's
//! global identifier is `offsets[bucket] + local_index`. The vector always
//! starts with 0 and has one more entry than there are buckets.

use crate::error::IndexError;
use crate::mphf::read_u64;
use std::io::{self, Read, Write};

/// Prefix sums of per-bucket distinct key counts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetsVector {
    offsets: Vec<u64>,
}

impl OffsetsVector {
    /// Create a vector for zero buckets (`[0]`)
    pub fn new() -> Self {
        Self { offsets: vec![0] }
    }

    /// Build from raw offsets, checking that they start at 0 and never decrease
    pub fn from_vec(offsets: Vec<u64>) -> Result<Self, IndexError> {
        if offsets.first() != Some(&0) {
            return Err(IndexError::Corrupt("offsets must start at 0".to_string()));
        }
        if let Some(i) = offsets.windows(2).position(|w| w[1] < w[0]) {
            return Err(IndexError::Corrupt(format!(
                "offsets decrease between bucket {} and {}",
                i,
                i + 1
            )));
        }
        Ok(Self { offsets })
    }

    /// Append the next bucket's distinct key count
    #[inline]
    pub fn push_count(&mut self, count: u64) {
        let total = self.total();
        self.offsets.push(total + count);
    }

    /// Get the offset at index `i`
    #[inline]
    pub fn access(&self, i: usize) -> u64 {
        assert!(i < self.offsets.len(), "Offset index {} out of bounds", i);
        self.offsets[i]
    }

    /// Number of distinct keys in bucket `i`
    #[inline]
    pub fn bucket_len(&self, i: usize) -> u64 {
        self.offsets[i + 1] - self.offsets[i]
    }

    /// Total number of distinct keys (`offsets[B]`)
    #[inline]
    pub fn total(&self) -> u64 {
        // Never empty: construction guarantees the leading 0
        self.offsets[self.offsets.len() - 1]
    }

    /// Number of buckets covered
    #[inline]
    pub fn num_buckets(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Get the number of offsets (buckets + 1)
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Never true once constructed: the leading 0 is always present
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Raw offsets
    pub fn as_slice(&self) -> &[u64] {
        &self.offsets
    }

    /// Get the number of bytes used
    #[inline]
    pub fn num_bytes(&self) -> u64 {
        (self.offsets.len() * 8) as u64
    }

    /// Write all `B + 1` offsets
    pub fn write_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        for offset in &self.offsets {
            writer.write_all(&offset.to_le_bytes())?;
        }
        Ok(())
    }

    /// Read `num_buckets + 1` offsets and validate them
    pub fn read_from(reader: &mut dyn Read, num_buckets: usize) -> Result<Self, IndexError> {
        let mut offsets = Vec::new();
        for _ in 0..=num_buckets {
            offsets.push(read_u64(reader).map_err(IndexError::from_decode)?);
        }
        Self::from_vec(offsets)
    }
}

impl Default for OffsetsVector {
    fn default() -> Self {
        Self::new()
    }
}
