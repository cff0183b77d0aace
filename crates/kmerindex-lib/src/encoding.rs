//! DNA nucleotide encoding
//!
//! 2-bit encoding of nucleotides used by the packed k-mer type:
//! - A (65/97)  -> 00
//! - C (67/99)  -> 01
//! - G (71/103) -> 11
//! - T (84/116) -> 10
//!
//! With this layout complementing a base is a single XOR with `0b10`.

use thiserror::Error;

/// Error type for encoding operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The input byte is not a valid DNA base (A/C/G/T)
    #[error("Invalid DNA base: {0:?}")]
    InvalidBase(u8),
    /// The input string length does not match the expected k-mer length
    #[error("K-mer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Expected k-mer length
        expected: usize,
        /// Actual string length
        actual: usize,
    },
}

/// Encode a single DNA nucleotide to 2 bits
#[inline]
pub const fn encode_base(base: u8) -> Result<u8, EncodingError> {
    match base {
        b'A' | b'a' => Ok(0b00),
        b'C' | b'c' => Ok(0b01),
        b'G' | b'g' => Ok(0b11),
        b'T' | b't' => Ok(0b10),
        _ => Err(EncodingError::InvalidBase(base)),
    }
}

/// Decode a 2-bit value to DNA nucleotide (uppercase)
#[inline]
pub const fn decode_base(bits: u8) -> u8 {
    match bits & 0b11 {
        0b00 => b'A',
        0b01 => b'C',
        0b11 => b'G',
        _ => b'T',
    }
}

/// Get the complement of an encoded base
#[inline]
pub const fn complement_base(bits: u8) -> u8 {
    bits ^ 0b10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_base() {
        assert_eq!(encode_base(b'A').unwrap(), 0b00);
        assert_eq!(encode_base(b'a').unwrap(), 0b00);
        assert_eq!(encode_base(b'C').unwrap(), 0b01);
        assert_eq!(encode_base(b'G').unwrap(), 0b11);
        assert_eq!(encode_base(b't').unwrap(), 0b10);

        assert_eq!(encode_base(b'N'), Err(EncodingError::InvalidBase(b'N')));
        assert!(encode_base(b'0').is_err());
    }

    #[test]
    fn test_decode_inverts_encode() {
        for &base in b"ACGT" {
            assert_eq!(decode_base(encode_base(base).unwrap()), base);
        }
    }

    #[test]
    fn test_complement_base() {
        assert_eq!(complement_base(0b00), 0b10); // A -> T
        assert_eq!(complement_base(0b10), 0b00); // T -> A
        assert_eq!(complement_base(0b01), 0b11); // C -> G
        assert_eq!(complement_base(0b11), 0b01); // G -> C
    }
}
