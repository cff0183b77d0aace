//! Constants and defaults for index construction
//!
//! Valid k-mer sizes, seed-search parameters and the names of the
//! temporary files written during a build.

/// Default seed for the first perfect-hash attempt of every bucket
pub const DEFAULT_SEED: u32 = 1;

/// Default number of seeds tried per bucket before the build gives up
pub const DEFAULT_MAX_SEED_ATTEMPTS: u32 = 100;

/// Default number of partitions (buckets)
pub const DEFAULT_NUM_BUCKETS: usize = 16;

/// Size of each fmph level as a percentage of the keys entering it.
///
/// 100 gives the smallest tables (about 2.8 bits per key).
pub const TABLE_LEVEL_SIZE_PERCENT: u16 = 100;

/// Common prefix of every temporary file written by a build
pub const TMP_FILE_PREFIX: &str = "kmers";

/// Version number
pub const VERSION: (u8, u8, u8) = (0, 1, 0);

/// All valid k-mer sizes (odd numbers from 3 to 63)
pub const VALID_K_VALUES: &[usize] = &[
    3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 25, 27, 29, 31, 33, 35, 37, 39, 41, 43, 45, 47, 49,
    51, 53, 55, 57, 59, 61, 63,
];

/// Check if a k-mer size is valid
#[inline]
pub const fn is_valid_k(k: usize) -> bool {
    k >= MIN_K && k <= MAX_K && k % 2 == 1
}

/// Maximum k-mer size supported
pub const MAX_K: usize = 63;

/// Minimum k-mer size supported
pub const MIN_K: usize = 3;
