// kmerindex: out-of-core minimal perfect hashing of k-mers
//
// Builds a dense identifier for every distinct key of a key set much larger
// than memory, by partitioning to disk, deduplicating per partition and
// building one small perfect hash table per partition.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod builder;
pub mod constants;
pub mod domain;
pub mod encoding;
pub mod error;
pub mod hasher;
pub mod index;
pub mod kmer;
pub mod mphf;
pub mod offsets;
pub mod splitter;

// Re-export common types at crate root
pub use builder::{BuildConfiguration, BuildStage, IndexBuilder, WorkDir};
pub use domain::{KeyDomain, KmerDomain, RawRecord};
pub use error::IndexError;
pub use hasher::{KeyInput, SeededHasher};
pub use index::KmerIndex;
pub use kmer::{Kmer, Kmer21, Kmer31, Kmer63, KmerBits};
pub use splitter::{bucket_of, KeySplitter, SequenceSplitter, Splitter};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}
