//! Builder module for constructing k-mer indices
//!
//! This module implements the out-of-core build pipeline:
//! 1. Parse input sequences (FASTA/FASTQ or plain text) or take keys directly
//! 2. Split keys into per-bucket raw partition files
//! 3. Sort and deduplicate each partition through a memory map
//! 4. Build a minimal perfect hash table per bucket
//! 5. Assemble the index

pub mod config;
pub mod index_builder;
pub mod merge;
pub mod parse;
pub mod workdir;

pub use config::BuildConfiguration;
pub use index_builder::{BuildStage, IndexBuilder, StageTracker};
pub use merge::{merge_bucket, MappedRecords};
pub use workdir::WorkDir;
