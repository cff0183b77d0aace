//! Error type for building, saving and loading indices

use crate::builder::BuildStage;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by index construction and persistence.
///
/// Every variant is fatal for the operation that produced it: a failed build or
/// load never yields an index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A file could not be created, read, written or removed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Reading from or writing to a serialization stream failed
    #[error("stream error: {0}")]
    Stream(#[from] io::Error),

    /// No seed within the attempt budget produced a perfect hash for a bucket
    #[error("perfect hash construction failed for bucket {bucket} after {attempts} seeds")]
    SeedSearchExhausted {
        /// Bucket index
        bucket: usize,
        /// Number of seeds tried
        attempts: u32,
    },

    /// A partition file is not a whole number of records
    #[error("partition file {} has {len} bytes, not a multiple of the {stride}-byte record", .path.display())]
    MalformedPartition {
        /// Offending path
        path: PathBuf,
        /// File length in bytes
        len: u64,
        /// Record stride in bytes
        stride: usize,
    },

    /// A record sits in a bucket its hash does not route to
    #[error("record in bucket {bucket} hashes to bucket {expected}")]
    MisroutedRecord {
        /// Bucket the record was found in
        bucket: usize,
        /// Bucket its hash selects
        expected: usize,
    },

    /// The splitter returned the wrong number of partitions
    #[error("splitter produced {actual} partitions, expected {expected}")]
    PartitionCount {
        /// Requested bucket count
        expected: usize,
        /// Partitions returned
        actual: usize,
    },

    /// The build pipeline tried to skip or repeat a stage
    #[error("invalid build transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current stage
        from: BuildStage,
        /// Requested stage
        to: BuildStage,
    },

    /// An input sequence file could not be parsed
    #[error("failed to parse {}: {message}", .path.display())]
    Parse {
        /// Offending path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Serialized data is inconsistent
    #[error("corrupt index: {0}")]
    Corrupt(String),

    /// Invalid build configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The worker pool could not be created
    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl IndexError {
    /// Attach a path to an I/O error
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify an error raised while decoding a stream.
    ///
    /// Truncation and invalid data mean the stream is inconsistent with its
    /// own header; anything else is a genuine I/O failure.
    pub(crate) fn from_decode(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => IndexError::Corrupt("stream ends early".to_string()),
            io::ErrorKind::InvalidData => IndexError::Corrupt(err.to_string()),
            _ => IndexError::Stream(err),
        }
    }
}
