//! Scratch directory for one build run
//!
//! Every file a build creates is named `kmers.<run_id>.<stage>.<bucket>`, so
//! concurrent builds sharing a directory never touch each other's files. When
//! the [`WorkDir`] is dropped, whatever files of its run are still present get
//! removed, whether the build succeeded or not.

use crate::constants::TMP_FILE_PREFIX;
use crate::error::IndexError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary file namespace for a single build
#[derive(Debug)]
pub struct WorkDir {
    dir: PathBuf,
    run_id: String,
}

impl WorkDir {
    /// Create (if needed) `dir` and reserve a fresh run id inside it
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;

        // A clock before the epoch only weakens uniqueness; pid and counter remain
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let run_id = format!(
            "{}-{}-{}",
            std::process::id(),
            nanos,
            RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        debug!("Work directory {:?}, run {}", dir, run_id);

        Ok(Self { dir, run_id })
    }

    /// Directory holding the run's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unique identifier of this run
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Path of the raw partition file for `bucket`
    pub fn raw_path(&self, bucket: usize) -> PathBuf {
        self.file_path("raw", bucket)
    }

    /// Path of the deduplicated partition file for `bucket`
    pub fn unique_path(&self, bucket: usize) -> PathBuf {
        self.file_path("unique", bucket)
    }

    fn file_path(&self, stage: &str, bucket: usize) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}.{}", TMP_FILE_PREFIX, self.run_id, stage, bucket))
    }

    fn run_prefix(&self) -> String {
        format!("{}.{}.", TMP_FILE_PREFIX, self.run_id)
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        let prefix = self.run_prefix();
        for entry in entries.flatten() {
            let is_ours = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix));
            if is_ours {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("Could not remove temporary file {:?}: {}", entry.path(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_are_namespaced_by_run() {
        let tmp = TempDir::new().unwrap();
        let a = WorkDir::new(tmp.path()).unwrap();
        let b = WorkDir::new(tmp.path()).unwrap();

        assert_ne!(a.run_id(), b.run_id());
        assert_ne!(a.raw_path(0), b.raw_path(0));
        assert_ne!(a.raw_path(0), a.unique_path(0));

        let name = a.raw_path(3);
        let name = name.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("kmers."));
        assert!(name.ends_with(".raw.3"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b");
        let work = WorkDir::new(&nested).unwrap();
        assert!(work.dir().is_dir());
    }

    #[test]
    fn test_drop_removes_only_own_files() {
        let tmp = TempDir::new().unwrap();
        let foreign = tmp.path().join("keep.me");
        fs::write(&foreign, b"x").unwrap();

        let other = WorkDir::new(tmp.path()).unwrap();
        fs::write(other.raw_path(0), b"y").unwrap();

        {
            let work = WorkDir::new(tmp.path()).unwrap();
            fs::write(work.raw_path(0), b"abc").unwrap();
            fs::write(work.unique_path(1), b"abc").unwrap();
        }

        assert!(foreign.exists());
        assert!(other.raw_path(0).exists());
        let remaining = fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(remaining, 2);
    }
}
