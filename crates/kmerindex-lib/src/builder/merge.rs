//! Per-partition sort and deduplication
//!
//! A raw partition file is mapped writable, sorted in place by raw record
//! bytes, compacted, and written out as the partition's distinct keys. The raw
//! file is removed afterwards, on error paths too.

use crate::domain::{records, records_mut, KeyDomain, RawRecord};
use crate::error::IndexError;
use memmap2::MmapMut;
use rayon::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Write buffer for deduplicated output
const WRITE_BUFFER_BYTES: usize = 1024 * 1024;

/// A partition file mapped as a mutable array of records.
///
/// Dropping it unmaps the file and deletes it. Empty files are not mapped.
pub struct MappedRecords<R: RawRecord> {
    mmap: Option<MmapMut>,
    path: Option<PathBuf>,
    _record: PhantomData<R>,
}

impl<R: RawRecord> MappedRecords<R> {
    /// Map `path`, rejecting files that are not a whole number of records
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let stride = std::mem::size_of::<R>();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| IndexError::io(path, e))?;
        let len = file.metadata().map_err(|e| IndexError::io(path, e))?.len();

        if len % stride as u64 != 0 {
            return Err(IndexError::MalformedPartition {
                path: path.to_path_buf(),
                len,
                stride,
            });
        }

        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: partition files are private to this build run and nothing
            // else resizes them while mapped.
            Some(unsafe { MmapMut::map_mut(&file) }.map_err(|e| IndexError::io(path, e))?)
        };

        Ok(Self {
            mmap,
            path: Some(path.to_path_buf()),
            _record: PhantomData,
        })
    }

    /// Number of records in the file
    pub fn len(&self) -> usize {
        self.mmap
            .as_ref()
            .map_or(0, |m| m.len() / std::mem::size_of::<R>())
    }

    /// True if the file holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records as a slice
    pub fn records(&self) -> &[R] {
        match &self.mmap {
            Some(mmap) => records(mmap),
            None => &[],
        }
    }

    /// Records as a mutable slice
    pub fn records_mut(&mut self) -> &mut [R] {
        match &mut self.mmap {
            Some(mmap) => records_mut(mmap),
            None => &mut [],
        }
    }

    /// Unmap and delete the file, reporting failure
    pub fn remove(mut self) -> Result<(), IndexError> {
        self.mmap.take();
        match self.path.take() {
            Some(path) => fs::remove_file(&path).map_err(|e| IndexError::io(path, e)),
            None => Ok(()),
        }
    }
}

impl<R: RawRecord> Drop for MappedRecords<R> {
    fn drop(&mut self) {
        self.mmap.take();
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Could not remove partition file {:?}: {}", path, e);
            }
        }
    }
}

/// Compact a sorted slice so its first `n` elements are the distinct values.
///
/// Returns `n`. Elements past `n` are left in an unspecified order.
pub fn dedup_sorted<T: PartialEq + Copy>(items: &mut [T]) -> usize {
    if items.is_empty() {
        return 0;
    }
    let mut write = 1;
    for read in 1..items.len() {
        if items[read] != items[write - 1] {
            items[write] = items[read];
            write += 1;
        }
    }
    write
}

/// Sort and deduplicate one raw partition.
///
/// Writes the distinct records of `input` to `output` (exactly
/// `count * RECORD_SIZE` bytes), deletes `input` and returns `count`.
pub fn merge_bucket<D: KeyDomain>(input: &Path, output: &Path) -> Result<u64, IndexError> {
    let mut mapped = MappedRecords::<D::Record>::open(input)?;
    let total = mapped.len();

    let count = {
        let recs = mapped.records_mut();
        recs.par_sort_unstable();
        dedup_sorted(recs)
    };

    write_records(output, &mapped.records()[..count])?;
    mapped.remove()?;

    debug!(
        "Merged {:?}: {} records, {} distinct",
        input.file_name().unwrap_or_default(),
        total,
        count
    );
    Ok(count as u64)
}

fn write_records<R: RawRecord>(path: &Path, recs: &[R]) -> Result<(), IndexError> {
    let file = File::create(path).map_err(|e| IndexError::io(path, e))?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    for record in recs {
        writer
            .write_all(record.as_ref())
            .map_err(|e| IndexError::io(path, e))?;
    }
    writer.flush().map_err(|e| IndexError::io(path, e))?;
    Ok(())
}
