//! Sequence input: FASTA/FASTQ (optionally gzipped) or plain text
//!
//! FASTA/FASTQ goes through needletail. Any other file is read as plain
//! text with one sequence per line. K-mers are extracted with a rolling window
//! that restarts after every non-ACGT base.

use crate::encoding::encode_base;
use crate::error::IndexError;
use crate::kmer::{Kmer, KmerBits};
use needletail::parse_fastx_file;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Input file layout, decided from the first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// FASTA, FASTQ or a gzip stream of either
    Fastx,
    /// One sequence per line
    PlainText,
}

/// Detect the layout of `path`
pub fn detect_format(path: &Path) -> Result<InputFormat, IndexError> {
    let mut file = File::open(path).map_err(|e| IndexError::io(path, e))?;
    let mut first = [0u8; 1];
    let n = file.read(&mut first).map_err(|e| IndexError::io(path, e))?;
    Ok(match (n, first[0]) {
        (1, b'>') | (1, b'@') | (1, 0x1f) => InputFormat::Fastx,
        _ => InputFormat::PlainText,
    })
}

/// Call `callback` with every sequence in `path`
pub fn for_each_sequence<F>(path: &Path, mut callback: F) -> Result<(), IndexError>
where
    F: FnMut(&[u8]) -> Result<(), IndexError>,
{
    match detect_format(path)? {
        InputFormat::Fastx => {
            let mut reader = parse_fastx_file(path).map_err(|e| IndexError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            while let Some(record) = reader.next() {
                let record = record.map_err(|e| IndexError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                callback(&record.seq())?;
            }
        }
        InputFormat::PlainText => {
            let file = File::open(path).map_err(|e| IndexError::io(path, e))?;
            let mut reader = BufReader::new(file);
            let mut line = Vec::new();
            loop {
                line.clear();
                let n = reader
                    .read_until(b'\n', &mut line)
                    .map_err(|e| IndexError::io(path, e))?;
                if n == 0 {
                    break;
                }
                let seq = line.trim_ascii_end();
                if !seq.is_empty() {
                    callback(seq)?;
                }
            }
        }
    }
    Ok(())
}

/// Call `callback` with every k-mer of `seq`, skipping windows with non-ACGT bases
pub fn for_each_kmer_in<const K: usize, F>(
    seq: &[u8],
    canonical: bool,
    mut callback: F,
) -> Result<(), IndexError>
where
    Kmer<K>: KmerBits,
    F: FnMut(Kmer<K>) -> Result<(), IndexError>,
{
    let mut kmer = Kmer::<K>::default();
    let mut valid = 0usize;
    for &base in seq {
        match encode_base(base) {
            Ok(code) => {
                kmer = kmer.roll(code);
                valid += 1;
                if valid >= K {
                    callback(if canonical { kmer.canonical() } else { kmer })?;
                }
            }
            Err(_) => valid = 0,
        }
    }
    Ok(())
}

/// Call `callback` with every k-mer in every sequence of `path`
pub fn for_each_kmer<const K: usize, F>(
    path: &Path,
    canonical: bool,
    mut callback: F,
) -> Result<(), IndexError>
where
    Kmer<K>: KmerBits,
    F: FnMut(Kmer<K>) -> Result<(), IndexError>,
{
    for_each_sequence(path, |seq| for_each_kmer_in::<K, _>(seq, canonical, &mut callback))
}
