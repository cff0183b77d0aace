use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kmerindex_lib::builder::parse::for_each_kmer;
use kmerindex_lib::constants::{is_valid_k, DEFAULT_MAX_SEED_ATTEMPTS, DEFAULT_NUM_BUCKETS, DEFAULT_SEED};
use kmerindex_lib::{
    BuildConfiguration, IndexBuilder, Kmer, KmerBits, KmerDomain, KmerIndex, SequenceSplitter,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "kmerindex")]
#[command(version = "0.1.0")]
#[command(about = "Out-of-core minimal perfect hashing of k-mers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from input files
    Build {
        /// Input FASTA/FASTQ or plain text files (one sequence per line)
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// K-mer length (odd, 3..=63)
        #[arg(short, long)]
        k: usize,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of buckets the key space is partitioned into
        #[arg(short, long, default_value_t = DEFAULT_NUM_BUCKETS)]
        buckets: usize,

        /// Use canonical k-mers (k-mer or reverse complement, whichever is smaller)
        #[arg(long, default_value = "false")]
        canonical: bool,

        /// Number of threads (0 = all available cores)
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,

        /// Directory for temporary partition files
        #[arg(short = 'd', long, default_value = "kmerindex_tmp")]
        tmp_dir: PathBuf,

        /// First seed tried for every bucket
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u32,

        /// Seeds tried per bucket before giving up
        #[arg(long, default_value_t = DEFAULT_MAX_SEED_ATTEMPTS)]
        max_seed_attempts: u32,

        /// Merge partitions in parallel
        #[arg(long, default_value = "false")]
        pipelined_merge: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the identifier of every k-mer in a query file
    Query {
        /// Index file
        #[arg(short, long)]
        index: PathBuf,

        /// K-mer length the index was built with
        #[arg(short, long)]
        k: usize,

        /// Query file, one k-mer per line
        #[arg(short, long)]
        query: PathBuf,

        /// Canonicalize queries (use when the index was built with --canonical)
        #[arg(long, default_value = "false")]
        canonical: bool,
    },

    /// Check that the index is a bijection over the k-mers of its input
    Check {
        /// Index file
        #[arg(short, long)]
        index: PathBuf,

        /// K-mer length the index was built with
        #[arg(short, long)]
        k: usize,

        /// Input files used to build the index
        #[arg(short = 'f', long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// The index was built with canonical k-mers
        #[arg(long, default_value = "false")]
        canonical: bool,
    },

    /// Print the space breakdown of an index
    Stats {
        /// Index file
        #[arg(short, long)]
        index: PathBuf,

        /// K-mer length the index was built with
        #[arg(short, long)]
        k: usize,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            k,
            output,
            buckets,
            canonical,
            threads,
            tmp_dir,
            seed,
            max_seed_attempts,
            pipelined_merge,
            verbose,
        } => {
            check_k(k)?;
            let config = BuildConfiguration {
                num_buckets: buckets,
                num_threads: threads,
                seed,
                max_seed_attempts,
                pipelined_merge,
                verbose,
                tmp_dirname: tmp_dir,
            };
            let output = output.unwrap_or_else(|| default_output_path(&input[0]));
            kmerindex_lib::dispatch_on_k!(k, K => {
                build_with_k::<K>(input, canonical, config, &output)
            })
        }
        Commands::Query {
            index,
            k,
            query,
            canonical,
        } => {
            check_k(k)?;
            kmerindex_lib::dispatch_on_k!(k, K => {
                query_with_k::<K>(&index, &query, canonical)
            })
        }
        Commands::Check {
            index,
            k,
            input,
            canonical,
        } => {
            check_k(k)?;
            kmerindex_lib::dispatch_on_k!(k, K => {
                check_with_k::<K>(&index, &input, canonical)
            })
        }
        Commands::Stats { index, k } => {
            check_k(k)?;
            kmerindex_lib::dispatch_on_k!(k, K => {
                stats_with_k::<K>(&index)
            })
        }
    }
}

fn check_k(k: usize) -> anyhow::Result<()> {
    if !is_valid_k(k) {
        bail!("k must be odd and in range [3, 63], got k={}", k);
    }
    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("index");
    PathBuf::from(format!("{}.kmi", stem))
}

fn load_index<const K: usize>(path: &Path) -> anyhow::Result<KmerIndex<KmerDomain<K>>>
where
    Kmer<K>: KmerBits,
{
    info!("Loading index from {:?}...", path);
    let index = KmerIndex::<KmerDomain<K>>::load(path)
        .with_context(|| format!("Failed to load index {}", path.display()))?;
    info!(
        "Index loaded (k={}, keys={}, buckets={})",
        K,
        index.num_keys(),
        index.num_buckets()
    );
    Ok(index)
}

/// Build an index over the k-mers of the input files
fn build_with_k<const K: usize>(
    input: Vec<PathBuf>,
    canonical: bool,
    config: BuildConfiguration,
    output: &Path,
) -> anyhow::Result<()>
where
    Kmer<K>: KmerBits,
{
    info!("Building k-mer index...");
    info!("  Input: {:?}", input);
    info!("  k: {}", K);
    info!("  Canonical: {}", canonical);

    let builder = IndexBuilder::<KmerDomain<K>>::new(config)?;
    let splitter = SequenceSplitter::<K>::new(input, canonical);
    let index = builder.build(&splitter).context("Index construction failed")?;

    info!("Saving index to {:?}...", output);
    index.save(output)?;

    info!("Index built successfully!");
    index.print_space_breakdown();

    Ok(())
}

/// Print `kmer\tid` for every k-mer of the query file
fn query_with_k<const K: usize>(index: &Path, query: &Path, canonical: bool) -> anyhow::Result<()>
where
    Kmer<K>: KmerBits,
{
    let index = load_index::<K>(index)?;

    let file = File::open(query).with_context(|| format!("Failed to open {}", query.display()))?;
    let reader = BufReader::new(file);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut answered = 0u64;
    let mut skipped = 0u64;
    for line in reader.lines() {
        let line = line?;
        let kmer_str = line.trim();
        if kmer_str.is_empty() {
            continue;
        }
        let kmer = match kmer_str.parse::<Kmer<K>>() {
            Ok(kmer) => kmer,
            Err(e) => {
                debug!("  skipping {:?}: {}", kmer_str, e);
                skipped += 1;
                continue;
            }
        };
        let kmer = if canonical { kmer.canonical() } else { kmer };
        match index.try_lookup(&kmer) {
            Some(id) => writeln!(out, "{}\t{}", kmer_str, id)?,
            None => writeln!(out, "{}\tNA", kmer_str)?,
        }
        answered += 1;
    }
    out.flush()?;

    info!("Answered {} queries, skipped {} malformed lines", answered, skipped);
    Ok(())
}

/// Verify that the index maps the distinct input k-mers onto `[0, N)` without collisions
fn check_with_k<const K: usize>(index: &Path, input: &[PathBuf], canonical: bool) -> anyhow::Result<()>
where
    Kmer<K>: KmerBits,
{
    info!("Checking index correctness...");
    let index = load_index::<K>(index)?;

    let mut kmers: Vec<Kmer<K>> = Vec::new();
    for path in input {
        for_each_kmer::<K, _>(path, canonical, |kmer| {
            kmers.push(kmer);
            Ok(())
        })
        .with_context(|| format!("Failed to read {}", path.display()))?;
    }
    info!("Extracted {} k-mers from input", kmers.len());
    kmers.sort_unstable();
    kmers.dedup();
    info!("  {} distinct", kmers.len());

    let num_keys = index.num_keys();
    if kmers.len() as u64 != num_keys {
        warn!("CORRECTNESS CHECK FAILED! key count mismatch");
        bail!(
            "input has {} distinct k-mers but the index holds {}",
            kmers.len(),
            num_keys
        );
    }

    let mut seen = vec![false; kmers.len()];
    let mut errors = 0u64;
    for (i, kmer) in kmers.iter().enumerate() {
        match index.try_lookup(kmer) {
            Some(id) if id < num_keys && !seen[id as usize] => seen[id as usize] = true,
            Some(id) => {
                errors += 1;
                if errors <= 10 {
                    warn!("  {} -> {} (out of range or already taken)", kmer, id);
                }
            }
            None => {
                errors += 1;
                if errors <= 10 {
                    warn!("  {} -> routed to an empty bucket", kmer);
                }
            }
        }
        if (i + 1) % 1_000_000 == 0 {
            info!("  Checked {} k-mers...", i + 1);
        }
    }

    println!("\n=== Check Results ===");
    println!("  Distinct k-mers: {}", kmers.len());
    println!("  Errors: {}", errors);

    if errors > 0 {
        warn!("CORRECTNESS CHECK FAILED! {} k-mers map badly", errors);
        bail!("{} k-mers do not map to unique identifiers", errors);
    }
    println!("\n✓ CORRECTNESS CHECK PASSED!");
    println!("  Every input k-mer has a unique identifier in [0, {})", num_keys);
    Ok(())
}

fn stats_with_k<const K: usize>(index: &Path) -> anyhow::Result<()>
where
    Kmer<K>: KmerBits,
{
    let index = load_index::<K>(index)?;
    index.print_space_breakdown();
    Ok(())
}
