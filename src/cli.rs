//! Command-line interface
//!
//! Four operations over the resolution engine:
//!
//! - `resolve` - read a domain list from a file, seed unknown domains into
//!   the cache, and resolve the whole set
//! - `refresh` - re-resolve every domain in a provisional class
//! - `stats` - print per-class cardinalities of the cache
//! - `find` - print the class currently holding one domain
//!
//! Global flags tune the upstream (nameservers, lifetime, retries) and the
//! run shape (concurrency gate, batch size, worker pool). Defaults match
//! the engine defaults; a large refresh run typically raises
//! `--max-concurrent-tasks` and `--batch-size` well above them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Bulk DNS resolution for blocklist curation.
#[derive(Parser)]
#[command(
    name = "domainvet",
    about = "Bulk DNS resolution engine for curating blocklist domains",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Maximum in-flight DNS lookups per worker
    #[arg(long, default_value = "5")]
    pub max_concurrent_tasks: usize,

    /// Number of results per batch handed to the cache writer
    #[arg(long, default_value = "10")]
    pub batch_size: usize,

    /// Upstream nameserver IP; repeat for more than one
    #[arg(long = "nameserver", value_name = "IP")]
    pub nameservers: Vec<IpAddr>,

    /// Per-attempt DNS lifetime budget in seconds
    #[arg(long, default_value = "6")]
    pub lifetime_secs: u64,

    /// Retries after a lifetime timeout before classifying as timeout
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Minimum items per worker before the pool grows
    #[arg(long, default_value = "100")]
    pub min_worker_share: usize,

    /// Hard ceiling on the worker pool (default scales with CPU count)
    #[arg(long)]
    pub max_workers: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a domain list from a file and fold the results into the cache
    ///
    /// The input holds one domain per line; blank lines and lines starting
    /// with '#' are skipped. Domains the cache has never seen are seeded
    /// into the `none` class before the run.
    Resolve {
        /// Input file containing domains (one per line)
        #[arg(short, long)]
        input_file: PathBuf,
    },
    /// Re-resolve every domain in a provisional class
    ///
    /// Confirmed `resolvable` and `unresolvable` entries are left alone;
    /// everything else is queried again.
    Refresh,
    /// Print per-class cardinalities of the cache as JSON
    Stats,
    /// Print the class currently holding a domain
    Find {
        /// Domain to look up in the cache
        #[arg(short, long)]
        domain: String,
    },
}

/// Streams a domain list from a text file.
///
/// One domain per line; blank lines and `#` comments are skipped. The file
/// is read line by line rather than loaded whole, so multi-million-entry
/// blocklists stay cheap.
pub async fn read_domain_file(path: &Path) -> Result<HashSet<String>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open domain file {}", path.display()))?;

    let mut reader = BufReader::with_capacity(64 * 1024, file).lines();
    let mut domains = HashSet::new();

    while let Some(line) = reader.next_line().await? {
        let domain = line.trim();
        if !domain.is_empty() && !domain.starts_with('#') {
            domains.insert(domain.to_string());
        }
    }

    Ok(domains)
}
