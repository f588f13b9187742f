use anyhow::Result;
use clap::Parser;
use domainvet::classify::UpstreamConfig;
use domainvet::cli::{read_domain_file, Cli, Commands};
use domainvet::executor::default_max_workers;
use domainvet::processor::ProcessorOptions;
use domainvet::resolver::{DomainResolver, ResolverSettings};
use std::time::Duration;
use tokio::runtime::Builder;
use tracing::{debug, info};

fn main() -> Result<()> {
    // DNS work is I/O-heavy, so a couple of threads beyond the core count
    // helps; cap it to avoid pointless context switching on big machines.
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let worker_threads = std::cmp::min(num_cpus + 2, 16);

    debug!(
        "Configuring Tokio runtime with {} worker threads",
        worker_threads
    );

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut upstream = UpstreamConfig::default();
    if !cli.nameservers.is_empty() {
        upstream.nameservers = cli.nameservers.clone();
    }
    upstream.lifetime = Duration::from_secs(cli.lifetime_secs);
    upstream.retries = cli.retries;

    let settings = ResolverSettings {
        upstream,
        cache_file: None,
        min_worker_share: cli.min_worker_share,
        max_workers: cli.max_workers.unwrap_or_else(default_max_workers),
    };
    let options = ProcessorOptions {
        max_concurrent_tasks: cli.max_concurrent_tasks,
        batch_size: cli.batch_size,
    };

    let resolver = DomainResolver::new(settings).await?;

    match &cli.command {
        Commands::Resolve { input_file } => {
            let domains = read_domain_file(input_file).await?;
            info!(
                "Loaded {} domains from {}",
                domains.len(),
                input_file.display()
            );
            resolver.update(&domains).await?;
            resolver.batch_resolve(domains, options).await?;
            println!("{}", serde_json::to_string_pretty(&resolver.stats().await)?);
        }
        Commands::Refresh => {
            resolver.refresh_cache(options).await?;
            println!("{}", serde_json::to_string_pretty(&resolver.stats().await)?);
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&resolver.stats().await)?);
        }
        Commands::Find { domain } => match resolver.find(domain).await {
            Some(class) => println!("{}", class),
            None => println!("(not cached)"),
        },
    }

    Ok(())
}
