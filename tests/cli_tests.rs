use anyhow::Result;
use clap::Parser;
use domainvet::cli::{read_domain_file, Cli, Commands};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

#[test]
fn test_cli_resolve_command() -> Result<()> {
    let args = vec!["domainvet", "resolve", "--input-file", "domains.txt"];
    let cli = Cli::try_parse_from(args)?;

    match &cli.command {
        Commands::Resolve { input_file } => {
            assert_eq!(input_file, &PathBuf::from("domains.txt"));
        }
        _ => panic!("Expected Resolve command"),
    }

    // Engine defaults
    assert_eq!(cli.max_concurrent_tasks, 5);
    assert_eq!(cli.batch_size, 10);
    assert_eq!(cli.lifetime_secs, 6);
    assert_eq!(cli.retries, 3);
    assert_eq!(cli.min_worker_share, 100);
    assert!(cli.max_workers.is_none());
    assert!(cli.nameservers.is_empty());

    Ok(())
}

#[test]
fn test_cli_refresh_with_tuning() -> Result<()> {
    let args = vec![
        "domainvet",
        "--max-concurrent-tasks",
        "60",
        "--batch-size",
        "50",
        "--nameserver",
        "1.1.1.1",
        "--nameserver",
        "9.9.9.9",
        "refresh",
    ];
    let cli = Cli::try_parse_from(args)?;

    assert!(matches!(cli.command, Commands::Refresh));
    assert_eq!(cli.max_concurrent_tasks, 60);
    assert_eq!(cli.batch_size, 50);
    assert_eq!(
        cli.nameservers,
        vec![
            IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)),
        ]
    );

    Ok(())
}

#[test]
fn test_cli_stats_and_find_commands() -> Result<()> {
    let cli = Cli::try_parse_from(vec!["domainvet", "stats"])?;
    assert!(matches!(cli.command, Commands::Stats));

    let cli = Cli::try_parse_from(vec!["domainvet", "find", "--domain", "ads.example.com"])?;
    match &cli.command {
        Commands::Find { domain } => assert_eq!(domain, "ads.example.com"),
        _ => panic!("Expected Find command"),
    }

    Ok(())
}

#[test]
fn test_cli_rejects_bad_nameserver() {
    let args = vec!["domainvet", "--nameserver", "not-an-ip", "refresh"];
    assert!(Cli::try_parse_from(args).is_err());
}

#[test]
fn test_cli_requires_a_command() {
    assert!(Cli::try_parse_from(vec!["domainvet"]).is_err());
}

#[tokio::test]
async fn test_read_domain_file_skips_comments_and_blanks() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "# blocklist sample")?;
    writeln!(file, "ads.example.com")?;
    writeln!(file)?;
    writeln!(file, "  tracker.example.net  ")?;
    writeln!(file, "# trailing comment")?;
    writeln!(file, "ads.example.com")?;
    file.flush()?;

    let domains = read_domain_file(file.path()).await?;

    assert_eq!(domains.len(), 2);
    assert!(domains.contains("ads.example.com"));
    assert!(domains.contains("tracker.example.net"));

    Ok(())
}

#[tokio::test]
async fn test_read_domain_file_missing_path_errors() {
    let result = read_domain_file(std::path::Path::new("/no/such/list.txt")).await;
    assert!(result.is_err());
}
