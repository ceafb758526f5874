//! ipset-sync - keeps a WAFv2 IP set in sync with public threat-intelligence feeds.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use ipset_sync::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Sync { dry_run } => ipset_sync::commands::sync::run(dry_run, &cli.config).await,
        Commands::Fetch { list } => ipset_sync::commands::fetch::run(list, &cli.config).await,
        Commands::Show => ipset_sync::commands::show::run(&cli.config).await,
        Commands::Sources => ipset_sync::commands::sources::run(&cli.config).await,
        Commands::Version => {
            println!("ipset-sync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
