mod config;
mod dataset;
mod dedupe;
mod enrich;
mod formatting;
mod merge;
mod pageviews;
mod pipeline;
mod resolver;
mod scheduler;
mod wiki;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::{RunConfig, DEFAULT_DATASET};
use dataset::DatasetStore;
use dedupe::PendingFilter;
use enrich::WikiEnricher;
use pipeline::{RankOptions, RunSummary};
use wiki::WikiClient;

#[derive(Parser)]
#[command(name = "wikirank")]
#[command(about = "Rank phrases by Wikipedia prominence")]
#[command(after_help = "\x1b[36mExamples:\x1b[0m
  wikirank rank                       # Enrich pending phrases and re-rank
  wikirank rank --filter totalhits-only   # Retry search-hit fallbacks
  wikirank rank --limit 50 --yes      # Small unattended run
  wikirank stats                      # Method distribution and top scores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich pending phrases with Wikipedia prominence and re-rank the file
    Rank {
        /// Dataset file (JSON array of phrase records)
        #[arg(short, long, default_value = DEFAULT_DATASET)]
        file: String,

        /// Which records count as pending
        #[arg(long, value_enum, default_value = "not-pageviews")]
        filter: PendingFilter,

        /// Work items per batch
        #[arg(short, long, default_value = "100")]
        batch_size: usize,

        /// Max in-flight API operations
        #[arg(short, long, default_value = "2")]
        concurrency: usize,

        /// Maximum unique phrases to process (default: all pending)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Write a progress snapshot every N batches
        #[arg(long, default_value = "5")]
        checkpoint_every: usize,

        /// Skip the confirmation prompt for long runs
        #[arg(short, long)]
        yes: bool,
    },

    /// Show method distribution and top-ranked phrases
    Stats {
        /// Dataset file (JSON array of phrase records)
        #[arg(short, long, default_value = DEFAULT_DATASET)]
        file: String,
    },

    /// Probe Wikipedia API connectivity
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Rank {
            file,
            filter,
            batch_size,
            concurrency,
            limit,
            checkpoint_every,
            yes,
        } => {
            let config = RunConfig {
                batch_size: batch_size.max(1),
                concurrency: concurrency.max(1),
                checkpoint_every: checkpoint_every.max(1),
                ..RunConfig::default()
            };
            let options = RankOptions {
                filter,
                limit,
                assume_yes: yes,
            };
            let store = DatasetStore::new(&file);
            let enricher = WikiEnricher::new(&config);

            let summary = pipeline::run_rank(&store, &config, &options, &enricher).await?;
            report(&summary);
            Ok(())
        }
        Commands::Stats { file } => pipeline::run_stats(&DatasetStore::new(&file)),
        Commands::Check => check().await,
    }
}

fn report(summary: &RunSummary) {
    if summary.cancelled {
        return;
    }
    if summary.saved {
        eprintln!(
            "\x1b[32mok\x1b[0m Done: {} phrases enriched",
            summary.processed
        );
    }
}

async fn check() -> Result<()> {
    let config = RunConfig::default();
    let client = WikiClient::new(Duration::from_secs(5), config.rate_limit_backoff);

    eprintln!("\x1b[36m..\x1b[0m Probing {}", config::SEARCH_API);
    match client.probe().await {
        Ok(()) => {
            eprintln!("\x1b[32mok\x1b[0m Wikipedia API reachable");
            Ok(())
        }
        Err(e) => {
            eprintln!("\x1b[31mx\x1b[0m Wikipedia API unreachable: {}", e);
            std::process::exit(1);
        }
    }
}
