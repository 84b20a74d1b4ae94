///
/// This module implements the CLI interface for replay-stats: command parsing and the
/// async entrypoint used by both `main()` and the integration tests.
///
/// All pipeline logic lives in [`replay-stats-core`]. This module only loads configuration,
/// builds the HTTP client, and prints what happened.
///
/// ## Commands
/// - `collect`: fetch the configured group and write the summary table and documents.
/// - `preview`: print the first lines of a summary table.
///
/// [`replay-stats-core`]: ../../replay-stats-core/
use crate::load_config::load_config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use replay_stats_core::client::BallchasingClient;
use replay_stats_core::collect::collect;
use replay_stats_core::config::CollectConfig;
use replay_stats_core::summary::head_lines;
use std::path::{Path, PathBuf};

/// CLI for replay-stats: collect ballchasing.com group stats into a CSV and JSON files.
#[derive(Parser)]
#[clap(
    name = "replay-stats",
    version,
    about = "Download every replay in a ballchasing group and summarise one player's stats"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch all replays in the group and write the summary table and per-replay JSON
    Collect {
        /// Path to an optional YAML settings file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Where to write the summary table (overrides the settings file)
        #[clap(long)]
        summary: Option<PathBuf>,
        /// Directory for the per-replay JSON documents (overrides the settings file)
        #[clap(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the first lines of a summary table
    Preview {
        /// Path to the summary table
        #[clap(long, default_value = "summary.csv")]
        summary: PathBuf,
        /// Number of lines to print, header included
        #[clap(long, default_value_t = 5)]
        lines: usize,
    },
}

/// Loads the collector configuration and applies the `--summary` / `--output-dir` flags,
/// which win over the settings file.
pub fn collect_config(
    config: Option<&Path>,
    summary: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<CollectConfig> {
    let mut config = load_config(config)?;
    if let Some(summary) = summary {
        config.output.summary_path = summary;
    }
    if let Some(output_dir) = output_dir {
        config.output.output_dir = output_dir;
    }
    Ok(config)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Collect {
            config,
            summary,
            output_dir,
        } => {
            let config = collect_config(config.as_deref(), summary, output_dir)?;

            tracing::info!(command = "collect", "Starting collection");
            let client = BallchasingClient::new(&config.credentials.token, &config.api)
                .map_err(|e| anyhow::anyhow!("Failed to construct replay client: {e}"))?;

            match collect(&config, &client).await {
                Ok(report) => {
                    if report.matched == 0 {
                        println!("No replays downloaded (group empty or player absent).");
                    } else {
                        println!(
                            "{} replay(s) -> {}",
                            report.matched,
                            report.summary_path.display()
                        );
                    }
                    println!("Report:\n{:#?}", report);
                    tracing::info!(command = "collect", ?report, "Collection complete");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "collect", error = %e, "Collection failed");
                    Err(anyhow::Error::new(e).context("Collection failed"))
                }
            }
        }
        Commands::Preview { summary, lines } => {
            let head = head_lines(&summary, lines).map_err(|e| {
                tracing::error!(error = ?e, path = %summary.display(), "Failed to read summary");
                anyhow::anyhow!("Failed to read summary {}: {}", summary.display(), e)
            })?;
            for line in head {
                println!("{line}");
            }
            Ok(())
        }
    }
}
