//! siphon CLI
//!
//! Replays recorded instrumentation-channel traffic through the bridge and
//! rebuilds the dumped files on local disk.

mod config;
mod progress;
mod replay;
mod transcript;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::{ReplayProgress, format_bytes};
use replay::{ReplayOptions, replay};
use transcript::Transcript;

/// siphon - rebuild dumped application files from bridge traffic
#[derive(Parser)]
#[command(name = "siphon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a JSON Lines transcript through one bridge per context
    Replay {
        /// Transcript file
        #[arg(required = true)]
        transcript: PathBuf,

        /// Output root (overrides the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Remote base directory the agent reports paths under
        #[arg(short, long, required = true)]
        basedir: String,

        /// Write directly under the output root instead of Payload/<bundle>
        #[arg(long)]
        flat: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the configuration
    Config {
        /// Write the default configuration if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let init = matches!(cli.command, Commands::Config { init: true });
    let (config_path, config) = Config::resolve(cli.config.as_deref(), init)?;

    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Replay {
            transcript,
            output,
            basedir,
            flat,
            no_progress,
        } => {
            let options = ReplayOptions {
                basedir,
                output_root: output.unwrap_or_else(|| config.output.root.clone()),
                bundle_layout: config.output.bundle_layout && !flat,
            };
            let show_progress = config.replay.progress && !no_progress;
            run_replay(transcript, options, show_progress).await?;
        }
        Commands::Config { init } => {
            show_config(config_path, &config, init)?;
        }
    }

    Ok(())
}

/// Replay a transcript and print per-context counters
async fn run_replay(
    path: PathBuf,
    options: ReplayOptions,
    show_progress: bool,
) -> anyhow::Result<()> {
    if options.basedir.is_empty() {
        anyhow::bail!("Remote base directory must not be empty");
    }

    let transcript = Transcript::load(&path)?;
    tracing::info!(
        "Loaded {} events in {} contexts from {}",
        transcript.event_count(),
        transcript.contexts.len(),
        path.display()
    );

    let progress = ReplayProgress::new(transcript.event_count() as u64, show_progress);
    let outcomes = replay(transcript, &options, &progress).await?;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed == 0 {
        progress.finish_with_message("Replay complete".to_string());
    } else {
        progress.abandon();
    }

    for outcome in &outcomes {
        println!("Context {} -> {}", outcome.label, outcome.outdir.display());
        match &outcome.result {
            Ok(stats) => {
                println!("  Messages:    {}", stats.messages_handled);
                println!("  Acks:        {}", stats.acks_sent);
                println!(
                    "  Downloaded:  {} in {} files",
                    format_bytes(stats.bytes_downloaded),
                    stats.files_completed
                );
                println!(
                    "  Patched:     {} in {} patches",
                    format_bytes(stats.bytes_patched),
                    stats.patches_applied
                );
                if stats.remote_errors > 0 {
                    println!("  Agent errors: {}", stats.remote_errors);
                }
                if stats.incomplete_downloads > 0 {
                    println!("  Incomplete:  {}", stats.incomplete_downloads);
                }
            }
            Err(e) => {
                println!("  Aborted: {e}");
                if outcome.undelivered > 0 {
                    println!("  Undelivered: {}", outcome.undelivered);
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} contexts aborted", failed, outcomes.len());
    }
    Ok(())
}

/// Print the configuration and where it lives
fn show_config(path: PathBuf, config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        println!("Configuration at {}", path.display());
    } else if path.exists() {
        println!("Loaded from {}", path.display());
    } else {
        println!("No configuration at {} (showing defaults)", path.display());
    }

    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_config_init_with_explicit_path() {
        let cli = Cli::try_parse_from(["siphon", "--config", "/tmp/x.toml", "config", "--init"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(matches!(cli.command, Commands::Config { init: true }));
    }

    #[test]
    fn test_cli_replay_requires_basedir() {
        assert!(Cli::try_parse_from(["siphon", "replay", "capture.jsonl"]).is_err());

        let cli = Cli::try_parse_from([
            "siphon", "replay", "capture.jsonl", "--basedir", "/var/app", "--flat",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Replay { flat: true, ref basedir, .. } if basedir == "/var/app"
        ));
    }
}
