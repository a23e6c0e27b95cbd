//! taskweave: offline tooling for node files.
//!
//! Reads nodes from a JSON array or JSON-lines file, replays them with the
//! same engine peers use and prints the result as JSON on stdout. Logs go to
//! stderr.
//!
//! ```bash
//! taskweave validate nodes.jsonl --remote
//! taskweave replay nodes.jsonl --now 2026-01-01T00:00:00.000Z
//! taskweave history nodes.jsonl groceries
//! taskweave --config kernel.toml inspect nodes.jsonl
//! ```

mod commands;
mod input;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

use taskweave_dag::{NodeValidator, Origin};
use taskweave_kernel::KernelConfig;
use taskweave_types::{TaskId, WallClock};

/// Validate, replay and inspect taskweave node files.
#[derive(Parser, Debug)]
#[command(name = "taskweave", version)]
struct Cli {
    /// Kernel config (TOML); its validation limits apply
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Structural verdict for every node
    Validate {
        file: PathBuf,
        /// Treat nodes as remote input (signatures required)
        #[arg(long)]
        remote: bool,
    },
    /// Reconstructed entities, ranked for display
    Replay {
        file: PathBuf,
        /// Ranking instant, e.g. 2026-01-01T00:00:00.000Z (default: now)
        #[arg(long)]
        now: Option<String>,
    },
    /// Every item of one entity, the current one marked
    History { file: PathBuf, task: String },
    /// Ids storage may drop
    Prune { file: PathBuf },
    /// Forensic replay report
    Inspect { file: PathBuf },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let validator = load_validator(cli.config.as_deref())?;

    match cli.command {
        Command::Validate { file, remote } => {
            let nodes = input::read_nodes(&file)?;
            let origin = if remote { Origin::Remote } else { Origin::Local };
            let verdicts = commands::validate(&nodes, &validator, origin);
            let invalid = verdicts.iter().filter(|v| !v.valid).count();
            tracing::info!(nodes = nodes.len(), invalid, "validated");
            print(&verdicts)
        }
        Command::Replay { file, now } => {
            let now = match now {
                Some(text) => WallClock::parse(&text)
                    .with_context(|| format!("--now {text:?} is not YYYY-MM-DDTHH:MM:SS.mmmZ"))?,
                None => WallClock::now(),
            };
            let nodes = input::read_nodes(&file)?;
            print(&commands::replay(&nodes, &validator, now))
        }
        Command::History { file, task } => {
            let nodes = input::read_nodes(&file)?;
            print(&commands::history(&nodes, &validator, &TaskId::from(task))?)
        }
        Command::Prune { file } => {
            let nodes = input::read_nodes(&file)?;
            let prunable = commands::prune(&nodes, &validator);
            tracing::info!(count = prunable.len(), "prune plan");
            print(&prunable)
        }
        Command::Inspect { file } => {
            let nodes = input::read_nodes(&file)?;
            let inspection = commands::inspect(&nodes, &validator);
            for (reason, count) in &inspection.counts {
                tracing::info!(reason = reason.as_str(), count, "rejections");
            }
            print(&inspection)
        }
    }
}

fn load_validator(config: Option<&Path>) -> Result<NodeValidator> {
    let limits = match config {
        Some(path) => {
            KernelConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?
                .validation
        }
        None => Default::default(),
    };
    Ok(NodeValidator::new(limits))
}

fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{text}");
    Ok(())
}
