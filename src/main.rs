//! # Synapse Sync CLI (`ssync`)
//!
//! ## Usage
//!
//! ```bash
//! ssync --config ./config/sync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ssync tree` | Build the source tree and print it |
//! | `ssync check` | Verify PROV entities against local working copies |
//! | `ssync sync` | Mirror the project into Synapse with provenance |
//!
//! ## Examples
//!
//! ```bash
//! # Inspect what would be mirrored, with source identifiers
//! ssync tree --ids
//!
//! # Plan a sync without touching Synapse
//! ssync sync --dry-run -v
//!
//! # Mirror for real, with machine-readable progress
//! SYNAPSE_AUTH_TOKEN=... GOOGLE_DRIVE_TOKEN=... ssync sync --progress json
//! ```

mod config;
mod connector_fs;
mod connector_gdrive;
mod logging;
mod pipeline;
mod progress;
mod prov;
mod synapse;

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::progress::ProgressMode;

/// Synapse Sync: mirror a Drive project into Synapse with provenance.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ssync",
    about = "Mirror a Google Drive project into Synapse, carrying PROV-JSON provenance",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sync.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the source tree (project, subprojects, ignore set) and print it.
    Tree {
        /// Show source identifiers next to names.
        #[arg(long)]
        ids: bool,

        /// Print root-to-leaf name paths as JSON instead.
        #[arg(long)]
        json: bool,
    },

    /// Load every configured PROV document and check its entities exist
    /// under the subproject's `home_dir`.
    Check,

    /// Mirror the source project into Synapse.
    ///
    /// Creates folders, registers files as external links, and attaches
    /// activities derived from the PROV documents. Existing objects are
    /// updated in place.
    Sync {
        /// Run against an in-memory destination; nothing is written remotely.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr. Defaults to `human` on a terminal, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Tree { ids, json } => {
            pipeline::run_tree(&cfg, ids, json).await?;
        }
        Commands::Check => {
            pipeline::run_check(&cfg)?;
        }
        Commands::Sync { dry_run, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            pipeline::run_sync(&cfg, dry_run, mode).await?;
        }
    }

    Ok(())
}
