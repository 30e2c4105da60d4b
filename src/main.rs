//! # gptodo CLI
//!
//! ## Usage
//!
//! ```bash
//! gptodo --config ./config/gptodo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gptodo init` | Create the cache database |
//! | `gptodo scan <image>` | Extract a checklist from an image |
//! | `gptodo show` | Print the current checklist |
//! | `gptodo toggle <index>` | Flip an item between done and not done |
//! | `gptodo remove <index>` | Delete one item |
//! | `gptodo sort [on\|off]` | Set or flip alphabetical ordering |
//! | `gptodo clear` | Delete the checklist and its image |
//! | `gptodo serve` | Start the extraction backend |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use gptodo::{checklist_cmd, config, logging, migrate, server};

/// gptodo: photo of a list in, checklist out.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "gptodo",
    about = "Turn a photo of a handwritten list into a checklist",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gptodo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the cache database. Safe to run repeatedly.
    Init,

    /// Extract a checklist from an image file.
    ///
    /// Replaces the current checklist. The sort preference is kept.
    Scan {
        /// Path to a JPEG, PNG, or WebP image.
        image: PathBuf,
    },

    /// Print the current checklist.
    Show,

    /// Flip the completion state of one item.
    Toggle {
        /// Item index as printed by `show`.
        index: usize,
    },

    /// Delete one item. Removing the last item clears the checklist.
    Remove {
        /// Item index as printed by `show`.
        index: usize,
    },

    /// Order items alphabetically (completed items always last).
    ///
    /// Without an argument the current setting is flipped.
    Sort {
        #[arg(value_enum)]
        state: Option<Switch>,
    },

    /// Delete the checklist, its image, and the sort preference.
    Clear,

    /// Start the extraction backend.
    ///
    /// Binds to `[server].bind` and forwards images to the model in
    /// `[model]`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Cache initialized at {}", cfg.cache.path.display());
        }
        Commands::Scan { image } => checklist_cmd::run_scan(&cfg, &image).await?,
        Commands::Show => checklist_cmd::run_show(&cfg).await?,
        Commands::Toggle { index } => checklist_cmd::run_toggle(&cfg, index).await?,
        Commands::Remove { index } => checklist_cmd::run_remove(&cfg, index).await?,
        Commands::Sort { state } => {
            let sorted = state.map(|s| matches!(s, Switch::On));
            checklist_cmd::run_sort(&cfg, sorted).await?
        }
        Commands::Clear => checklist_cmd::run_clear(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
