//! Mass reindexing tool
//!
//! Rebuilds the search index from the record store.
//!
//! # Usage
//!
//! ```bash
//! reindex run [--types book,author] [--ids-per-batch N] [--threads-to-process N]
//! reindex import books.jsonl --type book
//! reindex stats
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/reindex/config.toml)
//! 3. File named by --config
//! 4. Environment variables (REINDEX_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use reindex_daemon::{import_records, run_reindex, show_stats, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            run_reindex(cli.config.as_deref(), cli.log_level.as_deref(), args).await?;
        }
        Commands::Import {
            file,
            record_type,
            id_field,
            db_path,
        } => {
            import_records(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                &file,
                &record_type,
                &id_field,
                db_path.as_deref(),
            )?;
        }
        Commands::Stats {
            db_path,
            index_path,
        } => {
            show_stats(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                db_path.as_deref(),
                index_path.as_deref(),
            )?;
        }
    }

    Ok(())
}
