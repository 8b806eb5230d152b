//! CLI argument parsing for the reindex binary.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Mass reindexing tool
///
/// Rebuilds the Tantivy search index from the RocksDB record store.
#[derive(Parser, Debug)]
#[command(name = "reindex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/reindex/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reindex every record of the given types
    Run(RunArgs),

    /// Load records from a JSON-lines file into the record store
    Import {
        /// JSON-lines file, one object per line
        file: PathBuf,

        /// Record type of the imported records
        #[arg(short = 't', long = "type")]
        record_type: String,

        /// Field holding the record id
        #[arg(long, default_value = "id")]
        id_field: String,

        /// Override database path
        #[arg(long)]
        db_path: Option<String>,
    },

    /// Show record and document counts per type
    Stats {
        /// Override database path
        #[arg(long)]
        db_path: Option<String>,

        /// Override index path
        #[arg(long)]
        index_path: Option<String>,
    },
}

/// Options of the `run` command. Unset values come from configuration.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// Record types to reindex (comma separated); defaults to configured
    /// types, then to every type in the store
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,

    #[arg(long)]
    pub ids_per_batch: Option<usize>,

    #[arg(long)]
    pub records_per_sub_batch: Option<usize>,

    #[arg(long)]
    pub threads_to_scan: Option<usize>,

    #[arg(long)]
    pub threads_to_process: Option<usize>,

    /// Maximum batches handed off but not yet processed
    #[arg(long)]
    pub gate_capacity: Option<usize>,

    /// Upper bound in seconds for one identifier page read
    #[arg(long)]
    pub transaction_timeout_secs: Option<u64>,

    /// Keep existing documents instead of purging them first
    #[arg(long)]
    pub no_purge: bool,

    /// Skip index optimization after purging and at the end
    #[arg(long)]
    pub no_optimize: bool,

    /// Override database path
    #[arg(long)]
    pub db_path: Option<String>,

    /// Override index path
    #[arg(long)]
    pub index_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_defaults() {
        let cli = Cli::parse_from(["reindex", "run"]);
        match cli.command {
            Commands::Run(args) => assert_eq!(args, RunArgs::default()),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_run_with_options() {
        let cli = Cli::parse_from([
            "reindex",
            "run",
            "--types",
            "book,author",
            "--ids-per-batch",
            "500",
            "--threads-to-process",
            "8",
            "--no-purge",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.types, vec!["book", "author"]);
                assert_eq!(args.ids_per_batch, Some(500));
                assert_eq!(args.threads_to_process, Some(8));
                assert!(args.no_purge);
                assert!(!args.no_optimize);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_import() {
        let cli = Cli::parse_from(["reindex", "import", "books.jsonl", "--type", "book"]);
        match cli.command {
            Commands::Import {
                file,
                record_type,
                id_field,
                db_path,
            } => {
                assert_eq!(file, PathBuf::from("books.jsonl"));
                assert_eq!(record_type, "book");
                assert_eq!(id_field, "id");
                assert!(db_path.is_none());
            }
            _ => panic!("Expected Import command"),
        }
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::parse_from(["reindex", "stats", "--log-level", "debug", "-c", "/etc/r.toml"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert_eq!(cli.config, Some("/etc/r.toml".to_string()));
        assert!(matches!(cli.command, Commands::Stats { .. }));
    }
}
