//! Reindex daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, import, stats)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, RunArgs};
pub use commands::{
    apply_run_overrides, import_jsonl, import_records, resolve_record_types, run_reindex,
    show_stats,
};
