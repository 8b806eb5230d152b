//! Configuration loading for the reindex tools.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/reindex/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ReindexTypesError;

/// Tuning knobs for a mass reindex run, as read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Maximum identifiers fetched per page by a scanner
    #[serde(default = "default_ids_per_batch")]
    pub ids_per_batch: usize,

    /// Records loaded and submitted together inside one batch
    #[serde(default = "default_records_per_sub_batch")]
    pub records_per_sub_batch: usize,

    /// Record types scanned concurrently
    #[serde(default = "default_threads_to_scan")]
    pub threads_to_scan: usize,

    /// Batches processed concurrently
    #[serde(default = "default_threads_to_process")]
    pub threads_to_process: usize,

    #[serde(default = "default_true")]
    pub purge_on_start: bool,

    #[serde(default = "default_true")]
    pub optimize_after_purge: bool,

    #[serde(default = "default_true")]
    pub optimize_on_finish: bool,

    /// Upper bound for a single identifier page read, in seconds
    #[serde(default)]
    pub transaction_timeout_secs: Option<u64>,

    /// Overrides the default backpressure capacity (in batches)
    #[serde(default)]
    pub gate_capacity: Option<usize>,
}

fn default_ids_per_batch() -> usize {
    100
}

fn default_records_per_sub_batch() -> usize {
    10
}

fn default_threads_to_scan() -> usize {
    1
}

fn default_threads_to_process() -> usize {
    6
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ids_per_batch: default_ids_per_batch(),
            records_per_sub_batch: default_records_per_sub_batch(),
            threads_to_scan: default_threads_to_scan(),
            threads_to_process: default_threads_to_process(),
            purge_on_start: true,
            optimize_after_purge: true,
            optimize_on_finish: true,
            transaction_timeout_secs: None,
            gate_capacity: None,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB record store directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Path to the Tantivy index directory
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Memory budget for the index writer in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Record types reindexed when none are given on the command line
    #[serde(default)]
    pub record_types: Vec<String>,

    #[serde(default)]
    pub pipeline: PipelineSettings,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "reindex")
}

fn default_db_path() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_index_path() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("./index"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_writer_memory_mb() -> usize {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            index_path: default_index_path(),
            log_level: default_log_level(),
            writer_memory_mb: default_writer_memory_mb(),
            record_types: Vec::new(),
            pipeline: PipelineSettings::default(),
        }
    }
}

fn config_err(e: config::ConfigError) -> ReindexTypesError {
    ReindexTypesError::Config(e.to_string())
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/reindex/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REINDEX_*, nested keys with `__`,
    ///    e.g. REINDEX_PIPELINE__IDS_PER_BATCH)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ReindexTypesError> {
        let config_dir = project_dirs()
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let pipeline = PipelineSettings::default();

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(config_err)?
            .set_default("index_path", default_index_path())
            .map_err(config_err)?
            .set_default("log_level", default_log_level())
            .map_err(config_err)?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)
            .map_err(config_err)?
            .set_default("pipeline.ids_per_batch", pipeline.ids_per_batch as i64)
            .map_err(config_err)?
            .set_default(
                "pipeline.records_per_sub_batch",
                pipeline.records_per_sub_batch as i64,
            )
            .map_err(config_err)?
            .set_default("pipeline.threads_to_scan", pipeline.threads_to_scan as i64)
            .map_err(config_err)?
            .set_default(
                "pipeline.threads_to_process",
                pipeline.threads_to_process as i64,
            )
            .map_err(config_err)?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("REINDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;
        config.try_deserialize().map_err(config_err)
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        expand_home(&self.index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
