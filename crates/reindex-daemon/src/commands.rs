//! Command implementations for the reindex binary.
//!
//! Handles:
//! - run: Load config, open store and index, run the mass indexer
//! - import: Load JSON-lines records into the store
//! - stats: Print record and document counts per type

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};

use reindex_pipeline::{
    JsonDocumentMapper, LoggingProgressListener, MassIndexer, ReindexConfig, RunOutcome,
    StorageRecordSource, TantivyIndexSink,
};
use reindex_search::{SearchIndex, SearchIndexConfig, SearchIndexer};
use reindex_storage::RecordStore;
use reindex_types::{Record, RecordType, Settings};

use crate::cli::RunArgs;

/// Records written per store batch while importing.
const IMPORT_CHUNK: usize = 1000;

/// Log progress every this many submitted operations.
const PROGRESS_EVERY: u64 = 10_000;

/// Initialize logging from `RUST_LOG`, falling back to the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Apply `run` flags on top of loaded settings.
pub fn apply_run_overrides(settings: &mut Settings, args: &RunArgs) {
    if let Some(path) = &args.db_path {
        settings.db_path = path.clone();
    }
    if let Some(path) = &args.index_path {
        settings.index_path = path.clone();
    }

    let pipeline = &mut settings.pipeline;
    if let Some(n) = args.ids_per_batch {
        pipeline.ids_per_batch = n;
    }
    if let Some(n) = args.records_per_sub_batch {
        pipeline.records_per_sub_batch = n;
    }
    if let Some(n) = args.threads_to_scan {
        pipeline.threads_to_scan = n;
    }
    if let Some(n) = args.threads_to_process {
        pipeline.threads_to_process = n;
    }
    if let Some(n) = args.gate_capacity {
        pipeline.gate_capacity = Some(n);
    }
    if let Some(secs) = args.transaction_timeout_secs {
        pipeline.transaction_timeout_secs = Some(secs);
    }
    if args.no_purge {
        pipeline.purge_on_start = false;
    }
    if args.no_optimize {
        pipeline.optimize_after_purge = false;
        pipeline.optimize_on_finish = false;
    }
}

/// Types from the command line, else from settings, else every type in the store.
pub fn resolve_record_types(
    cli_types: &[String],
    settings: &Settings,
    store: &RecordStore,
) -> Result<Vec<RecordType>> {
    let names = if !cli_types.is_empty() {
        cli_types.to_vec()
    } else {
        settings.record_types.clone()
    };

    if names.is_empty() {
        let types = store.record_types().context("Failed to list record types")?;
        if types.is_empty() {
            bail!("No record types given and the record store is empty");
        }
        return Ok(types);
    }

    names
        .iter()
        .map(|name| {
            RecordType::parse(name).with_context(|| format!("Invalid record type {:?}", name))
        })
        .collect()
}

fn open_store(settings: &Settings) -> Result<Arc<RecordStore>> {
    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    info!("Opening record store at {:?}", db_path);
    let store = RecordStore::open(&db_path).context("Failed to open record store")?;
    Ok(Arc::new(store))
}

fn open_index(settings: &Settings) -> Result<SearchIndex> {
    let index_path = settings.expanded_index_path();
    info!("Opening search index at {:?}", index_path);
    let config = SearchIndexConfig::new(index_path).with_memory_mb(settings.writer_memory_mb);
    SearchIndex::open_or_create(config).context("Failed to open search index")
}

/// Run the mass indexer until it finishes or Ctrl+C cancels it.
pub async fn run_reindex(
    config_path: Option<&str>,
    log_level: Option<&str>,
    args: RunArgs,
) -> Result<()> {
    let mut settings = load_settings(config_path, log_level)?;
    apply_run_overrides(&mut settings, &args);
    init_logging(&settings.log_level)?;

    let store = open_store(&settings)?;
    let index = open_index(&settings)?;
    let record_types = resolve_record_types(&args.types, &settings, &store)?;

    let config = ReindexConfig::from_settings(&settings.pipeline, record_types);
    let indexer = Arc::new(SearchIndexer::new(&index).context("Failed to create index writer")?);
    let mass_indexer = MassIndexer::new(
        config,
        Arc::new(StorageRecordSource::new(store)),
        Arc::new(JsonDocumentMapper::new()),
        Arc::new(TantivyIndexSink::new(indexer)),
    )
    .with_listener(Arc::new(LoggingProgressListener::new(PROGRESS_EVERY)));

    let handle = mass_indexer.start().context("Failed to start mass indexing")?;

    tokio::select! {
        _ = handle.finished() => {}
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, cancelling...");
            let producing = handle.cancel().await;
            if producing {
                warn!("Run cancelled before every record was scanned");
            }
        }
    }

    let summary = handle.wait().await.context("Mass indexing failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.outcome == RunOutcome::Cancelled {
        bail!("Mass indexing cancelled");
    }
    Ok(())
}

fn record_id_of(value: &Value, id_field: &str) -> Option<String> {
    match value.get(id_field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Import JSON lines into `store`. Blank lines are ignored.
pub fn import_jsonl<R: BufRead>(
    store: &RecordStore,
    reader: R,
    record_type: &RecordType,
    id_field: &str,
) -> Result<usize> {
    let mut chunk = Vec::with_capacity(IMPORT_CHUNK);
    let mut imported = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON on line {}", line_no + 1))?;
        let Some(id) = record_id_of(&payload, id_field) else {
            bail!("Line {} has no usable {:?} field", line_no + 1, id_field);
        };
        chunk.push(Record::new(record_type.clone(), id, payload));

        if chunk.len() == IMPORT_CHUNK {
            imported += store.put_records(&chunk)?;
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        imported += store.put_records(&chunk)?;
    }

    Ok(imported)
}

pub fn import_records(
    config_path: Option<&str>,
    log_level: Option<&str>,
    file: &Path,
    record_type: &str,
    id_field: &str,
    db_path: Option<&str>,
) -> Result<()> {
    let mut settings = load_settings(config_path, log_level)?;
    if let Some(path) = db_path {
        settings.db_path = path.to_string();
    }
    init_logging(&settings.log_level)?;

    let record_type = RecordType::parse(record_type).context("Invalid record type")?;
    let store = open_store(&settings)?;
    let input = File::open(file).with_context(|| format!("Failed to open {:?}", file))?;

    let imported = import_jsonl(&store, BufReader::new(input), &record_type, id_field)?;
    store.flush().context("Failed to flush record store")?;

    println!("Imported {} {} records", imported, record_type);
    Ok(())
}

pub fn show_stats(
    config_path: Option<&str>,
    log_level: Option<&str>,
    db_path: Option<&str>,
    index_path: Option<&str>,
) -> Result<()> {
    let mut settings = load_settings(config_path, log_level)?;
    if let Some(path) = db_path {
        settings.db_path = path.to_string();
    }
    if let Some(path) = index_path {
        settings.index_path = path.to_string();
    }
    init_logging(&settings.log_level)?;

    let store = open_store(&settings)?;
    let index = open_index(&settings)?;
    let stats = store.stats().context("Failed to read store stats")?;

    println!("{:<24} {:>12} {:>12}", "TYPE", "RECORDS", "DOCUMENTS");
    for (record_type, records) in &stats.record_counts {
        let documents = index
            .count_documents(Some(record_type))
            .context("Failed to count documents")?;
        println!("{:<24} {:>12} {:>12}", record_type, records, documents);
    }
    let documents = index.count_documents(None).context("Failed to count documents")?;
    println!("{:<24} {:>12} {:>12}", "total", stats.total(), documents);
    Ok(())
}
