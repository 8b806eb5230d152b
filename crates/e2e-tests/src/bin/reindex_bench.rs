use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;

use e2e_tests::TestHarness;
use reindex_pipeline::{ReindexConfig, RunOutcome};
use reindex_types::{Record, RecordType};

const WORDS: &[&str] = &[
    "borrow", "checker", "lifetime", "trait", "async", "tokio", "segment", "merge", "column",
    "family", "index", "batch", "scanner", "gate", "writer", "commit",
];

#[derive(Parser, Debug)]
#[command(name = "reindex_bench", about = "Mass reindexing throughput benchmark")]
struct Args {
    /// Records per record type
    #[arg(long, default_value_t = 20_000)]
    records: usize,
    #[arg(long, default_value_t = 2)]
    types: usize,
    #[arg(long, default_value_t = 3)]
    iterations: usize,
    #[arg(long, default_value_t = 100)]
    ids_per_batch: usize,
    #[arg(long, default_value_t = 10)]
    records_per_sub_batch: usize,
    #[arg(long, default_value_t = 6)]
    threads_to_process: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunMetrics {
    p50_ms: f64,
    p90_ms: f64,
    p50_records_per_sec: f64,
    samples: usize,
}

#[derive(Debug, Serialize)]
struct BenchmarkOutput {
    generated_at: String,
    records_per_type: usize,
    types: usize,
    config: BTreeMap<&'static str, usize>,
    metrics: RunMetrics,
}

fn synthetic_records(rng: &mut StdRng, record_type: &RecordType, count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let words: Vec<&str> = (0..12)
                .map(|_| WORDS[rng.random_range(0..WORDS.len())])
                .collect();
            Record::new(
                record_type.clone(),
                format!("{:08}", i),
                json!({ "title": words[..3].join(" "), "body": words.join(" "), "n": i }),
            )
        })
        .collect()
}

fn percentile(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (percentile / 100.0) * (sorted.len() as f64 - 1.0);
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    let weight = rank - low as f64;
    sorted[low] + (sorted[high] - sorted[low]) * weight
}

fn write_output(out_dir: &Path, json: &str) -> Result<(), String> {
    fs::create_dir_all(out_dir).map_err(|e| format!("Failed to create out dir: {e}"))?;
    fs::write(out_dir.join("latest.json"), json).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let harness = TestHarness::new();
    let record_types: Vec<RecordType> = (0..args.types)
        .map(|i| RecordType::new(format!("type{}", i)))
        .collect();
    for record_type in &record_types {
        harness.seed(&synthetic_records(&mut rng, record_type, args.records));
    }
    let total = (args.records * args.types) as f64;

    let mut durations = Vec::with_capacity(args.iterations);
    for iteration in 0..args.iterations {
        let config = ReindexConfig::for_types(record_types.clone())
            .with_ids_per_batch(args.ids_per_batch)
            .with_records_per_sub_batch(args.records_per_sub_batch)
            .with_threads_to_process(args.threads_to_process);

        let started = Instant::now();
        let summary = harness
            .mass_indexer(config)
            .start()
            .map_err(|e| e.to_string())?
            .wait()
            .await
            .map_err(|e| e.to_string())?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if summary.outcome != RunOutcome::Completed {
            return Err(format!("iteration {} did not complete", iteration));
        }
        println!(
            "iteration {}: {:.1} ms ({:.0} records/s)",
            iteration,
            elapsed_ms,
            total / (elapsed_ms / 1000.0)
        );
        durations.push(elapsed_ms);
    }

    durations.sort_by(|a, b| a.total_cmp(b));
    let p50_ms = percentile(&durations, 50.0);
    let output = BenchmarkOutput {
        generated_at: Utc::now().to_rfc3339(),
        records_per_type: args.records,
        types: args.types,
        config: BTreeMap::from([
            ("ids_per_batch", args.ids_per_batch),
            ("records_per_sub_batch", args.records_per_sub_batch),
            ("threads_to_process", args.threads_to_process),
        ]),
        metrics: RunMetrics {
            p50_ms,
            p90_ms: percentile(&durations, 90.0),
            p50_records_per_sec: if p50_ms > 0.0 {
                total / (p50_ms / 1000.0)
            } else {
                0.0
            },
            samples: durations.len(),
        },
    };

    let json = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("\n{}", json);
    if let Some(out_dir) = &args.out_dir {
        write_output(out_dir, &json)?;
    }
    Ok(())
}
