// SPDX-License-Identifier: AGPL-3.0-or-later
// SketchStream - Streaming Cardinality & Frequency Summarizer
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! SketchStream CLI
//!
//! Approximate stream summarization over line input:
//!
//! ```bash
//! # distinct count of access-log IPs
//! cut -d' ' -f1 access.log | sketchstream hll --precision 14
//!
//! # top 20 hottest keys, 30-second buckets
//! sketchstream cms --topk 20 --bucket 30s --file keys.log
//!
//! # emit each distinct line once
//! sketchstream bloom --mem-budget 1048576 --dedup < lines.txt
//! ```
//!
//! Logging goes to stderr (stdout carries results). Exit codes: 0 success,
//! 2 argument/general error, 3 I/O error, 5 configuration error.

mod output;

use std::io;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use sketchstream_core::error::SketchError;
use sketchstream_core::hash::{HashConfig, HashKind};
use sketchstream_core::sketches::{BloomFilter, CountMinSketch, HyperLogLog};
use sketchstream_core::timeutil::{format_utc_iso8601, parse_duration};
use sketchstream_pipeline::{
    run_dedup_pipeline, run_sketch_pipeline, InputSource, PipelineConfig, ShardMode, Snapshot,
};

const EXIT_SUCCESS: u8 = 0;
const EXIT_GENERAL: u8 = 2;
const EXIT_IO: u8 = 3;
const EXIT_CONFIG: u8 = 5;

#[derive(Parser)]
#[command(
    name = "sketchstream",
    version,
    about = "Approximate stream summarization (HLL / Bloom / CMS)"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalOpts {
    /// Worker threads; 0 means hardware concurrency
    #[arg(long, global = true, default_value_t = 0)]
    threads: usize,

    /// Read from a file instead of stdin ("-" also means stdin)
    #[arg(long, global = true)]
    file: Option<String>,

    /// Machine-readable output, one JSON object per line
    #[arg(long, global = true)]
    json: bool,

    /// Stop after N input lines; 0 means unlimited
    #[arg(long = "stop-after", global = true, default_value_t = 0)]
    stop_after: u64,

    /// Hash algorithm: wyhash or xxhash
    #[arg(long, global = true, default_value = "wyhash")]
    hash: String,

    /// Base hash seed
    #[arg(long, global = true, default_value_t = 0)]
    seed: u64,

    /// Emit one snapshot per time bucket, e.g. 30s or 1m
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Report ingest progress periodically on stderr
    #[arg(long, global = true)]
    stats: bool,

    /// Progress report interval in seconds
    #[arg(long = "stats-interval", global = true, default_value_t = 5)]
    stats_interval: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Approximate distinct count (HyperLogLog)
    Hll {
        /// Register precision p; m = 2^p registers
        #[arg(long, default_value_t = 14)]
        precision: u8,
    },

    /// Probabilistic membership and stream dedup (Bloom filter)
    Bloom {
        /// Target false-positive rate in (0, 1)
        #[arg(long)]
        fp: Option<f64>,

        /// Expected item count for --fp sizing
        #[arg(long = "capacity-hint")]
        capacity_hint: Option<u64>,

        /// Raw memory budget in bytes (alternative to --fp)
        #[arg(long = "mem-budget")]
        mem_budget: Option<u64>,

        /// Stream mode: emit each distinct input line once
        #[arg(long)]
        dedup: bool,
    },

    /// Frequency estimation (Count-Min sketch)
    Cms {
        /// Relative error target in (0, 1)
        #[arg(long, default_value_t = 1e-3)]
        eps: f64,

        /// Failure probability in (0, 1)
        #[arg(long, default_value_t = 1e-4)]
        delta: f64,

        /// Track and report the K hottest keys; 0 disables tracking
        #[arg(long, default_value_t = 0)]
        topk: usize,
    },
}

fn main() -> ExitCode {
    // stdout carries results; all diagnostics go to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: tracing subscriber already installed");
    }

    let cli = Cli::parse();
    ExitCode::from(run(cli))
}

fn run(cli: Cli) -> u8 {
    let cfg = match build_pipeline_config(&cli.global) {
        Ok(cfg) => cfg,
        Err(code) => return code,
    };
    let json = cli.global.json;
    match cli.command {
        Command::Hll { precision } => cmd_hll(&cfg, json, precision),
        Command::Bloom {
            fp,
            capacity_hint,
            mem_budget,
            dedup,
        } => cmd_bloom(&cfg, json, fp, capacity_hint, mem_budget, dedup),
        Command::Cms { eps, delta, topk } => cmd_cms(&cfg, json, eps, delta, topk),
    }
}

fn build_pipeline_config(global: &GlobalOpts) -> Result<PipelineConfig, u8> {
    let kind: HashKind = match global.hash.parse() {
        Ok(kind) => kind,
        Err(e) => {
            error!(error = %e, "invalid --hash");
            return Err(EXIT_GENERAL);
        }
    };
    let bucket = match &global.bucket {
        None => None,
        Some(text) => match parse_duration(text) {
            Some(d) => Some(d),
            None => {
                error!(bucket = %text, "invalid --bucket value");
                return Err(EXIT_GENERAL);
            }
        },
    };
    let input = global
        .file
        .as_deref()
        .map(InputSource::from_path_arg)
        .unwrap_or_default();
    Ok(PipelineConfig {
        threads: global.threads,
        input,
        stop_after: global.stop_after,
        hash: HashConfig::new(kind, global.seed),
        bucket,
        stats: global.stats,
        stats_interval: std::time::Duration::from_secs(global.stats_interval.max(1)),
    })
}

fn exit_code_for(err: &SketchError) -> u8 {
    match err {
        SketchError::Io(_) => EXIT_IO,
        SketchError::InvalidArgument(_) => EXIT_CONFIG,
        _ => EXIT_GENERAL,
    }
}

fn cmd_hll(cfg: &PipelineConfig, json: bool, precision: u8) -> u8 {
    let bucketed = cfg.bucket.is_some();
    let result = run_sketch_pipeline(
        cfg,
        ShardMode::HashLine,
        move |h| HyperLogLog::with_precision(precision, h),
        |snap: Snapshot<'_, HyperLogLog>| {
            let ts = bucketed.then(|| format_utc_iso8601(snap.bucket_start));
            output::emit_hll(
                json,
                ts.as_deref(),
                snap.sketch.estimate(),
                snap.sketch.register_count(),
            );
        },
    );
    match result {
        Ok(_) => EXIT_SUCCESS,
        Err(e) => {
            error!(error = %e, "hll run failed");
            exit_code_for(&e)
        }
    }
}

fn cmd_bloom(
    cfg: &PipelineConfig,
    json: bool,
    fp: Option<f64>,
    capacity_hint: Option<u64>,
    mem_budget: Option<u64>,
    dedup: bool,
) -> u8 {
    if fp.is_some() && mem_budget.is_some() {
        error!("specify either --fp or --mem-budget, not both");
        return EXIT_GENERAL;
    }
    let factory = move |h: HashConfig| -> Result<BloomFilter, SketchError> {
        match (fp, mem_budget) {
            (Some(p), None) => match capacity_hint {
                Some(hint) => BloomFilter::with_false_positive_capacity(p, hint as usize, h),
                None => BloomFilter::with_false_positive(p, h),
            },
            (None, Some(bytes)) => BloomFilter::with_memory_budget(bytes as usize, h),
            _ => Err(SketchError::InvalidArgument(
                "specify --fp or --mem-budget".into(),
            )),
        }
    };

    if !dedup {
        // Construction-only invocation: derive and report the layout.
        return match factory(cfg.hash) {
            Ok(filter) => {
                output::emit_bloom_layout(json, filter.bit_count(), filter.hashes());
                EXIT_SUCCESS
            }
            Err(e) => {
                error!(error = %e, "failed to build bloom filter");
                if fp.is_none() && mem_budget.is_none() {
                    EXIT_GENERAL
                } else {
                    exit_code_for(&e)
                }
            }
        };
    }

    match run_dedup_pipeline(cfg, factory, io::stdout()) {
        Ok(report) => {
            output::emit_dedup_summary(json, &report, fp);
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "dedup run failed");
            if fp.is_none() && mem_budget.is_none() {
                EXIT_GENERAL
            } else {
                exit_code_for(&e)
            }
        }
    }
}

fn cmd_cms(cfg: &PipelineConfig, json: bool, eps: f64, delta: f64, topk: usize) -> u8 {
    let bucketed = cfg.bucket.is_some();
    let result = run_sketch_pipeline(
        cfg,
        ShardMode::RoundRobin,
        move |h| {
            if topk > 0 {
                CountMinSketch::with_eps_delta_topk(eps, delta, topk, h)
            } else {
                CountMinSketch::with_eps_delta(eps, delta, h)
            }
        },
        |snap: Snapshot<'_, CountMinSketch>| {
            let ts = bucketed.then(|| format_utc_iso8601(snap.bucket_start));
            if topk > 0 {
                let entries = snap.sketch.top_k(topk);
                output::emit_cms_topk(json, ts.as_deref(), &entries);
            } else {
                let (depth, width) = snap.sketch.dims();
                output::emit_cms_dims(json, ts.as_deref(), depth, width);
            }
        },
    );
    match result {
        Ok(_) => EXIT_SUCCESS,
        Err(e) => {
            error!(error = %e, "cms run failed");
            exit_code_for(&e)
        }
    }
}
