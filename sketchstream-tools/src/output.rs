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

//! Output Formatters
//!
//! Human text by default, one JSON object per line with `--json`.
//! Bucketed emissions carry the bucket's ISO-8601 UTC start timestamp.

use serde::Serialize;

use sketchstream_core::sketches::TopKEntry;
use sketchstream_pipeline::DedupReport;

#[derive(Serialize)]
struct HllLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<&'a str>,
    uu: u64,
    m: usize,
}

#[derive(Serialize)]
struct TopKItem<'a> {
    key: &'a str,
    est: u64,
}

#[derive(Serialize)]
struct TopKLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<&'a str>,
    topk: Vec<TopKItem<'a>>,
}

#[derive(Serialize)]
struct CmsDimsLine {
    depth: usize,
    width: usize,
}

#[derive(Serialize)]
struct BloomLayoutLine {
    m_bits: usize,
    k: u8,
}

#[derive(Serialize)]
struct DedupSummaryLine {
    seen: u64,
    passed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    fp_target: Option<f64>,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}

/// Unique-count summary; `ts` is present in bucket mode.
pub fn emit_hll(json: bool, ts: Option<&str>, estimate: f64, m: usize) {
    let uu = estimate.round().max(0.0) as u64;
    if json {
        print_json(&HllLine { ts, uu, m });
    } else if let Some(ts) = ts {
        println!("{ts}\tuu={uu} m={m}");
    } else {
        println!("uu={uu} m={m}");
    }
}

/// Top-K table; `ts` is present in bucket mode.
pub fn emit_cms_topk(json: bool, ts: Option<&str>, entries: &[TopKEntry]) {
    if json {
        let items: Vec<TopKItem<'_>> = entries
            .iter()
            .map(|e| TopKItem {
                key: &e.key,
                est: e.estimate,
            })
            .collect();
        print_json(&TopKLine { ts, topk: items });
    } else if let Some(ts) = ts {
        println!("{ts}\titems={}", entries.len());
    } else {
        for entry in entries {
            println!("{}\t{}", entry.key, entry.estimate);
        }
    }
}

/// Table dimensions, emitted when top-K tracking is off.
pub fn emit_cms_dims(json: bool, ts: Option<&str>, depth: usize, width: usize) {
    if json {
        print_json(&CmsDimsLine { depth, width });
    } else if let Some(ts) = ts {
        println!("{ts}\trotated");
    } else {
        println!("cms: processed");
    }
}

/// Derived Bloom layout for construction-only invocations.
pub fn emit_bloom_layout(json: bool, m_bits: usize, k: u8) {
    if json {
        print_json(&BloomLayoutLine { m_bits, k });
    } else {
        println!("bloom: m_bits={m_bits} k={k}");
    }
}

/// Dedup totals go to stderr; stdout carries the deduplicated stream.
pub fn emit_dedup_summary(json: bool, report: &DedupReport, fp_target: Option<f64>) {
    if !json {
        return;
    }
    let line = DedupSummaryLine {
        seen: report.seen,
        passed: report.emitted,
        fp_target,
    };
    match serde_json::to_string(&line) {
        Ok(text) => eprintln!("{text}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize dedup summary"),
    }
}
