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

//! SketchStream Pipeline
//!
//! Threaded line ingest for the core sketches: one reader shards lines over
//! lock-free SPSC rings into N workers with thread-local sketches; an
//! optional reducer rotates time buckets and emits merged snapshots.
//!
//! See [`pipeline::run_sketch_pipeline`] and [`pipeline::run_dedup_pipeline`]
//! for the two entry points.

pub mod config;
pub mod pipeline;
pub mod spsc;

pub use config::{InputSource, PipelineConfig, ShardMode};
pub use pipeline::{
    request_stop, reset_stop, run_dedup_pipeline, run_sketch_pipeline, stop_requested,
    DedupReport, PipelineReport, Snapshot,
};
pub use spsc::SpscRing;
