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

//! SketchStream Core
//!
//! Fundamental types for approximate stream summarization: the seeded hash
//! layer, the error taxonomy, the three sketches, and time utilities.
//!
//! # Core Components
//!
//! - **Hash layer**: reproducible seeded 64-bit hashing (Wy and Xx families)
//!   with per-thread salt derivation
//! - **Sketches**: HyperLogLog (distinct counts), Bloom filter (membership),
//!   Count-Min (frequencies), unified behind the [`sketches::Sketch`] trait
//! - **Time utilities**: duration parsing, monotonic-to-wall mapping,
//!   ISO-8601 UTC formatting
//!
//! Everything here is single-threaded by construction; cross-thread
//! aggregation happens exclusively through `merge_from` in the pipeline
//! crate.
//!
//! # Example
//!
//! ```rust
//! use sketchstream_core::hash::HashConfig;
//! use sketchstream_core::sketches::HyperLogLog;
//!
//! let mut hll = HyperLogLog::with_precision(12, HashConfig::default()).unwrap();
//! for i in 0..1000u32 {
//!     hll.add(format!("user-{i}").as_bytes());
//! }
//! let estimate = hll.estimate();
//! assert!((estimate - 1000.0).abs() < 100.0);
//! ```

pub mod error;
pub mod hash;
pub mod sketches;
pub mod timeutil;

pub use error::{Result, SketchError};
pub use hash::{derive_thread_salt, hash64, HashConfig, HashKind};
pub use sketches::{BloomFilter, CountMinSketch, HyperLogLog, Sketch, TopKEntry};
pub use timeutil::{format_utc_iso8601, parse_duration, Timebase};

/// Crate version
pub const SKETCHSTREAM_VERSION: &str = env!("CARGO_PKG_VERSION");
