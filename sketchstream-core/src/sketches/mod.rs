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

//! Probabilistic Sketches for Stream Summarization
//!
//! Fixed-memory structures answering approximate questions about an
//! unbounded line stream:
//! - HyperLogLog: how many distinct items?
//! - BloomFilter: has this item been seen? (no false negatives)
//! - CountMinSketch: how often has this item occurred? (never underestimates)
//!
//! All three are constructed by validating factories, mutated only by their
//! owning thread, and combined across threads exclusively through `merge_from`.

pub mod bloom;
pub mod count_min;
pub mod hyperloglog;

pub use bloom::BloomFilter;
pub use count_min::{CountMinSketch, TopKEntry};
pub use hyperloglog::HyperLogLog;

use crate::error::Result;
use crate::hash::HashConfig;

/// Capability seam between the sketches and the ingest pipeline.
///
/// A pipeline worker only ever feeds bytes in; the reducer only ever merges
/// same-parameter instances. Merging sketches built with different
/// parameters or hash configurations fails with `InvalidArgument`.
pub trait Sketch: Sized {
    /// Absorb one item. Infallible: hashing is total and updates saturate.
    fn add_item(&mut self, item: &[u8]);

    /// Fold another sketch of identical parameterization into this one.
    fn merge_from(&mut self, other: &Self) -> Result<()>;

    /// The hash configuration this sketch was built with.
    fn hash_config(&self) -> HashConfig;
}
