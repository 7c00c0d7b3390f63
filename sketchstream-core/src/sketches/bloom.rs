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

//! Bloom Filter - Probabilistic Set Membership
//!
//! Space-efficient existence tests over a 64-bit word array:
//! - `might_contain` never returns false for a previously added item
//! - false positives occur at a configurable rate
//! - merge of identically parameterized filters is the bitwise union
//!
//! Positions are derived by double hashing, `h1 + i*(h2|1) mod m`; forcing
//! the second hash odd avoids short probe cycles when m has small factors
//! of two. Proven equivalent to k independent hash functions in Kirsch &
//! Mitzenmacher, "Less Hashing, Same Performance" (2008).

use crate::error::{Result, SketchError};
use crate::hash::{hash64, HashConfig, GOLDEN_GAMMA};
use crate::sketches::Sketch;

/// Smallest accepted memory budget: one 64-bit word.
const MIN_BYTES: usize = 8;

/// Hash count used by the memory-budget constructor.
const DEFAULT_K: u8 = 7;

/// Capacity hint used when `with_false_positive` is not given one.
pub const DEFAULT_CAPACITY_HINT: usize = 100_000;

const MAX_K: u8 = 32;

/// Bloom filter over `m` bits with `k` probes per item.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    bit_count: usize,
    k: u8,
    hash: HashConfig,
}

impl BloomFilter {
    /// Build from a raw memory budget: `m = (bytes / 8) * 64` bits, k = 7.
    ///
    /// Budgets under 8 bytes are rejected with `InvalidArgument`.
    pub fn with_memory_budget(bytes: usize, hash: HashConfig) -> Result<Self> {
        if bytes < MIN_BYTES {
            return Err(SketchError::InvalidArgument(format!(
                "memory budget {bytes} below minimum {MIN_BYTES} bytes"
            )));
        }
        let words = bytes / 8;
        Ok(Self {
            bits: vec![0u64; words],
            bit_count: words * 64,
            k: DEFAULT_K,
            hash,
        })
    }

    /// Build for a target false-positive rate with the default capacity hint.
    pub fn with_false_positive(p: f64, hash: HashConfig) -> Result<Self> {
        Self::with_false_positive_capacity(p, DEFAULT_CAPACITY_HINT, hash)
    }

    /// Build for a target false-positive rate `p` at `capacity_hint` items.
    ///
    /// `k = round(-ln p / ln 2)` clamped to 1..=32;
    /// `m = ceil(capacity_hint * -ln p / (ln 2)^2)` rounded up to whole words.
    pub fn with_false_positive_capacity(
        p: f64,
        capacity_hint: usize,
        hash: HashConfig,
    ) -> Result<Self> {
        if !(p > 0.0 && p < 1.0) {
            return Err(SketchError::InvalidArgument(format!(
                "false-positive rate {p} not in (0, 1)"
            )));
        }
        if capacity_hint == 0 {
            return Err(SketchError::InvalidArgument(
                "capacity hint must be positive".into(),
            ));
        }
        let ln2 = std::f64::consts::LN_2;
        let k_real = -p.ln() / ln2;
        let k = k_real.round().clamp(1.0, MAX_K as f64) as u8;
        let bits_per_item = -p.ln() / (ln2 * ln2);
        let m_bits = (bits_per_item * capacity_hint as f64).ceil() as usize;
        let words = m_bits.div_ceil(64);
        Ok(Self {
            bits: vec![0u64; words],
            bit_count: words * 64,
            k,
            hash,
        })
    }

    /// Set the k probe bits for `item`.
    #[inline]
    pub fn add(&mut self, item: &[u8]) {
        let (h1, h2) = self.probe_hashes(item);
        for i in 0..self.k {
            let bit = self.bit_index(h1, h2, i);
            self.bits[bit >> 6] |= 1u64 << (bit & 63);
        }
    }

    /// Query the k probe bits for `item`.
    ///
    /// `false` means definitely absent; `true` means present or a false
    /// positive.
    #[inline]
    pub fn might_contain(&self, item: &[u8]) -> bool {
        let (h1, h2) = self.probe_hashes(item);
        for i in 0..self.k {
            let bit = self.bit_index(h1, h2, i);
            if self.bits[bit >> 6] & (1u64 << (bit & 63)) == 0 {
                return false;
            }
        }
        true
    }

    /// Bitwise-OR `other` into `self`.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if !self.same_params(other) {
            return Err(SketchError::InvalidArgument(
                "incompatible bloom merge".into(),
            ));
        }
        for (mine, theirs) in self.bits.iter_mut().zip(&other.bits) {
            *mine |= *theirs;
        }
        Ok(())
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn hashes(&self) -> u8 {
        self.k
    }

    /// Fraction of bits currently set.
    pub fn fill_ratio(&self) -> f64 {
        let set: u64 = self.bits.iter().map(|w| w.count_ones() as u64).sum();
        set as f64 / self.bit_count as f64
    }

    /// Resident size in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.bits.len() * 8
    }

    #[inline]
    fn probe_hashes(&self, item: &[u8]) -> (u64, u64) {
        let h1 = hash64(item, &self.hash);
        let second = HashConfig {
            seed: self.hash.seed ^ GOLDEN_GAMMA,
            ..self.hash
        };
        let h2 = hash64(item, &second) | 1;
        (h1, h2)
    }

    #[inline]
    fn bit_index(&self, h1: u64, h2: u64, i: u8) -> usize {
        let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
        (combined % self.bit_count as u64) as usize
    }

    fn same_params(&self, other: &Self) -> bool {
        self.bit_count == other.bit_count && self.k == other.k && self.hash == other.hash
    }
}

impl Sketch for BloomFilter {
    fn add_item(&mut self, item: &[u8]) {
        self.add(item);
    }

    fn merge_from(&mut self, other: &Self) -> Result<()> {
        self.merge(other)
    }

    fn hash_config(&self) -> HashConfig {
        self.hash
    }
}
