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

//! HyperLogLog - Cardinality Estimation
//!
//! A probabilistic data structure for estimating the number of distinct
//! elements in a stream with:
//! - O(1) update per element
//! - O(m) space where m = 2^precision
//! - Mergeable across workers and time buckets (element-wise register max)
//!
//! Standard error: 1.04 / sqrt(m)
//! - precision=12: m=4096, error ~1.63%
//! - precision=14: m=16384, error ~0.81%
//!
//! Reference: Flajolet et al., "HyperLogLog: the analysis of a near-optimal
//! cardinality estimation algorithm" (2007)

use crate::error::{Result, SketchError};
use crate::hash::{hash64, HashConfig};
use crate::sketches::Sketch;

/// Supported precision range; m = 2^p registers.
pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 20;

/// Default precision (m = 16384, ~0.81% standard error).
pub const DEFAULT_PRECISION: u8 = 14;

/// Exact 2^64 as a double, for the large-range correction.
const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// HyperLogLog cardinality sketch.
///
/// Registers hold the maximum leading-zero rank observed among hashes routed
/// to them; ranks lie in `1..=64-p+1`.
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    precision: u8,
    hash: HashConfig,
    registers: Vec<u8>,
}

impl HyperLogLog {
    /// Create a sketch with `2^precision` zeroed registers.
    ///
    /// Precision outside `4..=20` is rejected with `InvalidArgument`.
    pub fn with_precision(precision: u8, hash: HashConfig) -> Result<Self> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(SketchError::InvalidArgument(format!(
                "precision {precision} out of range {MIN_PRECISION}..={MAX_PRECISION}"
            )));
        }
        let m = 1usize << precision;
        Ok(Self {
            precision,
            hash,
            registers: vec![0u8; m],
        })
    }

    /// Add one item.
    #[inline]
    pub fn add(&mut self, item: &[u8]) {
        let h = hash64(item, &self.hash);
        let p = self.precision;
        let idx = (h >> (64 - p)) as usize;
        let rank = Self::rank_from_hash(h, p);
        let cell = &mut self.registers[idx];
        if rank > *cell {
            *cell = rank;
        }
    }

    /// Rank = 1 + leading zeros of the post-index bits. The planted bit at
    /// position p-1 caps the count so the all-zero tail yields 64 - p + 1.
    #[inline]
    fn rank_from_hash(h: u64, p: u8) -> u8 {
        let tail = (h << p) | (1u64 << (p - 1));
        let rank = tail.leading_zeros() as u8 + 1;
        let max_rank = 64 - p + 1;
        rank.min(max_rank)
    }

    /// Estimate the number of distinct items added so far.
    ///
    /// Applies the classical alpha correction, linear counting in the small
    /// range (E <= 2.5m with empty registers), and the 64-bit hash-space
    /// saturation correction in the large range (E > 2^64 / 30).
    pub fn estimate(&self) -> f64 {
        let m = self.register_count() as f64;
        let mut sum = 0.0f64;
        let mut zeros = 0usize;
        for &r in &self.registers {
            if r == 0 {
                zeros += 1;
            }
            sum += 2.0f64.powi(-(r as i32));
        }
        let raw = Self::alpha(self.register_count()) * m * m / sum;
        if raw <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else if raw > TWO_POW_64 / 30.0 {
            -TWO_POW_64 * (1.0 - raw / TWO_POW_64).ln()
        } else {
            raw
        }
    }

    /// Empirical alpha_m constant per classical HLL.
    fn alpha(m: usize) -> f64 {
        match m {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m as f64),
        }
    }

    /// Fold `other` into `self` by element-wise register maximum.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if !self.same_params(other) {
            return Err(SketchError::InvalidArgument(
                "incompatible hyperloglog merge".into(),
            ));
        }
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
        Ok(())
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Number of registers, m = 2^p.
    pub fn register_count(&self) -> usize {
        1usize << self.precision
    }

    /// Standard error of the estimator, 1.04 / sqrt(m).
    pub fn standard_error(&self) -> f64 {
        1.04 / (self.register_count() as f64).sqrt()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Resident size in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.registers.len()
    }

    fn same_params(&self, other: &Self) -> bool {
        self.precision == other.precision && self.hash == other.hash
    }
}

impl Sketch for HyperLogLog {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashKind;

    fn sketch(p: u8) -> HyperLogLog {
        HyperLogLog::with_precision(p, HashConfig::default()).unwrap()
    }

    #[test]
    fn test_precision_bounds_enforced() {
        assert!(HyperLogLog::with_precision(3, HashConfig::default()).is_err());
        assert!(HyperLogLog::with_precision(21, HashConfig::default()).is_err());
        assert!(HyperLogLog::with_precision(4, HashConfig::default()).is_ok());
        assert!(HyperLogLog::with_precision(20, HashConfig::default()).is_ok());
    }

    #[test]
    fn test_duplicates_do_not_inflate() {
        let mut hll = sketch(14);
        for _ in 0..1000 {
            hll.add(b"the-same-line");
        }
        assert!(hll.estimate() <= 2.0, "estimate {}", hll.estimate());
    }

    #[test]
    fn test_two_shard_merge_accuracy() {
        // Two disjoint halves merged, p=12 (m=4096): the estimate must land
        // within 5 standard errors of the true union.
        let p = 12u8;
        let mut s1 = sketch(p);
        let mut s2 = sketch(p);
        let n = 50_000usize;
        for i in 0..n {
            s1.add(format!("k-{i}").as_bytes());
            s2.add(format!("k-{}", i + n).as_bytes());
        }
        s1.merge(&s2).unwrap();

        let est = s1.estimate();
        let rel = 1.04 / ((1u32 << p) as f64).sqrt();
        let expected = (2 * n) as f64;
        let lo = expected * (1.0 - 5.0 * rel);
        let hi = expected * (1.0 + 5.0 * rel);
        assert!(est >= lo && est <= hi, "estimate {est} not in [{lo}, {hi}]");
    }

    #[test]
    fn test_linear_counting_region() {
        let mut hll = sketch(12);
        let n = 500usize; // n << m, linear counting applies
        for i in 0..n {
            hll.add(format!("x-{i}").as_bytes());
        }
        let est = hll.estimate();
        assert!(
            est >= n as f64 * 0.85 && est <= n as f64 * 1.15,
            "linear-region estimate {est} for n={n}"
        );
    }

    #[test]
    fn test_merge_is_idempotent_and_commutative() {
        let mut a = sketch(10);
        let mut b = sketch(10);
        for i in 0..2000 {
            a.add(format!("a-{i}").as_bytes());
            b.add(format!("b-{i}").as_bytes());
        }
        let mut ab = a.clone();
        ab.merge(&b).unwrap();
        let mut ba = b.clone();
        ba.merge(&a).unwrap();
        assert_eq!(ab.registers, ba.registers);

        let mut twice = ab.clone();
        twice.merge(&b).unwrap();
        assert_eq!(twice.registers, ab.registers);
    }

    #[test]
    fn test_merge_rejects_mismatched_params() {
        let mut a = sketch(12);
        let b = sketch(13);
        assert!(a.merge(&b).unwrap_err().is_invalid_argument());

        let c = HyperLogLog::with_precision(12, HashConfig::new(HashKind::Xx, 0)).unwrap();
        assert!(a.merge(&c).unwrap_err().is_invalid_argument());

        let d = HyperLogLog::with_precision(12, HashConfig::default().with_seed(99)).unwrap();
        assert!(a.merge(&d).unwrap_err().is_invalid_argument());

        let e =
            HyperLogLog::with_precision(12, HashConfig::default().with_thread_salt(7)).unwrap();
        assert!(a.merge(&e).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_rank_clamps_on_zero_tail() {
        // A hash whose post-index bits are all zero must produce the maximum
        // rank, not 65.
        let p = 14u8;
        let rank = HyperLogLog::rank_from_hash(0, p);
        assert_eq!(rank, 64 - p + 1);
    }

    #[test]
    fn test_memory_usage_tracks_register_count() {
        let small = sketch(4);
        let large = sketch(14);
        assert!(small.memory_usage() >= 16);
        assert!(large.memory_usage() >= 16_384);
        assert!(large.memory_usage() > small.memory_usage());
    }

    #[test]
    fn test_empty_sketch_estimates_zero() {
        let hll = sketch(12);
        assert!(hll.is_empty());
        assert_eq!(hll.estimate(), 0.0);
    }
}
