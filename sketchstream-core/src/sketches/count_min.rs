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

//! Count-Min Sketch - Frequency Estimation
//!
//! A d x w counter table answering "how often has this item occurred?" with
//! one-sided error:
//!
//! ```text
//! estimate(x) >= true_count(x)                 always
//! P(estimate > true_count + eps*N) < delta     where w = ceil(e/eps),
//!                                                    d = ceil(ln(1/delta))
//! ```
//!
//! Each row hashes with a seed derived from the base configuration, so the
//! d row functions are decorrelated while the whole table stays reproducible
//! from `(kind, seed, thread_salt)`.
//!
//! An optional bounded candidate tracker records observed keys for top-K
//! queries; estimates always come from the table, so tracked keys inherit
//! the one-sided error guarantee.
//!
//! Reference: Cormode & Muthukrishnan, "An improved data stream summary:
//! the count-min sketch and its applications" (2005)

use std::collections::HashMap;

use crate::error::{Result, SketchError};
use crate::hash::{hash64, HashConfig, GOLDEN_GAMMA};
use crate::sketches::Sketch;

/// Candidate slots per requested top-K entry.
const CANDIDATE_FACTOR: usize = 8;

/// Floor on candidate capacity once tracking is enabled.
const MIN_CANDIDATES: usize = 128;

/// One top-K result: a key and its table estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopKEntry {
    pub key: String,
    pub estimate: u64,
}

/// Count-Min frequency sketch.
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    depth: usize,
    width: usize,
    hash: HashConfig,
    table: Vec<u64>,
    candidates: Option<CandidateTracker>,
}

impl CountMinSketch {
    /// Build from accuracy targets: `w = ceil(e/eps)`, `d = ceil(ln(1/delta))`.
    ///
    /// Both parameters must lie in (0, 1); top-K tracking is disabled.
    pub fn with_eps_delta(eps: f64, delta: f64, hash: HashConfig) -> Result<Self> {
        if !(eps > 0.0 && eps < 1.0) {
            return Err(SketchError::InvalidArgument(format!(
                "eps {eps} not in (0, 1)"
            )));
        }
        if !(delta > 0.0 && delta < 1.0) {
            return Err(SketchError::InvalidArgument(format!(
                "delta {delta} not in (0, 1)"
            )));
        }
        let width = (std::f64::consts::E / eps).ceil() as usize;
        let depth = (1.0 / delta).ln().ceil() as usize;
        Ok(Self {
            depth,
            width,
            hash,
            table: vec![0u64; depth * width],
            candidates: None,
        })
    }

    /// Build with top-K candidate tracking sized for `k` results.
    pub fn with_eps_delta_topk(eps: f64, delta: f64, k: usize, hash: HashConfig) -> Result<Self> {
        if k == 0 {
            return Err(SketchError::InvalidArgument(
                "top-k size must be positive".into(),
            ));
        }
        let mut sketch = Self::with_eps_delta(eps, delta, hash)?;
        let capacity = (k * CANDIDATE_FACTOR).max(MIN_CANDIDATES);
        sketch.candidates = Some(CandidateTracker::new(capacity));
        Ok(sketch)
    }

    /// Add `count` occurrences of `item` to every row.
    #[inline]
    pub fn inc(&mut self, item: &[u8], count: u64) {
        for r in 0..self.depth {
            let col = self.column(item, r);
            let cell = &mut self.table[r * self.width + col];
            *cell = cell.saturating_add(count);
        }
        if self.candidates.is_some() {
            let est = self.estimate(item);
            if let Some(tracker) = self.candidates.as_mut() {
                tracker.observe(item, est);
            }
        }
    }

    /// Add a single occurrence.
    #[inline]
    pub fn increment(&mut self, item: &[u8]) {
        self.inc(item, 1);
    }

    /// Minimum over the d row counters; never below the true count.
    pub fn estimate(&self, item: &[u8]) -> u64 {
        let mut est = u64::MAX;
        for r in 0..self.depth {
            let col = self.column(item, r);
            est = est.min(self.table[r * self.width + col]);
        }
        if est == u64::MAX {
            0
        } else {
            est
        }
    }

    /// Up to `k` tracked keys, highest estimate first, ties by ascending key.
    ///
    /// A sketch built without tracking returns an empty list.
    pub fn top_k(&self, k: usize) -> Vec<TopKEntry> {
        let Some(tracker) = &self.candidates else {
            return Vec::new();
        };
        let mut entries: Vec<TopKEntry> = tracker
            .keys()
            .map(|key| TopKEntry {
                estimate: self.estimate(key.as_bytes()),
                key: key.clone(),
            })
            .collect();
        entries.sort_by(|a, b| b.estimate.cmp(&a.estimate).then_with(|| a.key.cmp(&b.key)));
        entries.truncate(k);
        entries
    }

    /// Sum `other`'s counters into `self` cell-wise, then re-score the union
    /// of tracked candidates against the merged table.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if !self.same_params(other) {
            return Err(SketchError::InvalidArgument(
                "incompatible count-min merge".into(),
            ));
        }
        for (mine, theirs) in self.table.iter_mut().zip(&other.table) {
            *mine = mine.saturating_add(*theirs);
        }
        if let Some(tracker) = self.candidates.take() {
            let mut merged = tracker;
            if let Some(theirs) = &other.candidates {
                for key in theirs.keys() {
                    let est = self.estimate(key.as_bytes());
                    merged.observe(key.as_bytes(), est);
                }
            }
            merged.rescore(|key| self.estimate_str(key));
            self.candidates = Some(merged);
        }
        Ok(())
    }

    /// (depth, width)
    pub fn dims(&self) -> (usize, usize) {
        (self.depth, self.width)
    }

    pub fn tracks_candidates(&self) -> bool {
        self.candidates.is_some()
    }

    /// Resident size in bytes, candidate keys included.
    pub fn memory_usage(&self) -> usize {
        let tracked: usize = self
            .candidates
            .as_ref()
            .map(|t| {
                t.keys()
                    .map(|k| k.len() + std::mem::size_of::<u64>())
                    .sum()
            })
            .unwrap_or(0);
        std::mem::size_of::<Self>() + self.table.len() * 8 + tracked
    }

    #[inline]
    fn estimate_str(&self, key: &str) -> u64 {
        self.estimate(key.as_bytes())
    }

    #[inline]
    fn column(&self, item: &[u8], row: usize) -> usize {
        let row_cfg = HashConfig {
            seed: self
                .hash
                .seed
                ^ GOLDEN_GAMMA.wrapping_mul(row as u64 + 1),
            ..self.hash
        };
        (hash64(item, &row_cfg) % self.width as u64) as usize
    }

    fn same_params(&self, other: &Self) -> bool {
        self.depth == other.depth && self.width == other.width && self.hash == other.hash
    }
}

impl Sketch for CountMinSketch {
    fn add_item(&mut self, item: &[u8]) {
        self.increment(item);
    }

    fn merge_from(&mut self, other: &Self) -> Result<()> {
        self.merge(other)
    }

    fn hash_config(&self) -> HashConfig {
        self.hash
    }
}

/// Bounded key tracker backing `top_k`.
///
/// Keys are retained with their latest table estimate; when full, the entry
/// with the smallest estimate is evicted, so persistently heavy keys survive.
#[derive(Debug, Clone)]
struct CandidateTracker {
    capacity: usize,
    entries: HashMap<String, u64>,
}

impl CandidateTracker {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
        }
    }

    fn observe(&mut self, key: &[u8], estimate: u64) {
        let key = String::from_utf8_lossy(key).into_owned();
        self.entries.insert(key, estimate);
        if self.entries.len() > self.capacity {
            self.evict_min();
        }
    }

    fn rescore<F: Fn(&str) -> u64>(&mut self, score: F) {
        for (key, est) in self.entries.iter_mut() {
            *est = score(key);
        }
        while self.entries.len() > self.capacity {
            self.evict_min();
        }
    }

    fn evict_min(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by(|(ka, va), (kb, vb)| va.cmp(vb).then_with(|| kb.cmp(ka)))
            .map(|(k, _)| k.clone());
        if let Some(k) = victim {
            self.entries.remove(&k);
        }
    }

    fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sketch() -> CountMinSketch {
        CountMinSketch::with_eps_delta(1e-3, 1e-4, HashConfig::default()).unwrap()
    }

    #[test]
    fn test_dimension_formulas() {
        let s = sketch();
        let (d, w) = s.dims();
        assert_eq!(w, (std::f64::consts::E / 1e-3).ceil() as usize);
        assert_eq!(d, (1.0f64 / 1e-4).ln().ceil() as usize);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let h = HashConfig::default();
        assert!(CountMinSketch::with_eps_delta(0.0, 0.5, h).is_err());
        assert!(CountMinSketch::with_eps_delta(1.0, 0.5, h).is_err());
        assert!(CountMinSketch::with_eps_delta(0.5, 0.0, h).is_err());
        assert!(CountMinSketch::with_eps_delta(0.5, 1.5, h).is_err());
        assert!(CountMinSketch::with_eps_delta_topk(0.01, 0.01, 0, h).is_err());
    }

    #[test]
    fn test_basic_counting_never_underestimates() {
        let mut s = sketch();
        for _ in 0..100 {
            s.increment(b"hello");
        }
        for _ in 0..50 {
            s.increment(b"world");
        }
        assert!(s.estimate(b"hello") >= 100);
        assert!(s.estimate(b"world") >= 50);
        assert_eq!(s.estimate(b"never-seen"), 0);
    }

    #[test]
    fn test_overestimate_bounded_after_merge() {
        // Hot keys in one shard, cold keys in the other; after the merge
        // every hot key estimate must sit in [true, true + 300] for this
        // corpus size at eps=1e-3.
        let mut hot = sketch();
        let mut cold = sketch();
        let mut truth: HashMap<String, u64> = HashMap::new();
        for i in 0..10_000 {
            let hot_key = format!("key-{}", i % 10);
            let cold_key = format!("cold-{i}");
            hot.increment(hot_key.as_bytes());
            cold.increment(cold_key.as_bytes());
            *truth.entry(hot_key).or_default() += 1;
            *truth.entry(cold_key).or_default() += 1;
        }
        hot.merge(&cold).unwrap();

        for j in 0..10 {
            let key = format!("key-{j}");
            let est = hot.estimate(key.as_bytes());
            let t = truth[&key];
            assert!(est >= t, "underestimate for {key}: {est} < {t}");
            assert!(est - t <= 300, "overestimate for {key}: {est} vs {t}");
        }
    }

    #[test]
    fn test_merge_sums_cellwise() {
        let h = HashConfig::default();
        let mut a = CountMinSketch::with_eps_delta(0.01, 0.01, h).unwrap();
        let mut b = CountMinSketch::with_eps_delta(0.01, 0.01, h).unwrap();
        for _ in 0..50 {
            a.increment(b"x");
            b.increment(b"x");
        }
        a.merge(&b).unwrap();
        assert!(a.estimate(b"x") >= 100);
    }

    #[test]
    fn test_merge_rejects_incompatible() {
        let h = HashConfig::default();
        let mut a = CountMinSketch::with_eps_delta(1e-3, 1e-4, h).unwrap();

        let wider = CountMinSketch::with_eps_delta(1e-2, 1e-4, h).unwrap();
        assert!(a.merge(&wider).unwrap_err().is_invalid_argument());

        let deeper = CountMinSketch::with_eps_delta(1e-3, 1e-2, h).unwrap();
        assert!(a.merge(&deeper).unwrap_err().is_invalid_argument());

        let reseeded = CountMinSketch::with_eps_delta(1e-3, 1e-4, h.with_seed(3)).unwrap();
        assert!(a.merge(&reseeded).unwrap_err().is_invalid_argument());

        let salted =
            CountMinSketch::with_eps_delta(1e-3, 1e-4, h.with_thread_salt(11)).unwrap();
        assert!(a.merge(&salted).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_top_k_ordering_and_ties() {
        let mut s =
            CountMinSketch::with_eps_delta_topk(1e-3, 1e-4, 3, HashConfig::default()).unwrap();
        for _ in 0..100 {
            s.increment(b"alpha");
        }
        for _ in 0..50 {
            s.increment(b"beta");
        }
        for _ in 0..50 {
            s.increment(b"gamma");
        }
        for _ in 0..10 {
            s.increment(b"delta");
        }

        let top = s.top_k(3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].key, "alpha");
        assert!(top[0].estimate >= 100);
        // beta and gamma share an estimate; lexicographic order breaks the tie
        assert_eq!(top[1].key, "beta");
        assert_eq!(top[2].key, "gamma");
    }

    #[test]
    fn test_top_k_without_tracking_is_empty() {
        let mut s = sketch();
        for _ in 0..10 {
            s.increment(b"a");
        }
        assert!(s.top_k(5).is_empty());
        assert!(!s.tracks_candidates());
    }

    #[test]
    fn test_tracker_stays_bounded() {
        let mut s =
            CountMinSketch::with_eps_delta_topk(1e-2, 1e-2, 2, HashConfig::default()).unwrap();
        // Far more distinct keys than the candidate capacity, with two
        // genuinely heavy hitters mixed in.
        for i in 0..10_000 {
            s.increment(format!("one-shot-{i}").as_bytes());
            if i % 2 == 0 {
                s.increment(b"heavy-a");
            }
            if i % 4 == 0 {
                s.increment(b"heavy-b");
            }
        }
        let top = s.top_k(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].key, "heavy-a");
        assert_eq!(top[1].key, "heavy-b");
    }

    #[test]
    fn test_topk_survives_merge() {
        let h = HashConfig::default();
        let mut a = CountMinSketch::with_eps_delta_topk(1e-3, 1e-4, 4, h).unwrap();
        let mut b = CountMinSketch::with_eps_delta_topk(1e-3, 1e-4, 4, h).unwrap();
        for _ in 0..60 {
            a.increment(b"left-heavy");
        }
        for _ in 0..80 {
            b.increment(b"right-heavy");
        }
        a.merge(&b).unwrap();
        let top = a.top_k(2);
        assert_eq!(top[0].key, "right-heavy");
        assert!(top[0].estimate >= 80);
        assert_eq!(top[1].key, "left-heavy");
        assert!(top[1].estimate >= 60);
    }
}
