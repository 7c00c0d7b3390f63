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

//! Seeded 64-bit String Hashing
//!
//! Every sketch in this workspace indexes through this layer, so the whole
//! pipeline is reproducible from `(kind, seed, thread_salt)` alone:
//!
//! - **Wy**: folded-multiply construction over 16-byte blocks with an
//!   8-byte tail and an overlapping 4-byte tail. Fast on short lines.
//! - **Xx**: 64-bit xxHash. Four accumulator lanes for inputs >= 32 bytes,
//!   then the standard 8/4/1-byte tail steps and avalanche finisher.
//!
//! Both families fold the per-thread salt into the seed (`seed ^ thread_salt`),
//! which keeps worker-local structures decorrelated without any coordination.
//! Hashing is total: there is no failure path.
//!
//! `derive_thread_salt` spaces worker seeds with a SplitMix64 step so that
//! adjacent worker indices land far apart in seed space.

use std::fmt;
use std::str::FromStr;

use crate::error::SketchError;

/// Golden-ratio increment used for salt derivation and row reseeding.
pub const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

const SPLITMIX_MUL1: u64 = 0xBF58_476D_1CE4_E5B9;
const SPLITMIX_MUL2: u64 = 0x94D0_49BB_1331_11EB;

const WY_P0: u64 = 0xA076_1D64_78BD_642F;
const WY_P1: u64 = 0xE703_7ED1_A0B4_28DB;
const WY_P2: u64 = 0x8EBC_6AF0_9C88_C6E3;
const WY_P3: u64 = 0x5899_65CC_7537_4CC3;
const WY_P4: u64 = 0x1D8E_4E27_C47D_124F;

const XX_PRIME1: u64 = 11_400_714_785_074_694_791;
const XX_PRIME2: u64 = 14_029_467_366_897_019_727;
const XX_PRIME3: u64 = 1_609_587_929_392_839_161;
const XX_PRIME4: u64 = 9_650_029_242_287_828_579;
const XX_PRIME5: u64 = 2_870_177_450_012_600_261;

/// Hash family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashKind {
    #[default]
    Wy,
    Xx,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Wy => "wyhash",
            HashKind::Xx => "xxhash",
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = SketchError;

    /// Accepts "wyhash", "xxhash", and the common shorthand "xxh".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wyhash" => Ok(HashKind::Wy),
            "xxhash" | "xxh" => Ok(HashKind::Xx),
            other => Err(SketchError::Parse(format!("unknown hash kind: {other}"))),
        }
    }
}

/// Immutable hashing parameters.
///
/// The effective per-call seed is `seed ^ thread_salt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashConfig {
    pub kind: HashKind,
    pub seed: u64,
    pub thread_salt: u64,
}

impl HashConfig {
    pub fn new(kind: HashKind, seed: u64) -> Self {
        Self {
            kind,
            seed,
            thread_salt: 0,
        }
    }

    /// Same config with a different base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Same config with a different per-thread salt.
    pub fn with_thread_salt(mut self, thread_salt: u64) -> Self {
        self.thread_salt = thread_salt;
        self
    }
}

/// Hash a byte string under the given configuration.
pub fn hash64(input: &[u8], cfg: &HashConfig) -> u64 {
    let seed = cfg.seed ^ cfg.thread_salt;
    match cfg.kind {
        HashKind::Wy => wyhash64(input, seed),
        HashKind::Xx => xxhash64(input, seed),
    }
}

/// Derive a reproducible per-thread salt from a base seed.
///
/// Distinct thread indices produce distinct salts; the SplitMix64 step keeps
/// consecutive indices decorrelated.
pub fn derive_thread_salt(base: u64, thread_index: u64) -> u64 {
    splitmix64(base ^ thread_index.wrapping_mul(GOLDEN_GAMMA))
}

fn splitmix64(value: u64) -> u64 {
    let mut v = value.wrapping_add(GOLDEN_GAMMA);
    v = (v ^ (v >> 30)).wrapping_mul(SPLITMIX_MUL1);
    v = (v ^ (v >> 27)).wrapping_mul(SPLITMIX_MUL2);
    v ^ (v >> 31)
}

/// Load up to 8 little-endian bytes starting at `off`; short reads zero-pad.
#[inline]
fn load_u64_le(data: &[u8], off: usize) -> u64 {
    let mut v = 0u64;
    if off < data.len() {
        for (i, &b) in data[off..].iter().take(8).enumerate() {
            v |= (b as u64) << (8 * i);
        }
    }
    v
}

/// Load up to 4 little-endian bytes starting at `off`; short reads zero-pad.
/// An out-of-range `off` yields 0, which the Wy tail relies on for inputs
/// shorter than 4 bytes.
#[inline]
fn load_u32_le(data: &[u8], off: usize) -> u32 {
    let mut v = 0u32;
    if off < data.len() {
        for (i, &b) in data[off..].iter().take(4).enumerate() {
            v |= (b as u32) << (8 * i);
        }
    }
    v
}

/// Folding 64x64 -> 64 multiply: xor of the low and high product halves.
#[inline]
fn wymum(a: u64, b: u64) -> u64 {
    let r = (a as u128) * (b as u128);
    (r as u64) ^ ((r >> 64) as u64)
}

fn wyhash64(data: &[u8], seed: u64) -> u64 {
    let n = data.len();
    let secret = WY_P0 ^ WY_P1;
    let mut h = seed ^ secret.wrapping_add(n as u64);
    let mut i = 0usize;
    while i + 16 <= n {
        let a = load_u64_le(data, i) ^ WY_P1;
        let b = load_u64_le(data, i + 8) ^ WY_P2;
        h = wymum(h ^ a, WY_P0) ^ wymum(b, WY_P3);
        i += 16;
    }
    if i + 8 <= n {
        let a = load_u64_le(data, i) ^ WY_P1;
        h = wymum(h ^ a, WY_P4);
        i += 8;
    }
    if i < n {
        // Overlapping 4-byte tail; for 1..=3 remaining bytes the second read
        // starts before the slice and degrades to zero.
        let a = (load_u32_le(data, i) as u64) ^ WY_P2;
        let b = (load_u32_le(data, n.wrapping_sub(4)) as u64) ^ WY_P3;
        h = wymum(h ^ a, WY_P0) ^ b;
    }
    wymum(h ^ WY_P1, WY_P4)
}

fn xxhash64(data: &[u8], seed: u64) -> u64 {
    let n = data.len();
    let mut i = 0usize;
    let mut h: u64;
    if n >= 32 {
        let mut v1 = seed.wrapping_add(XX_PRIME1).wrapping_add(XX_PRIME2);
        let mut v2 = seed.wrapping_add(XX_PRIME2);
        let mut v3 = seed;
        let mut v4 = seed.wrapping_sub(XX_PRIME1);
        let limit = n - 32;
        while i <= limit {
            v1 = xx_round(v1, load_u64_le(data, i));
            v2 = xx_round(v2, load_u64_le(data, i + 8));
            v3 = xx_round(v3, load_u64_le(data, i + 16));
            v4 = xx_round(v4, load_u64_le(data, i + 24));
            i += 32;
        }
        h = v1
            .rotate_left(1)
            .wrapping_add(v2.rotate_left(7))
            .wrapping_add(v3.rotate_left(12))
            .wrapping_add(v4.rotate_left(18));
        h = xx_merge_lane(h, v1);
        h = xx_merge_lane(h, v2);
        h = xx_merge_lane(h, v3);
        h = xx_merge_lane(h, v4);
    } else {
        h = seed.wrapping_add(XX_PRIME5);
    }
    h = h.wrapping_add(n as u64);
    while i + 8 <= n {
        let k = load_u64_le(data, i).wrapping_mul(XX_PRIME2);
        i += 8;
        h ^= k.rotate_left(31).wrapping_mul(XX_PRIME1);
        h = h.rotate_left(27).wrapping_mul(XX_PRIME1).wrapping_add(XX_PRIME4);
    }
    if i + 4 <= n {
        h ^= (load_u32_le(data, i) as u64).wrapping_mul(XX_PRIME1);
        i += 4;
        h = h.rotate_left(23).wrapping_mul(XX_PRIME2).wrapping_add(XX_PRIME3);
    }
    while i < n {
        h ^= (data[i] as u64).wrapping_mul(XX_PRIME5);
        i += 1;
        h = h.rotate_left(11).wrapping_mul(XX_PRIME1);
    }
    h ^= h >> 33;
    h = h.wrapping_mul(XX_PRIME2);
    h ^= h >> 29;
    h = h.wrapping_mul(XX_PRIME3);
    h ^= h >> 32;
    h
}

#[inline]
fn xx_round(acc: u64, lane: u64) -> u64 {
    acc.wrapping_add(lane.wrapping_mul(XX_PRIME2))
        .rotate_left(31)
        .wrapping_mul(XX_PRIME1)
}

#[inline]
fn xx_merge_lane(h: u64, lane: u64) -> u64 {
    let folded = lane
        .wrapping_mul(XX_PRIME2)
        .rotate_left(31)
        .wrapping_mul(XX_PRIME1);
    (h ^ folded).wrapping_mul(XX_PRIME1).wrapping_add(XX_PRIME4)
}
