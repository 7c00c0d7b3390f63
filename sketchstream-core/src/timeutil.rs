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

//! Time Utilities
//!
//! Duration parsing for bucket/rotation options, a wall/monotonic timebase
//! for snapshot timestamps, and ISO-8601 UTC formatting.
//!
//! Snapshot timestamps are derived as `wall_origin + (now_mono - mono_origin)`
//! so emitted times stay monotone even when the wall clock jumps mid-run.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Parse `<unsigned integer><unit>` with unit in `ms`, `s`, `m`, `h`.
///
/// Returns `None` for an empty string, a missing number, a missing or
/// unknown unit, or numeric overflow.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let bytes = s.as_bytes();
    let mut value: u64 = 0;
    let mut i = 0usize;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        let digit = (bytes[i] - b'0') as u64;
        value = value.checked_mul(10)?.checked_add(digit)?;
        i += 1;
    }
    if i == 0 || i >= bytes.len() {
        return None;
    }
    match &s[i..] {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

/// Paired wall/monotonic origin captured at pipeline start.
#[derive(Debug, Clone, Copy)]
pub struct Timebase {
    wall_origin: SystemTime,
    mono_origin: Instant,
}

impl Timebase {
    pub fn now() -> Self {
        Self {
            wall_origin: SystemTime::now(),
            mono_origin: Instant::now(),
        }
    }

    /// Map a monotonic point onto the wall clock.
    pub fn to_wall(&self, t: Instant) -> SystemTime {
        self.wall_origin + t.saturating_duration_since(self.mono_origin)
    }

    pub fn wall_origin(&self) -> SystemTime {
        self.wall_origin
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::now()
    }
}

/// Format a wall-clock point as `YYYY-MM-DDTHH:MM:SSZ` in UTC.
///
/// Points before the epoch clamp to `1970-01-01T00:00:00Z`.
pub fn format_utc_iso8601(tp: SystemTime) -> String {
    let secs = tp
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let days = secs.div_euclid(86_400);
    let tod = secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        tod / 3600,
        (tod / 60) % 60,
        tod % 60
    )
}

/// Gregorian date from days since 1970-01-01 (Howard Hinnant's civil_from_days).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
