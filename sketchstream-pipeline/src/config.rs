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

//! Pipeline Configuration

use std::path::PathBuf;
use std::time::Duration;

use sketchstream_core::hash::HashConfig;

/// Where the reader takes lines from.
#[derive(Debug, Clone, Default)]
pub enum InputSource {
    #[default]
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// Empty paths and "-" mean standard input.
    pub fn from_path_arg(path: &str) -> Self {
        if path.is_empty() || path == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(path))
        }
    }
}

/// How the reader assigns lines to workers.
///
/// Merged sketches accept either mode (the final merge is order-independent);
/// dedup requires `HashLine` so all occurrences of one line meet the same
/// worker-local filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardMode {
    HashLine,
    RoundRobin,
}

/// One ingest run's configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker count; 0 means hardware concurrency.
    pub threads: usize,
    pub input: InputSource,
    /// Cap on lines read; 0 means unlimited.
    pub stop_after: u64,
    pub hash: HashConfig,
    /// Rotation period; `None` disables bucket mode. Floored to 1 s.
    pub bucket: Option<Duration>,
    /// Enable the advisory progress reporter.
    pub stats: bool,
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            input: InputSource::Stdin,
            stop_after: 0,
            hash: HashConfig::default(),
            bucket: None,
            stats: false,
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    /// Resolve the effective worker count.
    pub fn worker_count(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            num_cpus::get().max(1)
        }
    }

    /// Bucket period with the 1-second floor applied.
    pub fn bucket_period(&self) -> Option<Duration> {
        self.bucket.map(|d| d.max(Duration::from_secs(1)))
    }
}
