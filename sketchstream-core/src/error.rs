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

//! Error types for SketchStream
//!
//! A closed set of error kinds shared by every crate in the workspace.
//! Errors are plain values; recoverable conditions never panic or abort.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SketchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("canceled: {0}")]
    Canceled(String),

    #[error("overflow: {0}")]
    Overflow(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("not supported: {0}")]
    NotSupported(String),
}

impl SketchError {
    /// Append a phase marker to the error's context string.
    ///
    /// Contexts accumulate left to right: an error raised in "phase1" and
    /// annotated in "phase2" reads `phase1: phase2`.
    pub fn context(self, ctx: &str) -> Self {
        fn join(existing: String, ctx: &str) -> String {
            if existing.is_empty() {
                ctx.to_string()
            } else {
                format!("{existing}: {ctx}")
            }
        }
        match self {
            SketchError::InvalidArgument(s) => SketchError::InvalidArgument(join(s, ctx)),
            SketchError::Parse(s) => SketchError::Parse(join(s, ctx)),
            SketchError::Io(e) => SketchError::Io(io::Error::new(e.kind(), join(e.to_string(), ctx))),
            SketchError::OutOfMemory(s) => SketchError::OutOfMemory(join(s, ctx)),
            SketchError::Timeout(s) => SketchError::Timeout(join(s, ctx)),
            SketchError::Canceled(s) => SketchError::Canceled(join(s, ctx)),
            SketchError::Overflow(s) => SketchError::Overflow(join(s, ctx)),
            SketchError::Internal(s) => SketchError::Internal(join(s, ctx)),
            SketchError::NotSupported(s) => SketchError::NotSupported(join(s, ctx)),
        }
    }

    /// True for errors raised by parameter validation in sketch factories.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, SketchError::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, SketchError>;
