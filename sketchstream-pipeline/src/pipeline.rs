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

//! Sharded Ingest Pipeline
//!
//! One reader, N workers, and an optional reducer, coordinated without a
//! mutex on the hot path:
//!
//! ```text
//! Reader ──► [SPSC ring 0] ──► Worker 0 (sketch 0) ──┐
//!        ──► [SPSC ring 1] ──► Worker 1 (sketch 1) ──┼──► Reducer ──► sink
//!        ──► [SPSC ring N] ──► Worker N (sketch N) ──┘   (bucket mode)
//! ```
//!
//! The reader hashes (or round-robins) each line to a shard; workers update
//! thread-local sketches; aggregation happens only through `merge_from`.
//!
//! ## Epoch rotation
//!
//! In bucket mode the reducer rotates on a fixed period:
//! 1. set `merging`; each worker releases its sketch slot, bumps `paused`
//!    once, and sleeps
//! 2. once all workers are quiescent, merge every local sketch into the
//!    accumulator, emit a snapshot stamped with the bucket's start, and
//!    reset locals and accumulator to fresh instances
//! 3. clear `paused` and `merging`; workers resume into the next bucket
//!
//! Every line a worker popped before step 1 lands in the emitted snapshot;
//! lines popped after step 3 belong to the next bucket. Each worker's sketch
//! lives in a `parking_lot::Mutex` slot: the worker holds the guard across
//! its hot loop (so steady-state processing takes no lock) and releases it
//! while paused, which is exactly the window the reducer needs. The mutex
//! makes the handoff safe even if shutdown races the handshake.
//!
//! ## Shutdown
//!
//! Cancellation is cooperative. The reader sets `done` on end-of-input, on
//! the `stop_after` limit, or when the process-wide stop flag is raised;
//! workers drain their ring and exit; the reducer treats "done and workers
//! joined" as the final rotation trigger and always emits the last (possibly
//! partial) bucket. No in-flight line is dropped.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use sketchstream_core::error::Result;
use sketchstream_core::hash::{derive_thread_salt, hash64, HashConfig};
use sketchstream_core::sketches::{BloomFilter, Sketch};
use sketchstream_core::timeutil::Timebase;

use crate::config::{InputSource, PipelineConfig, ShardMode};
use crate::spsc::SpscRing;

/// Slots per worker ring.
const RING_CAPACITY: usize = 1 << 14;

/// Yields before a backoff loop falls back to sleeping.
const SPIN_YIELDS: u32 = 16;

/// Sleep quantum for full-ring and idle backoff.
const BACKOFF_SLEEP: Duration = Duration::from_micros(50);

/// Sleep quantum for a worker parked during rotation.
const PAUSE_SLEEP: Duration = Duration::from_micros(50);

/// Reducer's poll interval while waiting for workers to quiesce.
const PAUSE_POLL: Duration = Duration::from_micros(100);

/// Reducer wakeup period between rotation checks.
const REDUCER_QUANTUM: Duration = Duration::from_millis(50);

/// Process-wide stop request, safe to raise from a signal handler.
///
/// Advisory: the per-pipeline `done` flag remains the authoritative
/// reader/worker synchronization; this only asks the reader to wind down.
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn request_stop() {
    STOP_REQUESTED.store(true, Ordering::Release);
}

pub fn stop_requested() -> bool {
    STOP_REQUESTED.load(Ordering::Acquire)
}

/// Re-arm after a completed run. Intended for hosts that execute several
/// pipelines in one process, and for tests.
pub fn reset_stop() {
    STOP_REQUESTED.store(false, Ordering::Release);
}

/// One emitted aggregation: the merged sketch for a bucket (or the whole
/// run) and the wall-clock start of the window it covers.
pub struct Snapshot<'a, S> {
    pub bucket_start: SystemTime,
    pub sketch: &'a S,
}

/// Totals for a completed sketch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub lines_read: u64,
}

/// Totals for a completed dedup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupReport {
    /// Lines inspected by workers.
    pub seen: u64,
    /// Lines emitted as first occurrences.
    pub emitted: u64,
}

/// Run the sharded sketch pipeline to completion.
///
/// `factory` builds one sketch per worker plus the accumulator, all from the
/// pipeline hash config so every merge is between identically parameterized
/// instances. `sink` receives one [`Snapshot`] per bucket in bucket mode, or
/// exactly one with the fully merged sketch otherwise.
///
/// Input open failures return `Io` before any thread is started; worker
/// threads are joined on every exit path.
pub fn run_sketch_pipeline<S, F, Sink>(
    cfg: &PipelineConfig,
    shard_mode: ShardMode,
    factory: F,
    mut sink: Sink,
) -> Result<PipelineReport>
where
    S: Sketch + Send,
    F: Fn(HashConfig) -> Result<S> + Sync,
    Sink: FnMut(Snapshot<'_, S>) + Send,
{
    let timebase = Timebase::now();
    let worker_count = cfg.worker_count();
    if worker_count <= 1 {
        return run_sketch_single(cfg, &factory, &mut sink, &timebase);
    }

    let mut reader = open_input(&cfg.input)?;
    let mut acc = factory(cfg.hash)?;
    let locals: Vec<Mutex<S>> = (0..worker_count)
        .map(|_| factory(cfg.hash).map(Mutex::new))
        .collect::<Result<_>>()?;
    let rings: Vec<SpscRing<String>> = (0..worker_count)
        .map(|_| SpscRing::with_capacity(RING_CAPACITY))
        .collect();

    let done = AtomicBool::new(false);
    let merging = AtomicBool::new(false);
    let paused = AtomicUsize::new(0);
    let workers_ended = AtomicBool::new(false);
    let processed_total = AtomicU64::new(0);

    let bucket = cfg.bucket_period();
    let mut lines_read = 0u64;

    thread::scope(|scope| {
        let done_ref = &done;
        let merging_ref = &merging;
        let paused_ref = &paused;
        let worker_handles: Vec<_> = rings
            .iter()
            .zip(&locals)
            .map(|(ring, slot)| {
                scope.spawn(move || worker_loop(ring, slot, done_ref, merging_ref, paused_ref))
            })
            .collect();

        let reducer_handle = bucket.map(|bucket_ns| {
            let locals_ref = &locals;
            let factory_ref = &factory;
            let acc_ref = &mut acc;
            let sink_ref = &mut sink;
            let timebase_ref = &timebase;
            let workers_ended_ref = &workers_ended;
            scope.spawn(move || {
                reducer_loop(ReducerArgs {
                    bucket_ns,
                    locals: locals_ref,
                    factory: factory_ref,
                    acc: acc_ref,
                    sink: sink_ref,
                    timebase: timebase_ref,
                    done: done_ref,
                    workers_ended: workers_ended_ref,
                    merging: merging_ref,
                    paused: paused_ref,
                    worker_count,
                })
            })
        });

        if cfg.stats {
            scope.spawn(|| stats_loop(cfg.stats_interval, &processed_total, &done));
        }

        lines_read = reader_loop(
            reader.as_mut(),
            &rings,
            shard_mode,
            &cfg.hash,
            cfg.stop_after,
            &done,
            &processed_total,
        );

        for handle in worker_handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        workers_ended.store(true, Ordering::Release);

        if let Some(handle) = reducer_handle {
            if handle.join().is_err() {
                error!("reducer thread panicked");
            }
        }
    });

    if bucket.is_none() {
        for slot in &locals {
            let local = slot.lock();
            acc.merge_from(&local)?;
        }
        sink(Snapshot {
            bucket_start: timebase.wall_origin(),
            sketch: &acc,
        });
    }

    Ok(PipelineReport { lines_read })
}

/// Run the Bloom dedup pipeline: first occurrence of every line is written
/// to `out`, later occurrences (and false positives) are suppressed.
///
/// Sharding is always hash-based so one worker's filter sees every
/// occurrence of a given line; worker filters get decorrelated thread salts
/// since they are never merged.
pub fn run_dedup_pipeline<F, W>(cfg: &PipelineConfig, factory: F, out: W) -> Result<DedupReport>
where
    F: Fn(HashConfig) -> Result<BloomFilter> + Sync,
    W: Write + Send,
{
    let worker_count = cfg.worker_count();
    if worker_count <= 1 {
        return run_dedup_single(cfg, &factory, out);
    }

    let mut reader = open_input(&cfg.input)?;
    let filters: Vec<BloomFilter> = (0..worker_count)
        .map(|i| {
            let salted = cfg
                .hash
                .with_thread_salt(derive_thread_salt(cfg.hash.seed, i as u64 + 1));
            factory(salted)
        })
        .collect::<Result<_>>()?;
    let rings: Vec<SpscRing<String>> = (0..worker_count)
        .map(|_| SpscRing::with_capacity(RING_CAPACITY))
        .collect();

    let out = Mutex::new(out);
    let done = AtomicBool::new(false);
    let seen = AtomicU64::new(0);
    let emitted = AtomicU64::new(0);
    let processed_total = AtomicU64::new(0);

    thread::scope(|scope| {
        let out_ref = &out;
        let done_ref = &done;
        let seen_ref = &seen;
        let emitted_ref = &emitted;
        for (ring, filter) in rings.iter().zip(filters) {
            scope.spawn(move || {
                dedup_worker_loop(ring, filter, out_ref, done_ref, seen_ref, emitted_ref)
            });
        }

        if cfg.stats {
            scope.spawn(|| stats_loop(cfg.stats_interval, &processed_total, &done));
        }

        reader_loop(
            reader.as_mut(),
            &rings,
            ShardMode::HashLine,
            &cfg.hash,
            cfg.stop_after,
            &done,
            &processed_total,
        );
    });

    let mut writer = out.into_inner();
    if let Err(e) = writer.flush() {
        warn!(error = %e, "failed to flush dedup output");
    }

    Ok(DedupReport {
        seen: seen.load(Ordering::Relaxed),
        emitted: emitted.load(Ordering::Relaxed),
    })
}

// ============================================================================
// Thread bodies
// ============================================================================

fn reader_loop(
    reader: &mut dyn BufRead,
    rings: &[SpscRing<String>],
    shard_mode: ShardMode,
    hash: &HashConfig,
    stop_after: u64,
    done: &AtomicBool,
    processed_total: &AtomicU64,
) -> u64 {
    let mut line = String::with_capacity(256);
    let mut processed = 0u64;
    let mut next_shard = 0usize;
    loop {
        if stop_requested() {
            debug!("stop requested; reader winding down");
            break;
        }
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "input read failed; treating as end of stream");
                break;
            }
        }
        trim_line_ending(&mut line);
        let shard = match shard_mode {
            ShardMode::HashLine => (hash64(line.as_bytes(), hash) % rings.len() as u64) as usize,
            ShardMode::RoundRobin => {
                let s = next_shard;
                next_shard = (next_shard + 1) % rings.len();
                s
            }
        };
        dispatch_line(&rings[shard], std::mem::take(&mut line));
        processed += 1;
        processed_total.fetch_add(1, Ordering::Relaxed);
        if stop_after != 0 && processed >= stop_after {
            break;
        }
    }
    done.store(true, Ordering::Release);
    processed
}

/// Push with two-phase backoff: yield up to the spin threshold, then sleep.
fn dispatch_line(ring: &SpscRing<String>, line: String) {
    let mut pending = line;
    let mut spins = 0u32;
    loop {
        match ring.try_push(pending) {
            Ok(()) => return,
            Err(back) => {
                pending = back;
                if spins < SPIN_YIELDS {
                    thread::yield_now();
                    spins += 1;
                } else {
                    thread::sleep(BACKOFF_SLEEP);
                }
            }
        }
    }
}

fn worker_loop<S: Sketch>(
    ring: &SpscRing<String>,
    slot: &Mutex<S>,
    done: &AtomicBool,
    merging: &AtomicBool,
    paused: &AtomicUsize,
) {
    let mut guard = Some(slot.lock());
    let mut counted_pause = false;
    let mut idle_spins = 0u32;
    loop {
        if merging.load(Ordering::Acquire) {
            // Hand the sketch slot to the reducer and acknowledge once.
            drop(guard.take());
            if !counted_pause {
                paused.fetch_add(1, Ordering::AcqRel);
                counted_pause = true;
            }
            thread::sleep(PAUSE_SLEEP);
            continue;
        }
        counted_pause = false;
        let sketch = guard.get_or_insert_with(|| slot.lock());
        if let Some(item) = ring.try_pop() {
            sketch.add_item(item.as_bytes());
            idle_spins = 0;
        } else if done.load(Ordering::Acquire) {
            break;
        } else if idle_spins < SPIN_YIELDS {
            thread::yield_now();
            idle_spins += 1;
        } else {
            thread::sleep(BACKOFF_SLEEP);
        }
    }
}

fn dedup_worker_loop<W: Write>(
    ring: &SpscRing<String>,
    mut filter: BloomFilter,
    out: &Mutex<W>,
    done: &AtomicBool,
    seen: &AtomicU64,
    emitted: &AtomicU64,
) {
    let mut idle_spins = 0u32;
    loop {
        if let Some(line) = ring.try_pop() {
            idle_spins = 0;
            seen.fetch_add(1, Ordering::Relaxed);
            if !filter.might_contain(line.as_bytes()) {
                filter.add(line.as_bytes());
                let mut writer = out.lock();
                if let Err(e) = writeln!(writer, "{line}") {
                    warn!(error = %e, "failed to emit line; skipping");
                    continue;
                }
                emitted.fetch_add(1, Ordering::Relaxed);
            }
        } else if done.load(Ordering::Acquire) {
            break;
        } else if idle_spins < SPIN_YIELDS {
            thread::yield_now();
            idle_spins += 1;
        } else {
            thread::sleep(BACKOFF_SLEEP);
        }
    }
}

struct ReducerArgs<'a, S, F, Sink> {
    bucket_ns: Duration,
    locals: &'a [Mutex<S>],
    factory: &'a F,
    acc: &'a mut S,
    sink: &'a mut Sink,
    timebase: &'a Timebase,
    done: &'a AtomicBool,
    workers_ended: &'a AtomicBool,
    merging: &'a AtomicBool,
    paused: &'a AtomicUsize,
    worker_count: usize,
}

fn reducer_loop<S, F, Sink>(args: ReducerArgs<'_, S, F, Sink>)
where
    S: Sketch,
    F: Fn(HashConfig) -> Result<S>,
    Sink: FnMut(Snapshot<'_, S>),
{
    let ReducerArgs {
        bucket_ns,
        locals,
        factory,
        acc,
        sink,
        timebase,
        done,
        workers_ended,
        merging,
        paused,
        worker_count,
    } = args;

    let mut bucket_start = Instant::now();
    let mut bucket_end = bucket_start + bucket_ns;
    loop {
        thread::sleep(REDUCER_QUANTUM);
        let finishing =
            done.load(Ordering::Acquire) && workers_ended.load(Ordering::Acquire);
        if Instant::now() < bucket_end && !finishing {
            continue;
        }

        if !finishing {
            merging.store(true, Ordering::Release);
            // Workers that already exited cannot acknowledge; once `done` is
            // raised the mutex slots alone guarantee exclusive access.
            while paused.load(Ordering::Acquire) < worker_count
                && !done.load(Ordering::Acquire)
            {
                thread::sleep(PAUSE_POLL);
            }
        }

        for slot in locals {
            let mut local = slot.lock();
            if let Err(e) = acc.merge_from(&local) {
                warn!(error = %e, "worker sketch skipped during rotation");
            }
            match factory(local.hash_config()) {
                Ok(fresh) => *local = fresh,
                Err(e) => error!(error = %e, "failed to reset worker sketch"),
            }
        }

        sink(Snapshot {
            bucket_start: timebase.to_wall(bucket_start),
            sketch: &*acc,
        });
        match factory(acc.hash_config()) {
            Ok(fresh) => *acc = fresh,
            Err(e) => error!(error = %e, "failed to reset accumulator"),
        }

        if !finishing {
            paused.store(0, Ordering::Release);
            merging.store(false, Ordering::Release);
        }

        if finishing {
            break;
        }
        bucket_start = bucket_end;
        bucket_end = bucket_start + bucket_ns;
    }
}

/// Advisory progress reporter; reads the relaxed line counter only.
fn stats_loop(interval: Duration, processed_total: &AtomicU64, done: &AtomicBool) {
    const CHUNK: Duration = Duration::from_millis(100);
    loop {
        let mut waited = Duration::ZERO;
        while waited < interval {
            if done.load(Ordering::Acquire) {
                info!(
                    processed = processed_total.load(Ordering::Relaxed),
                    "ingest finished"
                );
                return;
            }
            let step = CHUNK.min(interval - waited);
            thread::sleep(step);
            waited += step;
        }
        info!(
            processed = processed_total.load(Ordering::Relaxed),
            "ingest progress"
        );
    }
}

// ============================================================================
// Single-thread fallbacks
// ============================================================================

fn run_sketch_single<S, F, Sink>(
    cfg: &PipelineConfig,
    factory: &F,
    sink: &mut Sink,
    timebase: &Timebase,
) -> Result<PipelineReport>
where
    S: Sketch,
    F: Fn(HashConfig) -> Result<S>,
    Sink: FnMut(Snapshot<'_, S>),
{
    let mut reader = open_input(&cfg.input)?;
    let mut sketch = factory(cfg.hash)?;
    let mut line = String::with_capacity(256);
    let mut processed = 0u64;

    match cfg.bucket_period() {
        None => {
            while read_trimmed(reader.as_mut(), &mut line) {
                sketch.add_item(line.as_bytes());
                processed += 1;
                if (cfg.stop_after != 0 && processed >= cfg.stop_after) || stop_requested() {
                    break;
                }
            }
            sink(Snapshot {
                bucket_start: timebase.wall_origin(),
                sketch: &sketch,
            });
        }
        Some(bucket_ns) => {
            let mut bucket_start = Instant::now();
            let mut bucket_end = bucket_start + bucket_ns;
            while read_trimmed(reader.as_mut(), &mut line) {
                let now = Instant::now();
                if now >= bucket_end {
                    sink(Snapshot {
                        bucket_start: timebase.to_wall(bucket_start),
                        sketch: &sketch,
                    });
                    sketch = factory(cfg.hash)?;
                    bucket_start = bucket_end;
                    bucket_end = bucket_start + bucket_ns;
                }
                sketch.add_item(line.as_bytes());
                processed += 1;
                if (cfg.stop_after != 0 && processed >= cfg.stop_after) || stop_requested() {
                    break;
                }
            }
            sink(Snapshot {
                bucket_start: timebase.to_wall(bucket_start),
                sketch: &sketch,
            });
        }
    }

    Ok(PipelineReport {
        lines_read: processed,
    })
}

fn run_dedup_single<F, W>(cfg: &PipelineConfig, factory: &F, out: W) -> Result<DedupReport>
where
    F: Fn(HashConfig) -> Result<BloomFilter>,
    W: Write,
{
    let mut reader = open_input(&cfg.input)?;
    let mut filter = factory(cfg.hash)?;
    let mut writer = out;
    let mut line = String::with_capacity(256);
    let mut seen = 0u64;
    let mut emitted = 0u64;

    while read_trimmed(reader.as_mut(), &mut line) {
        seen += 1;
        if !filter.might_contain(line.as_bytes()) {
            filter.add(line.as_bytes());
            if let Err(e) = writeln!(writer, "{line}") {
                warn!(error = %e, "failed to emit line; skipping");
            } else {
                emitted += 1;
            }
        }
        if (cfg.stop_after != 0 && seen >= cfg.stop_after) || stop_requested() {
            break;
        }
    }
    if let Err(e) = writer.flush() {
        warn!(error = %e, "failed to flush dedup output");
    }

    Ok(DedupReport { seen, emitted })
}

// ============================================================================
// Input helpers
// ============================================================================

fn open_input(input: &InputSource) -> Result<Box<dyn BufRead + Send>> {
    match input {
        InputSource::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
        InputSource::File(path) => {
            let file = File::open(path).map_err(|e| {
                sketchstream_core::SketchError::from(e)
                    .context(&format!("open {}", path.display()))
            })?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

/// Read one line into `buf` without its terminator. False at end of input;
/// read errors log and end the stream.
fn read_trimmed(reader: &mut dyn BufRead, buf: &mut String) -> bool {
    buf.clear();
    match reader.read_line(buf) {
        Ok(0) => false,
        Ok(_) => {
            trim_line_ending(buf);
            true
        }
        Err(e) => {
            warn!(error = %e, "input read failed; treating as end of stream");
            false
        }
    }
}

fn trim_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}
