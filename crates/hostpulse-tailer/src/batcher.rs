// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line batching actor.
//!
//! ```text
//!    ┌──────────────┐
//!    │   Watchers   │ (one per file, each holds a handle)
//!    └──────┬───────┘
//!           │ lines via bounded channel
//!           v
//!    ┌──────────────┐
//!    │ LineBatcher  │ (single owner of the batch)
//!    └──────┬───────┘
//!           │ count reached / timer tick
//!           v
//!    ┌──────────────┐
//!    │   LineSink   │
//!    └──────────────┘
//! ```
//!
//! Because only the batcher task touches the batch, a flush is a plain
//! `mem::take`: no line can be appended between snapshot and reset.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Receives each flushed batch, in flush order.
///
/// Called from the batcher task, so implementations should hand the lines
/// off quickly (spawn, send on a channel) rather than block.
pub trait LineSink: Send + Sync {
    fn deliver(&self, lines: Vec<String>);
}

impl<F> LineSink for F
where
    F: Fn(Vec<String>) + Send + Sync,
{
    fn deliver(&self, lines: Vec<String>) {
        self(lines)
    }
}

/// Producer side of the batcher. Cheap to clone, one per watcher.
#[derive(Clone, Debug)]
pub struct BatcherHandle {
    tx: mpsc::Sender<String>,
}

impl BatcherHandle {
    /// Queues a line, waiting while the channel is full.
    pub async fn push(&self, line: String) -> Result<(), mpsc::error::SendError<String>> {
        self.tx.send(line).await
    }
}

/// Shortest flush interval; tokio intervals cannot tick with a zero period.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

pub struct LineBatcher {
    rx: mpsc::Receiver<String>,
    batch: Vec<String>,
    buffer_count: usize,
    flush_interval: Duration,
    sink: Arc<dyn LineSink>,
}

impl LineBatcher {
    pub fn new(
        buffer_count: usize,
        flush_interval: Duration,
        channel_capacity: usize,
        sink: Arc<dyn LineSink>,
    ) -> (Self, BatcherHandle) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let batcher = LineBatcher {
            rx,
            batch: Vec::with_capacity(buffer_count.min(1024)),
            buffer_count: buffer_count.max(1),
            flush_interval: flush_interval.max(MIN_FLUSH_INTERVAL),
            sink,
        };
        (batcher, BatcherHandle { tx })
    }

    /// Runs until `cancel` fires. Lines still buffered at that point are
    /// dropped, not flushed.
    ///
    /// The first timer flush happens one full `flush_interval` after start.
    /// If every handle is dropped the batcher keeps flushing on the timer
    /// until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut producers_gone = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if !self.batch.is_empty() {
                        debug!("Dropping {} buffered log lines on stop", self.batch.len());
                    }
                    break;
                }
                line = self.rx.recv(), if !producers_gone => match line {
                    Some(line) => {
                        self.batch.push(line);
                        if self.batch.len() >= self.buffer_count {
                            self.flush();
                        }
                    }
                    None => producers_gone = true,
                },
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush();
                    }
                }
            }
        }
    }

    fn flush(&mut self) {
        let lines = std::mem::take(&mut self.batch);
        debug!("Flushing {} log lines", lines.len());
        self.sink.deliver(lines);
    }
}
