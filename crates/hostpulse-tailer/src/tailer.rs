// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batcher::{LineBatcher, LineSink, MIN_FLUSH_INTERVAL};
use crate::error::TailerError;
use crate::watcher::{follow, FileWatcher, StartPosition};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_BUFFER_COUNT: usize = 10;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct TailerConfig {
    pub files: Vec<PathBuf>,
    pub buffer_count: usize,
    pub flush_interval: Duration,
    /// How often a watcher at end of file looks for new data.
    pub poll_interval: Duration,
    /// Read files that exist at start from their beginning instead of
    /// their end.
    pub read_from_start: bool,
}

impl Default for TailerConfig {
    fn default() -> Self {
        TailerConfig {
            files: Vec::new(),
            buffer_count: DEFAULT_BUFFER_COUNT,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_from_start: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    Created,
    Running,
    Stopped,
}

/// Follows a set of log files and hands batches of lines to a [`LineSink`].
///
/// Configured paths that do not exist when the tailer is built are skipped
/// with a warning. A tailer runs once: `start` is only valid from
/// `Created`, `stop` may be called any number of times.
pub struct Tailer {
    config: TailerConfig,
    files: Vec<PathBuf>,
    sink: Arc<dyn LineSink>,
    state: TailerState,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl Tailer {
    pub fn new<S>(mut config: TailerConfig, sink: S) -> Self
    where
        S: LineSink + 'static,
    {
        config.poll_interval = config.poll_interval.max(MIN_FLUSH_INTERVAL);
        let files = config
            .files
            .iter()
            .filter(|path| {
                let exists = path.exists();
                if !exists {
                    warn!("Log file does not exist, skipping: {}", path.display());
                }
                exists
            })
            .cloned()
            .collect();

        Tailer {
            config,
            files,
            sink: Arc::new(sink),
            state: TailerState::Created,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Paths that will be followed.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn state(&self) -> TailerState {
        self.state
    }

    /// Opens every file and spawns its watcher plus the batcher.
    ///
    /// Files are positioned before this returns, so anything appended after
    /// `start` completes is picked up. A file that fails to open is logged
    /// and left out; the others keep running.
    pub async fn start(&mut self) -> Result<(), TailerError> {
        if self.state != TailerState::Created {
            return Err(TailerError::InvalidState(self.state));
        }
        if self.files.is_empty() {
            return Err(TailerError::NoFiles);
        }

        let position = if self.config.read_from_start {
            StartPosition::Beginning
        } else {
            StartPosition::End
        };

        let (batcher, handle) = LineBatcher::new(
            self.config.buffer_count,
            self.config.flush_interval,
            CHANNEL_CAPACITY,
            Arc::clone(&self.sink),
        );

        let mut watching = 0;
        for path in &self.files {
            match FileWatcher::open(path.clone(), position).await {
                Ok(watcher) => {
                    self.tasks.spawn(follow(
                        watcher,
                        handle.clone(),
                        self.config.poll_interval,
                        self.cancel.child_token(),
                    ));
                    watching += 1;
                }
                Err(e) => error!("Cannot tail log file: {e}"),
            }
        }
        drop(handle);

        self.tasks.spawn(batcher.run(self.cancel.child_token()));
        self.state = TailerState::Running;
        info!(
            "Log tailer started: {watching} file(s), buffer_count={}, flush_interval={:?}",
            self.config.buffer_count, self.config.flush_interval
        );
        Ok(())
    }

    /// Cancels every task and waits for them to finish. Buffered lines that
    /// have not been flushed yet are discarded.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("Log tailer task failed: {e}");
            }
        }
        if self.state == TailerState::Running {
            info!("Log tailer stopped");
        }
        self.state = TailerState::Stopped;
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
