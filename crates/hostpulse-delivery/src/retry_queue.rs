// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::backup::write_backup;
use crate::error::BackupError;
use crate::transport::{send, Transport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SPILL_THRESHOLD: usize = 100;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 300;

/// A payload whose delivery failed, stamped with the payload's own capture
/// time. The stamp never changes across retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedItem<T> {
    pub timestamp: i64,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Pending-list size at which the queue is spilled to disk.
    pub spill_threshold: usize,
    /// Hard cap on the in-memory queue when spilling is off or fails.
    pub max_queue_size: usize,
    /// Spill directory; `None` disables file backup.
    pub backup_dir: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            backup_dir: Some(PathBuf::from("./log")),
        }
    }
}

/// What a single [`DeliveryQueue::process`] call did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Queued items that were attempted again.
    pub retried: usize,
    /// Queued items that went through on this cycle.
    pub recovered: usize,
    /// Whether the current payload went through.
    pub delivered: bool,
    /// Backup file written on this cycle, if any.
    pub spilled: Option<PathBuf>,
    /// Oldest items dropped to respect the retention bound.
    pub dropped: usize,
    /// Queue length once the cycle finished.
    pub queued: usize,
}

/// Payloads that failed to ship, retried oldest first on every cycle.
///
/// The queue is owned by the metrics loop and only mutated through
/// [`process`](Self::process), so it needs no lock.
#[derive(Debug)]
pub struct DeliveryQueue<T> {
    config: QueueConfig,
    items: Vec<QueuedItem<T>>,
}

impl<T> DeliveryQueue<T>
where
    T: Serialize + Send + Sync,
{
    pub fn new(config: QueueConfig) -> Self {
        DeliveryQueue {
            config,
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QueuedItem<T>] {
        &self.items
    }

    /// Runs one delivery cycle.
    ///
    /// Queued items are retried before the current payload is attempted, so
    /// retry order always follows original failure order.
    pub async fn process<Tr>(
        &mut self,
        transport: &Tr,
        url: &str,
        timestamp: i64,
        payload: T,
    ) -> CycleReport
    where
        Tr: Transport + ?Sized,
    {
        let mut report = CycleReport::default();
        let mut pending = Vec::with_capacity(self.items.len() + 1);

        for item in std::mem::take(&mut self.items) {
            report.retried += 1;
            match send(transport, url, &item.data).await {
                Ok(()) => {
                    info!("Retry success: {}", item.timestamp);
                    report.recovered += 1;
                }
                Err(e) => {
                    error!("Retry failed: {}: {e}", item.timestamp);
                    pending.push(item);
                }
            }
        }

        match send(transport, url, &payload).await {
            Ok(()) => {
                debug!("Send success: {timestamp}");
                report.delivered = true;
            }
            Err(e) => {
                error!("Send failed: {timestamp}: {e}");
                pending.push(QueuedItem {
                    timestamp,
                    data: payload,
                });
            }
        }

        if !pending.is_empty() && pending.len() >= self.config.spill_threshold {
            self.overflow(pending, &mut report).await;
        } else if self.config.backup_dir.is_none() {
            report.dropped = trim_oldest(&mut pending, self.config.max_queue_size);
            self.items = pending;
        } else {
            self.items = pending;
        }

        report.queued = self.items.len();
        report
    }

    /// Writes whatever is still pending to a backup file and empties the
    /// queue. Returns `Ok(None)` when nothing is pending or backup is off;
    /// on a write error the items stay queued.
    pub async fn flush_to_backup(&mut self) -> Result<Option<PathBuf>, BackupError> {
        let Some(dir) = &self.config.backup_dir else {
            return Ok(None);
        };
        if self.items.is_empty() {
            return Ok(None);
        }
        let path = write_backup(dir, &self.items).await?;
        info!("Saved {} pending payloads to: {}", self.items.len(), path.display());
        self.items.clear();
        Ok(Some(path))
    }

    async fn overflow(&mut self, mut pending: Vec<QueuedItem<T>>, report: &mut CycleReport) {
        if let Some(dir) = &self.config.backup_dir {
            match write_backup(dir, &pending).await {
                Ok(path) => {
                    error!(
                        "Retry queue overflow ({}), saved to: {}",
                        pending.len(),
                        path.display()
                    );
                    report.spilled = Some(path);
                    self.items = Vec::new();
                    return;
                }
                Err(e) => error!("Failed to save retry backup file: {e}"),
            }
        }

        report.dropped = trim_oldest(&mut pending, self.config.max_queue_size);
        self.items = pending;
    }
}

/// Drops the oldest entries so that at most `bound` remain.
fn trim_oldest<T>(items: &mut Vec<T>, bound: usize) -> usize {
    let excess = items.len().saturating_sub(bound);
    if excess > 0 {
        warn!(
            "Queue size exceeded ({}), trimming to {bound}",
            items.len()
        );
        items.drain(..excess);
    }
    excess
}
