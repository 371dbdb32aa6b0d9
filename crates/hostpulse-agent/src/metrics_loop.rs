// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hostpulse_collector::{MetricsPayload, SamplerSet};
use hostpulse_delivery::{DeliveryQueue, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shortest loop period; a zero period would make `interval` panic.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Samples and pushes metrics every `period`.
///
/// The queue is owned by this loop, so every delivery cycle runs to
/// completion before the next tick is considered; slow cycles coalesce
/// missed ticks instead of overlapping.
pub struct MetricsLoop {
    pub agent_id: String,
    pub url: String,
    pub period: Duration,
    pub samplers: SamplerSet,
    pub queue: DeliveryQueue<MetricsPayload>,
    pub transport: Arc<dyn Transport>,
}

impl MetricsLoop {
    /// Runs until `cancel` fires. Returns the queue so callers can inspect
    /// what was still pending at shutdown.
    pub async fn run(mut self, cancel: CancellationToken) -> DeliveryQueue<MetricsPayload> {
        let mut ticker = interval(self.period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the first cycle waits a full
        // period like every other one.
        ticker.tick().await;

        info!(
            "Metrics loop started: {} every {}s",
            self.url,
            self.period.as_secs()
        );
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => self.cycle().await,
            }
        }

        if !self.queue.is_empty() {
            info!(
                "Metrics loop stopped with {} payloads pending",
                self.queue.len()
            );
        }
        self.queue
    }

    async fn cycle(&mut self) {
        let payload = self.samplers.sample_all(&self.agent_id).await;
        let timestamp = payload.timestamp;
        let report = self
            .queue
            .process(self.transport.as_ref(), &self.url, timestamp, payload)
            .await;
        debug!(
            "Cycle {timestamp}: delivered={} recovered={}/{} queued={}",
            report.delivered, report.recovered, report.retried, report.queued
        );
    }
}
