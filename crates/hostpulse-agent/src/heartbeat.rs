// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::metrics_loop::MIN_PERIOD;
use hostpulse_delivery::{send, Transport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub agent_id: String,
    pub timestamp: i64,
}

impl Heartbeat {
    pub fn now(agent_id: &str) -> Self {
        Heartbeat {
            agent_id: agent_id.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Beats once immediately, then every `period`. Heartbeats are best-effort
/// and never queued: a failed one is only logged.
pub async fn run(
    transport: Arc<dyn Transport>,
    url: String,
    agent_id: String,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let beat = Heartbeat::now(&agent_id);
                match send(transport.as_ref(), &url, &beat).await {
                    Ok(()) => debug!("Heartbeat sent: {}", beat.timestamp),
                    Err(e) => warn!("Heartbeat send failed: {e}"),
                }
            }
        }
    }
    debug!("Heartbeat loop stopped");
}
