// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hostpulse_delivery::{send, Transport};
use hostpulse_tailer::LineSink;
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogPayload {
    pub agent_id: String,
    pub lines: Vec<String>,
}

/// Ships tailed batches to the log endpoint.
///
/// Each batch is posted on its own task so the batcher never waits on the
/// network. Posts are tracked; [`LogShipper::tracker`] lets shutdown wait
/// for the ones still in flight. Log batches are not retried.
#[derive(Clone)]
pub struct LogShipper {
    agent_id: String,
    url: String,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    tracker: TaskTracker,
}

impl LogShipper {
    /// Must be called from within a tokio runtime; posts are spawned on it.
    pub fn new(agent_id: String, url: String, transport: Arc<dyn Transport>) -> Self {
        LogShipper {
            agent_id,
            url,
            transport,
            runtime: Handle::current(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }
}

impl LineSink for LogShipper {
    fn deliver(&self, lines: Vec<String>) {
        if self.url.trim().is_empty() {
            warn!("Log endpoint is empty, dropping {} lines", lines.len());
            return;
        }

        let payload = LogPayload {
            agent_id: self.agent_id.clone(),
            lines,
        };
        let url = self.url.clone();
        let transport = Arc::clone(&self.transport);
        self.tracker.spawn_on(
            async move {
                debug!("Sending {} lines to {url}", payload.lines.len());
                if let Err(e) = send(transport.as_ref(), &url, &payload).await {
                    error!("Failed to send log lines: {e}");
                }
            },
            &self.runtime,
        );
    }
}
