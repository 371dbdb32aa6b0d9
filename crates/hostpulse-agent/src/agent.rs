// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires configuration into running tasks and tears them down again.
//!
//! Every component is optional and only started when configured:
//!
//! | component     | started when                                   |
//! |---------------|------------------------------------------------|
//! | heartbeat     | `api.heartbeat` is set                         |
//! | metrics loop  | `api.server` is set                            |
//! | log tailer    | `collectors.log.enabled` and a file exists     |
//! | pull endpoint | `http_server.enabled`                          |

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::heartbeat::{self, HEARTBEAT_INTERVAL};
use crate::log_shipper::LogShipper;
use crate::metrics_loop::MetricsLoop;
use crate::pull::{self, PullState};
use hostpulse_collector::MetricsPayload;
use hostpulse_delivery::{DeliveryQueue, HttpTransport, SharedKey, Transport};
use hostpulse_tailer::Tailer;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How long the pull endpoint gets to finish open requests on shutdown.
pub const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Agent;

impl Agent {
    /// Starts every configured component. Must be called inside a tokio
    /// runtime. The only startup failures are a transport that cannot be
    /// built and a pull endpoint that cannot bind; a tailer that fails to
    /// start is logged and skipped.
    pub async fn start(config: AgentConfig) -> Result<AgentHandle, AgentError> {
        let key = SharedKey::new(&config.api.auth_key);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(key.clone())?);
        let cancel = CancellationToken::new();

        // Bind before spawning anything so a taken port aborts startup cleanly.
        let listener = if config.http_server.enabled {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.http_server.port));
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| AgentError::Bind { addr, source })?;
            Some(listener)
        } else {
            None
        };

        let mut handle = AgentHandle {
            cancel: cancel.clone(),
            heartbeat: None,
            metrics: None,
            tailer: None,
            server: None,
            pull_addr: None,
            log_posts: None,
        };

        if config.api.heartbeat.trim().is_empty() {
            debug!("No heartbeat endpoint configured");
        } else {
            handle.heartbeat = Some(tokio::spawn(heartbeat::run(
                Arc::clone(&transport),
                config.api.heartbeat.clone(),
                config.uuid.clone(),
                HEARTBEAT_INTERVAL,
                cancel.child_token(),
            )));
        }

        if config.api.server.trim().is_empty() {
            warn!("No metrics endpoint configured, metrics are only served on demand");
        } else {
            let metrics = MetricsLoop {
                agent_id: config.uuid.clone(),
                url: config.api.server.clone(),
                period: config.interval(),
                samplers: config.collectors.sampler_set(),
                queue: DeliveryQueue::new(config.queue_config()),
                transport: Arc::clone(&transport),
            };
            handle.metrics = Some(tokio::spawn(metrics.run(cancel.child_token())));
        }

        if config.collectors.log.enabled {
            let shipper = LogShipper::new(
                config.uuid.clone(),
                config.api.log.clone(),
                Arc::clone(&transport),
            );
            handle.log_posts = Some(shipper.tracker().clone());

            let mut tailer = Tailer::new(config.tailer_config(), shipper);
            if tailer.has_files() {
                match tailer.start().await {
                    Ok(()) => handle.tailer = Some(tailer),
                    Err(e) => error!("Failed to start log tailer: {e}"),
                }
            } else {
                warn!("No valid log files to tail");
            }
        }

        if let Some(listener) = listener {
            handle.pull_addr = listener.local_addr().ok();
            let state = PullState {
                key,
                agent_id: Arc::from(config.uuid.as_str()),
                collectors: Arc::new(config.collectors.clone()),
            };
            handle.server = Some(tokio::spawn(pull::serve(
                listener,
                state,
                cancel.child_token(),
            )));
        }

        info!("Agent started: {}", config.uuid);
        Ok(handle)
    }
}

/// Owns every task the agent spawned.
pub struct AgentHandle {
    cancel: CancellationToken,
    heartbeat: Option<JoinHandle<()>>,
    metrics: Option<JoinHandle<DeliveryQueue<MetricsPayload>>>,
    tailer: Option<Tailer>,
    server: Option<JoinHandle<std::io::Result<()>>>,
    pull_addr: Option<SocketAddr>,
    log_posts: Option<TaskTracker>,
}

impl AgentHandle {
    /// Address the pull endpoint is bound to, when it is enabled.
    pub fn pull_addr(&self) -> Option<SocketAddr> {
        self.pull_addr
    }

    pub fn is_tailing(&self) -> bool {
        self.tailer.is_some()
    }

    /// Stops everything in dependency order: the tailer first so no new log
    /// batches appear, then the loops (a cycle already underway completes),
    /// then the pull endpoint, and finally any log posts still in flight.
    /// Metrics still queued at that point go to a backup file when file
    /// backup is enabled.
    pub async fn shutdown(mut self) -> Result<(), AgentError> {
        info!("Shutting down agent");
        self.cancel.cancel();
        let mut first_error = None;

        if let Some(mut tailer) = self.tailer.take() {
            tailer.stop().await;
        }

        if let Some(task) = self.metrics.take() {
            match task.await {
                Ok(mut queue) => {
                    let saved = queue.flush_to_backup().await;
                    match saved {
                        Ok(Some(path)) => info!("Pending metrics saved to {}", path.display()),
                        Ok(None) if !queue.is_empty() => {
                            warn!("{} metric payloads were not delivered", queue.len());
                        }
                        Ok(None) => {}
                        Err(e) => error!(
                            "Failed to save {} pending metric payloads: {e}",
                            queue.len()
                        ),
                    }
                }
                Err(e) => {
                    error!("Metrics loop failed: {e}");
                    first_error.get_or_insert(AgentError::Task(e));
                }
            }
        }

        if let Some(task) = self.heartbeat.take() {
            if let Err(e) = task.await {
                error!("Heartbeat loop failed: {e}");
                first_error.get_or_insert(AgentError::Task(e));
            }
        }

        if let Some(task) = self.server.take() {
            match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => debug!("Metrics endpoint stopped"),
                Ok(Ok(Err(e))) => error!("Metrics endpoint failed: {e}"),
                Ok(Err(e)) => {
                    error!("Metrics endpoint task failed: {e}");
                    first_error.get_or_insert(AgentError::Task(e));
                }
                Err(_) => warn!(
                    "Metrics endpoint did not stop within {}s",
                    SERVER_SHUTDOWN_TIMEOUT.as_secs()
                ),
            }
        }

        if let Some(tracker) = self.log_posts.take() {
            tracker.close();
            tracker.wait().await;
        }

        info!("Agent stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
