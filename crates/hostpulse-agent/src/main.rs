// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use hostpulse_agent::config::DEFAULT_CONFIG_PATH;
use hostpulse_agent::{logger, Agent, AgentConfig, AgentError};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
pub async fn main() -> ExitCode {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Logging is configured by the file being loaded, so loading reports
    // through a temporary stdout subscriber.
    let loaded = tracing::subscriber::with_default(logger::bootstrap(), || {
        AgentConfig::load(&path).and_then(|config| config.validate().map(|()| config))
    });
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::subscriber::with_default(logger::bootstrap(), || {
                error!("Failed to load config: {e}");
            });
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logger::init(&config.log_level, config.log_dir.as_deref()) {
        tracing::subscriber::with_default(logger::bootstrap(), || error!("{e}"));
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AgentConfig) -> Result<(), AgentError> {
    let agent = Agent::start(config).await?;
    shutdown_signal().await;
    info!("Shutdown signal received");
    agent.shutdown().await
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                () = ctrl_c_or_pending(tokio::signal::ctrl_c()) => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            error!("Cannot listen for SIGTERM: {e}");
            ctrl_c_or_pending(tokio::signal::ctrl_c()).await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c_or_pending(tokio::signal::ctrl_c()).await;
}

/// Resolves when `ctrl_c` does. A Ctrl-C listener that fails to install
/// never resolves, so the agent keeps running instead of stopping at once.
async fn ctrl_c_or_pending<F>(ctrl_c: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = ctrl_c.await {
        error!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
