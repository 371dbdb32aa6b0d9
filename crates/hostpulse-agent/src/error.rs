// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hostpulse_delivery::TransportError;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors that stop the agent. `main` logs them and exits with status 1.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("config file not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("failed to parse config: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    #[error("config validation failed:\n  - {}", .0.join("\n  - "))]
    InvalidConfig(Vec<String>),

    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to bind metrics endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to set up logging: {0}")]
    Logging(String),

    #[error("agent task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
