// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The hostpulse agent.
//!
//! Samples the host on a fixed interval and pushes the result to a collector,
//! sends heartbeats, ships lines tailed from log files and serves the same
//! metrics on demand over `GET /metrics`. Every outbound request is signed
//! with the shared key; failed metric payloads are retried on later cycles
//! and spilled to disk once too many pile up.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod log_shipper;
pub mod logger;
pub mod metrics_loop;
pub mod pull;

pub use agent::{Agent, AgentHandle};
pub use config::AgentConfig;
pub use error::AgentError;
