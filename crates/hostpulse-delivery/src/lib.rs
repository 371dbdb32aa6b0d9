// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Outbound delivery for hostpulse.
//!
//! Two pieces live here:
//!
//! - [`transport`]: serializes a payload, signs it with the shared key and
//!   POSTs it. One attempt per call, success or a uniform [`TransportError`].
//! - [`retry_queue`]: the [`DeliveryQueue`] that retries failed payloads on
//!   every cycle and spills them to a backup file once too many pile up.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod backup;
pub mod error;
pub mod retry_queue;
pub mod shared_key;
pub mod transport;

pub use error::{BackupError, TransportError};
pub use retry_queue::{CycleReport, DeliveryQueue, QueueConfig, QueuedItem};
pub use shared_key::SharedKey;
pub use transport::{send, HttpTransport, Transport};
