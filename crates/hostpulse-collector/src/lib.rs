// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Samplers for host, service and container metrics.
//!
//! Every metric category is a [`Sampler`]: called once per tick, it returns
//! one [`Sample`] or an error. A [`SamplerSet`] runs the enabled samplers in
//! turn and folds their output into a [`MetricsPayload`]; a failed sampler
//! simply leaves its field out.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use async_trait::async_trait;

pub mod cpu;
pub mod disk;
pub mod docker;
pub mod error;
pub mod host;
pub mod memory;
pub mod net;
pub mod payload;
pub mod ports;
pub mod redis;
pub mod set;

pub use error::SampleError;
pub use payload::{
    CpuStats, DiskUsage, DockerContainer, HostInfo, MemoryStats, MetricsPayload, NetStats,
    PortInfo, RedisMetrics, Sample,
};
pub use set::SamplerSet;

/// One metric category.
///
/// Samplers keep whatever state they need between calls (a `sysinfo` handle,
/// an HTTP client), which is why `sample` takes `&mut self`.
#[async_trait]
pub trait Sampler: Send {
    /// Short category name used in logs, e.g. `"cpu"`.
    fn name(&self) -> &'static str;

    async fn sample(&mut self) -> Result<Sample, SampleError>;
}
