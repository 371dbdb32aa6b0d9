// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CPU usage, cumulative CPU times and load averages.
//!
//! Usage percent comes from `sysinfo`, which needs two refreshes a minimum
//! interval apart; cumulative times come from `/proc/stat` on Linux.

use crate::error::SampleError;
use crate::payload::{CpuStats, Sample};
use crate::Sampler;
use async_trait::async_trait;
use sysinfo::System;
use tokio::time::Instant;
use tracing::debug;

const PROC_STAT_PATH: &str = "/proc/stat";

// Kernel USER_HZ; /proc/stat counts in these ticks.
const CLOCK_TICKS_PER_SECOND: f64 = 100.0;

/// Aggregate CPU times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CpuTimes {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: Option<f64>,
}

pub struct CpuSampler {
    system: System,
    last_refresh: Instant,
}

impl CpuSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        CpuSampler {
            system,
            last_refresh: Instant::now(),
        }
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for CpuSampler {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn sample(&mut self) -> Result<Sample, SampleError> {
        let ready_at = self.last_refresh + sysinfo::MINIMUM_CPU_UPDATE_INTERVAL;
        if Instant::now() < ready_at {
            tokio::time::sleep_until(ready_at).await;
        }
        self.system.refresh_cpu_all();
        self.last_refresh = Instant::now();

        let cores = self.system.cpus().len();
        if cores == 0 {
            return Err(SampleError::Empty("cpu list"));
        }
        let load = System::load_average();
        let times = read_cpu_times().await.unwrap_or_else(|e| {
            debug!("Could not read CPU times: {e}");
            CpuTimes::default()
        });

        Ok(Sample::Cpu(CpuStats {
            time_user: times.user,
            time_system: times.system,
            time_idle: times.idle,
            time_iowait: times.iowait,
            usage_percent: f64::from(self.system.global_cpu_usage()),
            cores,
            load_1: load.one,
            load_5: load.five,
            load_15: load.fifteen,
        }))
    }
}

#[cfg(target_os = "linux")]
async fn read_cpu_times() -> Result<CpuTimes, SampleError> {
    let contents = tokio::fs::read_to_string(PROC_STAT_PATH)
        .await
        .map_err(|source| SampleError::Read {
            path: PROC_STAT_PATH.to_string(),
            source,
        })?;
    parse_proc_stat(&contents)
}

#[cfg(not(target_os = "linux"))]
async fn read_cpu_times() -> Result<CpuTimes, SampleError> {
    Err(SampleError::Unsupported(PROC_STAT_PATH))
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
///
/// Columns are `user nice system idle iowait irq softirq steal ...`; `nice`
/// is reported as part of user time.
pub fn parse_proc_stat(contents: &str) -> Result<CpuTimes, SampleError> {
    let line = contents
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| SampleError::Parse("no aggregate cpu line".to_string()))?;

    let ticks = line
        .split_whitespace()
        .skip(1)
        .map(|field| {
            field
                .parse::<u64>()
                .map_err(|e| SampleError::Parse(format!("cpu field {field:?}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if ticks.len() < 4 {
        return Err(SampleError::Parse(format!(
            "expected at least 4 cpu fields, got {}",
            ticks.len()
        )));
    }

    let seconds = |ticks: u64| ticks as f64 / CLOCK_TICKS_PER_SECOND;
    Ok(CpuTimes {
        user: seconds(ticks[0] + ticks[1]),
        system: seconds(ticks[2]),
        idle: seconds(ticks[3]),
        iowait: ticks.get(4).copied().map(seconds),
    })
}
