// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::SampleError;
use crate::payload::{MemoryStats, Sample};
use crate::Sampler;
use async_trait::async_trait;
use sysinfo::System;

const PROC_MEMINFO_PATH: &str = "/proc/meminfo";

pub struct MemorySampler {
    system: System,
}

impl MemorySampler {
    pub fn new() -> Self {
        MemorySampler {
            system: System::new(),
        }
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for MemorySampler {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn sample(&mut self) -> Result<Sample, SampleError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(SampleError::Empty("memory totals"));
        }
        let used = self.system.used_memory();
        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();
        let (cached, buffers) = read_page_cache().await;

        Ok(Sample::Memory(MemoryStats {
            total,
            used,
            free: self.system.available_memory(),
            used_percent: percent(used, total),
            cached,
            buffers,
            swap_total,
            swap_used,
            swap_used_percent: percent(swap_used, swap_total),
        }))
    }
}

pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

async fn read_page_cache() -> (Option<u64>, Option<u64>) {
    match tokio::fs::read_to_string(PROC_MEMINFO_PATH).await {
        Ok(contents) => (
            meminfo_bytes(&contents, "Cached"),
            meminfo_bytes(&contents, "Buffers"),
        ),
        Err(_) => (None, None),
    }
}

/// Looks up `key` in `/proc/meminfo` contents and converts kB to bytes.
pub fn meminfo_bytes(contents: &str, key: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name != key {
            return None;
        }
        let kb = rest.split_whitespace().next()?.parse::<u64>().ok()?;
        Some(kb * 1024)
    })
}
