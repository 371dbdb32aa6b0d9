// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::SampleError;
use crate::memory::percent;
use crate::payload::{DiskUsage, Sample};
use crate::Sampler;
use async_trait::async_trait;
use std::collections::HashSet;
use sysinfo::Disks;

/// One mounted filesystem as reported by the OS, before filtering.
#[derive(Debug, Clone)]
pub struct Mount {
    pub device: String,
    pub fs_type: String,
    pub mount_point: String,
    pub total: u64,
    pub available: u64,
}

pub struct DiskSampler {
    disks: Disks,
}

impl DiskSampler {
    pub fn new() -> Self {
        DiskSampler {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for DiskSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for DiskSampler {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn sample(&mut self) -> Result<Sample, SampleError> {
        self.disks.refresh_list();
        let mounts = self
            .disks
            .iter()
            .map(|disk| Mount {
                device: disk.name().to_string_lossy().into_owned(),
                fs_type: disk.file_system().to_string_lossy().into_owned(),
                mount_point: disk.mount_point().to_string_lossy().into_owned(),
                total: disk.total_space(),
                available: disk.available_space(),
            })
            .collect();
        Ok(Sample::Disks(usable_disks(mounts)))
    }
}

/// Drops pseudo and loop filesystems, then keeps the first mount of every
/// distinct `(total, used)` pair so bind mounts are reported once.
pub fn usable_disks(mounts: Vec<Mount>) -> Vec<DiskUsage> {
    let mut seen = HashSet::new();
    mounts
        .into_iter()
        .filter(|m| {
            !m.fs_type.is_empty()
                && !m.fs_type.starts_with("tmpfs")
                && !m.fs_type.starts_with("dev")
                && !m.device.contains("loop")
                && m.total > 0
        })
        .filter_map(|m| {
            let used = m.total.saturating_sub(m.available);
            seen.insert((m.total, used)).then(|| DiskUsage {
                mount_point: m.mount_point,
                total: m.total,
                used,
                used_perc: percent(used, m.total),
            })
        })
        .collect()
}
