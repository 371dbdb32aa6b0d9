// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::SampleError;
use crate::payload::{NetStats, Sample};
use crate::Sampler;
use async_trait::async_trait;
use sysinfo::Networks;

/// Cumulative traffic counters summed over every interface.
pub struct NetSampler {
    networks: Networks,
}

impl NetSampler {
    pub fn new() -> Self {
        NetSampler {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for NetSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for NetSampler {
    fn name(&self) -> &'static str {
        "net"
    }

    async fn sample(&mut self) -> Result<Sample, SampleError> {
        self.networks.refresh_list();
        if self.networks.iter().next().is_none() {
            return Err(SampleError::Empty("network interfaces"));
        }
        let totals = self
            .networks
            .iter()
            .fold(NetStats::default(), |mut acc, (_, data)| {
                acc.bytes_sent += data.total_transmitted();
                acc.bytes_recv += data.total_received();
                acc.packets_sent += data.total_packets_transmitted();
                acc.packets_recv += data.total_packets_received();
                acc
            });
        Ok(Sample::Net(totals))
    }
}
