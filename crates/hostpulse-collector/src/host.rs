// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::SampleError;
use crate::payload::{HostInfo, Sample};
use crate::Sampler;
use async_trait::async_trait;
use sysinfo::System;

#[derive(Default)]
pub struct HostSampler;

impl HostSampler {
    pub fn new() -> Self {
        HostSampler
    }
}

#[async_trait]
impl Sampler for HostSampler {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn sample(&mut self) -> Result<Sample, SampleError> {
        let hostname = System::host_name().ok_or(SampleError::Empty("hostname"))?;
        Ok(Sample::Host(HostInfo {
            hostname,
            uptime: System::uptime(),
            os: std::env::consts::OS.to_string(),
            platform: System::distribution_id(),
        }))
    }
}
