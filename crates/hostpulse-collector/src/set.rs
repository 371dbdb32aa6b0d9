// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::payload::MetricsPayload;
use crate::Sampler;
use tracing::{debug, error};

/// The enabled samplers, run in insertion order on every tick.
#[derive(Default)]
pub struct SamplerSet {
    samplers: Vec<Box<dyn Sampler>>,
}

impl SamplerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sampler: Box<dyn Sampler>) {
        self.samplers.push(sampler);
    }

    pub fn with(mut self, sampler: impl Sampler + 'static) -> Self {
        self.push(Box::new(sampler));
        self
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.samplers.iter().map(|s| s.name()).collect()
    }

    /// Runs every sampler and assembles the payload, stamped with the time
    /// sampling finished. A failing sampler is logged and its section left
    /// out; it never aborts the others.
    pub async fn sample_all(&mut self, agent_id: &str) -> MetricsPayload {
        let mut payload = MetricsPayload::new(agent_id);
        for sampler in &mut self.samplers {
            match sampler.sample().await {
                Ok(sample) => payload.apply(sample),
                Err(e) => error!("Couldn't get {} stats: {e}", sampler.name()),
            }
        }
        payload.timestamp = chrono::Utc::now().timestamp();
        debug!("Sampled {} collectors", self.samplers.len());
        payload
    }
}
