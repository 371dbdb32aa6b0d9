// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Container inventory from the Docker Engine API.
//!
//! An unreachable daemon or an unreadable response is reported as a single
//! placeholder container whose status says what went wrong, so the server
//! can tell "no containers" apart from "could not ask".

use crate::error::SampleError;
use crate::payload::{DockerContainer, Sample};
use crate::Sampler;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_DOCKER_ENDPOINT: &str = "http://localhost:2375";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const SHORT_ID_LEN: usize = 12;

#[derive(Debug, Deserialize)]
struct EngineContainer {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Status", default)]
    status: String,
}

impl From<EngineContainer> for DockerContainer {
    fn from(c: EngineContainer) -> Self {
        let name = c
            .names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| "-".to_string());
        DockerContainer {
            id: c.id.chars().take(SHORT_ID_LEN).collect(),
            name,
            image: c.image,
            status: c.status,
        }
    }
}

pub struct DockerSampler {
    client: reqwest::Client,
    url: String,
}

impl DockerSampler {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        DockerSampler {
            client,
            url: format!(
                "{}/containers/json?all=true",
                endpoint.trim_end_matches('/')
            ),
        }
    }
}

fn placeholder(status: &str) -> Vec<DockerContainer> {
    vec![DockerContainer {
        id: "-".to_string(),
        name: "-".to_string(),
        image: "-".to_string(),
        status: status.to_string(),
    }]
}

#[async_trait]
impl Sampler for DockerSampler {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn sample(&mut self) -> Result<Sample, SampleError> {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Docker API not reachable at {}: {e}", self.url);
                return Ok(Sample::Docker(placeholder("Docker API not reachable")));
            }
        };
        let containers = match response.json::<Vec<EngineContainer>>().await {
            Ok(containers) => containers,
            Err(e) => {
                warn!("Invalid JSON from Docker API: {e}");
                return Ok(Sample::Docker(placeholder("Invalid JSON from Docker API")));
            }
        };
        Ok(Sample::Docker(
            containers.into_iter().map(DockerContainer::from).collect(),
        ))
    }
}
