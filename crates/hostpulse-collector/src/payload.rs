// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire types for the metrics payload.
//!
//! Field names are part of the protocol with the collection server.
//! Optional sections are omitted from JSON when a sampler is disabled or
//! failed, never sent as `null`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cpu: Option<CpuStats>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub memory: Option<MemoryStats>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub disks: Option<Vec<DiskUsage>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub net: Option<NetStats>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ports: Option<Vec<PortInfo>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub host: Option<HostInfo>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub docker: Option<Vec<DockerContainer>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub redis: Option<RedisMetrics>,
}

impl MetricsPayload {
    pub fn new(agent_id: impl Into<String>) -> Self {
        MetricsPayload {
            agent_id: agent_id.into(),
            cpu: None,
            memory: None,
            disks: None,
            net: None,
            ports: None,
            host: None,
            timestamp: 0,
            docker: None,
            redis: None,
        }
    }

    /// Stores `sample` in its section, replacing any earlier value.
    pub fn apply(&mut self, sample: Sample) {
        match sample {
            Sample::Cpu(v) => self.cpu = Some(v),
            Sample::Memory(v) => self.memory = Some(v),
            Sample::Disks(v) => self.disks = non_empty(v),
            Sample::Net(v) => self.net = Some(v),
            Sample::Ports(v) => self.ports = non_empty(v),
            Sample::Host(v) => self.host = Some(v),
            Sample::Docker(v) => self.docker = non_empty(v),
            Sample::Redis(v) => self.redis = Some(v),
        }
    }
}

// Empty lists are omitted on the wire like absent ones.
fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Output of one sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Cpu(CpuStats),
    Memory(MemoryStats),
    Disks(Vec<DiskUsage>),
    Net(NetStats),
    Ports(Vec<PortInfo>),
    Host(HostInfo),
    Docker(Vec<DockerContainer>),
    Redis(RedisMetrics),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(rename = "time_user_seconds")]
    pub time_user: f64,
    #[serde(rename = "time_system_seconds")]
    pub time_system: f64,
    #[serde(rename = "time_idle_seconds")]
    pub time_idle: f64,
    #[serde(
        rename = "time_iowait_seconds",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub time_iowait: Option<f64>,
    pub usage_percent: f64,
    pub cores: usize,
    #[serde(rename = "load_1min")]
    pub load_1: f64,
    #[serde(rename = "load_5min")]
    pub load_5: f64,
    #[serde(rename = "load_15min")]
    pub load_15: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    /// Memory available to new processes, not just unused pages.
    pub free: u64,
    pub used_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cached: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub buffers: Option<u64>,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_used_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount_point: String,
    pub total: u64,
    pub used: u64,
    pub used_perc: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetStats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub uptime: u64,
    pub os: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisMetrics {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub connected_clients: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub used_memory: Option<String>,
    #[serde(
        rename = "total_connections_received",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub total_connections: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uptime_in_seconds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub redis_version: Option<String>,
}
