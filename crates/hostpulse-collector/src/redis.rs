// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Redis health from `INFO all`.
//!
//! Speaks just enough RESP to send one command and read one bulk reply over
//! a fresh connection per sample. Any failure is reported as
//! `{"status": "unreachable"}` rather than an error.

use crate::error::SampleError;
use crate::payload::{RedisMetrics, Sample};
use crate::Sampler;
use async_trait::async_trait;
use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

const INFO_ALL: &[u8] = b"*2\r\n$4\r\nINFO\r\n$3\r\nall\r\n";
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);
// Upper bound on the reply we are willing to buffer.
const MAX_REPLY_LEN: usize = 1 << 20;

pub struct RedisSampler {
    addr: String,
}

impl RedisSampler {
    pub fn new(addr: impl Into<String>) -> Self {
        RedisSampler { addr: addr.into() }
    }
}

#[async_trait]
impl Sampler for RedisSampler {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn sample(&mut self) -> Result<Sample, SampleError> {
        let start = Instant::now();
        let reply = match tokio::time::timeout(EXCHANGE_TIMEOUT, fetch_info(&self.addr)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("Can't connect to Redis at {}: {e}", self.addr);
                return Ok(Sample::Redis(unreachable()));
            }
            Err(_) => {
                warn!("Can't connect to Redis at {}: timed out", self.addr);
                return Ok(Sample::Redis(unreachable()));
            }
        };
        let metrics = parse_info(&reply);
        info!("Got Redis metrics in {:?}", start.elapsed());
        Ok(Sample::Redis(metrics))
    }
}

fn unreachable() -> RedisMetrics {
    RedisMetrics {
        status: "unreachable".to_string(),
        ..RedisMetrics::default()
    }
}

async fn fetch_info(addr: &str) -> io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(INFO_ALL).await?;
    let mut reader = BufReader::new(stream);
    read_bulk_reply(&mut reader).await
}

/// Reads one RESP reply, accepting only a bulk string.
pub async fn read_bulk_reply<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut header = String::new();
    reader.read_line(&mut header).await?;
    let header = header.trim_end();

    if let Some(message) = header.strip_prefix('-') {
        return Err(io::Error::new(io::ErrorKind::Other, message.to_string()));
    }
    let len = header
        .strip_prefix('$')
        .and_then(|len| len.parse::<i64>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected reply header {header:?}"),
            )
        })?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_REPLY_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad bulk length"))?;

    let mut body = vec![0u8; len + 2];
    reader.read_exact(&mut body).await?;
    body.truncate(len);
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Picks the reported fields out of an `INFO` reply.
pub fn parse_info(info: &str) -> RedisMetrics {
    let mut metrics = RedisMetrics {
        status: "ok".to_string(),
        ..RedisMetrics::default()
    };
    for line in info.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match key.trim() {
            "connected_clients" => metrics.connected_clients = value,
            "used_memory" => metrics.used_memory = value,
            "total_connections_received" => metrics.total_connections = value,
            "uptime_in_seconds" => metrics.uptime_in_seconds = value,
            "role" => metrics.role = value,
            "redis_version" => metrics.redis_version = value,
            _ => {}
        }
    }
    metrics
}
