// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Listening ports.
//!
//! On Linux the socket tables under `/proc/net` are read directly. Other
//! unix systems go through `lsof`.

use crate::error::SampleError;
use crate::payload::{PortInfo, Sample};
use crate::Sampler;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;

// TCP_LISTEN for tcp tables; unconnected udp sockets sit in TCP_CLOSE.
const TCP_LISTEN: &str = "0A";
const UDP_UNCONNECTED: &str = "07";

#[derive(Default)]
pub struct PortSampler;

impl PortSampler {
    pub fn new() -> Self {
        PortSampler
    }
}

#[async_trait]
impl Sampler for PortSampler {
    fn name(&self) -> &'static str {
        "ports"
    }

    async fn sample(&mut self) -> Result<Sample, SampleError> {
        let ports = listening_ports().await?;
        Ok(Sample::Ports(
            ports
                .into_iter()
                .map(|port| PortInfo {
                    port: port.to_string(),
                })
                .collect(),
        ))
    }
}

#[cfg(target_os = "linux")]
async fn listening_ports() -> Result<BTreeSet<u16>, SampleError> {
    const TABLES: [(&str, &str); 4] = [
        ("/proc/net/tcp", TCP_LISTEN),
        ("/proc/net/tcp6", TCP_LISTEN),
        ("/proc/net/udp", UDP_UNCONNECTED),
        ("/proc/net/udp6", UDP_UNCONNECTED),
    ];

    let mut ports = BTreeSet::new();
    let mut readable = 0;
    for (path, state) in TABLES {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                readable += 1;
                ports.extend(parse_proc_net(&contents, state));
            }
            Err(e) => debug!("Could not read {path}: {e}"),
        }
    }
    if readable == 0 {
        return Err(SampleError::Empty("socket tables"));
    }
    Ok(ports)
}

#[cfg(all(unix, not(target_os = "linux")))]
async fn listening_ports() -> Result<BTreeSet<u16>, SampleError> {
    let output = tokio::process::Command::new("lsof")
        .args(["-i", "-nP", "-sTCP:LISTEN"])
        .output()
        .await
        .map_err(|source| SampleError::Command {
            command: "lsof".to_string(),
            source,
        })?;
    Ok(parse_lsof(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(not(unix))]
async fn listening_ports() -> Result<BTreeSet<u16>, SampleError> {
    Err(SampleError::Unsupported("port listing"))
}

/// Extracts local ports of sockets in `state` from a `/proc/net/{tcp,udp}*`
/// table. Port 0 is never reported.
pub fn parse_proc_net(contents: &str, state: &str) -> BTreeSet<u16> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let local = fields.nth(1)?;
            let st = fields.nth(1)?;
            if st != state {
                return None;
            }
            let (_, port) = local.rsplit_once(':')?;
            u16::from_str_radix(port, 16).ok()
        })
        .filter(|port| *port != 0)
        .collect()
}

/// Extracts ports from `lsof -i -nP -sTCP:LISTEN` output.
pub fn parse_lsof(output: &str) -> BTreeSet<u16> {
    static LISTEN: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = LISTEN
        .get_or_init(|| Regex::new(r":(\d+)\s+\(LISTEN\)").ok())
        .as_ref()
    else {
        return BTreeSet::new();
    };
    output
        .lines()
        .filter_map(|line| re.captures(line)?.get(1)?.as_str().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
   0: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 11111 1 0000000000000000 100 0 0 10 0\n\
   1: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 22222 1 0000000000000000 100 0 0 10 0\n\
   2: 0200A8C0:D2F0 0300A8C0:0016 01 00000000:00000000 02:0000031A 00000000  1000        0 33333 2 0000000000000000 20 4 30 10 -1\n\
   3: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 44444 1 0000000000000000 100 0 0 10 0\n";

    #[test]
    fn listening_tcp_sockets_only() {
        let ports = parse_proc_net(TCP, TCP_LISTEN);
        assert_eq!(ports.into_iter().collect::<Vec<_>>(), vec![22, 8080]);
    }

    #[test]
    fn ipv6_and_udp_tables() {
        let tcp6 = "  sl  local_address                         remote_address                        st\n\
   0: 00000000000000000000000000000000:1538 00000000000000000000000000000000:0000 0A 00000000:00000000\n";
        assert_eq!(
            parse_proc_net(tcp6, TCP_LISTEN).into_iter().collect::<Vec<_>>(),
            vec![5432]
        );

        let udp = "   sl  local_address rem_address   st tx_queue\n\
  123: 00000000:0044 00000000:0000 07 00000000:00000000\n\
  124: 00000000:0000 00000000:0000 07 00000000:00000000\n";
        assert_eq!(
            parse_proc_net(udp, UDP_UNCONNECTED).into_iter().collect::<Vec<_>>(),
            vec![68]
        );
    }

    #[test]
    fn lsof_output() {
        let output = "COMMAND   PID USER   FD   TYPE DEVICE SIZE/OFF NODE NAME\n\
sshd      812 root    3u  IPv4  18930      0t0  TCP *:22 (LISTEN)\n\
sshd      812 root    4u  IPv6  18932      0t0  TCP *:22 (LISTEN)\n\
redis    1022 user    6u  IPv4  21001      0t0  TCP 127.0.0.1:6379 (LISTEN)\n\
curl     2000 user    5u  IPv4  30000      0t0  TCP 10.0.0.2:51000->1.1.1.1:443 (ESTABLISHED)\n";
        assert_eq!(parse_lsof(output).into_iter().collect::<Vec<_>>(), vec![22, 6379]);
    }
}
