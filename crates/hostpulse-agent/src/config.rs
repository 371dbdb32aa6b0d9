// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent configuration.
//!
//! Loaded from a YAML file and overridden by `HOSTPULSE_*` environment
//! variables, `__` separating nested keys:
//!
//! ```text
//! HOSTPULSE_INTERVAL=30
//! HOSTPULSE_API__SERVER=https://collect.example.com/api/metrics
//! HOSTPULSE_COLLECTORS__REDIS__ADDR=127.0.0.1:6379
//! ```
//!
//! Missing keys take the defaults below.

use crate::error::AgentError;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use hostpulse_collector::cpu::CpuSampler;
use hostpulse_collector::disk::DiskSampler;
use hostpulse_collector::docker::{DockerSampler, DEFAULT_DOCKER_ENDPOINT};
use hostpulse_collector::host::HostSampler;
use hostpulse_collector::memory::MemorySampler;
use hostpulse_collector::net::NetSampler;
use hostpulse_collector::ports::PortSampler;
use hostpulse_collector::redis::RedisSampler;
use hostpulse_collector::SamplerSet;
use hostpulse_delivery::QueueConfig;
use hostpulse_tailer::TailerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

pub const ENV_PREFIX: &str = "HOSTPULSE_";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent identity sent with every payload.
    pub uuid: String,
    /// Seconds between metric cycles.
    pub interval: u64,
    /// Pending items that trigger a spill to disk.
    pub retry_count: usize,
    pub log_level: String,
    /// When set, logs are also appended to a dated file in this directory.
    pub log_dir: Option<PathBuf>,
    pub api: ApiConfig,
    pub collectors: CollectorsConfig,
    pub storage: StorageConfig,
    pub http_server: HttpServerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            uuid: String::new(),
            interval: 10,
            retry_count: 100,
            log_level: "info".to_string(),
            log_dir: None,
            api: ApiConfig::default(),
            collectors: CollectorsConfig::default(),
            storage: StorageConfig::default(),
            http_server: HttpServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Metrics endpoint. Empty disables the metrics loop.
    pub server: String,
    /// Heartbeat endpoint. Empty disables heartbeats.
    pub heartbeat: String,
    /// Log lines endpoint.
    pub log: String,
    pub auth_key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Toggle {
    pub enabled: bool,
}

impl Toggle {
    const fn on() -> Self {
        Toggle { enabled: true }
    }

    const fn off() -> Self {
        Toggle { enabled: false }
    }
}

impl Default for Toggle {
    fn default() -> Self {
        Toggle::on()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        DockerConfig {
            enabled: false,
            endpoint: DEFAULT_DOCKER_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub enabled: bool,
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogCollectorConfig {
    pub enabled: bool,
    pub buffer_count: usize,
    /// Seconds.
    pub flush_interval: u64,
    pub files: Vec<PathBuf>,
}

impl Default for LogCollectorConfig {
    fn default() -> Self {
        LogCollectorConfig {
            enabled: false,
            buffer_count: 100,
            flush_interval: 5,
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    pub cpu: Toggle,
    pub mem: Toggle,
    pub net: Toggle,
    pub disk: Toggle,
    pub ports: Toggle,
    pub host: Toggle,
    pub docker: DockerConfig,
    pub redis: RedisConfig,
    pub log: LogCollectorConfig,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        CollectorsConfig {
            cpu: Toggle::on(),
            mem: Toggle::on(),
            net: Toggle::on(),
            disk: Toggle::on(),
            ports: Toggle::off(),
            host: Toggle::on(),
            docker: DockerConfig::default(),
            redis: RedisConfig::default(),
            log: LogCollectorConfig::default(),
        }
    }
}

impl CollectorsConfig {
    /// Builds the enabled samplers, in payload field order.
    pub fn sampler_set(&self) -> SamplerSet {
        let mut set = SamplerSet::new();
        if self.cpu.enabled {
            set.push(Box::new(CpuSampler::new()));
        }
        if self.mem.enabled {
            set.push(Box::new(MemorySampler::new()));
        }
        if self.disk.enabled {
            set.push(Box::new(DiskSampler::new()));
        }
        if self.net.enabled {
            set.push(Box::new(NetSampler::new()));
        }
        if self.ports.enabled {
            set.push(Box::new(PortSampler::new()));
        }
        if self.host.enabled {
            set.push(Box::new(HostSampler::new()));
        }
        if self.docker.enabled {
            set.push(Box::new(DockerSampler::new(&self.docker.endpoint)));
        }
        if self.redis.enabled {
            set.push(Box::new(RedisSampler::new(self.redis.addr.clone())));
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileBackupConfig {
    pub enabled: bool,
    pub dir: String,
}

impl Default for FileBackupConfig {
    fn default() -> Self {
        FileBackupConfig {
            enabled: true,
            dir: "./log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub file_backup: FileBackupConfig,
    /// Retention bound for the in-memory retry queue.
    pub max_queue_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            file_backup: FileBackupConfig::default(),
            max_queue_size: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        HttpServerConfig {
            enabled: false,
            port: 9100,
        }
    }
}

impl AgentConfig {
    /// Reads `path`, applies environment overrides and normalises log file
    /// paths. An empty `uuid` is replaced by a fresh one, which is also
    /// written back into `path` so the identity survives restarts.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        if !path.is_file() {
            return Err(AgentError::ConfigMissing(path.to_path_buf()));
        }
        let mut config: AgentConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        config.collectors.log.files = config
            .collectors
            .log
            .files
            .iter()
            .map(|file| normalize_path(file))
            .collect();
        if config.log_dir.as_ref().is_some_and(|dir| dir.as_os_str().is_empty()) {
            config.log_dir = None;
        }

        if config.uuid.trim().is_empty() {
            let id = uuid::Uuid::new_v4().to_string();
            if let Err(e) = inject_uuid(path, &id) {
                error!("Failed to write agent id to {}: {e}", path.display());
            }
            info!("Generated agent id: {id}");
            config.uuid = id;
        }

        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Checks every rule and reports all violations at once.
    pub fn validate(&self) -> Result<(), AgentError> {
        let mut errors = Vec::new();

        if self.uuid.trim().is_empty() {
            errors.push("uuid must not be empty".to_string());
        }
        if self.api.log.trim().is_empty() {
            errors.push("api.log must not be empty".to_string());
        }
        if self.interval == 0 {
            errors.push("interval must be greater than 0".to_string());
        }
        let log = &self.collectors.log;
        if log.enabled {
            if log.buffer_count == 0 {
                errors.push("collectors.log.buffer_count must be > 0".to_string());
            }
            if log.flush_interval == 0 {
                errors.push("collectors.log.flush_interval must be > 0".to_string());
            }
            if log.files.is_empty() {
                errors.push("collectors.log.files must include at least one path".to_string());
            }
        }
        if self.collectors.redis.enabled && self.collectors.redis.addr.trim().is_empty() {
            errors.push("collectors.redis.addr must be set if redis is enabled".to_string());
        }
        if self.http_server.enabled && self.http_server.port == 0 {
            errors.push("http_server.port must be > 0 if enabled".to_string());
        }
        if self.storage.max_queue_size == 0 {
            errors.push("storage.max_queue_size must be > 0".to_string());
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "invalid log_level '{}', must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        if self.storage.file_backup.enabled && self.storage.file_backup.dir.trim().is_empty() {
            warn!("File backup is enabled but storage.file_backup.dir is empty; backups go to the working directory");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AgentError::InvalidConfig(errors))
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn queue_config(&self) -> QueueConfig {
        let backup = &self.storage.file_backup;
        // An empty directory spills into the working directory.
        let backup_dir = backup.enabled.then(|| match backup.dir.trim() {
            "" => PathBuf::from("."),
            dir => PathBuf::from(dir),
        });
        QueueConfig {
            spill_threshold: self.retry_count,
            max_queue_size: self.storage.max_queue_size,
            backup_dir,
        }
    }

    pub fn tailer_config(&self) -> TailerConfig {
        let log = &self.collectors.log;
        TailerConfig {
            files: log.files.clone(),
            buffer_count: log.buffer_count,
            flush_interval: Duration::from_secs(log.flush_interval),
            ..TailerConfig::default()
        }
    }
}

/// Lexically cleans a path: repeated separators and `.` segments go away.
fn normalize_path(path: &Path) -> PathBuf {
    path.components().collect()
}

/// Sets the top-level `uuid:` line of the YAML file at `path`, adding one at
/// the top when there is none.
fn inject_uuid(path: &Path, id: &str) -> std::io::Result<()> {
    let contents = std::fs::read_to_string(path)?;
    let line = format!("uuid: \"{id}\"");
    let mut replaced = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|existing| {
            if !replaced && existing.starts_with("uuid:") {
                replaced = true;
                line.clone()
            } else {
                existing.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.insert(0, line);
    }
    let mut updated = lines.join("\n");
    if contents.ends_with('\n') {
        updated.push('\n');
    }
    std::fs::write(path, updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
uuid: "agent-1"
api:
  log: "http://collector.local/api/logs"
"#;

    fn load(jail: &figment::Jail) -> AgentConfig {
        AgentConfig::load(&jail.directory().join("config.yaml")).expect("config loads")
    }

    #[test]
    fn defaults_apply_to_missing_keys() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("config.yaml", MINIMAL)?;

            let config = load(jail);
            assert_eq!(config.uuid, "agent-1");
            assert_eq!(config.interval, 10);
            assert_eq!(config.retry_count, 100);
            assert_eq!(config.storage.max_queue_size, 300);
            assert!(config.storage.file_backup.enabled);
            assert_eq!(config.storage.file_backup.dir, "./log");
            assert!(config.collectors.cpu.enabled);
            assert!(!config.collectors.ports.enabled);
            assert!(!config.http_server.enabled);
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn full_file_is_read() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "config.yaml",
                r#"
uuid: "agent-2"
interval: 30
retry_count: 5
log_level: debug
api:
  server: "http://collector.local/api/metrics"
  heartbeat: "http://collector.local/api/heartbeat"
  log: "http://collector.local/api/logs"
  auth_key: "secret"
collectors:
  cpu: { enabled: false }
  docker: { enabled: true }
  redis: { enabled: true, addr: "127.0.0.1:6379" }
  log:
    enabled: true
    buffer_count: 2
    flush_interval: 1
    files: ["/var/log//syslog", "./app/./out.log"]
storage:
  file_backup: { enabled: false, dir: "" }
  max_queue_size: 50
http_server: { enabled: true, port: 9200 }
"#,
            )?;

            let config = load(jail);
            assert_eq!(config.interval, 30);
            assert_eq!(config.api.auth_key, "secret");
            assert!(!config.collectors.cpu.enabled);
            assert_eq!(config.collectors.docker.endpoint, DEFAULT_DOCKER_ENDPOINT);
            assert_eq!(
                config.collectors.log.files,
                vec![PathBuf::from("/var/log/syslog"), PathBuf::from("./app/out.log")]
            );
            assert_eq!(config.http_server.port, 9200);

            let queue = config.queue_config();
            assert_eq!(queue.spill_threshold, 5);
            assert_eq!(queue.max_queue_size, 50);
            assert_eq!(queue.backup_dir, None);

            let tailer = config.tailer_config();
            assert_eq!(tailer.buffer_count, 2);
            assert_eq!(tailer.flush_interval, Duration::from_secs(1));

            assert_eq!(
                config.collectors.sampler_set().names(),
                vec!["memory", "disk", "net", "host", "docker", "redis"]
            );
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("config.yaml", MINIMAL)?;
            jail.set_env("HOSTPULSE_INTERVAL", "3");
            jail.set_env("HOSTPULSE_API__SERVER", "http://override.local/metrics");
            jail.set_env("HOSTPULSE_LOG_LEVEL", "warn");

            let config = load(jail);
            assert_eq!(config.interval, 3);
            assert_eq!(config.api.server, "http://override.local/metrics");
            assert_eq!(config.log_level, "warn");
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            let result = AgentConfig::load(&jail.directory().join("absent.yaml"));
            assert!(matches!(result, Err(AgentError::ConfigMissing(_))));
            Ok(())
        });
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("config.yaml", "interval: [not, a, number]\n")?;
            let result = AgentConfig::load(&jail.directory().join("config.yaml"));
            assert!(matches!(result, Err(AgentError::ConfigLoad(_))));
            Ok(())
        });
    }

    #[test]
    fn empty_uuid_is_generated_and_persisted() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "config.yaml",
                "uuid: \"\"\ninterval: 5\napi:\n  log: \"http://x\"\n",
            )?;

            let config = load(jail);
            assert!(uuid::Uuid::parse_str(&config.uuid).is_ok());

            let written = std::fs::read_to_string(jail.directory().join("config.yaml"))
                .expect("config readable");
            assert!(written.starts_with(&format!("uuid: \"{}\"\n", config.uuid)));
            assert!(written.contains("interval: 5"));

            let reloaded = load(jail);
            assert_eq!(reloaded.uuid, config.uuid);
            Ok(())
        });
    }

    #[test]
    fn uuid_line_is_prepended_when_absent() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("config.yaml", "api:\n  log: \"http://x\"\n")?;

            let config = load(jail);
            let written = std::fs::read_to_string(jail.directory().join("config.yaml"))
                .expect("config readable");
            let mut lines = written.lines();
            assert_eq!(lines.next(), Some(format!("uuid: \"{}\"", config.uuid).as_str()));
            assert_eq!(lines.next(), Some("api:"));
            Ok(())
        });
    }

    #[test]
    fn validation_collects_every_violation() {
        let config = AgentConfig {
            interval: 0,
            log_level: "verbose".to_string(),
            collectors: CollectorsConfig {
                redis: RedisConfig {
                    enabled: true,
                    addr: " ".to_string(),
                },
                log: LogCollectorConfig {
                    enabled: true,
                    buffer_count: 0,
                    flush_interval: 0,
                    files: Vec::new(),
                },
                ..CollectorsConfig::default()
            },
            http_server: HttpServerConfig {
                enabled: true,
                port: 0,
            },
            storage: StorageConfig {
                max_queue_size: 0,
                ..StorageConfig::default()
            },
            ..AgentConfig::default()
        };

        match config.validate() {
            Err(AgentError::InvalidConfig(errors)) => {
                assert_eq!(errors.len(), 10, "{errors:?}");
                assert!(errors.iter().any(|e| e.starts_with("uuid")));
                assert!(errors.iter().any(|e| e.starts_with("api.log")));
                assert!(errors.iter().any(|e| e.contains("verbose")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn empty_backup_dir_spills_to_working_directory() {
        let config = AgentConfig {
            storage: StorageConfig {
                file_backup: FileBackupConfig {
                    enabled: true,
                    dir: "  ".to_string(),
                },
                max_queue_size: 300,
            },
            ..AgentConfig::default()
        };
        assert_eq!(config.queue_config().backup_dir, Some(PathBuf::from(".")));
    }

    struct Refusing;

    #[async_trait::async_trait]
    impl hostpulse_delivery::Transport for Refusing {
        async fn post(
            &self,
            _url: &str,
            _body: Vec<u8>,
        ) -> Result<(), hostpulse_delivery::TransportError> {
            Err(hostpulse_delivery::TransportError::Request(
                "connection refused".to_string(),
            ))
        }
    }

    #[test]
    fn empty_backup_dir_still_spills_failed_payloads() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "config.yaml",
                r#"
uuid: "agent-1"
retry_count: 2
api:
  log: "http://collector.local/api/logs"
storage:
  file_backup: { enabled: true, dir: "" }
  max_queue_size: 3
"#,
            )?;
            let config = load(jail);
            assert!(config.validate().is_ok());

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            let mut queue = hostpulse_delivery::DeliveryQueue::new(config.queue_config());
            let mut dropped = 0;
            let mut spilled = Vec::new();
            for ts in 1..=6 {
                let report = runtime.block_on(queue.process(&Refusing, "http://x", ts, ts));
                dropped += report.dropped;
                spilled.extend(report.spilled);
            }

            assert_eq!(dropped, 0);
            assert_eq!(spilled.len(), 3, "every second cycle spills");
            assert!(queue.is_empty());
            let backups = std::fs::read_dir(jail.directory())
                .expect("jail dir")
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("retry_backup_"))
                .count();
            assert!(backups >= 1);
            Ok(())
        });
    }

    #[test]
    fn disabled_backup_has_no_directory() {
        let mut config = AgentConfig::default();
        config.storage.file_backup.enabled = false;
        assert_eq!(config.queue_config().backup_dir, None);
    }
}
