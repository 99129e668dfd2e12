//! Configuration loading and parsing

use anyhow::{anyhow, bail, Context, Result};
use can_signal_decoder::{PipelineConfig, TransportKind};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from exporter.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub filtering: FilteringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default = "default_interface")]
    pub interface: TransportKind,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_timeout")]
    pub receive_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            channel: default_channel(),
            receive_timeout_ms: default_timeout(),
        }
    }
}

fn default_interface() -> TransportKind {
    TransportKind::SocketCan
}

fn default_channel() -> String {
    "vcan0".to_string()
}

fn default_timeout() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// Merged in order; a CAN ID defined twice aborts startup
    #[serde(default)]
    pub dbc_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl MetricsConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Dump every received frame at debug level
    #[serde(default)]
    pub log_frames: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_frames: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilteringConfig {
    pub message_ids: Option<Vec<u32>>,
}

impl AppConfig {
    /// Reject settings that cannot produce a working exporter
    pub fn validate(&self) -> Result<()> {
        if self.schema.dbc_files.is_empty() {
            bail!("No DBC files configured (set [schema] dbc_files or pass --dbc)");
        }
        if self.transport.receive_timeout_ms == 0 {
            bail!("transport.receive_timeout_ms must be greater than zero");
        }
        if self.transport.channel.is_empty() {
            bail!("transport.channel must not be empty");
        }
        self.level_filter()?;
        Ok(())
    }

    /// Log level from the config file
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.logging
            .level
            .parse()
            .map_err(|_| anyhow!("Invalid log level: {:?}", self.logging.level))
    }

    /// Settings handed to the ingest pipeline
    pub fn pipeline_config(&self) -> PipelineConfig {
        let config = PipelineConfig::new()
            .with_receive_timeout(std::time::Duration::from_millis(
                self.transport.receive_timeout_ms,
            ))
            .with_frame_logging(self.logging.log_frames);

        match &self.filtering.message_ids {
            Some(ids) => config.with_message_filter(ids.clone()),
            None => config,
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [transport]
            interface = "virtual"
            channel = "can1"
            receive_timeout_ms = 250

            [schema]
            dbc_files = ["d65_brightloops.dbc", "body.dbc"]

            [metrics]
            bind_address = "127.0.0.1"
            port = 9100

            [logging]
            level = "debug"
            log_frames = true

            [filtering]
            message_ids = [291, 512]
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.transport.interface, TransportKind::Virtual);
        assert_eq!(config.transport.channel, "can1");
        assert_eq!(config.schema.dbc_files.len(), 2);
        assert_eq!(config.metrics.socket_addr(), "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Debug);
        config.validate().unwrap();

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.receive_timeout(), Duration::from_millis(250));
        assert!(pipeline.log_frames);
        assert!(pipeline.should_process_message(291));
        assert!(!pipeline.should_process_message(292));
    }

    #[test]
    fn test_defaults_match_deployment() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.transport.interface, TransportKind::SocketCan);
        assert_eq!(config.transport.channel, "vcan0");
        assert_eq!(config.metrics.port, 8000);
        assert_eq!(config.logging.level, "info");
        assert!(config.filtering.message_ids.is_none());
    }

    #[test]
    fn test_validate_rejects_missing_schema_and_bad_level() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.schema.dbc_files.push(PathBuf::from("a.dbc"));
        config.validate().unwrap();

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[schema]\ndbc_files = [\"powertrain.dbc\"]").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.schema.dbc_files, vec![PathBuf::from("powertrain.dbc")]);

        let mut broken = NamedTempFile::new().unwrap();
        writeln!(broken, "[metrics]\nport = \"eighty\"").unwrap();
        assert!(load_config(broken.path()).is_err());
    }
}
