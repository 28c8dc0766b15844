//! Configuration schema definitions.
//!
//! `Config` is the immutable input of a single agent. `HarnessConfig` is the
//! on-disk layout read by the `envoy-agent` binary. All types derive Serde
//! traits for deserialization from TOML.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application protocol carried by a declared port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Protocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTP2")]
    Http2,
    #[serde(rename = "HTTPS")]
    Https,
    #[serde(rename = "GRPC")]
    Grpc,
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    Mongo,
    Redis,
    MySQL,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Http2 => "HTTP2",
            Protocol::Https => "HTTPS",
            Protocol::Grpc => "GRPC",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Mongo => "Mongo",
            Protocol::Redis => "Redis",
            Protocol::MySQL => "MySQL",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meta information about one port the backend exposes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PortConfig {
    pub name: String,
    pub protocol: Protocol,
}

impl PortConfig {
    pub fn new(name: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            protocol,
        }
    }
}

/// Configuration for an agent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Service name, used as the Envoy node cluster and virtual host.
    pub service_name: String,

    /// Declared ports, in the order they are resolved.
    pub ports: Vec<PortConfig>,

    /// Certificate (PEM) served by the backend. Requires `tls_key`.
    pub tls_cert: Option<PathBuf>,

    /// Private key (PEM) for `tls_cert`.
    pub tls_key: Option<PathBuf>,

    /// Version string reported by the backend.
    pub version: String,

    /// Directory under which the Envoy config is written.
    pub tmp_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            ports: Vec::new(),
            tls_cert: None,
            tls_key: None,
            version: String::new(),
            tmp_dir: std::env::temp_dir(),
        }
    }
}

/// Settings for spawning the Envoy binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvoySettings {
    /// Envoy executable, resolved through `PATH` when not absolute.
    pub binary: PathBuf,

    /// Value passed to `--log-level`.
    pub log_level: String,

    /// How long to wait after spawning before checking for an early exit.
    pub startup_grace_ms: u64,
}

impl Default for EnvoySettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("envoy"),
            log_level: "warning".to_string(),
            startup_grace_ms: 250,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "envoy_agent=info".to_string(),
        }
    }
}

/// Root of the harness configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    pub agent: Config,
    pub envoy: EnvoySettings,
    pub observability: ObservabilityConfig,
}
