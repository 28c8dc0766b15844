//! Shared fakes for agent lifecycle tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use envoy_agent::backend::{Backend, BackendSpec};
use envoy_agent::envoy::{EnvoyConfig, Proxy};
use envoy_agent::net::allocate_free_port;
use envoy_agent::{AgentError, Config, PortConfig, Protocol};

/// Counters and failure switches shared between a fake and its test.
#[derive(Clone, Default)]
pub struct Probe {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub fail_start: Arc<AtomicBool>,
    pub fail_stop: Arc<AtomicBool>,
    pub short_ports: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl Probe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make the backend report one port fewer than requested.
    pub fn set_short_ports(&self, short: bool) {
        self.short_ports.store(short, Ordering::SeqCst);
    }
}

/// Backend that reports free ports without serving anything.
pub struct FakeBackend {
    probe: Probe,
}

#[allow(dead_code)]
impl FakeBackend {
    pub fn new() -> (Self, Probe) {
        let probe = Probe::default();
        (Self { probe: probe.clone() }, probe)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn start(&mut self, spec: &BackendSpec) -> Result<Vec<u16>, AgentError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_start.load(Ordering::SeqCst) {
            return Err(AgentError::backend_start("injected backend start failure"));
        }
        let count = if self.probe.short_ports.load(Ordering::SeqCst) {
            spec.port_count.saturating_sub(1)
        } else {
            spec.port_count
        };
        (0..count).map(|_| allocate_free_port()).collect()
    }

    async fn stop(&mut self) -> Result<(), AgentError> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_stop.load(Ordering::SeqCst) {
            return Err(AgentError::backend_stop("injected backend stop failure"));
        }
        Ok(())
    }
}

/// Proxy that records the config it was started with.
pub struct FakeProxy {
    probe: Probe,
    config_file: Arc<Mutex<Option<PathBuf>>>,
}

#[allow(dead_code)]
impl FakeProxy {
    pub fn new() -> (Self, Probe, Arc<Mutex<Option<PathBuf>>>) {
        let probe = Probe::default();
        let config_file = Arc::new(Mutex::new(None));
        (
            Self {
                probe: probe.clone(),
                config_file: config_file.clone(),
            },
            probe,
            config_file,
        )
    }
}

#[async_trait]
impl Proxy for FakeProxy {
    async fn start(&mut self, config: &EnvoyConfig) -> Result<(), AgentError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        assert!(config.config_file().exists(), "proxy started before config was written");
        *self.config_file.lock().unwrap() = Some(config.config_file().to_path_buf());
        if self.probe.fail_start.load(Ordering::SeqCst) {
            return Err(AgentError::proxy_start("injected proxy start failure"));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AgentError> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_stop.load(Ordering::SeqCst) {
            return Err(AgentError::proxy_stop("injected proxy stop failure"));
        }
        Ok(())
    }
}

/// Agent config with the given `(name, protocol)` ports under `tmp_dir`.
#[allow(dead_code)]
pub fn config(tmp_dir: &Path, ports: &[(&str, Protocol)]) -> Config {
    Config {
        service_name: "echo".into(),
        ports: ports
            .iter()
            .map(|(name, protocol)| PortConfig::new(*name, *protocol))
            .collect(),
        version: "v1".into(),
        tmp_dir: tmp_dir.to_path_buf(),
        ..Config::default()
    }
}

/// True when nothing accepts connections on `127.0.0.1:port`.
#[allow(dead_code)]
pub async fn refuses_connections(port: u16) -> bool {
    tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err()
}
