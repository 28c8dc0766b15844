//! Bootstraps a local service behind envoy.
//!
//! # Lifecycle
//! ```text
//! Unstarted ──start──▶ Running ──stop──▶ Stopped
//!                        │  ▲
//!                        └──┘ stop failed (retry stop)
//! ```
//!
//! `start` fails fast and leaves whatever it already launched in place;
//! `stop` unwinds it. `stop` never bails early: every component is shut
//! down and every failure is reported together.

use crate::backend::{Backend, BackendSpec, EchoServer};
use crate::config::{Config, EnvoySettings, Protocol};
use crate::envoy::{EnvoyConfig, EnvoyConfigBuilder, EnvoyProcess, Proxy};
use crate::error::{AgentError, MultiError};
use crate::observability::metrics;
use crate::ports::{map_ports, Port};

/// The only protocol envoy is configured for today.
pub const SUPPORTED_PROTOCOL: Protocol = Protocol::Http;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Unstarted,
    Running,
    Stopped,
}

/// A backend and the envoy in front of it, managed as one unit.
pub struct Agent {
    config: Config,
    backend: Box<dyn Backend>,
    proxy: Box<dyn Proxy>,
    backend_started: bool,
    proxy_started: bool,
    envoy_config: Option<EnvoyConfig>,
    envoy_admin_port: u16,
    ports: Vec<Port>,
    state: AgentState,
}

impl Agent {
    pub fn new(config: Config, backend: Box<dyn Backend>, proxy: Box<dyn Proxy>) -> Self {
        Self {
            config,
            backend,
            proxy,
            backend_started: false,
            proxy_started: false,
            envoy_config: None,
            envoy_admin_port: 0,
            ports: Vec::new(),
            state: AgentState::Unstarted,
        }
    }

    /// An agent running the in-process echo server behind a real envoy.
    pub fn with_echo_backend(config: Config, envoy: EnvoySettings) -> Self {
        Self::new(
            config,
            Box::new(EchoServer::new()),
            Box::new(EnvoyProcess::new(envoy)),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Runtime port mappings; empty until `start` succeeds.
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Envoy admin port; `0` until `start` succeeds.
    pub fn envoy_admin_port(&self) -> u16 {
        self.envoy_admin_port
    }

    /// Path of the generated envoy config while it exists.
    pub fn envoy_config_file(&self) -> Option<&std::path::Path> {
        self.envoy_config.as_ref().map(EnvoyConfig::config_file)
    }

    /// Start the backend, then envoy.
    pub async fn start(&mut self) -> Result<(), AgentError> {
        let result = self.start_inner().await;
        metrics::record_start(result.is_ok());
        match &result {
            Ok(()) => {
                self.state = AgentState::Running;
                tracing::info!(
                    service = %self.config.service_name,
                    admin_port = self.envoy_admin_port,
                    ports = self.ports.len(),
                    "Agent started"
                );
            }
            Err(e) => {
                tracing::error!(service = %self.config.service_name, error = %e, "Agent failed to start");
            }
        }
        result
    }

    async fn start_inner(&mut self) -> Result<(), AgentError> {
        if self.backend_started || self.proxy_started || self.envoy_config.is_some() {
            return Err(AgentError::AlreadyStarted);
        }
        self.ports.clear();
        self.envoy_admin_port = 0;

        self.check_protocols()?;

        let bound = self.start_service().await?;

        // Generate the port mappings between envoy and the backend service.
        let (admin_port, ports) = map_ports(&self.config.ports, &bound)?;
        self.envoy_admin_port = admin_port;
        self.ports = ports;

        self.start_envoy().await
    }

    // TODO: accept HTTP2/GRPC once the bootstrap emits per-protocol codecs.
    fn check_protocols(&self) -> Result<(), AgentError> {
        match self
            .config
            .ports
            .iter()
            .find(|port| port.protocol != SUPPORTED_PROTOCOL)
        {
            Some(port) => Err(AgentError::UnsupportedProtocol(port.protocol)),
            None => Ok(()),
        }
    }

    async fn start_service(&mut self) -> Result<Vec<u16>, AgentError> {
        let spec = BackendSpec::from_config(&self.config);
        let bound = self.backend.start(&spec).await?;
        self.backend_started = true;
        Ok(bound)
    }

    async fn start_envoy(&mut self) -> Result<(), AgentError> {
        let envoy_config = EnvoyConfigBuilder {
            service_name: &self.config.service_name,
            admin_port: self.envoy_admin_port,
            ports: &self.ports,
            tmp_dir: &self.config.tmp_dir,
        }
        .build()?;

        let envoy_config = self.envoy_config.insert(envoy_config);
        self.proxy.start(envoy_config).await?;
        self.proxy_started = true;
        Ok(())
    }

    /// Stop envoy and the backend and remove the generated config.
    ///
    /// Every step runs even if an earlier one fails; failures come back
    /// together as [`AgentError::Teardown`].
    pub async fn stop(&mut self) -> Result<(), AgentError> {
        let mut errors = MultiError::new();
        let had_work = self.proxy_started || self.backend_started || self.envoy_config.is_some();

        if self.proxy_started {
            match self.proxy.stop().await {
                Ok(()) => self.proxy_started = false,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to stop envoy");
                    errors.push(e);
                }
            }
        }

        if self.backend_started {
            match self.backend.stop().await {
                Ok(()) => self.backend_started = false,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to stop backend");
                    errors.push(e);
                }
            }
        }

        if let Some(mut envoy_config) = self.envoy_config.take() {
            envoy_config.dispose();
        }

        metrics::record_stop(errors.is_empty());
        if errors.is_empty() && (had_work || self.state == AgentState::Running) {
            self.state = AgentState::Stopped;
            tracing::info!(service = %self.config.service_name, "Agent stopped");
        }
        errors.into_result()
    }
}
