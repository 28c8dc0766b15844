//! Backend subsystem.
//!
//! # Data Flow
//! ```text
//! Agent::start
//!     → BackendSpec { port_count, tls, version }
//!     → Backend::start (bind one listener per port)
//!     → bound ports, in request order
//!     → port mapper
//! ```
//!
//! # Design Decisions
//! - The agent only sees the `Backend` trait; tests substitute fakes
//! - Protocol validation happens in the agent before the backend is touched

pub mod echo;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::AgentError;

pub use echo::EchoServer;

/// What the agent asks a backend to serve.
#[derive(Debug, Clone, Default)]
pub struct BackendSpec {
    pub port_count: usize,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub version: String,
}

impl BackendSpec {
    pub fn from_config(config: &Config) -> Self {
        Self {
            port_count: config.ports.len(),
            tls_cert: config.tls_cert.clone(),
            tls_key: config.tls_key.clone(),
            version: config.version.clone(),
        }
    }
}

/// A service the agent places behind envoy.
#[async_trait]
pub trait Backend: Send {
    /// Start listening on `spec.port_count` ports and return them in order.
    async fn start(&mut self, spec: &BackendSpec) -> Result<Vec<u16>, AgentError>;

    /// Stop serving and release every bound port.
    async fn stop(&mut self) -> Result<(), AgentError>;
}
