//! Port mapping between envoy listeners and backend listeners.
//!
//! # Data Flow
//! ```text
//! declared PortConfigs + bound backend ports
//!     → mapper.rs (admin port, then one envoy port per entry)
//!     → Vec<Port>, index-aligned with Config.ports
//!     → envoy config builder labels listeners in this order
//! ```

pub mod mapper;

use serde::{Deserialize, Serialize};

use crate::config::PortConfig;

pub use mapper::map_ports;

/// Runtime mapping for a single declared port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Port {
    pub config: PortConfig,
    /// Port envoy listens on.
    pub envoy_port: u16,
    /// Port the backend listens on.
    pub service_port: u16,
}
