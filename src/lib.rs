//! Local test harness that runs a backend service behind envoy.
//!
//! An [`Agent`] allocates loopback ports, starts the backend, writes an envoy
//! bootstrap that fronts every backend port, launches envoy, and tears all of
//! it down again as one unit.

pub mod agent;
pub mod backend;
pub mod config;
pub mod envoy;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod ports;

pub use agent::{Agent, AgentState};
pub use config::{Config, PortConfig, Protocol};
pub use error::{AgentError, MultiError};
pub use ports::Port;
