//! Envoy subsystem.
//!
//! # Data Flow
//! ```text
//! admin port + Vec<Port>
//!     → config.rs (EnvoyConfigBuilder → bootstrap JSON on disk)
//!     → EnvoyConfig artifact (owned by the agent, removed on stop/drop)
//!     → process.rs (spawn `envoy -c <file>`)
//! ```
//!
//! # Design Decisions
//! - The agent depends on the `Proxy` trait, not on the envoy binary
//! - Config cleanup never fails loudly; it runs during teardown

pub mod config;
pub mod process;

pub use config::{EnvoyConfig, EnvoyConfigBuilder};
pub use process::{EnvoyProcess, Proxy};
