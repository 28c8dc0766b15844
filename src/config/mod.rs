//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! harness file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HarnessConfig { agent: Config, envoy, observability }
//!     → Config handed to Agent::new, never mutated afterwards
//! ```
//!
//! # Design Decisions
//! - Config is immutable once handed to an agent
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::Config;
pub use schema::EnvoySettings;
pub use schema::HarnessConfig;
pub use schema::ObservabilityConfig;
pub use schema::PortConfig;
pub use schema::Protocol;
