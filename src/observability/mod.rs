//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! agent / backend / envoy modules produce:
//!     → tracing events (structured fields: ports, paths, pids)
//!     → metrics.rs (lifecycle counters)
//!
//! Consumers:
//!     → logging.rs subscriber installed by the binary (stdout)
//!     → whatever metrics recorder the embedding test installs
//! ```

pub mod logging;
pub mod metrics;
