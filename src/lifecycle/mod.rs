//! Process lifecycle for the `envoy-agent` binary.
//!
//! # Data Flow
//! ```text
//! load config → init logging → Agent::start → print mapping
//!     → signals.rs (SIGINT/SIGTERM) → Agent::stop → exit
//! ```

pub mod signals;

pub use signals::wait_for_shutdown;
