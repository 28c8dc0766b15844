//! Network helpers.
//!
//! # Data Flow
//! ```text
//! free_port.rs  → bind 127.0.0.1:0, read port, release
//!              → used by the port mapper for envoy and admin ports
//! ```

pub mod free_port;

pub use free_port::allocate_free_port;
