//! Ephemeral port discovery.
//!
//! The port is released before returning so the final consumer can bind it.
//! Another process may grab it in between; that window is accepted.

use std::net::{TcpListener, ToSocketAddrs};

use crate::error::AgentError;

/// Ask the OS for an unused TCP port on the loopback interface.
pub fn allocate_free_port() -> Result<u16, AgentError> {
    let addrs: Vec<_> = ("localhost", 0)
        .to_socket_addrs()
        .map_err(AgentError::PortAllocation)?
        .collect();

    // Backend and envoy listen on 127.0.0.1, so prefer the IPv4 loopback.
    let addr = addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            AgentError::PortAllocation(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "localhost did not resolve to any address",
            ))
        })?;

    let listener = TcpListener::bind(addr).map_err(AgentError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(AgentError::PortAllocation)?
        .port();

    tracing::trace!(port, "Allocated free port");
    Ok(port)
}
