//! Pairs each bound backend port with a fresh envoy-facing port.

use std::collections::HashSet;

use crate::config::PortConfig;
use crate::error::AgentError;
use crate::net::allocate_free_port;
use crate::observability::metrics;
use crate::ports::Port;

/// Upper bound on re-draws when the OS hands back a port already in use
/// by this mapping.
const MAX_DRAWS_PER_PORT: usize = 16;

/// Allocate the admin port and one envoy port per declared port.
///
/// Returns `(admin_port, ports)`; `ports[i]` pairs `declared[i]` with
/// `bound[i]`.
pub fn map_ports(declared: &[PortConfig], bound: &[u16]) -> Result<(u16, Vec<Port>), AgentError> {
    map_ports_with(declared, bound, allocate_free_port)
}

/// [`map_ports`] with an injectable allocator.
pub fn map_ports_with<F>(
    declared: &[PortConfig],
    bound: &[u16],
    mut allocate: F,
) -> Result<(u16, Vec<Port>), AgentError>
where
    F: FnMut() -> Result<u16, AgentError>,
{
    if declared.len() != bound.len() {
        return Err(AgentError::PortCountMismatch {
            declared: declared.len(),
            bound: bound.len(),
        });
    }

    let mut taken: HashSet<u16> = bound.iter().copied().collect();
    let admin_port = draw_unique(&mut allocate, &mut taken)?;

    let mut ports = Vec::with_capacity(declared.len());
    for (config, &service_port) in declared.iter().zip(bound) {
        let envoy_port = draw_unique(&mut allocate, &mut taken)?;
        tracing::debug!(
            name = %config.name,
            protocol = %config.protocol,
            service_port,
            envoy_port,
            "Mapped port"
        );
        ports.push(Port {
            config: config.clone(),
            envoy_port,
            service_port,
        });
    }

    metrics::record_ports_allocated(ports.len() + 1);
    Ok((admin_port, ports))
}

/// The OS may recycle a port we released moments ago; draw again if so.
fn draw_unique<F>(allocate: &mut F, taken: &mut HashSet<u16>) -> Result<u16, AgentError>
where
    F: FnMut() -> Result<u16, AgentError>,
{
    for _ in 0..MAX_DRAWS_PER_PORT {
        let port = allocate()?;
        if port != 0 && taken.insert(port) {
            return Ok(port);
        }
        tracing::debug!(port, "Allocator returned a port already in use, drawing again");
    }

    Err(AgentError::PortAllocation(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        format!("no unique port after {} attempts", MAX_DRAWS_PER_PORT),
    )))
}
