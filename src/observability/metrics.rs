//! Lifecycle metrics.
//!
//! # Metrics
//! - `envoy_agent_starts_total` (counter): start attempts by `outcome`
//! - `envoy_agent_stops_total` (counter): stop attempts by `outcome`
//! - `envoy_agent_ports_allocated_total` (counter): envoy + admin ports drawn
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use metrics::counter;

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

pub fn record_start(ok: bool) {
    counter!("envoy_agent_starts_total", "outcome" => outcome(ok)).increment(1);
}

pub fn record_stop(ok: bool) {
    counter!("envoy_agent_stops_total", "outcome" => outcome(ok)).increment(1);
}

pub fn record_ports_allocated(count: usize) {
    counter!("envoy_agent_ports_allocated_total").increment(count as u64);
}
