//! `/health` endpoint.

use std::time::Instant;

use nodelight_core::DeviceKind;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered viewer count.
    pub connections: usize,
    /// `"serial"`, `"spoofer"` or `"none"`.
    pub device: String,
    /// Nodes with a known state.
    pub nodes: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    device: Option<DeviceKind>,
    nodes: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        device: device.map_or("none", DeviceKind::as_str).to_string(),
        nodes,
    }
}
