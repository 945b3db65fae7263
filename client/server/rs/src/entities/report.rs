use serde::{Deserialize, Serialize};

use crate::entities::{
  connection::ConnectionEvidence,
  container::Container,
  host::HostReport,
  log::ContainerLogEntry,
  metrics::{ContainerMetricsPoint, HostMetricsPoint},
  network::Network,
};

/// Body of `POST /api/v1/report` (§6). One report is one agent tick's
/// worth of evidence (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
  pub host: HostReport,
  #[serde(default)]
  pub containers: Vec<Container>,
  #[serde(default)]
  pub networks: Vec<Network>,
  #[serde(default)]
  pub connections: Vec<ConnectionEvidence>,
  #[serde(default)]
  pub container_logs: Vec<ContainerLogEntry>,
  pub host_metrics: Option<HostMetricsPoint>,
  #[serde(default)]
  pub container_metrics: Vec<ContainerMetricsPoint>,
  pub agent: AgentMetadata,
  pub timestamp: i64,
}

/// Per-tick agent health telemetry (§4.4 step 4, consumed by C7 in §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
  pub version: String,
  pub report_interval: u32,
  pub report_duration_ms: i64,
  pub uptime_seconds: i64,
  /// Carries the *previous* tick's failure, if any (§4.4 step 4/5).
  pub error: Option<String>,
  pub command_port: Option<u16>,
}

/// Response body for a successful ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStats {
  pub host_id: String,
  pub containers: usize,
  pub networks: usize,
  pub connections: usize,
  pub logs: usize,
  pub container_metrics: usize,
  pub alerts_fired: u32,
}

/// `GET /api/v1/stats` response (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetStats {
  pub hosts: u64,
  pub hosts_online: u64,
  pub containers: u64,
  pub connections: u64,
  pub ws_subscribers: u64,
}

/// `GET /health` response (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
  pub status: &'static str,
  pub uptime_seconds: i64,
  pub requests_total: u64,
}
