//! Assembles one tick's [AgentReport] and POSTs it to the backend (§4.4
//! steps 4-5, §6).

use infra_mapper_client::entities::{
  connection::ConnectionEvidence,
  container::Container,
  host::HostReport,
  log::ContainerLogEntry,
  metrics::{ContainerMetricsPoint, HostMetricsPoint},
  network::Network,
  report::{AgentMetadata, AgentReport, ReportStats},
};
use tracing::warn;

pub struct TickEvidence {
  pub host: HostReport,
  pub containers: Vec<Container>,
  pub networks: Vec<Network>,
  pub connections: Vec<ConnectionEvidence>,
  pub container_logs: Vec<ContainerLogEntry>,
  pub host_metrics: Option<HostMetricsPoint>,
  pub container_metrics: Vec<ContainerMetricsPoint>,
}

/// Builds the report body and POSTs it. On transport failure returns the
/// error message so the caller can stash it as `last_error` for the *next*
/// tick's metadata (§4.4 step 5, §7) — this tick does not retry.
pub async fn send(
  client: &reqwest::Client,
  backend_url: &str,
  api_key: &str,
  evidence: TickEvidence,
  agent: AgentMetadata,
  timestamp: i64,
) -> Result<ReportStats, String> {
  let report = AgentReport {
    host: evidence.host,
    containers: evidence.containers,
    networks: evidence.networks,
    connections: evidence.connections,
    container_logs: evidence.container_logs,
    host_metrics: evidence.host_metrics,
    container_metrics: evidence.container_metrics,
    agent,
    timestamp,
  };

  let url = format!("{}/api/v1/report", backend_url.trim_end_matches('/'));
  let response = client
    .post(&url)
    .bearer_auth(api_key)
    .json(&report)
    .send()
    .await
    .map_err(|e| format!("report POST failed: {e}"))?;

  if !response.status().is_success() {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    warn!(%status, body, "report rejected by server");
    return Err(format!("server rejected report ({status}): {body}"));
  }

  response
    .json::<ReportStats>()
    .await
    .map_err(|e| format!("failed to decode report response: {e}"))
}
