//! Report ingester (C5, §4.5). Every agent tick lands here. Steps 1-6 run
//! as an ordered sequence of per-collection writes and abort on the first
//! failure (see DESIGN.md's "report-ingest transactionality" resolution);
//! steps 7-9 are best-effort and never fail the request (§4.5, §7).

use std::{
  collections::{HashMap, HashSet},
  net::IpAddr,
};

use anyhow::Context;
use bson::doc;
use infra_mapper_client::{
  entities::{
    connection::{Connection, ConnectionEvidence, ConnectionType},
    container::Container,
    host::HostReport,
    network::Network,
    report::{AgentReport, ReportStats},
  },
  timestamp_ms,
};
use tracing::{error, warn};

use crate::{
  alerts, broadcast::BroadcastEvent, health, logsink, state::{broadcaster, db_client},
};

pub async fn ingest(report: AgentReport) -> anyhow::Result<ReportStats> {
  let host_id = report.host.agent_id.clone();
  let now = timestamp_ms();

  upsert_host(&report.host, now).await?;
  let containers = diff_containers(&host_id, report.containers).await?;
  let networks = replace_networks(&host_id, report.networks).await?;
  let connections =
    replace_connections(&host_id, &containers, report.connections).await?;
  let logs = store_logs(&host_id, report.container_logs).await?;
  let container_metrics = store_metrics(
    &host_id,
    report.host_metrics,
    report.container_metrics,
  )
  .await?;

  // Steps 7-9: best-effort, errors logged but never fail the ingest.
  if let Err(e) = health::on_report(&host_id, &report.agent, now).await {
    error!(host_id, error = %e, "agent-health update failed for report");
  }

  let alerts_fired = match alerts::evaluate().await {
    Ok(stats) => stats.alerts_fired,
    Err(e) => {
      error!(host_id, error = %e, "alert evaluation failed for report");
      0
    }
  };

  broadcaster()
    .broadcast(BroadcastEvent::HostUpdate { host_id: host_id.clone() })
    .await;
  broadcaster().broadcast(BroadcastEvent::GraphRefresh).await;

  Ok(ReportStats {
    host_id,
    containers,
    networks,
    connections,
    logs,
    container_metrics,
    alerts_fired,
  })
}

/// Step 1: upsert Host by `agent_id`. Rolling health counters are owned by
/// C7 (`health::on_report`) and only seeded here on insert.
async fn upsert_host(report: &HostReport, now: i64) -> anyhow::Result<()> {
  let set = doc! {
    "hostname": &report.hostname,
    "ips": &report.ips,
    "overlay_ip": bson::to_bson(&report.overlay_ip)?,
    "overlay_hostname": bson::to_bson(&report.overlay_hostname)?,
    "docker_version": bson::to_bson(&report.docker_version)?,
    "os": bson::to_bson(&report.os)?,
    "os_version": bson::to_bson(&report.os_version)?,
    "kernel_version": bson::to_bson(&report.kernel_version)?,
    "command_port": bson::to_bson(&report.command_port)?,
    "last_seen": now,
    "is_online": true,
  };
  let set_on_insert = doc! {
    "id": &report.agent_id,
    "first_seen": now,
    "report_interval_seconds": bson::Bson::Null,
    "reports_count": 0i64,
    "errors_count": 0i64,
    "consecutive_failures": 0i32,
    "last_error": bson::Bson::Null,
    "last_error_at": bson::Bson::Null,
    "last_report_duration_ms": bson::Bson::Null,
    "avg_report_duration_ms": bson::Bson::Null,
    "agent_health": "unknown",
  };
  db_client()
    .hosts
    .update_one(
      doc! { "id": &report.agent_id },
      doc! { "$set": set, "$setOnInsert": set_on_insert },
    )
    .upsert(true)
    .await
    .context("failed to upsert host")?;
  Ok(())
}

/// Step 2: `E` (persisted, keyed by id) vs `R` (the report, keyed by id) -
/// delete `E \ R`, upsert every row in `R`. Tombstones are not kept (§3).
async fn diff_containers(
  host_id: &str,
  containers: Vec<Container>,
) -> anyhow::Result<usize> {
  let ids: Vec<&str> = containers.iter().map(|c| c.id.as_str()).collect();
  db_client()
    .containers
    .delete_many(doc! { "host_id": host_id, "id": { "$nin": &ids } })
    .await
    .context("failed to delete stale containers")?;

  for container in &containers {
    db_client()
      .containers
      .replace_one(doc! { "id": &container.id }, container)
      .upsert(true)
      .await
      .context("failed to upsert container")?;
  }
  Ok(containers.len())
}

/// Step 3: delete-then-insert, no diffing (§3: "purely descriptive").
async fn replace_networks(
  host_id: &str,
  networks: Vec<Network>,
) -> anyhow::Result<usize> {
  db_client()
    .networks
    .delete_many(doc! { "host_id": host_id })
    .await
    .context("failed to clear networks")?;
  if !networks.is_empty() {
    db_client()
      .networks
      .insert_many(&networks)
      .await
      .context("failed to insert networks")?;
  }
  Ok(networks.len())
}

/// Step 4: delete-then-insert after filtering (drop LISTEN / loopback),
/// attributing a source container and classifying each surviving row.
async fn replace_connections(
  host_id: &str,
  containers: &[Container],
  evidence: Vec<ConnectionEvidence>,
) -> anyhow::Result<usize> {
  db_client()
    .connections
    .delete_many(doc! { "source_host_id": host_id })
    .await
    .context("failed to clear connections")?;

  let ip_to_container: HashMap<&str, &str> = containers
    .iter()
    .flat_map(|c| c.networks.values().map(move |ip| (ip.as_str(), c.id.as_str())))
    .collect();
  let container_ips: HashSet<&str> =
    containers.iter().flat_map(|c| c.networks.values().map(String::as_str)).collect();

  let connections: Vec<Connection> = evidence
    .into_iter()
    .filter(ConnectionEvidence::is_persistable)
    .map(|e| {
      let source_container_id = e
        .container_id
        .as_deref()
        .map(|short| format!("{host_id}:{short}"))
        .or_else(|| ip_to_container.get(e.local_ip.as_str()).map(|id| id.to_string()));
      let connection_type = classify(&e.remote_ip, &container_ips);
      Connection {
        source_host_id: host_id.to_string(),
        source_container_id,
        local_ip: e.local_ip,
        local_port: e.local_port,
        remote_ip: e.remote_ip,
        remote_port: e.remote_port,
        protocol: e.protocol,
        state: e.state,
        connection_type,
        source_method: e.source_method,
      }
    })
    .collect();

  if !connections.is_empty() {
    db_client()
      .connections
      .insert_many(&connections)
      .await
      .context("failed to insert connections")?;
  }
  Ok(connections.len())
}

/// `internal` if the remote IP belongs to one of this host's own containers;
/// `cross-host` if it falls in an RFC1918 or CGNAT (100.64.0.0/10) range
/// (the overlay-network address space); otherwise `external` (§4.5 step 4).
fn classify(remote_ip: &str, container_ips: &HashSet<&str>) -> ConnectionType {
  if container_ips.contains(remote_ip) {
    return ConnectionType::Internal;
  }
  match remote_ip.parse::<IpAddr>() {
    Ok(IpAddr::V4(v4)) => {
      let o = v4.octets();
      let private = o[0] == 10
        || (o[0] == 172 && (16..=31).contains(&o[1]))
        || (o[0] == 192 && o[1] == 168)
        || (o[0] == 100 && (64..=127).contains(&o[1]));
      if private { ConnectionType::CrossHost } else { ConnectionType::External }
    }
    _ => ConnectionType::External,
  }
}

/// Step 5: persist the batch, then hand a copy to the log-sink forwarder
/// (C10). Sink delivery is itself best-effort per sink (§4.10) so a sink
/// outage never rolls back the persisted rows.
async fn store_logs(
  host_id: &str,
  entries: Vec<infra_mapper_client::entities::log::ContainerLogEntry>,
) -> anyhow::Result<usize> {
  let entries: Vec<_> = entries.into_iter().map(|e| e.truncate_message()).collect();
  if !entries.is_empty() {
    db_client()
      .logs
      .insert_many(&entries)
      .await
      .context("failed to insert logs")?;
  }
  let count = entries.len();
  logsink::forward(host_id, &entries).await;
  Ok(count)
}

/// Step 6: append-only time-series rows.
async fn store_metrics(
  host_id: &str,
  host_metrics: Option<infra_mapper_client::entities::metrics::HostMetricsPoint>,
  container_metrics: Vec<infra_mapper_client::entities::metrics::ContainerMetricsPoint>,
) -> anyhow::Result<usize> {
  if let Some(point) = host_metrics {
    db_client()
      .host_metrics
      .insert_one(point)
      .await
      .context("failed to insert host metrics")?;
  }
  if !container_metrics.is_empty() {
    db_client()
      .container_metrics
      .insert_many(&container_metrics)
      .await
      .context("failed to insert container metrics")?;
  }
  if host_id.is_empty() {
    warn!("ingest called with empty host_id");
  }
  Ok(container_metrics.len())
}
