use axum::{Json, extract::Query};
use bson::doc;
use infra_mapper_client::entities::{
  graph::{GraphData, GraphFilter},
  host::Host,
  report::{FleetStats, HealthResponse},
};
use mungos::find::find_collect;
use serde::Deserialize;

use crate::state::{broadcaster, db_client, process_start, requests_total};

pub async fn health() -> Json<HealthResponse> {
  Json(HealthResponse {
    status: "ok",
    uptime_seconds: process_start().elapsed().as_secs() as i64,
    requests_total: requests_total(),
  })
}

/// Query params for `GET /api/v1/graph` (§6). Named to match the wire
/// contract; [GraphFilter] carries the equivalent fields under slightly
/// different names used internally by the materializer.
#[derive(Debug, Deserialize)]
pub struct GraphQuery {
  #[serde(default)]
  pub include_offline: bool,
  pub host_filter: Option<String>,
  pub project_filter: Option<String>,
}

pub async fn graph(
  Query(query): Query<GraphQuery>,
) -> serror::Result<Json<GraphData>> {
  let filter = GraphFilter {
    include_offline: query.include_offline,
    host_pattern: query.host_filter,
    project_pattern: query.project_filter,
    restrict_to_host_ids: None,
  };
  let data = crate::graph::materialize(&filter).await?;
  Ok(Json(data))
}

pub async fn hosts() -> serror::Result<Json<Vec<Host>>> {
  let hosts: Vec<Host> = find_collect(&db_client().hosts, doc! {}, None).await?;
  Ok(Json(hosts))
}

pub async fn stats() -> serror::Result<Json<FleetStats>> {
  let db = db_client();
  let now = infra_mapper_client::timestamp_ms();
  let hosts: Vec<Host> = find_collect(&db.hosts, doc! {}, None).await?;
  let containers = db.containers.count_documents(doc! {}).await?;
  let connections = db.connections.count_documents(doc! {}).await?;

  Ok(Json(FleetStats {
    hosts: hosts.len() as u64,
    hosts_online: hosts.iter().filter(|h| now - h.last_seen < 5 * 60_000).count() as u64,
    containers,
    connections,
    ws_subscribers: broadcaster().subscriber_count().await,
  }))
}
