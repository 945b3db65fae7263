//! The single shared mutable store (§5): one Mongo database, one typed
//! collection per entity in §3. Every writer goes through this client;
//! there is no other persistence path.

use anyhow::Context;
use infra_mapper_client::entities::{
  alert::{Alert, AlertRule},
  channel::AlertChannel,
  connection::Connection,
  container::Container,
  host::Host,
  log::ContainerLogEntry,
  metrics::{ContainerMetricsPoint, HostMetricsPoint},
  network::Network,
  sink::LogSink,
};
pub use mungos;
use mungos::mongodb::{
  Client as MongoClient, Collection, Database, IndexModel,
  bson::doc, options::IndexOptions,
};

pub struct Client {
  pub db: Database,
  pub hosts: Collection<Host>,
  pub containers: Collection<Container>,
  pub networks: Collection<Network>,
  pub connections: Collection<Connection>,
  pub host_metrics: Collection<HostMetricsPoint>,
  pub container_metrics: Collection<ContainerMetricsPoint>,
  pub logs: Collection<ContainerLogEntry>,
  pub alert_rules: Collection<AlertRule>,
  pub alerts: Collection<Alert>,
  pub alert_channels: Collection<AlertChannel>,
  pub log_sinks: Collection<LogSink>,
}

impl Client {
  pub async fn new(uri: &str, database_name: &str) -> anyhow::Result<Self> {
    let mongo = MongoClient::with_uri_str(uri)
      .await
      .context("failed to connect to mongodb")?;
    let db = mongo.database(database_name);

    let client = Self {
      hosts: db.collection("hosts"),
      containers: db.collection("containers"),
      networks: db.collection("networks"),
      connections: db.collection("connections"),
      host_metrics: db.collection("host_metrics"),
      container_metrics: db.collection("container_metrics"),
      logs: db.collection("logs"),
      alert_rules: db.collection("alert_rules"),
      alerts: db.collection("alerts"),
      alert_channels: db.collection("alert_channels"),
      log_sinks: db.collection("log_sinks"),
      db,
    };

    client
      .ensure_indexes()
      .await
      .context("failed to ensure database indexes")?;

    Ok(client)
  }

  /// Indexes named in §6: composite-key lookups for the hot ingest path,
  /// plus `(host_id, timestamp)` for the two time-series collections and
  /// the alert list's common filter columns.
  async fn ensure_indexes(&self) -> anyhow::Result<()> {
    unique_index(&self.hosts, doc! { "id": 1 }).await?;
    unique_index(&self.containers, doc! { "id": 1 }).await?;
    index(&self.containers, doc! { "host_id": 1 }).await?;
    index(&self.networks, doc! { "host_id": 1 }).await?;
    index(&self.connections, doc! { "source_host_id": 1 }).await?;
    index(
      &self.host_metrics,
      doc! { "host_id": 1, "timestamp": 1 },
    )
    .await?;
    index(
      &self.container_metrics,
      doc! { "container_id": 1, "timestamp": 1 },
    )
    .await?;
    index(&self.logs, doc! { "host_id": 1, "timestamp": 1 }).await?;
    index(
      &self.logs,
      doc! { "container_id": 1, "timestamp": 1 },
    )
    .await?;
    unique_index(&self.alert_rules, doc! { "id": 1 }).await?;
    unique_index(&self.alerts, doc! { "id": 1 }).await?;
    index(&self.alerts, doc! { "status": 1 }).await?;
    index(&self.alerts, doc! { "severity": 1 }).await?;
    index(&self.alerts, doc! { "triggered_at": 1 }).await?;
    index(&self.alerts, doc! { "rule_id": 1 }).await?;
    unique_index(&self.alert_channels, doc! { "id": 1 }).await?;
    unique_index(&self.log_sinks, doc! { "id": 1 }).await?;
    Ok(())
  }
}

async fn index<T: Send + Sync>(
  coll: &Collection<T>,
  keys: mungos::mongodb::bson::Document,
) -> anyhow::Result<()> {
  coll
    .create_index(IndexModel::builder().keys(keys).build())
    .await
    .map(|_| ())
    .context("failed to create index")
}

async fn unique_index<T: Send + Sync>(
  coll: &Collection<T>,
  keys: mungos::mongodb::bson::Document,
) -> anyhow::Result<()> {
  coll
    .create_index(
      IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build(),
    )
    .await
    .map(|_| ())
    .context("failed to create unique index")
}
