use tracing::info;

mod alerts;
mod api;
mod broadcast;
mod config;
mod graph;
mod health;
mod ingest;
mod logsink;
mod notify;
mod relay;
mod retention;
mod state;

use config::server_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = server_config();
  logger::init(&config.logging)?;
  info!(config = ?config.sanitized(), "starting infra-mapper server");

  state::init_db_client().await;

  health::spawn_sweep_loop(config.health_sweep_interval_seconds as u64);
  retention::spawn_retention_loop(
    config.metrics_retention_days,
    config.logs_retention_days,
  );

  let addr = format!("{}:{}", config.bind_address, config.port);
  let listener = tokio::net::TcpListener::bind(&addr).await?;
  info!(address = addr, "listening");
  axum::serve(listener, api::router()).await?;

  Ok(())
}
