//! Environment-driven configuration (§10.3). Layering mirrors the agent's:
//! compiled defaults, overridden by `MAPPER_SERVER_*` env vars. Secret
//! fields accept the `*_FILE` indirection so operators can mount them from
//! Docker/Kubernetes secrets instead of plaintext env.

use std::sync::OnceLock;

use environment_file::{maybe_read_item_from_file, maybe_read_list_from_file};
use infra_mapper_client::config::server::ServerConfig;
use serde::Deserialize;

/// Mirrors [ServerConfig] with every field optional, so `envy` only
/// overrides what the operator actually set.
#[derive(Debug, Default, Deserialize)]
struct Env {
  bind_address: Option<String>,
  port: Option<u16>,
  api_keys: Option<Vec<String>>,
  api_keys_file: Option<String>,
  database_uri: Option<String>,
  database_uri_file: Option<String>,
  database_name: Option<String>,
  metrics_retention_days: Option<u32>,
  logs_retention_days: Option<u32>,
  health_sweep_interval_seconds: Option<u32>,
  offline_threshold_minutes: Option<u32>,
  agent_command_timeout_seconds: Option<u64>,
  notifier_timeout_seconds: Option<u64>,
  log_sink_timeout_seconds: Option<u64>,
}

pub fn server_config() -> &'static ServerConfig {
  static CONFIG: OnceLock<ServerConfig> = OnceLock::new();
  CONFIG.get_or_init(|| {
    let _ = dotenvy::dotenv();
    let env: Env = envy::prefixed("MAPPER_SERVER_")
      .from_env()
      .expect("failed to parse server environment");
    let default = ServerConfig::default();

    let api_keys = maybe_read_list_from_file(
      env.api_keys_file.as_deref(),
      env.api_keys,
    )
    .unwrap_or(default.api_keys);
    let database_uri = maybe_read_item_from_file(
      env.database_uri_file.as_deref(),
      env.database_uri,
    )
    .unwrap_or(default.database_uri);

    ServerConfig {
      bind_address: env.bind_address.unwrap_or(default.bind_address),
      port: env.port.unwrap_or(default.port),
      api_keys,
      database_uri,
      database_name: env.database_name.unwrap_or(default.database_name),
      metrics_retention_days: env
        .metrics_retention_days
        .unwrap_or(default.metrics_retention_days),
      logs_retention_days: env
        .logs_retention_days
        .unwrap_or(default.logs_retention_days),
      health_sweep_interval_seconds: env
        .health_sweep_interval_seconds
        .unwrap_or(default.health_sweep_interval_seconds),
      offline_threshold_minutes: env
        .offline_threshold_minutes
        .unwrap_or(default.offline_threshold_minutes),
      agent_command_timeout_seconds: env
        .agent_command_timeout_seconds
        .unwrap_or(default.agent_command_timeout_seconds),
      notifier_timeout_seconds: env
        .notifier_timeout_seconds
        .unwrap_or(default.notifier_timeout_seconds),
      log_sink_timeout_seconds: env
        .log_sink_timeout_seconds
        .unwrap_or(default.log_sink_timeout_seconds),
      logging: default.logging,
    }
  })
}

pub fn cors_layer() -> tower_http::cors::CorsLayer {
  tower_http::cors::CorsLayer::permissive()
}
