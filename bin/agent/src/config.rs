//! Environment-driven configuration (§6). Every field has a default, so the
//! agent runs unconfigured against `localhost:8420` out of the box; an
//! operator overrides via `MAPPER_AGENT_*` environment variables.

use std::sync::OnceLock;

use infra_mapper_client::config::agent::{AgentConfig, CaptureMode};
use serde::Deserialize;

/// Mirrors [AgentConfig] with every field optional, so `envy` only
/// overrides what the operator actually set.
#[derive(Debug, Default, Deserialize)]
struct Env {
  backend_url: Option<String>,
  api_key: Option<String>,
  agent_id: Option<String>,
  hostname: Option<String>,
  scan_interval_seconds: Option<u32>,
  docker_socket: Option<String>,
  compose_search_paths: Option<Vec<String>>,
  overlay_detection_enabled: Option<bool>,
  capture_enabled: Option<bool>,
  capture_mode: Option<CaptureMode>,
  capture_duration_seconds: Option<u32>,
  capture_interval_seconds: Option<u32>,
  capture_max_packets_per_container: Option<u32>,
  log_collection_enabled: Option<bool>,
  log_lines: Option<u32>,
  log_since_seconds: Option<u32>,
  command_server_enabled: Option<bool>,
  command_server_port: Option<u16>,
}

pub fn agent_config() -> &'static AgentConfig {
  static CONFIG: OnceLock<AgentConfig> = OnceLock::new();
  CONFIG.get_or_init(|| {
    let _ = dotenvy::dotenv();
    let env: Env = envy::prefixed("MAPPER_AGENT_")
      .from_env()
      .expect("failed to parse agent environment");
    let default = AgentConfig::default();

    AgentConfig {
      backend_url: env.backend_url.unwrap_or(default.backend_url),
      api_key: env.api_key.unwrap_or(default.api_key),
      agent_id: env.agent_id.or(default.agent_id),
      hostname: env.hostname.or(default.hostname),
      scan_interval_seconds: env
        .scan_interval_seconds
        .unwrap_or(default.scan_interval_seconds),
      docker_socket: env.docker_socket.unwrap_or(default.docker_socket),
      compose_search_paths: env
        .compose_search_paths
        .unwrap_or(default.compose_search_paths),
      overlay_detection_enabled: env
        .overlay_detection_enabled
        .unwrap_or(default.overlay_detection_enabled),
      capture_enabled: env.capture_enabled.unwrap_or(default.capture_enabled),
      capture_mode: env.capture_mode.unwrap_or(default.capture_mode),
      capture_duration_seconds: env
        .capture_duration_seconds
        .unwrap_or(default.capture_duration_seconds),
      capture_interval_seconds: env
        .capture_interval_seconds
        .unwrap_or(default.capture_interval_seconds),
      capture_max_packets_per_container: env
        .capture_max_packets_per_container
        .unwrap_or(default.capture_max_packets_per_container),
      log_collection_enabled: env
        .log_collection_enabled
        .unwrap_or(default.log_collection_enabled),
      log_lines: env.log_lines.unwrap_or(default.log_lines),
      log_since_seconds: env
        .log_since_seconds
        .unwrap_or(default.log_since_seconds),
      command_server_enabled: env
        .command_server_enabled
        .unwrap_or(default.command_server_enabled),
      command_server_port: env
        .command_server_port
        .unwrap_or(default.command_server_port),
      logging: default.logging,
    }
  })
}

/// Stable per-machine identity (§3): `hostname + machine-id-prefix`, falling
/// back to `hostname + hash(hostname)` when no machine id file is readable.
/// Cached for the process lifetime so every tick reports the same id even
/// if `/etc/machine-id` becomes unreadable later.
pub fn agent_id() -> &'static str {
  static AGENT_ID: OnceLock<String> = OnceLock::new();
  AGENT_ID.get_or_init(|| {
    if let Some(configured) = agent_config().agent_id.as_deref() {
      return configured.to_string();
    }
    let hostname = resolved_hostname();
    let suffix = machine_id_prefix().unwrap_or_else(|| hash_suffix(&hostname));
    format!("{hostname}-{suffix}")
  })
}

pub fn resolved_hostname() -> String {
  if let Some(configured) = agent_config().hostname.clone() {
    return configured;
  }
  std::fs::read_to_string("/proc/sys/kernel/hostname")
    .ok()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| "unknown-host".to_string())
}

fn machine_id_prefix() -> Option<String> {
  for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
    if let Ok(contents) = std::fs::read_to_string(path) {
      let trimmed = contents.trim();
      if !trimmed.is_empty() {
        return Some(trimmed.chars().take(8).collect());
      }
    }
  }
  None
}

fn hash_suffix(hostname: &str) -> String {
  use std::hash::{Hash, Hasher};
  let mut hasher = std::collections::hash_map::DefaultHasher::new();
  hostname.hash(&mut hasher);
  format!("{:08x}", hasher.finish() as u32)
}
