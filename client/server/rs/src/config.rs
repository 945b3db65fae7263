//! Config entity shapes shared between each binary's own `config` module
//! (env/CLI parsing, layered file loading) and anything that needs to
//! serialize a sanitized view of the running config (e.g. startup logging).
//! Mirrors the teacher's `entities::config::{periphery,core}` split.

use serde::{Deserialize, Serialize};

use crate::entities::logger::LogConfig;

pub mod agent {
  use super::*;

  #[derive(Debug, Clone, Serialize, Deserialize)]
  pub struct AgentConfig {
    pub backend_url: String,
    pub api_key: String,
    pub agent_id: Option<String>,
    pub hostname: Option<String>,
    pub scan_interval_seconds: u32,
    pub docker_socket: String,
    /// Directories searched for compose manifests (§4.2).
    pub compose_search_paths: Vec<String>,

    pub overlay_detection_enabled: bool,

    pub capture_enabled: bool,
    pub capture_mode: CaptureMode,
    pub capture_duration_seconds: u32,
    pub capture_interval_seconds: u32,
    pub capture_max_packets_per_container: u32,

    pub log_collection_enabled: bool,
    pub log_lines: u32,
    pub log_since_seconds: u32,

    pub command_server_enabled: bool,
    pub command_server_port: u16,

    pub logging: LogConfig,
  }

  impl Default for AgentConfig {
    fn default() -> Self {
      Self {
        backend_url: "http://localhost:8420".to_string(),
        api_key: String::new(),
        agent_id: None,
        hostname: None,
        scan_interval_seconds: 30,
        docker_socket: "/var/run/docker.sock".to_string(),
        compose_search_paths: vec!["/opt".to_string(), "/srv".to_string()],
        overlay_detection_enabled: true,
        capture_enabled: true,
        capture_mode: CaptureMode::Intermittent,
        capture_duration_seconds: 10,
        capture_interval_seconds: 300,
        capture_max_packets_per_container: 200,
        log_collection_enabled: true,
        log_lines: 100,
        log_since_seconds: 120,
        command_server_enabled: true,
        command_server_port: 8421,
        logging: LogConfig::default(),
      }
    }
  }

  impl AgentConfig {
    /// Strips the API key before the config is ever logged.
    pub fn sanitized(&self) -> Self {
      let mut copy = self.clone();
      if !copy.api_key.is_empty() {
        copy.api_key = "***".to_string();
      }
      copy
    }
  }

  #[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  )]
  #[serde(rename_all = "snake_case")]
  pub enum CaptureMode {
    Active,
    #[default]
    Intermittent,
  }
}

pub mod server {
  use super::*;

  #[derive(Debug, Clone, Serialize, Deserialize)]
  pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Bearer token(s) accepted from reporting agents. An agent authenticates
    /// with `Authorization: Bearer <api-key>` (§6); any key in this list is
    /// valid, which is how operators roll keys without downtime.
    pub api_keys: Vec<String>,
    pub database_uri: String,
    pub database_name: String,

    pub metrics_retention_days: u32,
    pub logs_retention_days: u32,

    pub health_sweep_interval_seconds: u32,
    /// §4.7 sweep defaults: offline host filter excludes hosts silent past
    /// this many minutes unless `include_offline=true` is requested (§4.6).
    pub offline_threshold_minutes: u32,

    pub agent_command_timeout_seconds: u64,
    pub notifier_timeout_seconds: u64,
    pub log_sink_timeout_seconds: u64,

    pub logging: LogConfig,
  }

  impl Default for ServerConfig {
    fn default() -> Self {
      Self {
        bind_address: "0.0.0.0".to_string(),
        port: 8420,
        api_keys: Vec::new(),
        database_uri: "mongodb://localhost:27017".to_string(),
        database_name: "infra_mapper".to_string(),
        metrics_retention_days: 7,
        logs_retention_days: 3,
        health_sweep_interval_seconds: 30,
        offline_threshold_minutes: 5,
        agent_command_timeout_seconds: 60,
        notifier_timeout_seconds: 30,
        log_sink_timeout_seconds: 30,
        logging: LogConfig::default(),
      }
    }
  }

  impl ServerConfig {
    pub fn sanitized(&self) -> Self {
      let mut copy = self.clone();
      copy.api_keys = copy.api_keys.iter().map(|_| "***".to_string()).collect();
      copy.database_uri = "***".to_string();
      copy
    }
  }
}
