use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Redaction marker substituted for the value of any environment variable
/// whose upper-cased key contains PASSWORD, SECRET, KEY, or TOKEN.
pub const REDACTED_MARKER: &str = "***HIDDEN***";

const REDACTED_KEY_SUBSTRINGS: &[&str] =
  &["PASSWORD", "SECRET", "KEY", "TOKEN"];

/// Scrubs a container's raw environment in place, per §3/§8's security
/// invariant. Operates on the already key=value-split map so collectors
/// and tests can exercise it directly.
pub fn redact_environment(
  env: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, String> {
  env
    .into_iter()
    .map(|(key, value)| {
      let upper = key.to_uppercase();
      if REDACTED_KEY_SUBSTRINGS.iter().any(|s| upper.contains(s)) {
        (key, REDACTED_MARKER.to_string())
      } else {
        (key, value)
      }
    })
    .collect()
}

/// A running or stopped container on a host. Identity is
/// `<host_id>:<short_container_id>`; short ids are the first 12 hex
/// characters of the runtime-assigned id and are not globally unique on
/// their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
  /// `<host_id>:<short_id>`
  pub id: String,
  pub host_id: String,
  /// First 12 hex chars of the runtime id.
  pub short_id: String,
  pub name: String,
  pub image: String,
  pub status: ContainerStatus,
  pub health: ContainerHealth,
  /// network name -> ip address
  pub networks: HashMap<String, String>,
  pub ports: Vec<PortMapping>,
  pub mounts: Vec<String>,
  pub labels: HashMap<String, String>,
  /// Already scrubbed via [redact_environment].
  pub environment: HashMap<String, String>,
  pub compose_project: Option<String>,
  pub compose_service: Option<String>,
  pub declared_dependencies: Vec<String>,
  pub created_at: i64,
}

impl Container {
  pub fn compose_key(&self) -> Option<(&str, &str)> {
    match (&self.compose_project, &self.compose_service) {
      (Some(p), Some(s)) => Some((p.as_str(), s.as_str())),
      _ => None,
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
  Running,
  Stopped,
  Paused,
  Restarting,
  Exited,
  Dead,
  Created,
  Unknown,
}

impl ContainerStatus {
  pub fn is_stopped_like(&self) -> bool {
    matches!(
      self,
      ContainerStatus::Stopped
        | ContainerStatus::Exited
        | ContainerStatus::Dead
    )
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ContainerHealth {
  Healthy,
  Unhealthy,
  Starting,
  #[default]
  None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
  pub host_port: Option<u16>,
  pub container_port: u16,
  pub protocol: String,
}

/// First 12 hex chars of a full runtime-assigned container id.
pub fn short_container_id(full_id: &str) -> String {
  full_id.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn redacts_matching_keys_case_insensitively() {
    let env = redact_environment([
      ("DB_HOST".to_string(), "db".to_string()),
      ("DB_PASSWORD".to_string(), "hunter2".to_string()),
      ("API_TOKEN".to_string(), "xyz".to_string()),
      ("LOG_LEVEL".to_string(), "info".to_string()),
      ("db_secret_key".to_string(), "s".to_string()),
    ]);
    assert_eq!(env["DB_HOST"], "db");
    assert_eq!(env["DB_PASSWORD"], REDACTED_MARKER);
    assert_eq!(env["API_TOKEN"], REDACTED_MARKER);
    assert_eq!(env["LOG_LEVEL"], "info");
    assert_eq!(env["db_secret_key"], REDACTED_MARKER);
  }

  #[test]
  fn short_id_takes_first_12_chars() {
    assert_eq!(
      short_container_id("abcdef0123456789"),
      "abcdef012345"
    );
  }
}
