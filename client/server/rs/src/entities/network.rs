use serde::{Deserialize, Serialize};

/// A Docker-level network on a host. Purely descriptive; wiped and
/// re-inserted on every report (no diffing, unlike containers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
  pub host_id: String,
  pub name: String,
  pub driver: String,
  pub scope: String,
  pub subnet: Option<String>,
  pub gateway: Option<String>,
  /// Short container ids attached to this network.
  pub member_container_ids: Vec<String>,
}
