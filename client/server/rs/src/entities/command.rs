use serde::{Deserialize, Serialize};

/// Wire contract between the server's remote command relay (C12) and an
/// agent's command server (§4.4, §4.12, §6): `POST /containers/{action}`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAction {
  Start,
  Stop,
  Restart,
  Exec,
  Stats,
  Logs,
}

impl ContainerAction {
  pub fn path_segment(self) -> &'static str {
    match self {
      ContainerAction::Start => "start",
      ContainerAction::Stop => "stop",
      ContainerAction::Restart => "restart",
      ContainerAction::Exec => "exec",
      ContainerAction::Stats => "stats",
      ContainerAction::Logs => "logs",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerActionRequest {
  /// Short container id; the server translates its surrogate
  /// `<host_id>:<short_id>` down to this before forwarding (§4.12).
  pub container_id: String,
  /// `exec` only.
  pub command: Option<String>,
  /// `logs` only.
  pub tail: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerActionResponse {
  pub success: bool,
  pub error: Option<String>,
  pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandServerHealth {
  pub status: &'static str,
}
