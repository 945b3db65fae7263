use serde::{Deserialize, Serialize};

/// Messages longer than this are truncated before persistence (§3).
pub const MAX_LOG_MESSAGE_BYTES: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerLogEntry {
  /// `<host_id>:<short_id>`
  pub container_id: String,
  pub host_id: String,
  pub timestamp: i64,
  pub stream: LogStream,
  pub message: String,
}

impl ContainerLogEntry {
  pub fn truncate_message(mut self) -> Self {
    if self.message.len() > MAX_LOG_MESSAGE_BYTES {
      let mut truncated = self
        .message
        .chars()
        .take(MAX_LOG_MESSAGE_BYTES)
        .collect::<String>();
      truncated.push('…');
      self.message = truncated;
    }
    self
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
  Stdout,
  Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsStats {
  pub total: u64,
  pub stdout: u64,
  pub stderr: u64,
  pub oldest: Option<i64>,
  pub newest: Option<i64>,
}
