//! Container log tail collection (§4.1.5). Stdout and stderr are fetched as
//! two separate bounded reads (Docker interleaves them unreliably otherwise),
//! each line split on the first space into Docker's injected RFC3339Nano
//! timestamp and the message body, then truncated at 5000 chars before the
//! report leaves the agent (the server applies its own, larger, truncation
//! on persistence).

use bollard::{Docker, query_parameters::LogsOptions};
use chrono::Utc;
use futures_util::StreamExt;
use infra_mapper_client::entities::{
  container::short_container_id,
  log::{ContainerLogEntry, LogStream},
};
use tracing::debug;

/// Message bodies longer than this are truncated agent-side (§4.1.5); the
/// server's own, larger, limit is applied separately on ingest.
const MAX_AGENT_LOG_MESSAGE_CHARS: usize = 5000;

pub async fn collect_logs(
  docker: &Docker,
  host_id: &str,
  container_id: &str,
  lines: u32,
  since_seconds: u32,
) -> Vec<ContainerLogEntry> {
  let mut entries = Vec::new();
  let since = Utc::now().timestamp() - i64::from(since_seconds);

  for (stdout, stderr, stream) in
    [(true, false, LogStream::Stdout), (false, true, LogStream::Stderr)]
  {
    let raw = fetch_stream(docker, container_id, lines, since, stdout, stderr)
      .await;
    for line in raw.lines() {
      if line.trim().is_empty() {
        continue;
      }
      entries.push(parse_log_line(host_id, container_id, line, stream));
    }
  }
  entries
}

async fn fetch_stream(
  docker: &Docker,
  container_id: &str,
  lines: u32,
  since: i64,
  stdout: bool,
  stderr: bool,
) -> String {
  let options = LogsOptions {
    stdout,
    stderr,
    tail: lines.to_string(),
    since,
    timestamps: true,
    ..Default::default()
  };

  let mut stream = docker.logs(container_id, Some(options));
  let mut out = String::new();
  while let Some(chunk) = stream.next().await {
    match chunk {
      Ok(log) => out.push_str(&log.to_string()),
      Err(e) => {
        debug!(container_id, error = %e, "log stream ended with error");
        break;
      }
    }
  }
  out
}

fn parse_log_line(
  host_id: &str,
  container_id: &str,
  line: &str,
  stream: LogStream,
) -> ContainerLogEntry {
  let (timestamp, message) = match line.split_once(' ') {
    Some((ts, rest)) => match chrono::DateTime::parse_from_rfc3339(ts) {
      Ok(parsed) => (parsed.timestamp_millis(), rest),
      Err(_) => (Utc::now().timestamp_millis(), line),
    },
    None => (Utc::now().timestamp_millis(), line),
  };

  let mut message = message.to_string();
  if message.len() > MAX_AGENT_LOG_MESSAGE_CHARS {
    message.truncate(MAX_AGENT_LOG_MESSAGE_CHARS);
    message.push_str("...");
  }

  ContainerLogEntry {
    container_id: format!("{host_id}:{}", short_container_id(container_id)),
    host_id: host_id.to_string(),
    timestamp,
    stream,
    message,
  }
}

/// Plain last-N-lines tail used by the dependency inferrer's log heuristic
/// (§4.2), not the report path: stdout and stderr interleaved, no timestamp
/// parsing.
pub async fn tail_raw(
  docker: &Docker,
  container_id: &str,
  lines: u32,
) -> anyhow::Result<String> {
  let options = LogsOptions {
    stdout: true,
    stderr: true,
    tail: lines.to_string(),
    timestamps: false,
    ..Default::default()
  };

  let mut stream = docker.logs(container_id, Some(options));
  let mut out = String::new();
  while let Some(chunk) = stream.next().await {
    out.push_str(&chunk?.to_string());
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncates_long_messages() {
    let line = format!("2024-01-15T10:30:45.123456789Z {}", "x".repeat(6000));
    let entry = parse_log_line("host1", "abc123456789", &line, LogStream::Stdout);
    assert!(entry.message.ends_with("..."));
    assert_eq!(entry.message.len(), MAX_AGENT_LOG_MESSAGE_CHARS + 3);
  }

  #[test]
  fn falls_back_to_now_when_no_timestamp_prefix() {
    let entry =
      parse_log_line("host1", "abc123456789", "no timestamp here", LogStream::Stderr);
    assert_eq!(entry.message, "no timestamp here");
  }
}
