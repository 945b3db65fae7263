//! In-namespace packet capture (§4.1.3). For each running container with a
//! resolvable main pid, spawns `nsenter -t <pid> -n tcpdump ...` to capture
//! inside that container's network namespace, bounded concurrency equal to
//! the container count, each worker hard-capped at `capture_duration + 5s`
//! (§5). Two modes: `active` captures every tick; `intermittent` only after
//! `capture_interval` has elapsed, otherwise the cached result is returned.

use std::{collections::HashSet, sync::Arc, time::Duration};

use command::{command_exists, run_command_with_timeout};
use futures_util::future::join_all;
use infra_mapper_client::{
  config::agent::CaptureMode,
  entities::connection::{ConnectionEvidence, Protocol, SourceMethod},
};
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct PacketCapture {
  available: bool,
  mode: CaptureMode,
  duration: Duration,
  interval: Duration,
  max_packets: u32,
  last_capture: Mutex<Option<tokio::time::Instant>>,
  cached: Mutex<Vec<ConnectionEvidence>>,
}

pub struct CaptureTarget {
  pub container_id: String,
  pub pid: i32,
}

impl PacketCapture {
  pub fn new(
    mode: CaptureMode,
    duration_seconds: u32,
    interval_seconds: u32,
    max_packets_per_container: u32,
  ) -> Self {
    let available = command_exists("nsenter") && command_exists("tcpdump");
    if !available {
      warn!(
        "nsenter or tcpdump not found on PATH, packet capture disabled (other evidence still flows)"
      );
    }
    Self {
      available,
      mode,
      duration: Duration::from_secs(duration_seconds as u64),
      interval: Duration::from_secs(interval_seconds as u64),
      max_packets: max_packets_per_container,
      last_capture: Mutex::new(None),
      cached: Mutex::new(Vec::new()),
    }
  }

  pub fn is_available(&self) -> bool {
    self.available
  }

  /// One concurrent worker per target, joined with a bounded wait. Targets
  /// with no resolvable pid are simply absent from `targets` by the caller.
  pub async fn collect(
    &self,
    targets: Vec<CaptureTarget>,
  ) -> Vec<ConnectionEvidence> {
    if !self.available || targets.is_empty() {
      return Vec::new();
    }

    if !self.should_capture_now().await {
      return self.cached.lock().await.clone();
    }

    let deadline = self.duration + Duration::from_secs(5);
    let max_packets = self.max_packets;
    let duration = self.duration;

    let futures = targets.into_iter().map(|target| {
      let deadline = deadline;
      async move {
        capture_one(&target, duration, max_packets, deadline).await
      }
    });

    let results = join_all(futures).await;
    let merged: Vec<ConnectionEvidence> = results.into_iter().flatten().collect();

    *self.cached.lock().await = merged.clone();
    *self.last_capture.lock().await = Some(tokio::time::Instant::now());
    merged
  }

  async fn should_capture_now(&self) -> bool {
    match self.mode {
      CaptureMode::Active => true,
      CaptureMode::Intermittent => {
        match *self.last_capture.lock().await {
          None => true,
          Some(last) => last.elapsed() >= self.interval,
        }
      }
    }
  }
}

async fn capture_one(
  target: &CaptureTarget,
  capture_duration: Duration,
  max_packets: u32,
  hard_deadline: Duration,
) -> Vec<ConnectionEvidence> {
  let pid = target.pid.to_string();
  let max_packets_arg = max_packets.to_string();
  let args = [
    "-t",
    &pid,
    "-n",
    "tcpdump",
    "-i",
    "any",
    "-nn",
    "-q",
    "-l",
    "-c",
    &max_packets_arg,
    "tcp or udp",
  ];

  let output = tokio::time::timeout(
    hard_deadline,
    run_command_with_timeout("nsenter", &args, capture_duration),
  )
  .await;

  let output = match output {
    Ok(output) => output,
    Err(_) => {
      debug!(container_id = %target.container_id, "capture exceeded hard deadline and was abandoned");
      return Vec::new();
    }
  };

  parse_tcpdump_output(&output.stdout, &target.container_id)
}

/// Parses `tcpdump -nn -q` text output, one line per packet:
/// `<ts> IP <src_ip>.<src_port> > <dst_ip>.<dst_port>: ...`. Deduplicates by
/// connection key within this single capture window and drops loopback-only
/// pairs (§4.1.3).
fn parse_tcpdump_output(
  stdout: &str,
  container_id: &str,
) -> Vec<ConnectionEvidence> {
  let pattern = Regex::new(
    r"(\d+\.\d+\.\d+\.\d+)\.(\d+)\s*>\s*(\d+\.\d+\.\d+\.\d+)\.(\d+):",
  )
  .expect("static regex");

  let mut seen = HashSet::new();
  let mut out = Vec::new();

  for line in stdout.lines() {
    if !line.contains('>') || (!line.contains(" IP ") && !line.contains(" IP6 ")) {
      continue;
    }
    let Some(caps) = pattern.captures(line) else { continue };
    let src_ip = caps[1].to_string();
    let Ok(src_port) = caps[2].parse::<u16>() else { continue };
    let dst_ip = caps[3].to_string();
    let Ok(dst_port) = caps[4].parse::<u16>() else { continue };

    if src_ip.starts_with("127.") && dst_ip.starts_with("127.") {
      continue;
    }

    let protocol = if line.to_lowercase().contains("udp") {
      Protocol::Udp
    } else {
      Protocol::Tcp
    };

    let key = (src_ip.clone(), src_port, dst_ip.clone(), dst_port, protocol);
    if !seen.insert(key) {
      continue;
    }

    out.push(ConnectionEvidence {
      container_id: Some(container_id.to_string()),
      local_ip: src_ip,
      local_port: src_port,
      remote_ip: dst_ip,
      remote_port: dst_port,
      protocol,
      state: "ESTABLISHED".to_string(),
      source_method: SourceMethod::Tcpdump,
    });
  }
  out
}

pub type SharedCapture = Arc<PacketCapture>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_ipv4_tcpdump_line() {
    let line = "12:00:00.000000 IP 172.17.0.2.54322 > 172.17.0.3.5432: Flags [S]";
    let parsed = parse_tcpdump_output(line, "abcdef012345");
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].local_ip, "172.17.0.2");
    assert_eq!(parsed[0].local_port, 54322);
    assert_eq!(parsed[0].remote_ip, "172.17.0.3");
    assert_eq!(parsed[0].remote_port, 5432);
    assert_eq!(parsed[0].protocol, Protocol::Tcp);
  }

  #[test]
  fn drops_loopback_to_loopback() {
    let line = "12:00:00.000000 IP 127.0.0.1.54322 > 127.0.0.1.5432: Flags [S]";
    assert!(parse_tcpdump_output(line, "c1").is_empty());
  }

  #[test]
  fn dedups_repeated_lines_within_one_capture() {
    let line = "12:00:00.000000 IP 10.0.0.1.1 > 10.0.0.2.2: Flags [S]\n12:00:00.100000 IP 10.0.0.1.1 > 10.0.0.2.2: Flags [.]";
    assert_eq!(parse_tcpdump_output(line, "c1").len(), 1);
  }
}
