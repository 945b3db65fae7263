//! The agent loop (C4, §4.4): a single-threaded wall-clock scheduler. One
//! tick = one full report. Collection is serial within a tick; the only
//! parallelism is inside the packet-capture collector (§5).

use std::{
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use infra_mapper_client::entities::{
  connection::{ConnectionEvidence, merge_connection_evidence},
  container::ContainerStatus,
  host::HostReport,
  report::AgentMetadata,
};
use tracing::{error, info, warn};

use crate::{
  collectors::{
    capture::{CaptureTarget, PacketCapture},
    docker::DockerRuntime,
    logs, overlay, proc_net, resources,
  },
  config::{agent_config, agent_id, resolved_hostname},
  report::{self, TickEvidence},
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn spawn(
  docker: Arc<DockerRuntime>,
  capture: Arc<PacketCapture>,
) {
  let config = agent_config();
  let process_start = Instant::now();
  let last_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
  let http = reqwest::Client::builder()
    .timeout(Duration::from_secs(30))
    .build()
    .expect("failed to build http client");

  let mut interval = tokio::time::interval(Duration::from_secs(
    config.scan_interval_seconds as u64,
  ));
  interval.set_missed_tick_behavior(
    tokio::time::MissedTickBehavior::Delay,
  );

  loop {
    interval.tick().await;
    run_tick(&docker, &capture, &http, process_start, &last_error).await;
  }
}

async fn run_tick(
  docker: &DockerRuntime,
  capture: &PacketCapture,
  http: &reqwest::Client,
  process_start: Instant,
  last_error: &Arc<Mutex<Option<String>>>,
) {
  let config = agent_config();
  let collect_start = Instant::now();
  let host_id = agent_id().to_string();

  let containers = docker.collect_containers(&host_id).await;
  let networks = docker.collect_networks(&host_id).await;

  let proc_net_evidence = proc_net::scan();
  let tcpdump_evidence = if config.capture_enabled {
    let running = docker.running_container_ids().await;
    let mut targets = Vec::new();
    for full_id in running {
      if let Some(pid) = docker.main_pid(&full_id).await {
        targets.push(CaptureTarget {
          container_id: infra_mapper_client::entities::container::short_container_id(&full_id),
          pid,
        });
      }
    }
    capture.collect(targets).await
  } else {
    Vec::new()
  };

  let connections = merge_and_filter(proc_net_evidence, tcpdump_evidence);

  let mut container_logs = Vec::new();
  if config.log_collection_enabled {
    for container in containers.iter().filter(|c| c.status == ContainerStatus::Running) {
      let full_id = container.short_id.clone();
      container_logs.extend(
        logs::collect_logs(
          docker.docker(),
          &host_id,
          &full_id,
          config.log_lines,
          config.log_since_seconds,
        )
        .await,
      );
    }
  }

  let host_metrics = Some(resources::sample_host(&host_id).await);
  let mut container_metrics = Vec::new();
  for container in containers.iter().filter(|c| c.status == ContainerStatus::Running) {
    if let Some(point) =
      resources::sample_container(docker.docker(), &host_id, &container.short_id).await
    {
      container_metrics.push(point);
    }
  }

  let overlay = if config.overlay_detection_enabled {
    overlay::detect().await
  } else {
    crate::collectors::overlay::OverlayIdentity::default()
  };

  let host_report = HostReport {
    agent_id: host_id.clone(),
    hostname: resolved_hostname(),
    ips: local_ips(),
    overlay_ip: overlay.ip,
    overlay_hostname: overlay.hostname,
    docker_version: docker.version().await,
    os: Some(std::env::consts::OS.to_string()),
    os_version: None,
    kernel_version: None,
    command_port: config
      .command_server_enabled
      .then_some(config.command_server_port),
  };

  let report_duration_ms = collect_start.elapsed().as_millis() as i64;
  let uptime_seconds = process_start.elapsed().as_secs() as i64;
  let error = last_error.lock().unwrap().take();

  let agent_metadata = AgentMetadata {
    version: VERSION.to_string(),
    report_interval: config.scan_interval_seconds,
    report_duration_ms,
    uptime_seconds,
    error,
    command_port: config
      .command_server_enabled
      .then_some(config.command_server_port),
  };

  let evidence = TickEvidence {
    host: host_report,
    containers,
    networks,
    connections,
    container_logs,
    host_metrics,
    container_metrics,
  };

  let timestamp = chrono::Utc::now().timestamp_millis();
  match report::send(
    http,
    &config.backend_url,
    &config.api_key,
    evidence,
    agent_metadata,
    timestamp,
  )
  .await
  {
    Ok(stats) => {
      info!(
        containers = stats.containers,
        connections = stats.connections,
        alerts_fired = stats.alerts_fired,
        "report delivered"
      );
    }
    Err(message) => {
      warn!(error = %message, "report delivery failed, will surface on next tick");
      *last_error.lock().unwrap() = Some(message);
    }
  }
}

/// Merges proc_net and tcpdump evidence per §4.3 and drops anything the
/// merged key-space filters reject (LISTEN rows, loopback/0.0.0.0 peers;
/// §3, §8).
fn merge_and_filter(
  proc_net: Vec<ConnectionEvidence>,
  tcpdump: Vec<ConnectionEvidence>,
) -> Vec<ConnectionEvidence> {
  merge_connection_evidence(proc_net, tcpdump)
    .into_iter()
    .filter(|c| c.is_persistable())
    .collect()
}

fn local_ips() -> Vec<String> {
  let networks = sysinfo::Networks::new_with_refreshed_list();
  let mut ips = Vec::new();
  for (_name, data) in networks.iter() {
    for ip in data.ip_networks() {
      let addr = ip.addr.to_string();
      if !addr.starts_with("127.") && addr != "::1" && !ips.contains(&addr) {
        ips.push(addr);
      }
    }
  }
  if ips.is_empty() {
    error!("no non-loopback IPs discovered on this host");
  }
  ips
}
