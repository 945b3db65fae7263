//! Host and container resource sampling (§4.1.4). Host-level uses
//! `sysinfo`; container-level uses bollard's one-shot stats stream. Missing
//! keys are silently treated as null rather than failing the whole sample
//! (§7 "partial evidence failure" applies here too, just at field
//! granularity instead of per-item).

use bollard::{Docker, query_parameters::StatsOptions};
use futures_util::StreamExt;
use infra_mapper_client::entities::{
  container::short_container_id,
  metrics::{ContainerMetricsPoint, HostMetricsPoint, centi, percent},
};
use sysinfo::System;
use tracing::debug;

pub async fn sample_host(host_id: &str) -> HostMetricsPoint {
  let mut sys = System::new_all();
  sys.refresh_all();

  let load = System::load_average();
  let disks = sysinfo::Disks::new_with_refreshed_list();
  let root_disk = disks
    .iter()
    .find(|d| d.mount_point() == std::path::Path::new("/"))
    .or_else(|| disks.iter().next());
  let (disk_total_mb, disk_used_mb, disk_percent) = match root_disk {
    Some(d) => {
      let total = d.total_space();
      let used = total.saturating_sub(d.available_space());
      let percent = if total > 0 {
        Some(used as f64 / total as f64 * 100.0)
      } else {
        None
      };
      (
        Some(total / 1024 / 1024),
        Some(used / 1024 / 1024),
        percent,
      )
    }
    None => (None, None, None),
  };

  let networks = sysinfo::Networks::new_with_refreshed_list();
  let (rx, tx) = networks.iter().fold((0u64, 0u64), |(rx, tx), (_, n)| {
    (rx + n.total_received(), tx + n.total_transmitted())
  });

  let memory_total = sys.total_memory();
  let memory_used = sys.used_memory();

  HostMetricsPoint {
    host_id: host_id.to_string(),
    timestamp: chrono::Utc::now().timestamp_millis(),
    cpu_percent: percent(Some(sys.global_cpu_usage() as f64)),
    cpu_count: Some(sys.cpus().len() as u32),
    load_1m_centi: centi(Some(load.one)),
    load_5m_centi: centi(Some(load.five)),
    load_15m_centi: centi(Some(load.fifteen)),
    memory_total_mb: Some(memory_total / 1024 / 1024),
    memory_used_mb: Some(memory_used / 1024 / 1024),
    memory_percent: percent(if memory_total > 0 {
      Some(memory_used as f64 / memory_total as f64 * 100.0)
    } else {
      None
    }),
    disk_total_mb,
    disk_used_mb,
    disk_percent: percent(disk_percent),
    network_rx_bytes: Some(rx),
    network_tx_bytes: Some(tx),
  }
}

/// One-shot (non-streaming) stats sample for a single container. CPU
/// percent is derived as `(Δcontainer_cpu / Δsystem_cpu) × online_cpus ×
/// 100`, guarded against divide-by-zero (§4.1.4).
pub async fn sample_container(
  docker: &Docker,
  host_id: &str,
  full_container_id: &str,
) -> Option<ContainerMetricsPoint> {
  let mut stream = docker.stats(
    full_container_id,
    Some(StatsOptions { stream: false, one_shot: true }),
  );
  let stats = match stream.next().await {
    Some(Ok(stats)) => stats,
    Some(Err(e)) => {
      debug!(container_id = full_container_id, error = %e, "failed to sample container stats");
      return None;
    }
    None => return None,
  };

  let cpu_delta = stats
    .cpu_stats
    .as_ref()
    .and_then(|c| c.cpu_usage.as_ref())
    .and_then(|u| u.total_usage)
    .unwrap_or(0)
    .saturating_sub(
      stats
        .precpu_stats
        .as_ref()
        .and_then(|c| c.cpu_usage.as_ref())
        .and_then(|u| u.total_usage)
        .unwrap_or(0),
    );
  let system_delta = stats
    .cpu_stats
    .as_ref()
    .and_then(|c| c.system_cpu_usage)
    .unwrap_or(0)
    .saturating_sub(
      stats.precpu_stats.as_ref().and_then(|c| c.system_cpu_usage).unwrap_or(0),
    );
  let online_cpus = stats
    .cpu_stats
    .as_ref()
    .and_then(|c| c.online_cpus)
    .filter(|n| *n > 0)
    .or_else(|| {
      stats
        .cpu_stats
        .as_ref()
        .and_then(|c| c.cpu_usage.as_ref())
        .and_then(|u| u.percpu_usage.as_ref())
        .map(|v| v.len() as u64)
    })
    .unwrap_or(1);

  let cpu_percent_centi = if system_delta > 0 && cpu_delta > 0 {
    Some(
      (cpu_delta as f64 / system_delta as f64 * online_cpus as f64 * 100.0
        * 100.0)
        .round() as i64,
    )
  } else {
    None
  };

  let memory_used_bytes = stats.memory_stats.as_ref().and_then(|m| m.usage);
  let memory_limit_bytes = stats.memory_stats.as_ref().and_then(|m| m.limit);
  let memory_percent_centi = centi(match (memory_used_bytes, memory_limit_bytes) {
    (Some(used), Some(limit)) if limit > 0 => {
      Some(used as f64 / limit as f64 * 100.0)
    }
    _ => None,
  });

  let (network_rx_bytes, network_tx_bytes) = stats
    .networks
    .as_ref()
    .map(|nets| {
      nets.values().fold((0u64, 0u64), |(rx, tx), n| {
        (
          rx + n.rx_bytes.unwrap_or(0),
          tx + n.tx_bytes.unwrap_or(0),
        )
      })
    })
    .map(|(rx, tx)| (Some(rx), Some(tx)))
    .unwrap_or((None, None));

  let (disk_read_bytes, disk_write_bytes) = stats
    .blkio_stats
    .as_ref()
    .and_then(|b| b.io_service_bytes_recursive.as_ref())
    .map(|entries| {
      entries.iter().fold((0u64, 0u64), |(r, w), e| {
        match e.op.as_deref() {
          Some("Read") => (r + e.value.unwrap_or(0), w),
          Some("Write") => (r, w + e.value.unwrap_or(0)),
          _ => (r, w),
        }
      })
    })
    .map(|(r, w)| (Some(r), Some(w)))
    .unwrap_or((None, None));

  let pids = stats.pids_stats.as_ref().and_then(|p| p.current).map(|p| p as u32);

  Some(ContainerMetricsPoint {
    container_id: format!(
      "{host_id}:{}",
      short_container_id(full_container_id)
    ),
    host_id: host_id.to_string(),
    timestamp: chrono::Utc::now().timestamp_millis(),
    cpu_percent_centi,
    memory_used_bytes,
    memory_limit_bytes,
    memory_percent_centi,
    network_rx_bytes,
    network_tx_bytes,
    disk_read_bytes,
    disk_write_bytes,
    pids,
  })
}
