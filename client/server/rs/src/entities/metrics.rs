use serde::{Deserialize, Serialize};

/// Host-level resource sample. Percentages are stored as integer whole
/// percents (e.g. `cpu_percent = 42` means `42%`); load averages are
/// stored as integer hundredths (e.g. `load_1m_centi = 150` means `1.50`).
/// Both are converted back to floats on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMetricsPoint {
  pub host_id: String,
  pub timestamp: i64,
  pub cpu_percent: Option<i64>,
  pub cpu_count: Option<u32>,
  pub load_1m_centi: Option<i64>,
  pub load_5m_centi: Option<i64>,
  pub load_15m_centi: Option<i64>,
  pub memory_total_mb: Option<u64>,
  pub memory_used_mb: Option<u64>,
  pub memory_percent: Option<i64>,
  pub disk_total_mb: Option<u64>,
  pub disk_used_mb: Option<u64>,
  pub disk_percent: Option<i64>,
  pub network_rx_bytes: Option<u64>,
  pub network_tx_bytes: Option<u64>,
}

/// Container-level resource sample. Percentages stored as integer
/// hundredths (e.g. `cpu_percent_centi = 4250` means `42.50`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetricsPoint {
  /// `<host_id>:<short_id>`
  pub container_id: String,
  pub host_id: String,
  pub timestamp: i64,
  pub cpu_percent_centi: Option<i64>,
  pub memory_used_bytes: Option<u64>,
  pub memory_limit_bytes: Option<u64>,
  pub memory_percent_centi: Option<i64>,
  pub network_rx_bytes: Option<u64>,
  pub network_tx_bytes: Option<u64>,
  pub disk_read_bytes: Option<u64>,
  pub disk_write_bytes: Option<u64>,
  pub pids: Option<u32>,
}

pub fn centi(value: Option<f64>) -> Option<i64> {
  value.map(|v| (v * 100.0).round() as i64)
}

pub fn from_centi(value: Option<i64>) -> Option<f64> {
  value.map(|v| v as f64 / 100.0)
}

pub fn percent(value: Option<f64>) -> Option<i64> {
  value.map(|v| v.round() as i64)
}

pub fn from_percent(value: Option<i64>) -> Option<f64> {
  value.map(|v| v as f64)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMetricsSummary {
  pub period_hours: u32,
  pub sample_count: u64,
  pub avg_cpu: Option<f64>,
  pub max_cpu: Option<f64>,
  pub avg_memory: Option<f64>,
  pub max_memory: Option<f64>,
  pub avg_disk: Option<f64>,
  pub max_disk: Option<f64>,
}
