use serde::{Deserialize, Serialize};

/// An agent-bearing machine. Identity is the agent's self-reported
/// `agent_id`, which must survive reboots as long as machine identity does
/// (hostname + a machine-id prefix, falling back to a hash of the hostname
/// alone when no machine id is readable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
  /// Stable identity, also the primary key.
  pub id: String,
  pub hostname: String,
  /// All IPs observed on the host's non-loopback interfaces.
  pub ips: Vec<String>,
  pub overlay_ip: Option<String>,
  pub overlay_hostname: Option<String>,
  pub docker_version: Option<String>,
  pub os: Option<String>,
  pub os_version: Option<String>,
  pub kernel_version: Option<String>,
  /// Bearer-token-reachable port for the agent's command server, if enabled.
  pub command_port: Option<u16>,

  pub first_seen: i64,
  pub last_seen: i64,
  pub is_online: bool,

  /// Interval the agent is configured to report at, in seconds. Used by
  /// the health sweep to scale its staleness thresholds.
  pub report_interval_seconds: Option<u32>,

  pub reports_count: u64,
  pub errors_count: u64,
  pub consecutive_failures: u32,
  pub last_error: Option<String>,
  pub last_error_at: Option<i64>,
  pub last_report_duration_ms: Option<i64>,
  pub avg_report_duration_ms: Option<i64>,

  pub agent_health: AgentHealth,
}

impl Host {
  /// The address the server should dial to reach this host's agent command
  /// server: overlay IP if present, else the first LAN IP.
  pub fn reachable_ip(&self) -> Option<&str> {
    self
      .overlay_ip
      .as_deref()
      .or_else(|| self.ips.first().map(String::as_str))
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
  #[default]
  Unknown,
  Healthy,
  Degraded,
  Unhealthy,
}

/// Mutable fields of a Host carried by a report, used to upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
  pub agent_id: String,
  pub hostname: String,
  pub ips: Vec<String>,
  pub overlay_ip: Option<String>,
  pub overlay_hostname: Option<String>,
  pub docker_version: Option<String>,
  pub os: Option<String>,
  pub os_version: Option<String>,
  pub kernel_version: Option<String>,
  pub command_port: Option<u16>,
}
