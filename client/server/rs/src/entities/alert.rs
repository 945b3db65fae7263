use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An admin-managed rule the evaluator (C8) scans against on every ingest.
/// Mutated only by operators, never by the evaluator itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
  pub id: String,
  pub name: String,
  pub rule_type: RuleType,
  pub severity: Severity,
  pub enabled: bool,
  /// Shape depends on `rule_type`; see [RuleConfig].
  pub config: Value,
  pub host_filter: Option<String>,
  pub container_filter: Option<String>,
  pub project_filter: Option<String>,
  pub cooldown_minutes: u32,
  pub created_at: i64,
  pub updated_at: i64,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
  HostOffline,
  ContainerStopped,
  ContainerUnhealthy,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Info,
  Warning,
  Critical,
}

/// `config` deserialized per `rule_type` (§4.8). Kept separate from
/// [AlertRule] because the admin-CRUD surface stores it as an opaque JSON
/// bag (§9's "parse the polymorphic config bag at the JSON boundary").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostOfflineConfig {
  pub timeout_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStoppedConfig {
  #[serde(default)]
  pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerUnhealthyConfig {
  #[serde(default)]
  pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
  pub id: String,
  pub rule_id: String,
  pub rule_type: RuleType,
  pub severity: Severity,
  pub status: AlertStatus,
  pub title: String,
  pub message: String,
  /// Host(s) the alert concerns; for `host_offline` this is always one.
  pub host_ids: Vec<String>,
  /// `<host_id>:<short_id>` container ids the alert concerns.
  pub container_ids: Vec<String>,
  /// Free-form evidence snapshot (e.g. `last_seen`, `status`) for the UI.
  pub context: Value,
  pub triggered_at: i64,
  pub resolved_at: Option<i64>,
  pub acknowledged_at: Option<i64>,
  pub notifications_sent: Vec<NotificationAttempt>,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
  Active,
  Acknowledged,
  Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAttempt {
  pub channel_id: String,
  pub channel_type: String,
  pub sent_at: i64,
  pub success: bool,
  pub error: Option<String>,
}

impl Alert {
  /// (rule, host) firing identity used for cooldown and active-alert
  /// lookups; container-scoped rules use the first container id instead.
  pub fn resource_key(&self) -> String {
    if let Some(host) = self.host_ids.first() {
      host.clone()
    } else {
      self.container_ids.first().cloned().unwrap_or_default()
    }
  }

  pub fn is_open(&self) -> bool {
    matches!(
      self.status,
      AlertStatus::Active | AlertStatus::Acknowledged
    )
  }
}

/// One offline-host candidate found by the `host_offline` rule scan,
/// carried through to alert context construction.
#[derive(Debug, Clone)]
pub struct OfflineHostCandidate {
  pub host_id: String,
  pub hostname: String,
  pub last_seen: i64,
}

pub fn host_offline_title(hostname: &str) -> String {
  format!("Host offline: {hostname}")
}

pub fn container_stopped_title(
  container_name: &str,
  status: &str,
) -> String {
  format!("Container {container_name} is {status}")
}

pub fn container_unhealthy_title(container_name: &str) -> String {
  format!("Container {container_name} is unhealthy")
}

/// A convenience map of rule-evaluation outcomes, for the "evaluate-now"
/// endpoint's response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationStats {
  pub rules_evaluated: u32,
  pub alerts_fired: u32,
  pub alerts_resolved: u32,
}
