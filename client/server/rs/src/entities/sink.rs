use serde::{Deserialize, Serialize};

/// An external log destination. Like [crate::entities::channel::AlertChannel],
/// `config` is a closed variant keyed by `sink_type` (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSink {
  pub id: String,
  pub name: String,
  pub enabled: bool,
  #[serde(flatten)]
  pub config: SinkConfig,

  /// Non-empty: only forward logs from these host ids.
  #[serde(default)]
  pub filter_hosts: Vec<String>,
  /// Non-empty: only forward logs from these `<host_id>:<short_id>` containers.
  #[serde(default)]
  pub filter_containers: Vec<String>,
  /// Non-empty: only forward these streams.
  #[serde(default)]
  pub filter_streams: Vec<super::log::LogStream>,

  #[serde(default = "default_batch_size")]
  pub batch_size: u32,
  #[serde(default = "default_batch_interval")]
  pub batch_interval_seconds: u32,
  #[serde(default)]
  pub tls_skip_verify: bool,

  #[serde(default)]
  pub logs_sent: u64,
  #[serde(default)]
  pub errors_count: u64,
  pub last_success: Option<i64>,
  pub last_error: Option<i64>,
  pub last_error_message: Option<String>,
}

fn default_batch_size() -> u32 {
  500
}

fn default_batch_interval() -> u32 {
  10
}

impl LogSink {
  pub fn accepts_host(&self, host_id: &str) -> bool {
    self.filter_hosts.is_empty()
      || self.filter_hosts.iter().any(|h| h == host_id)
  }

  pub fn accepts_entry(
    &self,
    container_id: &str,
    stream: super::log::LogStream,
  ) -> bool {
    let container_ok = self.filter_containers.is_empty()
      || self.filter_containers.iter().any(|c| c == container_id);
    let stream_ok = self.filter_streams.is_empty()
      || self.filter_streams.contains(&stream);
    container_ok && stream_ok
  }

  pub fn sink_type(&self) -> &'static str {
    match &self.config {
      SinkConfig::Gelf { .. } => "gelf",
      SinkConfig::OpenObserve { .. } => "openobserve",
      SinkConfig::Loki { .. } => "loki",
      SinkConfig::ElasticsearchBulk { .. } => "elasticsearch_bulk",
      SinkConfig::SplunkHec { .. } => "splunk_hec",
      SinkConfig::Syslog { .. } => "syslog",
      SinkConfig::GenericWebhook { .. } => "generic_webhook",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sink_type", rename_all = "snake_case")]
pub enum SinkConfig {
  Gelf {
    url: String,
    #[serde(default = "default_gelf_facility")]
    facility: String,
    #[serde(default = "default_gelf_version")]
    version: String,
  },
  OpenObserve {
    url: String,
    org: String,
    stream: String,
    user: Option<String>,
    password: Option<String>,
  },
  Loki {
    url: String,
    /// Extra labels applied to every stream alongside container/host/stream.
    #[serde(default)]
    labels: std::collections::HashMap<String, String>,
    tenant_id: Option<String>,
  },
  #[serde(rename = "elasticsearch_bulk")]
  ElasticsearchBulk {
    url: String,
    index: String,
    user: Option<String>,
    password: Option<String>,
  },
  #[serde(rename = "splunk_hec")]
  SplunkHec {
    url: String,
    token: String,
    source: Option<String>,
    sourcetype: Option<String>,
    index: Option<String>,
  },
  Syslog {
    host: String,
    port: u16,
    #[serde(default)]
    protocol: SyslogProtocol,
    #[serde(default = "default_syslog_facility")]
    facility: u8,
    #[serde(default)]
    tls: bool,
  },
  #[serde(rename = "generic_webhook")]
  GenericWebhook {
    url: String,
    #[serde(default = "default_post")]
    method: String,
    #[serde(default)]
    wrap_in_array: bool,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
  },
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SyslogProtocol {
  #[default]
  Udp,
  Tcp,
}

fn default_gelf_facility() -> String {
  "infra-mapper".to_string()
}

fn default_gelf_version() -> String {
  "1.1".to_string()
}

fn default_syslog_facility() -> u8 {
  16 // local0
}

fn default_post() -> String {
  "POST".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkStats {
  pub logs_sent: u64,
  pub errors_count: u64,
  pub last_success: Option<i64>,
  pub last_error: Option<i64>,
  pub last_error_message: Option<String>,
}
