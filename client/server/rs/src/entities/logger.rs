use serde::{Deserialize, Serialize};

/// Shared by both binaries; constructed from env/CLI by each binary's own
/// `config` module and handed to `logger::init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
  pub level: LogLevel,
  pub stdio: StdioLogMode,
  /// Human-readable multi-line format instead of the compact one-liner.
  pub pretty: bool,
  /// Include the module path in non-json output.
  pub location: bool,
  pub ansi: bool,
  /// Empty disables OTLP export.
  pub otlp_endpoint: String,
  pub opentelemetry_service_name: String,
  pub opentelemetry_scope_name: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: LogLevel::Info,
      stdio: StdioLogMode::Standard,
      pretty: false,
      location: false,
      ansi: true,
      otlp_endpoint: String::new(),
      opentelemetry_service_name: "infra-mapper".to_string(),
      opentelemetry_scope_name: "infra-mapper".to_string(),
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
}

impl From<LogLevel> for tracing::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Trace => tracing::Level::TRACE,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Error => tracing::Level::ERROR,
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}
