use serde::{Deserialize, Serialize};

use crate::entities::alert::{RuleType, Severity};

/// A notification destination. `config` is a closed variant keyed by
/// `channel_type` per §9 ("model dynamic dispatch as a closed variant with
/// a type discriminator"); validated against the matching struct at the
/// JSON boundary rather than carried as a loose bag everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertChannel {
  pub id: String,
  pub name: String,
  pub enabled: bool,
  #[serde(flatten)]
  pub config: ChannelConfig,
  /// Empty matches all severities.
  pub severity_filter: Vec<Severity>,
  /// Empty matches all rule types.
  pub rule_type_filter: Vec<RuleType>,
}

impl AlertChannel {
  pub fn matches(&self, severity: Severity, rule_type: RuleType) -> bool {
    (self.severity_filter.is_empty()
      || self.severity_filter.contains(&severity))
      && (self.rule_type_filter.is_empty()
        || self.rule_type_filter.contains(&rule_type))
  }

  pub fn channel_type(&self) -> &'static str {
    match &self.config {
      ChannelConfig::ChatWebhookSlack { .. } => "chat-webhook-slack",
      ChannelConfig::ChatWebhookDiscord { .. } => "chat-webhook-discord",
      ChannelConfig::ChatBotTelegram { .. } => "chat-bot-telegram",
      ChannelConfig::Email { .. } => "email",
      ChannelConfig::MobilePush { .. } => "mobile-push",
      ChannelConfig::GenericWebhook { .. } => "generic-webhook",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel_type", rename_all = "snake_case")]
pub enum ChannelConfig {
  #[serde(rename = "chat-webhook-slack")]
  ChatWebhookSlack { webhook_url: String },
  #[serde(rename = "chat-webhook-discord")]
  ChatWebhookDiscord { webhook_url: String },
  #[serde(rename = "chat-bot-telegram")]
  ChatBotTelegram { bot_token: String, chat_id: String },
  Email {
    smtp_host: String,
    smtp_port: u16,
    from: String,
    to: Vec<String>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    #[serde(default = "default_true")]
    use_tls: bool,
  },
  #[serde(rename = "mobile-push")]
  MobilePush {
    server: String,
    topic: String,
    token: Option<String>,
  },
  #[serde(rename = "generic-webhook")]
  GenericWebhook {
    url: String,
    #[serde(default = "default_post")]
    method: String,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    include_context: bool,
  },
}

fn default_true() -> bool {
  true
}

fn default_post() -> String {
  "POST".to_string()
}

/// Severity -> (color, glyph) for chat/webhook formatting (§4.9).
pub fn severity_color(severity: Severity) -> &'static str {
  match severity {
    Severity::Info => "#2196f3",
    Severity::Warning => "#ff9800",
    Severity::Critical => "#f44336",
  }
}

pub fn severity_glyph(severity: Severity) -> &'static str {
  match severity {
    Severity::Info => "\u{2139}", // info
    Severity::Warning => "\u{26a0}", // warning
    Severity::Critical => "\u{1f6a8}", // rotating light
  }
}

/// Severity -> ntfy-style priority, for channels that support priority.
pub fn severity_priority(severity: Severity) -> &'static str {
  match severity {
    Severity::Info => "low",
    Severity::Warning => "normal",
    Severity::Critical => "urgent",
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelTestResult {
  pub success: bool,
  pub error: Option<String>,
}
