//! Notifier fan-out (C9, §4.9). One formatter+transport pair per
//! `channel_type`; every send carries the configured timeout and returns
//! `(success, error)` rather than propagating — a failing channel must
//! never stop the fan-out to the rest (§4.8: "any per-channel send failure
//! is recorded ... but does not fail the fire").

use std::time::Duration;

use infra_mapper_client::entities::{
  alert::Alert,
  channel::{
    AlertChannel, ChannelConfig, severity_color, severity_glyph,
    severity_priority,
  },
};
use lettre::{
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
  message::Mailbox, transport::smtp::authentication::Credentials,
};
use serde_json::json;
use tracing::warn;

use crate::config::server_config;

pub struct SendOutcome {
  pub success: bool,
  pub error: Option<String>,
}

/// Dispatches `alert` to every enabled channel whose filters match, per
/// §4.9. Returns one [SendOutcome] per channel attempted, in the same
/// order as `channels`, for the caller to fold into
/// `Alert::notifications_sent`.
pub async fn fan_out(
  alert: &Alert,
  channels: &[AlertChannel],
) -> Vec<(String, SendOutcome)> {
  let mut results = Vec::new();
  for channel in channels {
    if !channel.enabled || !channel.matches(alert.severity, alert.rule_type) {
      continue;
    }
    let outcome = send(channel, alert).await;
    results.push((channel.id.clone(), outcome));
  }
  results
}

/// A channel "test" operation uses a synthetic alert with known text
/// (§4.9, §6 `POST /api/v1/alerts/channels/{id}/test`).
pub async fn test_channel(channel: &AlertChannel) -> SendOutcome {
  send(channel, &synthetic_test_alert()).await
}

fn synthetic_test_alert() -> Alert {
  use infra_mapper_client::entities::alert::{AlertStatus, RuleType, Severity};
  Alert {
    id: "test".to_string(),
    rule_id: "test".to_string(),
    rule_type: RuleType::HostOffline,
    severity: Severity::Info,
    status: AlertStatus::Active,
    title: "Test notification".to_string(),
    message: "This is a test notification from Infra-Mapper.".to_string(),
    host_ids: Vec::new(),
    container_ids: Vec::new(),
    context: json!({}),
    triggered_at: infra_mapper_client::timestamp_ms(),
    resolved_at: None,
    acknowledged_at: None,
    notifications_sent: Vec::new(),
  }
}

async fn send(channel: &AlertChannel, alert: &Alert) -> SendOutcome {
  let timeout = Duration::from_secs(server_config().notifier_timeout_seconds);
  let result = match &channel.config {
    ChannelConfig::ChatWebhookSlack { webhook_url } => {
      send_slack(webhook_url, alert, timeout).await
    }
    ChannelConfig::ChatWebhookDiscord { webhook_url } => {
      send_discord(webhook_url, alert, timeout).await
    }
    ChannelConfig::ChatBotTelegram { bot_token, chat_id } => {
      send_telegram(bot_token, chat_id, alert, timeout).await
    }
    ChannelConfig::Email { .. } => send_email(&channel.config, alert).await,
    ChannelConfig::MobilePush { server, topic, token } => {
      send_mobile_push(server, topic, token.as_deref(), alert, timeout).await
    }
    ChannelConfig::GenericWebhook { url, method, headers, include_context } => {
      send_generic_webhook(url, method, headers, *include_context, alert, timeout)
        .await
    }
  };
  match result {
    Ok(()) => SendOutcome { success: true, error: None },
    Err(e) => {
      warn!(channel = channel.channel_type(), error = %e, "notification send failed");
      SendOutcome { success: false, error: Some(e) }
    }
  }
}

fn http_client(timeout: Duration) -> reqwest::Client {
  reqwest::Client::builder()
    .timeout(timeout)
    .build()
    .expect("failed to build notifier http client")
}

async fn post_json(
  url: &str,
  body: serde_json::Value,
  timeout: Duration,
) -> Result<(), String> {
  let res = http_client(timeout)
    .post(url)
    .json(&body)
    .send()
    .await
    .map_err(|e| e.to_string())?;
  if !res.status().is_success() {
    return Err(format!("notifier endpoint returned {}", res.status()));
  }
  Ok(())
}

/// Slack-style incoming webhook: a block with color-coded attachment.
async fn send_slack(
  webhook_url: &str,
  alert: &Alert,
  timeout: Duration,
) -> Result<(), String> {
  let body = json!({
    "attachments": [{
      "color": severity_color(alert.severity),
      "blocks": [{
        "type": "section",
        "text": {
          "type": "mrkdwn",
          "text": format!("{} *{}*\n{}", severity_glyph(alert.severity), alert.title, alert.message),
        }
      }]
    }]
  });
  post_json(webhook_url, body, timeout).await
}

/// Discord-style webhook: an embed.
async fn send_discord(
  webhook_url: &str,
  alert: &Alert,
  timeout: Duration,
) -> Result<(), String> {
  let color_u32 = u32::from_str_radix(
    severity_color(alert.severity).trim_start_matches('#'),
    16,
  )
  .unwrap_or(0);
  let body = json!({
    "embeds": [{
      "title": format!("{} {}", severity_glyph(alert.severity), alert.title),
      "description": alert.message,
      "color": color_u32,
    }]
  });
  post_json(webhook_url, body, timeout).await
}

/// Telegram-style bot API: `POST https://api.telegram.org/bot<token>/sendMessage`.
async fn send_telegram(
  bot_token: &str,
  chat_id: &str,
  alert: &Alert,
  timeout: Duration,
) -> Result<(), String> {
  let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
  let body = json!({
    "chat_id": chat_id,
    "text": format!("{} {}\n{}", severity_glyph(alert.severity), alert.title, alert.message),
  });
  post_json(&url, body, timeout).await
}

async fn send_email(config: &ChannelConfig, alert: &Alert) -> Result<(), String> {
  let ChannelConfig::Email {
    smtp_host,
    smtp_port,
    from,
    to,
    smtp_user,
    smtp_password,
    use_tls,
  } = config
  else {
    return Err("email send invoked with non-email config".to_string());
  };

  let from_mailbox: Mailbox = from.parse().map_err(|e| format!("invalid from address: {e}"))?;
  let mut builder = Message::builder()
    .from(from_mailbox)
    .subject(format!(
      "[{:?}] {}",
      alert.severity, alert.title
    ));
  for recipient in to {
    let mailbox: Mailbox = recipient
      .parse()
      .map_err(|e| format!("invalid recipient {recipient}: {e}"))?;
    builder = builder.to(mailbox);
  }
  let email = builder
    .body(alert.message.clone())
    .map_err(|e| format!("failed to build email: {e}"))?;

  let mut transport_builder = if *use_tls {
    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
      .map_err(|e| e.to_string())?
  } else {
    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
  }
  .port(*smtp_port);

  if let (Some(user), Some(password)) = (smtp_user, smtp_password) {
    transport_builder =
      transport_builder.credentials(Credentials::new(user.clone(), password.clone()));
  }

  let transport = transport_builder.build();
  transport
    .send(email)
    .await
    .map(|_| ())
    .map_err(|e| e.to_string())
}

/// ntfy-style mobile push: `POST <server>/<topic>` with priority/tag headers.
async fn send_mobile_push(
  server: &str,
  topic: &str,
  token: Option<&str>,
  alert: &Alert,
  timeout: Duration,
) -> Result<(), String> {
  let url = format!("{}/{topic}", server.trim_end_matches('/'));
  let mut request = http_client(timeout)
    .post(&url)
    .header("Title", alert.title.clone())
    .header("Priority", severity_priority(alert.severity))
    .header("Tags", severity_tag(alert.severity))
    .body(alert.message.clone());
  if let Some(token) = token {
    request = request.bearer_auth(token);
  }
  let res = request.send().await.map_err(|e| e.to_string())?;
  if !res.status().is_success() {
    return Err(format!("mobile push endpoint returned {}", res.status()));
  }
  Ok(())
}

fn severity_tag(severity: infra_mapper_client::entities::alert::Severity) -> &'static str {
  use infra_mapper_client::entities::alert::Severity;
  match severity {
    Severity::Info => "information_source",
    Severity::Warning => "warning",
    Severity::Critical => "rotating_light",
  }
}

async fn send_generic_webhook(
  url: &str,
  method: &str,
  headers: &std::collections::HashMap<String, String>,
  include_context: bool,
  alert: &Alert,
  timeout: Duration,
) -> Result<(), String> {
  let mut body = json!({
    "severity": alert.severity,
    "rule_type": alert.rule_type,
    "title": alert.title,
    "message": alert.message,
    "host_ids": alert.host_ids,
    "container_ids": alert.container_ids,
    "triggered_at": alert.triggered_at,
  });
  if include_context {
    body["context"] = alert.context.clone();
  }

  let method = method.to_uppercase();
  let http_method = reqwest::Method::from_bytes(method.as_bytes())
    .unwrap_or(reqwest::Method::POST);
  let mut request = http_client(timeout).request(http_method, url).json(&body);
  for (key, value) in headers {
    request = request.header(key, value);
  }
  let res = request.send().await.map_err(|e| e.to_string())?;
  if !res.status().is_success() {
    return Err(format!("generic webhook returned {}", res.status()));
  }
  Ok(())
}
