use anyhow::Context;
use axum::{Json, extract::Path};
use bson::doc;
use infra_mapper_client::entities::{
  alert::{Alert, AlertRule, EvaluationStats},
  channel::{AlertChannel, ChannelConfig, ChannelTestResult},
};
use mungos::find::find_collect;
use serde::Deserialize;
use serror::AddStatusCode;
use validations::{StringValidator, StringValidatorMatches};

use crate::state::db_client;

use super::not_found;

/// §6 CRUD boundary check: the webhook/server URLs an operator submits are
/// otherwise carried straight through to outbound HTTP calls in `notify.rs`
/// with no further inspection, so they're validated here rather than there.
fn validate_channel(channel: &AlertChannel) -> serror::Result<()> {
  let http_url = || {
    StringValidator::default()
      .min_length(1)
      .max_length(2048)
      .matches(StringValidatorMatches::HttpUrl)
  };
  match &channel.config {
    ChannelConfig::ChatWebhookSlack { webhook_url }
    | ChannelConfig::ChatWebhookDiscord { webhook_url } => {
      http_url().validate(webhook_url)
    }
    ChannelConfig::MobilePush { server, .. } => http_url().validate(server),
    ChannelConfig::GenericWebhook { url, .. } => http_url().validate(url),
    ChannelConfig::ChatBotTelegram { .. } | ChannelConfig::Email { .. } => {
      Ok(())
    }
  }
  .with_context(|| format!("invalid channel `{}`", channel.name))
  .map_err(|e| e.status_code(axum::http::StatusCode::BAD_REQUEST))
}

pub async fn list_rules() -> serror::Result<Json<Vec<AlertRule>>> {
  let rules =
    find_collect(&db_client().alert_rules, doc! {}, None).await?;
  Ok(Json(rules))
}

pub async fn create_rule(
  Json(mut rule): Json<AlertRule>,
) -> serror::Result<Json<AlertRule>> {
  let now = infra_mapper_client::timestamp_ms();
  rule.id = uuid::Uuid::new_v4().to_string();
  rule.created_at = now;
  rule.updated_at = now;
  db_client().alert_rules.insert_one(&rule).await?;
  Ok(Json(rule))
}

pub async fn get_rule(Path(id): Path<String>) -> serror::Result<Json<AlertRule>> {
  let rule = db_client()
    .alert_rules
    .find_one(doc! { "id": &id })
    .await?
    .ok_or_else(|| not_found("alert rule", &id))?;
  Ok(Json(rule))
}

pub async fn update_rule(
  Path(id): Path<String>,
  Json(mut rule): Json<AlertRule>,
) -> serror::Result<Json<AlertRule>> {
  rule.id = id.clone();
  rule.updated_at = infra_mapper_client::timestamp_ms();
  let result = db_client()
    .alert_rules
    .replace_one(doc! { "id": &id }, &rule)
    .await?;
  if result.matched_count == 0 {
    return Err(not_found("alert rule", &id));
  }
  Ok(Json(rule))
}

pub async fn delete_rule(Path(id): Path<String>) -> serror::Result<Json<()>> {
  db_client().alert_rules.delete_one(doc! { "id": &id }).await?;
  Ok(Json(()))
}

pub async fn list_channels() -> serror::Result<Json<Vec<AlertChannel>>> {
  let channels =
    find_collect(&db_client().alert_channels, doc! {}, None).await?;
  Ok(Json(channels))
}

pub async fn create_channel(
  Json(mut channel): Json<AlertChannel>,
) -> serror::Result<Json<AlertChannel>> {
  validate_channel(&channel)?;
  channel.id = uuid::Uuid::new_v4().to_string();
  db_client().alert_channels.insert_one(&channel).await?;
  Ok(Json(channel))
}

pub async fn get_channel(
  Path(id): Path<String>,
) -> serror::Result<Json<AlertChannel>> {
  let channel = db_client()
    .alert_channels
    .find_one(doc! { "id": &id })
    .await?
    .ok_or_else(|| not_found("alert channel", &id))?;
  Ok(Json(channel))
}

pub async fn update_channel(
  Path(id): Path<String>,
  Json(mut channel): Json<AlertChannel>,
) -> serror::Result<Json<AlertChannel>> {
  validate_channel(&channel)?;
  channel.id = id.clone();
  let result = db_client()
    .alert_channels
    .replace_one(doc! { "id": &id }, &channel)
    .await?;
  if result.matched_count == 0 {
    return Err(not_found("alert channel", &id));
  }
  Ok(Json(channel))
}

pub async fn delete_channel(Path(id): Path<String>) -> serror::Result<Json<()>> {
  db_client()
    .alert_channels
    .delete_one(doc! { "id": &id })
    .await?;
  Ok(Json(()))
}

pub async fn test_channel(
  Path(id): Path<String>,
) -> serror::Result<Json<ChannelTestResult>> {
  let channel = db_client()
    .alert_channels
    .find_one(doc! { "id": &id })
    .await?
    .ok_or_else(|| not_found("alert channel", &id))?;
  let outcome = crate::notify::test_channel(&channel).await;
  Ok(Json(ChannelTestResult { success: outcome.success, error: outcome.error }))
}

pub async fn evaluate_now() -> serror::Result<Json<EvaluationStats>> {
  let stats = crate::alerts::evaluate().await?;
  Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
  pub status: Option<String>,
}

pub async fn list_alerts(
  axum::extract::Query(query): axum::extract::Query<ListAlertsQuery>,
) -> serror::Result<Json<Vec<Alert>>> {
  let filter = match query.status {
    Some(status) => doc! { "status": status },
    None => doc! {},
  };
  let alerts = find_collect(&db_client().alerts, filter, None).await?;
  Ok(Json(alerts))
}

pub async fn acknowledge(Path(id): Path<String>) -> serror::Result<Json<()>> {
  crate::alerts::acknowledge(&id, infra_mapper_client::timestamp_ms()).await?;
  Ok(Json(()))
}

pub async fn resolve(Path(id): Path<String>) -> serror::Result<Json<()>> {
  crate::alerts::resolve_manual(&id, infra_mapper_client::timestamp_ms()).await?;
  Ok(Json(()))
}
