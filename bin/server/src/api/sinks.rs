use anyhow::Context;
use axum::{Json, extract::Path};
use bson::doc;
use infra_mapper_client::entities::sink::{LogSink, SinkConfig};
use mungos::find::find_collect;
use serror::AddStatusCode;
use validations::{StringValidator, StringValidatorMatches};

use crate::state::db_client;

use super::not_found;

/// §6 CRUD boundary check, mirrors `alerts::validate_channel`.
fn validate_sink(sink: &LogSink) -> serror::Result<()> {
  let http_url = || {
    StringValidator::default()
      .min_length(1)
      .max_length(2048)
      .matches(StringValidatorMatches::HttpUrl)
  };
  let non_empty =
    || StringValidator::default().min_length(1).max_length(255);
  match &sink.config {
    SinkConfig::Gelf { url, .. }
    | SinkConfig::OpenObserve { url, .. }
    | SinkConfig::Loki { url, .. }
    | SinkConfig::ElasticsearchBulk { url, .. }
    | SinkConfig::SplunkHec { url, .. }
    | SinkConfig::GenericWebhook { url, .. } => http_url().validate(url),
    SinkConfig::Syslog { host, .. } => non_empty().validate(host),
  }
  .with_context(|| format!("invalid sink `{}`", sink.name))
  .map_err(|e| e.status_code(axum::http::StatusCode::BAD_REQUEST))
}

pub async fn list_sinks() -> serror::Result<Json<Vec<LogSink>>> {
  let sinks = find_collect(&db_client().log_sinks, doc! {}, None).await?;
  Ok(Json(sinks))
}

pub async fn create_sink(
  Json(mut sink): Json<LogSink>,
) -> serror::Result<Json<LogSink>> {
  validate_sink(&sink)?;
  sink.id = uuid::Uuid::new_v4().to_string();
  db_client().log_sinks.insert_one(&sink).await?;
  Ok(Json(sink))
}

pub async fn get_sink(Path(id): Path<String>) -> serror::Result<Json<LogSink>> {
  let sink = db_client()
    .log_sinks
    .find_one(doc! { "id": &id })
    .await?
    .ok_or_else(|| not_found("log sink", &id))?;
  Ok(Json(sink))
}

pub async fn update_sink(
  Path(id): Path<String>,
  Json(mut sink): Json<LogSink>,
) -> serror::Result<Json<LogSink>> {
  validate_sink(&sink)?;
  sink.id = id.clone();
  let result = db_client()
    .log_sinks
    .replace_one(doc! { "id": &id }, &sink)
    .await?;
  if result.matched_count == 0 {
    return Err(not_found("log sink", &id));
  }
  Ok(Json(sink))
}

pub async fn delete_sink(Path(id): Path<String>) -> serror::Result<Json<()>> {
  db_client().log_sinks.delete_one(doc! { "id": &id }).await?;
  Ok(Json(()))
}
