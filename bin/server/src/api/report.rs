use axum::Json;
use infra_mapper_client::entities::report::{AgentReport, ReportStats};

pub async fn report(
  Json(report): Json<AgentReport>,
) -> serror::Result<Json<ReportStats>> {
  let stats = crate::ingest::ingest(report).await?;
  Ok(Json(stats))
}
