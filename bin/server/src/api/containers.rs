use axum::{
  Json,
  extract::Path,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use infra_mapper_client::entities::command::{ContainerAction, ContainerActionResponse};
use serde::Deserialize;

use crate::relay::{self, RelayError};

#[derive(Debug, Default, Deserialize)]
pub struct ContainerActionBody {
  pub command: Option<String>,
  pub tail: Option<u32>,
}

/// `POST /api/v1/containers/{container_id}/{action}` (§4.12, §6). A
/// missing body is treated as an action with no `command`/`tail`.
pub async fn container_action(
  Path((container_id, action)): Path<(String, String)>,
  Json(body): Json<ContainerActionBody>,
) -> Response {
  let Some(action) = parse_action(&action) else {
    return (StatusCode::BAD_REQUEST, format!("unknown action {action}"))
      .into_response();
  };

  match relay::relay(&container_id, action, body.command, body.tail).await {
    Ok(response) => Json(response).into_response(),
    Err(RelayError::Unreachable(reason)) => {
      (StatusCode::SERVICE_UNAVAILABLE, reason).into_response()
    }
    Err(RelayError::Timeout) => (
      StatusCode::GATEWAY_TIMEOUT,
      Json(ContainerActionResponse {
        success: false,
        error: Some("relay to agent timed out".to_string()),
        output: None,
      }),
    )
      .into_response(),
    Err(RelayError::Failed(reason)) => {
      (StatusCode::INTERNAL_SERVER_ERROR, reason).into_response()
    }
  }
}

fn parse_action(action: &str) -> Option<ContainerAction> {
  match action {
    "start" => Some(ContainerAction::Start),
    "stop" => Some(ContainerAction::Stop),
    "restart" => Some(ContainerAction::Restart),
    "exec" => Some(ContainerAction::Exec),
    "stats" => Some(ContainerAction::Stats),
    "logs" => Some(ContainerAction::Logs),
    _ => None,
  }
}
