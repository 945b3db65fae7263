//! The agent's command server (§4.4, §4.12, §6): `POST /containers/{action}`
//! reusing the same [DockerRuntime] as the collector, bearer-authenticated
//! with the agent's own outbound API key. `/health` is unauthenticated.
//! Handlers run one request at a time per connection; the shared
//! [DockerRuntime] wraps a bollard `Docker` handle, which is internally
//! clonable/thread-safe, so no additional locking is needed here (§5).

use std::{sync::Arc, time::Duration};

use axum::{
  Json, Router,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
  routing::{get, post},
};
use infra_mapper_client::entities::command::{
  CommandServerHealth, ContainerActionRequest, ContainerActionResponse,
};
use tracing::{info, warn};

use crate::collectors::{docker::DockerRuntime, logs};

#[derive(Clone)]
struct CommandServerState {
  docker: Arc<DockerRuntime>,
  token: Arc<str>,
}

pub async fn serve(
  docker: Arc<DockerRuntime>,
  token: String,
  port: u16,
) -> anyhow::Result<()> {
  let state = CommandServerState { docker, token: token.into() };
  let app = Router::new()
    .route("/health", get(health))
    .route("/containers/{action}", post(container_action))
    .with_state(state);

  let listener =
    tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
  info!(port, "command server listening");
  axum::serve(listener, app).await?;
  Ok(())
}

async fn health() -> Json<CommandServerHealth> {
  Json(CommandServerHealth { status: "ok" })
}

async fn container_action(
  State(state): State<CommandServerState>,
  Path(action): Path<String>,
  headers: HeaderMap,
  Json(request): Json<ContainerActionRequest>,
) -> impl IntoResponse {
  if !authorized(&headers, &state.token) {
    return (
      StatusCode::UNAUTHORIZED,
      Json(ContainerActionResponse {
        success: false,
        error: Some("invalid or missing bearer token".to_string()),
        output: None,
      }),
    );
  }

  let result = dispatch(&state.docker, &action, &request).await;
  let status = if result.success {
    StatusCode::OK
  } else {
    StatusCode::BAD_GATEWAY
  };
  (status, Json(result))
}

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
  headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .is_some_and(|token| token == expected)
}

async fn dispatch(
  docker: &DockerRuntime,
  action: &str,
  request: &ContainerActionRequest,
) -> ContainerActionResponse {
  match action {
    "start" => from_result(docker.start_container(&request.container_id).await),
    "stop" => from_result(
      docker.stop_container(&request.container_id, 10).await,
    ),
    "restart" => from_result(
      docker.restart_container(&request.container_id, 10).await,
    ),
    "exec" => {
      let Some(command) = request.command.as_deref() else {
        return ContainerActionResponse {
          success: false,
          error: Some("exec requires a command".to_string()),
          output: None,
        };
      };
      match docker
        .exec_container(
          &request.container_id,
          command,
          Duration::from_secs(30),
        )
        .await
      {
        Ok(output) => ContainerActionResponse {
          success: true,
          error: None,
          output: Some(output),
        },
        Err(e) => ContainerActionResponse {
          success: false,
          error: Some(e),
          output: None,
        },
      }
    }
    "logs" => {
      let tail = request.tail.unwrap_or(100);
      let entries = logs::tail_raw(
        docker.docker(),
        &request.container_id,
        tail,
      )
      .await;
      match entries {
        Ok(text) => ContainerActionResponse {
          success: true,
          error: None,
          output: Some(text),
        },
        Err(e) => ContainerActionResponse {
          success: false,
          error: Some(e.to_string()),
          output: None,
        },
      }
    }
    "stats" => {
      let point = crate::collectors::resources::sample_container(
        docker.docker(),
        "local",
        &request.container_id,
      )
      .await;
      match point {
        Some(point) => ContainerActionResponse {
          success: true,
          error: None,
          output: serde_json::to_string(&point).ok(),
        },
        None => ContainerActionResponse {
          success: false,
          error: Some("failed to sample container stats".to_string()),
          output: None,
        },
      }
    }
    other => {
      warn!(action = other, "unrecognized container action");
      ContainerActionResponse {
        success: false,
        error: Some(format!("unrecognized action {other}")),
        output: None,
      }
    }
  }
}

fn from_result(result: Result<(), String>) -> ContainerActionResponse {
  match result {
    Ok(()) => ContainerActionResponse { success: true, error: None, output: None },
    Err(e) => ContainerActionResponse { success: false, error: Some(e), output: None },
  }
}
