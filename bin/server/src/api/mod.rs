//! REST + WebSocket surface (§6). Plain axum routes, grouped by resource;
//! the agent-facing report endpoint is the only one behind bearer auth
//! (§6: "401 on bad key" — the browser-facing CRUD surface has no
//! authentication layer of its own in the core-only build, per §1's RBAC
//! non-goal).

use axum::{
  Router,
  extract::Request,
  http::{HeaderMap, StatusCode},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serror::AddStatusCode;

use crate::config::{cors_layer, server_config};

mod alerts;
mod containers;
mod fleet;
mod report;
mod sinks;
mod ws;

pub fn router() -> Router {
  let agent_facing = Router::new()
    .route("/api/v1/report", post(report::report))
    .layer(middleware::from_fn(require_api_key));

  Router::new()
    .route("/health", get(fleet::health))
    .route("/api/v1/graph", get(fleet::graph))
    .route("/api/v1/hosts", get(fleet::hosts))
    .route("/api/v1/stats", get(fleet::stats))
    .route(
      "/api/v1/alerts/rules",
      get(alerts::list_rules).post(alerts::create_rule),
    )
    .route(
      "/api/v1/alerts/rules/{id}",
      get(alerts::get_rule).put(alerts::update_rule).delete(alerts::delete_rule),
    )
    .route(
      "/api/v1/alerts/channels",
      get(alerts::list_channels).post(alerts::create_channel),
    )
    .route(
      "/api/v1/alerts/channels/{id}",
      get(alerts::get_channel)
        .put(alerts::update_channel)
        .delete(alerts::delete_channel),
    )
    .route("/api/v1/alerts/channels/{id}/test", post(alerts::test_channel))
    .route("/api/v1/alerts/evaluate", post(alerts::evaluate_now))
    .route("/api/v1/alerts", get(alerts::list_alerts))
    .route("/api/v1/alerts/{id}/acknowledge", post(alerts::acknowledge))
    .route("/api/v1/alerts/{id}/resolve", post(alerts::resolve))
    .route(
      "/api/v1/sinks",
      get(sinks::list_sinks).post(sinks::create_sink),
    )
    .route(
      "/api/v1/sinks/{id}",
      get(sinks::get_sink).put(sinks::update_sink).delete(sinks::delete_sink),
    )
    .route(
      "/api/v1/containers/{container_id}/{action}",
      post(containers::container_action),
    )
    .route("/ws", get(ws::upgrade))
    .merge(agent_facing)
    .layer(cors_layer())
    .layer(middleware::from_fn(track_request))
}

async fn track_request(request: Request, next: Next) -> Response {
  crate::state::record_request();
  next.run(request).await
}

/// §6: the agent authenticates with `Authorization: Bearer <api-key>`;
/// any key in `server_config().api_keys` is accepted.
async fn require_api_key(
  headers: HeaderMap,
  request: Request,
  next: Next,
) -> Response {
  let config = server_config();
  let authorized = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .is_some_and(|token| config.api_keys.iter().any(|key| key == token));

  if authorized {
    next.run(request).await
  } else {
    StatusCode::UNAUTHORIZED.into_response()
  }
}

pub(super) fn not_found(resource: &str, id: &str) -> serror::Error {
  anyhow::anyhow!("{resource} {id} not found").status_code(StatusCode::NOT_FOUND)
}
