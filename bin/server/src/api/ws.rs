use axum::{
  extract::{WebSocketUpgrade, ws::WebSocket},
  response::Response,
};

use crate::state::broadcaster;

/// `GET /ws` (§4.11, §6): upgrades and hands the socket to the broadcaster
/// for the lifetime of the connection.
pub async fn upgrade(ws: WebSocketUpgrade) -> Response {
  ws.on_upgrade(handle)
}

async fn handle(socket: WebSocket) {
  broadcaster().handle_socket(socket).await;
}
