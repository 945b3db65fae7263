//! Realtime broadcaster (C11, §4.11). Holds a mutex-guarded set of
//! WebSocket subscribers; on any tracked event, serializes one JSON
//! envelope and pushes it to every subscriber, evicting any whose send
//! fails. No backpressure policy, per §4.11/§5: a slow subscriber is simply
//! dropped on the next failed send.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

/// Closed event set (§11 supplement: "generalized into a closed
/// `BroadcastEvent` enum"). The agent-deployment-progress event from the
/// original source belongs to the out-of-scope SSH deployment feature and
/// is dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BroadcastEvent {
  HostUpdate { host_id: String },
  ContainerChange { host_id: String, container_id: String },
  GraphRefresh,
}

struct Subscriber {
  tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
pub struct Broadcaster {
  subscribers: RwLock<indexmap::IndexMap<u64, Subscriber>>,
  next_id: AtomicU64,
}

impl Broadcaster {
  pub async fn subscriber_count(&self) -> u64 {
    self.subscribers.read().await.len() as u64
  }

  /// Drives one accepted `/ws` connection until it closes. Forwards
  /// broadcast messages out and answers `ping` with `pong` (§4.11, §6).
  pub async fn handle_socket(&self, socket: WebSocket) {
    let (mut sink, mut stream) = futures_util::StreamExt::split(socket);
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    self.subscribers.write().await.insert(id, Subscriber { tx });

    let outbound = tokio::spawn(async move {
      use futures_util::SinkExt;
      while let Some(message) = rx.recv().await {
        if sink.send(message).await.is_err() {
          break;
        }
      }
    });

    use futures_util::StreamExt;
    while let Some(Ok(message)) = stream.next().await {
      match message {
        Message::Text(text) if text == "ping" => {
          if let Some(sub) = self.subscribers.read().await.get(&id) {
            let _ = sub.tx.send(Message::Text("pong".into()));
          }
        }
        Message::Close(_) => break,
        _ => {}
      }
    }

    outbound.abort();
    self.subscribers.write().await.shift_remove(&id);
    debug!(subscriber_id = id, "websocket subscriber disconnected");
  }

  pub async fn broadcast(&self, event: BroadcastEvent) {
    let payload = match serde_json::to_string(&event) {
      Ok(p) => p,
      Err(e) => {
        tracing::warn!(error = %e, "failed to serialize broadcast event");
        return;
      }
    };
    let subscribers = self.subscribers.read().await;
    let mut dead = Vec::new();
    for (id, sub) in subscribers.iter() {
      if sub.tx.send(Message::Text(payload.clone().into())).is_err() {
        dead.push(*id);
      }
    }
    drop(subscribers);
    if !dead.is_empty() {
      let mut subscribers = self.subscribers.write().await;
      for id in dead {
        subscribers.shift_remove(&id);
      }
    }
  }
}
