//! Remote command relay (C12, §4.12). Translates a surrogate
//! `<host_id>:<short_id>` container id to its owning host's reachable
//! address, forwards the action with the fleet's shared bearer token, and
//! maps transport failures onto the status codes the API layer returns.

use agent_client::AgentClient;
use bson::doc;
use infra_mapper_client::entities::command::{
  ContainerAction, ContainerActionRequest, ContainerActionResponse,
};

use crate::{config::server_config, state::{db_client, relay_http_client}};

pub enum RelayError {
  /// Host has no `command_port` configured, or no reachable IP (§4.12: 503).
  Unreachable(String),
  /// The relay call to the agent timed out (§4.12: 504).
  Timeout,
  /// Any other transport or protocol failure.
  Failed(String),
}

/// §4.12: looks up the container's host, picks `overlay_ip` else the first
/// LAN IP, and forwards `action` with the container's short id.
pub async fn relay(
  container_surrogate_id: &str,
  action: ContainerAction,
  command: Option<String>,
  tail: Option<u32>,
) -> Result<ContainerActionResponse, RelayError> {
  let (host_id, short_id) = container_surrogate_id
    .split_once(':')
    .ok_or_else(|| RelayError::Failed("malformed container id".to_string()))?;

  let db = db_client();
  let host = db
    .hosts
    .find_one(doc! { "id": host_id })
    .await
    .map_err(|e| RelayError::Failed(e.to_string()))?
    .ok_or_else(|| RelayError::Unreachable(format!("unknown host {host_id}")))?;

  let Some(command_port) = host.command_port else {
    return Err(RelayError::Unreachable(format!(
      "host {host_id} has no command server configured"
    )));
  };
  let Some(ip) = host.reachable_ip() else {
    return Err(RelayError::Unreachable(format!(
      "host {host_id} has no reachable ip"
    )));
  };

  let config = server_config();
  let token = config
    .api_keys
    .first()
    .ok_or_else(|| RelayError::Failed("no api key configured for relay auth".to_string()))?;

  let address = format!("http://{ip}:{command_port}");
  let client = AgentClient::with_client(address, token.clone(), relay_http_client().clone());

  let request = ContainerActionRequest {
    container_id: short_id.to_string(),
    command,
    tail,
  };

  match client.container_action(action, &request).await {
    Ok(response) => Ok(response),
    Err(e) => {
      if e
        .downcast_ref::<reqwest::Error>()
        .is_some_and(|e| e.is_timeout())
      {
        Err(RelayError::Timeout)
      } else {
        Err(RelayError::Failed(e.to_string()))
      }
    }
  }
}
