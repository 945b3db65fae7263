//! Client for the wire contract an agent's command server exposes on
//! `command_port` (§4.4, §4.12, §6). Used by the server's remote command
//! relay (C12) to forward container-lifecycle requests to the right agent.

use std::time::Duration;

use infra_mapper_client::entities::command::{
  CommandServerHealth, ContainerAction, ContainerActionRequest,
  ContainerActionResponse,
};

pub struct AgentClient {
  /// `http://<ip>:<command_port>`
  address: String,
  token: String,
  http: reqwest::Client,
}

impl AgentClient {
  pub fn new(
    address: impl Into<String>,
    token: impl Into<String>,
    timeout: Duration,
  ) -> anyhow::Result<Self> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { address: address.into(), token: token.into(), http })
  }

  /// Builds against an already-configured client, e.g. the relay's shared
  /// connection pool, instead of constructing a fresh one per call.
  pub fn with_client(
    address: impl Into<String>,
    token: impl Into<String>,
    http: reqwest::Client,
  ) -> Self {
    Self { address: address.into(), token: token.into(), http }
  }

  pub async fn health(&self) -> anyhow::Result<CommandServerHealth> {
    let res = self
      .http
      .get(format!("{}/health", self.address))
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;
    Ok(res)
  }

  /// `POST /containers/{action}` with the agent's bearer token (§4.12).
  /// Timeout errors surface to the caller as [reqwest::Error::is_timeout];
  /// the server translates that to a 504 (§4.12).
  pub async fn container_action(
    &self,
    action: ContainerAction,
    request: &ContainerActionRequest,
  ) -> anyhow::Result<ContainerActionResponse> {
    let res = self
      .http
      .post(format!(
        "{}/containers/{}",
        self.address,
        action.path_segment()
      ))
      .bearer_auth(&self.token)
      .json(request)
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;
    Ok(res)
  }
}
