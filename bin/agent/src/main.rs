use std::sync::Arc;

use tracing::{error, info};

mod collectors;
mod command_server;
mod config;
mod report;
mod run;

use collectors::{capture::PacketCapture, docker::DockerRuntime};
use config::agent_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = agent_config();
  logger::init(&config.logging)?;
  info!(agent_id = config::agent_id(), config = ?config.sanitized(), "starting infra-mapper agent");

  let docker = Arc::new(DockerRuntime::connect(&config.docker_socket)?);
  let capture = Arc::new(PacketCapture::new(
    config.capture_mode,
    config.capture_duration_seconds,
    config.capture_interval_seconds,
    config.capture_max_packets_per_container,
  ));

  if config.command_server_enabled {
    let command_docker = docker.clone();
    let token = config.api_key.clone();
    let port = config.command_server_port;
    tokio::spawn(async move {
      if let Err(e) = command_server::serve(command_docker, token, port).await {
        error!(error = %e, "command server exited");
      }
    });
  }

  run::spawn(docker, capture).await;
  Ok(())
}
