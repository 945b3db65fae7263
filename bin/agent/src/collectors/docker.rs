//! Container/network inventory (§4.1.1) and dependency inference (§4.2).
//! Talks to the local container runtime socket via bollard; any failure to
//! parse a single container is logged and skipped, the rest of the tick
//! still reports (§7 "partial evidence failure").

use std::{collections::HashMap, path::Path, time::Duration};

use bollard::{
  Docker,
  query_parameters::{InspectContainerOptions, ListContainersOptions},
};
use cache::CloneCache;
use infra_mapper_client::entities::{
  container::{
    Container, ContainerHealth, ContainerStatus, PortMapping,
    redact_environment, short_container_id,
  },
  network::Network,
};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

/// Connection-pattern env var keys that hint at a downstream dependency
/// (§4.2 heuristic 2).
const ENV_DEPENDENCY_PATTERNS: &[&str] = &[
  r"(?i)^(DATABASE|DB|REDIS|MONGO|POSTGRES|MYSQL|ELASTIC|RABBIT|KAFKA).*(HOST|URL|URI)",
  r"(?i).*_HOST$",
  r"(?i).*_URL$",
  r"(?i).*_URI$",
  r"(?i).*_SERVER$",
  r"(?i).*_ENDPOINT$",
];

/// Service-name-mention patterns scanned over a running container's recent
/// log tail (§4.2 heuristic 3).
const LOG_DEPENDENCY_PATTERNS: &[&str] = &[
  r"(?i)connect(?:ed|ing)?\s+to\s+(\w+)",
  r"(?i)resolv(?:ed|ing)?\s+(\w+)",
  r"https?://(\w+)[:/]",
  r"@(\w+):",
];

pub struct DockerRuntime {
  docker: Docker,
  /// Path -> parsed compose manifest, populated on first read (§4.2).
  compose_cache: CloneCache<String, ComposeFile>,
  /// Compose project -> its known service names, from the first compose
  /// parse for that project (§4.2 "known siblings").
  services_by_project: CloneCache<String, Vec<String>>,
}

impl DockerRuntime {
  pub fn connect(socket_path: &str) -> anyhow::Result<Self> {
    let docker = Docker::connect_with_socket(
      socket_path,
      120,
      bollard::API_DEFAULT_VERSION,
    )?;
    Ok(Self {
      docker,
      compose_cache: CloneCache::default(),
      services_by_project: CloneCache::default(),
    })
  }

  pub async fn version(&self) -> Option<String> {
    self.docker.version().await.ok().and_then(|v| v.version)
  }

  pub fn docker(&self) -> &Docker {
    &self.docker
  }

  /// §4.1.1: full inventory, one row per container, skipping any container
  /// whose details fail to parse.
  pub async fn collect_containers(&self, host_id: &str) -> Vec<Container> {
    let summaries = match self
      .docker
      .list_containers(Some(ListContainersOptions {
        all: true,
        ..Default::default()
      }))
      .await
    {
      Ok(summaries) => summaries,
      Err(e) => {
        warn!(error = %e, "failed to list containers");
        return Vec::new();
      }
    };

    let mut containers = Vec::with_capacity(summaries.len());
    for summary in summaries {
      let Some(full_id) = summary.id else { continue };
      match self.parse_container(host_id, &full_id).await {
        Ok(container) => containers.push(container),
        Err(e) => {
          warn!(container_id = %full_id, error = %e, "failed to parse container, skipping");
        }
      }
    }
    containers
  }

  async fn parse_container(
    &self,
    host_id: &str,
    full_id: &str,
  ) -> anyhow::Result<Container> {
    let inspect = self
      .docker
      .inspect_container(full_id, None::<InspectContainerOptions>)
      .await?;

    let short_id = short_container_id(full_id);
    let name = inspect
      .name
      .as_deref()
      .unwrap_or(full_id)
      .trim_start_matches('/')
      .to_string();

    let state = inspect.state.as_ref();
    let status = parse_status(
      state.and_then(|s| s.status.as_ref()).map(|s| format!("{s:?}")),
    );
    let health = state
      .and_then(|s| s.health.as_ref())
      .and_then(|h| h.status.as_ref())
      .map(|h| parse_health(&format!("{h:?}")))
      .unwrap_or_default();

    let config = inspect.config.as_ref();
    let image = config
      .and_then(|c| c.image.clone())
      .unwrap_or_else(|| "unknown".to_string());
    let labels = config.and_then(|c| c.labels.clone()).unwrap_or_default();
    let environment = redact_environment(
      config
        .and_then(|c| c.env.clone())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|kv| kv.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))),
    );

    let network_settings = inspect.network_settings.as_ref();
    let networks = network_settings
      .and_then(|ns| ns.networks.as_ref())
      .map(|nets| {
        nets
          .iter()
          .filter_map(|(name, endpoint)| {
            endpoint
              .ip_address
              .clone()
              .filter(|ip| !ip.is_empty())
              .map(|ip| (name.clone(), ip))
          })
          .collect()
      })
      .unwrap_or_default();

    let ports = network_settings
      .and_then(|ns| ns.ports.clone())
      .map(parse_ports)
      .unwrap_or_default();

    let mounts = inspect
      .mounts
      .as_ref()
      .map(|mounts| {
        mounts
          .iter()
          .map(|m| {
            let source = m.source.clone().unwrap_or_default();
            let dest = m.destination.clone().unwrap_or_default();
            format!("{source}:{dest}")
          })
          .collect()
      })
      .unwrap_or_default();

    let compose_project =
      labels.get("com.docker.compose.project").cloned();
    let compose_service =
      labels.get("com.docker.compose.service").cloned();

    let declared_dependencies = if let (Some(project), Some(service)) =
      (&compose_project, &compose_service)
    {
      self
        .infer_dependencies(
          full_id,
          project,
          service,
          &labels,
          &environment,
          status == ContainerStatus::Running,
        )
        .await
    } else {
      Vec::new()
    };

    let created_at = inspect
      .created
      .as_deref()
      .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
      .map(|dt| dt.timestamp_millis())
      .unwrap_or(0);

    Ok(Container {
      id: format!("{host_id}:{short_id}"),
      host_id: host_id.to_string(),
      short_id,
      name,
      image,
      status,
      health,
      networks,
      ports,
      mounts,
      labels,
      environment,
      compose_project,
      compose_service,
      declared_dependencies,
      created_at,
    })
  }

  /// Main pid of a running container, for namespace entry (§4.1.2, §4.1.3).
  pub async fn main_pid(&self, full_id: &str) -> Option<i32> {
    self
      .docker
      .inspect_container(full_id, None::<InspectContainerOptions>)
      .await
      .ok()?
      .state?
      .pid
      .filter(|pid| *pid > 0)
      .map(|pid| pid as i32)
  }

  /// Full ids of currently running containers, for the packet-capture and
  /// resource-sampling collectors which need a live pid / exec target.
  pub async fn running_container_ids(&self) -> Vec<String> {
    self
      .docker
      .list_containers(Some(ListContainersOptions {
        filters: Some(HashMap::from([(
          "status".to_string(),
          vec!["running".to_string()],
        )])),
        ..Default::default()
      }))
      .await
      .unwrap_or_default()
      .into_iter()
      .filter_map(|c| c.id)
      .collect()
  }

  pub async fn collect_networks(&self, host_id: &str) -> Vec<Network> {
    let summaries = match self.docker.list_networks::<String>(None).await {
      Ok(summaries) => summaries,
      Err(e) => {
        warn!(error = %e, "failed to list networks");
        return Vec::new();
      }
    };

    summaries
      .into_iter()
      .map(|n| {
        let ipam_config = n
          .ipam
          .as_ref()
          .and_then(|ipam| ipam.config.as_ref())
          .and_then(|configs| configs.first());
        Network {
          host_id: host_id.to_string(),
          name: n.name.unwrap_or_default(),
          driver: n.driver.unwrap_or_default(),
          scope: n.scope.unwrap_or_default(),
          subnet: ipam_config.and_then(|c| c.subnet.clone()),
          gateway: ipam_config.and_then(|c| c.gateway.clone()),
          member_container_ids: n
            .containers
            .unwrap_or_default()
            .into_keys()
            .map(|id| short_container_id(&id))
            .collect(),
        }
      })
      .collect()
  }

  /// §4.2: union of three heuristics, deduplicated, excluding self.
  async fn infer_dependencies(
    &self,
    full_container_id: &str,
    project: &str,
    service: &str,
    labels: &HashMap<String, String>,
    environment: &HashMap<String, String>,
    running: bool,
  ) -> Vec<String> {
    let mut deps = Vec::new();
    let mut push = |name: String| {
      if name != service && !deps.contains(&name) {
        deps.push(name);
      }
    };

    for dep in self.compose_dependencies(project, service, labels).await {
      push(dep);
    }
    for dep in self.env_dependencies(project, environment).await {
      push(dep);
    }
    if running {
      for dep in self.log_dependencies(full_container_id, project).await {
        push(dep);
      }
    }
    deps
  }

  async fn compose_dependencies(
    &self,
    project: &str,
    service: &str,
    labels: &HashMap<String, String>,
  ) -> Vec<String> {
    let mut deps = Vec::new();

    let Some(working_dir) =
      labels.get("com.docker.compose.project.working_dir")
    else {
      return deps;
    };
    let config_files = labels
      .get("com.docker.compose.project.config_files")
      .cloned()
      .unwrap_or_default();

    let candidate_paths: Vec<std::path::PathBuf> = if !config_files.is_empty()
    {
      config_files
        .split(',')
        .map(|f| resolve_compose_path(working_dir, f.trim()))
        .collect()
    } else {
      [
        "docker-compose.yml",
        "docker-compose.yaml",
        "compose.yml",
        "compose.yaml",
      ]
      .iter()
      .map(|name| Path::new(working_dir).join(name))
      .filter(|p| p.is_file())
      .take(1)
      .collect()
    };

    for path in candidate_paths {
      let Some(path_str) = path.to_str() else { continue };
      let manifest = match self.compose_cache.get(&path_str.to_string()).await
      {
        Some(manifest) => manifest,
        None => {
          let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
          };
          let manifest: ComposeFile =
            match serde_yaml_ng::from_str(&contents) {
              Ok(m) => m,
              Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse compose manifest");
                continue;
              }
            };
          self
            .compose_cache
            .insert(path_str.to_string(), manifest.clone())
            .await;
          manifest
        }
      };

      if !self.services_by_project.get(&project.to_string()).await.is_some()
      {
        self
          .services_by_project
          .insert(
            project.to_string(),
            manifest.services.keys().cloned().collect(),
          )
          .await;
      }

      if let Some(svc) = manifest.services.get(service) {
        deps.extend(svc.depends_on.names());
        for link in &svc.links {
          let dep_name =
            link.split(':').next().unwrap_or(link).to_string();
          if !deps.contains(&dep_name) {
            deps.push(dep_name);
          }
        }
      }

      for dep in self.env_file_dependencies(working_dir, project).await {
        if !deps.contains(&dep) {
          deps.push(dep);
        }
      }
    }

    deps
  }

  async fn env_file_dependencies(
    &self,
    working_dir: &str,
    project: &str,
  ) -> Vec<String> {
    let env_path = Path::new(working_dir).join(".env");
    let Ok(contents) = std::fs::read_to_string(&env_path) else {
      return Vec::new();
    };
    let known = self
      .services_by_project
      .get(&project.to_string())
      .await
      .unwrap_or_default();

    known
      .into_iter()
      .filter(|service| {
        let patterns = [
          format!(r"(?i)\b{}\b", regex::escape(service)),
          format!(r"(?i)://{}[:/]", regex::escape(service)),
          format!(r"(?i)@{}[:/]", regex::escape(service)),
          format!(r"(?i)HOST.*=.*{}", regex::escape(service)),
        ];
        patterns.iter().any(|p| {
          Regex::new(p).map(|re| re.is_match(&contents)).unwrap_or(false)
        })
      })
      .collect()
  }

  async fn env_dependencies(
    &self,
    project: &str,
    environment: &HashMap<String, String>,
  ) -> Vec<String> {
    let known = self
      .services_by_project
      .get(&project.to_string())
      .await
      .unwrap_or_default();
    if known.is_empty() {
      return Vec::new();
    }

    let patterns: Vec<Regex> = ENV_DEPENDENCY_PATTERNS
      .iter()
      .filter_map(|p| Regex::new(p).ok())
      .collect();

    let mut deps = Vec::new();
    for (key, value) in environment {
      if value == infra_mapper_client::entities::container::REDACTED_MARKER {
        continue;
      }
      if !patterns.iter().any(|re| re.is_match(key)) {
        continue;
      }
      let lower = value.to_lowercase();
      for service in &known {
        if lower.contains(service.as_str()) && !deps.contains(service) {
          deps.push(service.clone());
        }
      }
    }
    deps
  }

  async fn log_dependencies(
    &self,
    full_container_id: &str,
    project: &str,
  ) -> Vec<String> {
    let known = self
      .services_by_project
      .get(&project.to_string())
      .await
      .unwrap_or_default();
    if known.is_empty() {
      return Vec::new();
    }

    let tail = super::logs::tail_raw(&self.docker, full_container_id, 100)
      .await
      .unwrap_or_default();

    let patterns: Vec<Regex> = LOG_DEPENDENCY_PATTERNS
      .iter()
      .filter_map(|p| Regex::new(p).ok())
      .collect();

    let mut deps = Vec::new();
    for re in &patterns {
      for cap in re.captures_iter(&tail) {
        let Some(matched) = cap.get(1) else { continue };
        let matched = matched.as_str().to_lowercase();
        for service in &known {
          if service.to_lowercase() == matched && !deps.contains(service) {
            deps.push(service.clone());
          }
        }
      }
    }
    deps
  }

  pub async fn start_container(
    &self,
    container_id: &str,
  ) -> Result<(), String> {
    self
      .docker
      .start_container::<String>(container_id, None)
      .await
      .map_err(|e| e.to_string())
  }

  pub async fn stop_container(
    &self,
    container_id: &str,
    timeout_seconds: i32,
  ) -> Result<(), String> {
    self
      .docker
      .stop_container(
        container_id,
        Some(bollard::query_parameters::StopContainerOptions {
          t: Some(timeout_seconds),
          ..Default::default()
        }),
      )
      .await
      .map_err(|e| e.to_string())
  }

  pub async fn restart_container(
    &self,
    container_id: &str,
    timeout_seconds: i32,
  ) -> Result<(), String> {
    self
      .docker
      .restart_container(
        container_id,
        Some(bollard::query_parameters::RestartContainerOptions {
          signal: None,
          t: Some(timeout_seconds),
        }),
      )
      .await
      .map_err(|e| e.to_string())
  }

  /// Runs `command` inside the container via `exec`, shell-split with
  /// [shlex]; output truncated at 50 000 chars each stream to bound the
  /// response body.
  pub async fn exec_container(
    &self,
    container_id: &str,
    command: &str,
    timeout: Duration,
  ) -> Result<String, String> {
    let cmd = shlex::split(command)
      .filter(|c| !c.is_empty())
      .ok_or_else(|| "command lexed into empty args".to_string())?;

    let exec = self
      .docker
      .create_exec(
        container_id,
        bollard::exec::CreateExecOptions {
          cmd: Some(cmd),
          attach_stdout: Some(true),
          attach_stderr: Some(true),
          ..Default::default()
        },
      )
      .await
      .map_err(|e| e.to_string())?;

    let started = tokio::time::timeout(
      timeout,
      self.docker.start_exec(&exec.id, None),
    )
    .await
    .map_err(|_| format!("exec exceeded {timeout:?} deadline"))?
    .map_err(|e| e.to_string())?;

    let mut output = String::new();
    if let bollard::exec::StartExecResults::Attached { mut output: stream, .. } =
      started
    {
      use futures_util::StreamExt;
      while let Some(chunk) = stream.next().await {
        match chunk {
          Ok(log) => output.push_str(&log.to_string()),
          Err(e) => {
            output.push_str(&format!("\n[exec stream error: {e}]"));
            break;
          }
        }
      }
    }
    if output.len() > 50_000 {
      output.truncate(50_000);
      output.push_str("... (output truncated)");
    }
    Ok(output)
  }
}

fn parse_status(raw: Option<String>) -> ContainerStatus {
  match raw.map(|s| s.to_lowercase()).as_deref() {
    Some("running") => ContainerStatus::Running,
    Some("exited") => ContainerStatus::Exited,
    Some("paused") => ContainerStatus::Paused,
    Some("restarting") => ContainerStatus::Restarting,
    Some("dead") => ContainerStatus::Dead,
    Some("created") => ContainerStatus::Created,
    _ => ContainerStatus::Unknown,
  }
}

fn parse_health(raw: &str) -> ContainerHealth {
  match raw.to_lowercase().as_str() {
    "healthy" => ContainerHealth::Healthy,
    "unhealthy" => ContainerHealth::Unhealthy,
    "starting" => ContainerHealth::Starting,
    _ => ContainerHealth::None,
  }
}

fn parse_ports(
  ports: HashMap<String, Option<Vec<bollard::models::PortBinding>>>,
) -> Vec<PortMapping> {
  let mut result = Vec::new();
  for (container_port, bindings) in ports {
    let (port_str, protocol) =
      container_port.split_once('/').unwrap_or((&container_port, "tcp"));
    let Ok(container_port) = port_str.parse::<u16>() else { continue };

    match bindings {
      Some(bindings) if !bindings.is_empty() => {
        for binding in bindings {
          result.push(PortMapping {
            container_port,
            host_port: binding
              .host_port
              .as_deref()
              .and_then(|p| p.parse().ok()),
            protocol: protocol.to_string(),
          });
        }
      }
      _ => result.push(PortMapping {
        container_port,
        host_port: None,
        protocol: protocol.to_string(),
      }),
    }
  }
  result
}

fn resolve_compose_path(working_dir: &str, file: &str) -> std::path::PathBuf {
  let path = Path::new(file);
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    Path::new(working_dir).join(path)
  }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ComposeFile {
  #[serde(default)]
  services: HashMap<String, ComposeService>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ComposeService {
  #[serde(default)]
  depends_on: DependsOn,
  #[serde(default)]
  links: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DependsOn {
  List(Vec<String>),
  Map(HashMap<String, serde_yaml_ng::Value>),
  #[serde(skip)]
  None,
}

impl Default for DependsOn {
  fn default() -> Self {
    DependsOn::None
  }
}

impl DependsOn {
  fn names(&self) -> Vec<String> {
    match self {
      DependsOn::List(names) => names.clone(),
      DependsOn::Map(map) => map.keys().cloned().collect(),
      DependsOn::None => Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_status_case_insensitively() {
    assert_eq!(
      parse_status(Some("RUNNING".to_string())),
      ContainerStatus::Running
    );
    assert_eq!(
      parse_status(Some("exited".to_string())),
      ContainerStatus::Exited
    );
    assert_eq!(parse_status(None), ContainerStatus::Unknown);
  }

  #[test]
  fn depends_on_list_and_map_both_yield_names() {
    let list: ComposeFile = serde_yaml_ng::from_str(
      "services:\n  web:\n    depends_on:\n      - db\n      - cache\n",
    )
    .unwrap();
    assert_eq!(
      list.services["web"].depends_on.names(),
      vec!["db".to_string(), "cache".to_string()]
    );

    let map: ComposeFile = serde_yaml_ng::from_str(
      "services:\n  web:\n    depends_on:\n      db:\n        condition: service_healthy\n",
    )
    .unwrap();
    assert_eq!(map.services["web"].depends_on.names(), vec!["db".to_string()]);
  }
}
