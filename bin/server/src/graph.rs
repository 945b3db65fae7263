//! Graph materializer (C6, §4.6). Pure read path: resolves the visible
//! host set, indexes containers by `(host_id, ip)` and hosts by ip, then
//! walks declared dependencies, compose groupings, and persisted
//! connections to build the node/edge set served by `GET /api/v1/graph`.

use std::collections::{HashMap, HashSet};

use bson::doc;
use infra_mapper_client::entities::{
  connection::{Connection, SourceMethod},
  container::Container,
  graph::{GraphData, GraphEdge, GraphEdgeKind, GraphFilter, GraphNode, GraphNodeKind, MAX_EXTERNAL_NODES},
  host::Host,
  pattern::matches_filter,
};
use mungos::find::find_collect;

use crate::state::db_client;

const OFFLINE_THRESHOLD_MS: i64 = 5 * 60_000;

pub async fn materialize(filter: &GraphFilter) -> anyhow::Result<GraphData> {
  let db = db_client();
  let now = infra_mapper_client::timestamp_ms();

  // Step 1: resolve visible hosts.
  let all_hosts: Vec<Host> = find_collect(&db.hosts, doc! {}, None).await?;
  let visible_hosts: Vec<Host> = all_hosts
    .into_iter()
    .filter(|h| filter.include_offline || now - h.last_seen < OFFLINE_THRESHOLD_MS)
    .filter(|h| matches_filter(filter.host_pattern.as_deref(), &h.hostname))
    .filter(|h| {
      filter
        .restrict_to_host_ids
        .as_ref()
        .map_or(true, |ids| ids.iter().any(|id| id == &h.id))
    })
    .collect();
  let visible_host_ids: HashSet<&str> =
    visible_hosts.iter().map(|h| h.id.as_str()).collect();

  // Step 2: fetch containers for visible hosts, optionally by project pattern.
  let host_id_list: Vec<&str> = visible_host_ids.iter().copied().collect();
  let mut containers: Vec<Container> =
    find_collect(&db.containers, doc! { "host_id": { "$in": &host_id_list } }, None)
      .await?;
  containers.retain(|c| {
    matches_filter(
      filter.project_pattern.as_deref(),
      c.compose_project.as_deref().unwrap_or(""),
    )
  });

  // Step 3: indexes.
  let mut container_by_host_ip: HashMap<(&str, &str), &Container> = HashMap::new();
  for c in &containers {
    for ip in c.networks.values() {
      container_by_host_ip.insert((c.host_id.as_str(), ip.as_str()), c);
    }
  }
  let mut host_by_ip: HashMap<&str, &Host> = HashMap::new();
  for host in &visible_hosts {
    for ip in &host.ips {
      host_by_ip.insert(ip.as_str(), host);
    }
    if let Some(overlay) = &host.overlay_ip {
      host_by_ip.insert(overlay.as_str(), host);
    }
  }
  let container_by_id: HashMap<&str, &Container> =
    containers.iter().map(|c| (c.id.as_str(), c)).collect();
  let compose_index: HashMap<(&str, &str, &str), &str> = containers
    .iter()
    .filter_map(|c| {
      let (project, service) = c.compose_key()?;
      Some(((c.host_id.as_str(), project, service), c.id.as_str()))
    })
    .collect();

  // Step 4: one node per container, dependency edges, star project edges.
  let mut nodes: Vec<GraphNode> = containers
    .iter()
    .map(|c| GraphNode {
      id: c.id.clone(),
      kind: GraphNodeKind::Container,
      label: c.name.clone(),
      host_id: Some(c.host_id.clone()),
      status: Some(format!("{:?}", c.status).to_lowercase()),
      project: c.compose_project.clone(),
      service: c.compose_service.clone(),
    })
    .collect();

  let mut edges: Vec<GraphEdge> = Vec::new();
  for c in &containers {
    let Some((project, _service)) = c.compose_key() else { continue };
    for dep in &c.declared_dependencies {
      if let Some(&target_id) = compose_index.get(&(c.host_id.as_str(), project, dep.as_str())) {
        if target_id != c.id {
          edges.push(GraphEdge {
            source: c.id.clone(),
            target: target_id.to_string(),
            kind: GraphEdgeKind::Dependency,
            source_method: None,
          });
        }
      }
    }
  }

  let mut project_groups: HashMap<(&str, &str), Vec<&str>> = HashMap::new();
  for c in &containers {
    if let Some(project) = c.compose_project.as_deref() {
      project_groups
        .entry((c.host_id.as_str(), project))
        .or_default()
        .push(c.id.as_str());
    }
  }
  for members in project_groups.values() {
    let mut sorted = members.clone();
    sorted.sort_unstable();
    if let Some((hub, rest)) = sorted.split_first() {
      for member in rest {
        edges.push(GraphEdge {
          source: hub.to_string(),
          target: member.to_string(),
          kind: GraphEdgeKind::ProjectGrouping,
          source_method: None,
        });
      }
    }
  }

  // Step 5: resolve connections to targets, collecting per-edge evidence
  // for the step-6 collapse.
  let connections: Vec<Connection> = find_collect(
    &db.connections,
    doc! { "source_host_id": { "$in": &host_id_list } },
    None,
  )
  .await?;

  let mut observed: HashMap<(String, String), HashSet<SourceMethod>> = HashMap::new();
  let mut external_nodes: HashMap<String, GraphNode> = HashMap::new();

  for conn in &connections {
    let Some(source_id) = &conn.source_container_id else { continue };
    if !container_by_id.contains_key(source_id.as_str()) {
      continue;
    }

    let target_id = if let Some(&target) =
      container_by_host_ip.get((conn.source_host_id.as_str(), conn.remote_ip.as_str()))
    {
      Some(target.id.clone())
    } else if let Some(target_host) = host_by_ip.get(conn.remote_ip.as_str()) {
      containers
        .iter()
        .find(|c| {
          c.host_id == target_host.id
            && c.ports.iter().any(|p| p.host_port == Some(conn.remote_port))
        })
        .map(|c| c.id.clone())
    } else {
      let node_id = format!("external:{}", conn.remote_ip);
      if external_nodes.len() < MAX_EXTERNAL_NODES
        || external_nodes.contains_key(&node_id)
      {
        external_nodes.entry(node_id.clone()).or_insert_with(|| GraphNode {
          id: node_id.clone(),
          kind: GraphNodeKind::External,
          label: conn.remote_ip.clone(),
          host_id: None,
          status: None,
          project: None,
          service: None,
        });
        Some(node_id)
      } else {
        None
      }
    };

    let Some(target_id) = target_id else { continue };
    observed
      .entry((source_id.clone(), target_id))
      .or_default()
      .insert(conn.source_method);
  }

  // Step 6: collapse parallel edges, folding methods into `both` when both
  // streams contributed.
  for ((source, target), methods) in observed {
    let method = if methods.contains(&SourceMethod::ProcNet)
      && methods.contains(&SourceMethod::Tcpdump)
    {
      SourceMethod::Both
    } else {
      *methods.iter().next().unwrap()
    };
    edges.push(GraphEdge {
      source,
      target,
      kind: GraphEdgeKind::Observed,
      source_method: Some(method),
    });
  }

  nodes.extend(external_nodes.into_values());

  Ok(GraphData { nodes, edges, last_updated: now })
}
