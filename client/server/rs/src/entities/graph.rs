use serde::{Deserialize, Serialize};

use crate::entities::connection::SourceMethod;

/// Filter accepted by `GET /api/v1/graph` (§6). `organization_id`/`team_id`
/// scoping is resolved by the out-of-scope RBAC collaborator (§1); the
/// materializer only needs the already-resolved set of visible host ids
/// (see [crate::entities::graph::GraphFilter::visible_host_ids]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphFilter {
  #[serde(default)]
  pub include_offline: bool,
  pub host_pattern: Option<String>,
  pub project_pattern: Option<String>,
  /// When `Some`, restricts to exactly these host ids (already resolved by
  /// the org/team boundary described in §4.6 step 1). `None` means
  /// "all hosts visible to the caller", which in the core-only build here
  /// is simply all hosts.
  #[serde(skip)]
  pub restrict_to_host_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData {
  pub nodes: Vec<GraphNode>,
  pub edges: Vec<GraphEdge>,
  pub last_updated: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
  /// `container:<host_id>:<short_id>`, `host:<host_id>`, or `external:<ip>`.
  pub id: String,
  pub kind: GraphNodeKind,
  pub label: String,
  pub host_id: Option<String>,
  pub status: Option<String>,
  pub project: Option<String>,
  pub service: Option<String>,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GraphNodeKind {
  Container,
  Host,
  External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
  pub source: String,
  pub target: String,
  pub kind: GraphEdgeKind,
  pub source_method: Option<SourceMethod>,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GraphEdgeKind {
  /// From `declared_dependencies` (§4.2/§4.6 step 4).
  Dependency,
  /// Star topology linking compose-mates with no declared dependency
  /// (§4.6 step 4).
  ProjectGrouping,
  /// From an observed [crate::entities::connection::Connection] (§4.6 step 5).
  Observed,
}

/// Caps the number of synthetic `external:<ip>` nodes per materialization
/// (§4.6 step 5, §8 scenario 6). The underlying connection rows are never
/// capped — only what the graph emits.
pub const MAX_EXTERNAL_NODES: usize = 20;
