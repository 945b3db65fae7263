use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A directed network edge observed at a point in time, from one of two
/// independent evidence streams (kernel socket tables or in-namespace
/// packet capture).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
  pub source_host_id: String,
  /// Short id of the owning container, when attributable.
  pub source_container_id: Option<String>,
  pub local_ip: String,
  pub local_port: u16,
  pub remote_ip: String,
  pub remote_port: u16,
  pub protocol: Protocol,
  pub state: String,
  pub connection_type: ConnectionType,
  pub source_method: SourceMethod,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
  Tcp,
  Udp,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
  Internal,
  CrossHost,
  External,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceMethod {
  ProcNet,
  Tcpdump,
  /// Only produced at graph-materialization time, when both streams
  /// contributed evidence for the same collapsed edge.
  Both,
}

/// A raw connection record as collected by the agent, before the server
/// assigns `connection_type` (which needs the full fleet view).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvidence {
  pub container_id: Option<String>,
  pub local_ip: String,
  pub local_port: u16,
  pub remote_ip: String,
  pub remote_port: u16,
  pub protocol: Protocol,
  pub state: String,
  pub source_method: SourceMethod,
}

impl ConnectionEvidence {
  /// LISTEN rows and loopback/0.0.0.0 peers are never persisted (§3, §8).
  pub fn is_persistable(&self) -> bool {
    if self.state.eq_ignore_ascii_case("LISTEN") {
      return false;
    }
    !is_loopback_or_unspecified(&self.remote_ip)
  }

  fn key(&self) -> (String, u16, String, u16, Protocol) {
    (
      self.local_ip.clone(),
      self.local_port,
      self.remote_ip.clone(),
      self.remote_port,
      self.protocol,
    )
  }
}

fn is_loopback_or_unspecified(ip: &str) -> bool {
  ip.starts_with("127.") || ip == "::1" || ip == "0.0.0.0" || ip == "::"
}

/// Merges two evidence streams per §4.3 / §8's merge-correctness property:
/// `proc_net` entries win on key collision; `tcpdump` entries are added
/// only for keys not already present. Both loopback-to-loopback pairs and
/// LISTEN rows are dropped before keying, matching each collector's own
/// drop rule (§4.1.2/§4.1.3).
pub fn merge_connection_evidence(
  proc_net: Vec<ConnectionEvidence>,
  tcpdump: Vec<ConnectionEvidence>,
) -> Vec<ConnectionEvidence> {
  let mut seen: HashSet<(String, u16, String, u16, Protocol)> =
    HashSet::with_capacity(proc_net.len());
  let mut merged: Vec<ConnectionEvidence> = Vec::with_capacity(
    proc_net.len() + tcpdump.len(),
  );

  for evidence in proc_net {
    seen.insert(evidence.key());
    merged.push(evidence);
  }
  for evidence in tcpdump {
    if seen.insert(evidence.key()) {
      merged.push(evidence);
    }
  }

  merged
}

#[cfg(test)]
mod tests {
  use super::*;

  fn evidence(
    local_port: u16,
    remote_ip: &str,
    remote_port: u16,
    protocol: Protocol,
    state: &str,
    method: SourceMethod,
  ) -> ConnectionEvidence {
    ConnectionEvidence {
      container_id: None,
      local_ip: "172.17.0.2".into(),
      local_port,
      remote_ip: remote_ip.into(),
      remote_port,
      protocol,
      state: state.into(),
      source_method: method,
    }
  }

  #[test]
  fn proc_net_wins_on_key_collision() {
    let proc_net = vec![evidence(
      54322,
      "172.17.0.3",
      5432,
      Protocol::Tcp,
      "ESTAB",
      SourceMethod::ProcNet,
    )];
    let tcpdump = vec![
      evidence(
        54322,
        "172.17.0.3",
        5432,
        Protocol::Tcp,
        "ESTABLISHED",
        SourceMethod::Tcpdump,
      ),
      evidence(
        54400,
        "1.1.1.1",
        53,
        Protocol::Udp,
        "UNCONN",
        SourceMethod::Tcpdump,
      ),
    ];
    let merged = merge_connection_evidence(proc_net, tcpdump);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].source_method, SourceMethod::ProcNet);
    assert_eq!(merged[0].state, "ESTAB");
    assert_eq!(merged[1].source_method, SourceMethod::Tcpdump);
  }

  #[test]
  fn drops_listen_and_loopback() {
    let listen = evidence(
      80,
      "0.0.0.0",
      0,
      Protocol::Tcp,
      "LISTEN",
      SourceMethod::ProcNet,
    );
    assert!(!listen.is_persistable());
    let loopback = evidence(
      80,
      "127.0.0.1",
      5000,
      Protocol::Tcp,
      "ESTAB",
      SourceMethod::ProcNet,
    );
    assert!(!loopback.is_persistable());
  }
}
