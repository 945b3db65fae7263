//! Per-namespace `/proc/net` scan (§4.1.2). Enumerates `/proc/<pid>/cgroup`
//! to build `pid -> short_container_id`, then for each distinct network
//! namespace picks one representative pid and decodes `/proc/<pid>/net/{tcp,udp}`.
//! Host-namespace connections are read from pid 1. Permission or parse
//! failures on a single pid/namespace are skipped, never fatal (§7).

use std::{
  collections::HashMap,
  fs,
  os::unix::fs::MetadataExt,
};

use infra_mapper_client::entities::connection::{
  ConnectionEvidence, Protocol, SourceMethod,
};
use tracing::debug;

/// One representative pid per distinct net namespace, plus the short
/// container id (if any) that namespace belongs to. `None` container id
/// means the host namespace itself (represented by pid 1).
struct NamespaceRep {
  pid: i32,
  container_id: Option<String>,
}

pub fn scan() -> Vec<ConnectionEvidence> {
  let reps = representative_pids();
  let mut out = Vec::new();
  for rep in reps {
    out.extend(scan_pid_proto(rep.pid, rep.container_id.as_deref(), "tcp"));
    out.extend(scan_pid_proto(rep.pid, rep.container_id.as_deref(), "udp"));
  }
  out
}

/// Builds `pid -> short_container_id` from `/proc/<pid>/cgroup`, then picks
/// one pid per distinct net namespace inode (via `/proc/<pid>/ns/net`'s
/// target inode number). Falls back to just pid 1 for the host namespace if
/// no container pids are discoverable at all.
fn representative_pids() -> Vec<NamespaceRep> {
  let mut pid_to_container: HashMap<i32, String> = HashMap::new();
  let Ok(proc_entries) = fs::read_dir("/proc") else {
    return vec![NamespaceRep { pid: 1, container_id: None }];
  };

  for entry in proc_entries.flatten() {
    let Some(pid) = entry
      .file_name()
      .to_str()
      .and_then(|s| s.parse::<i32>().ok())
    else {
      continue;
    };
    if let Some(container_id) = container_id_for_pid(pid) {
      pid_to_container.insert(pid, container_id);
    }
  }

  let mut seen_namespaces: HashMap<u64, NamespaceRep> = HashMap::new();
  for (pid, container_id) in &pid_to_container {
    let Some(inode) = net_namespace_inode(*pid) else { continue };
    seen_namespaces.entry(inode).or_insert_with(|| NamespaceRep {
      pid: *pid,
      container_id: Some(container_id.clone()),
    });
  }

  let mut reps: Vec<NamespaceRep> = seen_namespaces.into_values().collect();

  // Host namespace, represented by pid 1, is always scanned in addition to
  // any container namespaces found (§4.1.2: "For host-namespace connections
  // it uses pid 1").
  let host_inode = net_namespace_inode(1);
  let already_covered = host_inode
    .map(|host| reps.iter().any(|r| net_namespace_inode(r.pid) == Some(host)))
    .unwrap_or(false);
  if !already_covered {
    reps.push(NamespaceRep { pid: 1, container_id: None });
  }

  reps
}

fn net_namespace_inode(pid: i32) -> Option<u64> {
  fs::metadata(format!("/proc/{pid}/ns/net")).ok().map(|m| m.ino())
}

/// Reads `/proc/<pid>/cgroup` and extracts a 64-hex-char container id from a
/// `docker`/`containerd`/`kubepods` style cgroup path, truncated to the
/// short 12-char form.
fn container_id_for_pid(pid: i32) -> Option<String> {
  let contents = fs::read_to_string(format!("/proc/{pid}/cgroup")).ok()?;
  for line in contents.lines() {
    if let Some(id) = extract_container_id(line) {
      return Some(id);
    }
  }
  None
}

fn extract_container_id(cgroup_line: &str) -> Option<String> {
  let path = cgroup_line.rsplit(':').next()?;
  for segment in path.split('/').rev() {
    let candidate = segment
      .strip_prefix("docker-")
      .and_then(|s| s.strip_suffix(".scope"))
      .unwrap_or(segment);
    if candidate.len() >= 12
      && candidate.chars().all(|c| c.is_ascii_hexdigit())
    {
      return Some(candidate.chars().take(12).collect());
    }
  }
  None
}

fn scan_pid_proto(
  pid: i32,
  container_id: Option<&str>,
  proto: &str,
) -> Vec<ConnectionEvidence> {
  let path = format!("/proc/{pid}/net/{proto}");
  let Ok(contents) = fs::read_to_string(&path) else {
    debug!(pid, proto, "failed to read proc net table, skipping");
    return Vec::new();
  };

  let protocol = if proto == "tcp" { Protocol::Tcp } else { Protocol::Udp };
  contents
    .lines()
    .skip(1) // header row
    .filter_map(|line| parse_proc_net_line(line, protocol))
    .filter(|evidence| !both_sides_loopback(evidence))
    .map(|mut evidence| {
      evidence.container_id = container_id.map(str::to_string);
      evidence.source_method = SourceMethod::ProcNet;
      evidence
    })
    .collect()
}

fn both_sides_loopback(evidence: &ConnectionEvidence) -> bool {
  is_loopback(&evidence.local_ip) && is_loopback(&evidence.remote_ip)
}

fn is_loopback(ip: &str) -> bool {
  ip.starts_with("127.") || ip == "::1"
}

/// Each row of `/proc/<pid>/net/{tcp,udp}` is whitespace-separated; columns
/// of interest: `local_address`, `rem_address` (both `HEXIP:HEXPORT`, little
/// endian per 32-bit word) and `st` (hex connection state).
fn parse_proc_net_line(
  line: &str,
  protocol: Protocol,
) -> Option<ConnectionEvidence> {
  let mut cols = line.split_whitespace();
  let _sl = cols.next()?;
  let local = cols.next()?;
  let remote = cols.next()?;
  let state_hex = cols.next()?;

  let (local_ip, local_port) = decode_hex_address(local)?;
  let (remote_ip, remote_port) = decode_hex_address(remote)?;
  let state = decode_tcp_state(state_hex, protocol);

  Some(ConnectionEvidence {
    container_id: None,
    local_ip,
    local_port,
    remote_ip,
    remote_port,
    protocol,
    state,
    source_method: SourceMethod::ProcNet,
  })
}

/// `HEXIP:HEXPORT`. The IP's 32-bit words are little-endian; for a 4-octet
/// IPv4 address that means the hex pairs read in reverse byte order.
fn decode_hex_address(field: &str) -> Option<(String, u16)> {
  let (ip_hex, port_hex) = field.split_once(':')?;
  let port = u16::from_str_radix(port_hex, 16).ok()?;
  let ip = decode_hex_ip(ip_hex)?;
  Some((ip, port))
}

fn decode_hex_ip(hex: &str) -> Option<String> {
  match hex.len() {
    8 => {
      let bytes = u32::from_str_radix(hex, 16).ok()?.to_le_bytes();
      Some(format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3]))
    }
    32 => {
      // IPv6: four little-endian 32-bit words.
      let mut octets = [0u8; 16];
      for word in 0..4 {
        let chunk = &hex[word * 8..word * 8 + 8];
        let value = u32::from_str_radix(chunk, 16).ok()?;
        octets[word * 4..word * 4 + 4].copy_from_slice(&value.to_le_bytes());
      }
      let segments: Vec<String> = octets
        .chunks(2)
        .map(|c| format!("{:02x}{:02x}", c[0], c[1]))
        .collect();
      Some(segments.join(":"))
    }
    _ => None,
  }
}

fn decode_tcp_state(hex: &str, protocol: Protocol) -> String {
  if protocol == Protocol::Udp {
    return "UNCONN".to_string();
  }
  match u8::from_str_radix(hex, 16).unwrap_or(0) {
    0x01 => "ESTABLISHED",
    0x02 => "SYN_SENT",
    0x03 => "SYN_RECV",
    0x04 => "FIN_WAIT1",
    0x05 => "FIN_WAIT2",
    0x06 => "TIME_WAIT",
    0x07 => "CLOSE",
    0x08 => "CLOSE_WAIT",
    0x09 => "LAST_ACK",
    0x0A => "LISTEN",
    0x0B => "CLOSING",
    _ => "UNKNOWN",
  }
  .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_little_endian_ipv4_and_port() {
    // 127.0.0.1:80 encoded as 0100007F:0050
    let (ip, port) = decode_hex_address("0100007F:0050").unwrap();
    assert_eq!(ip, "127.0.0.1");
    assert_eq!(port, 80);
  }

  #[test]
  fn listen_state_decodes_for_tcp() {
    assert_eq!(decode_tcp_state("0A", Protocol::Tcp), "LISTEN");
  }

  #[test]
  fn extracts_container_id_from_docker_cgroup_path() {
    let line = "0::/system.slice/docker-abcdef0123456789abcdef0123456789abcdef0123456789abcdef012345.scope";
    assert_eq!(
      extract_container_id(line),
      Some("abcdef012345".to_string())
    );
  }

  #[test]
  fn parses_full_line_and_drops_listen_loopback_state() {
    let line = "   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12345 1 0000000000000000 100 0 0 10 0";
    let evidence = parse_proc_net_line(line, Protocol::Tcp).unwrap();
    assert_eq!(evidence.local_ip, "127.0.0.1");
    assert_eq!(evidence.local_port, 8080);
    assert_eq!(evidence.state, "LISTEN");
  }
}
