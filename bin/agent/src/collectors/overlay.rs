//! Overlay-network address detection (§3 "optional overlay-network
//! IP+hostname", §6 `overlay_detection_enabled`). Shells out to
//! `tailscale status --json` and reads the agent's own overlay IP/hostname
//! from the `Self` entry. Absence of the `tailscale` binary, or any failure
//! to parse its output, is not an error: overlay fields are simply left
//! unset (§7 "partial evidence failure").

use command::{command_exists, run_command};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct OverlayIdentity {
  pub ip: Option<String>,
  pub hostname: Option<String>,
}

pub async fn detect() -> OverlayIdentity {
  if !command_exists("tailscale") {
    return OverlayIdentity::default();
  }

  let output = run_command(
    "tailscale",
    &["status", "--json"],
    None::<&std::path::Path>,
  )
  .await;
  if !output.success() {
    debug!(stderr = %output.stderr, "tailscale status failed, skipping overlay detection");
    return OverlayIdentity::default();
  }

  match serde_json::from_str::<TailscaleStatus>(&output.stdout) {
    Ok(status) => OverlayIdentity {
      ip: status.myself.tailscale_ips.into_iter().next(),
      hostname: (!status.myself.host_name.is_empty())
        .then_some(status.myself.host_name),
    },
    Err(e) => {
      debug!(error = %e, "failed to parse tailscale status output");
      OverlayIdentity::default()
    }
  }
}

#[derive(Debug, Deserialize)]
struct TailscaleStatus {
  #[serde(rename = "Self")]
  myself: TailscaleSelf,
}

#[derive(Debug, Default, Deserialize)]
struct TailscaleSelf {
  #[serde(rename = "TailscaleIPs", default)]
  tailscale_ips: Vec<String>,
  #[serde(rename = "HostName", default)]
  host_name: String,
}
