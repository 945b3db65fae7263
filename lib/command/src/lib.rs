//! Bounded external-process execution, used by the agent's packet-capture
//! collector (§4.1.3) to run a namespace-entry helper with a hard
//! wall-clock deadline, and by the command server's `exec` handler.

use std::{path::Path, process::Stdio, time::Duration};

mod output;

pub use output::CommandOutput;
use tokio::process::Command;

/// Runs `program args...` to completion, capturing stdout/stderr. Does not
/// go through a shell, so arguments are never subject to shell expansion.
pub async fn run_command(
  program: &str,
  args: &[&str],
  path: impl Into<Option<&Path>>,
) -> CommandOutput {
  let mut cmd = Command::new(program);
  cmd
    .args(args)
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  if let Some(path) = path.into() {
    cmd.current_dir(path);
  }

  match cmd.spawn() {
    Ok(mut child) => {
      let pid = child.id();
      let output = child.wait_with_output().await;
      CommandOutput::from(output, pid)
    }
    Err(e) => CommandOutput::from_err(e, None),
  }
}

/// Like [run_command], but the child is killed if it hasn't exited within
/// `timeout`. Used for per-container packet captures, which must never
/// block the agent tick past `capture_duration + 5s` (§4.1.3, §5).
///
/// On timeout, whatever the process had written to stdout/stderr before
/// being killed is still returned — captures are expected to yield partial
/// results under time pressure (§7).
pub async fn run_command_with_timeout(
  program: &str,
  args: &[&str],
  timeout: Duration,
) -> CommandOutput {
  let mut cmd = Command::new(program);
  cmd
    .args(args)
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  let mut child = match cmd.spawn() {
    Ok(child) => child,
    Err(e) => return CommandOutput::from_err(e, None),
  };
  let pid = child.id();

  match tokio::time::timeout(timeout, child.wait_with_output()).await {
    Ok(output) => CommandOutput::from(output, pid),
    Err(_elapsed) => CommandOutput::from_err(
      std::io::Error::other(format!(
        "process exceeded {timeout:?} deadline and was killed"
      )),
      pid,
    ),
  }
}

/// Whether `program` is resolvable on `PATH`. Used at collector init to
/// decide whether packet capture is even possible (§7: "capture tool
/// missing -> detected at init; capture disabled").
pub fn command_exists(program: &str) -> bool {
  std::env::var_os("PATH")
    .map(|paths| {
      std::env::split_paths(&paths)
        .any(|dir| dir.join(program).is_file())
    })
    .unwrap_or(false)
}
