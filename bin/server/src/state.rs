//! Process-wide singletons (§9's redesign flag: model these as explicit
//! long-lived services behind accessor functions, not a god object threaded
//! everywhere). Mirrors the teacher's `db_client()`/`init_db_client()`
//! pattern and its `CloneCache`-backed named registries.

use std::{
  sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use anyhow::{Context, anyhow};
use tracing::error;

use crate::{broadcast::Broadcaster, config::server_config};

static DB_CLIENT: OnceLock<database::Client> = OnceLock::new();

pub fn db_client() -> &'static database::Client {
  DB_CLIENT.get().unwrap_or_else(|| {
    error!(
      "FATAL: db_client accessed before initialized | Ensure init_db_client() is called during startup | Exiting..."
    );
    std::process::exit(1)
  })
}

/// Must be called in app startup sequence.
pub async fn init_db_client() {
  let init = async {
    let config = server_config();
    let client =
      database::Client::new(&config.database_uri, &config.database_name)
        .await
        .context("failed to initialize database client")?;
    DB_CLIENT.set(client).map_err(|_| {
      anyhow!("db_client initialized more than once - this should not happen")
    })?;
    anyhow::Ok(())
  }
  .await;
  if let Err(e) = init {
    error!("FATAL: Failed to initialize database::Client | {e:#} | Exiting...");
    std::process::exit(1)
  }
}

/// Shared outbound HTTP client pool (§5: "the command relay ... holds no
/// global state beyond an HTTP client pool"). Notifier and log-sink sends
/// build their own short-lived clients per destination timeout instead,
/// since those vary per channel/sink; this one is for the relay, whose
/// timeout is fixed server-wide.
pub fn relay_http_client() -> &'static reqwest::Client {
  static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
  CLIENT.get_or_init(|| {
    reqwest::Client::builder()
      .timeout(Duration::from_secs(
        server_config().agent_command_timeout_seconds,
      ))
      .build()
      .expect("failed to build relay http client")
  })
}

pub fn broadcaster() -> &'static Broadcaster {
  static BROADCASTER: OnceLock<Broadcaster> = OnceLock::new();
  BROADCASTER.get_or_init(Broadcaster::default)
}

/// Process start time, for `/health`'s `uptime_seconds` (§6).
pub fn process_start() -> std::time::Instant {
  static START: OnceLock<std::time::Instant> = OnceLock::new();
  *START.get_or_init(std::time::Instant::now)
}

static REQUESTS_TOTAL: AtomicU64 = AtomicU64::new(0);

pub fn record_request() {
  REQUESTS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn requests_total() -> u64 {
  REQUESTS_TOTAL.load(Ordering::Relaxed)
}
