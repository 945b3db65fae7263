//! Retention sweep for the two append-only time-series families (§3:
//! "retention-bounded (default 7 days)" for metrics, "N-day retention" for
//! logs). Grounded on the teacher's `startup::run_startup_actions`-style
//! periodic background task shape (`bin/core/src/startup.rs`), generalized
//! from a one-shot startup pass to a recurring interval loop since nothing
//! here is startup-only — the window needs to keep sliding forward.

use bson::doc;
use tracing::{error, info};

use crate::state::db_client;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub async fn purge_expired(metrics_retention_days: u32, logs_retention_days: u32) {
  let now = infra_mapper_client::timestamp_ms();
  let metrics_cutoff = now - metrics_retention_days as i64 * MS_PER_DAY;
  let logs_cutoff = now - logs_retention_days as i64 * MS_PER_DAY;

  match db_client()
    .host_metrics
    .delete_many(doc! { "timestamp": { "$lt": metrics_cutoff } })
    .await
  {
    Ok(res) if res.deleted_count > 0 => {
      info!(deleted = res.deleted_count, "purged expired host metrics")
    }
    Ok(_) => {}
    Err(e) => error!(error = %e, "failed to purge expired host metrics"),
  }

  match db_client()
    .container_metrics
    .delete_many(doc! { "timestamp": { "$lt": metrics_cutoff } })
    .await
  {
    Ok(res) if res.deleted_count > 0 => {
      info!(deleted = res.deleted_count, "purged expired container metrics")
    }
    Ok(_) => {}
    Err(e) => error!(error = %e, "failed to purge expired container metrics"),
  }

  match db_client()
    .logs
    .delete_many(doc! { "timestamp": { "$lt": logs_cutoff } })
    .await
  {
    Ok(res) if res.deleted_count > 0 => {
      info!(deleted = res.deleted_count, "purged expired log entries")
    }
    Ok(_) => {}
    Err(e) => error!(error = %e, "failed to purge expired log entries"),
  }
}

/// Runs once an hour; retention windows are measured in days, so there is
/// no benefit to sweeping more often than that.
pub fn spawn_retention_loop(metrics_retention_days: u32, logs_retention_days: u32) {
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      interval.tick().await;
      purge_expired(metrics_retention_days, logs_retention_days).await;
    }
  });
}
