//! Agent-health scorer (C7, §4.7). Two entry points: [on_report] updates the
//! rolling counters on every ingest; [sweep] runs periodically and flips
//! silent hosts to `degraded`/`unhealthy` based purely on wall-clock gap.

use bson::doc;
use infra_mapper_client::entities::{host::AgentHealth, report::AgentMetadata};
use mungos::find::find_collect;
use tracing::{info, warn};

use crate::state::db_client;

/// §4.7: updates the rolling report-cadence counters on the host row from
/// one tick's `AgentMetadata`, then recomputes `agent_health` from the
/// table in §4.7. Best-effort — errors here never fail the ingest (§4.5
/// step 7, §7).
pub async fn on_report(
  host_id: &str,
  agent: &AgentMetadata,
  now: i64,
) -> anyhow::Result<()> {
  let db = db_client();
  let host = db
    .hosts
    .find_one(doc! { "id": host_id })
    .await?
    .ok_or_else(|| anyhow::anyhow!("host {host_id} not found for health update"))?;

  let reports_count = host.reports_count + 1;
  let avg_report_duration = match host.avg_report_duration_ms {
    Some(avg) => {
      ((0.8 * avg as f64) + (0.2 * agent.report_duration_ms as f64)).round()
        as i64
    }
    None => agent.report_duration_ms,
  };

  let mut set = doc! {
    "reports_count": reports_count as i64,
    "uptime_seconds": agent.uptime_seconds,
    "last_report_duration_ms": agent.report_duration_ms,
    "avg_report_duration_ms": avg_report_duration,
  };

  let consecutive_failures = if let Some(error) = &agent.error {
    if !error.is_empty() {
      set.insert("errors_count", (host.errors_count + 1) as i64);
      set.insert("last_error", error.clone());
      set.insert("last_error_at", now);
      host.consecutive_failures + 1
    } else {
      0
    }
  } else {
    0
  };
  set.insert("consecutive_failures", consecutive_failures as i32);

  let agent_health = score(
    consecutive_failures,
    agent.report_duration_ms,
    agent.report_interval,
    reports_count,
  );
  set.insert(
    "agent_health",
    bson::to_bson(&agent_health)?,
  );
  set.insert("report_interval_seconds", agent.report_interval as i32);

  db.hosts
    .update_one(doc! { "id": host_id }, doc! { "$set": set })
    .await?;

  if agent_health != host.agent_health {
    info!(host_id, health = ?agent_health, "agent health changed");
  }

  Ok(())
}

/// §4.7's threshold ladder, evaluated in order.
fn score(
  consecutive_failures: u32,
  report_duration_ms: i64,
  report_interval: u32,
  reports_count: u64,
) -> AgentHealth {
  if consecutive_failures >= 3 {
    return AgentHealth::Degraded;
  }
  if report_duration_ms as f64 > 0.9 * report_interval as f64 * 1000.0 {
    return AgentHealth::Degraded;
  }
  if reports_count < 3 {
    return AgentHealth::Unknown;
  }
  AgentHealth::Healthy
}

/// §4.7 sweep: periodic pass over every host, purely a function of
/// `now - last_seen` versus the host's own report interval (or 30s if the
/// host has never told us one).
pub async fn sweep(now: i64) {
  let db = db_client();
  let hosts = match find_collect(&db.hosts, doc! {}, None).await {
    Ok(hosts) => hosts,
    Err(e) => {
      warn!(error = %e, "health sweep failed to list hosts");
      return;
    }
  };

  for host in hosts {
    let interval_seconds = host.report_interval_seconds.unwrap_or(30) as i64;
    let delta_ms = now - host.last_seen;
    let interval_ms = interval_seconds * 1000;

    let (new_health, new_online) = if delta_ms > 5 * interval_ms {
      (AgentHealth::Unhealthy, false)
    } else if delta_ms > 2 * interval_ms {
      (AgentHealth::Degraded, host.is_online)
    } else {
      continue;
    };

    if new_health == host.agent_health && new_online == host.is_online {
      continue;
    }

    if let Err(e) = db
      .hosts
      .update_one(
        doc! { "id": &host.id },
        doc! { "$set": {
          "agent_health": bson::to_bson(&new_health).unwrap_or(bson::Bson::Null),
          "is_online": new_online,
        } },
      )
      .await
    {
      warn!(host_id = %host.id, error = %e, "health sweep failed to update host");
      continue;
    }
    info!(
      host_id = %host.id,
      health = ?new_health,
      is_online = new_online,
      "health sweep changed host state"
    );
  }
}

/// Spawns the periodic sweep loop (§4.7, §5: best-effort, independent of
/// the ingest path).
pub fn spawn_sweep_loop(interval_seconds: u64) {
  tokio::spawn(async move {
    let mut interval =
      tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      interval.tick().await;
      sweep(infra_mapper_client::timestamp_ms()).await;
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn three_consecutive_failures_is_degraded() {
    assert_eq!(score(3, 100, 30, 10), AgentHealth::Degraded);
  }

  #[test]
  fn slow_report_is_degraded() {
    assert_eq!(score(0, 28_000, 30, 10), AgentHealth::Degraded);
  }

  #[test]
  fn fewer_than_three_reports_is_unknown() {
    assert_eq!(score(0, 100, 30, 2), AgentHealth::Unknown);
  }

  #[test]
  fn otherwise_healthy() {
    assert_eq!(score(0, 100, 30, 10), AgentHealth::Healthy);
  }
}
