//! Alert rule evaluator (C8, §4.8). Runs after every ingest and on demand
//! (`POST /api/v1/alerts/evaluate`). For each enabled rule, dispatches by
//! `rule_type`, applies cooldown/dedup, fires new alerts, auto-resolves
//! alerts whose condition has cleared, and hands firing alerts to the
//! notifier (C9).

use bson::doc;
use infra_mapper_client::entities::{
  alert::{
    Alert, AlertRule, AlertStatus, ContainerStoppedConfig,
    ContainerUnhealthyConfig, EvaluationStats, HostOfflineConfig, NotificationAttempt,
    RuleType, container_stopped_title, container_unhealthy_title,
    host_offline_title,
  },
  container::Container,
  host::Host,
  pattern::matches_filter,
};
use mungos::find::find_collect;
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{notify, state::db_client};

pub async fn evaluate() -> anyhow::Result<EvaluationStats> {
  let db = db_client();
  let rules: Vec<AlertRule> =
    find_collect(&db.alert_rules, doc! { "enabled": true }, None).await?;
  let now = infra_mapper_client::timestamp_ms();

  let mut stats = EvaluationStats::default();
  for rule in &rules {
    stats.rules_evaluated += 1;
    match rule.rule_type {
      RuleType::HostOffline => {
        evaluate_host_offline(rule, now, &mut stats).await
      }
      RuleType::ContainerStopped => {
        evaluate_container_stopped(rule, now, &mut stats).await
      }
      RuleType::ContainerUnhealthy => {
        evaluate_container_unhealthy(rule, now, &mut stats).await
      }
    }
  }
  Ok(stats)
}

async fn evaluate_host_offline(
  rule: &AlertRule,
  now: i64,
  stats: &mut EvaluationStats,
) {
  let config: HostOfflineConfig = match serde_json::from_value(rule.config.clone())
  {
    Ok(c) => c,
    Err(e) => {
      warn!(rule_id = %rule.id, error = %e, "invalid host_offline rule config, skipping");
      return;
    }
  };

  let db = db_client();
  let hosts: Vec<Host> = match find_collect(&db.hosts, doc! {}, None).await {
    Ok(hosts) => hosts,
    Err(e) => {
      error!(rule_id = %rule.id, error = %e, "failed to list hosts for host_offline rule");
      return;
    }
  };

  let threshold_ms = config.timeout_minutes as i64 * 60_000;
  let offline: Vec<&Host> = hosts
    .iter()
    .filter(|h| now - h.last_seen > threshold_ms)
    .filter(|h| matches_filter(rule.host_filter.as_deref(), &h.hostname))
    .collect();
  let offline_ids: std::collections::HashSet<&str> =
    offline.iter().map(|h| h.id.as_str()).collect();

  for host in &offline {
    let fired = try_fire(
      rule,
      vec![host.id.clone()],
      Vec::new(),
      host_offline_title(&host.hostname),
      format!(
        "{} has not reported in {} minutes (last seen {} ms ago)",
        host.hostname, config.timeout_minutes, now - host.last_seen
      ),
      json!({ "last_seen": host.last_seen, "hostname": host.hostname }),
      now,
    )
    .await;
    if fired {
      stats.alerts_fired += 1;
    }
  }

  // Auto-resolve: any open alert for this rule whose host cleared the
  // offline condition (§4.8).
  let open_alerts: Vec<Alert> = match find_collect(
    &db.alerts,
    doc! { "rule_id": &rule.id, "status": { "$in": ["active", "acknowledged"] } },
    None,
  )
  .await
  {
    Ok(alerts) => alerts,
    Err(e) => {
      error!(rule_id = %rule.id, error = %e, "failed to list open alerts for auto-resolve");
      return;
    }
  };
  for alert in open_alerts {
    let still_offline = alert
      .host_ids
      .first()
      .map(|id| offline_ids.contains(id.as_str()))
      .unwrap_or(false);
    if !still_offline && resolve(&alert.id, now).await {
      stats.alerts_resolved += 1;
    }
  }
}

async fn evaluate_container_stopped(
  rule: &AlertRule,
  now: i64,
  stats: &mut EvaluationStats,
) {
  let config: ContainerStoppedConfig =
    serde_json::from_value(rule.config.clone()).unwrap_or_default();
  evaluate_container_rule(
    rule,
    &config.exclude,
    now,
    stats,
    |c| c.status.is_stopped_like(),
    |c| container_stopped_title(&c.name, &format!("{:?}", c.status).to_lowercase()),
    |c| format!("Container {} on host {} is {:?}", c.name, c.host_id, c.status),
    |c| json!({ "status": c.status, "image": c.image }),
  )
  .await;
}

async fn evaluate_container_unhealthy(
  rule: &AlertRule,
  now: i64,
  stats: &mut EvaluationStats,
) {
  let config: ContainerUnhealthyConfig =
    serde_json::from_value(rule.config.clone()).unwrap_or_default();
  evaluate_container_rule(
    rule,
    &config.exclude,
    now,
    stats,
    |c| {
      matches!(
        c.health,
        infra_mapper_client::entities::container::ContainerHealth::Unhealthy
      )
    },
    |c| container_unhealthy_title(&c.name),
    |c| format!("Container {} on host {} is unhealthy", c.name, c.host_id),
    |c| json!({ "health": c.health, "image": c.image }),
  )
  .await;
}

/// Shared scan/fire/auto-resolve shape for the two container-scoped rule
/// types (§4.8). `condition` decides membership in the currently-matching
/// set; everything else (filters, cooldown, auto-resolution) is identical.
#[allow(clippy::too_many_arguments)]
async fn evaluate_container_rule(
  rule: &AlertRule,
  exclude: &[String],
  now: i64,
  stats: &mut EvaluationStats,
  condition: impl Fn(&Container) -> bool,
  title: impl Fn(&Container) -> String,
  message: impl Fn(&Container) -> String,
  context: impl Fn(&Container) -> serde_json::Value,
) {
  let db = db_client();
  let containers: Vec<Container> =
    match find_collect(&db.containers, doc! {}, None).await {
      Ok(containers) => containers,
      Err(e) => {
        error!(rule_id = %rule.id, error = %e, "failed to list containers for rule");
        return;
      }
    };

  let matching: Vec<&Container> = containers
    .iter()
    .filter(|c| condition(c))
    .filter(|c| !exclude.iter().any(|ex| ex == &c.name || ex == &c.id))
    .filter(|c| matches_filter(rule.container_filter.as_deref(), &c.name))
    .filter(|c| {
      matches_filter(
        rule.project_filter.as_deref(),
        c.compose_project.as_deref().unwrap_or(""),
      )
    })
    .collect();
  let matching_ids: std::collections::HashSet<&str> =
    matching.iter().map(|c| c.id.as_str()).collect();

  for container in &matching {
    let fired = try_fire(
      rule,
      Vec::new(),
      vec![container.id.clone()],
      title(container),
      message(container),
      context(container),
      now,
    )
    .await;
    if fired {
      stats.alerts_fired += 1;
    }
  }

  let open_alerts: Vec<Alert> = match find_collect(
    &db.alerts,
    doc! { "rule_id": &rule.id, "status": { "$in": ["active", "acknowledged"] } },
    None,
  )
  .await
  {
    Ok(alerts) => alerts,
    Err(e) => {
      error!(rule_id = %rule.id, error = %e, "failed to list open alerts for auto-resolve");
      return;
    }
  };
  for alert in open_alerts {
    let still_matching = alert
      .container_ids
      .first()
      .map(|id| matching_ids.contains(id.as_str()))
      .unwrap_or(false);
    if !still_matching && resolve(&alert.id, now).await {
      stats.alerts_resolved += 1;
    }
  }
}

/// §4.8: fires iff neither (a) a fired alert exists within the rule's
/// cooldown for this (rule, resource), nor (b) an already-active alert
/// exists for this (rule, resource). On firing, invokes the notifier
/// (§4.8's "calls C9 with the alert and the list of enabled channels").
#[allow(clippy::too_many_arguments)]
async fn try_fire(
  rule: &AlertRule,
  host_ids: Vec<String>,
  container_ids: Vec<String>,
  title: String,
  message: String,
  context: serde_json::Value,
  now: i64,
) -> bool {
  let db = db_client();
  let resource_key = host_ids.first().or(container_ids.first());
  let Some(resource_key) = resource_key else { return false };

  let cooldown_ms = rule.cooldown_minutes as i64 * 60_000;
  let recent_or_active = match find_collect(
    &db.alerts,
    doc! {
      "rule_id": &rule.id,
      "$or": [
        { "triggered_at": { "$gte": now - cooldown_ms } },
        { "status": { "$in": ["active", "acknowledged"] } },
      ],
    },
    None,
  )
  .await
  {
    Ok(alerts) => alerts,
    Err(e) => {
      error!(rule_id = %rule.id, error = %e, "failed to check cooldown/active alerts");
      return false;
    }
  };
  let blocked = recent_or_active
    .iter()
    .any(|a| a.resource_key() == *resource_key);
  if blocked {
    return false;
  }

  let alert = Alert {
    id: Uuid::new_v4().to_string(),
    rule_id: rule.id.clone(),
    rule_type: rule.rule_type,
    severity: rule.severity,
    status: AlertStatus::Active,
    title,
    message,
    host_ids,
    container_ids,
    context,
    triggered_at: now,
    resolved_at: None,
    acknowledged_at: None,
    notifications_sent: Vec::new(),
  };

  let channels = match find_collect(&db.alert_channels, doc! { "enabled": true }, None)
    .await
  {
    Ok(channels) => channels,
    Err(e) => {
      error!(error = %e, "failed to list alert channels for fan-out");
      Vec::new()
    }
  };
  let outcomes = notify::fan_out(&alert, &channels).await;
  let notifications_sent = outcomes
    .into_iter()
    .map(|(channel_id, outcome)| {
      let channel_type = channels
        .iter()
        .find(|c| c.id == channel_id)
        .map(|c| c.channel_type().to_string())
        .unwrap_or_default();
      NotificationAttempt {
        channel_id,
        channel_type,
        sent_at: now,
        success: outcome.success,
        error: outcome.error,
      }
    })
    .collect::<Vec<_>>();

  let mut fired_alert = alert;
  fired_alert.notifications_sent = notifications_sent;

  if let Err(e) = db.alerts.insert_one(&fired_alert).await {
    error!(rule_id = %rule.id, error = %e, "failed to insert fired alert");
    return false;
  }
  true
}

async fn resolve(alert_id: &str, now: i64) -> bool {
  let db = db_client();
  match db
    .alerts
    .update_one(
      doc! { "id": alert_id },
      doc! { "$set": { "status": "resolved", "resolved_at": now } },
    )
    .await
  {
    Ok(_) => true,
    Err(e) => {
      error!(alert_id, error = %e, "failed to auto-resolve alert");
      false
    }
  }
}

pub async fn acknowledge(alert_id: &str, now: i64) -> anyhow::Result<()> {
  db_client()
    .alerts
    .update_one(
      doc! { "id": alert_id, "status": "active" },
      doc! { "$set": { "status": "acknowledged", "acknowledged_at": now } },
    )
    .await?;
  Ok(())
}

pub async fn resolve_manual(alert_id: &str, now: i64) -> anyhow::Result<()> {
  db_client()
    .alerts
    .update_one(
      doc! { "id": alert_id },
      doc! { "$set": { "status": "resolved", "resolved_at": now } },
    )
    .await?;
  Ok(())
}
