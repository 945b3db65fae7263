//! Log-sink forwarder (C10, §4.10). Runs after every ingest's log batch is
//! persisted. Each enabled sink gets its own filter -> shape -> send pass;
//! a sink's failure only updates its own counters and never blocks the
//! others (§4.10 step 3, §5).

use std::time::Duration;

use bson::doc;
use infra_mapper_client::entities::{
  log::{ContainerLogEntry, LogStream},
  sink::{LogSink, SinkConfig},
};
use mungos::find::find_collect;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::{config::server_config, state::db_client};

/// §4.10: for each enabled sink, filter the batch down to what it accepts
/// and forward it. Called with the already-persisted, already-truncated
/// batch for one host's report.
pub async fn forward(host_id: &str, entries: &[ContainerLogEntry]) {
  if entries.is_empty() {
    return;
  }
  let db = db_client();
  let sinks: Vec<LogSink> =
    match find_collect(&db.log_sinks, doc! { "enabled": true }, None).await {
      Ok(sinks) => sinks,
      Err(e) => {
        warn!(host_id, error = %e, "failed to list log sinks");
        return;
      }
    };

  for sink in &sinks {
    if !sink.accepts_host(host_id) {
      continue;
    }
    let batch: Vec<&ContainerLogEntry> = entries
      .iter()
      .filter(|e| sink.accepts_entry(&e.container_id, e.stream))
      .collect();
    if batch.is_empty() {
      continue;
    }
    send_to_sink(sink, host_id, &batch).await;
  }
}

async fn send_to_sink(
  sink: &LogSink,
  host_id: &str,
  batch: &[&ContainerLogEntry],
) {
  let timeout = Duration::from_secs(server_config().log_sink_timeout_seconds);
  let result = match &sink.config {
    SinkConfig::Gelf { url, facility, version } => {
      send_gelf(url, facility, version, batch, sink.tls_skip_verify, timeout).await
    }
    SinkConfig::OpenObserve { url, org, stream, user, password } => {
      send_openobserve(
        url,
        org,
        stream,
        user.as_deref(),
        password.as_deref(),
        batch,
        sink.tls_skip_verify,
        timeout,
      )
      .await
    }
    SinkConfig::Loki { url, labels, tenant_id } => {
      send_loki(url, labels, tenant_id.as_deref(), host_id, batch, sink.tls_skip_verify, timeout)
        .await
    }
    SinkConfig::ElasticsearchBulk { url, index, user, password } => {
      send_elasticsearch(
        url,
        index,
        user.as_deref(),
        password.as_deref(),
        batch,
        sink.tls_skip_verify,
        timeout,
      )
      .await
    }
    SinkConfig::SplunkHec { url, token, source, sourcetype, index } => {
      send_splunk_hec(
        url,
        token,
        source.as_deref(),
        sourcetype.as_deref(),
        index.as_deref(),
        batch,
        sink.tls_skip_verify,
        timeout,
      )
      .await
    }
    SinkConfig::Syslog { host, port, protocol, facility, tls } => {
      send_syslog(host, *port, *protocol, *facility, *tls, batch, timeout).await
    }
    SinkConfig::GenericWebhook { url, method, wrap_in_array, headers } => {
      send_generic_webhook(url, method, *wrap_in_array, headers, batch, sink.tls_skip_verify, timeout)
        .await
    }
  };

  let now = infra_mapper_client::timestamp_ms();
  let update = match result {
    Ok(()) => doc! {
      "$inc": { "logs_sent": batch.len() as i64 },
      "$set": { "last_success": now },
    },
    Err(e) => {
      warn!(sink = sink.sink_type(), sink_id = %sink.id, error = %e, "log sink send failed");
      doc! {
        "$inc": { "errors_count": 1i64 },
        "$set": { "last_error": now, "last_error_message": e },
      }
    }
  };
  if let Err(e) = db_client()
    .log_sinks
    .update_one(doc! { "id": &sink.id }, update)
    .await
  {
    warn!(sink_id = %sink.id, error = %e, "failed to update log sink counters");
  }
}

fn http_client(timeout: Duration, skip_verify: bool) -> reqwest::Client {
  reqwest::Client::builder()
    .timeout(timeout)
    .danger_accept_invalid_certs(skip_verify)
    .build()
    .expect("failed to build log sink http client")
}

/// §4.10: message <= 250 chars goes entirely into `short_message`; longer
/// messages are truncated there and carried in full in `full_message`.
async fn send_gelf(
  url: &str,
  facility: &str,
  version: &str,
  batch: &[&ContainerLogEntry],
  skip_verify: bool,
  timeout: Duration,
) -> Result<(), String> {
  let client = http_client(timeout, skip_verify);
  for entry in batch {
    let short_message: String = entry.message.chars().take(250).collect();
    let body = json!({
      "version": version,
      "host": entry.host_id,
      "short_message": short_message,
      "full_message": entry.message,
      "timestamp": entry.timestamp as f64 / 1000.0,
      "level": if entry.stream == LogStream::Stderr { 3 } else { 6 },
      "facility": facility,
      "_container_id": entry.container_id,
    });
    let res = client.post(url).json(&body).send().await.map_err(|e| e.to_string())?;
    if !res.status().is_success() {
      return Err(format!("gelf endpoint returned {}", res.status()));
    }
  }
  Ok(())
}

async fn send_openobserve(
  url: &str,
  org: &str,
  stream: &str,
  user: Option<&str>,
  password: Option<&str>,
  batch: &[&ContainerLogEntry],
  skip_verify: bool,
  timeout: Duration,
) -> Result<(), String> {
  let rows: Vec<_> = batch
    .iter()
    .map(|e| {
      json!({
        "_timestamp": e.timestamp,
        "host_id": e.host_id,
        "container_id": e.container_id,
        "stream": e.stream,
        "message": e.message,
      })
    })
    .collect();
  let endpoint = format!("{}/api/{org}/{stream}/_json", url.trim_end_matches('/'));
  let mut request = http_client(timeout, skip_verify).post(&endpoint).json(&rows);
  if let (Some(user), Some(password)) = (user, password) {
    request = request.basic_auth(user, Some(password));
  }
  let res = request.send().await.map_err(|e| e.to_string())?;
  if !res.status().is_success() {
    return Err(format!("openobserve endpoint returned {}", res.status()));
  }
  Ok(())
}

/// §4.10: grouped into Loki streams keyed by `{container, host, stream}`
/// labels (plus any sink-configured extra labels); values are `[ts_ns, line]`.
async fn send_loki(
  url: &str,
  extra_labels: &std::collections::HashMap<String, String>,
  tenant_id: Option<&str>,
  host_id: &str,
  batch: &[&ContainerLogEntry],
  skip_verify: bool,
  timeout: Duration,
) -> Result<(), String> {
  use std::collections::BTreeMap;
  let mut streams: BTreeMap<(String, String), Vec<[String; 2]>> = BTreeMap::new();
  for entry in batch {
    let key = (entry.container_id.clone(), format!("{:?}", entry.stream).to_lowercase());
    streams.entry(key).or_default().push([
      format!("{}", entry.timestamp as i128 * 1_000_000),
      entry.message.clone(),
    ]);
  }

  let stream_entries: Vec<_> = streams
    .into_iter()
    .map(|((container_id, stream), values)| {
      let mut labels = extra_labels.clone();
      labels.insert("container".to_string(), container_id);
      labels.insert("host".to_string(), host_id.to_string());
      labels.insert("stream".to_string(), stream);
      json!({ "stream": labels, "values": values })
    })
    .collect();

  let endpoint = format!("{}/loki/api/v1/push", url.trim_end_matches('/'));
  let mut request = http_client(timeout, skip_verify)
    .post(&endpoint)
    .json(&json!({ "streams": stream_entries }));
  if let Some(tenant_id) = tenant_id {
    request = request.header("X-Scope-OrgID", tenant_id);
  }
  let res = request.send().await.map_err(|e| e.to_string())?;
  if !res.status().is_success() {
    return Err(format!("loki endpoint returned {}", res.status()));
  }
  Ok(())
}

/// §4.10: NDJSON of alternating `{"index": {...}}` action lines and document
/// lines, posted to `_bulk`.
async fn send_elasticsearch(
  url: &str,
  index: &str,
  user: Option<&str>,
  password: Option<&str>,
  batch: &[&ContainerLogEntry],
  skip_verify: bool,
  timeout: Duration,
) -> Result<(), String> {
  let mut ndjson = String::new();
  for entry in batch {
    ndjson.push_str(&json!({ "index": { "_index": index } }).to_string());
    ndjson.push('\n');
    ndjson.push_str(
      &json!({
        "@timestamp": entry.timestamp,
        "host_id": entry.host_id,
        "container_id": entry.container_id,
        "stream": entry.stream,
        "message": entry.message,
      })
      .to_string(),
    );
    ndjson.push('\n');
  }

  let endpoint = format!("{}/_bulk", url.trim_end_matches('/'));
  let mut request = http_client(timeout, skip_verify)
    .post(&endpoint)
    .header("Content-Type", "application/x-ndjson")
    .body(ndjson);
  if let (Some(user), Some(password)) = (user, password) {
    request = request.basic_auth(user, Some(password));
  }
  let res = request.send().await.map_err(|e| e.to_string())?;
  if !res.status().is_success() {
    return Err(format!("elasticsearch bulk endpoint returned {}", res.status()));
  }
  Ok(())
}

async fn send_splunk_hec(
  url: &str,
  token: &str,
  source: Option<&str>,
  sourcetype: Option<&str>,
  index: Option<&str>,
  batch: &[&ContainerLogEntry],
  skip_verify: bool,
  timeout: Duration,
) -> Result<(), String> {
  let client = http_client(timeout, skip_verify);
  let endpoint = format!("{}/services/collector/event", url.trim_end_matches('/'));
  for entry in batch {
    let mut event = json!({
      "time": entry.timestamp as f64 / 1000.0,
      "host": entry.host_id,
      "event": {
        "container_id": entry.container_id,
        "stream": entry.stream,
        "message": entry.message,
      },
    });
    if let Some(source) = source {
      event["source"] = json!(source);
    }
    if let Some(sourcetype) = sourcetype {
      event["sourcetype"] = json!(sourcetype);
    }
    if let Some(index) = index {
      event["index"] = json!(index);
    }
    let res = client
      .post(&endpoint)
      .header("Authorization", format!("Splunk {token}"))
      .json(&event)
      .send()
      .await
      .map_err(|e| e.to_string())?;
    if !res.status().is_success() {
      return Err(format!("splunk hec endpoint returned {}", res.status()));
    }
  }
  Ok(())
}

/// §4.10: RFC 5424 lines over TCP (optionally TLS) or UDP datagrams.
async fn send_syslog(
  host: &str,
  port: u16,
  protocol: infra_mapper_client::entities::sink::SyslogProtocol,
  facility: u8,
  tls: bool,
  batch: &[&ContainerLogEntry],
  timeout: Duration,
) -> Result<(), String> {
  use infra_mapper_client::entities::sink::SyslogProtocol;
  let addr = format!("{host}:{port}");
  let lines: Vec<String> = batch.iter().map(|e| syslog_line(e, facility)).collect();

  let send = async {
    match protocol {
      SyslogProtocol::Udp => {
        let socket = tokio::net::UdpSocket::bind("0.0.0.0:0")
          .await
          .map_err(|e| e.to_string())?;
        socket.connect(&addr).await.map_err(|e| e.to_string())?;
        for line in &lines {
          socket.send(line.as_bytes()).await.map_err(|e| e.to_string())?;
        }
        Ok(())
      }
      SyslogProtocol::Tcp => {
        let stream = tokio::net::TcpStream::connect(&addr)
          .await
          .map_err(|e| e.to_string())?;
        if tls {
          let mut roots = tokio_rustls::rustls::RootCertStore::empty();
          for cert in
            rustls_native_certs::load_native_certs().certs
          {
            let _ = roots.add(cert);
          }
          let config = tokio_rustls::rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
          let connector = tokio_rustls::TlsConnector::from(std::sync::Arc::new(config));
          let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| e.to_string())?;
          let mut tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| e.to_string())?;
          for line in &lines {
            tls_stream
              .write_all(format!("{line}\n").as_bytes())
              .await
              .map_err(|e| e.to_string())?;
          }
        } else {
          let mut stream = stream;
          for line in &lines {
            stream
              .write_all(format!("{line}\n").as_bytes())
              .await
              .map_err(|e| e.to_string())?;
          }
        }
        Ok(())
      }
    }
  };
  tokio::time::timeout(timeout, send)
    .await
    .map_err(|_| "syslog send timed out".to_string())?
}

fn syslog_line(
  entry: &ContainerLogEntry,
  facility: u8,
) -> String {
  let severity = if entry.stream == LogStream::Stderr { 3 } else { 6 };
  let priority = facility as u32 * 8 + severity;
  let timestamp = chrono::DateTime::from_timestamp_millis(entry.timestamp)
    .unwrap_or_default()
    .to_rfc3339();
  format!(
    "<{priority}>1 {timestamp} {} {} - - - {}",
    entry.host_id, entry.container_id, entry.message
  )
}

async fn send_generic_webhook(
  url: &str,
  method: &str,
  wrap_in_array: bool,
  headers: &std::collections::HashMap<String, String>,
  batch: &[&ContainerLogEntry],
  skip_verify: bool,
  timeout: Duration,
) -> Result<(), String> {
  let rows: Vec<_> = batch
    .iter()
    .map(|e| {
      json!({
        "timestamp": e.timestamp,
        "host_id": e.host_id,
        "container_id": e.container_id,
        "stream": e.stream,
        "message": e.message,
      })
    })
    .collect();
  let body = if wrap_in_array { json!(rows) } else { json!({ "logs": rows }) };

  let http_method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
    .unwrap_or(reqwest::Method::POST);
  let mut request = http_client(timeout, skip_verify).request(http_method, url).json(&body);
  for (key, value) in headers {
    request = request.header(key, value);
  }
  let res = request.send().await.map_err(|e| e.to_string())?;
  if !res.status().is_success() {
    return Err(format!("generic webhook returned {}", res.status()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gelf_short_message_truncates_at_250_chars() {
    let entry = ContainerLogEntry {
      container_id: "h:abc123456789".to_string(),
      host_id: "h".to_string(),
      timestamp: 0,
      stream: LogStream::Stdout,
      message: "x".repeat(300),
    };
    let short: String = entry.message.chars().take(250).collect();
    assert_eq!(short.len(), 250);
  }

  #[test]
  fn syslog_level_reflects_stream() {
    let stderr = ContainerLogEntry {
      container_id: "h:abc".to_string(),
      host_id: "h".to_string(),
      timestamp: 0,
      stream: LogStream::Stderr,
      message: "boom".to_string(),
    };
    let line = syslog_line(&stderr, 16);
    assert!(line.starts_with("<131>1 "));
  }
}
