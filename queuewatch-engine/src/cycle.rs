//! One poll cycle: fetch, parse, extract, diff against the last snapshot,
//! and apply the result to the shared registry.

use std::path::Path;

use chrono::{DateTime, Utc};
use queuewatch_core::{registry, DifferenceRecord, MonitorConfig, MonitorId, SlugChange};
use reqwest::header::ACCEPT;

use crate::engine::SharedRegistry;
use crate::error::PollError;
use crate::extract::{self, Extracted};
use crate::notify::{Notification, NotificationSink};

/// What a successful cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// New snapshot, no slug change (or no previous snapshot to compare to).
    Snapshot { snapshot: serde_json::Value },
    /// Slug changed since the previous snapshot.
    Changed {
        snapshot: serde_json::Value,
        difference: DifferenceRecord,
    },
}

/// Fetch and extract one record for `config`. No registry mutation.
pub async fn poll_once(
    client: &reqwest::Client,
    config: &MonitorConfig,
) -> Result<Extracted, PollError> {
    if config.endpoint_url.trim().is_empty() {
        return Err(PollError::MissingUrl {
            monitor: config.name.clone(),
        });
    }

    let response = client
        .get(&config.endpoint_url)
        .header(ACCEPT, "*/*")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(PollError::Http {
            status: status.as_u16(),
        });
    }

    let text = response.text().await?;
    let body = extract::parse_body(&text)?;
    extract::extract_record(&body, config.filter_key.as_deref()).ok_or(PollError::NoData)
}

/// Pure diff step: compare the freshly extracted record's slug against the
/// one derived from `config.last_snapshot`.
///
/// A difference is reported only when a previous snapshot exists and the
/// slugs differ; first-ever snapshots never count as changes.
pub fn evaluate(config: &MonitorConfig, extracted: Extracted, now: DateTime<Utc>) -> CycleOutcome {
    let previous = config.last_snapshot.as_ref().map(extract::slug_of_value);
    let current = extracted.slug().map(str::to_owned);
    let display_name = extracted.display_name().map(str::to_owned);
    let snapshot = extracted.into_value();

    match previous {
        Some(previous) if previous != current => {
            let difference = DifferenceRecord {
                name: display_name,
                url: change_url(&config.endpoint_url, current.as_deref()),
                slug_change: SlugChange { previous, current },
                detected_at: now,
            };
            CycleOutcome::Changed {
                snapshot,
                difference,
            }
        }
        _ => CycleOutcome::Snapshot { snapshot },
    }
}

/// Execute one full cycle for the monitor `id` and apply the outcome.
///
/// Errors are caught at the cycle boundary and surfaced through the
/// sink; callers running a recurring timer ignore the returned value and let
/// the next tick act as the retry.
pub async fn run_cycle(
    client: &reqwest::Client,
    home: &Path,
    registry: &SharedRegistry,
    id: &MonitorId,
    sink: &dyn NotificationSink,
) -> Result<CycleOutcome, PollError> {
    let config = {
        let reg = registry.read().await;
        reg.get(id)
            .cloned()
            .ok_or_else(|| PollError::UnknownMonitor(id.clone()))
    };

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::debug!(monitor_id = %id, "cycle skipped: monitor no longer registered");
            return Err(err);
        }
    };

    let outcome = match poll_once(client, &config).await {
        Ok(extracted) => evaluate(&config, extracted, Utc::now()),
        Err(err) => {
            sink.notify(&Notification::error(
                &config.id,
                &config.name,
                err.to_string(),
            ));
            return Err(err);
        }
    };

    let applied = apply_outcome(home, registry, id, outcome.clone()).await;
    if let Err(err) = applied {
        sink.notify(&Notification::error(
            &config.id,
            &config.name,
            format!("failed to record poll result: {err}"),
        ));
        return Err(err);
    }

    if let CycleOutcome::Changed { difference, .. } = &outcome {
        sink.notify(&Notification::info(
            &config.id,
            &config.name,
            format!(
                "change detected: slug {} is now {} ({})",
                format_slug(&difference.slug_change.previous),
                format_slug(&difference.slug_change.current),
                difference.url,
            ),
        ));
    }

    Ok(outcome)
}

async fn apply_outcome(
    home: &Path,
    registry: &SharedRegistry,
    id: &MonitorId,
    outcome: CycleOutcome,
) -> Result<(), PollError> {
    let mut reg = registry.write().await;
    reg.update(id, |monitor| match outcome {
        CycleOutcome::Snapshot { snapshot } => {
            monitor.last_snapshot = Some(snapshot);
        }
        CycleOutcome::Changed {
            snapshot,
            difference,
        } => {
            monitor.last_snapshot = Some(snapshot);
            monitor.last_difference = Some(difference);
        }
    })?;
    registry::save_at(home, &reg)?;
    Ok(())
}

fn change_url(endpoint: &str, slug: Option<&str>) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), slug.unwrap_or_default())
}

fn format_slug(slug: &Option<String>) -> String {
    match slug {
        Some(slug) => format!("'{slug}'"),
        None => "(none)".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    use queuewatch_core::Registry;
    use serde_json::json;
    use tokio::sync::RwLock;

    use crate::notify::Severity;

    fn monitor(url: &str, filter: Option<&str>) -> MonitorConfig {
        MonitorConfig::new("main", url, filter.map(str::to_owned), Some(1))
    }

    fn with_snapshot(mut config: MonitorConfig, snapshot: serde_json::Value) -> MonitorConfig {
        config.last_snapshot = Some(snapshot);
        config
    }

    /// Collects notifications for assertions.
    #[derive(Default)]
    struct MemorySink(Mutex<Vec<Notification>>);

    impl NotificationSink for MemorySink {
        fn notify(&self, notification: &Notification) {
            self.0.lock().expect("sink lock").push(notification.clone());
        }
    }

    impl MemorySink {
        fn drain(&self) -> Vec<Notification> {
            std::mem::take(&mut *self.0.lock().expect("sink lock"))
        }
    }

    /// Serve exactly one canned HTTP response on a random local port.
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len(),
            );
            stream.write_all(response.as_bytes()).expect("respond");
        });
        format!("http://{addr}/")
    }

    // evaluate

    #[test]
    fn first_snapshot_is_never_a_change() {
        let config = monitor("https://example.com/q", None);
        let extracted = Extracted::Record(record(json!({"slug": "v1"})));
        let outcome = evaluate(&config, extracted, Utc::now());
        assert!(matches!(outcome, CycleOutcome::Snapshot { .. }));
    }

    #[test]
    fn slug_change_produces_difference() {
        let config = with_snapshot(
            monitor("https://example.com/q", None),
            json!({"name": "main", "slug": "v1"}),
        );
        let extracted = Extracted::Record(record(json!({"name": "main", "slug": "v2"})));

        let outcome = evaluate(&config, extracted, Utc::now());
        let CycleOutcome::Changed {
            snapshot,
            difference,
        } = outcome
        else {
            panic!("expected a change");
        };
        assert_eq!(snapshot["slug"], "v2");
        assert_eq!(difference.slug_change.previous.as_deref(), Some("v1"));
        assert_eq!(difference.slug_change.current.as_deref(), Some("v2"));
        assert_eq!(difference.url, "https://example.com/q/v2");
        assert_eq!(difference.name.as_deref(), Some("main"));
    }

    #[test]
    fn equal_slugs_update_snapshot_only() {
        let config = with_snapshot(
            monitor("https://example.com/q", None),
            json!({"slug": "v1", "size": 10}),
        );
        let extracted = Extracted::Record(record(json!({"slug": "v1", "size": 99})));

        let outcome = evaluate(&config, extracted, Utc::now());
        let CycleOutcome::Snapshot { snapshot } = outcome else {
            panic!("expected snapshot-only outcome");
        };
        assert_eq!(snapshot["size"], 99);
    }

    #[test]
    fn slug_disappearing_counts_as_change() {
        let config = with_snapshot(monitor("https://example.com/q", None), json!({"slug": "v1"}));
        let extracted = Extracted::Record(record(json!({"size": 3})));

        let outcome = evaluate(&config, extracted, Utc::now());
        let CycleOutcome::Changed { difference, .. } = outcome else {
            panic!("expected a change");
        };
        assert_eq!(difference.slug_change.previous.as_deref(), Some("v1"));
        assert_eq!(difference.slug_change.current, None);
        assert_eq!(difference.url, "https://example.com/q/");
    }

    // poll_once

    #[tokio::test]
    async fn empty_url_is_a_validation_error() {
        let client = reqwest::Client::new();
        let err = poll_once(&client, &monitor("", None)).await.unwrap_err();
        assert!(matches!(err, PollError::MissingUrl { ref monitor } if monitor == "main"));
    }

    #[tokio::test]
    async fn non_2xx_status_maps_to_http_error() {
        let url = serve_once("503 Service Unavailable", "overloaded");
        let client = reqwest::Client::new();
        let err = poll_once(&client, &monitor(&url, None)).await.unwrap_err();
        assert!(matches!(err, PollError::Http { status: 503 }));
    }

    #[tokio::test]
    async fn json_body_is_extracted() {
        let url = serve_once("200 OK", r#"{"queues": [{"name": "main", "slug": "v1"}]}"#);
        let client = reqwest::Client::new();
        let extracted = poll_once(&client, &monitor(&url, Some("main")))
            .await
            .expect("extract");
        assert_eq!(extracted.slug(), Some("v1"));
    }

    #[tokio::test]
    async fn settings_literal_body_is_extracted() {
        let url = serve_once(
            "200 OK",
            r#"window.queueFair.settings = {"name": "main", "slug": "wave-2"};"#,
        );
        let client = reqwest::Client::new();
        let extracted = poll_once(&client, &monitor(&url, None)).await.expect("extract");
        assert_eq!(extracted.slug(), Some("wave-2"));
    }

    #[tokio::test]
    async fn html_body_is_unsupported_format() {
        let url = serve_once("200 OK", "<html><body>maintenance</body></html>");
        let client = reqwest::Client::new();
        let err = poll_once(&client, &monitor(&url, None)).await.unwrap_err();
        assert!(matches!(err, PollError::UnsupportedFormat));
    }

    #[tokio::test]
    async fn unmatched_filter_is_no_data() {
        let url = serve_once("200 OK", r#"{"queues": [{"name": "a"}]}"#);
        let client = reqwest::Client::new();
        let err = poll_once(&client, &monitor(&url, Some("z"))).await.unwrap_err();
        assert!(matches!(err, PollError::NoData));
    }

    #[tokio::test]
    async fn connection_failure_is_a_request_error() {
        // Reserved port with no listener.
        let client = reqwest::Client::new();
        let err = poll_once(&client, &monitor("http://127.0.0.1:1/", None))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Request(_)));
    }

    // run_cycle

    #[tokio::test]
    async fn validation_error_notifies_and_leaves_registry_untouched() {
        let home = tempfile::TempDir::new().expect("home");
        let mut reg = Registry::new();
        let id = reg.insert(monitor("", None)).id.clone();
        queuewatch_core::registry::save_at(home.path(), &reg).expect("save");
        let registry: SharedRegistry = Arc::new(RwLock::new(reg));

        let sink = MemorySink::default();
        let client = reqwest::Client::new();
        let result = run_cycle(&client, home.path(), &registry, &id, &sink).await;
        assert!(matches!(result, Err(PollError::MissingUrl { .. })));

        let notes = sink.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Error);
        assert!(notes[0].message.contains("no endpoint URL"));

        let reg = registry.read().await;
        assert!(reg.get(&id).expect("entry").last_snapshot.is_none());
    }

    #[tokio::test]
    async fn change_is_applied_persisted_and_notified() {
        let url = serve_once("200 OK", r#"{"name": "main", "slug": "v2"}"#);
        let home = tempfile::TempDir::new().expect("home");

        let mut reg = Registry::new();
        let config = with_snapshot(monitor(&url, None), json!({"name": "main", "slug": "v1"}));
        let id = config.id.clone();
        reg.insert(config);
        queuewatch_core::registry::save_at(home.path(), &reg).expect("save");
        let registry: SharedRegistry = Arc::new(RwLock::new(reg));

        let sink = MemorySink::default();
        let client = reqwest::Client::new();
        let outcome = run_cycle(&client, home.path(), &registry, &id, &sink)
            .await
            .expect("cycle");
        assert!(matches!(outcome, CycleOutcome::Changed { .. }));

        let notes = sink.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Info);
        assert!(notes[0].message.contains("'v1'"));
        assert!(notes[0].message.contains("'v2'"));

        // In-memory entry and the persisted file both carry the difference.
        {
            let reg = registry.read().await;
            let entry = reg.get(&id).expect("entry");
            let difference = entry.last_difference.as_ref().expect("difference");
            assert_eq!(difference.slug_change.current.as_deref(), Some("v2"));
            assert_eq!(entry.last_snapshot.as_ref().unwrap()["slug"], "v2");
        }
        let persisted = queuewatch_core::registry::load_at(home.path()).expect("reload");
        assert!(persisted.get(&id).expect("entry").last_difference.is_some());
    }

    #[tokio::test]
    async fn unchanged_slug_keeps_existing_difference() {
        let url = serve_once("200 OK", r#"{"name": "main", "slug": "v1", "size": 7}"#);
        let home = tempfile::TempDir::new().expect("home");

        let mut reg = Registry::new();
        let mut config = with_snapshot(monitor(&url, None), json!({"slug": "v1"}));
        config.last_difference = Some(DifferenceRecord {
            name: None,
            url: "https://old.example.com/q/v1".into(),
            slug_change: SlugChange {
                previous: Some("v0".into()),
                current: Some("v1".into()),
            },
            detected_at: Utc::now(),
        });
        let id = config.id.clone();
        reg.insert(config);
        queuewatch_core::registry::save_at(home.path(), &reg).expect("save");
        let registry: SharedRegistry = Arc::new(RwLock::new(reg));

        let sink = MemorySink::default();
        let client = reqwest::Client::new();
        let outcome = run_cycle(&client, home.path(), &registry, &id, &sink)
            .await
            .expect("cycle");
        assert!(matches!(outcome, CycleOutcome::Snapshot { .. }));
        assert!(sink.drain().is_empty(), "no notification without a change");

        let reg = registry.read().await;
        let entry = reg.get(&id).expect("entry");
        assert_eq!(entry.last_snapshot.as_ref().unwrap()["size"], 7);
        let kept = entry.last_difference.as_ref().expect("difference kept");
        assert_eq!(kept.slug_change.previous.as_deref(), Some("v0"));
    }

    fn record(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }
}
