use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

// The backend rejects limits above 200, so the client clamps instead.
pub const THREAD_LIST_MAX: u32 = 200;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            http_client: None,
        }
    }
}

// NotFound is split from Api because a missing report is an expected state,
// not a fault.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("{detail}")]
    Api { status: u16, detail: String },
    #[error("{detail}")]
    NotFound { detail: String },
    #[error("{0}")]
    Network(String),
    #[error("malformed response from server")]
    Malformed,
}

pub struct Client {
    http: HttpClient,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            bail!("server base url required");
        }
        let base_url = Url::parse(config.base_url.trim())?;
        if base_url.cannot_be_a_base() {
            bail!("server base url must be an http(s) origin: {}", base_url);
        }
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout)
                .user_agent(format!("digest-tui/{}", crate::VERSION))
                .build()?,
        };

        Ok(Client { http, base_url })
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>, ApiError> {
        let url = self.endpoint(&["api", "thread-reports", "channels"], &[])?;
        self.fetch(Method::GET, url)
    }

    pub fn list_threads(
        &self,
        channel_id: &str,
        limit: u32,
    ) -> Result<Vec<ThreadSummary>, ApiError> {
        let limit = limit.clamp(1, THREAD_LIST_MAX).to_string();
        let url = self.endpoint(
            &["api", "thread-reports"],
            &[("channel_id", channel_id), ("limit", limit.as_str())],
        )?;
        self.fetch(Method::GET, url)
    }

    // A 404 is the normal "no report generated yet" outcome, not an error.
    pub fn fetch_report(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Option<ThreadReport>, ApiError> {
        let url = self.endpoint(&["api", "thread-reports", channel_id, thread_ts], &[])?;
        match self.fetch(Method::GET, url) {
            Ok(report) => Ok(Some(report)),
            Err(ApiError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    // force=true regenerates even when the backend does not consider the
    // report stale.
    pub fn refresh_report(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<ThreadReport, ApiError> {
        let url = self.endpoint(
            &["api", "thread-reports", channel_id, thread_ts, "refresh"],
            &[("force", "true")],
        )?;
        let outcome: RefreshOutcome = self.fetch(Method::POST, url)?;
        outcome.into_report(channel_id).ok_or(ApiError::Malformed)
    }

    pub fn health(&self) -> Result<Health, ApiError> {
        let url = self.endpoint(&["healthz"], &[])?;
        self.fetch(Method::GET, url)
    }

    fn fetch<T: DeserializeOwned>(&self, method: Method, url: Url) -> Result<T, ApiError> {
        let body = self.send(method, url)?;
        serde_json::from_value(body).map_err(|_| ApiError::Malformed)
    }

    fn send(&self, method: Method, url: Url) -> Result<Value, ApiError> {
        let request = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");

        let response = request.send().map_err(network_message).map_err(ApiError::Network)?;
        let status = response.status();
        let text = response
            .text()
            .map_err(network_message)
            .map_err(ApiError::Network)?;
        if !status.is_success() {
            return Err(failure_from_body(status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|_| ApiError::Malformed)
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Network("server url cannot carry a path".to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

// The backend reports failures as {"detail": ...}; a string detail reaches
// the operator verbatim, anything else falls back to the status code.
fn failure_from_body(status: u16, body: &str) -> ApiError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("detail").cloned())
        .and_then(|detail| match detail {
            Value::String(text) => Some(text),
            Value::Null => None,
            other => serde_json::to_string(&other).ok(),
        })
        .unwrap_or_else(|| format!("Request failed: {status}"));

    if status == 404 {
        ApiError::NotFound { detail }
    } else {
        ApiError::Api { status, detail }
    }
}

fn network_message(err: reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "could not connect to server".to_string()
    } else {
        err.to_string()
    }
}

// The channels endpoint only lists active channels and often omits the
// flag, hence the serde default on is_active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub channel_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl Channel {
    pub fn label(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => format!("#{} ({})", name, self.channel_id),
            _ => self.channel_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    #[serde(default)]
    pub channel_id: String,
    pub thread_ts: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub one_line: Option<String>,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub has_report: bool,
}

impl ThreadSummary {
    pub fn display_title(&self) -> &str {
        let title = self.title.as_deref().map(str::trim).unwrap_or_default();
        if !title.is_empty() {
            return title;
        }
        let one_line = self.one_line.as_deref().map(str::trim).unwrap_or_default();
        if !one_line.is_empty() {
            return one_line;
        }
        "(no text)"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadReport {
    pub channel_id: String,
    pub thread_ts: String,
    pub report_json: ReportBody,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub source_latest_ts: String,
    #[serde(default)]
    pub source_latest_ts_epoch: f64,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub meta: ReportMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportBody {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub participants_roles: Vec<ParticipantRole>,
    #[serde(default)]
    pub timeline_daily: Vec<DailyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRole {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEntry {
    #[serde(default)]
    pub date_kst: String,
    #[serde(default)]
    pub progress: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

// Staleness is decided by the backend; the client never computes it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReportMeta {
    #[serde(default)]
    pub is_stale: bool,
}

// The refresh endpoint reports some failures in-band: status set, report
// fields missing.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshOutcome {
    #[serde(default)]
    pub thread_ts: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub report_json: Option<ReportBody>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub source_latest_ts: Option<String>,
    #[serde(default)]
    pub source_latest_ts_epoch: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub meta: Option<ReportMeta>,
}

impl RefreshOutcome {
    pub fn into_report(self, channel_id: &str) -> Option<ThreadReport> {
        let report_json = self.report_json?;
        Some(ThreadReport {
            channel_id: channel_id.to_string(),
            thread_ts: self.thread_ts,
            report_json,
            model: self.model.unwrap_or_default(),
            source_latest_ts: self.source_latest_ts.unwrap_or_default(),
            source_latest_ts_epoch: self.source_latest_ts_epoch.unwrap_or_default(),
            updated_at: self.updated_at.unwrap_or_default(),
            meta: self.meta.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub db: bool,
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    struct Exchange {
        status: u16,
        body: &'static str,
    }

    fn serve(
        exchanges: Vec<Exchange>,
    ) -> (Client, thread::JoinHandle<Vec<String>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind loopback listener");
        let port = server
            .server_addr()
            .to_ip()
            .expect("loopback listener has an ip addr")
            .port();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for exchange in exchanges {
                let request = server.recv().expect("receive request");
                seen.push(format!("{} {}", request.method(), request.url()));
                let response = tiny_http::Response::from_string(exchange.body)
                    .with_status_code(exchange.status);
                let _ = request.respond(response);
            }
            seen
        });
        let client = Client::new(ClientConfig {
            base_url: format!("http://127.0.0.1:{port}"),
            ..ClientConfig::default()
        })
        .expect("build client");
        (client, handle)
    }

    #[test]
    fn error_detail_is_surfaced_verbatim() {
        let (client, handle) = serve(vec![Exchange {
            status: 400,
            body: r#"{"detail": "Channel not found"}"#,
        }]);
        let err = client.list_threads("C404", 50).unwrap_err();
        match err {
            ApiError::Api { status, detail } => {
                assert_eq!(status, 400);
                assert_eq!(detail, "Channel not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn missing_detail_falls_back_to_status_code() {
        let (client, handle) = serve(vec![Exchange {
            status: 502,
            body: "bad gateway",
        }]);
        let err = client.list_channels().unwrap_err();
        assert_eq!(err.to_string(), "Request failed: 502");
        handle.join().unwrap();
    }

    #[test]
    fn structured_detail_is_compacted_to_json() {
        let err = failure_from_body(400, r#"{"detail": {"code": "OPENAI_API_KEY_MISSING"}}"#);
        match err {
            ApiError::Api { detail, .. } => {
                assert_eq!(detail, r#"{"code":"OPENAI_API_KEY_MISSING"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn report_not_found_becomes_none() {
        let (client, handle) = serve(vec![Exchange {
            status: 404,
            body: r#"{"detail": "Thread report not found"}"#,
        }]);
        let report = client.fetch_report("C1", "1700000000.000100").unwrap();
        assert!(report.is_none());
        handle.join().unwrap();
    }

    #[test]
    fn malformed_success_body_is_rejected() {
        let (client, handle) = serve(vec![Exchange {
            status: 200,
            body: "<html>definitely not json</html>",
        }]);
        let err = client.list_channels().unwrap_err();
        assert!(matches!(err, ApiError::Malformed));
        handle.join().unwrap();
    }

    #[test]
    fn refresh_posts_with_force_flag() {
        let (client, handle) = serve(vec![Exchange {
            status: 200,
            body: r#"{
                "thread_ts": "1700000000.000100",
                "status": "refreshed",
                "report_json": {"topic": "rollout plan"},
                "model": "gpt-4o-mini",
                "source_latest_ts": "1700000400.000200",
                "source_latest_ts_epoch": 1700000400.0002,
                "updated_at": "2023-11-14T22:20:00",
                "meta": {"is_stale": false}
            }"#,
        }]);
        let report = client.refresh_report("C1", "1700000000.000100").unwrap();
        assert_eq!(report.channel_id, "C1");
        assert_eq!(report.report_json.topic.as_deref(), Some("rollout plan"));
        assert!(!report.meta.is_stale);

        let seen = handle.join().unwrap();
        assert_eq!(
            seen,
            vec!["POST /api/thread-reports/C1/1700000000.000100/refresh?force=true".to_string()]
        );
    }

    #[test]
    fn thread_list_query_clamps_limit() {
        let (client, handle) = serve(vec![Exchange {
            status: 200,
            body: "[]",
        }]);
        client.list_threads("C1", 5000).unwrap();
        let seen = handle.join().unwrap();
        assert_eq!(
            seen,
            vec!["GET /api/thread-reports?channel_id=C1&limit=200".to_string()]
        );
    }

    #[test]
    fn refresh_without_report_body_is_malformed() {
        let outcome: RefreshOutcome =
            serde_json::from_str(r#"{"thread_ts": "1.2", "status": "error"}"#).unwrap();
        assert!(outcome.into_report("C1").is_none());
    }

    #[test]
    fn channel_label_prefers_name() {
        let named = Channel {
            channel_id: "C123".into(),
            name: Some("general".into()),
            is_active: true,
        };
        assert_eq!(named.label(), "#general (C123)");

        let bare = Channel {
            channel_id: "C456".into(),
            name: None,
            is_active: true,
        };
        assert_eq!(bare.label(), "C456");
    }
}
