use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::api::{Channel, Client, ReportMeta, ThreadReport, ThreadSummary};

pub trait ChannelService: Send + Sync {
    fn list_channels(&self) -> Result<Vec<Channel>>;
}

pub trait ThreadService: Send + Sync {
    fn list_threads(&self, channel_id: &str, limit: u32) -> Result<Vec<ThreadSummary>>;
}

pub trait ReportService: Send + Sync {
    // Ok(None) means no report has been generated for the thread yet.
    fn load_report(&self, channel_id: &str, thread_ts: &str) -> Result<Option<ThreadReport>>;

    fn refresh_report(&self, channel_id: &str, thread_ts: &str) -> Result<ThreadReport>;
}

// No context() wrappers around client errors here: the backend's detail
// string must stay the outermost (displayed) message.

pub struct ApiChannelService {
    client: Arc<Client>,
}

impl ApiChannelService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl ChannelService for ApiChannelService {
    fn list_channels(&self) -> Result<Vec<Channel>> {
        Ok(self.client.list_channels()?)
    }
}

pub struct ApiThreadService {
    client: Arc<Client>,
}

impl ApiThreadService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl ThreadService for ApiThreadService {
    fn list_threads(&self, channel_id: &str, limit: u32) -> Result<Vec<ThreadSummary>> {
        Ok(self.client.list_threads(channel_id, limit)?)
    }
}

pub struct ApiReportService {
    client: Arc<Client>,
}

impl ApiReportService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl ReportService for ApiReportService {
    fn load_report(&self, channel_id: &str, thread_ts: &str) -> Result<Option<ThreadReport>> {
        Ok(self.client.fetch_report(channel_id, thread_ts)?)
    }

    fn refresh_report(&self, channel_id: &str, thread_ts: &str) -> Result<ThreadReport> {
        Ok(self.client.refresh_report(channel_id, thread_ts)?)
    }
}

#[derive(Default)]
pub struct MockChannelService {
    channels: Vec<Channel>,
}

impl MockChannelService {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }
}

impl ChannelService for MockChannelService {
    fn list_channels(&self) -> Result<Vec<Channel>> {
        Ok(self.channels.clone())
    }
}

// Counts list calls so tests can tell an initial load from a post-refresh
// resync.
#[derive(Default)]
pub struct MockThreadService {
    threads: Vec<ThreadSummary>,
    list_calls: AtomicUsize,
}

impl MockThreadService {
    pub fn new(threads: Vec<ThreadSummary>) -> Self {
        Self {
            threads,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl ThreadService for MockThreadService {
    fn list_threads(&self, channel_id: &str, limit: u32) -> Result<Vec<ThreadSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self
            .threads
            .iter()
            .filter(|thread| thread.channel_id == channel_id)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(rows)
    }
}

#[derive(Default)]
pub struct MockReportService {
    reports: Mutex<HashMap<(String, String), ThreadReport>>,
    refresh_calls: AtomicUsize,
    refresh_error: Option<String>,
}

impl MockReportService {
    pub fn new(reports: Vec<ThreadReport>) -> Self {
        let reports = reports
            .into_iter()
            .map(|report| {
                let key = (report.channel_id.clone(), report.thread_ts.clone());
                (key, report)
            })
            .collect();
        Self {
            reports: Mutex::new(reports),
            refresh_calls: AtomicUsize::new(0),
            refresh_error: None,
        }
    }

    pub fn failing_refresh(mut self, detail: &str) -> Self {
        self.refresh_error = Some(detail.to_string());
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl ReportService for MockReportService {
    fn load_report(&self, channel_id: &str, thread_ts: &str) -> Result<Option<ThreadReport>> {
        let reports = self
            .reports
            .lock()
            .map_err(|_| anyhow!("report store poisoned"))?;
        Ok(reports
            .get(&(channel_id.to_string(), thread_ts.to_string()))
            .cloned())
    }

    fn refresh_report(&self, channel_id: &str, thread_ts: &str) -> Result<ThreadReport> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = &self.refresh_error {
            return Err(anyhow!("{detail}"));
        }

        let mut reports = self
            .reports
            .lock()
            .map_err(|_| anyhow!("report store poisoned"))?;
        let key = (channel_id.to_string(), thread_ts.to_string());
        let mut report = reports.get(&key).cloned().unwrap_or_else(|| ThreadReport {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            report_json: Default::default(),
            model: "mock".to_string(),
            source_latest_ts: thread_ts.to_string(),
            source_latest_ts_epoch: 0.0,
            updated_at: String::new(),
            meta: ReportMeta::default(),
        });
        report.meta.is_stale = false;
        report.updated_at = "2024-01-01T00:00:00".to_string();
        reports.insert(key, report.clone());
        Ok(report)
    }
}
