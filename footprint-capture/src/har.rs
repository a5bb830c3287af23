// HAR (HTTP Archive) replay: feeds a browser's exported network log through
// the same capture path as a live load.

use crate::error::{CaptureError, Result};
use crate::request::{RequestEvent, SessionEvent};
use crate::session::{Browser, Session};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize)]
struct HarFile {
    log: HarLog,
}

#[derive(Debug, Deserialize)]
struct HarLog {
    #[serde(default)]
    pages: Vec<HarPage>,
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarPage {
    started_date_time: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    page_timings: Option<HarPageTimings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarPageTimings {
    #[serde(default)]
    on_load: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarEntry {
    started_date_time: String,
    #[serde(default)]
    time: f64,
    request: HarRequest,
    response: HarResponse,
    #[serde(default, rename = "serverIPAddress")]
    server_ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HarRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarResponse {
    #[serde(default)]
    status: u16,
    #[serde(default = "unknown_size")]
    headers_size: i64,
    #[serde(default = "unknown_size")]
    body_size: i64,
    #[serde(default)]
    content: Option<HarContent>,
    #[serde(default, rename = "_transferSize")]
    transfer_size: Option<i64>,
    #[serde(default, rename = "_error")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HarContent {
    #[serde(default)]
    size: i64,
}

fn unknown_size() -> i64 {
    -1
}

impl HarResponse {
    fn bytes(&self) -> u64 {
        if let Some(transfer) = self.transfer_size.filter(|t| *t >= 0) {
            return transfer as u64;
        }
        let body = if self.body_size >= 0 {
            self.body_size
        } else {
            self.content.as_ref().map(|c| c.size).unwrap_or(0)
        };
        (body.max(0) + self.headers_size.max(0)) as u64
    }
}

/// HAR timings are fractional milliseconds taken straight from the file.
fn millis_to_duration(ms: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(ms / 1000.0)
        .map_err(|_| CaptureError::Har(format!("timing of {} ms is out of range", ms)))
}

/// One replayable request, positioned by when it finished.
#[derive(Debug, Clone)]
struct ReplayEntry {
    completed_at: Duration,
    event: RequestEvent,
}

/// Replays a HAR export as a page-load session.
#[derive(Debug, Clone)]
pub struct HarReplay {
    page_url: Option<String>,
    entries: Vec<ReplayEntry>,
    load_at: Option<Duration>,
    paced: bool,
}

impl HarReplay {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(json: &str) -> Result<Self> {
        let har: HarFile =
            serde_json::from_str(json).map_err(|e| CaptureError::Har(e.to_string()))?;

        let mut timed = Vec::with_capacity(har.log.entries.len());
        for entry in &har.log.entries {
            let started = parse_timestamp(&entry.started_date_time)?;
            timed.push((started, entry));
        }

        let page_start = har
            .log
            .pages
            .first()
            .map(|page| parse_timestamp(&page.started_date_time))
            .transpose()?;
        let origin = page_start
            .into_iter()
            .chain(timed.iter().map(|(started, _)| *started))
            .min();

        let mut entries = Vec::with_capacity(timed.len());
        for (started, entry) in timed {
            let offset_ms = origin
                .map(|o| (started - o).num_milliseconds().max(0) as f64)
                .unwrap_or(0.0);
            entries.push(ReplayEntry {
                completed_at: millis_to_duration(offset_ms + entry.time.max(0.0))?,
                event: to_event(entry),
            });
        }
        // stable: entries finishing together keep their file order
        entries.sort_by_key(|entry| entry.completed_at);

        let first_page = har.log.pages.first();
        let load_at = first_page
            .and_then(|page| page.page_timings.as_ref())
            .and_then(|timings| timings.on_load)
            .filter(|ms| *ms >= 0.0)
            .map(millis_to_duration)
            .transpose()?;
        let page_url = entries
            .first()
            .map(|entry| entry.event.url.clone())
            .or_else(|| first_page.and_then(|page| page.title.clone()));

        info!("Loaded HAR with {} entries", entries.len());

        Ok(Self {
            page_url,
            entries,
            load_at,
            paced: false,
        })
    }

    /// Replay with the recorded gaps between completions instead of all at once.
    pub fn with_pacing(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// URL of the first recorded request, normally the page itself.
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn script(&self) -> Vec<(Duration, SessionEvent)> {
        let mut script: Vec<(Duration, SessionEvent)> = self
            .entries
            .iter()
            .map(|entry| (entry.completed_at, SessionEvent::Request(entry.event.clone())))
            .collect();

        let load_at = self
            .load_at
            .or_else(|| self.entries.last().map(|entry| entry.completed_at))
            .unwrap_or_default();
        let position = script.partition_point(|(at, _)| *at <= load_at);
        script.insert(position, (load_at, SessionEvent::LoadComplete));
        script
    }
}

impl Browser for HarReplay {
    fn open(&self, _url: &Url) -> Result<Session> {
        let script = self.script();
        let paced = self.paced;

        Ok(Session::spawn(move |tx| async move {
            let mut previous = Duration::ZERO;
            for (at, event) in script {
                if paced {
                    tokio::time::sleep(at.saturating_sub(previous)).await;
                    previous = at;
                }
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }))
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| CaptureError::Har(format!("bad startedDateTime '{}': {}", value, e)))
}

fn to_event(entry: &HarEntry) -> RequestEvent {
    let url = entry.request.url.clone();
    let host = Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_matches(|c| c == '[' || c == ']').to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    let remote_ip = entry
        .server_ip_address
        .as_deref()
        .map(|ip| ip.trim().trim_start_matches('[').trim_end_matches(']'))
        .and_then(|ip| ip.parse::<IpAddr>().ok());

    if entry.response.status == 0 || remote_ip.is_none() {
        let reason = entry
            .response
            .error
            .clone()
            .unwrap_or_else(|| "no response recorded".to_string());
        debug!("HAR entry {} has no connection: {}", url, reason);
        return RequestEvent::failed(url, host, reason);
    }

    RequestEvent::completed(url, host, remote_ip, entry.response.bytes())
        .with_status(entry.response.status)
}
