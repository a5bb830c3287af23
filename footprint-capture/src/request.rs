use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// A request as reported by the browser layer, before the capturer orders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub url: String,
    pub host: String,
    pub remote_ip: Option<IpAddr>,
    pub bytes: u64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl RequestEvent {
    pub fn completed(url: String, host: String, remote_ip: Option<IpAddr>, bytes: u64) -> Self {
        Self {
            url,
            host,
            remote_ip,
            bytes,
            status_code: None,
            error: None,
        }
    }

    /// A request that never got a connection: no address, nothing transferred.
    pub fn failed(url: String, host: String, error: String) -> Self {
        Self {
            url,
            host,
            remote_ip: None,
            bytes: 0,
            status_code: None,
            error: Some(error),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// What a page-load session reports to the capturer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Request(RequestEvent),
    LoadComplete,
    LoadFailed(String),
}

/// One entry of the capture log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub url: String,
    pub host: String,
    pub resolved_ip: Option<IpAddr>,
    pub bytes_transferred: u64,
    pub sequence: u64,
    pub completed_at: Duration,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl CapturedRequest {
    pub fn from_event(event: RequestEvent, sequence: u64, completed_at: Duration) -> Self {
        // Without a connection nothing was transferred, whatever the browser claims.
        let bytes_transferred = if event.remote_ip.is_some() { event.bytes } else { 0 };

        Self {
            url: event.url,
            host: event.host,
            resolved_ip: event.remote_ip,
            bytes_transferred,
            sequence,
            completed_at,
            status_code: event.status_code,
            error: event.error,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.resolved_ip.is_none()
    }
}
