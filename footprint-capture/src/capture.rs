use crate::error::{CaptureError, Result};
use crate::request::{CapturedRequest, SessionEvent};
use crate::session::Browser;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_secs(3);

pub type CaptureProgressCallback = Arc<dyn Fn(&CapturedRequest) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Hard limit for the whole session.
    pub timeout: Duration,
    /// Silence required after load-complete before the page counts as settled.
    pub quiescence: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            quiescence: DEFAULT_QUIESCENCE,
        }
    }
}

/// Why a capture stopped listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Load completed and the page went quiet for the quiescence window.
    Quiescent,
    /// The browser closed the event stream itself.
    SessionEnded,
    /// The overall timeout hit first; the log may be incomplete.
    TimedOut,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Quiescent => "settled",
            Termination::SessionEnded => "session ended",
            Termination::TimedOut => "timed out",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub url: String,
    pub requests: Vec<CapturedRequest>,
    pub termination: Termination,
    pub load_completed: bool,
    pub elapsed: Duration,
}

impl CaptureOutcome {
    pub fn is_partial(&self) -> bool {
        self.termination == Termination::TimedOut
    }
}

/// Drains one page-load session into an ordered request log.
pub struct Capturer {
    options: CaptureOptions,
    progress_callback: Option<CaptureProgressCallback>,
}

impl Capturer {
    pub fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: CaptureProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    pub async fn capture(&self, browser: &dyn Browser, url: &Url) -> Result<CaptureOutcome> {
        info!(
            "Capturing {} (timeout {:?}, quiescence {:?})",
            url, self.options.timeout, self.options.quiescence
        );

        let mut session = browser.open(url)?;
        let started = Instant::now();
        let deadline = started + self.options.timeout;

        let mut requests: Vec<CapturedRequest> = Vec::new();
        let mut load_completed = false;
        let mut last_activity = started;

        let termination = loop {
            let wait_until = if load_completed {
                (last_activity + self.options.quiescence).min(deadline)
            } else {
                deadline
            };

            match timeout_at(wait_until, session.next_event()).await {
                Ok(Some(SessionEvent::Request(event))) => {
                    let now = Instant::now();
                    last_activity = now;

                    let sequence = requests.len() as u64;
                    let captured = CapturedRequest::from_event(event, sequence, now - started);
                    debug!(
                        "#{} {} -> {:?} ({} bytes)",
                        captured.sequence, captured.host, captured.resolved_ip, captured.bytes_transferred
                    );

                    if let Some(ref callback) = self.progress_callback {
                        callback(&captured);
                    }
                    requests.push(captured);
                }
                Ok(Some(SessionEvent::LoadComplete)) => {
                    debug!("Load complete after {:?}", started.elapsed());
                    load_completed = true;
                    last_activity = Instant::now();
                }
                Ok(Some(SessionEvent::LoadFailed(reason))) => {
                    session.terminate();
                    return Err(CaptureError::LoadFailure(reason));
                }
                Ok(None) => break Termination::SessionEnded,
                Err(_) => {
                    if load_completed && Instant::now() < deadline {
                        break Termination::Quiescent;
                    }
                    break Termination::TimedOut;
                }
            }
        };

        session.terminate();
        let elapsed = started.elapsed();

        match termination {
            Termination::TimedOut if requests.is_empty() => {
                return Err(CaptureError::LoadTimeout {
                    url: url.to_string(),
                    waited: elapsed,
                });
            }
            Termination::TimedOut => {
                warn!(
                    "Capture of {} timed out after {:?}; continuing with {} requests",
                    url,
                    elapsed,
                    requests.len()
                );
            }
            Termination::SessionEnded if requests.is_empty() && !load_completed => {
                return Err(CaptureError::LoadFailure(format!(
                    "session for {} ended before the page loaded",
                    url
                )));
            }
            _ => {}
        }

        info!(
            "Capture complete: {} requests in {:?} ({})",
            requests.len(),
            elapsed,
            termination.as_str()
        );

        Ok(CaptureOutcome {
            url: url.to_string(),
            requests,
            termination,
            load_completed,
            elapsed,
        })
    }
}

impl Default for Capturer {
    fn default() -> Self {
        Self::new(CaptureOptions::default())
    }
}
