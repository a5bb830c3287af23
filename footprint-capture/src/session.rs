use crate::error::Result;
use crate::request::SessionEvent;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

const EVENT_BUFFER: usize = 256;

pub type EventSender = mpsc::Sender<SessionEvent>;

/// Anything that can load a page and report the requests it makes.
///
/// `open` starts the load and hands back a [`Session`] whose event stream the
/// capturer drains. Implementations drive the load from a spawned task, so
/// `open` must be called from inside a tokio runtime.
pub trait Browser: Send + Sync {
    fn open(&self, url: &Url) -> Result<Session>;
}

/// A running page load: its event stream plus the task producing it.
///
/// Dropping a session aborts the task, so a capture that bails out early never
/// leaves a load running in the background.
pub struct Session {
    events: mpsc::Receiver<SessionEvent>,
    task: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(events: mpsc::Receiver<SessionEvent>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            task: Some(task),
        }
    }

    /// Spawn `driver` with the sending half of a fresh event channel.
    pub fn spawn<F, Fut>(driver: F) -> Self
    where
        F: FnOnce(EventSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(driver(tx));
        Self::new(rx, task)
    }

    /// Next event, or `None` once the driver is done and the buffer drained.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn terminate(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.close();
    }

    pub fn is_terminated(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// One step of a [`ScriptedBrowser`] playback.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub after: Duration,
    pub event: SessionEvent,
}

impl ScriptStep {
    pub fn new(after: Duration, event: SessionEvent) -> Self {
        Self { after, event }
    }
}

/// Plays back a fixed list of events with the given delays.
///
/// With `hold_open` the stream stays open after the last step, like a page
/// that keeps a long-poll connection around and never settles on its own.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBrowser {
    steps: Vec<ScriptStep>,
    hold_open: bool,
}

impl ScriptedBrowser {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            hold_open: false,
        }
    }

    pub fn with_hold_open(mut self, hold_open: bool) -> Self {
        self.hold_open = hold_open;
        self
    }
}

impl Browser for ScriptedBrowser {
    fn open(&self, _url: &Url) -> Result<Session> {
        let steps = self.steps.clone();
        let hold_open = self.hold_open;

        Ok(Session::spawn(move |tx| async move {
            for step in steps {
                tokio::time::sleep(step.after).await;
                if tx.send(step.event).await.is_err() {
                    return;
                }
            }
            if hold_open {
                std::future::pending::<()>().await;
            }
        }))
    }
}
