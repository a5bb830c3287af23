pub mod capture;
pub mod error;
pub mod fetcher;
pub mod har;
pub mod request;
pub mod session;

pub use capture::{CaptureOptions, CaptureOutcome, CaptureProgressCallback, Capturer, Termination};
pub use error::CaptureError;
pub use fetcher::{FetchBrowser, FetchOptions};
pub use har::HarReplay;
pub use request::{CapturedRequest, RequestEvent, SessionEvent};
pub use session::{Browser, ScriptStep, ScriptedBrowser, Session};
