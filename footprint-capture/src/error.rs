use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Page load timed out after {waited:?} with no requests captured: {url}")]
    LoadTimeout { url: String, waited: Duration },

    #[error("Page failed to load: {0}")]
    LoadFailure(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid HAR file: {0}")]
    Har(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
