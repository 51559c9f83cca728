use std::time::Duration;

use thiserror::Error;

/// Failures raised by the search and crawl machinery.
///
/// Per-item and per-branch errors are recovered by the caller and recorded;
/// only the variants for which [`ScrapeError::is_fatal`] returns `true` abort a run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("no usable drag anchor near ({x:.0}, {y:.0}) after {attempts} attempts")]
    AnchorUnavailable { x: f64, y: f64, attempts: u32 },

    #[error("region still saturated at depth {depth} (limit {max_depth})")]
    DepthExceeded { depth: u32, max_depth: u32 },

    #[error("pagination did not end after {pages} pages")]
    PaginationRunaway { pages: u32 },

    #[error("quadrant pass drifts by ({dx}, {dy}) quarter-viewports")]
    UnbalancedPanPass { dx: i32, dy: i32 },

    #[error("invalid region {width}x{height}")]
    InvalidRegion { width: f64, height: f64 },

    #[error("missing element: {0}")]
    MissingElement(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("unable to open browser session: {0}")]
    SessionUnavailable(String),

    #[error("crawl worker died: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// Errors that affect shared infrastructure rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionUnavailable(_) | Self::Worker(_))
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        Self::Browser(format!("{err:#}"))
    }
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;
