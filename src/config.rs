use std::path::PathBuf;
use std::time::Duration;

/// Tuning for the recursive map search
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Largest result count that is read directly instead of subdivided
    pub threshold: u64,
    /// Deepest zoom (relative to the starting view) the search may descend to
    pub max_depth: u32,
    /// How many times a blocked drag anchor is nudged before the branch fails
    pub anchor_retry_limit: u32,
    /// Distance in pixels of each anchor nudge
    pub anchor_step_px: f64,
    /// Upper bound on result pages read from one leaf region
    pub max_pages: u32,
    /// Wait for the "updating" indicator; a timeout here is tolerated
    pub updating_timeout: Duration,
    /// Wait for the result heading; a timeout here is an error
    pub heading_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: 300,
            max_depth: 8,
            anchor_retry_limit: 20,
            anchor_step_px: 12.0,
            max_pages: 20,
            updating_timeout: Duration::from_secs(5),
            heading_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Tuning for the worker pool
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Number of concurrent browser sessions
    pub concurrency: usize,
    pub nav_timeout: Duration,
    /// Budget for extracting one page after navigation
    pub item_timeout: Duration,
    /// Where to write DOM and screenshot dumps of failed items, if anywhere
    pub dump_dir: Option<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            nav_timeout: Duration::from_secs(30),
            item_timeout: Duration::from_secs(60),
            dump_dir: None,
        }
    }
}

impl CrawlConfig {
    /// Same tuning with failure dumps going to `dir`
    pub fn with_dump_dir(&self, dir: Option<PathBuf>) -> Self {
        Self {
            dump_dir: dir,
            ..self.clone()
        }
    }
}
