use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// DOM and screenshot of a page, kept for post-mortem of a failed item
#[derive(Debug, Clone, Default)]
pub struct DebugCapture {
    pub html: String,
    pub screenshot: Option<Vec<u8>>,
}

/// One browser tab, owned by exactly one crawl worker
#[async_trait]
pub trait Session: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Outer HTML of the currently loaded document
    async fn page_html(&mut self) -> Result<String>;

    async fn capture_debug(&mut self) -> Result<DebugCapture>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Source of browser sessions. Failing to open one is fatal to a crawl.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn Session>>;
}
