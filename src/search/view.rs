use std::time::Duration;

use async_trait::async_trait;

use super::region::{Point, Region};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// A map-backed search page driven by one browser session.
///
/// Actions return once they are dispatched; callers wait for the view to
/// settle with [`super::stability::await_stable`] before reading from it.
#[async_trait]
pub trait SearchView: Send {
    /// Current on-screen rectangle of the map
    async fn viewport(&mut self) -> Result<Region>;

    /// Text of the result-count heading, if one is shown
    async fn result_heading(&mut self) -> Result<Option<String>>;

    /// Drag the map content from one point to another
    async fn pan(&mut self, from: Point, to: Point) -> Result<()>;

    async fn zoom(&mut self, direction: ZoomDirection, levels: u32) -> Result<()>;

    /// Whether a press at `point` would land on a map marker or control
    async fn is_interactive_at(&mut self, point: Point) -> Result<bool>;

    /// Detail-page links of the items on the current result page
    async fn visible_item_links(&mut self) -> Result<Vec<String>>;

    async fn has_next_page(&mut self) -> Result<bool>;

    async fn advance_page(&mut self) -> Result<()>;

    async fn return_to_first_page(&mut self) -> Result<()>;

    /// Wait for the "updating results" indicator to clear. `Ok(false)` on timeout.
    async fn wait_updating_cleared(&mut self, timeout: Duration) -> Result<bool>;

    /// Wait for a non-transient result heading. `Ok(false)` on timeout.
    async fn wait_heading_settled(&mut self, timeout: Duration) -> Result<bool>;
}
