use anyhow::Result;
use async_trait::async_trait;

use crate::crawl::Session;
use crate::models::ItemId;

/// Page-specific extraction for one kind of detail page.
/// Implementations exist for rooms and hosts; the crawl scheduler drives either.
#[async_trait]
pub trait ItemExtractor: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Detail page URL for an id
    fn url_for(&self, id: &ItemId) -> String;

    /// Extract the payload from the page `session` has just navigated to
    async fn extract(&self, session: &mut dyn Session, id: &ItemId) -> Result<Self::Output>;

    /// Name used in logs and output files
    fn kind(&self) -> &'static str;
}
