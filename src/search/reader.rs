use tracing::{debug, warn};

use super::region::Region;
use super::stability::await_stable;
use super::view::SearchView;
use crate::config::SearchConfig;
use crate::error::{Result, ScrapeError};
use crate::models::{ItemId, ItemIdSet};

/// Collect the ids of every item listed for the current view, following
/// pagination to the end and then going back to the first page.
///
/// Links without a usable id are logged and skipped.
pub async fn read_all(
    view: &mut dyn SearchView,
    region: &Region,
    config: &SearchConfig,
) -> Result<ItemIdSet> {
    let mut ids = ItemIdSet::new();
    let mut pages: u32 = 1;

    loop {
        for link in view.visible_item_links().await? {
            match ItemId::from_url(&link) {
                Some(id) => {
                    ids.insert(id);
                }
                None => warn!(link = %link, page = pages, "Skipping listing without a usable id"),
            }
        }

        if !view.has_next_page().await? {
            break;
        }
        if pages >= config.max_pages {
            return Err(ScrapeError::PaginationRunaway { pages });
        }
        view.advance_page().await?;
        await_stable(view, config).await?;
        pages += 1;
    }

    if pages > 1 {
        view.return_to_first_page().await?;
        await_stable(view, config).await?;
    }

    debug!(
        zoom = region.zoom,
        pages,
        found = ids.len(),
        "Read all result pages"
    );
    Ok(ids)
}
