use tracing::debug;

use super::view::SearchView;
use crate::config::SearchConfig;
use crate::error::{Result, ScrapeError};

/// Block until the view has finished reacting to a pan, zoom or page change.
///
/// The "updating" indicator and the result heading race each other: the
/// indicator can clear before it was ever observed, or linger after the
/// heading already shows the new count. A timeout on the indicator is
/// therefore accepted; the heading wait is not.
pub async fn await_stable(view: &mut dyn SearchView, config: &SearchConfig) -> Result<()> {
    if !view.wait_updating_cleared(config.updating_timeout).await? {
        debug!(
            timeout = ?config.updating_timeout,
            "Updating indicator did not clear, relying on result heading"
        );
    }

    if !view.wait_heading_settled(config.heading_timeout).await? {
        return Err(ScrapeError::Timeout {
            what: "result count heading".to_string(),
            timeout: config.heading_timeout,
        });
    }
    Ok(())
}
