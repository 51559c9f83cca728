use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info};

use super::probe::{probe_result_count, ResultCount};
use super::reader::read_all;
use super::region::{verify_balanced, PanStep, Point, Region, QUADRANT_PASS};
use super::stability::await_stable;
use super::view::{SearchView, ZoomDirection};
use crate::config::SearchConfig;
use crate::error::{Result, ScrapeError};
use crate::models::ItemIdSet;

type DiscoverFuture<'s> = Pin<Box<dyn Future<Output = Result<ItemIdSet>> + Send + 's>>;

/// Depth-first search over the map: regions the feed reports as too full are
/// split into quadrants by panning and zooming, small ones are read directly.
pub struct RegionSplitter<'a> {
    view: &'a mut dyn SearchView,
    config: &'a SearchConfig,
}

impl<'a> RegionSplitter<'a> {
    pub fn new(view: &'a mut dyn SearchView, config: &'a SearchConfig) -> Result<Self> {
        verify_balanced(&QUADRANT_PASS)?;
        Ok(Self { view, config })
    }

    /// Discover every item reachable from the view as it is right now.
    pub async fn discover_all(&mut self) -> Result<ItemIdSet> {
        await_stable(&mut *self.view, self.config).await?;
        let region = self.view.viewport().await?;
        info!(
            width = region.width,
            height = region.height,
            threshold = self.config.threshold,
            "Starting region search"
        );

        let ids = self.discover(region, 0).await?;
        info!(found = ids.len(), "Region search complete");
        Ok(ids)
    }

    /// Discover the items in `region`, leaving the view where it was found.
    pub fn discover(&mut self, region: Region, depth: u32) -> DiscoverFuture<'_> {
        Box::pin(async move {
            let count = probe_result_count(&mut *self.view).await?;

            if count == ResultCount::Zero {
                debug!(depth, zoom = region.zoom, "Empty region");
                return Ok(ItemIdSet::new());
            }

            if count.is_leaf(self.config.threshold) {
                let ids = read_all(&mut *self.view, &region, self.config).await?;
                info!(
                    depth,
                    zoom = region.zoom,
                    claimed = ?count,
                    found = ids.len(),
                    "Read leaf region"
                );
                return Ok(ids);
            }

            if depth >= self.config.max_depth {
                return Err(ScrapeError::DepthExceeded {
                    depth,
                    max_depth: self.config.max_depth,
                });
            }

            debug!(depth, zoom = region.zoom, claimed = ?count, "Subdividing region");
            let mut found = ItemIdSet::new();
            for step in QUADRANT_PASS {
                self.pan_by(&region, step).await?;
                if !step.visit {
                    continue;
                }

                self.view.zoom(ZoomDirection::In, 1).await?;
                await_stable(&mut *self.view, self.config).await?;

                let ids = self.discover(region.zoomed_in(), depth + 1).await?;
                found.extend(ids);

                self.view.zoom(ZoomDirection::Out, 1).await?;
                await_stable(&mut *self.view, self.config).await?;
            }
            Ok(found)
        })
    }

    async fn pan_by(&mut self, region: &Region, step: PanStep) -> Result<()> {
        let (dx, dy) = region.displacement(step);
        let from = self.find_anchor(region, dx, dy).await?;
        self.view.pan(from, from.offset(dx, dy)).await?;
        await_stable(&mut *self.view, self.config).await
    }

    /// Pick a press point for a drag of `(dx, dy)` that does not land on a
    /// marker, nudging it against the drag direction until one is free.
    async fn find_anchor(&mut self, region: &Region, dx: f64, dy: f64) -> Result<Point> {
        let start = region.center();
        let len = dx.hypot(dy);
        let (ux, uy) = if len > 0.0 { (-dx / len, -dy / len) } else { (0.0, 0.0) };
        let step = self.config.anchor_step_px;

        let mut attempts = 0;
        for nudge in 0..=self.config.anchor_retry_limit {
            let anchor = start.offset(ux * step * nudge as f64, uy * step * nudge as f64);
            if !region.contains(anchor) || !region.contains(anchor.offset(dx, dy)) {
                break;
            }

            attempts += 1;
            if !self.view.is_interactive_at(anchor).await? {
                if nudge > 0 {
                    debug!(nudge, x = anchor.x, y = anchor.y, "Moved drag anchor off a marker");
                }
                return Ok(anchor);
            }
        }

        Err(ScrapeError::AnchorUnavailable {
            x: start.x,
            y: start.y,
            attempts,
        })
    }
}
