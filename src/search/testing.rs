use std::time::Duration;

use async_trait::async_trait;

use super::region::{Point, Region};
use super::view::{SearchView, ZoomDirection};
use crate::error::Result;
use crate::models::{ItemId, ItemIdSet};

/// Synthetic map of items in the unit square, viewed through an 800x800 screen.
///
/// At zoom `z` the view spans `1 / 2^z` of the world around `center`. The
/// heading caps at `cap` like the real feed ("300+ stays").
pub struct FakeMap {
    pub items: Vec<(f64, f64, ItemId)>,
    pub center: (f64, f64),
    pub zoom: u32,
    pub cap: u64,
    pub page_size: usize,
    pub page: usize,
    /// Extra visible border, as a fraction of the span, so neighbours overlap
    pub margin: f64,
    pub screen: Region,
    pub extra_links: Vec<String>,

    pub occupied: bool,
    pub blocked_radius: Option<f64>,
    pub always_saturated: bool,
    pub indicator_stuck: bool,
    pub heading_missing: bool,

    pub pages_read: usize,
    pub links_served: usize,
    pub anchor_checks: u32,
    pub first_page_returns: usize,
    pub max_zoom_seen: u32,
}

impl FakeMap {
    pub fn with_items(items: Vec<(f64, f64, &str)>, cap: u64) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|(x, y, id)| (x, y, ItemId::new(id)))
                .collect(),
            center: (0.5, 0.5),
            zoom: 0,
            cap,
            page_size: 18,
            page: 0,
            margin: 0.0,
            screen: Region {
                x: 0.0,
                y: 0.0,
                width: 800.0,
                height: 800.0,
                zoom: 0,
            },
            extra_links: Vec::new(),
            occupied: false,
            blocked_radius: None,
            always_saturated: false,
            indicator_stuck: false,
            heading_missing: false,
            pages_read: 0,
            links_served: 0,
            anchor_checks: 0,
            first_page_returns: 0,
            max_zoom_seen: 0,
        }
    }

    /// `n * n` items spread evenly over the world
    pub fn grid(n: usize, cap: u64) -> Self {
        let mut map = Self::with_items(Vec::new(), cap);
        for i in 0..n {
            for j in 0..n {
                let x = (i as f64 + 0.5) / n as f64;
                let y = (j as f64 + 0.5) / n as f64;
                map.items.push((x, y, ItemId::new(format!("r{i}-{j}"))));
            }
        }
        map
    }

    /// `n` items along the horizontal midline
    pub fn midline(n: usize, cap: u64) -> Self {
        let mut map = Self::with_items(Vec::new(), cap);
        for k in 0..n {
            let x = (k as f64 + 0.5) / n as f64;
            map.items.push((x, 0.5, ItemId::new(format!("room{k}"))));
        }
        map
    }

    pub fn universe(&self) -> ItemIdSet {
        self.items.iter().map(|(_, _, id)| id.clone()).collect()
    }

    fn span(&self) -> f64 {
        1.0 / f64::from(1u32 << self.zoom)
    }

    fn in_view(&self) -> Vec<&ItemId> {
        let half = self.span() / 2.0 + self.margin * self.span();
        let mut ids: Vec<&ItemId> = self
            .items
            .iter()
            .filter(|(x, y, _)| {
                *x >= self.center.0 - half
                    && *x < self.center.0 + half
                    && *y >= self.center.1 - half
                    && *y < self.center.1 + half
            })
            .map(|(_, _, id)| id)
            .collect();
        ids.sort();
        ids
    }

    /// What the feed lists: never more than `cap` items
    fn visible(&self) -> Vec<&ItemId> {
        let mut ids = self.in_view();
        ids.truncate(self.cap as usize);
        ids
    }
}

#[async_trait]
impl SearchView for FakeMap {
    async fn viewport(&mut self) -> Result<Region> {
        Ok(self.screen)
    }

    async fn result_heading(&mut self) -> Result<Option<String>> {
        if self.heading_missing {
            return Ok(None);
        }
        let n = self.in_view().len() as u64;
        if self.always_saturated || n > self.cap {
            return Ok(Some(format!("{}+ stays", self.cap)));
        }
        Ok(Some(format!("{n} stays")))
    }

    async fn pan(&mut self, from: Point, to: Point) -> Result<()> {
        let span = self.span();
        self.center.0 -= (to.x - from.x) / self.screen.width * span;
        self.center.1 -= (to.y - from.y) / self.screen.height * span;
        self.page = 0;
        Ok(())
    }

    async fn zoom(&mut self, direction: ZoomDirection, levels: u32) -> Result<()> {
        match direction {
            ZoomDirection::In => self.zoom += levels,
            ZoomDirection::Out => self.zoom -= levels,
        }
        self.max_zoom_seen = self.max_zoom_seen.max(self.zoom);
        self.page = 0;
        Ok(())
    }

    async fn is_interactive_at(&mut self, point: Point) -> Result<bool> {
        self.anchor_checks += 1;
        if self.occupied {
            return Ok(true);
        }
        let center = self.screen.center();
        Ok(self
            .blocked_radius
            .is_some_and(|r| (point.x - center.x).hypot(point.y - center.y) < r))
    }

    async fn visible_item_links(&mut self) -> Result<Vec<String>> {
        self.pages_read += 1;
        let mut links: Vec<String> = self
            .visible()
            .into_iter()
            .skip(self.page * self.page_size)
            .take(self.page_size)
            .map(|id| format!("https://www.airbnb.ca/rooms/{id}?adults=1"))
            .collect();
        self.links_served += links.len();
        if self.page == 0 {
            links.extend(self.extra_links.iter().cloned());
        }
        Ok(links)
    }

    async fn has_next_page(&mut self) -> Result<bool> {
        Ok((self.page + 1) * self.page_size < self.visible().len())
    }

    async fn advance_page(&mut self) -> Result<()> {
        self.page += 1;
        Ok(())
    }

    async fn return_to_first_page(&mut self) -> Result<()> {
        self.first_page_returns += 1;
        self.page = 0;
        Ok(())
    }

    async fn wait_updating_cleared(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(!self.indicator_stuck)
    }

    async fn wait_heading_settled(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(!self.heading_missing)
    }
}
