use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point as ScreenPoint;
use headless_chrome::protocol::cdp::{Input, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::types::SearchParams;
use crate::crawl::{DebugCapture, Session, SessionFactory};
use crate::error::{Result, ScrapeError};
use crate::search::{Point, Region, ResultCount, SearchView, ZoomDirection};

/// CSS hooks into the search page. These follow the site's markup and break with it.
mod selectors {
    pub const MAP: &str = "div[data-testid='map/GoogleMap']";
    pub const RESULT_HEADING: &str = "div[data-testid='stays-page-heading'] h1, h1[data-testid='stays-page-heading']";
    pub const UPDATING: &str = "div[data-testid='map/updating'], div[aria-busy='true'][data-testid='card-container']";
    pub const LISTING_LINKS: &str = "div[itemprop='itemListElement'] a[href*='/rooms/']";
    pub const NEXT_PAGE: &str = "nav[aria-label='Search results pagination'] a[aria-label='Next']";
    pub const PAGE_ONE: &str = "nav[aria-label='Search results pagination'] a[aria-label='1'], nav[aria-label='Search results pagination'] button[aria-label='1']";
    pub const ZOOM_IN: &str = "button[aria-label='Zoom in']";
    pub const ZOOM_OUT: &str = "button[aria-label='Zoom out']";
    pub const INTERACTIVE: &str = "button, a, [role='button'], [data-testid='map/markers/BasePillMarker']";
}

/// Pause between the button presses of a multi-level zoom
const ZOOM_STEP_DELAY: Duration = Duration::from_millis(400);
/// Mouse moves used to drag the map from one point to another
const DRAG_STEPS: u32 = 10;

/// Headless (or visible) Chrome instance that hands out tabs
pub struct ChromeBrowser {
    browser: Browser,
}

impl ChromeBrowser {
    pub fn launch(headless: bool) -> anyhow::Result<Self> {
        info!(headless, "Launching Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some((1600, 1200)))
            .idle_browser_timeout(Duration::from_secs(600))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self { browser })
    }

    /// Open a tab on the search results for `params` and wait for it to load.
    pub async fn open_search(
        &self,
        params: &SearchParams,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<ChromeSearchView> {
        let tab = self.new_tab().await?;
        let url = params.search_url();
        info!(url = %url, "Opening search page");

        blocking(&tab, move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await?;

        Ok(ChromeSearchView { tab, poll_interval })
    }

    async fn new_tab(&self) -> Result<Arc<Tab>> {
        let browser = self.browser.clone();
        tokio::task::spawn_blocking(move || browser.new_tab())
            .await
            .map_err(|e| ScrapeError::SessionUnavailable(e.to_string()))?
            .map_err(|e| ScrapeError::SessionUnavailable(format!("{e:#}")))
    }
}

#[async_trait]
impl SessionFactory for ChromeBrowser {
    async fn open_session(&self) -> Result<Box<dyn Session>> {
        let tab = self.new_tab().await?;
        Ok(Box::new(ChromeSession { tab }))
    }
}

/// Run a blocking headless_chrome call off the async runtime.
async fn blocking<T, F>(tab: &Arc<Tab>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
{
    let tab = Arc::clone(tab);
    tokio::task::spawn_blocking(move || f(&tab))
        .await
        .map_err(|e| ScrapeError::Browser(e.to_string()))?
        .map_err(ScrapeError::browser)
}

/// Evaluate `js` and return its JSON result, `Null` when it produced nothing.
async fn evaluate(tab: &Arc<Tab>, js: String) -> Result<Value> {
    blocking(tab, move |tab| {
        let result = tab.evaluate(&js, false)?;
        Ok(result.value.unwrap_or(Value::Null))
    })
    .await
}

async fn outer_html(tab: &Arc<Tab>) -> Result<String> {
    let value = evaluate(tab, "document.documentElement.outerHTML".to_string()).await?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ScrapeError::MissingElement("document HTML".to_string()))
}

/// Press or release the left mouse button at `point`. The tab only exposes whole clicks.
fn left_button(tab: &Tab, kind: Input::DispatchMouseEventTypeOption, point: ScreenPoint) -> anyhow::Result<()> {
    tab.call_method(Input::DispatchMouseEvent {
        Type: kind,
        x: point.x,
        y: point.y,
        button: Some(Input::MouseButton::Left),
        click_count: Some(1),
        modifiers: None,
        timestamp: None,
        buttons: None,
        force: None,
        tangential_pressure: None,
        tilt_x: None,
        tilt_y: None,
        twist: None,
        delta_x: None,
        delta_y: None,
        pointer_Type: None,
    })?;
    Ok(())
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

pub struct ChromeSession {
    tab: Arc<Tab>,
}

#[async_trait]
impl Session for ChromeSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let url = url.to_string();
        blocking(&self.tab, move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn page_html(&mut self) -> Result<String> {
        outer_html(&self.tab).await
    }

    async fn capture_debug(&mut self) -> Result<DebugCapture> {
        let html = outer_html(&self.tab).await?;
        let screenshot = blocking(&self.tab, |tab| {
            tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await?;
        Ok(DebugCapture {
            html,
            screenshot: Some(screenshot),
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        blocking(&self.tab, |tab| tab.close(true).map(|_| ())).await
    }
}

#[derive(Debug, Deserialize)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// The search results page of one tab, with its map
pub struct ChromeSearchView {
    tab: Arc<Tab>,
    poll_interval: Duration,
}

impl ChromeSearchView {
    async fn click(&self, css: &'static str) -> Result<()> {
        blocking(&self.tab, move |tab| {
            tab.find_element(css)?.click()?;
            Ok(())
        })
        .await
    }

    /// Poll `js` until it evaluates to `true`; `Ok(false)` once `timeout` passes.
    async fn poll_until(&self, js: String, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if evaluate(&self.tab, js.clone()).await? == Value::Bool(true) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn close(self) -> Result<()> {
        blocking(&self.tab, |tab| tab.close(true).map(|_| ())).await
    }
}

#[async_trait]
impl SearchView for ChromeSearchView {
    async fn viewport(&mut self) -> Result<Region> {
        let js = format!(
            "(() => {{ const m = document.querySelector({}); \
             return m ? JSON.stringify(m.getBoundingClientRect()) : null; }})()",
            js_string(selectors::MAP)
        );
        let value = evaluate(&self.tab, js).await?;
        let json = value
            .as_str()
            .ok_or_else(|| ScrapeError::MissingElement("search map".to_string()))?;
        let rect: Rect = serde_json::from_str(json).map_err(ScrapeError::browser)?;
        Region::new(rect.x, rect.y, rect.width, rect.height, 0)
    }

    async fn result_heading(&mut self) -> Result<Option<String>> {
        let js = format!(
            "(() => {{ const h = document.querySelector({}); return h ? h.innerText : null; }})()",
            js_string(selectors::RESULT_HEADING)
        );
        Ok(evaluate(&self.tab, js).await?.as_str().map(str::to_string))
    }

    async fn pan(&mut self, from: Point, to: Point) -> Result<()> {
        debug!(from_x = from.x, from_y = from.y, to_x = to.x, to_y = to.y, "Dragging map");
        blocking(&self.tab, move |tab| {
            let start = ScreenPoint { x: from.x, y: from.y };
            tab.move_mouse_to_point(start)?;
            left_button(tab, Input::DispatchMouseEventTypeOption::MousePressed, start)?;
            for step in 1..=DRAG_STEPS {
                let t = f64::from(step) / f64::from(DRAG_STEPS);
                tab.move_mouse_to_point(ScreenPoint {
                    x: from.x + (to.x - from.x) * t,
                    y: from.y + (to.y - from.y) * t,
                })?;
            }
            let end = ScreenPoint { x: to.x, y: to.y };
            left_button(tab, Input::DispatchMouseEventTypeOption::MouseReleased, end)?;
            Ok(())
        })
        .await
    }

    async fn zoom(&mut self, direction: ZoomDirection, levels: u32) -> Result<()> {
        let css = match direction {
            ZoomDirection::In => selectors::ZOOM_IN,
            ZoomDirection::Out => selectors::ZOOM_OUT,
        };
        blocking(&self.tab, move |tab| {
            for level in 0..levels {
                if level > 0 {
                    thread::sleep(ZOOM_STEP_DELAY);
                }
                tab.find_element(css)?.click()?;
            }
            Ok(())
        })
        .await
    }

    async fn is_interactive_at(&mut self, point: Point) -> Result<bool> {
        let js = format!(
            "(() => {{ const e = document.elementFromPoint({}, {}); \
             return !!(e && e.closest({})); }})()",
            point.x,
            point.y,
            js_string(selectors::INTERACTIVE)
        );
        Ok(evaluate(&self.tab, js).await? == Value::Bool(true))
    }

    async fn visible_item_links(&mut self) -> Result<Vec<String>> {
        let js = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(a => a.href))",
            js_string(selectors::LISTING_LINKS)
        );
        let value = evaluate(&self.tab, js).await?;
        let json = value.as_str().unwrap_or("[]");
        serde_json::from_str(json).map_err(ScrapeError::browser)
    }

    async fn has_next_page(&mut self) -> Result<bool> {
        let js = format!(
            "(() => {{ const n = document.querySelector({}); \
             return !!n && n.getAttribute('aria-disabled') !== 'true'; }})()",
            js_string(selectors::NEXT_PAGE)
        );
        Ok(evaluate(&self.tab, js).await? == Value::Bool(true))
    }

    async fn advance_page(&mut self) -> Result<()> {
        self.click(selectors::NEXT_PAGE).await
    }

    async fn return_to_first_page(&mut self) -> Result<()> {
        let js = format!(
            "(() => {{ const p = document.querySelector({}); if (!p) return false; p.click(); return true; }})()",
            js_string(selectors::PAGE_ONE)
        );
        if evaluate(&self.tab, js).await? != Value::Bool(true) {
            return Err(ScrapeError::MissingElement("first results page link".to_string()));
        }
        Ok(())
    }

    async fn wait_updating_cleared(&mut self, timeout: Duration) -> Result<bool> {
        let js = format!("document.querySelector({}) === null", js_string(selectors::UPDATING));
        self.poll_until(js, timeout).await
    }

    async fn wait_heading_settled(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(heading) = self.result_heading().await? {
                if ResultCount::parse(&heading).is_some() {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
