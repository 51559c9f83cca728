use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use scraper::Html;

use super::parse::{document_text, element_text, linked_ids, number_before, selector};
use super::traits::ItemExtractor;
use super::types::host_url;
use crate::crawl::Session;
use crate::models::{Host, ItemId};

const NAME: &str = "h1, h2";
const LISTING_LINKS: &str = "a[href*='/rooms/']";

/// Scrapes host profile pages
#[derive(Debug, Default)]
pub struct HostExtractor;

#[async_trait]
impl ItemExtractor for HostExtractor {
    type Output = Host;

    fn url_for(&self, id: &ItemId) -> String {
        host_url(id.as_str())
    }

    async fn extract(&self, session: &mut dyn Session, id: &ItemId) -> Result<Host> {
        let html = session.page_html().await.context("Failed to read host page")?;
        parse_host(&html, id, &self.url_for(id))
    }

    fn kind(&self) -> &'static str {
        "host"
    }
}

pub fn parse_host(html: &str, id: &ItemId, url: &str) -> Result<Host> {
    let document = Html::parse_document(html);

    let name = document
        .select(&selector(NAME)?)
        .map(element_text)
        .find_map(|text| greeting_name(&text));
    let Some(name) = name else {
        bail!("Unable to find host salutation");
    };

    let page_text = document_text(&document);

    Ok(Host {
        id: id.clone(),
        url: url.to_string(),
        name,
        super_host: page_text.contains("Superhost"),
        host_listings: linked_ids(&document, LISTING_LINKS)?,
        num_reviews: number_before(&page_text, &["review", "reviews"]).map(|n| n as u32),
        scraped_at: Utc::now(),
    })
}

/// `"Hi, I’m Ana"` or `"About Ana"` to `"Ana"`
fn greeting_name(text: &str) -> Option<String> {
    ["Hi, I’m ", "Hi, I'm ", "About "]
        .iter()
        .find_map(|prefix| text.strip_prefix(prefix))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
