use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use scraper::Html;
use tracing::debug;

use super::parse::{dollars, document_text, element_text, linked_ids, map_coordinates, number_before, selector};
use super::traits::ItemExtractor;
use super::types::room_url;
use crate::crawl::Session;
use crate::models::{ItemId, Room, RoomType};

const TITLE: &str = "h1";
const HOST_LINKS: &str = "a[href*='/users/show/']";
const OVERVIEW: &str = "div[data-section-id='OVERVIEW_DEFAULT'], div[data-section-id='OVERVIEW_DEFAULT_V2']";
const PRICE: &str = "div[data-section-id='BOOK_IT_SIDEBAR'] span";
const MAP_LINK: &str = "a[href*='google.com/maps']";

/// Scrapes room (listing) detail pages
#[derive(Debug, Default)]
pub struct RoomExtractor;

#[async_trait]
impl ItemExtractor for RoomExtractor {
    type Output = Room;

    fn url_for(&self, id: &ItemId) -> String {
        room_url(id.as_str())
    }

    async fn extract(&self, session: &mut dyn Session, id: &ItemId) -> Result<Room> {
        let html = session.page_html().await.context("Failed to read room page")?;
        parse_room(&html, id, &self.url_for(id))
    }

    fn kind(&self) -> &'static str {
        "room"
    }
}

/// Parse a room page. The first host link is the host, any further ones are co-hosts.
pub fn parse_room(html: &str, id: &ItemId, url: &str) -> Result<Room> {
    let document = Html::parse_document(html);

    let titles: Vec<_> = document.select(&selector(TITLE)?).collect();
    if titles.len() != 1 {
        bail!("list header should show up 1 time: {}", titles.len());
    }
    let title = element_text(titles[0]);

    let mut hosts = linked_ids(&document, HOST_LINKS)?.into_iter();
    let Some(host_id) = hosts.next() else {
        bail!("Unable to find hosts/co hosts");
    };
    let co_host_ids: Vec<ItemId> = hosts.collect();

    let overview = document
        .select(&selector(OVERVIEW)?)
        .next()
        .map(element_text)
        .unwrap_or_default();
    let room_type = overview
        .split(" hosted by ")
        .next()
        .map(RoomType::from_title)
        .unwrap_or_else(|| RoomType::Other(String::new()));

    let price = document
        .select(&selector(PRICE)?)
        .map(element_text)
        .find_map(|text| dollars(&text));

    let location = document
        .select(&selector(MAP_LINK)?)
        .filter_map(|link| link.value().attr("href"))
        .find_map(map_coordinates);
    if location.is_none() {
        debug!(room_id = %id, "No map link with coordinates");
    }

    let page_text = document_text(&document);
    let count = |words: &[&str]| number_before(&overview, words).map(|n| n as u32);

    let room = Room {
        id: id.clone(),
        url: url.to_string(),
        title,
        room_type,
        host_id,
        co_host_ids,
        num_reviews: number_before(&page_text, &["review", "reviews"]).map(|n| n as u32),
        latitude: location.map(|(lat, _)| lat),
        longitude: location.map(|(_, long)| long),
        price,
        guests: count(&["guest", "guests"]),
        bedrooms: count(&["bedroom", "bedrooms"]),
        beds: count(&["bed", "beds"]),
        bathrooms: number_before(&overview, &["bath", "baths", "bathroom", "bathrooms"]),
        scraped_at: Utc::now(),
    };
    debug!(room_id = %room.id, host_id = %room.host_id, co_hosts = room.co_host_ids.len(), "Parsed room");
    Ok(room)
}
