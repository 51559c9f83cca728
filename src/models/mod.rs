use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque listing or host identifier, taken from the last path segment of a detail URL
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract the id from something like `https://www.airbnb.ca/rooms/17300762?adults=2`.
    ///
    /// Returns `None` when the last segment is empty or contains anything
    /// other than ASCII alphanumerics, `-` or `_`.
    pub fn from_url(href: &str) -> Option<Self> {
        let without_query = href.split(['?', '#']).next().unwrap_or("");
        let segment = without_query.trim_end_matches('/').rsplit('/').next()?;

        let valid = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        valid.then(|| Self(segment.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// De-duplicated set of ids gathered by one discovery run
pub type ItemIdSet = BTreeSet<ItemId>;

/// One item that could not be crawled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub item_id: ItemId,
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(rename = "msg")]
    pub error_message: String,
}

/// Successfully extracted payloads keyed by id
pub type CrawlResult<T> = BTreeMap<ItemId, T>;

/// Kind of accommodation a room listing advertises
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoomType {
    PrivateRoom,
    SharedRoom,
    EntireHome,
    HotelRoom,
    Other(String),
}

impl RoomType {
    pub fn from_title(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.starts_with("private room") {
            Self::PrivateRoom
        } else if lower.starts_with("shared room") {
            Self::SharedRoom
        } else if lower.starts_with("entire") {
            Self::EntireHome
        } else if lower.starts_with("hotel room") || lower.starts_with("room in") {
            Self::HotelRoom
        } else {
            Self::Other(text.trim().to_string())
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateRoom => f.write_str("Private room"),
            Self::SharedRoom => f.write_str("Shared room"),
            Self::EntireHome => f.write_str("Entire home"),
            Self::HotelRoom => f.write_str("Hotel room"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Data scraped from one room detail page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: ItemId,
    pub url: String,
    pub title: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub host_id: ItemId,
    pub co_host_ids: Vec<ItemId>,
    pub num_reviews: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: Option<u32>,
    pub guests: Option<u32>,
    pub bedrooms: Option<u32>,
    pub beds: Option<u32>,
    pub bathrooms: Option<f32>,
    pub scraped_at: DateTime<Utc>,
}

/// Data scraped from one host profile page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: ItemId,
    pub url: String,
    pub name: String,
    pub super_host: bool,
    pub host_listings: Vec<ItemId>,
    pub num_reviews: Option<u32>,
    pub scraped_at: DateTime<Utc>,
}
