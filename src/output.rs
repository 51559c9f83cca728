use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::crawl::{CrawlOutcome, DebugCapture, FailureLedger};
use crate::models::{CrawlResult, Host, ItemId, ItemIdSet, Room};

/// Room ids found for a city. Also readable from a room failure file, which
/// carries the failed and never-crawled ids under the same `rooms` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomIdScrapeData {
    pub city: String,
    pub province: String,
    #[serde(default)]
    pub num_rooms: usize,
    pub rooms: Vec<ItemId>,
}

impl RoomIdScrapeData {
    pub fn new(city: &str, province: &str, rooms: &ItemIdSet) -> Self {
        Self {
            city: city.to_string(),
            province: province.to_string(),
            num_rooms: rooms.len(),
            rooms: rooms.iter().cloned().collect(),
        }
    }
}

/// Hosts and co-hosts of the crawled rooms
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomHostScrapeData {
    pub city: String,
    pub province: String,
    pub hosts: Vec<ItemId>,
    #[serde(default)]
    pub co_hosts: Vec<ItemId>,
}

impl RoomHostScrapeData {
    pub fn from_rooms(city: &str, province: &str, rooms: &CrawlResult<Room>) -> Self {
        Self {
            city: city.to_string(),
            province: province.to_string(),
            hosts: rooms.values().map(|room| room.host_id.clone()).collect(),
            co_hosts: rooms
                .values()
                .flat_map(|room| room.co_host_ids.iter().cloned())
                .collect(),
        }
    }

    /// Every host and co-host, once
    pub fn all_hosts(&self) -> ItemIdSet {
        self.hosts.iter().chain(&self.co_hosts).cloned().collect()
    }
}

#[derive(Serialize)]
struct ScrapeData<'a, T> {
    city: &'a str,
    province: &'a str,
    data: &'a T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomFailureData<'a> {
    city: &'a str,
    province: &'a str,
    num_rooms: usize,
    /// Failed ids followed by the ones a cancelled crawl never reached
    rooms: Vec<&'a ItemId>,
    num_failures: usize,
    num_unprocessed: usize,
    data: &'a FailureLedger,
    unprocessed: &'a [ItemId],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostFailureData<'a> {
    city: &'a str,
    province: &'a str,
    num_failures: usize,
    num_unprocessed: usize,
    hosts: Vec<&'a ItemId>,
    data: &'a FailureLedger,
    unprocessed: &'a [ItemId],
}

#[derive(Serialize)]
struct BasicRow<'a> {
    city: &'a str,
    province: &'a str,
    #[serde(rename = "roomId")]
    room_id: &'a ItemId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomRow<'a> {
    city: &'a str,
    province: &'a str,
    room_id: &'a ItemId,
    room_url: &'a str,
    title: &'a str,
    #[serde(rename = "type")]
    room_type: String,
    host_id: &'a ItemId,
    co_host_ids: String,
    num_reviews: Option<u32>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    price: Option<u32>,
    guests: Option<u32>,
    bedrooms: Option<u32>,
    beds: Option<u32>,
    bathrooms: Option<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostRow<'a> {
    city: &'a str,
    province: &'a str,
    host_id: &'a ItemId,
    host_url: &'a str,
    name: &'a str,
    super_host: bool,
    num_listings: usize,
    host_listings: String,
    num_reviews: Option<u32>,
}

/// Ids a resumed run has to crawl again
fn retry_ids<T>(outcome: &CrawlOutcome<T>) -> Vec<&ItemId> {
    outcome.failures.ids().chain(&outcome.unprocessed).collect()
}

fn join_ids(ids: &[ItemId]) -> String {
    ids.iter().map(ItemId::as_str).collect::<Vec<_>>().join(";")
}

/// Writes the result files of one city, all sharing `<YYYYMMDD>_<City>_<Province>_airbnb`.
pub struct OutputWriter {
    dir: PathBuf,
    base: String,
    city: String,
    province: String,
    mode: u32,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, city: &str, province: &str, date: NaiveDate, mode: u32) -> Self {
        let base = format!(
            "{}_{}_{}_airbnb",
            date.format("%Y%m%d"),
            city.replace(' ', "_"),
            province.replace(' ', "_")
        );
        Self {
            dir: dir.into(),
            base,
            city: city.to_string(),
            province: province.to_string(),
            mode,
        }
    }

    pub fn path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.base, suffix))
    }

    pub async fn write_basic_data(&self, rooms: &ItemIdSet) -> Result<()> {
        self.write_json(
            "_basic_data.json",
            &RoomIdScrapeData::new(&self.city, &self.province, rooms),
        )
        .await?;
        let rows = rooms.iter().map(|room_id| BasicRow {
            city: &self.city,
            province: &self.province,
            room_id,
        });
        self.write_csv("_basic_data.csv", rows).await
    }

    /// Room data, room failures and the derived host list. Returns the host list.
    pub async fn write_room_outcome(&self, outcome: &CrawlOutcome<Room>) -> Result<RoomHostScrapeData> {
        self.write_json(
            "_room_data.json",
            &ScrapeData {
                city: &self.city,
                province: &self.province,
                data: &outcome.results,
            },
        )
        .await?;

        let rows = outcome.results.values().map(|room| RoomRow {
            city: &self.city,
            province: &self.province,
            room_id: &room.id,
            room_url: &room.url,
            title: &room.title,
            room_type: room.room_type.to_string(),
            host_id: &room.host_id,
            co_host_ids: join_ids(&room.co_host_ids),
            num_reviews: room.num_reviews,
            latitude: room.latitude,
            longitude: room.longitude,
            price: room.price,
            guests: room.guests,
            bedrooms: room.bedrooms,
            beds: room.beds,
            bathrooms: room.bathrooms,
        });
        self.write_csv("_room_data.csv", rows).await?;

        if !outcome.failures.is_empty() || !outcome.unprocessed.is_empty() {
            error!(
                failures = outcome.failures.len(),
                unprocessed = outcome.unprocessed.len(),
                "Some rooms were not crawled. Placing into failure file."
            );
        }
        self.write_json(
            "_room_failures.json",
            &RoomFailureData {
                city: &self.city,
                province: &self.province,
                num_rooms: outcome.results.len(),
                rooms: retry_ids(outcome),
                num_failures: outcome.failures.len(),
                num_unprocessed: outcome.unprocessed.len(),
                data: &outcome.failures,
                unprocessed: &outcome.unprocessed,
            },
        )
        .await?;

        let hosts = RoomHostScrapeData::from_rooms(&self.city, &self.province, &outcome.results);
        self.write_json("_room_host_data.json", &hosts).await?;
        Ok(hosts)
    }

    pub async fn write_host_outcome(&self, outcome: &CrawlOutcome<Host>) -> Result<()> {
        self.write_json(
            "_host_data.json",
            &ScrapeData {
                city: &self.city,
                province: &self.province,
                data: &outcome.results,
            },
        )
        .await?;

        let rows = outcome.results.values().map(|host| HostRow {
            city: &self.city,
            province: &self.province,
            host_id: &host.id,
            host_url: &host.url,
            name: &host.name,
            super_host: host.super_host,
            num_listings: host.host_listings.len(),
            host_listings: join_ids(&host.host_listings),
            num_reviews: host.num_reviews,
        });
        self.write_csv("_host_data.csv", rows).await?;

        if !outcome.failures.is_empty() || !outcome.unprocessed.is_empty() {
            error!(
                failures = outcome.failures.len(),
                unprocessed = outcome.unprocessed.len(),
                "Some hosts were not crawled. Placing into failure file."
            );
        }
        self.write_json(
            "_host_failures.json",
            &HostFailureData {
                city: &self.city,
                province: &self.province,
                num_failures: outcome.failures.len(),
                num_unprocessed: outcome.unprocessed.len(),
                hosts: retry_ids(outcome),
                data: &outcome.failures,
                unprocessed: &outcome.unprocessed,
            },
        )
        .await
    }

    async fn write_json<T: Serialize>(&self, suffix: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        self.write_file(suffix, json.into_bytes()).await
    }

    async fn write_csv<R: Serialize>(&self, suffix: &str, rows: impl IntoIterator<Item = R>) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in rows {
            writer.serialize(row)?;
        }
        let bytes = writer.into_inner().context("Failed to flush CSV")?;
        self.write_file(suffix, bytes).await
    }

    async fn write_file(&self, suffix: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path(suffix);
        write_with_mode(&path, &bytes, self.mode).await?;
        info!(path = %path.display(), "💾 Saved");
        Ok(())
    }
}

/// Write `bytes` to `path`, replacing any read-only file from an earlier run
async fn write_with_mode(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err).with_context(|| format!("Failed to replace {}", path.display())),
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

/// Save the DOM and screenshot of a failed page under `dir`.
pub async fn write_failure_dump(dir: &Path, id: &ItemId, capture: &DebugCapture) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let now = Utc::now();
    let base = format!("{}_{}_{}", now.format("%Y%m%d"), now.timestamp_millis(), id);

    let dom = dir.join(format!("{base}_dom.txt"));
    tokio::fs::write(&dom, &capture.html)
        .await
        .with_context(|| format!("Failed to write {}", dom.display()))?;
    error!(path = %dom.display(), "DOM written");

    if let Some(png) = &capture.screenshot {
        let shot = dir.join(format!("{base}_screenshot.png"));
        tokio::fs::write(&shot, png)
            .await
            .with_context(|| format!("Failed to write {}", shot.display()))?;
        error!(path = %shot.display(), "Screenshot written");
    }
    Ok(())
}

pub async fn load_room_ids(path: &Path) -> Result<RoomIdScrapeData> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read room id file {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid room id file {}", path.display()))
}

pub async fn load_host_ids(path: &Path) -> Result<RoomHostScrapeData> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read host id file {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid host id file {}", path.display()))
}
