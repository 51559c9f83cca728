mod config;
mod crawl;
mod error;
mod models;
mod output;
mod scrapers;
mod search;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{CrawlConfig, SearchConfig};
use crawl::{CrawlOutcome, CrawlScheduler};
use error::ScrapeError;
use models::{Host, ItemIdSet, Room};
use output::OutputWriter;
use scrapers::{ChromeBrowser, HostExtractor, RoomExtractor, SearchParams};
use search::RegionSplitter;

#[derive(Debug, Parser)]
#[command(
    name = "listing-scout",
    version,
    about = "Collects every Airbnb listing and host of a city by subdividing the search map"
)]
struct Cli {
    /// Directory the result files are written to
    #[arg(long, value_name = "DIR")]
    out: PathBuf,

    #[arg(long, required_unless_present_any = ["room_id_file", "host_id_file"])]
    city: Option<String>,

    #[arg(long, required_unless_present_any = ["room_id_file", "host_id_file"])]
    province: Option<String>,

    /// Skip the search and crawl the rooms of a basic data or room failure file
    #[arg(long, value_name = "FILE", conflicts_with = "host_id_file")]
    room_id_file: Option<PathBuf>,

    /// Skip the room stages and crawl the hosts of a room host data or host failure file
    #[arg(long, value_name = "FILE")]
    host_id_file: Option<PathBuf>,

    #[arg(long, value_name = "YYYY-MM-DD", requires = "end_date")]
    start_date: Option<NaiveDate>,

    #[arg(long, value_name = "YYYY-MM-DD", requires = "start_date")]
    end_date: Option<NaiveDate>,

    /// Browser tabs crawling in parallel
    #[arg(long, value_name = "N", default_value_t = 1)]
    max_pages_open: usize,

    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Octal mode of the written result files
    #[arg(long, value_name = "MODE", default_value = "444", value_parser = parse_mode)]
    file_permissions: u32,

    /// Log filter for both the console and the operation log file
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Console log filter, overriding --log-level. RUST_LOG overrides both.
    #[arg(long, value_name = "LEVEL")]
    log_level_console: Option<String>,

    /// Operation log file filter, overriding --log-level
    #[arg(long, value_name = "LEVEL")]
    log_level_file: Option<String>,

    /// Largest result count read without splitting the map further
    #[arg(long, value_name = "N", default_value_t = 300)]
    threshold: u64,

    #[arg(long, value_name = "N", default_value_t = 8)]
    max_depth: u32,

    #[arg(long, value_name = "N", default_value_t = 20)]
    anchor_retry_limit: u32,

    #[arg(long, value_name = "SECS", default_value_t = 30)]
    nav_timeout_secs: u64,

    /// Save DOM and screenshot of failed pages under room_errors/ and host_errors/
    #[arg(long, default_value_t = false)]
    dump_failures: bool,
}

impl Cli {
    fn search_config(&self) -> SearchConfig {
        SearchConfig {
            threshold: self.threshold,
            max_depth: self.max_depth,
            anchor_retry_limit: self.anchor_retry_limit,
            heading_timeout: Duration::from_secs(self.nav_timeout_secs),
            ..SearchConfig::default()
        }
    }

    fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            concurrency: self.max_pages_open.max(1),
            nav_timeout: Duration::from_secs(self.nav_timeout_secs),
            ..CrawlConfig::default()
        }
    }

    fn dump_dir(&self, name: &str) -> Option<PathBuf> {
        self.dump_failures.then(|| self.out.join(name))
    }

    fn place_or(&self, city: &str, province: &str) -> (String, String) {
        (
            self.city.clone().unwrap_or_else(|| city.to_string()),
            self.province.clone().unwrap_or_else(|| province.to_string()),
        )
    }
}

/// Log to the console and to `<out>/<YYYYMMDD>_<millis>_operation.log`.
fn init_logging(cli: &Cli) -> Result<PathBuf> {
    let now = Local::now();
    let path = cli.out.join(format!(
        "{}_{}_operation.log",
        now.format("%Y%m%d"),
        now.timestamp_millis()
    ));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;

    let console_level = cli.log_level_console.as_deref().unwrap_or(&cli.log_level);
    let file_level = cli.log_level_file.as_deref().unwrap_or(&cli.log_level);
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(EnvFilter::new(file_level)),
        )
        .init();
    Ok(path)
}

fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    u32::from_str_radix(s, 8).map_err(|e| format!("invalid octal mode {s}: {e}"))
}

/// Room ids to crawl, or host ids when resuming straight into the host stage
enum Start {
    Rooms(ItemIdSet),
    Hosts(ItemIdSet),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.out)
        .with_context(|| format!("Failed to create {}", cli.out.display()))?;
    let log_path = init_logging(&cli)?;

    info!(log = %log_path.display(), "🏠 Listing Scout");
    if !cli.headless && cli.max_pages_open > 1 {
        warn!(
            workers = cli.max_pages_open,
            "Multiple workers in headful mode don't work as expected, they will act more like 1 worker"
        );
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing pages in flight");
                cancel.cancel();
            }
        });
    }

    let browser = ChromeBrowser::launch(cli.headless)?;
    let result = run(&cli, &browser, &cancel).await;
    if let Err(err) = &result {
        match err.downcast_ref::<ScrapeError>() {
            Some(scrape) if scrape.is_fatal() => {
                error!(error = %format!("{err:#}"), "Browser infrastructure failed, run aborted")
            }
            _ => error!(error = %format!("{err:#}"), "Run finished with errors"),
        }
    }
    result
}

async fn run(cli: &Cli, browser: &ChromeBrowser, cancel: &CancellationToken) -> Result<()> {
    let (city, province, start) = if let Some(path) = &cli.host_id_file {
        let data = output::load_host_ids(path).await?;
        let (city, province) = cli.place_or(&data.city, &data.province);
        info!(path = %path.display(), hosts = data.all_hosts().len(), "Resuming from host id file");
        (city, province, Start::Hosts(data.all_hosts()))
    } else if let Some(path) = &cli.room_id_file {
        let data = output::load_room_ids(path).await?;
        let (city, province) = cli.place_or(&data.city, &data.province);
        info!(path = %path.display(), rooms = data.rooms.len(), "Resuming from room id file");
        (city, province, Start::Rooms(data.rooms.into_iter().collect()))
    } else {
        let city = cli.city.clone().context("--city is required")?;
        let province = cli.province.clone().context("--province is required")?;
        let mut params = SearchParams::new(&city, &province);
        if let (Some(start), Some(end)) = (cli.start_date, cli.end_date) {
            if end <= start {
                bail!("--end-date must be after --start-date");
            }
            params = params.with_dates(start, end);
        }
        let rooms = search_rooms(browser, &params, &cli.search_config(), cancel).await?;
        (city, province, Start::Rooms(rooms))
    };

    let writer = OutputWriter::new(
        &cli.out,
        &city,
        &province,
        Local::now().date_naive(),
        cli.file_permissions,
    );

    let (hosts, room_failures) = match start {
        Start::Hosts(hosts) => (hosts, 0),
        Start::Rooms(rooms) => {
            if cli.room_id_file.is_none() {
                writer.write_basic_data(&rooms).await?;
            }
            let config = cli.crawl_config().with_dump_dir(cli.dump_dir("room_errors"));
            let outcome: CrawlOutcome<Room> = CrawlScheduler::new(browser, &config, cancel.clone())
                .run(rooms, Arc::new(RoomExtractor))
                .await?;
            let hosts = writer.write_room_outcome(&outcome).await?;
            report_unprocessed("room", &outcome.unprocessed);
            (hosts.all_hosts(), outcome.failures.len())
        }
    };

    if cancel.is_cancelled() {
        bail!("Interrupted before the host crawl");
    }

    let config = cli.crawl_config().with_dump_dir(cli.dump_dir("host_errors"));
    let outcome: CrawlOutcome<Host> = CrawlScheduler::new(browser, &config, cancel.clone())
        .run(hosts, Arc::new(HostExtractor))
        .await?;
    writer.write_host_outcome(&outcome).await?;
    report_unprocessed("host", &outcome.unprocessed);

    if room_failures > 0 {
        bail!("{room_failures} rooms failed, see the room failure file");
    }
    if cancel.is_cancelled() {
        bail!("Interrupted before every host was crawled");
    }
    info!("✅ Done");
    Ok(())
}

/// Run the map search on a fresh search page for `params`.
async fn search_rooms(
    browser: &ChromeBrowser,
    params: &SearchParams,
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> Result<ItemIdSet> {
    let mut view = browser
        .open_search(params, config.poll_interval, config.heading_timeout)
        .await?;

    let found = {
        let mut splitter = RegionSplitter::new(&mut view, config)?;
        tokio::select! {
            found = splitter.discover_all() => found.map_err(anyhow::Error::from),
            _ = cancel.cancelled() => Err(anyhow!("Interrupted during the map search")),
        }
    };

    if let Err(err) = view.close().await {
        warn!(error = %err, "Failed to close search tab");
    }
    let rooms = found.context("Map search failed")?;
    info!(rooms = rooms.len(), "Found rooms");
    Ok(rooms)
}

fn report_unprocessed(kind: &str, ids: &[models::ItemId]) {
    if ids.is_empty() {
        return;
    }
    let list = ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ");
    error!(kind, count = ids.len(), ids = %list, "Never crawled");
}
