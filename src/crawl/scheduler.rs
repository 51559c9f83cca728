use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ledger::CrawlOutcome;
use super::session::{Session, SessionFactory};
use crate::config::CrawlConfig;
use crate::error::{Result, ScrapeError};
use crate::models::{FailureRecord, ItemId};
use crate::output;
use crate::scrapers::ItemExtractor;

/// Ids waiting to be crawled. `pop` hands each id to exactly one caller.
pub struct WorkQueue {
    items: Mutex<Vec<ItemId>>,
    total: usize,
}

impl WorkQueue {
    /// Duplicate ids in `items` are queued once.
    pub fn new(items: impl IntoIterator<Item = ItemId>) -> Self {
        let unique: BTreeSet<ItemId> = items.into_iter().collect();
        let items: Vec<ItemId> = unique.into_iter().collect();
        let total = items.len();
        Self {
            items: Mutex::new(items),
            total,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Next id plus how many remain after it
    pub async fn pop(&self) -> Option<(ItemId, usize)> {
        let mut items = self.items.lock().await;
        let id = items.pop()?;
        Some((id, items.len()))
    }

    pub async fn drain(&self) -> Vec<ItemId> {
        std::mem::take(&mut *self.items.lock().await)
    }
}

/// Fans a list of ids out over a fixed number of browser sessions.
pub struct CrawlScheduler<'a> {
    factory: &'a dyn SessionFactory,
    config: &'a CrawlConfig,
    cancel: CancellationToken,
}

impl<'a> CrawlScheduler<'a> {
    pub fn new(factory: &'a dyn SessionFactory, config: &'a CrawlConfig, cancel: CancellationToken) -> Self {
        Self {
            factory,
            config,
            cancel,
        }
    }

    /// Crawl every id with `extractor`.
    ///
    /// Per-item failures end up in the returned ledger. Only failing to open
    /// a session, or a worker task dying, fails the whole call.
    pub async fn run<X: ItemExtractor>(
        &self,
        items: impl IntoIterator<Item = ItemId>,
        extractor: Arc<X>,
    ) -> Result<CrawlOutcome<X::Output>> {
        let queue = Arc::new(WorkQueue::new(items));
        let total = queue.total();
        let workers = self.config.concurrency.max(1);
        info!(kind = extractor.kind(), total, workers, "Starting crawl");

        let sessions = self.open_sessions(workers).await?;

        let mut set = JoinSet::new();
        for (idx, session) in sessions.into_iter().enumerate() {
            let worker = Worker {
                number: idx + 1,
                session,
                queue: Arc::clone(&queue),
                extractor: Arc::clone(&extractor),
                config: self.config.clone(),
                cancel: self.cancel.clone(),
            };
            set.spawn(worker.run());
        }

        let mut outcome = CrawlOutcome::default();
        let mut died = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(part) => outcome.absorb(part),
                Err(err) => {
                    error!(error = %err, "Crawl worker failed");
                    died = Some(err.to_string());
                }
            }
        }
        if let Some(msg) = died {
            return Err(ScrapeError::Worker(msg));
        }

        outcome.unprocessed = queue.drain().await;
        if !outcome.unprocessed.is_empty() {
            warn!(
                kind = extractor.kind(),
                unprocessed = outcome.unprocessed.len(),
                "Crawl cancelled before the queue was drained"
            );
        }
        info!(
            kind = extractor.kind(),
            succeeded = outcome.results.len(),
            failed = outcome.failures.len(),
            "Crawl complete"
        );
        Ok(outcome)
    }

    async fn open_sessions(&self, count: usize) -> Result<Vec<Box<dyn Session>>> {
        let mut sessions: Vec<Box<dyn Session>> = Vec::with_capacity(count);
        for _ in 0..count {
            match self.factory.open_session().await {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    for session in sessions {
                        if let Err(close_err) = session.close().await {
                            warn!(error = %close_err, "Failed to close session during abort");
                        }
                    }
                    return Err(match err {
                        ScrapeError::SessionUnavailable(msg) => ScrapeError::SessionUnavailable(msg),
                        other => ScrapeError::SessionUnavailable(other.to_string()),
                    });
                }
            }
        }
        Ok(sessions)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct Worker<X: ItemExtractor> {
    number: usize,
    session: Box<dyn Session>,
    queue: Arc<WorkQueue>,
    extractor: Arc<X>,
    config: CrawlConfig,
    cancel: CancellationToken,
}

impl<X: ItemExtractor> Worker<X> {
    async fn run(mut self) -> CrawlOutcome<X::Output> {
        let mut outcome = CrawlOutcome::default();
        let total = self.queue.total();

        loop {
            if self.cancel.is_cancelled() {
                debug!(worker = self.number, "Cancelled, not taking more work");
                break;
            }
            let Some((id, remaining)) = self.queue.pop().await else {
                break;
            };

            let url = self.extractor.url_for(&id);
            let progress = format!("{} of {}", total - remaining, total);
            info!(worker = self.number, progress = %progress, item_id = %id, url = %url, "Crawling");

            let result = match AssertUnwindSafe(self.process(&id, &url)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(anyhow!("extraction panicked: {}", panic_message(&*panic))),
            };
            match result {
                Ok(data) => {
                    outcome.results.insert(id, data);
                }
                Err(err) => {
                    warn!(
                        worker = self.number,
                        item_id = %id,
                        url = %url,
                        error = %format!("{err:#}"),
                        "Failed to crawl item, continuing"
                    );
                    self.dump(&id).await;
                    outcome.failures.record(FailureRecord {
                        item_id: id,
                        source_url: url,
                        error_message: format!("{err:#}"),
                    });
                }
            }
        }

        if let Err(err) = self.session.close().await {
            warn!(worker = self.number, error = %err, "Failed to close session");
        }
        debug!(worker = self.number, "Worker finished");
        outcome
    }

    async fn process(&mut self, id: &ItemId, url: &str) -> anyhow::Result<X::Output> {
        let nav_timeout = self.config.nav_timeout;
        tokio::time::timeout(nav_timeout, self.session.navigate(url, nav_timeout))
            .await
            .map_err(|_| ScrapeError::Timeout {
                what: format!("navigation to {url}"),
                timeout: nav_timeout,
            })?
            .with_context(|| format!("Failed to navigate to {url}"))?;

        let item_timeout = self.config.item_timeout;
        tokio::time::timeout(item_timeout, self.extractor.extract(self.session.as_mut(), id))
            .await
            .map_err(|_| ScrapeError::Timeout {
                what: format!("{} extraction", self.extractor.kind()),
                timeout: item_timeout,
            })?
            .with_context(|| format!("Failed to extract {} {id}", self.extractor.kind()))
    }

    async fn dump(&mut self, id: &ItemId) {
        let Some(dir) = self.config.dump_dir.clone() else {
            return;
        };
        let capture = match self.session.capture_debug().await {
            Ok(capture) => capture,
            Err(err) => {
                warn!(item_id = %id, error = %err, "Could not capture failed page");
                return;
            }
        };
        if let Err(err) = output::write_failure_dump(&dir, id, &capture).await {
            warn!(item_id = %id, error = %format!("{err:#}"), "Could not write failure dump");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::crawl::DebugCapture;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct FakeSession {
        counters: Arc<Counters>,
        url: String,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<()> {
            if url.ends_with("/unreachable") {
                return Err(ScrapeError::Browser("net::ERR_CONNECTION_RESET".into()));
            }
            if url.ends_with("/stalled") {
                std::future::pending::<()>().await;
            }
            self.url = url.to_string();
            Ok(())
        }

        async fn page_html(&mut self) -> Result<String> {
            Ok(format!("<html><body>{}</body></html>", self.url))
        }

        async fn capture_debug(&mut self) -> Result<DebugCapture> {
            Ok(DebugCapture {
                html: self.url.clone(),
                screenshot: None,
            })
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        counters: Arc<Counters>,
        /// Refuse to open more than this many sessions
        limit: Option<usize>,
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn open_session(&self) -> Result<Box<dyn Session>> {
            let opened = self.counters.opened.fetch_add(1, Ordering::SeqCst);
            if self.limit.is_some_and(|limit| opened >= limit) {
                return Err(ScrapeError::SessionUnavailable("browser went away".into()));
            }
            Ok(Box::new(FakeSession {
                counters: Arc::clone(&self.counters),
                url: String::new(),
            }))
        }
    }

    #[derive(Default)]
    struct StubExtractor {
        failing: HashSet<ItemId>,
        panicking: HashSet<ItemId>,
        hanging: HashSet<ItemId>,
        calls: std::sync::Mutex<HashMap<ItemId, usize>>,
        cancel_on_first: Option<CancellationToken>,
    }

    impl StubExtractor {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|id| ItemId::new(*id)).collect(),
                ..Self::default()
            }
        }

        fn panicking(ids: &[&str]) -> Self {
            Self {
                panicking: ids.iter().map(|id| ItemId::new(*id)).collect(),
                ..Self::default()
            }
        }

        fn hanging(ids: &[&str]) -> Self {
            Self {
                hanging: ids.iter().map(|id| ItemId::new(*id)).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ItemExtractor for StubExtractor {
        type Output = String;

        fn url_for(&self, id: &ItemId) -> String {
            if matches!(id.as_str(), "unreachable" | "stalled") {
                return format!("https://www.airbnb.ca/rooms/{id}");
            }
            format!("https://www.airbnb.ca/rooms/{id}")
        }

        async fn extract(&self, session: &mut dyn Session, id: &ItemId) -> anyhow::Result<String> {
            *self.calls.lock().unwrap().entry(id.clone()).or_default() += 1;
            if let Some(token) = &self.cancel_on_first {
                token.cancel();
            }
            tokio::task::yield_now().await;
            if self.panicking.contains(id) {
                panic!("unexpected page shape");
            }
            if self.hanging.contains(id) {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(id) {
                anyhow::bail!("missing listing title");
            }
            session.page_html().await.map_err(Into::into)
        }

        fn kind(&self) -> &'static str {
            "room"
        }
    }

    fn ids(n: usize) -> Vec<ItemId> {
        (1..=n).map(|i| ItemId::new(format!("i{i}"))).collect()
    }

    fn config(concurrency: usize) -> CrawlConfig {
        CrawlConfig {
            concurrency,
            ..CrawlConfig::default()
        }
    }

    #[tokio::test]
    async fn partial_failures_are_isolated() {
        let factory = FakeFactory::default();
        let config = config(3);
        let extractor = Arc::new(StubExtractor::failing(&["i3", "i7"]));

        let outcome = CrawlScheduler::new(&factory, &config, CancellationToken::new())
            .run(ids(10), Arc::clone(&extractor))
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 8);
        let failed: Vec<&str> = outcome.failures.ids().map(ItemId::as_str).collect();
        assert_eq!(failed, vec!["i3", "i7"]);
        let record = outcome.failures.get(&ItemId::new("i3")).unwrap();
        assert_eq!(record.source_url, "https://www.airbnb.ca/rooms/i3");
        assert!(record.error_message.contains("missing listing title"));
        assert!(outcome.unprocessed.is_empty());
    }

    #[tokio::test]
    async fn every_id_resolves_exactly_once_for_any_concurrency() {
        for concurrency in [1, 2, 4, 16] {
            let factory = FakeFactory::default();
            let config = config(concurrency);
            let extractor = Arc::new(StubExtractor::failing(&["i2", "i11", "i19"]));
            let input = ids(25);

            let outcome = CrawlScheduler::new(&factory, &config, CancellationToken::new())
                .run(input.clone(), Arc::clone(&extractor))
                .await
                .unwrap();

            let succeeded: BTreeSet<&ItemId> = outcome.results.keys().collect();
            let failed: BTreeSet<&ItemId> = outcome.failures.ids().collect();
            assert!(succeeded.is_disjoint(&failed));
            let all: BTreeSet<&ItemId> = succeeded.union(&failed).copied().collect();
            assert_eq!(all, input.iter().collect::<BTreeSet<_>>());

            let calls = extractor.calls.lock().unwrap();
            assert_eq!(calls.len(), 25);
            assert!(calls.values().all(|&n| n == 1), "concurrency {concurrency}");
        }
    }

    #[tokio::test]
    async fn each_session_is_closed_once() {
        let factory = FakeFactory::default();
        let config = config(4);

        CrawlScheduler::new(&factory, &config, CancellationToken::new())
            .run(ids(2), Arc::new(StubExtractor::default()))
            .await
            .unwrap();

        assert_eq!(factory.counters.opened.load(Ordering::SeqCst), 4);
        assert_eq!(factory.counters.closed.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn navigation_errors_are_item_failures() {
        let factory = FakeFactory::default();
        let config = config(2);
        let input = vec![ItemId::new("ok"), ItemId::new("unreachable")];

        let outcome = CrawlScheduler::new(&factory, &config, CancellationToken::new())
            .run(input, Arc::new(StubExtractor::default()))
            .await
            .unwrap();

        assert!(outcome.results.contains_key(&ItemId::new("ok")));
        let record = outcome.failures.get(&ItemId::new("unreachable")).unwrap();
        assert!(record.error_message.contains("ERR_CONNECTION_RESET"));
    }

    #[tokio::test]
    async fn panicking_extraction_is_an_item_failure() {
        let factory = FakeFactory::default();
        let config = config(2);
        let extractor = Arc::new(StubExtractor::panicking(&["i3"]));

        let outcome = CrawlScheduler::new(&factory, &config, CancellationToken::new())
            .run(ids(10), Arc::clone(&extractor))
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 9);
        let record = outcome.failures.get(&ItemId::new("i3")).unwrap();
        assert!(record.error_message.contains("unexpected page shape"));
        assert_eq!(factory.counters.closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_extraction_times_out_as_an_item_failure() {
        let factory = FakeFactory::default();
        let config = CrawlConfig {
            item_timeout: Duration::from_millis(200),
            ..config(1)
        };
        let extractor = Arc::new(StubExtractor::hanging(&["i3"]));

        let outcome = CrawlScheduler::new(&factory, &config, CancellationToken::new())
            .run(ids(5), Arc::clone(&extractor))
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 4);
        let failed: Vec<&str> = outcome.failures.ids().map(ItemId::as_str).collect();
        assert_eq!(failed, vec!["i3"]);
        let record = outcome.failures.get(&ItemId::new("i3")).unwrap();
        assert!(record.error_message.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_navigation_times_out_as_an_item_failure() {
        let factory = FakeFactory::default();
        let config = CrawlConfig {
            nav_timeout: Duration::from_secs(2),
            ..config(2)
        };
        let input = vec![ItemId::new("ok"), ItemId::new("stalled")];

        let outcome = CrawlScheduler::new(&factory, &config, CancellationToken::new())
            .run(input, Arc::new(StubExtractor::default()))
            .await
            .unwrap();

        assert!(outcome.results.contains_key(&ItemId::new("ok")));
        let record = outcome.failures.get(&ItemId::new("stalled")).unwrap();
        assert!(record.error_message.contains("navigation"));
        assert!(record.error_message.contains("timed out"));
    }

    #[tokio::test]
    async fn session_open_failure_aborts_and_releases_opened_sessions() {
        let factory = FakeFactory {
            limit: Some(2),
            ..FakeFactory::default()
        };
        let config = config(3);
        let extractor = Arc::new(StubExtractor::default());

        let err = CrawlScheduler::new(&factory, &config, CancellationToken::new())
            .run(ids(5), Arc::clone(&extractor))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(factory.counters.closed.load(Ordering::SeqCst), 2);
        assert!(extractor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_new_work_and_reports_the_rest() {
        let factory = FakeFactory::default();
        let config = config(1);
        let cancel = CancellationToken::new();
        let extractor = Arc::new(StubExtractor {
            cancel_on_first: Some(cancel.clone()),
            ..StubExtractor::default()
        });

        let outcome = CrawlScheduler::new(&factory, &config, cancel)
            .run(ids(10), Arc::clone(&extractor))
            .await
            .unwrap();

        assert_eq!(outcome.processed(), 1);
        assert_eq!(outcome.unprocessed.len(), 9);
        assert_eq!(factory.counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_input_ids_are_crawled_once() {
        let factory = FakeFactory::default();
        let config = config(2);
        let extractor = Arc::new(StubExtractor::default());
        let input = vec![ItemId::new("a"), ItemId::new("b"), ItemId::new("a")];

        let outcome = CrawlScheduler::new(&factory, &config, CancellationToken::new())
            .run(input, Arc::clone(&extractor))
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(extractor.calls.lock().unwrap()[&ItemId::new("a")], 1);
    }

    #[tokio::test]
    async fn queue_never_hands_out_an_id_twice() {
        let queue = Arc::new(WorkQueue::new(ids(200)));
        let mut set = JoinSet::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            set.spawn(async move {
                let mut taken = Vec::new();
                while let Some((id, _)) = queue.pop().await {
                    taken.push(id);
                    tokio::task::yield_now().await;
                }
                taken
            });
        }

        let mut seen = BTreeSet::new();
        while let Some(taken) = set.join_next().await {
            for id in taken.unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 200);
    }
}
