//! Cached media API used by every page and by the search pipeline.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::cache::{Clock, TtlCache};
use crate::catalog::{CatalogSource, FetchError};
use crate::models::Media;
use crate::notify::Notifier;

/// Artificial latency applied before each producer runs, to mimic a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedDelays {
    pub search: Duration,
    pub trending: Duration,
    pub popular: Duration,
    pub series: Duration,
    pub tv: Duration,
    pub by_id: Duration,
}

impl SimulatedDelays {
    pub fn none() -> Self {
        Self {
            search: Duration::ZERO,
            trending: Duration::ZERO,
            popular: Duration::ZERO,
            series: Duration::ZERO,
            tv: Duration::ZERO,
            by_id: Duration::ZERO,
        }
    }

    pub fn realistic() -> Self {
        Self {
            search: Duration::from_millis(500),
            trending: Duration::from_millis(700),
            popular: Duration::from_millis(600),
            series: Duration::from_millis(800),
            tv: Duration::from_millis(800),
            by_id: Duration::from_millis(600),
        }
    }
}

impl Default for SimulatedDelays {
    fn default() -> Self {
        Self::none()
    }
}

pub fn search_key(term: &str) -> String {
    format!("search:{term}")
}

pub fn movie_key(id: &str) -> String {
    format!("movie:{id}")
}

pub struct MediaApi {
    source: Arc<dyn CatalogSource>,
    lists: TtlCache<Vec<Media>>,
    items: TtlCache<Option<Media>>,
    notifier: Arc<dyn Notifier>,
    delays: SimulatedDelays,
}

impl std::fmt::Debug for MediaApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaApi")
            .field("lists", &self.lists)
            .field("delays", &self.delays)
            .finish()
    }
}

impl MediaApi {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        notifier: Arc<dyn Notifier>,
        ttl: Duration,
        max_entries: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            lists: TtlCache::new(ttl, max_entries, clock.clone()),
            items: TtlCache::new(ttl, max_entries, clock),
            notifier,
            delays: SimulatedDelays::none(),
        }
    }

    pub fn with_delays(mut self, delays: SimulatedDelays) -> Self {
        self.delays = delays;
        self
    }

    async fn simulate(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn report(&self, key: &str, err: &FetchError) {
        error!(key = %key, "Fetch failed: {}", err);
        self.notifier.error(&err.to_string());
    }

    async fn cached_list<F, Fut>(
        &self,
        key: &str,
        delay: Duration,
        produce: F,
    ) -> Result<Vec<Media>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<Media>, FetchError>>,
    {
        let result = self
            .lists
            .get_or_fetch(key, || async move {
                Self::simulate(delay).await;
                produce().await
            })
            .await;
        if let Err(e) = &result {
            self.report(key, e);
        }
        result
    }

    /// Search results are cached per raw term. No match is an empty list.
    pub async fn fetch_movies(&self, term: &str) -> Result<Vec<Media>, FetchError> {
        let key = search_key(term);
        let source = self.source.clone();
        let results = self
            .cached_list(&key, self.delays.search, || async move {
                source.search(term).await
            })
            .await?;
        debug!(key = %key, hits = results.len(), "Search resolved");
        Ok(results)
    }

    pub async fn fetch_trending(&self) -> Result<Vec<Media>, FetchError> {
        let source = self.source.clone();
        self.cached_list("trending", self.delays.trending, || async move {
            source.trending().await
        })
        .await
    }

    pub async fn fetch_popular(&self) -> Result<Vec<Media>, FetchError> {
        let source = self.source.clone();
        self.cached_list("popular", self.delays.popular, || async move {
            source.popular().await
        })
        .await
    }

    pub async fn fetch_web_series(&self) -> Result<Vec<Media>, FetchError> {
        let source = self.source.clone();
        self.cached_list("series", self.delays.series, || async move {
            source.web_series().await
        })
        .await
    }

    pub async fn fetch_tv_shows(&self) -> Result<Vec<Media>, FetchError> {
        let source = self.source.clone();
        self.cached_list("tv", self.delays.tv, || async move { source.tv_shows().await })
            .await
    }

    /// `Ok(None)` when no record has this id.
    pub async fn fetch_movie_by_id(&self, id: &str) -> Result<Option<Media>, FetchError> {
        let key = movie_key(id);
        let source = self.source.clone();
        let delay = self.delays.by_id;
        let result = self
            .items
            .get_or_fetch(&key, || async move {
                Self::simulate(delay).await;
                source.find(id).await
            })
            .await;
        if let Err(e) = &result {
            self.report(&key, e);
        }
        result
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        let list = self.lists.invalidate(key).await;
        let item = self.items.invalidate(key).await;
        list || item
    }

    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.lists.invalidate_prefix(prefix).await + self.items.invalidate_prefix(prefix).await
    }

    pub async fn clear(&self) {
        self.lists.clear().await;
        self.items.clear().await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::{ManualClock, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
    use crate::catalog::InMemoryCatalog;
    use crate::notify::RecordingNotifier;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Wraps the seeded catalog, counting calls and optionally failing.
    pub(crate) struct CountingSource {
        inner: InMemoryCatalog,
        pub searches: Mutex<Vec<String>>,
        pub lists: AtomicUsize,
        pub fail: bool,
    }

    impl CountingSource {
        pub(crate) fn new(fail: bool) -> Self {
            Self {
                inner: InMemoryCatalog::seeded().expect("seed"),
                searches: Mutex::new(Vec::new()),
                lists: AtomicUsize::new(0),
                fail,
            }
        }

        fn check(&self) -> Result<(), FetchError> {
            if self.fail {
                Err(FetchError::Network("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CatalogSource for CountingSource {
        async fn trending(&self) -> Result<Vec<Media>, FetchError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.trending().await
        }
        async fn popular(&self) -> Result<Vec<Media>, FetchError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.popular().await
        }
        async fn web_series(&self) -> Result<Vec<Media>, FetchError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.web_series().await
        }
        async fn tv_shows(&self) -> Result<Vec<Media>, FetchError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.tv_shows().await
        }
        async fn search(&self, query: &str) -> Result<Vec<Media>, FetchError> {
            self.searches.lock().unwrap().push(query.to_string());
            self.check()?;
            self.inner.search(query).await
        }
        async fn find(&self, id: &str) -> Result<Option<Media>, FetchError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.find(id).await
        }
    }

    fn api(
        source: Arc<CountingSource>,
    ) -> (MediaApi, ManualClock, Arc<RecordingNotifier>) {
        let clock = ManualClock::new(Utc::now());
        let notifier = Arc::new(RecordingNotifier::new());
        let api = MediaApi::new(
            source,
            notifier.clone(),
            DEFAULT_TTL,
            DEFAULT_MAX_ENTRIES,
            Arc::new(clock.clone()),
        );
        (api, clock, notifier)
    }

    #[tokio::test]
    async fn search_is_cached_per_term_until_ttl() {
        let source = Arc::new(CountingSource::new(false));
        let (api, clock, _) = api(source.clone());

        let first = api.fetch_movies("dune").await.expect("search");
        let second = api.fetch_movies("dune").await.expect("search");
        assert_eq!(first, second);
        assert_eq!(source.searches.lock().unwrap().len(), 1);

        clock.advance(Duration::from_secs(301));
        api.fetch_movies("dune").await.expect("search");
        assert_eq!(source.searches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_search_is_an_empty_list() {
        let source = Arc::new(CountingSource::new(false));
        let (api, _, notifier) = api(source);
        let results = api.fetch_movies("no such title").await.expect("search");
        assert!(results.is_empty());
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn failure_notifies_and_propagates() {
        let source = Arc::new(CountingSource::new(true));
        let (api, _, notifier) = api(source.clone());

        let err = api.fetch_trending().await.expect_err("should fail");
        assert_eq!(err, FetchError::Network("connection reset".to_string()));
        assert_eq!(
            notifier.messages(),
            vec!["Network request failed: connection reset".to_string()]
        );

        // Failures are not cached, so the next call reaches the source again.
        let _ = api.fetch_trending().await;
        assert_eq!(source.lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_movie_is_none_and_cached() {
        let source = Arc::new(CountingSource::new(false));
        let (api, _, notifier) = api(source.clone());
        assert!(api.fetch_movie_by_id("missing").await.expect("fetch").is_none());
        assert!(api.fetch_movie_by_id("missing").await.expect("fetch").is_none());
        assert_eq!(source.lists.load(Ordering::SeqCst), 1);
        assert!(notifier.messages().is_empty());

        let dune = api
            .fetch_movie_by_id("tt15239678")
            .await
            .expect("fetch")
            .expect("present");
        assert_eq!(dune.title, "Dune: Part Two");
    }

    #[tokio::test]
    async fn invalidation_forces_refetch() {
        let source = Arc::new(CountingSource::new(false));
        let (api, _, _) = api(source.clone());
        api.fetch_popular().await.expect("popular");
        api.fetch_popular().await.expect("popular");
        assert_eq!(source.lists.load(Ordering::SeqCst), 1);

        assert!(api.invalidate("popular").await);
        api.fetch_popular().await.expect("popular");
        assert_eq!(source.lists.load(Ordering::SeqCst), 2);

        api.fetch_movies("kong").await.expect("search");
        api.fetch_movies("panda").await.expect("search");
        assert_eq!(api.invalidate_prefix("search:").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_delay_applies_before_producer() {
        let source = Arc::new(CountingSource::new(false));
        let (api, _, _) = api(source);
        let api = api.with_delays(SimulatedDelays::realistic());
        let started = tokio::time::Instant::now();
        api.fetch_web_series().await.expect("series");
        assert!(started.elapsed() >= Duration::from_millis(800));
    }
}
