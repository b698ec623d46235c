//! Offline asset cache with per-request strategies: network-first for pages,
//! cache-first for images, stale-while-revalidate for everything else.
//! Caches are named by version; activating a version drops all others.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::FetchError;

pub const CACHE_PREFIX: &str = "yoostream-cache-";
pub const OFFLINE_PAGE: &str = "/offline.html";
pub const STATIC_ASSETS: &[&str] = &["/", "/index.html", OFFLINE_PAGE, "/favicon.svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Other,
}

#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub method: Method,
    pub url: String,
    pub accept: Option<String>,
    pub destination: Destination,
}

impl AssetRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            accept: None,
            destination: Destination::Other,
        }
    }

    pub fn page(url: impl Into<String>) -> Self {
        Self {
            accept: Some("text/html,application/xhtml+xml".to_string()),
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            accept: Some("image/avif,image/webp,*/*".to_string()),
            destination: Destination::Image,
            ..Self::get(url)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

/// `None` means the request is not ours to handle (non-GET or cross-origin).
pub fn strategy_for(request: &AssetRequest, origin: &str) -> Option<Strategy> {
    if request.method != Method::GET {
        return None;
    }
    if !is_same_origin(&request.url, origin) {
        return None;
    }
    let wants_html = request
        .accept
        .as_deref()
        .is_some_and(|accept| accept.contains("text/html"));
    Some(if wants_html {
        Strategy::NetworkFirst
    } else if request.destination == Destination::Image {
        Strategy::CacheFirst
    } else {
        Strategy::StaleWhileRevalidate
    })
}

fn is_same_origin(url: &str, origin: &str) -> bool {
    if url.starts_with('/') && !url.starts_with("//") {
        return true;
    }
    let origin = origin.trim_end_matches('/');
    url == origin
        || url
            .strip_prefix(origin)
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
}

pub fn cache_name(version: &str) -> String {
    format!("{CACHE_PREFIX}{version}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<CachedResponse, FetchError>;
}

struct Inner {
    origin: String,
    current: String,
    fetcher: Arc<dyn Fetcher>,
    caches: Mutex<HashMap<String, HashMap<String, CachedResponse>>>,
    revalidations: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct AssetCache {
    inner: Arc<Inner>,
}

impl AssetCache {
    pub fn new(origin: impl Into<String>, version: &str, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                origin: origin.into().trim_end_matches('/').to_string(),
                current: cache_name(version),
                fetcher,
                caches: Mutex::new(HashMap::new()),
                revalidations: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn current_cache(&self) -> &str {
        &self.inner.current
    }

    pub async fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.caches.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn key(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.inner.origin, url)
        } else {
            url.to_string()
        }
    }

    pub async fn put_in(&self, cache: &str, url: &str, response: CachedResponse) {
        let key = self.key(url);
        self.inner
            .caches
            .lock()
            .await
            .entry(cache.to_string())
            .or_default()
            .insert(key, response);
    }

    async fn put(&self, url: &str, response: &CachedResponse) {
        if response.is_success() {
            self.put_in(&self.inner.current, url, response.clone()).await;
        }
    }

    /// Looks `url` up in the current cache only.
    pub async fn lookup(&self, url: &str) -> Option<CachedResponse> {
        let key = self.key(url);
        self.inner
            .caches
            .lock()
            .await
            .get(&self.inner.current)
            .and_then(|cache| cache.get(&key))
            .cloned()
    }

    /// Pre-caches the static shell. Any failed asset fails the install.
    pub async fn install(&self, assets: &[&str]) -> Result<(), FetchError> {
        for asset in assets {
            let response = self.inner.fetcher.fetch(&self.key(asset)).await?;
            self.put(asset, &response).await;
        }
        info!(cache = %self.inner.current, count = assets.len(), "Installed asset cache");
        Ok(())
    }

    /// Deletes every cache except the current version; returns what was removed.
    pub async fn activate(&self) -> Vec<String> {
        let mut caches = self.inner.caches.lock().await;
        let mut stale: Vec<String> = caches
            .keys()
            .filter(|name| **name != self.inner.current)
            .cloned()
            .collect();
        stale.sort();
        for name in &stale {
            caches.remove(name);
            info!(cache = %name, "Deleted stale asset cache");
        }
        stale
    }

    /// Answers `request`, or returns `None` to let it go straight to the network.
    pub async fn handle(
        &self,
        request: &AssetRequest,
    ) -> Option<Result<CachedResponse, FetchError>> {
        let strategy = strategy_for(request, &self.inner.origin)?;
        debug!(url = %request.url, ?strategy, "Asset request");
        Some(match strategy {
            Strategy::NetworkFirst => self.network_first(&request.url).await,
            Strategy::CacheFirst => self.cache_first(&request.url).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(&request.url).await,
        })
    }

    async fn network_first(&self, url: &str) -> Result<CachedResponse, FetchError> {
        match self.inner.fetcher.fetch(&self.key(url)).await {
            Ok(response) => {
                self.put(url, &response).await;
                Ok(response)
            }
            Err(err) => {
                warn!(url, "Network failed, serving cached page: {}", err);
                self.lookup(url).await.ok_or(err)
            }
        }
    }

    async fn cache_first(&self, url: &str) -> Result<CachedResponse, FetchError> {
        if let Some(hit) = self.lookup(url).await {
            return Ok(hit);
        }
        let response = self.inner.fetcher.fetch(&self.key(url)).await?;
        self.put(url, &response).await;
        Ok(response)
    }

    async fn stale_while_revalidate(&self, url: &str) -> Result<CachedResponse, FetchError> {
        if let Some(hit) = self.lookup(url).await {
            let this = self.clone();
            let url = url.to_string();
            let handle = tokio::spawn(async move {
                if let Err(err) = this.refresh(&url).await {
                    warn!(url = %url, "Background revalidation failed: {}", err);
                }
            });
            let mut pending = self.inner.revalidations.lock().await;
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
            return Ok(hit);
        }

        match self.refresh(url).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(url, "Fetch failed: {}", err);
                self.lookup(OFFLINE_PAGE).await.ok_or(err)
            }
        }
    }

    async fn refresh(&self, url: &str) -> Result<CachedResponse, FetchError> {
        let response = self.inner.fetcher.fetch(&self.key(url)).await?;
        self.put(url, &response).await;
        Ok(response)
    }

    /// Background revalidations still tracked (finished ones are dropped on
    /// the next cache hit).
    pub async fn pending_revalidations(&self) -> usize {
        self.inner.revalidations.lock().await.len()
    }

    /// Waits for background revalidations started so far.
    pub async fn settle(&self) {
        let handles: Vec<_> = self.inner.revalidations.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex as StdMutex, PoisonError};

    const ORIGIN: &str = "https://yoostream.app";

    /// Serves `body-N` for the Nth request to a URL; offline when told to be.
    #[derive(Default)]
    struct FakeNetwork {
        offline: StdMutex<bool>,
        hits: StdMutex<HashMap<String, usize>>,
    }

    impl FakeNetwork {
        fn set_offline(&self, offline: bool) {
            *self.offline.lock().unwrap_or_else(PoisonError::into_inner) = offline;
        }

        fn hits(&self, url: &str) -> usize {
            self.hits
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(url)
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for FakeNetwork {
        async fn fetch(&self, url: &str) -> Result<CachedResponse, FetchError> {
            if *self.offline.lock().unwrap_or_else(PoisonError::into_inner) {
                return Err(FetchError::Network("offline".to_string()));
            }
            let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
            let n = hits.entry(url.to_string()).or_insert(0);
            *n += 1;
            Ok(CachedResponse::ok("text/plain", format!("body-{n}")))
        }
    }

    fn setup() -> (AssetCache, Arc<FakeNetwork>) {
        let network = Arc::new(FakeNetwork::default());
        (AssetCache::new(ORIGIN, "v2", network.clone()), network)
    }

    #[test]
    fn strategy_selection() {
        assert_eq!(
            strategy_for(&AssetRequest::page("/movies"), ORIGIN),
            Some(Strategy::NetworkFirst)
        );
        assert_eq!(
            strategy_for(&AssetRequest::image("/posters/dune.jpg"), ORIGIN),
            Some(Strategy::CacheFirst)
        );
        assert_eq!(
            strategy_for(&AssetRequest::get(format!("{ORIGIN}/assets/app.js")), ORIGIN),
            Some(Strategy::StaleWhileRevalidate)
        );
        let mut post = AssetRequest::get("/api/users");
        post.method = Method::POST;
        assert_eq!(strategy_for(&post, ORIGIN), None);
        assert_eq!(
            strategy_for(&AssetRequest::image("https://cdn.example.com/a.jpg"), ORIGIN),
            None
        );
        assert_eq!(
            strategy_for(&AssetRequest::get("https://yoostream.app.evil.com/x"), ORIGIN),
            None
        );
    }

    #[tokio::test]
    async fn activation_keeps_only_current_version() {
        let (cache, _) = setup();
        cache
            .put_in(&cache_name("v1"), "/", CachedResponse::ok("text/html", "old"))
            .await;
        cache.install(STATIC_ASSETS).await.expect("install");

        let removed = cache.activate().await;
        assert_eq!(removed, vec![cache_name("v1")]);
        assert_eq!(cache.cache_names().await, vec![cache_name("v2")]);
    }

    #[tokio::test]
    async fn pages_prefer_network_and_fall_back_to_cache() {
        let (cache, network) = setup();
        let page = AssetRequest::page("/movies");
        let first = cache.handle(&page).await.expect("handled").expect("online");
        assert_eq!(first.body, b"body-1");

        network.set_offline(true);
        let offline = cache.handle(&page).await.expect("handled").expect("cached");
        assert_eq!(offline.body, b"body-1");

        let unseen = cache.handle(&AssetRequest::page("/tv-shows")).await.expect("handled");
        assert!(unseen.is_err());
    }

    #[tokio::test]
    async fn images_are_served_from_cache_once_seen() {
        let (cache, network) = setup();
        let image = AssetRequest::image("/posters/dune.jpg");
        cache.handle(&image).await.expect("handled").expect("fetch");
        let again = cache.handle(&image).await.expect("handled").expect("cached");
        assert_eq!(again.body, b"body-1");
        assert_eq!(network.hits(&format!("{ORIGIN}/posters/dune.jpg")), 1);
    }

    #[tokio::test]
    async fn stale_while_revalidate_serves_cached_then_refreshes() {
        let (cache, network) = setup();
        let script = AssetRequest::get("/assets/app.js");
        let url = format!("{ORIGIN}/assets/app.js");

        let first = cache.handle(&script).await.expect("handled").expect("fetch");
        assert_eq!(first.body, b"body-1");

        let second = cache.handle(&script).await.expect("handled").expect("cached");
        assert_eq!(second.body, b"body-1");
        cache.settle().await;
        assert_eq!(network.hits(&url), 2);
        assert_eq!(cache.lookup("/assets/app.js").await.map(|r| r.body), Some(b"body-2".to_vec()));
    }

    #[tokio::test]
    async fn finished_revalidations_are_not_kept() {
        let (cache, network) = setup();
        let script = AssetRequest::get("/app.js");
        cache.handle(&script).await.expect("handled").expect("fetch");

        for _ in 0..500 {
            cache.handle(&script).await.expect("handled").expect("cached");
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
        }
        assert!(cache.pending_revalidations().await < 10);

        cache.settle().await;
        assert_eq!(cache.pending_revalidations().await, 0);
        assert_eq!(network.hits(&format!("{ORIGIN}/app.js")), 501);
    }

    #[tokio::test]
    async fn offline_misses_fall_back_to_offline_page() {
        let (cache, network) = setup();
        cache.install(STATIC_ASSETS).await.expect("install");
        network.set_offline(true);

        let res = cache
            .handle(&AssetRequest::get("/assets/never-seen.css"))
            .await
            .expect("handled")
            .expect("offline page");
        assert_eq!(Some(res), cache.lookup(OFFLINE_PAGE).await);
    }
}
