//! Debounced search-as-you-type.
//!
//! Every query change restarts the debounce timer and bumps the generation
//! counter. A fetch is tagged with the generation current when it starts, and
//! its response is applied only if no newer query (or a clear) happened since.
//! A second timer keeps the loading skeleton up for a minimum dwell so fast
//! responses do not flicker; results show once both timers and the fetch are
//! done.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::MediaApi;
use crate::models::{Media, MediaKind};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_SKELETON_DWELL: Duration = Duration::from_millis(1800);
/// Shorter queries never reach the media API.
pub const MIN_QUERY_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    pub debounce: Duration,
    pub skeleton_dwell: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            skeleton_dwell: DEFAULT_SKELETON_DWELL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// Empty query.
    Idle,
    /// Debounce pending or skeleton still dwelling.
    Typing,
    /// Request in flight.
    Searching,
    Results,
    /// Query long enough, nothing matched.
    Empty,
    /// Settled on a single character; nothing was fetched.
    TooShort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    Movie,
    Series,
    Tv,
}

impl KindFilter {
    pub fn accepts(&self, media: &Media) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Movie => media.kind == MediaKind::Movie,
            KindFilter::Series => media.kind == MediaKind::Series,
            KindFilter::Tv => media.kind == MediaKind::Tv,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchSnapshot {
    pub query: String,
    pub results: Vec<Media>,
    pub is_typing: bool,
    pub is_loading: bool,
    pub show_skeleton: bool,
    /// A fetch for the current query has completed.
    pub searched: bool,
    pub generation: u64,
    pub filter: KindFilter,
    pub selected: Option<String>,
}

impl SearchSnapshot {
    pub fn phase(&self) -> SearchPhase {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            SearchPhase::Idle
        } else if self.is_loading {
            SearchPhase::Searching
        } else if self.is_typing || self.show_skeleton {
            SearchPhase::Typing
        } else if trimmed.chars().count() < MIN_QUERY_CHARS {
            SearchPhase::TooShort
        } else if !self.results.is_empty() {
            SearchPhase::Results
        } else if self.searched {
            SearchPhase::Empty
        } else {
            SearchPhase::Typing
        }
    }

    pub fn results_visible(&self) -> bool {
        self.phase() == SearchPhase::Results
    }

    pub fn filtered(&self) -> Vec<&Media> {
        self.results
            .iter()
            .filter(|m| self.filter.accepts(m))
            .collect()
    }
}

#[derive(Debug, Default)]
struct SearchState {
    view: SearchSnapshot,
    debounce: Option<JoinHandle<()>>,
    skeleton: Option<JoinHandle<()>>,
    skeleton_epoch: u64,
}

impl SearchState {
    fn cancel_debounce(&mut self) {
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
    }

    fn cancel_skeleton(&mut self) {
        if let Some(handle) = self.skeleton.take() {
            handle.abort();
        }
        self.skeleton_epoch += 1;
        self.view.show_skeleton = false;
    }
}

#[derive(Debug)]
struct Inner {
    api: Arc<MediaApi>,
    config: SearchConfig,
    state: Mutex<SearchState>,
}

#[derive(Debug, Clone)]
pub struct SearchController {
    inner: Arc<Inner>,
}

impl SearchController {
    pub fn new(api: Arc<MediaApi>, config: SearchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                config,
                state: Mutex::new(SearchState::default()),
            }),
        }
    }

    pub async fn snapshot(&self) -> SearchSnapshot {
        self.inner.state.lock().await.view.clone()
    }

    /// Feeds a new input value. Empty input resets everything before returning.
    pub async fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        let mut state = self.inner.state.lock().await;
        state.cancel_debounce();
        state.view.generation += 1;
        state.view.query = query;
        state.view.selected = None;
        state.view.searched = false;
        state.view.is_loading = false;

        let length = state.view.query.trim().chars().count();
        if length == 0 {
            state.cancel_skeleton();
            state.view.results.clear();
            state.view.is_typing = false;
            debug!("Search input cleared");
            return;
        }
        if length < MIN_QUERY_CHARS {
            state.view.results.clear();
        }

        state.view.is_typing = true;
        restart_skeleton(&self.inner, &mut state);

        let inner = self.inner.clone();
        let generation = state.view.generation;
        let debounce = self.inner.config.debounce;
        state.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            on_debounce(inner, generation).await;
        }));
    }

    pub async fn clear(&self) {
        self.set_query(String::new()).await;
    }

    /// Runs the search immediately, skipping the debounce (submit / Enter).
    pub async fn submit(&self) {
        let mut state = self.inner.state.lock().await;
        state.cancel_debounce();
        state.view.generation += 1;
        state.view.is_typing = false;
        let query = state.view.query.trim().to_string();
        if query.chars().count() < MIN_QUERY_CHARS {
            state.view.results.clear();
            return;
        }
        let generation = state.view.generation;
        begin_fetch(&self.inner, &mut state, query, generation);
    }

    pub async fn set_filter(&self, filter: KindFilter) {
        self.inner.state.lock().await.view.filter = filter;
    }

    /// Selects a result by id. Unknown ids leave the selection untouched.
    pub async fn select(&self, id: &str) -> Option<Media> {
        let mut state = self.inner.state.lock().await;
        let found = state.view.results.iter().find(|m| m.id == id).cloned();
        if found.is_some() {
            state.view.selected = Some(id.to_string());
        }
        found
    }

    pub async fn deselect(&self) {
        self.inner.state.lock().await.view.selected = None;
    }
}

fn restart_skeleton(inner: &Arc<Inner>, state: &mut SearchState) {
    state.cancel_skeleton();
    state.view.show_skeleton = true;
    let epoch = state.skeleton_epoch;
    let dwell = inner.config.skeleton_dwell;
    let inner = inner.clone();
    state.skeleton = Some(tokio::spawn(async move {
        tokio::time::sleep(dwell).await;
        let mut state = inner.state.lock().await;
        if state.skeleton_epoch == epoch {
            state.view.show_skeleton = false;
            state.skeleton = None;
        }
    }));
}

async fn on_debounce(inner: Arc<Inner>, generation: u64) {
    let mut state = inner.state.lock().await;
    if state.view.generation != generation {
        return;
    }
    state.debounce = None;
    state.view.is_typing = false;
    let query = state.view.query.trim().to_string();
    if query.chars().count() < MIN_QUERY_CHARS {
        state.view.results.clear();
        return;
    }
    begin_fetch(&inner, &mut state, query, generation);
}

fn begin_fetch(inner: &Arc<Inner>, state: &mut SearchState, query: String, generation: u64) {
    state.view.is_loading = true;
    restart_skeleton(inner, state);
    debug!(query = %query, generation, "Issuing search");

    let inner = inner.clone();
    tokio::spawn(async move {
        let outcome = inner.api.fetch_movies(&query).await;
        let mut state = inner.state.lock().await;
        if state.view.generation != generation {
            debug!(query = %query, generation, "Discarding stale search response");
            return;
        }
        state.view.is_loading = false;
        state.view.searched = true;
        match outcome {
            Ok(results) => state.view.results = results,
            Err(e) => {
                warn!(query = %query, "Search failed: {}", e);
                state.view.results.clear();
            }
        }
    });
}
