use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{Media, MediaKind, RawMedia};

const SEED_CATALOG: &str = include_str!("data/catalog.json");

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(String),
    #[error("Unexpected catalog payload: {0}")]
    Decode(String),
    #[error("Catalog unavailable")]
    Unavailable,
}

/// Where catalog collections come from. The in-memory seed and an HTTP
/// backend are interchangeable behind this trait.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn trending(&self) -> Result<Vec<Media>, FetchError>;
    async fn popular(&self) -> Result<Vec<Media>, FetchError>;
    async fn web_series(&self) -> Result<Vec<Media>, FetchError>;
    async fn tv_shows(&self) -> Result<Vec<Media>, FetchError>;
    /// Every record whose title, description, genres or tags contain `query`.
    async fn search(&self, query: &str) -> Result<Vec<Media>, FetchError>;
    async fn find(&self, id: &str) -> Result<Option<Media>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    records: Vec<RawMedia>,
    #[serde(default)]
    trending: Vec<String>,
    #[serde(default)]
    popular: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InMemoryCatalog {
    records: Vec<Media>,
    trending: Vec<String>,
    popular: Vec<String>,
}

impl InMemoryCatalog {
    pub fn seeded() -> Result<Self> {
        Self::from_json(SEED_CATALOG).context("Failed to load bundled catalog")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let seed: SeedFile = serde_json::from_str(raw).context("Invalid catalog JSON")?;
        let total = seed.records.len();
        let mut seen = HashSet::new();
        let records: Vec<Media> = seed
            .records
            .into_iter()
            .filter_map(RawMedia::into_media)
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        if records.len() != total {
            warn!(
                "Dropped {} catalog records without an id or with a duplicate id",
                total - records.len()
            );
        }
        info!("Catalog loaded with {} records", records.len());
        Ok(Self {
            records,
            trending: seed.trending,
            popular: seed.popular,
        })
    }

    pub fn from_records(records: Vec<Media>, trending: Vec<String>, popular: Vec<String>) -> Self {
        Self {
            records,
            trending,
            popular,
        }
    }

    pub fn records(&self) -> &[Media] {
        &self.records
    }

    fn pick(&self, ids: &[String]) -> Vec<Media> {
        let by_id: HashMap<&str, &Media> =
            self.records.iter().map(|m| (m.id.as_str(), m)).collect();
        ids.iter()
            .filter_map(|id| by_id.get(id.as_str()).map(|m| (*m).clone()))
            .collect()
    }

    fn of_kind(&self, kind: MediaKind) -> Vec<Media> {
        self.records
            .iter()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn trending(&self) -> Result<Vec<Media>, FetchError> {
        Ok(self.pick(&self.trending))
    }

    async fn popular(&self) -> Result<Vec<Media>, FetchError> {
        Ok(self.pick(&self.popular))
    }

    async fn web_series(&self) -> Result<Vec<Media>, FetchError> {
        Ok(self.of_kind(MediaKind::Series))
    }

    async fn tv_shows(&self) -> Result<Vec<Media>, FetchError> {
        Ok(self.of_kind(MediaKind::Tv))
    }

    async fn search(&self, query: &str) -> Result<Vec<Media>, FetchError> {
        if query.is_empty() {
            return Ok(self.records.clone());
        }
        Ok(self
            .records
            .iter()
            .filter(|m| m.matches(query))
            .cloned()
            .collect())
    }

    async fn find(&self, id: &str) -> Result<Option<Media>, FetchError> {
        Ok(self.records.iter().find(|m| m.id == id).cloned())
    }
}
