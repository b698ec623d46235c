//! Canonical media record and the adapter from the catalog wire shape.
//!
//! Catalog records arrive with both a legacy and a newer field set
//! (`Title`/`title`, `Poster`/`image`, `imdbID`/`_id`, ...). Everything past
//! [`RawMedia::into_media`] works with [`Media`] only.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
    Tv,
}

impl MediaKind {
    /// Unknown labels fall back to `Movie`.
    pub fn parse(label: &str) -> Self {
        let lower = label.trim().to_lowercase();
        if lower.contains("series") {
            MediaKind::Series
        } else if lower == "tv" || lower.contains("tv show") || lower.contains("tv-show") {
            MediaKind::Tv
        } else {
            MediaKind::Movie
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: String,
    pub title: String,
    pub description: String,
    pub poster: Option<String>,
    pub video_url: Option<String>,
    pub release_date: Option<String>,
    pub year: Option<String>,
    pub genres: Vec<String>,
    pub runtime: Option<String>,
    pub kind: MediaKind,
    pub tags: Vec<String>,
    pub like_count: u32,
    pub cast: Vec<String>,
    pub country: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Media {
    /// Case-insensitive match over title, description, genres and tags.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.genres.iter().any(|g| g.to_lowercase().contains(&needle))
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

/// Catalog record as delivered by the data source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMedia {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    #[serde(rename = "imdbID")]
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "Title")]
    pub legacy_title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(rename = "Poster")]
    pub legacy_poster: Option<String>,
    pub video_url: Option<String>,
    #[serde(rename = "videoUrl")]
    pub legacy_video_url: Option<String>,
    pub release_date: Option<String>,
    #[serde(rename = "Year")]
    pub legacy_year: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(rename = "Genre")]
    pub legacy_genre: Option<String>,
    pub runtime: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "Type")]
    pub legacy_kind: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub cast: Vec<String>,
    pub country: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RawMedia {
    /// Collapses the dual field set. Returns `None` for records with no id at all.
    pub fn into_media(self) -> Option<Media> {
        let id = non_empty(self.imdb_id).or_else(|| non_empty(self.id))?;
        let title = non_empty(self.title)
            .or_else(|| non_empty(self.legacy_title))
            .unwrap_or_default();
        let release_date = non_empty(self.release_date);
        let year = non_empty(self.legacy_year).or_else(|| {
            release_date
                .as_deref()
                .and_then(|d| d.split('-').next())
                .filter(|y| y.len() == 4)
                .map(str::to_string)
        });
        let genres = if self.genre.is_empty() {
            self.legacy_genre
                .map(|g| {
                    g.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        } else {
            self.genre
        };
        let kind = self
            .kind
            .or(self.legacy_kind)
            .map(|k| MediaKind::parse(&k))
            .unwrap_or(MediaKind::Movie);

        Some(Media {
            id,
            title,
            description: self.description.unwrap_or_default(),
            poster: non_empty(self.image).or_else(|| non_empty(self.legacy_poster)),
            video_url: non_empty(self.video_url).or_else(|| non_empty(self.legacy_video_url)),
            release_date,
            year,
            genres,
            runtime: non_empty(self.runtime),
            kind,
            tags: self.tags,
            like_count: self.like_count,
            cast: self.cast,
            country: non_empty(self.country),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
