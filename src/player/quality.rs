use serde::{Deserialize, Serialize};

use crate::models::Media;

pub const DEFAULT_TITLE: &str = "Video Player";
pub const DEFAULT_VIDEO_URL: &str =
    "https://vgorigin.hakunaymatata.com/cms/87233869f345c5c4a879e2201acf2853.mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoQuality {
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "auto")]
    Auto,
}

impl VideoQuality {
    pub const ALL: [VideoQuality; 5] = [
        VideoQuality::P1080,
        VideoQuality::P720,
        VideoQuality::P480,
        VideoQuality::P360,
        VideoQuality::Auto,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            VideoQuality::P1080 => "1080p",
            VideoQuality::P720 => "720p",
            VideoQuality::P480 => "480p",
            VideoQuality::P360 => "360p",
            VideoQuality::Auto => "auto",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|q| q.label().eq_ignore_ascii_case(label.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSource {
    pub quality: VideoQuality,
    pub url: String,
}

/// What the player route receives through navigation state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackRequest {
    pub video_url: Option<String>,
    pub title: Option<String>,
}

impl PlaybackRequest {
    pub fn for_media(media: &Media) -> Self {
        Self {
            video_url: media.video_url.clone(),
            title: Some(media.title.clone()),
        }
    }

    pub fn title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE)
    }

    pub fn url(&self) -> &str {
        self.video_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_VIDEO_URL)
    }

    /// One source per quality. Every rendition currently points at the same
    /// upload; a CDN with real renditions would fill these in separately.
    pub fn sources(&self) -> Vec<VideoSource> {
        VideoQuality::ALL
            .into_iter()
            .map(|quality| VideoSource {
                quality,
                url: self.url().to_string(),
            })
            .collect()
    }
}

/// URL for `quality`, falling back to `default_url` when no source has it.
pub fn source_url<'a>(sources: &'a [VideoSource], quality: VideoQuality, default_url: &'a str) -> &'a str {
    sources
        .iter()
        .find(|s| s.quality == quality)
        .map(|s| s.url.as_str())
        .unwrap_or(default_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req = PlaybackRequest::default();
        assert_eq!(req.title(), DEFAULT_TITLE);
        assert_eq!(req.url(), DEFAULT_VIDEO_URL);
        assert_eq!(req.sources().len(), 5);
    }

    #[test]
    fn quality_labels_round_trip_through_parse() {
        assert_eq!(VideoQuality::parse("720P"), Some(VideoQuality::P720));
        assert_eq!(VideoQuality::parse("4k"), None);
        assert_eq!(
            serde_json::to_string(&VideoQuality::P1080).expect("serialize"),
            "\"1080p\""
        );
    }

    #[test]
    fn source_url_falls_back() {
        let sources = vec![VideoSource {
            quality: VideoQuality::P720,
            url: "https://cdn/720.mp4".to_string(),
        }];
        assert_eq!(
            source_url(&sources, VideoQuality::P720, "https://default"),
            "https://cdn/720.mp4"
        );
        assert_eq!(
            source_url(&sources, VideoQuality::P360, "https://default"),
            "https://default"
        );
    }
}
