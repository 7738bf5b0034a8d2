// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stream catalog for one media URL.
//!
//! Turns the metadata document emitted by the external tool (`--dump-json`)
//! into typed [`StreamDescriptor`]s. Only video-only and audio-only variants
//! are kept; muxed variants are of no use when the video and audio streams
//! are chosen separately.
//!
//! # Example
//!
//! ```
//! use streammux::catalog::{MediaCatalog, StreamKind};
//!
//! let json = r#"{"id":"abc","formats":[
//!     {"format_id":"137","vcodec":"avc1.640028","acodec":"none","ext":"mp4","height":1080,"url":"https://x"}
//! ]}"#;
//! let catalog = MediaCatalog::from_json(json).unwrap();
//! assert_eq!(catalog.media_id(), "abc");
//! assert_eq!(catalog.streams()[0].kind, StreamKind::VideoOnly);
//! ```

pub mod selector;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use selector::{
    list_audio_candidates, offer_formats, select_best_audio, select_video_candidates,
    AudioCandidate, FormatOffer, LanguageTier, VideoCandidate, MIN_VIDEO_HEIGHT,
    PREFERRED_AUDIO_CODEC,
};

/// Media id used when the metadata document carries none.
pub const FALLBACK_MEDIA_ID: &str = "video";

/// Codec marker the tool uses for "this stream has no such track".
const NO_CODEC: &str = "none";

/// Which track a stream variant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Video track only, needs a separate audio stream.
    VideoOnly,
    /// Audio track only.
    AudioOnly,
}

/// One independently addressable encoding of a media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    /// Opaque id understood by the external tool, unique within a catalog.
    pub format_id: String,
    pub kind: StreamKind,
    /// Container extension (`mp4`, `m4a`, `webm`...).
    pub container: String,
    /// Full video codec string, e.g. `avc1.640028`.
    pub video_codec_family: Option<String>,
    /// Full audio codec string, e.g. `mp4a.40.2`.
    pub audio_codec_tag: Option<String>,
    pub height: Option<u32>,
    pub bitrate_kbps: Option<f64>,
    /// Language tag; empty tags are normalized to `None`.
    pub language: Option<String>,
    /// Display label such as `1080p60` or `medium`.
    pub note: Option<String>,
    pub file_size_bytes: Option<u64>,
    /// Variants without a direct URL cannot be fetched and never get selected.
    pub has_direct_url: bool,
}

impl StreamDescriptor {
    /// Returns true for audio-only m4a variants with a direct URL.
    pub fn is_usable_m4a_audio(&self) -> bool {
        self.kind == StreamKind::AudioOnly && self.container == "m4a" && self.has_direct_url
    }
}

/// Immutable list of stream variants for one media item.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCatalog {
    media_id: String,
    streams: Vec<StreamDescriptor>,
}

impl MediaCatalog {
    /// Build a catalog from already-normalized descriptors.
    ///
    /// Later descriptors reusing a `format_id` are dropped so ids stay unique.
    pub fn new(media_id: impl Into<String>, streams: Vec<StreamDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let streams = streams
            .into_iter()
            .filter(|s| {
                let fresh = seen.insert(s.format_id.clone());
                if !fresh {
                    tracing::warn!(format_id = %s.format_id, "Duplicate format id in metadata, keeping the first");
                }
                fresh
            })
            .collect();

        Self {
            media_id: media_id.into(),
            streams,
        }
    }

    /// Parse the tool's JSON metadata document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let raw: RawMediaInfo = serde_json::from_str(json)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawMediaInfo) -> Self {
        let media_id = raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_MEDIA_ID.to_string());

        let streams = raw.formats.into_iter().filter_map(RawFormat::normalize).collect();
        Self::new(media_id, streams)
    }

    /// Identifier used for output naming.
    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    /// Descriptors in the order the metadata source listed them.
    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    /// Look up a descriptor by format id.
    pub fn find(&self, format_id: &str) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.format_id == format_id)
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

// =============================================================================
// Raw metadata document
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawMediaInfo {
    id: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    ext: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
    language: Option<String>,
    format_note: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    url: Option<String>,
}

impl RawFormat {
    fn normalize(self) -> Option<StreamDescriptor> {
        let format_id = self.format_id.filter(|id| !id.is_empty())?;

        let has_video = self.vcodec.as_deref() != Some(NO_CODEC);
        let has_audio = self.acodec.as_deref() != Some(NO_CODEC);
        let video_marked_none = self.vcodec.as_deref() == Some(NO_CODEC);
        let audio_marked_none = self.acodec.as_deref() == Some(NO_CODEC);

        let kind = if has_video && audio_marked_none {
            StreamKind::VideoOnly
        } else if has_audio && video_marked_none {
            StreamKind::AudioOnly
        } else {
            return None;
        };

        let (video_codec_family, audio_codec_tag) = match kind {
            StreamKind::VideoOnly => (self.vcodec, None),
            StreamKind::AudioOnly => (None, self.acodec),
        };

        Some(StreamDescriptor {
            format_id,
            kind,
            container: self.ext.unwrap_or_default(),
            video_codec_family,
            audio_codec_tag,
            height: match kind {
                StreamKind::VideoOnly => self.height,
                StreamKind::AudioOnly => None,
            },
            bitrate_kbps: match kind {
                StreamKind::AudioOnly => self.abr,
                StreamKind::VideoOnly => None,
            },
            language: non_empty(self.language),
            note: non_empty(self.format_note),
            file_size_bytes: self.filesize.or(self.filesize_approx),
            has_direct_url: self.url.is_some_and(|u| !u.trim().is_empty()),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
