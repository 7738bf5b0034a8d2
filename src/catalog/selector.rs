// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stream selection over a [`MediaCatalog`].
//!
//! All functions here are pure and keep the catalog's iteration order; nothing
//! is re-sorted by resolution or format id.

use serde::Serialize;
use std::collections::HashSet;

use super::{MediaCatalog, StreamDescriptor, StreamKind};

/// Smallest video height offered to clients.
pub const MIN_VIDEO_HEIGHT: u32 = 360;

/// AAC-LC, the audio codec every mp4 player handles.
pub const PREFERRED_AUDIO_CODEC: &str = "mp4a.40.2";

/// A selectable video stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCandidate {
    pub format_id: String,
    pub resolution_label: String,
    /// Not part of the wire format; kept for naming the output.
    #[serde(skip)]
    pub height: u32,
}

/// A selectable audio stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioCandidate {
    pub format_id: String,
    pub bitrate_kbps: Option<f64>,
    /// Empty string when the stream is untagged.
    pub language: String,
    pub note: Option<String>,
    pub file_size_bytes: Option<u64>,
}

impl From<&StreamDescriptor> for AudioCandidate {
    fn from(stream: &StreamDescriptor) -> Self {
        Self {
            format_id: stream.format_id.clone(),
            bitrate_kbps: stream.bitrate_kbps,
            language: stream.language.clone().unwrap_or_default(),
            note: stream.note.clone(),
            file_size_bytes: stream.file_size_bytes,
        }
    }
}

/// One entry of an audio language priority list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LanguageTier {
    /// Matches streams whose language tag equals this one (ASCII case-insensitive).
    Tag(String),
    /// Matches streams without a language tag.
    Untagged,
}

impl LanguageTier {
    /// Parse a config entry; an empty string (or `untagged`) is the untagged tier.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("untagged") {
            Self::Untagged
        } else {
            Self::Tag(value.to_string())
        }
    }

    /// Parse a whole priority list.
    pub fn parse_list<S: AsRef<str>>(values: &[S]) -> Vec<Self> {
        values.iter().map(|v| Self::parse(v.as_ref())).collect()
    }

    fn matches(&self, language: Option<&str>) -> bool {
        match (self, language) {
            (Self::Untagged, None) => true,
            (Self::Tag(tag), Some(lang)) => tag.eq_ignore_ascii_case(lang),
            _ => false,
        }
    }
}

/// Video streams a client may pick, at most one per distinct height.
///
/// A stream qualifies when it is video-only, avc1-encoded, in an mp4 container,
/// at least [`MIN_VIDEO_HEIGHT`] tall and directly fetchable. For repeated
/// heights the first qualifying stream in catalog order wins.
pub fn select_video_candidates(catalog: &MediaCatalog) -> Vec<VideoCandidate> {
    let mut seen_heights = HashSet::new();

    catalog
        .streams()
        .iter()
        .filter_map(|stream| qualifying_height(stream).map(|h| (stream, h)))
        .filter(|(_, height)| seen_heights.insert(*height))
        .map(|(stream, height)| VideoCandidate {
            format_id: stream.format_id.clone(),
            resolution_label: stream
                .note
                .clone()
                .unwrap_or_else(|| format!("{}p", height)),
            height,
        })
        .collect()
}

fn qualifying_height(stream: &StreamDescriptor) -> Option<u32> {
    let avc1 = stream
        .video_codec_family
        .as_deref()
        .is_some_and(|codec| codec.starts_with("avc1"));

    if stream.kind != StreamKind::VideoOnly
        || !avc1
        || stream.container != "mp4"
        || !stream.has_direct_url
    {
        return None;
    }

    stream.height.filter(|h| *h >= MIN_VIDEO_HEIGHT)
}

/// Every directly fetchable audio-only m4a stream, in catalog order.
pub fn list_audio_candidates(catalog: &MediaCatalog) -> Vec<AudioCandidate> {
    catalog
        .streams()
        .iter()
        .filter(|s| s.is_usable_m4a_audio())
        .map(AudioCandidate::from)
        .collect()
}

/// Pick the single best audio stream for muxing.
///
/// Tiers are tried in `priority` order and the highest bitrate inside the
/// first matching tier wins (ties keep the earlier stream). The tiered scan
/// first runs restricted to [`PREFERRED_AUDIO_CODEC`], then over any m4a
/// audio. When no tier matches at all, the highest-bitrate m4a stream of any
/// language is taken, so `None` means the catalog has no usable m4a audio.
pub fn select_best_audio<'a>(
    catalog: &'a MediaCatalog,
    priority: &[LanguageTier],
) -> Option<&'a StreamDescriptor> {
    let usable: Vec<&StreamDescriptor> = catalog
        .streams()
        .iter()
        .filter(|s| s.is_usable_m4a_audio())
        .collect();

    if usable.is_empty() {
        return None;
    }

    let preferred_codec: Vec<&StreamDescriptor> = usable
        .iter()
        .copied()
        .filter(|s| s.audio_codec_tag.as_deref() == Some(PREFERRED_AUDIO_CODEC))
        .collect();

    best_by_tier(&preferred_codec, priority)
        .or_else(|| best_by_tier(&usable, priority))
        .or_else(|| highest_bitrate(usable.iter().copied()))
}

fn best_by_tier<'a>(
    streams: &[&'a StreamDescriptor],
    priority: &[LanguageTier],
) -> Option<&'a StreamDescriptor> {
    priority.iter().find_map(|tier| {
        highest_bitrate(
            streams
                .iter()
                .copied()
                .filter(|s| tier.matches(s.language.as_deref())),
        )
    })
}

fn highest_bitrate<'a>(
    streams: impl Iterator<Item = &'a StreamDescriptor>,
) -> Option<&'a StreamDescriptor> {
    streams.fold(None::<&'a StreamDescriptor>, |best, candidate| match best {
        Some(current) if bitrate(candidate) <= bitrate(current) => Some(current),
        _ => Some(candidate),
    })
}

fn bitrate(stream: &StreamDescriptor) -> f64 {
    stream.bitrate_kbps.filter(|b| b.is_finite()).unwrap_or(0.0)
}

/// What a client is offered for one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOffer {
    pub formats: Vec<VideoCandidate>,
    /// The stream [`select_best_audio`] picked.
    pub audio_format: AudioCandidate,
    pub audio_formats: Vec<AudioCandidate>,
    pub media_id: String,
}

/// Build the full offer, or `None` when there is no video candidate or no
/// usable audio stream.
pub fn offer_formats(catalog: &MediaCatalog, priority: &[LanguageTier]) -> Option<FormatOffer> {
    let formats = select_video_candidates(catalog);
    if formats.is_empty() {
        return None;
    }
    let best_audio = select_best_audio(catalog, priority)?;

    Some(FormatOffer {
        formats,
        audio_format: AudioCandidate::from(best_audio),
        audio_formats: list_audio_candidates(catalog),
        media_id: catalog.media_id().to_string(),
    })
}
