// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! streammux - stream selection and background muxing on top of yt-dlp
//!
//! A client submits a media URL, picks one video-only and one audio-only
//! stream, and gets back a job id to poll while the two are downloaded and
//! muxed into an mp4 off the request path:
//!
//! **Discover formats** -> **Start job** -> **Poll progress** -> **Fetch file**
//!
//! # Core Modules
//!
//! - [`catalog`] - Stream descriptors parsed from the tool's metadata, and candidate selection
//! - [`progress`] - Percentage scraping from the tool's output lines
//! - [`jobs`] - Job store and the manager that runs one supervised worker per job
//! - [`tool`] - yt-dlp subprocess adapter with timeouts
//! - [`server`] - HTTP API
//! - [`config`] - JSON configuration file
//! - [`errors`] - HTTP-facing error type with reference codes

pub mod catalog;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod progress;
pub mod server;
pub mod tool;

pub use catalog::{
    list_audio_candidates, offer_formats, select_best_audio, select_video_candidates,
    FormatOffer, LanguageTier, MediaCatalog, StreamDescriptor, StreamKind,
};
pub use config::Config;
pub use errors::{ApiResult, UserError};
pub use jobs::{Job, JobManager, JobState, JobStore, JobTicket, MuxRequest};
pub use progress::parse_progress_line;
pub use server::Server;
pub use tool::{ToolError, YtDlp};
