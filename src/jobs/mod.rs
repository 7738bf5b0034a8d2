// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background download-and-mux jobs.
//!
//! A job is created by the HTTP layer, runs off the request path, and is
//! observed by polling its progress:
//! - `-1` once the job failed
//! - `0..=99` while it runs, never decreasing
//! - `100` once the muxed file is on disk
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐ spawn ┌─────────────────┐ spawn ┌─────────────────┐
//! │ JobManager      │──────▶│ Supervisor      │──────▶│ Worker          │
//! │ (create_job)    │       │ (terminal state)│       │ (yt-dlp + poll) │
//! └────────┬────────┘       └────────┬────────┘       └────────┬────────┘
//!          │                         │                         │
//!          ▼                         ▼                         ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ JobStore (in-memory, one record per job id)                         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use streammux::config::Config;
//! use streammux::jobs::{JobManager, JobSettings, JobStore, MuxRequest};
//! use streammux::tool::YtDlp;
//!
//! # async fn example() {
//! let config = Config::default();
//! let manager = JobManager::new(
//!     Arc::new(JobStore::new()),
//!     YtDlp::from_config(&config.ytdlp),
//!     JobSettings::from_config(&config),
//! );
//!
//! let ticket = manager.create_job(MuxRequest {
//!     url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
//!     media_id: "dQw4w9WgXcQ".to_string(),
//!     video_format_id: "137".to_string(),
//!     audio_format_id: "140".to_string(),
//!     output_height: Some(1080),
//! });
//!
//! println!("progress: {}", manager.progress(&ticket.job_id));
//! let done = manager
//!     .wait_for_terminal(&ticket.job_id, Duration::from_millis(500), Duration::from_secs(600))
//!     .await;
//! # }
//! ```

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{JobManager, JobSettings};
pub use store::JobStore;
pub use types::{output_stem, Job, JobId, JobState, JobTicket, MuxRequest};
