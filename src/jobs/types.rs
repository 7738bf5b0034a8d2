// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Job types for background download-and-mux work.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::FALLBACK_MEDIA_ID;
use crate::tool::MERGE_CONTAINER;

/// Opaque job identifier, 32 lowercase hex characters.
pub type JobId = String;

/// Progress value stored for a failed job.
pub const FAILED_PROGRESS: i32 = -1;

/// Highest progress a running job can report. 100 is reserved for success.
pub const MAX_RUNNING_PROGRESS: i32 = 99;

/// Progress value stored for a finished job.
pub const COMPLETE_PROGRESS: i32 = 100;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, worker not started yet
    Pending,
    /// External tool is running
    Running,
    /// Output file is on disk
    Succeeded,
    /// Tool failed, timed out, or the output never appeared
    Failed,
}

impl JobState {
    /// Returns true once the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// One download-and-mux task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: JobId,
    pub state: JobState,
    /// -1 once failed, 0..=99 while running, 100 once succeeded.
    #[serde(rename = "progress")]
    pub progress_percent: i32,
    #[serde(rename = "filename")]
    pub output_filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Failure reason, set only in the Failed state.
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job.
    pub fn new(job_id: impl Into<String>, output_filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            state: JobState::Pending,
            progress_percent: 0,
            output_filename: output_filename.into(),
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Everything needed to start a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxRequest {
    pub url: String,
    pub media_id: String,
    pub video_format_id: String,
    pub audio_format_id: String,
    /// Height of the chosen video stream, when known.
    pub output_height: Option<u32>,
}

impl MuxRequest {
    /// File name without extension, e.g. `dQw4w9WgXcQ_1080p`.
    pub fn output_stem(&self) -> String {
        output_stem(&self.media_id, self.output_height)
    }

    /// File name the tool is expected to produce, e.g. `dQw4w9WgXcQ_1080p.mp4`.
    pub fn output_filename(&self) -> String {
        format!("{}.{}", self.output_stem(), MERGE_CONTAINER)
    }
}

/// Returned to the caller as soon as a job is scheduled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    pub job_id: JobId,
    pub filename: String,
}

/// Output stem for a media id and video height.
///
/// Separators and `..` in the media id are replaced so the name stays inside
/// the download directory and can be served back.
pub fn output_stem(media_id: &str, height: Option<u32>) -> String {
    let media_id = if media_id.trim().is_empty() {
        FALLBACK_MEDIA_ID.to_string()
    } else {
        media_id.replace(['/', '\\'], "_").replace("..", "_")
    };

    match height {
        Some(h) => format!("{}_{}p", media_id, h),
        None => format!("{}_{}", media_id, FALLBACK_MEDIA_ID),
    }
}

/// Generate a random 32-character hex job id.
pub fn generate_job_id() -> JobId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
