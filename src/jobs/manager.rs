// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Job manager: schedules one supervised worker per download.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::progress::parse_progress_line;
use crate::tool::{MuxSelection, YtDlp};
use super::store::JobStore;
use super::types::{generate_job_id, Job, JobTicket, MuxRequest};

/// Where jobs write their output and how long to wait for it to show up.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub download_dir: PathBuf,
    /// Checks for the output file after the tool exits cleanly.
    pub output_poll_attempts: u32,
    pub output_poll_interval: Duration,
}

impl JobSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            download_dir: config.download_dir.clone(),
            output_poll_attempts: config.output_poll_attempts,
            output_poll_interval: config.output_poll_interval(),
        }
    }
}

/// Creates jobs and tracks them in a [`JobStore`].
///
/// Cloning is cheap; clones share the same store.
#[derive(Debug, Clone)]
pub struct JobManager {
    store: Arc<JobStore>,
    tool: Arc<YtDlp>,
    settings: Arc<JobSettings>,
}

impl JobManager {
    pub fn new(store: Arc<JobStore>, tool: YtDlp, settings: JobSettings) -> Self {
        Self {
            store,
            tool: Arc::new(tool),
            settings: Arc::new(settings),
        }
    }

    /// Register a job and start its worker. Returns without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_job(&self, request: MuxRequest) -> JobTicket {
        let filename = request.output_filename();
        let job_id = loop {
            let candidate = generate_job_id();
            if self.store.insert(Job::new(candidate.clone(), filename.clone())) {
                break candidate;
            }
        };
        self.store.mark_running(&job_id);

        tracing::info!(
            job_id = %job_id,
            url = %request.url,
            format = %format!("{}+{}", request.video_format_id, request.audio_format_id),
            filename = %filename,
            "Job created"
        );

        tokio::spawn(supervise(
            Arc::clone(&self.store),
            Arc::clone(&self.tool),
            Arc::clone(&self.settings),
            job_id.clone(),
            request,
        ));

        JobTicket { job_id, filename }
    }

    /// Current progress, or 0 for unknown ids.
    pub fn progress(&self, job_id: &str) -> i32 {
        self.store.progress(job_id)
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.store.get(job_id)
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn download_dir(&self) -> &Path {
        &self.settings.download_dir
    }

    /// Poll until the job is finished or `timeout` elapses.
    ///
    /// Returns the last snapshot seen, or `None` for unknown ids.
    pub async fn wait_for_terminal(
        &self,
        job_id: &str,
        poll: Duration,
        timeout: Duration,
    ) -> Option<Job> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.store.get(job_id)?;
            if job.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Some(job);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Run the worker in its own task and record how it ended, panics included.
async fn supervise(
    store: Arc<JobStore>,
    tool: Arc<YtDlp>,
    settings: Arc<JobSettings>,
    job_id: String,
    request: MuxRequest,
) {
    let worker = tokio::spawn(run_job(Arc::clone(&store), tool, settings, job_id.clone(), request));

    match worker.await {
        Ok(Ok(path)) => {
            tracing::info!(job_id = %job_id, path = %path.display(), "Job succeeded");
            store.mark_succeeded(&job_id);
        }
        Ok(Err(e)) => {
            tracing::warn!(job_id = %job_id, error = %format!("{:#}", e), "Job failed");
            store.mark_failed(&job_id, format!("{:#}", e));
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Job worker crashed");
            store.mark_failed(&job_id, format!("worker crashed: {}", e));
        }
    }
}

async fn run_job(
    store: Arc<JobStore>,
    tool: Arc<YtDlp>,
    settings: Arc<JobSettings>,
    job_id: String,
    request: MuxRequest,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(&settings.download_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create download directory: {}",
                settings.download_dir.display()
            )
        })?;

    let output_stem = settings.download_dir.join(request.output_stem());
    let output_path = settings.download_dir.join(request.output_filename());
    let selection = MuxSelection {
        url: &request.url,
        video_format_id: &request.video_format_id,
        audio_format_id: &request.audio_format_id,
    };

    tool.download(&selection, &output_stem, |line| {
        if let Some(percent) = parse_progress_line(line) {
            tracing::debug!(job_id = %job_id, percent, "Progress");
            store.record_progress(&job_id, percent);
        }
    })
    .await?;

    let found = wait_for_output(
        &output_path,
        settings.output_poll_attempts,
        settings.output_poll_interval,
    )
    .await;
    if !found {
        bail!("Output file not found after download: {}", output_path.display());
    }
    Ok(output_path)
}

/// Check for `path` up to `attempts` times, sleeping `interval` in between.
async fn wait_for_output(path: &Path, attempts: u32, interval: Duration) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return true;
        }
        if attempt < attempts {
            tracing::debug!(path = %path.display(), attempt, "Output not visible yet");
            tokio::time::sleep(interval).await;
        }
    }
    false
}
