// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! yt-dlp integration.
//!
//! The external tool is only ever run as a subprocess:
//!
//! - metadata query: `--dump-json`, bounded by the metadata timeout
//! - muxed download: `-f <video>+<audio> --merge-output-format mp4 --newline`,
//!   with stdout and stderr merged into one line stream, bounded by the
//!   download timeout
//!
//! A child that outlives its timeout is killed.
//!
//! # Example
//!
//! ```no_run
//! use streammux::tool::YtDlp;
//! use streammux::config::ToolConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let tool = YtDlp::from_config(&ToolConfig::default());
//! let catalog = tool.fetch_catalog("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//! println!("{} streams", catalog.streams().len());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::catalog::MediaCatalog;
use crate::config::ToolConfig;

/// Output template placeholder the tool replaces with the final extension.
pub const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Container requested for every muxed download.
pub const MERGE_CONTAINER: &str = "mp4";

/// Keep at most this much stderr in error messages.
const STDERR_TAIL_CHARS: usize = 500;

/// Error types for external tool invocations.
#[derive(Debug)]
pub enum ToolError {
    /// The process could not be started (missing binary, permissions).
    Spawn(String),
    /// The process ran and exited unsuccessfully.
    Failed { code: Option<i32>, stderr: String },
    /// The process exceeded its time budget and was killed.
    Timeout(Duration),
    /// The metadata document could not be parsed.
    InvalidMetadata(String),
    /// Reading the process output failed.
    Io(std::io::Error),
}

impl ToolError {
    /// True when the tool itself rejected the source (bad URL, unavailable media).
    pub fn is_source_error(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::InvalidMetadata(_))
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "Failed to start yt-dlp: {}", msg),
            Self::Failed { code: Some(code), stderr } => {
                write!(f, "yt-dlp exited with status {}: {}", code, stderr)
            }
            Self::Failed { code: None, stderr } => {
                write!(f, "yt-dlp was terminated by a signal: {}", stderr)
            }
            Self::Timeout(limit) => write!(f, "yt-dlp timed out after {}s", limit.as_secs()),
            Self::InvalidMetadata(msg) => write!(f, "yt-dlp returned unreadable metadata: {}", msg),
            Self::Io(e) => write!(f, "I/O error while reading yt-dlp output: {}", e),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// The pair of streams to fetch and mux into one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxSelection<'a> {
    pub url: &'a str,
    pub video_format_id: &'a str,
    pub audio_format_id: &'a str,
}

impl MuxSelection<'_> {
    /// The tool's format expression for a combined request.
    pub fn format_expr(&self) -> String {
        format!("{}+{}", self.video_format_id, self.audio_format_id)
    }
}

/// Handle to the yt-dlp executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    leading_args: Vec<String>,
    metadata_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlp {
    /// Create a handle from configuration.
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            program: config.program.clone(),
            leading_args: config.leading_args.clone(),
            metadata_timeout: Duration::from_secs(config.metadata_timeout_secs),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
        }
    }

    /// Override the download timeout.
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Override the metadata timeout.
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Query the stream variants available for `url`.
    pub async fn fetch_catalog(&self, url: &str) -> Result<MediaCatalog, ToolError> {
        let mut cmd = self.command();
        cmd.args(["--dump-json", "--no-playlist", "--no-warnings", "--"])
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(program = %self.program, url = %url, "Querying stream metadata");

        let child = cmd.spawn().map_err(|e| ToolError::Spawn(e.to_string()))?;
        let output = tokio::time::timeout(self.metadata_timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout(self.metadata_timeout))??;

        if !output.status.success() {
            return Err(ToolError::Failed {
                code: output.status.code(),
                stderr: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        MediaCatalog::from_json(stdout.trim())
            .map_err(|e| ToolError::InvalidMetadata(e.to_string()))
    }

    /// Download both streams and mux them into `<output_stem>.mp4`.
    ///
    /// Every line the tool prints on stdout or stderr is handed to `on_line`
    /// as it arrives. Returns once the process exits cleanly.
    pub async fn download<F>(
        &self,
        selection: &MuxSelection<'_>,
        output_stem: &Path,
        mut on_line: F,
    ) -> Result<(), ToolError>
    where
        F: FnMut(&str),
    {
        let template = format!("{}.{}", output_stem.display(), EXT_PLACEHOLDER);

        let mut cmd = self.command();
        cmd.arg("-f")
            .arg(selection.format_expr())
            .args(["--merge-output-format", MERGE_CONTAINER, "--newline", "--no-playlist", "-o"])
            .arg(&template)
            .arg("--")
            .arg(selection.url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(
            program = %self.program,
            format = %selection.format_expr(),
            template = %template,
            "Starting muxed download"
        );

        let mut child = cmd.spawn().map_err(|e| ToolError::Spawn(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Spawn("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::Spawn("stderr was not captured".to_string()))?;

        let run = async {
            let mut lines = LinesStream::new(BufReader::new(stdout).lines())
                .merge(LinesStream::new(BufReader::new(stderr).lines()));
            let mut last_lines = Vec::new();

            while let Some(line) = lines.next().await {
                let line = line?;
                on_line(&line);
                if last_lines.len() == 5 {
                    last_lines.remove(0);
                }
                last_lines.push(line);
            }

            let status = child.wait().await?;
            if status.success() {
                Ok::<(), ToolError>(())
            } else {
                Err(ToolError::Failed {
                    code: status.code(),
                    stderr: stderr_tail(&last_lines.join("\n")),
                })
            }
        };

        // On timeout the child is killed when it goes out of scope.
        tokio::time::timeout(self.download_timeout, run)
            .await
            .map_err(|_| ToolError::Timeout(self.download_timeout))?
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}
