// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fake yt-dlp for integration tests.
//!
//! The fake is a POSIX shell script run as `sh <script> <args...>`. With
//! `--dump-json` it prints a fixture document; otherwise it behaves like a
//! muxed download according to [`Download`].

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use streammux::config::{Config, ToolConfig};

/// Video heights 360, 720 (a URL-less variant, then two valid ones) and 1080,
/// plus two m4a audio streams and one webm audio stream.
pub const CATALOG_JSON: &str = r#"{
  "id": "abc123",
  "formats": [
    {"format_id": "sb0", "vcodec": "none", "acodec": "none", "ext": "mhtml", "url": "https://cdn/sb0"},
    {"format_id": "139", "vcodec": "none", "acodec": "mp4a.40.5", "ext": "m4a", "abr": 48.8, "language": "pt", "url": "https://cdn/139"},
    {"format_id": "140", "vcodec": "none", "acodec": "mp4a.40.2", "ext": "m4a", "abr": 129.5, "language": "en", "format_note": "medium", "url": "https://cdn/140"},
    {"format_id": "251", "vcodec": "none", "acodec": "opus", "ext": "webm", "abr": 140.0, "url": "https://cdn/251"},
    {"format_id": "134", "vcodec": "avc1.4d401e", "acodec": "none", "ext": "mp4", "height": 360, "format_note": "360p", "url": "https://cdn/134"},
    {"format_id": "398", "vcodec": "avc1.4d401f", "acodec": "none", "ext": "mp4", "height": 720},
    {"format_id": "136", "vcodec": "avc1.4d401f", "acodec": "none", "ext": "mp4", "height": 720, "format_note": "720p", "url": "https://cdn/136"},
    {"format_id": "298", "vcodec": "avc1.4d4020", "acodec": "none", "ext": "mp4", "height": 720, "format_note": "720p60", "url": "https://cdn/298"},
    {"format_id": "247", "vcodec": "vp9", "acodec": "none", "ext": "webm", "height": 720, "url": "https://cdn/247"},
    {"format_id": "137", "vcodec": "avc1.640028", "acodec": "none", "ext": "mp4", "height": 1080, "url": "https://cdn/137"},
    {"format_id": "18", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "ext": "mp4", "height": 360, "url": "https://cdn/18"}
  ]
}"#;

/// Same video streams, but only webm audio.
pub const NO_M4A_JSON: &str = r#"{
  "id": "noaudio",
  "formats": [
    {"format_id": "251", "vcodec": "none", "acodec": "opus", "ext": "webm", "abr": 140.0, "url": "https://cdn/251"},
    {"format_id": "137", "vcodec": "avc1.640028", "acodec": "none", "ext": "mp4", "height": 1080, "url": "https://cdn/137"}
  ]
}"#;

pub enum Metadata {
    /// Print this JSON document.
    Document(&'static str),
    /// Exit 1 with an error on stderr.
    Fail,
    /// Never answer.
    Hang,
}

pub enum Download {
    /// Print progress on stdout and stderr, then create the output file.
    Succeed,
    /// Print some progress, then exit 1.
    Fail,
    /// Exit cleanly without creating the output file.
    NoOutput,
    /// Never finish.
    Hang,
}

pub struct FakeTool {
    _dir: TempDir,
    pub script: PathBuf,
    pub download_dir: PathBuf,
}

impl FakeTool {
    pub fn new(metadata: Metadata, download: Download) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let fixture = dir.path().join("metadata.json");
        let script = dir.path().join("yt-dlp.sh");
        let download_dir = dir.path().join("downloads");

        let metadata_branch = match metadata {
            Metadata::Document(json) => {
                fs::write(&fixture, json).expect("Failed to write fixture");
                format!("cat '{}'\n    exit 0", fixture.display())
            }
            Metadata::Fail => {
                "echo 'ERROR: [generic] Unsupported URL' >&2\n    exit 1".to_string()
            }
            Metadata::Hang => "exec sleep 30".to_string(),
        };

        let download_body = match download {
            Download::Succeed => {
                "echo '[download]   0.0% of 10.00MiB at Unknown B/s ETA Unknown'
echo '[download]  42.5% of 10.00MiB at 1.00MiB/s ETA 00:06'
echo '[download]  10.0% of 2.00MiB at 1.00MiB/s ETA 00:02' >&2
echo '[download] 100.0% of 10.00MiB in 00:00:10'
echo '[Merger] Merging formats'
target=$(printf '%s' \"$out\" | sed 's/%(ext)s/mp4/')
: > \"$target\"
exit 0"
            }
            Download::Fail => {
                "echo '[download]  12.0% of 10.00MiB'
echo 'ERROR: unable to download video data: HTTP Error 403: Forbidden' >&2
exit 1"
            }
            Download::NoOutput => {
                "echo '[download]  55.0% of 10.00MiB'
exit 0"
            }
            Download::Hang => "exec sleep 30",
        };

        let body = format!(
            r#"for arg in "$@"; do
  if [ "$arg" = "--dump-json" ]; then
    {metadata_branch}
  fi
done
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
{download_body}
"#
        );
        fs::write(&script, body).expect("Failed to write fake tool");

        Self {
            _dir: dir,
            script,
            download_dir,
        }
    }

    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            program: "sh".to_string(),
            leading_args: vec![self.script.display().to_string()],
            metadata_timeout_secs: 10,
            download_timeout_secs: 10,
        }
    }

    pub fn config(&self) -> Config {
        Config {
            download_dir: self.download_dir.clone(),
            ytdlp: self.tool_config(),
            output_poll_attempts: 3,
            output_poll_interval_ms: 20,
            ..Config::default()
        }
    }

    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.download_dir.join(filename)
    }
}

pub const POLL: Duration = Duration::from_millis(20);
pub const WAIT: Duration = Duration::from_secs(10);
