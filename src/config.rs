// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration file handling.
//!
//! The config lives in `~/.streammux/config.json` unless a path is given.
//! Every field has a default, so a partial file (or none at all) is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::LanguageTier;

pub const DEFAULT_PORT: u16 = 5000;

/// yt-dlp invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfig {
    /// Executable to run.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before any generated ones, e.g. `["-m", "yt_dlp"]`
    /// when `program` is a Python interpreter.
    #[serde(default)]
    pub leading_args: Vec<String>,
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            leading_args: Vec::new(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address to bind to (defaults to 127.0.0.1).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Where muxed files are written and served from.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default)]
    pub ytdlp: ToolConfig,
    /// Audio language tiers, best first. An empty entry is the untagged tier.
    #[serde(default = "default_audio_language_priority")]
    pub audio_language_priority: Vec<String>,
    /// How often to look for the output file after a clean exit.
    #[serde(default = "default_output_poll_attempts")]
    pub output_poll_attempts: u32,
    #[serde(default = "default_output_poll_interval_ms")]
    pub output_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            download_dir: default_download_dir(),
            ytdlp: ToolConfig::default(),
            audio_language_priority: default_audio_language_priority(),
            output_poll_attempts: default_output_poll_attempts(),
            output_poll_interval_ms: default_output_poll_interval_ms(),
        }
    }
}

impl Config {
    pub fn language_priority(&self) -> Vec<LanguageTier> {
        LanguageTier::parse_list(&self.audio_language_priority)
    }

    pub fn output_poll_interval(&self) -> Duration {
        Duration::from_millis(self.output_poll_interval_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.ytdlp.metadata_timeout_secs)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_program() -> String {
    "yt-dlp".to_string()
}

fn default_metadata_timeout_secs() -> u64 {
    120
}

fn default_download_timeout_secs() -> u64 {
    600
}

fn default_audio_language_priority() -> Vec<String> {
    vec!["pt".to_string(), "en".to_string(), "original".to_string(), String::new()]
}

fn default_output_poll_attempts() -> u32 {
    10
}

fn default_output_poll_interval_ms() -> u64 {
    500
}

/// Default config file location.
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".streammux").join("config.json"))
}

/// Load the config from `path`, or from the default location.
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Write `config` to `path` (or the default location), creating parent directories.
pub fn save_config(config: &Config, path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(config)?;
    fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(path)
}
