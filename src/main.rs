// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use streammux::catalog::offer_formats;
use streammux::config::{load_config, save_config, default_config_path, Config};
use streammux::jobs::{JobManager, JobSettings, JobState, JobStore, MuxRequest};
use streammux::server::Server;
use streammux::tool::YtDlp;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often `fetch` samples job progress.
const FETCH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// streammux - pick separate video and audio streams, mux them in the background.
#[derive(Parser)]
#[command(name = "streammux")]
#[command(version = VERSION)]
#[command(about = "Pick separate video and audio streams, mux them in the background.")]
#[command(long_about = "streammux - yt-dlp muxing service\n\n\
    Start the server:    streammux (or: streammux serve)\n\
    List formats:        streammux formats <URL>\n\
    Download once:       streammux fetch <URL> --video 137 --audio 140\n\
    Configure:           streammux config show")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ~/.streammux/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose mode: debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    ///
    /// Example:
    ///   streammux serve --port 8080 --download-dir /srv/media
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind to
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },

    /// List the video candidates and audio streams for a URL
    ///
    /// Example:
    ///   streammux formats https://www.youtube.com/watch?v=dQw4w9WgXcQ
    Formats {
        url: String,
        /// Print the raw JSON offer instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Download and mux one pair of streams, showing progress
    ///
    /// Example:
    ///   streammux fetch https://www.youtube.com/watch?v=dQw4w9WgXcQ --video 137 --audio 140
    Fetch {
        url: String,
        /// Video format id (see `formats`)
        #[arg(long)]
        video: String,
        /// Audio format id; defaults to the best audio stream
        #[arg(long)]
        audio: Option<String>,
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a config file with the default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "streammux=debug,tower_http=debug"
    } else {
        "streammux=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve {
        port: None,
        bind: None,
        download_dir: None,
    }) {
        Commands::Config { command } => run_config_command(command, &config, cli.config),
        Commands::Serve { port, bind, download_dir } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            if let Some(dir) = download_dir {
                config.download_dir = dir;
            }
            runtime()?.block_on(Server::new(config).start())
        }
        Commands::Formats { url, json } => runtime()?.block_on(show_formats(&config, &url, json)),
        Commands::Fetch { url, video, audio, download_dir } => {
            if let Some(dir) = download_dir {
                config.download_dir = dir;
            }
            runtime()?.block_on(fetch(&config, &url, &video, audio.as_deref()))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")
}

fn run_config_command(
    command: ConfigCommands,
    config: &Config,
    path: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let shown = match &path {
                Some(p) => p.clone(),
                None => default_config_path()?,
            };
            println!("{} {}", "Config file:".bold(), shown.display());
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommands::Init { force } => {
            let target = match &path {
                Some(p) => p.clone(),
                None => default_config_path()?,
            };
            if target.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", target.display());
            }
            let written = save_config(&Config::default(), Some(&target))?;
            println!("{} Wrote {}", "[OK]".green(), written.display());
        }
    }
    Ok(())
}

async fn show_formats(config: &Config, url: &str, json: bool) -> Result<()> {
    let tool = YtDlp::from_config(&config.ytdlp);
    let catalog = tool.fetch_catalog(url).await?;
    let Some(offer) = offer_formats(&catalog, &config.language_priority()) else {
        bail!("No suitable video/audio formats found for {}", url);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&offer)?);
        return Ok(());
    }

    println!("{} {}", "Media:".bold(), offer.media_id.cyan());
    println!();
    println!("{}", "Video".bold());
    for video in &offer.formats {
        println!("  {:>8}  {}", video.format_id.yellow(), video.resolution_label);
    }

    println!();
    println!("{}", "Audio".bold());
    for audio in &offer.audio_formats {
        let marker = if audio.format_id == offer.audio_format.format_id {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        let bitrate = audio
            .bitrate_kbps
            .map(|b| format!("{:.0}k", b))
            .unwrap_or_else(|| "?".to_string());
        let language = if audio.language.is_empty() { "-" } else { audio.language.as_str() };
        println!(
            "{} {:>8}  {:>6}  {:<8} {}",
            marker,
            audio.format_id.yellow(),
            bitrate,
            language,
            audio.note.as_deref().unwrap_or("").dimmed()
        );
    }
    println!();
    println!("{} marks the stream picked by default", "*".green());
    Ok(())
}

async fn fetch(config: &Config, url: &str, video: &str, audio: Option<&str>) -> Result<()> {
    let tool = YtDlp::from_config(&config.ytdlp);
    let catalog = tool.fetch_catalog(url).await?;

    let audio_format_id = match audio {
        Some(id) => id.to_string(),
        None => streammux::catalog::select_best_audio(&catalog, &config.language_priority())
            .map(|s| s.format_id.clone())
            .context("No m4a audio stream available; pass --audio explicitly")?,
    };

    let manager =
        JobManager::new(Arc::new(JobStore::new()), tool, JobSettings::from_config(config));
    let ticket = manager.create_job(MuxRequest {
        url: url.to_string(),
        media_id: catalog.media_id().to_string(),
        video_format_id: video.to_string(),
        audio_format_id,
        output_height: catalog.find(video).and_then(|s| s.height),
    });

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% | {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█▓░"),
    );
    pb.set_message(ticket.filename.clone());
    pb.enable_steady_tick(Duration::from_millis(100));

    let job = loop {
        let Some(job) = manager.job(&ticket.job_id) else {
            bail!("Job {} disappeared", ticket.job_id);
        };
        if job.progress_percent > 0 {
            pb.set_position(job.progress_percent as u64);
        }
        if job.is_terminal() {
            break job;
        }
        tokio::time::sleep(FETCH_POLL_INTERVAL).await;
    };

    match job.state {
        JobState::Succeeded => {
            pb.finish_and_clear();
            let path = manager.download_dir().join(&job.output_filename);
            println!("{} {}", "[OK]".green(), path.display());
            Ok(())
        }
        _ => {
            pb.abandon();
            bail!("Download failed: {}", job.error.unwrap_or_else(|| "unknown error".to_string()))
        }
    }
}
