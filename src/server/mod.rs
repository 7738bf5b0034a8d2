//! HTTP API server
//!
//! JSON API used by the web UI to discover formats, start muxed downloads,
//! poll their progress and fetch the result.
//!
//! # Endpoints
//!
//! - `POST /api/get-formats` - Video candidates and audio streams for a URL
//! - `POST /api/download` - Start a background download job
//! - `GET /api/progress/:job_id` - Job progress (0 for unknown ids)
//! - `GET /api/jobs/:job_id` - Full job snapshot
//! - `GET /downloads/:filename` - Fetch a finished file as an attachment
//! - `GET /health` - Health check
//!
//! # Example
//!
//! ```no_run
//! use streammux::config::Config;
//! use streammux::server::Server;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = Server::new(Config::default()).with_port(5000);
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Request, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{services::ServeFile, timeout::TimeoutLayer, trace::TraceLayer};

use crate::catalog::{offer_formats, FormatOffer, LanguageTier};
use crate::config::Config;
use crate::errors::{
    ApiResult, UserError, MSG_FILE_NOT_FOUND, MSG_INCOMPLETE_DOWNLOAD, MSG_JOB_NOT_FOUND,
    MSG_MISSING_URL, MSG_NO_FORMATS,
};
use crate::jobs::{Job, JobManager, JobSettings, JobStore, JobTicket, MuxRequest};
use crate::tool::YtDlp;

/// Request bodies are a handful of short strings.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Slack on top of the metadata timeout before a request is cut off.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Server state shared across handlers.
pub struct AppState {
    pub config: Config,
    pub tool: YtDlp,
    pub jobs: JobManager,
    pub language_priority: Vec<LanguageTier>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let tool = YtDlp::from_config(&config.ytdlp);
        let jobs = JobManager::new(
            Arc::new(JobStore::new()),
            tool.clone(),
            JobSettings::from_config(&config),
        );
        Self {
            language_priority: config.language_priority(),
            config,
            tool,
            jobs,
        }
    }
}

/// API server.
pub struct Server {
    config: Config,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the bind address.
    /// Use "0.0.0.0" to allow network access, "127.0.0.1" (default) for localhost only.
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_address = addr.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the router with all routes, backed by a fresh job store.
    ///
    /// Rate limiting is added by [`Server::start`] since it needs the peer address.
    pub fn build_router(&self) -> Router {
        let state = Arc::new(AppState::new(self.config.clone()));
        let request_timeout = self.config.metadata_timeout() + REQUEST_TIMEOUT_SLACK;

        Router::new()
            .route("/health", get(health_handler))
            .route("/api/get-formats", post(formats_handler))
            .route("/api/download", post(download_handler))
            .route("/api/progress/:job_id", get(progress_handler))
            .route("/api/jobs/:job_id", get(job_handler))
            .route("/downloads/:filename", get(file_handler))
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the server with graceful shutdown.
    pub async fn start(&self) -> Result<()> {
        // 5 requests per second per IP, bursts of 120 for progress polling.
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_millisecond(200)
                .burst_size(120)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .context("Invalid rate limit configuration")?,
        );
        let router = self.build_router().layer(GovernorLayer {
            config: governor_conf,
        });

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        tracing::info!(
            addr = %addr,
            download_dir = %self.config.download_dir.display(),
            program = %self.config.ytdlp.program,
            "Starting server"
        );

        if self.config.bind_address == "0.0.0.0" {
            tracing::warn!("Server is binding to 0.0.0.0 which exposes the API to the network");
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                anyhow::anyhow!(
                    "Port {} is already in use. Stop the other instance or pick another port with --port <PORT>",
                    self.config.port
                )
            } else {
                anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
            }
        })?;

        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct FormatsRequest {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequest {
    url: Option<String>,
    #[serde(alias = "video_format_id")]
    video_format_id: Option<String>,
    #[serde(alias = "audio_format_id")]
    audio_format_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProgressResponse {
    progress: i32,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    jobs: usize,
}

/// Treat blank strings the same as missing fields.
fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.jobs.store().len(),
    })
}

async fn formats_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FormatsRequest>, JsonRejection>,
) -> ApiResult<Json<FormatOffer>> {
    let Json(request) = payload.map_err(|rejection| {
        UserError::invalid_request(MSG_MISSING_URL, Some("url"), Some(&rejection.body_text()))
    })?;
    let url = required(request.url)
        .ok_or_else(|| UserError::invalid_request(MSG_MISSING_URL, Some("url"), None))?;

    let catalog = state.tool.fetch_catalog(&url).await?;
    let offer = offer_formats(&catalog, &state.language_priority)
        .ok_or_else(|| UserError::not_found(MSG_NO_FORMATS))?;

    tracing::info!(
        media_id = %offer.media_id,
        video_candidates = offer.formats.len(),
        audio_format = %offer.audio_format.format_id,
        "Formats discovered"
    );

    Ok(Json(offer))
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<Json<JobTicket>> {
    let Json(request) = payload.map_err(|rejection| {
        UserError::invalid_request(MSG_INCOMPLETE_DOWNLOAD, None, Some(&rejection.body_text()))
    })?;

    let incomplete =
        |field: &str| UserError::invalid_request(MSG_INCOMPLETE_DOWNLOAD, Some(field), None);
    let url = required(request.url).ok_or_else(|| incomplete("url"))?;
    let video_format_id =
        required(request.video_format_id).ok_or_else(|| incomplete("videoFormatId"))?;
    let audio_format_id =
        required(request.audio_format_id).ok_or_else(|| incomplete("audioFormatId"))?;

    // The output name needs the media id and the chosen stream's height.
    let catalog = state
        .tool
        .fetch_catalog(&url)
        .await
        .map_err(|e| UserError::download_failed(&e.to_string()))?;
    let output_height = catalog.find(&video_format_id).and_then(|s| s.height);

    let ticket = state.jobs.create_job(MuxRequest {
        url,
        media_id: catalog.media_id().to_string(),
        video_format_id,
        audio_format_id,
        output_height,
    });

    Ok(Json(ticket))
}

async fn progress_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<ProgressResponse> {
    Json(ProgressResponse {
        progress: state.jobs.progress(&job_id),
    })
}

async fn job_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .jobs
        .job(&job_id)
        .map(Json)
        .ok_or_else(|| UserError::not_found(MSG_JOB_NOT_FOUND))
}

async fn file_handler(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    if !is_plain_filename(&filename) {
        return Err(UserError::not_found(MSG_FILE_NOT_FOUND));
    }

    let path = state.jobs.download_dir().join(&filename);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(UserError::not_found(MSG_FILE_NOT_FOUND));
    }

    let disposition = HeaderValue::from_str(&content_disposition(&filename))
        .map_err(|e| UserError::internal_error(&e.to_string()))?;

    let mut response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.map(Body::new).into_response(),
        Err(never) => match never {},
    };
    response.headers_mut().insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

/// A bare file name that cannot escape the download directory.
fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && !name.chars().any(char::is_control)
}

/// Attachment header for `filename`.
///
/// Non-ASCII names get an ASCII `filename` plus an RFC 5987 `filename*`.
fn content_disposition(filename: &str) -> String {
    let is_safe = |c: char| (c.is_ascii_graphic() && c != '"') || c == ' ';
    if filename.chars().all(is_safe) {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let ascii: String = filename
        .chars()
        .map(|c| if is_safe(c) { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

/// Graceful shutdown signal handler.
///
/// Running jobs are not waited for; their tool processes die with the runtime.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("Failed to install signal handlers: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
    }
}
