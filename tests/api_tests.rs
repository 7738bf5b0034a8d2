//! HTTP API tests.
//!
//! The router is driven in-process with `oneshot`; the yt-dlp behind it is
//! the scripted fake from `common`.

#![cfg(unix)]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

use common::{Download, FakeTool, Metadata, CATALOG_JSON, NO_M4A_JSON, WAIT};
use streammux::server::Server;

fn router(fake: &FakeTool) -> Router {
    Server::new(fake.config()).build_router()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

// =============================================================================
// Format Discovery
// =============================================================================

#[tokio::test]
async fn test_formats_missing_url() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let (status, body) = post_json(&router, "/api/get-formats", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["error_type"], "invalid_request");
    assert_eq!(body["error"]["message"], "URL não fornecida.");

    let (status, _) = post_json(&router, "/api/get-formats", json!({"url": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_formats_malformed_body() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let request = Request::builder()
        .method("POST")
        .uri("/api/get-formats")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["error_type"], "invalid_request");
}

#[tokio::test]
async fn test_formats_lists_deduplicated_candidates() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let request = json!({"url": "https://youtu.be/abc123"});
    let (status, body) = post_json(&router, "/api/get-formats", request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mediaId"], "abc123");

    let formats = body["formats"].as_array().unwrap();
    let ids: Vec<_> = formats.iter().map(|f| f["formatId"].as_str().unwrap()).collect();
    let labels: Vec<_> = formats.iter().map(|f| f["resolutionLabel"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["134", "136", "137"]);
    assert_eq!(labels, vec!["360p", "720p", "1080p"]);

    assert_eq!(body["audioFormat"]["formatId"], "140");
    let audio_ids: Vec<_> = body["audioFormats"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["formatId"].as_str().unwrap())
        .collect();
    assert_eq!(audio_ids, vec!["139", "140"]);
}

#[tokio::test]
async fn test_formats_without_m4a_audio_is_404() {
    let fake = FakeTool::new(Metadata::Document(NO_M4A_JSON), Download::Succeed);
    let router = router(&fake);

    let request = json!({"url": "https://youtu.be/x"});
    let (status, body) = post_json(&router, "/api/get-formats", request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["error"]["message"],
        "Não foram encontrados formatos de alta qualidade para este vídeo."
    );
}

#[tokio::test]
async fn test_formats_tool_failure_is_400() {
    let fake = FakeTool::new(Metadata::Fail, Download::Succeed);
    let router = router(&fake);

    let (status, body) = post_json(&router, "/api/get-formats", json!({"url": "not a url"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["error_type"], "bad_source");
    assert_eq!(body["error"]["message"], "URL inválida ou vídeo indisponível.");
}

#[tokio::test]
async fn test_formats_unparseable_metadata_is_400() {
    let fake = FakeTool::new(Metadata::Document("this is not json"), Download::Succeed);
    let router = router(&fake);

    let request = json!({"url": "https://youtu.be/x"});
    let (status, body) = post_json(&router, "/api/get-formats", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["error_type"], "bad_source");
}

#[tokio::test]
async fn test_formats_metadata_timeout_is_500() {
    let fake = FakeTool::new(Metadata::Hang, Download::Succeed);
    let mut config = fake.config();
    config.ytdlp.metadata_timeout_secs = 1;
    let router = Server::new(config).build_router();

    let request = json!({"url": "https://youtu.be/x"});
    let (status, body) = post_json(&router, "/api/get-formats", request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["error_type"], "internal_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("timed out"));
}

// =============================================================================
// Download Jobs
// =============================================================================

#[tokio::test]
async fn test_download_missing_fields() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let (status, body) = post_json(
        &router,
        "/api/download",
        json!({"url": "https://youtu.be/abc123", "videoFormatId": "137"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Informações incompletas para download.");
    assert_eq!(body["error"]["field"], "audioFormatId");
}

#[tokio::test]
async fn test_download_flow_end_to_end() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let (status, body) = post_json(
        &router,
        "/api/download",
        json!({"url": "https://youtu.be/abc123", "videoFormatId": "137", "audioFormatId": "140"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "abc123_1080p.mp4");
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let deadline = tokio::time::Instant::now() + WAIT;
    let mut last = 0;
    loop {
        let (status, body) = get(&router, &format!("/api/progress/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        let progress = body["progress"].as_i64().unwrap();
        assert!(progress >= last, "progress went from {} to {}", last, progress);
        last = progress;
        if progress == 100 || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last, 100);

    let (status, job) = get(&router, &format!("/api/jobs/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["state"], "succeeded");
    assert_eq!(job["filename"], "abc123_1080p.mp4");

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/downloads/abc123_1080p.mp4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert_eq!(disposition, "attachment; filename=\"abc123_1080p.mp4\"");
}

#[tokio::test]
async fn test_download_unknown_video_id_uses_fallback_name() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let (status, body) = post_json(
        &router,
        "/api/download",
        json!({
            "url": "https://youtu.be/abc123",
            "video_format_id": "9999",
            "audio_format_id": "140"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "abc123_video.mp4");
}

#[tokio::test]
async fn test_download_start_failure_is_500() {
    let fake = FakeTool::new(Metadata::Fail, Download::Succeed);
    let router = router(&fake);

    let (status, body) = post_json(
        &router,
        "/api/download",
        json!({"url": "https://youtu.be/abc123", "videoFormatId": "137", "audioFormatId": "140"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], 500);
    assert_eq!(body["error"]["error_type"], "internal_error");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("Falha no download: "), "{}", message);

    let (_, health) = get(&router, "/health").await;
    assert_eq!(health["jobs"], 0);
}

#[tokio::test]
async fn test_failed_job_reports_minus_one() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Fail);
    let router = router(&fake);

    let (_, body) = post_json(
        &router,
        "/api/download",
        json!({"url": "https://youtu.be/abc123", "videoFormatId": "137", "audioFormatId": "140"}),
    )
    .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let deadline = tokio::time::Instant::now() + WAIT;
    let progress = loop {
        let (_, body) = get(&router, &format!("/api/progress/{}", job_id)).await;
        let progress = body["progress"].as_i64().unwrap();
        if progress == -1 || tokio::time::Instant::now() >= deadline {
            break progress;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(progress, -1);

    let (_, job) = get(&router, &format!("/api/jobs/{}", job_id)).await;
    assert_eq!(job["state"], "failed");
    assert!(job["error"].as_str().unwrap().contains("status 1"));
}

// =============================================================================
// Progress, Jobs and Files
// =============================================================================

#[tokio::test]
async fn test_unknown_job_progress_is_zero() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let (status, body) = get(&router, "/api/progress/does-not-exist").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"progress": 0}));

    let (status, _) = get(&router, "/api/jobs/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_file_is_404() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let (status, _) = get(&router, "/downloads/nothing_here.mp4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&router, "/downloads/..%2Fmetadata.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let fake = FakeTool::new(Metadata::Document(CATALOG_JSON), Download::Succeed);
    let router = router(&fake);

    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["jobs"], 0);
    assert!(body.get("version").is_some());
}
