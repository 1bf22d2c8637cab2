//! HTTP API integration tests
//!
//! Drives the full router against an in-memory registry and temporary
//! storage roots. The encoder path points nowhere, so every transcode fails
//! fast and only the delivery paths under test touch the filesystem.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;
use uuid::Uuid;

use vidstream::app::create_app;
use vidstream::config::settings::AppConfig;
use vidstream::modules::video::memory::InMemoryVideoRepository;
use vidstream::state::AppState;

const BOUNDARY: &str = "vidstream-test-boundary";

struct TestApp {
    _root: TempDir,
    state: AppState,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_upload_limit(AppConfig::default().max_upload_bytes).await
    }

    async fn with_upload_limit(max_upload_bytes: usize) -> Self {
        let root = tempdir().unwrap();
        let config = AppConfig {
            video_dir: root.path().join("videos"),
            hls_dir: root.path().join("videos_hls"),
            ffmpeg_path: root.path().join("missing-ffmpeg"),
            transcode_workers: 1,
            max_upload_bytes,
            ..AppConfig::default()
        };
        let state = AppState::new(config, Arc::new(InMemoryVideoRepository::new()));
        state.layout.ensure_dirs().await.unwrap();
        let router = create_app(state.clone());
        Self {
            _root: root,
            state,
            router,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn get_range(&self, uri: &str, range: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        self.send(
            Request::get(uri)
                .header(header::RANGE, range)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn upload(&self, fields: &[(&str, &str)], file: Option<&[u8]>) -> (StatusCode, Value) {
        let request = Request::post("/api/v1/videos")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn ingest(&self, bytes: &[u8]) -> Uuid {
        let (status, json) = self
            .upload(&[("title", "Demo"), ("description", "A demo clip")], Some(bytes))
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["success"], true);
        json["data"]["videoId"].as_str().unwrap().parse().unwrap()
    }

    async fn record(&self, id: Uuid) -> Value {
        let (status, _, body) = self.get(&format!("/api/v1/videos/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }

    async fn wait_for_status(&self, id: Uuid, wanted: &str) -> Value {
        for _ in 0..250 {
            let record = self.record(id).await;
            if record["status"] == wanted {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("video {id} never reached {wanted}");
    }
}

/// File part first, so metadata validation happens after the upload is staged.
fn multipart_body(fields: &[(&str, &str)], file: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(bytes) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn source_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = TestApp::new().await;

    let (status, _, body) = app.get("/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    let (status, _, body) = app.get("/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    let doc: Value = serde_json::from_slice(&body).unwrap();
    assert!(doc["paths"]["/api/v1/videos/stream/range/{id}"].is_object());
}

#[tokio::test]
async fn range_requests_return_exact_slices() {
    let app = TestApp::new().await;
    let source = source_bytes(5000);
    let id = app.ingest(&source).await;
    let uri = format!("/api/v1/videos/stream/range/{id}");

    let (status, headers, body) = app.get_range(&uri, "bytes=0-999").await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-999/5000");
    assert_eq!(headers[header::CONTENT_LENGTH], "1000");
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
    assert_eq!(headers[header::PRAGMA], "no-cache");
    assert_eq!(headers[header::EXPIRES], "0");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(body, &source[..1000]);

    let (status, headers, body) = app.get_range(&uri, "bytes=4990-").await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 4990-4999/5000");
    assert_eq!(body, &source[4990..]);

    let (status, _, body) = app.get_range(&uri, "bytes=1234-1234").await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, &source[1234..1235]);
}

#[tokio::test]
async fn request_without_range_gets_the_whole_file() {
    let app = TestApp::new().await;
    let source = source_bytes(5000);
    let id = app.ingest(&source).await;

    let (status, headers, body) = app.get(&format!("/api/v1/videos/stream/range/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::CONTENT_RANGE).is_none());
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(headers[header::CONTENT_LENGTH], "5000");
    assert_eq!(body, source);
}

#[tokio::test]
async fn bad_ranges_are_client_errors() {
    let app = TestApp::new().await;
    let id = app.ingest(&source_bytes(5000)).await;
    let uri = format!("/api/v1/videos/stream/range/{id}");

    let (status, headers, body) = app.get_range(&uri, "bytes=5000-").await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes */5000");
    assert!(body.is_empty());

    let (status, _, _) = app.get_range(&uri, "bytes=900-100").await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);

    let (status, _, _) = app.get_range(&uri, "bytes=zero-").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_videos_are_not_found() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();

    for uri in [
        format!("/api/v1/videos/stream/range/{missing}"),
        format!("/api/v1/videos/{missing}"),
        "/api/v1/videos/not-a-uuid".to_string(),
        "/api/v1/videos/stream/range/not-a-uuid".to_string(),
    ] {
        let (status, _, _) = app.get(&uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }

    let (status, _, _) = app
        .send(
            Request::post(format!("/api/v1/videos/{missing}/transcode"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_uploads_are_rejected_without_leftovers() {
    let app = TestApp::new().await;

    let (status, json) = app
        .upload(&[("title", "   "), ("description", "clip")], Some(b"bytes"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let too_long = "x".repeat(4001);
    let (status, _) = app
        .upload(&[("title", "Demo"), ("description", &too_long)], Some(b"bytes"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.upload(&[("title", "Demo"), ("description", "clip")], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = app.get("/api/v1/videos").await;
    let list: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 0);
    assert!(std::fs::read_dir(app.state.layout.incoming_dir()).unwrap().next().is_none());
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let app = TestApp::with_upload_limit(1024).await;

    let (status, json) = app
        .upload(&[("title", "Demo"), ("description", "clip")], Some(&source_bytes(8 * 1024)))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{json}");
    assert_eq!(json["success"], false);

    let (_, _, body) = app.get("/api/v1/videos").await;
    let list: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 0);
    assert!(std::fs::read_dir(app.state.layout.incoming_dir()).unwrap().next().is_none());
}

#[tokio::test]
async fn list_shows_records_without_file_paths() {
    let app = TestApp::new().await;
    let first = app.ingest(b"one").await;
    let second = app.ingest(b"two").await;

    let (status, _, body) = app.get("/api/v1/videos").await;
    assert_eq!(status, StatusCode::OK);
    let list: Value = serde_json::from_slice(&body).unwrap();
    let list = list.as_array().unwrap();

    let ids: Vec<&str> = list.iter().map(|v| v["videoId"].as_str().unwrap()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.to_string().as_str()));
    assert!(ids.contains(&second.to_string().as_str()));
    for record in list {
        assert_eq!(record["title"], "Demo");
        assert!(record.get("filePath").is_none());
    }
}

#[tokio::test]
async fn failed_transcode_is_recorded_and_can_be_retried() {
    let app = TestApp::new().await;
    let id = app.ingest(b"not a real video").await;

    let record = app.wait_for_status(id, "FAILED").await;
    assert!(record["diagnostic"].as_str().unwrap().contains("failed to spawn"));

    let (status, _, body) = app
        .send(
            Request::post(format!("/api/v1/videos/{id}/transcode"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["queued"], true);

    app.wait_for_status(id, "FAILED").await;
    let (status, _, _) = app.get(&format!("/api/v1/videos/{id}/master.m3u8")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn artifacts_are_served_only_once_published() {
    let app = TestApp::new().await;
    let id = app.ingest(b"source").await;
    let master = format!("/api/v1/videos/{id}/master.m3u8");

    let (status, _, _) = app.get(&master).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let dir = app.state.layout.artifact_dir(id);
    std::fs::create_dir_all(&dir).unwrap();
    let playlist = b"#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=600000,RESOLUTION=640x360\nplaylist_0.m3u8\n";
    std::fs::write(dir.join("master.m3u8"), playlist).unwrap();
    std::fs::write(dir.join("segment_0_000.ts"), b"\x47segment").unwrap();
    std::fs::write(dir.join("thumbnail.jpg"), b"\xff\xd8jpeg").unwrap();

    let (status, headers, first) = app.get(&master).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/vnd.apple.mpegurl");
    assert_eq!(first, playlist);
    let (_, _, second) = app.get(&master).await;
    assert_eq!(first, second);

    let (status, headers, _) = app.get(&format!("/api/v1/videos/{id}/segment_0_000.ts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp2t");

    let (status, headers, _) = app.get(&format!("/api/v1/videos/{id}/thumbnail.jpg")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
}

#[tokio::test]
async fn artifact_paths_cannot_escape_the_video_directory() {
    let app = TestApp::new().await;
    let id = app.ingest(b"source").await;

    let secret = app.state.layout.artifact_dir(id).join("..").join("secret.txt");
    std::fs::write(&secret, b"do not serve").unwrap();

    for name in ["..%2Fsecret.txt", "..%2F..%2Fvideos%2Fsecret.txt", "%2Fetc%2Fpasswd"] {
        let (status, _, body) = app.get(&format!("/api/v1/videos/{id}/{name}")).await;
        assert!(
            status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND,
            "{name} answered {status}"
        );
        assert_ne!(body, b"do not serve");
    }
}

#[tokio::test]
async fn metadata_suggestion_requires_a_transcript_and_falls_back() {
    let app = TestApp::new().await;

    let post = |body: &'static str| {
        Request::post("/api/v1/ai/generate-metadata")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    };

    let (status, _, _) = app.send(post(r#"{"transcript":""}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = app.send(post(r#"{"transcript":"a cooking show"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["title"], "Error generating title");
    assert_eq!(json["tags"], "error");
}
