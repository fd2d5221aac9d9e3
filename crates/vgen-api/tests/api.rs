//! End-to-end tests driving the router with `oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot()

use vgen_api::{create_router, ApiConfig, AppState};
use vgen_models::TaskId;
use vgen_storage::StorageConfig;

const BOUNDARY: &str = "----vgenTestBoundary7MA4YWxkTrZu0gW";

async fn test_app(max_artifact_bytes: u64) -> (Router, AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig {
        root: dir.path().to_path_buf(),
        max_artifact_bytes,
    };
    let state = AppState::new(ApiConfig::default(), storage).await.unwrap();
    let app = create_router(state.clone(), None);
    (app, state, dir)
}

/// Build a multipart body with text fields and an optional `video` part.
fn multipart_body(fields: &[(&str, &str)], video: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, bytes)) = video {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"out.mp4\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn callback_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/video-callback")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn callback(app: &Router, task_id: &str, extra: &[(&str, &str)], video: &[u8]) -> Response<Body> {
    let mut fields = vec![("task_id", task_id)];
    fields.extend_from_slice(extra);
    let body = multipart_body(&fields, Some(("video/mp4", video)));
    app.clone().oneshot(callback_request(body)).await.unwrap()
}

async fn get(app: &Router, uri: &str, range: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(range) = range {
        builder = builder.header(header::RANGE, range);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("Response should be valid JSON")
}

async fn create_task(app: &Router) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"script": "A day at the beach", "search_query": "ocean waves"}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let task = body_json(response).await;
    assert_eq!(task["status"], "pending");
    task["task_id"].as_str().unwrap().to_string()
}

fn sample_video(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_created_task_is_pending() {
    let (app, _state, _dir) = test_app(1024 * 1024).await;
    let task_id = create_task(&app).await;

    let task = body_json(get(&app, &format!("/tasks/{}", task_id), None).await).await;
    assert_eq!(task["status"], "pending");
    assert_eq!(task["search_query"], "ocean waves");

    let status = body_json(get(&app, &format!("/api/video-status/{}", task_id), None).await).await;
    assert_eq!(status["status"], "pending");
    assert_eq!(status["downloadUrl"], Value::Null);
}

#[tokio::test]
async fn test_create_task_requires_fields() {
    let (app, _state, _dir) = test_app(1024).await;

    let request = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"script": "only a script"}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "invalid_request");

    let request = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_for_unregistered_task_is_retrievable() {
    let (app, _state, _dir) = test_app(1024 * 1024).await;

    let response = callback(&app, "worker-only", &[("status", "completed"), ("duration", "30")], b"abc").await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack = body_json(response).await;
    assert_eq!(ack["success"], true);
    assert_eq!(ack["downloadUrl"], "/api/video/worker-only");

    let status = body_json(get(&app, "/api/video-status/worker-only", None).await).await;
    assert_eq!(status["task_id"], "worker-only");
    assert_eq!(status["status"], "completed");
    assert_eq!(status["duration"], 30.0);
    assert!(status["receivedAt"].is_string());
}

#[tokio::test]
async fn test_full_round_trip() {
    let (app, _state, _dir) = test_app(1024 * 1024).await;
    let task_id = create_task(&app).await;
    let video = sample_video(4096);

    let response = callback(&app, &task_id, &[("status", "completed")], &video).await;
    assert_eq!(response.status(), StatusCode::OK);

    let task = body_json(get(&app, &format!("/tasks/{}", task_id), None).await).await;
    assert_eq!(task["status"], "completed");
    assert_eq!(task["video_url"], format!("/api/video/{}", task_id));

    let response = get(&app, &format!("/api/video/{}", task_id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::CONTENT_LENGTH], "4096");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"generated_video_{}.mp4\"", task_id).as_str()
    );
    assert_eq!(body_bytes(response).await, video);
}

#[tokio::test]
async fn test_range_requests() {
    let (app, _state, _dir) = test_app(1024 * 1024).await;
    let video = sample_video(1000);
    callback(&app, "ranged", &[], &video).await;

    let response = get(&app, "/api/video/ranged", Some("bytes=0-99")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-99/1000");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(body_bytes(response).await, &video[..100]);

    let response = get(&app, "/api/video/ranged", Some("bytes=500-")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 500-999/1000");
    assert_eq!(body_bytes(response).await, &video[500..]);

    let response = get(&app, "/api/video/ranged", Some("bytes=-10")).await;
    assert_eq!(body_bytes(response).await, &video[990..]);
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let (app, _state, _dir) = test_app(1024 * 1024).await;
    callback(&app, "short", &[], &sample_video(100)).await;

    let response = get(&app, "/api/video/short", Some("bytes=100-")).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */100");
    assert_eq!(body_json(response).await["code"], "invalid_range");

    let response = get(&app, "/api/video/short", Some("bytes=0-1,5-9")).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_redelivery_last_write_wins() {
    let (app, _state, _dir) = test_app(1024 * 1024).await;

    callback(&app, "again", &[("duration", "10")], b"first").await;
    callback(&app, "again", &[("duration", "20")], b"second!").await;

    let status = body_json(get(&app, "/api/video-status/again", None).await).await;
    assert_eq!(status["duration"], 20.0);

    let response = get(&app, "/api/video/again", None).await;
    assert_eq!(body_bytes(response).await, b"second!");
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (app, _state, _dir) = test_app(1024).await;

    let response = get(&app, "/api/video/anything-never-submitted", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "not_found");

    let response = get(&app, "/api/video-status/anything-never-submitted", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app, "/tasks/anything-never-submitted", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_task_id_in_path() {
    let (app, _state, _dir) = test_app(1024).await;

    let response = get(&app, "/api/video/bad.id", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_without_video_part() {
    let (app, state, _dir) = test_app(1024).await;

    let body = multipart_body(&[("task_id", "novideo"), ("status", "completed")], None);
    let response = app.clone().oneshot(callback_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!state.metadata.exists(&TaskId::from("novideo")).await);
}

#[tokio::test]
async fn test_callback_wrong_media_type() {
    let (app, state, _dir) = test_app(1024).await;

    let body = multipart_body(&[("task_id", "png")], Some(("image/png", &b"\x89PNG"[..])));
    let response = app.clone().oneshot(callback_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(!state.metadata.exists(&TaskId::from("png")).await);
}

#[tokio::test]
async fn test_callback_oversized_artifact() {
    let (app, state, _dir) = test_app(64).await;

    let response = callback(&app, "huge", &[], &sample_video(65)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["code"], "payload_too_large");
    assert!(!state.metadata.exists(&TaskId::from("huge")).await);

    let incoming = std::fs::read_dir(state.content.root().join(".incoming")).unwrap().count();
    assert_eq!(incoming, 0);
}

#[tokio::test]
async fn test_failure_callback_fails_task() {
    let (app, _state, _dir) = test_app(1024).await;
    let task_id = create_task(&app).await;

    let response = callback(
        &app,
        &task_id,
        &[("status", "failed"), ("message", "no footage found")],
        b"x",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let task = body_json(get(&app, &format!("/tasks/{}", task_id), None).await).await;
    assert_eq!(task["status"], "failed");
    assert_eq!(task["error_message"], "no footage found");

    let status = body_json(get(&app, &format!("/api/video-status/{}", task_id), None).await).await;
    assert_eq!(status["status"], "failed");
}

#[tokio::test]
async fn test_concurrent_callbacks_for_one_task() {
    let (app, state, _dir) = test_app(1024 * 1024).await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let video = vec![i as u8; 100 + i];
                let duration = i.to_string();
                let body = multipart_body(
                    &[("task_id", "contended"), ("duration", duration.as_str())],
                    Some(("video/mp4", &video[..])),
                );
                app.oneshot(callback_request(body)).await.unwrap().status()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    // Whichever callback won, its record and blob agree.
    let record = state.metadata.get(&TaskId::from("contended")).await.unwrap();
    let i = record.duration.unwrap() as usize;
    let response = get(&app, "/api/video/contended", None).await;
    assert_eq!(body_bytes(response).await, vec![i as u8; 100 + i]);

    let incoming = std::fs::read_dir(state.content.root().join(".incoming")).unwrap().count();
    assert_eq!(incoming, 0);
}

#[tokio::test]
async fn test_concurrent_callbacks_for_distinct_tasks() {
    let (app, _state, _dir) = test_app(1024 * 1024).await;

    let handles: Vec<_> = (0..16usize)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let task_id = format!("parallel-{}", i);
                let video = sample_video(500 + i * 37);
                let status = callback(&app, &task_id, &[], &video).await.status();
                (task_id, video, status)
            })
        })
        .collect();

    let mut delivered = Vec::new();
    for handle in handles {
        let (task_id, video, status) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK, "callback for {}", task_id);
        delivered.push((task_id, video));
    }

    for (task_id, video) in delivered {
        let response = get(&app, &format!("/api/video/{}", task_id), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, video, "payload for {}", task_id);
    }
}

#[tokio::test]
async fn test_metadata_write_failure_discards_blob() {
    let (app, state, _dir) = test_app(1024 * 1024).await;

    // A regular file where the metadata directory should be
    let metadata_dir = state.metadata.dir().to_path_buf();
    std::fs::remove_dir_all(&metadata_dir).unwrap();
    std::fs::write(&metadata_dir, b"not a directory").unwrap();

    let response = callback(&app, "doomed", &[], &sample_video(2048)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "storage_failure");

    assert!(!state.metadata.exists(&TaskId::from("doomed")).await);

    let videos: Vec<_> = std::fs::read_dir(state.content.root())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(videos, vec![".incoming".to_string()]);
    let incoming = std::fs::read_dir(state.content.root().join(".incoming")).unwrap().count();
    assert_eq!(incoming, 0);
}

#[tokio::test]
async fn test_missing_blob_is_inconsistency() {
    let (app, state, _dir) = test_app(1024).await;
    callback(&app, "vanished", &[], b"data").await;

    let record = state.metadata.get(&TaskId::from("vanished")).await.unwrap();
    std::fs::remove_file(&record.filepath).unwrap();

    let response = get(&app, "/api/video/vanished", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "inconsistency");
}

#[tokio::test]
async fn test_health_and_ready() {
    let (app, _state, _dir) = test_app(1024).await;

    let health = body_json(get(&app, "/health", None).await).await;
    assert_eq!(health["status"], "healthy");

    let response = get(&app, "/ready", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ready");
}
