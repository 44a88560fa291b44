//! HTTP API tests
//!
//! Drives the router with a stub delegate in place of yt-dlp.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;
use ytmp3::{
    create_router, AppState, ArtifactStore, AudioDownloader, ConvertedAudio, DelegateError,
    Quality,
};

const AUDIO_BYTES: &[u8] = b"ID3\x04\x00fake mp3 payload";

/// Delegate stand-in: counts calls and writes a fake artifact on success.
struct StubDownloader {
    store: ArtifactStore,
    calls: AtomicUsize,
    last_quality: Mutex<Option<Quality>>,
    failure: Option<DelegateError>,
}

impl StubDownloader {
    fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            calls: AtomicUsize::new(0),
            last_quality: Mutex::new(None),
            failure: None,
        }
    }

    fn failing(store: ArtifactStore, failure: DelegateError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(store)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioDownloader for StubDownloader {
    async fn download_audio(
        &self,
        _url: &str,
        quality: Quality,
    ) -> Result<ConvertedAudio, DelegateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_quality.lock().unwrap() = Some(quality);

        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let filename = format!("{}.mp3", Uuid::new_v4());
        std::fs::write(self.store.resolve(&filename).unwrap(), AUDIO_BYTES).unwrap();

        Ok(ConvertedAudio {
            filename,
            title: "Stub Title".into(),
            thumbnail: Some("https://img.example/thumb.jpg".into()),
            duration: Some(42.0),
        })
    }
}

struct TestApp {
    _tmp: TempDir,
    store: Arc<ArtifactStore>,
    stub: Arc<StubDownloader>,
    router: Router,
}

fn test_app_with(make_stub: impl FnOnce(ArtifactStore) -> StubDownloader) -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(tmp.path().join("downloads")).unwrap();
    let stub = Arc::new(make_stub(store.clone()));
    let store = Arc::new(store);

    let state = AppState::new(
        Arc::clone(&store),
        Arc::clone(&stub) as Arc<dyn AudioDownloader>,
        Duration::from_secs(3600),
    );

    TestApp {
        _tmp: tmp,
        store,
        stub,
        router: create_router(state),
    }
}

fn test_app() -> TestApp {
    test_app_with(StubDownloader::new)
}

fn post_convert(body: &str) -> Request<Body> {
    Request::post("/api/convert")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn backdate(path: &std::path::Path, by: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let response = app.router.oneshot(get("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_convert_then_download_round_trip() {
    let app = test_app();
    let url = "https://valid.example/video";

    let response = app
        .router
        .clone()
        .oneshot(post_convert(&format!(r#"{{"url":"{url}","quality":"192"}}"#)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["info"]["title"], "Stub Title");
    assert_eq!(json["info"]["thumbnail"], "https://img.example/thumb.jpg");

    let filename = json["filename"].as_str().unwrap().to_string();
    let download_url = json["download_url"].as_str().unwrap().to_string();
    assert!(download_url.ends_with(&filename));
    assert_eq!(download_url, format!("/api/download/{filename}"));

    let stem = filename.strip_suffix(".mp3").expect("mp3 extension");
    assert!(Uuid::parse_str(stem).is_ok(), "{filename} is not <uuid>.mp3");
    assert!(!filename.contains("valid.example"));
    assert_eq!(app.stub.calls(), 1);
    assert_eq!(*app.stub.last_quality.lock().unwrap(), Some(Quality::Kbps192));

    let response = app.router.clone().oneshot(get(&download_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"audio.mp3\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], AUDIO_BYTES);

    // Once expired and cleaned up, the artifact is gone.
    backdate(&app.store.resolve(&filename).unwrap(), Duration::from_secs(7200));
    let stats = app.store.cleanup(Duration::from_secs(3600));
    assert_eq!(stats.removed, 1);

    let response = app.router.oneshot(get(&download_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_convert_rejects_invalid_quality_before_delegate() {
    let cases = [
        r#""999""#,
        r#""64""#,
        "256",
        r#""""#,
        "true",
        r#"["192"]"#,
        r#"" 192 ""#,
        r#""192\n""#,
    ];
    for quality in cases {
        let app = test_app();
        let body = format!(r#"{{"url":"https://bad.example","quality":{quality}}}"#);

        let response = app.router.oneshot(post_convert(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "quality {quality}");

        let json = body_json(response.into_body()).await;
        assert!(json["detail"].as_str().unwrap().contains("quality"));
        assert_eq!(app.stub.calls(), 0, "delegate called for quality {quality}");
        assert_eq!(std::fs::read_dir(app.store.root()).unwrap().count(), 0);
    }
}

#[tokio::test]
async fn test_convert_accepts_numeric_quality_and_default() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(post_convert(r#"{"url":"https://v.example/1","quality":320}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*app.stub.last_quality.lock().unwrap(), Some(Quality::Kbps320));

    let response = app
        .router
        .oneshot(post_convert(r#"{"url":"https://v.example/2"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*app.stub.last_quality.lock().unwrap(), Some(Quality::Kbps192));
    assert_eq!(app.stub.calls(), 2);
}

#[tokio::test]
async fn test_convert_rejects_missing_url_and_bad_json() {
    for body in [r#"{"quality":"192"}"#, r#"{"url":"  "}"#, "not json", r#"{"url": 5}"#] {
        let app = test_app();
        let response = app.router.oneshot(post_convert(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        let json = body_json(response.into_body()).await;
        assert!(json["detail"].is_string());
        assert_eq!(app.stub.calls(), 0);
    }
}

#[tokio::test]
async fn test_convert_delegate_failures_are_bad_requests() {
    let cases = [
        DelegateError::Download("Video unavailable".into()),
        DelegateError::Unexpected("ffmpeg crashed".into()),
    ];

    for failure in cases {
        let expected = failure.to_string();
        let app = test_app_with(|store| StubDownloader::failing(store, failure));

        let response = app
            .router
            .oneshot(post_convert(r#"{"url":"https://v.example/gone"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response.into_body()).await;
        assert_eq!(json["detail"], expected);
        assert_eq!(app.stub.calls(), 1);
        assert_eq!(std::fs::read_dir(app.store.root()).unwrap().count(), 0);
    }
}

#[tokio::test]
async fn test_download_missing_is_not_found() {
    let app = test_app();
    let response = app
        .router
        .oneshot(get("/api/download/does-not-exist.mp3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["detail"], "File not found");
}

#[tokio::test]
async fn test_download_directory_is_not_found() {
    let app = test_app();
    std::fs::create_dir(app.store.root().join("dir.mp3")).unwrap();

    let response = app.router.oneshot(get("/api/download/dir.mp3")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["detail"], "File not found");
}

#[tokio::test]
async fn test_download_rejects_path_traversal() {
    let app = test_app();

    // A file just outside the store that a traversal would reach.
    let outside = app.store.root().parent().unwrap().join("secret.mp3");
    std::fs::write(&outside, b"secret").unwrap();

    let response = app
        .router
        .oneshot(get("/api/download/..%2Fsecret.mp3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_convert_schedules_cleanup() {
    let app = test_app();
    let stale = app.store.root().join("stale.mp3");
    std::fs::write(&stale, b"old").unwrap();
    backdate(&stale, Duration::from_secs(7200));

    let response = app
        .router
        .oneshot(post_convert(r#"{"url":"https://v.example/1"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    let fresh = app.store.resolve(json["filename"].as_str().unwrap()).unwrap();

    for _ in 0..200 {
        if !stale.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!stale.exists(), "stale artifact should be cleaned up");
    assert!(fresh.exists(), "fresh artifact must survive cleanup");
}

#[tokio::test]
async fn test_cleanup_twice_is_noop_second_time() {
    let app = test_app();
    let path = app.store.root().join("old.mp3");
    std::fs::write(&path, b"x").unwrap();
    backdate(&path, Duration::from_secs(10));

    assert_eq!(app.store.cleanup(Duration::ZERO).removed, 1);
    let second = app.store.cleanup(Duration::ZERO);
    assert_eq!(second.removed, 0);
    assert_eq!(second.failed, 0);
}
