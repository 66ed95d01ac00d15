//! HTTP API tests driving the router directly.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use pipedrop::server::{build_router, AppState, ServerConfig};
use pipedrop::signal::CancelHandle;
use pipedrop::storage::{ExpirationPolicy, Repository};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tower::ServiceExt;

fn app() -> (Router, Arc<Repository>) {
    let repository = Arc::new(Repository::new(ExpirationPolicy::default()));
    let state = Arc::new(AppState {
        repository: repository.clone(),
        config: ServerConfig::default(),
        uploads: CancelHandle::new(),
    });
    (build_router(state), repository)
}

async fn collect_body(body: Body) -> Bytes {
    body.collect().await.expect("body should collect").to_bytes()
}

#[tokio::test]
async fn test_post_then_get() {
    let (app, _repo) = app();
    let payload = b"some video bytes".to_vec();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files/foo/bar.mp4")
                .header(header::CONTENT_TYPE, "application/mp4")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/files/foo/bar.mp4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/mp4"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
    assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
    assert_eq!(collect_body(response.into_body()).await, payload.as_slice());
}

#[tokio::test]
async fn test_paths_are_case_folded() {
    let (app, _repo) = app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files/Foo/UPPER.txt")
                .body(Body::from("case test"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/files/foo/upper.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(collect_body(response.into_body()).await, "case test");
}

#[tokio::test]
async fn test_get_missing_is_404() {
    let (app, _repo) = app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/files/nothing/here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (app, _repo) = app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files/doomed")
                .body(Body::from("bytes"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/files/doomed")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/files/doomed")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_verb_is_405() {
    let (app, _repo) = app();
    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/files/x")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_failed_upload_yields_400_then_404() {
    let (app, _repo) = app();

    let broken = Body::from_stream(futures::stream::iter(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(io::Error::new(io::ErrorKind::ConnectionAborted, "client gone")),
    ]));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files/broken")
                .body(broken)
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The failed version reads as missing.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/files/broken")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trailing_chunk_drains_after_transport_abort() {
    let (app, _repo) = app();

    // Clients that slam the connection after their last byte surface a
    // transport error with the final chunk still in flight. The upload
    // must drain that chunk and complete instead of failing.
    let body = Body::from_stream(futures::stream::iter(vec![
        Ok(Bytes::from_static(b"all the ")),
        Err(io::Error::new(io::ErrorKind::ConnectionAborted, "socket closed early")),
        Ok(Bytes::from_static(b"bytes")),
    ]));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files/trailer.bin")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/files/trailer.bin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(collect_body(response.into_body()).await, "all the bytes");
}

#[tokio::test]
async fn test_get_streams_while_upload_runs() {
    let (app, _repo) = app();

    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(4);
    let upload_body = Body::from_stream(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));

    let post = {
        let app = app.clone();
        tokio::spawn(async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/files/live.bin")
                    .body(upload_body)
                    .unwrap(),
            )
            .await
            .unwrap()
        })
    };

    tx.send(Ok(Bytes::from_static(b"first"))).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/files/live.bin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The first chunk arrives while the upload is still open.
    let mut body = response.into_body();
    let frame = timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("first chunk should arrive before the upload finishes")
        .unwrap()
        .unwrap();
    assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"first"));

    tx.send(Ok(Bytes::from_static(b" second"))).await.unwrap();
    drop(tx);

    let rest = timeout(Duration::from_secs(2), body.collect())
        .await
        .expect("remainder should arrive after the upload finishes")
        .unwrap()
        .to_bytes();
    assert_eq!(rest, Bytes::from_static(b" second"));

    let post_response = timeout(Duration::from_secs(2), post)
        .await
        .expect("upload should finish")
        .unwrap();
    assert_eq!(post_response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_diagnostics_renders_snapshot() {
    let (app, repo) = app();
    repo.create("/visible.txt", "text/plain");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/diagnostics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(collect_body(response.into_body()).await.to_vec()).unwrap();
    assert!(html.contains("/visible.txt"));
    assert!(html.contains("uploading"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/diagnostics")
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report: serde_json::Value =
        serde_json::from_slice(&collect_body(response.into_body()).await).unwrap();
    assert_eq!(report["entries"][0]["path"], "/visible.txt");
    assert_eq!(report["metrics"]["created"], 1);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/diagnostics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
