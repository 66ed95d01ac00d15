//! HTTP route handlers
//!
//! Bridges axum request/response bodies onto the storage layer's chunk
//! source and sink contracts. Uploads pull from the request body stream;
//! downloads push into an mpsc channel that backs the response body, so a
//! slow consumer applies backpressure to the reader without ever holding
//! the slab's content lock across network I/O.

use axum::body::Body;
use axum::extract::{Extension, Path, Request};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::server::AppState;
use crate::storage::{AppendOutcome, ChunkSink, ChunkSource, ReadOutcome, SinkStatus};

/// Chunks buffered between the slab reader and the response body.
const DOWNLOAD_CHANNEL_CAPACITY: usize = 8;

/// Pulls upload chunks out of the request body stream.
///
/// A transport-level abort is not fatal right away: some clients slam the
/// connection after sending their last byte, so the first error opens a
/// grace window in which a trailing chunk may still drain. Only when the
/// window passes without data is the abort surfaced to the upload.
struct BodySource {
    stream: axum::body::BodyDataStream,
    grace: Duration,
    aborting: bool,
}

impl BodySource {
    fn new(stream: axum::body::BodyDataStream, grace: Duration) -> Self {
        Self {
            stream,
            grace,
            aborting: false,
        }
    }
}

#[async_trait]
impl ChunkSource for BodySource {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self.stream.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => {
                let err = io::Error::new(io::ErrorKind::ConnectionAborted, e);
                if self.aborting {
                    return Err(err);
                }
                self.aborting = true;
                match tokio::time::timeout(self.grace, self.stream.next()).await {
                    Ok(Some(Ok(chunk))) => Ok(Some(chunk)),
                    _ => Err(err),
                }
            }
            None => Ok(None),
        }
    }
}

/// Pushes download chunks into the channel backing the response body.
///
/// The channel closes when the client goes away, which surfaces as
/// [`SinkStatus::Closed`].
struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn deliver(&mut self, chunk: Bytes) -> SinkStatus {
        match self.tx.send(Ok(chunk)).await {
            Ok(()) => SinkStatus::Accepted,
            Err(_) => SinkStatus::Closed,
        }
    }
}

/// Paths are case-folded before they reach the storage layer.
fn normalize_path(raw: &str) -> String {
    format!("/{}", raw.to_lowercase())
}

/// Store a new version and stream the request body into it.
pub async fn upload_file(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
    request: Request,
) -> Response {
    let path = normalize_path(&path);
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let slab = state.repository.create(&path, &content_type);
    let mut source = BodySource::new(
        request.into_body().into_data_stream(),
        state.config.upload_grace_period,
    );
    let mut cancel = state.uploads.subscribe();

    match slab.append(&mut source, &mut cancel).await {
        Ok(AppendOutcome::Completed) => {
            info!(path = %path, bytes = slab.len(), "upload complete");
            StatusCode::CREATED.into_response()
        }
        Ok(AppendOutcome::Failed) => {
            // Readers of this version have already been told via the
            // slab's failed flag; the producer just gets a 400.
            StatusCode::BAD_REQUEST.into_response()
        }
        Err(e) => {
            error!(path = %path, error = %e, "upload rejected");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Stream the current version to the client, following a live upload.
pub async fn download_file(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
) -> Response {
    let path = normalize_path(&path);
    let Some(slab) = state.repository.lookup(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // An already-failed upload is indistinguishable from a missing file as
    // long as no bytes have been sent.
    if slab.is_failed() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let content_type = slab.content_type().to_string();
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(DOWNLOAD_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut sink = ChannelSink { tx: tx.clone() };
        match slab.read_to(&mut sink).await {
            ReadOutcome::Complete => {}
            ReadOutcome::Incomplete => {
                // Mid-stream failure: error the body stream so the
                // connection is aborted rather than ended cleanly.
                let _ = tx
                    .send(Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "upload failed before completion",
                    )))
                    .await;
            }
            ReadOutcome::SinkClosed => {
                debug!(path = %slab.path(), "client went away mid-download");
            }
        }
    });

    let body = Body::from_stream(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

/// Drop the current version. Idempotent.
pub async fn delete_file(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
) -> StatusCode {
    let path = normalize_path(&path);
    if state.repository.delete(&path) {
        info!(path = %path, "deleted");
    }
    StatusCode::NO_CONTENT
}
