//! Diagnostics endpoint
//!
//! Renders the repository snapshot and the event counters, as an HTML table
//! for browsers or as JSON when the client asks for it.

use axum::extract::Extension;
use axum::http::{header, HeaderMap};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;

use crate::server::AppState;
use crate::storage::{EntrySnapshot, MetricsSnapshot};

#[derive(Debug, Serialize)]
struct DiagnosticsReport {
    entries: Vec<EntrySnapshot>,
    metrics: MetricsSnapshot,
}

/// Serve the current repository snapshot.
pub async fn render_diagnostics(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let entries = state.repository.snapshot();
    let metrics = state.repository.metrics();

    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false);

    if wants_json {
        Json(DiagnosticsReport { entries, metrics }).into_response()
    } else {
        Html(render_html(&entries, &metrics)).into_response()
    }
}

fn render_html(entries: &[EntrySnapshot], metrics: &MetricsSnapshot) -> String {
    let mut out = String::new();
    out.push_str("<!doctype html><html><head><title>pipedrop diagnostics</title></head><body>");
    out.push_str("<h1>Stored files</h1>");
    out.push_str(
        "<table border=\"1\"><tr><th>path</th><th>content type</th><th>bytes</th>\
         <th>state</th><th>accesses</th><th>expires in</th></tr>",
    );
    for entry in entries {
        let state = if entry.failed {
            "failed"
        } else if entry.complete {
            "complete"
        } else {
            "uploading"
        };
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}s</td></tr>",
            escape(&entry.path),
            escape(&entry.content_type),
            entry.len,
            state,
            entry.access_count,
            entry.expires_in_secs,
        );
    }
    out.push_str("</table>");

    let _ = write!(
        out,
        "<h1>Counters</h1><ul>\
         <li>created: {}</li><li>overwritten: {}</li><li>deleted: {}</li>\
         <li>expired: {}</li><li>lookup hits: {}</li><li>lookup misses: {}</li>\
         <li>uploads completed: {}</li><li>uploads failed: {}</li></ul>",
        metrics.created,
        metrics.overwritten,
        metrics.deleted,
        metrics.expired,
        metrics.lookup_hits,
        metrics.lookup_misses,
        metrics.uploads_completed,
        metrics.uploads_failed,
    );
    out.push_str("</body></html>");
    out
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
