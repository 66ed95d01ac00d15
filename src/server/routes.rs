//! HTTP routes definition

use axum::routing::get;
use axum::Router;

use super::{diagnostics, handlers};

/// File exchange routes
///
/// - `POST   /files/{path}` - upload a new version
/// - `GET    /files/{path}` - download, following a live upload
/// - `DELETE /files/{path}` - drop the current version
pub fn file_routes() -> Router {
    Router::new().route(
        "/files/*path",
        get(handlers::download_file)
            .post(handlers::upload_file)
            .delete(handlers::delete_file),
    )
}

/// Diagnostics routes (other verbs get 405 from the method router)
pub fn diagnostics_routes() -> Router {
    Router::new().route("/diagnostics", get(diagnostics::render_diagnostics))
}
