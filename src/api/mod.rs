/// API routes and handlers
pub mod content;
pub mod health;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
///
/// Content routes are served both at the root and under `/api/v1`.
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(content::routes())
        .nest("/api/v1", content::routes())
}
