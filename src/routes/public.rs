use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no token. The only note data exposed here is the approved,
/// non-deleted listing; the visibility filter lives in the repository query.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /users/register (multipart)
        .route("/users/register", post(handlers::register_user))
        // POST /users/login
        .route("/users/login", post(handlers::login_user))
        // GET /travel-notes?page=&limit=&search=
        .route("/travel-notes", get(handlers::list_public_notes))
}
