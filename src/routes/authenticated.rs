use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`. Ownership checks for edit and
/// delete happen in the handlers through the access policy.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /users/me
        .route("/users/me", get(handlers::get_me))
        // POST /users/avatar (multipart)
        // Replaces the caller's avatar and removes the previous file.
        .route("/users/avatar", post(handlers::upload_avatar))
        // POST /travel-notes (multipart)
        // Merges with the public GET on the same path.
        .route("/travel-notes", post(handlers::create_note))
        // GET /travel-notes/user
        // The caller's own notes in every status.
        .route("/travel-notes/user", get(handlers::list_my_notes))
        // GET/PUT/DELETE /travel-notes/{id}
        .route(
            "/travel-notes/{id}",
            get(handlers::get_note)
                .put(handlers::update_note)
                .delete(handlers::delete_note),
        )
}
