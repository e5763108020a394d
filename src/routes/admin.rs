use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, put},
};

/// Moderation Router Module
///
/// Nested under `/travel-notes/admin`. Reviewers and admins may list and judge notes;
/// only admins may soft-delete. Roles are checked by the access policy in each handler,
/// so a plain user gets 403 rather than 401.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /travel-notes/admin/pending?status=&page=&limit=
        .route("/pending", get(handlers::list_notes_by_status))
        // PUT /travel-notes/admin/approve/{id}
        .route("/approve/{id}", put(handlers::approve_note))
        // PUT /travel-notes/admin/reject/{id}
        .route("/reject/{id}", put(handlers::reject_note))
        // DELETE /travel-notes/admin/{id}
        // Soft delete: the note disappears from every read path, files are kept.
        .route("/{id}", delete(handlers::soft_delete_note))
}
