use axum::{
    Json,
    extract::{FromRequestParts, Multipart, Path, Query, State, rejection::JsonRejection},
    http::request::Parts,
};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, issue_token},
    error::{AppError, AppResult, ErrorResponse, FieldError},
    lifecycle::{self, NoteEdit},
    media::MediaManager,
    models::{
        AvatarResponse, LoginRequest, MessageResponse, NewTravelNote, NewUser, NotePage,
        NoteStatus, PageRequest, RejectRequest, Role, TokenResponse, TravelNoteView, UserProfile,
    },
    policy::{Operation, authorize},
    repository::NoteWithAuthor,
    upload::{NoteForm, RegisterForm, read_avatar},
};

// --- Extractors & Query Structs ---

/// NoteId
///
/// The `{id}` path segment of a note route. A segment that is not a UUID cannot name a
/// note, so it is rejected as not found rather than with axum's plain-text 400.
#[derive(Debug, Clone, Copy)]
pub struct NoteId(pub Uuid);

impl<S> FromRequestParts<S> for NoteId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::note_not_found())?;
        Ok(NoteId(id))
    }
}

/// Unparseable page numbers and sizes are treated as absent, so they take their defaults.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.trim().parse().ok()))
}

/// PublicNotesQuery
///
/// Query parameters of the public listing (GET /travel-notes).
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PublicNotesQuery {
    /// 1-based page number (default 1).
    #[serde(default, deserialize_with = "lenient_int")]
    pub page: Option<i64>,
    /// Page size (default 10).
    #[serde(default, deserialize_with = "lenient_int")]
    pub limit: Option<i64>,
    /// Case-insensitive match on title or author nickname.
    pub search: Option<String>,
}

/// StatusNotesQuery
///
/// Query parameters of the moderation queue (GET /travel-notes/admin/pending).
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusNotesQuery {
    /// pending | approved | rejected (default pending).
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub limit: Option<i64>,
}

/// Loads a note that is still live. Absent and soft-deleted notes are both "not found".
async fn load_live_note(state: &AppState, id: Uuid) -> AppResult<NoteWithAuthor> {
    state
        .repo
        .find_note(id)
        .await?
        .filter(|row| !row.note.is_deleted)
        .ok_or_else(AppError::note_not_found)
}

// --- User Handlers ---

/// register_user
///
/// [Public Route] Creates an account (multipart: `username`, `password`, `nickname`,
/// optional `avatar`) and signs the caller in.
#[utoipa::path(
    post,
    path = "/users/register",
    responses(
        (status = 200, description = "Registered", body = TokenResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 409, description = "Username or nickname taken", body = ErrorResponse)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<TokenResponse>> {
    let form = RegisterForm::read(multipart).await?;

    if state.repo.find_user_by_username(&form.username).await?.is_some() {
        return Err(AppError::Conflict("username already exists".to_string()));
    }
    if state.repo.nickname_taken(&form.nickname).await? {
        return Err(AppError::Conflict("nickname already exists".to_string()));
    }

    let mut new_user = NewUser::new(&form.username, &form.password, &form.nickname, Role::User).await?;

    let media = MediaManager::new(state.storage.clone());
    let stored_avatar = match &form.avatar {
        Some(file) => Some(media.store_avatar(file).await?),
        None => None,
    };
    if let Some(name) = &stored_avatar {
        new_user = new_user.with_avatar(name.clone());
    }

    let user = match state.repo.create_user(new_user).await {
        Ok(user) => user,
        Err(e) => {
            if let Some(name) = stored_avatar {
                media.purge(&[name]).await;
            }
            return Err(e.into());
        }
    };

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    let token = issue_token(&user, &state.config)?;
    Ok(Json(TokenResponse { token }))
}

/// login_user
///
/// [Public Route] Verifies credentials and issues a token. Unknown usernames and wrong
/// passwords produce the same answer.
#[utoipa::path(
    post,
    path = "/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = TokenResponse),
        (status = 400, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login_user(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    let Json(payload) = payload?;
    let mut errors = Vec::new();
    if payload.username.trim().is_empty() {
        errors.push(FieldError::new("username", "username is required"));
    }
    if payload.password.is_empty() {
        errors.push(FieldError::new("password", "password is required"));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let user = state
        .repo
        .find_user_by_username(payload.username.trim())
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !user.password_hash.verify(&payload.password).await? {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    let token = issue_token(&user, &state.config)?;
    Ok(Json(TokenResponse { token }))
}

/// get_me
///
/// [Authenticated Route] The caller's own profile, without the secret.
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    )
)]
pub async fn get_me(
    caller: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    let user = state
        .repo
        .find_user_by_id(caller.id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
    Ok(Json(user.profile()))
}

/// upload_avatar
///
/// [Authenticated Route] Replaces the caller's avatar (multipart field `avatar`). The old
/// file is removed once the new name is saved, unless it was the default sentinel.
#[utoipa::path(
    post,
    path = "/users/avatar",
    responses(
        (status = 200, description = "Avatar replaced", body = AvatarResponse),
        (status = 400, description = "Missing or invalid file", body = ErrorResponse)
    )
)]
pub async fn upload_avatar(
    caller: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<AvatarResponse>> {
    authorize(&caller, Operation::ReplaceAvatar, None).into_result()?;
    let file = read_avatar(multipart).await?;

    let user = state
        .repo
        .find_user_by_id(caller.id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

    let media = MediaManager::new(state.storage.clone());
    let new_avatar = media.store_avatar(&file).await?;

    match state.repo.update_avatar(user.id, &new_avatar).await {
        Ok(true) => {}
        Ok(false) => {
            media.purge(&[new_avatar]).await;
            return Err(AppError::NotFound("user not found".to_string()));
        }
        Err(e) => {
            media.purge(&[new_avatar]).await;
            return Err(e.into());
        }
    }
    media.retire_avatar(&user.avatar).await;

    tracing::info!(user_id = %user.id, avatar = %new_avatar, "avatar replaced");
    Ok(Json(AvatarResponse { avatar: new_avatar }))
}

// --- Travel Note Handlers ---

/// create_note
///
/// [Authenticated Route] Submits a note (multipart: `title`, `content`, 1-10 `images`,
/// optional `video`). New notes start out `pending`.
#[utoipa::path(
    post,
    path = "/travel-notes",
    responses(
        (status = 200, description = "Created", body = TravelNoteView),
        (status = 400, description = "Validation failed", body = ErrorResponse)
    )
)]
pub async fn create_note(
    caller: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<TravelNoteView>> {
    authorize(&caller, Operation::CreateNote, None).into_result()?;
    let form = NoteForm::read(multipart).await?;

    let media = MediaManager::new(state.storage.clone());
    let stored = media.store_for_new_note(form.uploads).await?;

    let new_note = NewTravelNote {
        title: form.title,
        content: form.content,
        images: stored.images.clone(),
        video: stored.video.clone(),
        author_id: caller.id,
    };

    match state.repo.insert_note(new_note).await {
        Ok(view) => {
            tracing::info!(note_id = %view.id, author_id = %caller.id, "travel note submitted");
            Ok(Json(view))
        }
        Err(e) => {
            media.purge(&stored.all()).await;
            Err(e.into())
        }
    }
}

/// list_public_notes
///
/// [Public Route] Approved, non-deleted notes, newest first.
#[utoipa::path(
    get,
    path = "/travel-notes",
    params(PublicNotesQuery),
    responses((status = 200, description = "Public notes", body = NotePage))
)]
pub async fn list_public_notes(
    State(state): State<AppState>,
    Query(query): Query<PublicNotesQuery>,
) -> AppResult<Json<NotePage>> {
    let page = PageRequest::new(query.page, query.limit);
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let notes = state.repo.list_public_notes(search, page).await?;
    Ok(Json(NotePage::new(notes, page)))
}

/// list_my_notes
///
/// [Authenticated Route] Every non-deleted note of the caller, whatever its status.
#[utoipa::path(
    get,
    path = "/travel-notes/user",
    responses((status = 200, description = "My notes", body = [TravelNoteView]))
)]
pub async fn list_my_notes(
    caller: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<TravelNoteView>>> {
    authorize(&caller, Operation::ListOwnNotes, None).into_result()?;
    Ok(Json(state.repo.list_author_notes(caller.id).await?))
}

/// get_note
///
/// [Authenticated Route] One note. Unapproved notes of other users answer 404, exactly
/// as if they did not exist, unless the caller may view unpublished notes.
#[utoipa::path(
    get,
    path = "/travel-notes/{id}",
    params(("id" = Uuid, Path, description = "Travel note ID")),
    responses(
        (status = 200, description = "Found", body = TravelNoteView),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_note(
    caller: AuthUser,
    State(state): State<AppState>,
    NoteId(id): NoteId,
) -> AppResult<Json<TravelNoteView>> {
    let row = load_live_note(&state, id).await?;
    authorize(&caller, Operation::ViewNote, Some(&row.note)).into_result()?;
    Ok(Json(row.into_view()))
}

/// update_note
///
/// [Authenticated Route] Owner edit. Allowed while pending or rejected; resets the note to
/// pending. Uploaded `images` replace all existing images, an uploaded `video` replaces
/// the existing video; fields without uploads keep their files.
#[utoipa::path(
    put,
    path = "/travel-notes/{id}",
    params(("id" = Uuid, Path, description = "Travel note ID")),
    responses(
        (status = 200, description = "Updated", body = TravelNoteView),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Note already approved", body = ErrorResponse)
    )
)]
pub async fn update_note(
    caller: AuthUser,
    State(state): State<AppState>,
    NoteId(id): NoteId,
    multipart: Multipart,
) -> AppResult<Json<TravelNoteView>> {
    let form = NoteForm::read(multipart).await?;
    let mut note = load_live_note(&state, id).await?.note;
    authorize(&caller, Operation::EditNote, Some(&note)).into_result()?;
    lifecycle::ensure_editable(&note)?;

    let media = MediaManager::new(state.storage.clone());
    let replacement = media.stage_replacement(&note, form.uploads).await?;

    let edit = NoteEdit {
        title: form.title,
        content: form.content,
        images: replacement.images.clone(),
        video: replacement.video.clone(),
    };
    if let Err(e) = lifecycle::edit(&mut note, edit) {
        media.rollback(&replacement).await;
        return Err(e.into());
    }

    match state.repo.save_note(&note).await {
        Ok(Some(view)) => {
            media.commit(&replacement).await;
            tracing::info!(note_id = %id, "travel note edited and resubmitted");
            Ok(Json(view))
        }
        Ok(None) => {
            media.rollback(&replacement).await;
            Err(AppError::note_not_found())
        }
        Err(e) => {
            media.rollback(&replacement).await;
            Err(e.into())
        }
    }
}

/// delete_note
///
/// [Authenticated Route] Owner hard-delete: removes the document, then every media file
/// it referenced.
#[utoipa::path(
    delete,
    path = "/travel-notes/{id}",
    params(("id" = Uuid, Path, description = "Travel note ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_note(
    caller: AuthUser,
    State(state): State<AppState>,
    NoteId(id): NoteId,
) -> AppResult<Json<MessageResponse>> {
    let note = state
        .repo
        .find_note(id)
        .await?
        .ok_or_else(AppError::note_not_found)?
        .note;
    authorize(&caller, Operation::DeleteNote, Some(&note)).into_result()?;

    if !state.repo.delete_note(id).await? {
        return Err(AppError::note_not_found());
    }
    let removed = MediaManager::new(state.storage.clone())
        .purge(&note.media_files())
        .await;

    tracing::info!(note_id = %id, files_removed = removed, "travel note deleted");
    Ok(Json(MessageResponse::new("travel note deleted")))
}

// --- Moderation Handlers ---

/// list_notes_by_status
///
/// [Reviewer/Admin Route] The moderation queue: non-deleted notes with the given status.
#[utoipa::path(
    get,
    path = "/travel-notes/admin/pending",
    params(StatusNotesQuery),
    responses(
        (status = 200, description = "Notes by status", body = NotePage),
        (status = 403, description = "Reviewer or admin role required", body = ErrorResponse)
    )
)]
pub async fn list_notes_by_status(
    caller: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<StatusNotesQuery>,
) -> AppResult<Json<NotePage>> {
    authorize(&caller, Operation::ListByStatus, None).into_result()?;

    let status = match query.status.as_deref() {
        None | Some("") => NoteStatus::Pending,
        Some(raw) => raw
            .parse::<NoteStatus>()
            .map_err(|msg| AppError::validation("status", &msg))?,
    };
    let page = PageRequest::new(query.page, query.limit);
    let notes = state.repo.list_notes_by_status(status, page).await?;
    Ok(Json(NotePage::new(notes, page)))
}

/// approve_note
///
/// [Reviewer/Admin Route] Marks a note approved and clears any reject reason.
#[utoipa::path(
    put,
    path = "/travel-notes/admin/approve/{id}",
    params(("id" = Uuid, Path, description = "Travel note ID")),
    responses(
        (status = 200, description = "Approved", body = TravelNoteView),
        (status = 403, description = "Reviewer or admin role required", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn approve_note(
    caller: AuthUser,
    State(state): State<AppState>,
    NoteId(id): NoteId,
) -> AppResult<Json<TravelNoteView>> {
    authorize(&caller, Operation::ApproveNote, None).into_result()?;
    let mut note = load_live_note(&state, id).await?.note;
    lifecycle::approve(&mut note)?;

    let view = state
        .repo
        .save_note(&note)
        .await?
        .ok_or_else(AppError::note_not_found)?;
    tracing::info!(note_id = %id, reviewer_id = %caller.id, "travel note approved");
    Ok(Json(view))
}

/// reject_note
///
/// [Reviewer/Admin Route] Marks a note rejected. `rejectReason` is required.
#[utoipa::path(
    put,
    path = "/travel-notes/admin/reject/{id}",
    params(("id" = Uuid, Path, description = "Travel note ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = TravelNoteView),
        (status = 400, description = "Missing reason", body = ErrorResponse),
        (status = 403, description = "Reviewer or admin role required", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn reject_note(
    caller: AuthUser,
    State(state): State<AppState>,
    NoteId(id): NoteId,
    payload: Result<Json<RejectRequest>, JsonRejection>,
) -> AppResult<Json<TravelNoteView>> {
    authorize(&caller, Operation::RejectNote, None).into_result()?;
    // A missing, non-JSON or mistyped body carries no reason either.
    let reason = payload
        .ok()
        .and_then(|Json(body)| body.reject_reason)
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| AppError::validation("rejectReason", "a reject reason is required"))?;

    let mut note = load_live_note(&state, id).await?.note;
    lifecycle::reject(&mut note, Some(&reason))?;

    let view = state
        .repo
        .save_note(&note)
        .await?
        .ok_or_else(AppError::note_not_found)?;
    tracing::info!(note_id = %id, reviewer_id = %caller.id, "travel note rejected");
    Ok(Json(view))
}

/// soft_delete_note
///
/// [Admin Route] Hides a note from every listing and fetch. Document and files are kept.
#[utoipa::path(
    delete,
    path = "/travel-notes/admin/{id}",
    params(("id" = Uuid, Path, description = "Travel note ID")),
    responses(
        (status = 200, description = "Hidden", body = MessageResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn soft_delete_note(
    caller: AuthUser,
    State(state): State<AppState>,
    NoteId(id): NoteId,
) -> AppResult<Json<MessageResponse>> {
    authorize(&caller, Operation::SoftDeleteNote, None).into_result()?;
    let mut note = load_live_note(&state, id).await?.note;
    lifecycle::soft_delete(&mut note)?;

    state
        .repo
        .save_note(&note)
        .await?
        .ok_or_else(AppError::note_not_found)?;
    tracing::info!(note_id = %id, admin_id = %caller.id, "travel note soft-deleted");
    Ok(Json(MessageResponse::new("travel note deleted")))
}
