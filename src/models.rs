use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{credentials::HashedSecret, media::DEFAULT_AVATAR};

// --- Enumerations (Mapped to Postgres enum types) ---

/// Role
///
/// The RBAC field of a user. What each role may do is decided by `policy::Role::capabilities`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Reviewer,
    Admin,
}

/// NoteStatus
///
/// Moderation state of a travel note. Transitions live in `lifecycle`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "note_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum NoteStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::str::FromStr for NoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NoteStatus::Pending),
            "approved" => Ok(NoteStatus::Approved),
            "rejected" => Ok(NoteStatus::Rejected),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical identity record from the `users` table. Never serialized: the public
/// projections are `UserProfile` and `AuthorSummary`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: HashedSecret,
    pub nickname: String,
    // Stored file name, or the `DEFAULT_AVATAR` sentinel.
    pub avatar: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            avatar: self.avatar.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

/// NewUser
///
/// A user about to be inserted. The secret is hashed here, once, and never again.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: HashedSecret,
    pub nickname: String,
    pub avatar: String,
    pub role: Role,
}

impl NewUser {
    pub async fn new(
        username: &str,
        password: &str,
        nickname: &str,
        role: Role,
    ) -> Result<Self, crate::credentials::CredentialError> {
        Ok(Self {
            username: username.to_string(),
            password_hash: HashedSecret::hash(password).await?,
            nickname: nickname.to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
            role,
        })
    }

    pub fn with_avatar(mut self, avatar: String) -> Self {
        self.avatar = avatar;
        self
    }
}

/// TravelNote
///
/// A row of the `travel_notes` table. `reject_reason` is `Some` exactly when the status is
/// `Rejected`; `images` is never empty.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TravelNote {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub images: Vec<String>,
    pub video: Option<String>,
    pub author_id: Uuid,
    pub status: NoteStatus,
    pub reject_reason: Option<String>,
    pub is_deleted: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl TravelNote {
    pub fn media_files(&self) -> Vec<String> {
        self.images.iter().cloned().chain(self.video.clone()).collect()
    }
}

/// NewTravelNote
///
/// A note about to be inserted. Its media has already been stored.
#[derive(Debug, Clone)]
pub struct NewTravelNote {
    pub title: String,
    pub content: String,
    pub images: Vec<String>,
    pub video: Option<String>,
    pub author_id: Uuid,
}

/// AuthorSummary
///
/// The whitelisted public subset of a note's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub nickname: String,
    pub avatar: String,
}

/// TravelNoteView
///
/// A note joined with its author's public fields. This is what every note endpoint returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TravelNoteView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub images: Vec<String>,
    pub video: Option<String>,
    pub author: AuthorSummary,
    pub status: NoteStatus,
    pub reject_reason: Option<String>,
    pub is_deleted: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl TravelNoteView {
    pub fn new(note: TravelNote, author: AuthorSummary) -> Self {
        Self {
            id: note.id,
            title: note.title,
            content: note.content,
            images: note.images,
            video: note.video,
            author,
            status: note.status,
            reject_reason: note.reject_reason,
            is_deleted: note.is_deleted,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

// --- Pagination ---

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// PageRequest
///
/// A 1-based page number and a page size, both already normalised to positive values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Non-positive or missing values fall back to page 1 and the default page size.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// ceil(total / limit)
    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            // Never total + limit - 1: limit may be as large as i64::MAX.
            (total - 1) / self.limit + 1
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Page
///
/// One page of results plus the number of rows matching the filter overall.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// NotePage
///
/// Output schema of the paginated listings.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NotePage {
    pub travel_notes: Vec<TravelNoteView>,
    pub total_pages: i64,
    pub current_page: i64,
}

impl NotePage {
    pub fn new(page: Page<TravelNoteView>, request: PageRequest) -> Self {
        Self {
            total_pages: request.total_pages(page.total),
            current_page: request.page,
            travel_notes: page.items,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Input payload for `POST /users/login`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// RejectRequest
///
/// Input payload for `PUT /travel-notes/admin/reject/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RejectRequest {
    #[serde(default)]
    #[ts(optional)]
    pub reject_reason: Option<String>,
}

// --- Output Schemas ---

/// UserProfile
///
/// Output schema for `GET /users/me`. Contains everything but the secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AvatarResponse {
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
        }
    }
}
