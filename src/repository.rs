use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AuthorSummary, NewTravelNote, NewUser, NoteStatus, Page, PageRequest, TravelNote,
    TravelNoteView, User,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A unique constraint was violated; the message is safe to show to the caller.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// NoteWithAuthor
///
/// A note row joined with the public fields of its owner. This is the explicit
/// replacement for populating the `author` reference.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct NoteWithAuthor {
    #[sqlx(flatten)]
    pub note: TravelNote,
    pub author_nickname: String,
    pub author_avatar: String,
}

impl NoteWithAuthor {
    pub fn author(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.note.author_id,
            nickname: self.author_nickname.clone(),
            avatar: self.author_avatar.clone(),
        }
    }

    pub fn into_view(self) -> TravelNoteView {
        let author = self.author();
        TravelNoteView::new(self.note, author)
    }
}

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, allowing the handlers to
/// interact with the data layer without knowing the specific implementation.
///
/// Saves are plain read-modify-write: whoever writes last wins.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn nickname_taken(&self, nickname: &str) -> RepoResult<bool>;
    // Fails with `Conflict` on a duplicate username or nickname.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    // Returns false when the user no longer exists.
    async fn update_avatar(&self, user_id: Uuid, avatar: &str) -> RepoResult<bool>;

    // --- Notes ---
    async fn insert_note(&self, note: NewTravelNote) -> RepoResult<TravelNoteView>;
    // Raw lookup, soft-deleted notes included. Visibility is the caller's business.
    async fn find_note(&self, id: Uuid) -> RepoResult<Option<NoteWithAuthor>>;
    // Persists every mutable field of `note`. Returns None when the row is gone.
    async fn save_note(&self, note: &TravelNote) -> RepoResult<Option<TravelNoteView>>;
    async fn delete_note(&self, id: Uuid) -> RepoResult<bool>;

    // --- Listings (newest first, soft-deleted excluded) ---
    // Approved notes, optionally filtered by a case-insensitive match on title or author nickname.
    async fn list_public_notes(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepoResult<Page<TravelNoteView>>;
    async fn list_author_notes(&self, author_id: Uuid) -> RepoResult<Vec<TravelNoteView>>;
    async fn list_notes_by_status(
        &self,
        status: NoteStatus,
        page: PageRequest,
    ) -> RepoResult<Page<TravelNoteView>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Escapes LIKE wildcards so the search term matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn map_unique_violation(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let msg = match db.constraint() {
                Some("users_nickname_key") => "nickname already exists",
                _ => "username already exists",
            };
            return RepositoryError::Conflict(msg.to_string());
        }
    }
    RepositoryError::Database(err)
}

const USER_COLUMNS: &str =
    "id, username, password_hash, nickname, avatar, role, created_at, updated_at";

const NOTE_COLUMNS: &str = "n.id, n.title, n.content, n.images, n.video, n.author_id, n.status, \
     n.reject_reason, n.is_deleted, n.created_at, n.updated_at, \
     u.nickname AS author_nickname, u.avatar AS author_avatar";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends the public-listing filter shared by the page query and the count query.
    fn push_public_filter(builder: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
        builder.push(" WHERE n.status = 'approved' AND n.is_deleted = false");
        if let Some(search) = search {
            let pattern = like_pattern(search);
            builder.push(" AND (n.title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR u.nickname ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
    }

    async fn fetch_page(
        &self,
        mut rows: QueryBuilder<'_, Postgres>,
        mut count: QueryBuilder<'_, Postgres>,
        page: PageRequest,
    ) -> RepoResult<Page<TravelNoteView>> {
        rows.push(" ORDER BY n.created_at DESC, n.id DESC LIMIT ");
        rows.push_bind(page.limit);
        rows.push(" OFFSET ");
        rows.push_bind(page.offset());

        let items = rows
            .build_query_as::<NoteWithAuthor>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(NoteWithAuthor::into_view)
            .collect();
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(Page { items, total })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn nickname_taken(&self, nickname: &str) -> RepoResult<bool> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE nickname = $1)")
                .bind(nickname)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// create_user
    ///
    /// The unique constraints on `username` and `nickname` are the final word on duplicates;
    /// a violation surfaces as `RepositoryError::Conflict`.
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let query = format!(
            "INSERT INTO users (id, username, password_hash, nickname, avatar, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(user.password_hash.as_str())
            .bind(&user.nickname)
            .bind(&user.avatar)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn update_avatar(&self, user_id: Uuid, avatar: &str) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE users SET avatar = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(avatar)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// insert_note
    ///
    /// Uses a CTE to insert and join the author in one round trip. New notes start `pending`.
    async fn insert_note(&self, note: NewTravelNote) -> RepoResult<TravelNoteView> {
        let query = format!(
            "WITH n AS ( \
                INSERT INTO travel_notes (id, title, content, images, video, author_id) \
                VALUES ($1, $2, $3, $4, $5, $6) RETURNING * \
             ) \
             SELECT {NOTE_COLUMNS} FROM n JOIN users u ON u.id = n.author_id"
        );
        let row = sqlx::query_as::<_, NoteWithAuthor>(&query)
            .bind(Uuid::new_v4())
            .bind(&note.title)
            .bind(&note.content)
            .bind(&note.images)
            .bind(&note.video)
            .bind(note.author_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_view())
    }

    async fn find_note(&self, id: Uuid) -> RepoResult<Option<NoteWithAuthor>> {
        let query = format!(
            "SELECT {NOTE_COLUMNS} FROM travel_notes n JOIN users u ON u.id = n.author_id WHERE n.id = $1"
        );
        Ok(sqlx::query_as::<_, NoteWithAuthor>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn save_note(&self, note: &TravelNote) -> RepoResult<Option<TravelNoteView>> {
        let query = format!(
            "WITH n AS ( \
                UPDATE travel_notes \
                SET title = $2, content = $3, images = $4, video = $5, status = $6, \
                    reject_reason = $7, is_deleted = $8, updated_at = $9 \
                WHERE id = $1 RETURNING * \
             ) \
             SELECT {NOTE_COLUMNS} FROM n JOIN users u ON u.id = n.author_id"
        );
        let row = sqlx::query_as::<_, NoteWithAuthor>(&query)
            .bind(note.id)
            .bind(&note.title)
            .bind(&note.content)
            .bind(&note.images)
            .bind(&note.video)
            .bind(note.status)
            .bind(&note.reject_reason)
            .bind(note.is_deleted)
            .bind(note.updated_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(NoteWithAuthor::into_view))
    }

    async fn delete_note(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM travel_notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_public_notes(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepoResult<Page<TravelNoteView>> {
        let mut rows = QueryBuilder::new(format!(
            "SELECT {NOTE_COLUMNS} FROM travel_notes n JOIN users u ON u.id = n.author_id"
        ));
        Self::push_public_filter(&mut rows, search);

        let mut count = QueryBuilder::new(
            "SELECT COUNT(*) FROM travel_notes n JOIN users u ON u.id = n.author_id",
        );
        Self::push_public_filter(&mut count, search);

        self.fetch_page(rows, count, page).await
    }

    async fn list_author_notes(&self, author_id: Uuid) -> RepoResult<Vec<TravelNoteView>> {
        let query = format!(
            "SELECT {NOTE_COLUMNS} FROM travel_notes n JOIN users u ON u.id = n.author_id \
             WHERE n.author_id = $1 AND n.is_deleted = false \
             ORDER BY n.created_at DESC, n.id DESC"
        );
        let rows = sqlx::query_as::<_, NoteWithAuthor>(&query)
            .bind(author_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(NoteWithAuthor::into_view).collect())
    }

    async fn list_notes_by_status(
        &self,
        status: NoteStatus,
        page: PageRequest,
    ) -> RepoResult<Page<TravelNoteView>> {
        let mut rows = QueryBuilder::new(format!(
            "SELECT {NOTE_COLUMNS} FROM travel_notes n JOIN users u ON u.id = n.author_id"
        ));
        rows.push(" WHERE n.is_deleted = false AND n.status = ");
        rows.push_bind(status);

        let mut count = QueryBuilder::new(
            "SELECT COUNT(*) FROM travel_notes n WHERE n.is_deleted = false AND n.status = ",
        );
        count.push_bind(status);

        self.fetch_page(rows, count, page).await
    }
}

// --- In-memory implementation ---

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    // Insertion order; listings walk it backwards for newest-first.
    notes: Vec<TravelNote>,
}

impl MemoryState {
    fn author(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn joined(&self, note: &TravelNote) -> Option<NoteWithAuthor> {
        self.author(note.author_id).map(|author| NoteWithAuthor {
            note: note.clone(),
            author_nickname: author.nickname.clone(),
            author_avatar: author.avatar.clone(),
        })
    }

    fn newest_first(&self, keep: impl Fn(&NoteWithAuthor) -> bool) -> Vec<NoteWithAuthor> {
        self.notes
            .iter()
            .rev()
            .filter(|n| !n.is_deleted)
            .filter_map(|n| self.joined(n))
            .filter(|row| keep(row))
            .collect()
    }

    fn page(
        &self,
        page: PageRequest,
        keep: impl Fn(&NoteWithAuthor) -> bool,
    ) -> Page<TravelNoteView> {
        let matching = self.newest_first(keep);
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset().max(0) as usize)
            .take(page.limit.max(0) as usize)
            .map(NoteWithAuthor::into_view)
            .collect();
        Page { items, total }
    }
}

/// InMemoryRepository
///
/// A process-local implementation of the `Repository` contract, used by the test suite and
/// for running the service without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.state.read().await.author(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn nickname_taken(&self, nickname: &str) -> RepoResult<bool> {
        let state = self.state.read().await;
        Ok(state.users.iter().any(|u| u.nickname == nickname))
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(RepositoryError::Conflict("username already exists".to_string()));
        }
        if state.users.iter().any(|u| u.nickname == user.nickname) {
            return Err(RepositoryError::Conflict("nickname already exists".to_string()));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            password_hash: user.password_hash,
            nickname: user.nickname,
            avatar: user.avatar,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn update_avatar(&self, user_id: Uuid, avatar: &str) -> RepoResult<bool> {
        let mut state = self.state.write().await;
        match state.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.avatar = avatar.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_note(&self, note: NewTravelNote) -> RepoResult<TravelNoteView> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let created = TravelNote {
            id: Uuid::new_v4(),
            title: note.title,
            content: note.content,
            images: note.images,
            video: note.video,
            author_id: note.author_id,
            status: NoteStatus::Pending,
            reject_reason: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        let row = state
            .joined(&created)
            .ok_or_else(|| RepositoryError::Database(sqlx::Error::RowNotFound))?;
        state.notes.push(created);
        Ok(row.into_view())
    }

    async fn find_note(&self, id: Uuid) -> RepoResult<Option<NoteWithAuthor>> {
        let state = self.state.read().await;
        Ok(state
            .notes
            .iter()
            .find(|n| n.id == id)
            .and_then(|n| state.joined(n)))
    }

    async fn save_note(&self, note: &TravelNote) -> RepoResult<Option<TravelNoteView>> {
        let mut state = self.state.write().await;
        let Some(slot) = state.notes.iter_mut().find(|n| n.id == note.id) else {
            return Ok(None);
        };
        // `author_id` and `created_at` are immutable after creation.
        let author_id = slot.author_id;
        let created_at = slot.created_at;
        *slot = TravelNote {
            author_id,
            created_at,
            ..note.clone()
        };
        let saved = slot.clone();
        Ok(state.joined(&saved).map(NoteWithAuthor::into_view))
    }

    async fn delete_note(&self, id: Uuid) -> RepoResult<bool> {
        let mut state = self.state.write().await;
        let before = state.notes.len();
        state.notes.retain(|n| n.id != id);
        Ok(state.notes.len() < before)
    }

    async fn list_public_notes(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepoResult<Page<TravelNoteView>> {
        let needle = search.map(str::to_lowercase);
        let state = self.state.read().await;
        Ok(state.page(page, |row| {
            row.note.status == NoteStatus::Approved
                && needle.as_deref().is_none_or(|needle| {
                    row.note.title.to_lowercase().contains(needle)
                        || row.author_nickname.to_lowercase().contains(needle)
                })
        }))
    }

    async fn list_author_notes(&self, author_id: Uuid) -> RepoResult<Vec<TravelNoteView>> {
        let state = self.state.read().await;
        Ok(state
            .newest_first(|row| row.note.author_id == author_id)
            .into_iter()
            .map(NoteWithAuthor::into_view)
            .collect())
    }

    async fn list_notes_by_status(
        &self,
        status: NoteStatus,
        page: PageRequest,
    ) -> RepoResult<Page<TravelNoteView>> {
        let state = self.state.read().await;
        Ok(state.page(page, |row| row.note.status == status))
    }
}
