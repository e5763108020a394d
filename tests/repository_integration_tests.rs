use travel_notes::{
    InMemoryRepository,
    lifecycle,
    models::{NewTravelNote, NewUser, NoteStatus, PageRequest, Role, TravelNoteView, User},
    repository::{PostgresRepository, Repository, RepositoryError},
};
use uuid::Uuid;

// --- Test Data Helpers ---

async fn create_user(repo: &dyn Repository, username: &str, nickname: &str) -> User {
    let new_user = NewUser::new(username, "secret123", nickname, Role::User)
        .await
        .unwrap();
    repo.create_user(new_user).await.unwrap()
}

async fn create_note(repo: &dyn Repository, author: &User, title: &str) -> TravelNoteView {
    repo.insert_note(NewTravelNote {
        title: title.to_string(),
        content: "content".to_string(),
        images: vec![format!("{title}.jpg")],
        video: None,
        author_id: author.id,
    })
    .await
    .unwrap()
}

async fn set_status(repo: &dyn Repository, id: Uuid, status: NoteStatus) {
    let mut note = repo.find_note(id).await.unwrap().unwrap().note;
    match status {
        NoteStatus::Approved => lifecycle::approve(&mut note).unwrap(),
        NoteStatus::Rejected => lifecycle::reject(&mut note, Some("not yet")).unwrap(),
        NoteStatus::Pending => {}
    }
    repo.save_note(&note).await.unwrap().unwrap();
}

async fn soft_delete(repo: &dyn Repository, id: Uuid) {
    let mut note = repo.find_note(id).await.unwrap().unwrap().note;
    lifecycle::soft_delete(&mut note).unwrap();
    repo.save_note(&note).await.unwrap().unwrap();
}

// --- In-memory contract ---

#[tokio::test]
async fn test_duplicate_username_and_nickname_conflict() {
    let repo = InMemoryRepository::new();
    create_user(&repo, "alice", "Alice").await;

    let dup_username = NewUser::new("alice", "secret123", "Other", Role::User).await.unwrap();
    let err = repo.create_user(dup_username).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(msg) if msg.contains("username")));

    let dup_nickname = NewUser::new("bob", "secret123", "Alice", Role::User).await.unwrap();
    let err = repo.create_user(dup_nickname).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(msg) if msg.contains("nickname")));

    assert!(repo.nickname_taken("Alice").await.unwrap());
    assert!(!repo.nickname_taken("Bob").await.unwrap());
}

#[tokio::test]
async fn test_insert_joins_author_public_fields() {
    let repo = InMemoryRepository::new();
    let alice = create_user(&repo, "alice", "Alice").await;

    let view = create_note(&repo, &alice, "Rome").await;

    assert_eq!(view.status, NoteStatus::Pending);
    assert_eq!(view.reject_reason, None);
    assert!(!view.is_deleted);
    assert_eq!(view.author.id, alice.id);
    assert_eq!(view.author.nickname, "Alice");
    assert_eq!(view.author.avatar, alice.avatar);
}

#[tokio::test]
async fn test_avatar_update_shows_in_joined_author() {
    let repo = InMemoryRepository::new();
    let alice = create_user(&repo, "alice", "Alice").await;
    let note = create_note(&repo, &alice, "Rome").await;

    assert!(repo.update_avatar(alice.id, "new-avatar.png").await.unwrap());
    assert!(!repo.update_avatar(Uuid::new_v4(), "x.png").await.unwrap());

    let row = repo.find_note(note.id).await.unwrap().unwrap();
    assert_eq!(row.author().avatar, "new-avatar.png");
}

#[tokio::test]
async fn test_public_listing_shows_only_live_approved_notes() {
    let repo = InMemoryRepository::new();
    let alice = create_user(&repo, "alice", "Alice").await;

    let approved = create_note(&repo, &alice, "Approved").await;
    let _pending = create_note(&repo, &alice, "Pending").await;
    let rejected = create_note(&repo, &alice, "Rejected").await;
    let hidden = create_note(&repo, &alice, "Hidden").await;
    set_status(&repo, approved.id, NoteStatus::Approved).await;
    set_status(&repo, rejected.id, NoteStatus::Rejected).await;
    set_status(&repo, hidden.id, NoteStatus::Approved).await;
    soft_delete(&repo, hidden.id).await;

    let page = repo
        .list_public_notes(None, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, approved.id);

    // Soft-deleted notes also leave the owner's own listing, but stay stored.
    let own = repo.list_author_notes(alice.id).await.unwrap();
    assert_eq!(own.len(), 3);
    assert!(own.iter().all(|n| n.id != hidden.id));
    assert!(repo.find_note(hidden.id).await.unwrap().unwrap().note.is_deleted);
}

#[tokio::test]
async fn test_public_search_matches_title_or_nickname_case_insensitively() {
    let repo = InMemoryRepository::new();
    let alice = create_user(&repo, "alice", "Wanderer").await;
    let bob = create_user(&repo, "bob", "Bob").await;

    for (author, title) in [(&alice, "Alps hike"), (&bob, "Paris cafe"), (&bob, "ALPS ski")] {
        let note = create_note(&repo, author, title).await;
        set_status(&repo, note.id, NoteStatus::Approved).await;
    }

    let alps = repo
        .list_public_notes(Some("alps"), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(alps.total, 2);

    let by_nickname = repo
        .list_public_notes(Some("wANDER"), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(by_nickname.total, 1);
    assert_eq!(by_nickname.items[0].title, "Alps hike");

    let none = repo
        .list_public_notes(Some("tokyo"), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(none.total, 0);
    assert!(none.items.is_empty());
}

#[tokio::test]
async fn test_pagination_is_newest_first_and_bounded() {
    let repo = InMemoryRepository::new();
    let alice = create_user(&repo, "alice", "Alice").await;
    let mut ids = Vec::new();
    for i in 0..7 {
        ids.push(create_note(&repo, &alice, &format!("note-{i}")).await.id);
    }

    let request = PageRequest::new(Some(1), Some(3));
    let first = repo
        .list_notes_by_status(NoteStatus::Pending, request)
        .await
        .unwrap();
    assert_eq!(first.total, 7);
    assert_eq!(request.total_pages(first.total), 3);
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.items[0].id, ids[6]);

    let last = repo
        .list_notes_by_status(NoteStatus::Pending, PageRequest::new(Some(3), Some(3)))
        .await
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].id, ids[0]);

    let beyond = repo
        .list_notes_by_status(NoteStatus::Pending, PageRequest::new(Some(9), Some(3)))
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 7);
}

#[tokio::test]
async fn test_save_and_delete() {
    let repo = InMemoryRepository::new();
    let alice = create_user(&repo, "alice", "Alice").await;
    let view = create_note(&repo, &alice, "Rome").await;

    let mut note = repo.find_note(view.id).await.unwrap().unwrap().note;
    note.author_id = Uuid::new_v4();
    note.title = "Rome, revisited".to_string();
    let saved = repo.save_note(&note).await.unwrap().unwrap();
    assert_eq!(saved.title, "Rome, revisited");
    // The owner never changes.
    assert_eq!(saved.author.id, alice.id);

    assert!(repo.delete_note(view.id).await.unwrap());
    assert!(repo.find_note(view.id).await.unwrap().is_none());
    assert!(!repo.delete_note(view.id).await.unwrap());
    assert!(repo.save_note(&note).await.unwrap().is_none());
}

// --- Postgres ---

async fn postgres_repository() -> PostgresRepository {
    dotenv::dotenv().ok();
    let db_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set to run integration tests");
    let pool = sqlx::PgPool::connect(&db_url)
        .await
        .expect("Failed to connect to database for integration tests.");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations.");
    PostgresRepository::new(pool)
}

#[tokio::test]
#[ignore = "requires a Postgres instance at DATABASE_URL"]
async fn test_postgres_note_lifecycle() {
    let repo = postgres_repository().await;
    // Unique per run so leftovers from earlier runs never collide.
    let tag = Uuid::new_v4().simple().to_string();
    let author = create_user(&repo, &format!("u{tag}"), &format!("n{tag}")).await;

    let view = create_note(&repo, &author, &format!("t{tag}")).await;
    assert_eq!(view.author.nickname, format!("n{tag}"));

    let not_yet = repo
        .list_public_notes(Some(&tag), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(not_yet.total, 0);

    set_status(&repo, view.id, NoteStatus::Rejected).await;
    let rejected = repo.find_note(view.id).await.unwrap().unwrap().note;
    assert_eq!(rejected.reject_reason.as_deref(), Some("not yet"));

    set_status(&repo, view.id, NoteStatus::Approved).await;
    let listed = repo
        .list_public_notes(Some(&tag.to_uppercase()), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].reject_reason, None);

    soft_delete(&repo, view.id).await;
    assert!(repo.list_author_notes(author.id).await.unwrap().is_empty());

    assert!(repo.delete_note(view.id).await.unwrap());
    assert!(repo.find_note(view.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a Postgres instance at DATABASE_URL"]
async fn test_postgres_unique_constraints_map_to_conflict() {
    let repo = postgres_repository().await;
    let tag = Uuid::new_v4().simple().to_string();
    create_user(&repo, &format!("u{tag}"), &format!("n{tag}")).await;

    let dup = NewUser::new(&format!("u{tag}"), "secret123", &format!("m{tag}"), Role::User)
        .await
        .unwrap();
    assert!(matches!(
        repo.create_user(dup).await,
        Err(RepositoryError::Conflict(msg)) if msg.contains("username")
    ));

    let dup = NewUser::new(&format!("v{tag}"), "secret123", &format!("n{tag}"), Role::User)
        .await
        .unwrap();
    assert!(matches!(
        repo.create_user(dup).await,
        Err(RepositoryError::Conflict(msg)) if msg.contains("nickname")
    ));
}

#[tokio::test]
#[ignore = "requires a Postgres instance at DATABASE_URL"]
async fn test_postgres_search_escapes_like_wildcards() {
    let repo = postgres_repository().await;
    let tag = Uuid::new_v4().simple().to_string();
    let author = create_user(&repo, &format!("u{tag}"), &format!("n{tag}")).await;
    let view = create_note(&repo, &author, &format!("100% {tag}")).await;
    set_status(&repo, view.id, NoteStatus::Approved).await;

    let literal = repo
        .list_public_notes(Some(&format!("100% {tag}")), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(literal.total, 1);

    let wildcard = repo
        .list_public_notes(Some(&format!("1_0% {tag}")), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(wildcard.total, 0);
}
