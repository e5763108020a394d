//! Note lifecycle state machine.
//!
//! ```text
//!            create                 approve
//!   (none) ---------> pending ------------------> approved
//!                      ^  |  \                      |
//!               edit   |  |   \ reject              | approve / reject
//!                      |  v    v                    v
//!                     rejected <------------------ (any)
//! ```
//!
//! `is_deleted` is an orthogonal flag: once set, every transition here refuses the note.
//! Owner hard-delete is not a transition; it removes the row and its media outright.
//! Who may trigger each transition is decided by `policy`, not here.

use chrono::Utc;

use crate::models::{NoteStatus, TravelNote};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("travel note has been deleted")]
    Deleted,
    #[error("approved travel notes can no longer be edited")]
    EditLocked,
    #[error("a reject reason is required")]
    MissingReason,
}

/// NoteEdit
///
/// The owner-supplied replacement content. `images`/`video` are `Some` only when new
/// files were uploaded for that field; `None` keeps what the note already has.
#[derive(Debug, Clone, Default)]
pub struct NoteEdit {
    pub title: String,
    pub content: String,
    pub images: Option<Vec<String>>,
    pub video: Option<String>,
}

/// Fails if the note is soft-deleted.
pub fn ensure_live(note: &TravelNote) -> Result<(), TransitionError> {
    if note.is_deleted {
        Err(TransitionError::Deleted)
    } else {
        Ok(())
    }
}

/// Fails unless the owner may still edit the note.
pub fn ensure_editable(note: &TravelNote) -> Result<(), TransitionError> {
    ensure_live(note)?;
    if note.status == NoteStatus::Approved {
        return Err(TransitionError::EditLocked);
    }
    Ok(())
}

/// pending|rejected -> pending. Replaces the content in place and clears the reject reason.
pub fn edit(note: &mut TravelNote, change: NoteEdit) -> Result<(), TransitionError> {
    ensure_editable(note)?;

    note.title = change.title;
    note.content = change.content;
    if let Some(images) = change.images {
        note.images = images;
    }
    if let Some(video) = change.video {
        note.video = Some(video);
    }
    note.status = NoteStatus::Pending;
    note.reject_reason = None;
    note.updated_at = Utc::now();
    Ok(())
}

/// any -> approved. Re-approving simply reapplies the terminal fields.
pub fn approve(note: &mut TravelNote) -> Result<(), TransitionError> {
    ensure_live(note)?;
    note.status = NoteStatus::Approved;
    note.reject_reason = None;
    note.updated_at = Utc::now();
    Ok(())
}

/// any -> rejected. A blank reason counts as missing; otherwise it is stored verbatim.
pub fn reject(note: &mut TravelNote, reason: Option<&str>) -> Result<(), TransitionError> {
    ensure_live(note)?;
    let reason = reason
        .filter(|r| !r.trim().is_empty())
        .ok_or(TransitionError::MissingReason)?;
    note.status = NoteStatus::Rejected;
    note.reject_reason = Some(reason.to_string());
    note.updated_at = Utc::now();
    Ok(())
}

/// Hides the note without touching its status or media.
pub fn soft_delete(note: &mut TravelNote) -> Result<(), TransitionError> {
    ensure_live(note)?;
    note.is_deleted = true;
    note.updated_at = Utc::now();
    Ok(())
}

/// `reject_reason` is present iff the status is rejected.
pub fn reject_reason_consistent(note: &TravelNote) -> bool {
    (note.status == NoteStatus::Rejected) == note.reject_reason.is_some()
}
