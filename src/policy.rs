//! Access policy.
//!
//! Every mutating entry point asks [`authorize`] before touching a note. Roles map to an
//! explicit capability set instead of scattered role comparisons, so `admin` holds the
//! reviewer capabilities because it lists them, not because of an implied hierarchy.

use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    models::{NoteStatus, Role, TravelNote},
};

/// Capability
///
/// A privilege beyond what every authenticated user has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Approve or reject submissions and browse them by status.
    ReviewNotes,
    /// Read notes that are not yet approved, regardless of owner.
    ViewUnpublished,
    /// Hide a note without removing it.
    SoftDeleteNotes,
}

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::User => &[],
            Role::Reviewer => &[Capability::ReviewNotes, Capability::ViewUnpublished],
            Role::Admin => &[
                Capability::ReviewNotes,
                Capability::ViewUnpublished,
                Capability::SoftDeleteNotes,
            ],
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Operation
///
/// The named operations the policy decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateNote,
    ListOwnNotes,
    ViewNote,
    EditNote,
    DeleteNote,
    ListByStatus,
    ApproveNote,
    RejectNote,
    SoftDeleteNote,
    ReplaceAvatar,
}

impl Operation {
    fn required_capability(self) -> Option<Capability> {
        match self {
            Operation::ListByStatus | Operation::ApproveNote | Operation::RejectNote => {
                Some(Capability::ReviewNotes)
            }
            Operation::SoftDeleteNote => Some(Capability::SoftDeleteNotes),
            _ => None,
        }
    }

    fn requires_ownership(self) -> bool {
        matches!(self, Operation::EditNote | Operation::DeleteNote)
    }
}

/// Decision
///
/// `Hidden` is a denial that must look exactly like the resource not existing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Forbidden(&'static str),
    Hidden,
}

impl Decision {
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Forbidden(msg) => Err(AppError::Forbidden(msg.to_string())),
            Decision::Hidden => Err(AppError::note_not_found()),
        }
    }
}

pub fn is_owner(caller_id: Uuid, note: &TravelNote) -> bool {
    caller_id == note.author_id
}

/// A note is visible when approved, to its owner, or to anyone allowed to see unpublished notes.
pub fn can_view(caller: &AuthUser, note: &TravelNote) -> bool {
    note.status == NoteStatus::Approved
        || is_owner(caller.id, note)
        || caller.role.can(Capability::ViewUnpublished)
}

/// Decides whether `caller` may perform `op`, against `note` when the operation targets one.
pub fn authorize(caller: &AuthUser, op: Operation, note: Option<&TravelNote>) -> Decision {
    if let Some(capability) = op.required_capability() {
        if !caller.role.can(capability) {
            return Decision::Forbidden(match capability {
                Capability::SoftDeleteNotes => "admin role required",
                _ => "reviewer or admin role required",
            });
        }
    }

    match (op, note) {
        (Operation::ViewNote, Some(note)) if !can_view(caller, note) => Decision::Hidden,
        (op, Some(note)) if op.requires_ownership() && !is_owner(caller.id, note) => {
            Decision::Forbidden("only the author may modify this travel note")
        }
        _ => Decision::Allow,
    }
}
