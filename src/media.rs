//! Media lifecycle manager.
//!
//! Ties stored files to the document fields that reference them. A file is written only
//! after the upload has been validated, and removed as soon as no document field points
//! at it any more:
//!
//! - **create**: images are mandatory; nothing is written when they are missing.
//! - **replace**: new files are stored first, the note is saved, then the superseded files
//!   are swept ([`MediaManager::commit`]). If the save fails the new files are swept
//!   instead ([`MediaManager::rollback`]). Images and video are replaced independently.
//! - **delete**: every referenced file is removed, best-effort.
//!
//! Removal never fails the calling operation; a missing file is not an error.

use axum::body::Bytes;
use chrono::Utc;
use rand::Rng;
use std::path::Path;

use crate::{
    models::TravelNote,
    storage::{StorageError, StorageState},
};

/// Sentinel stored in `users.avatar` until a real avatar is uploaded. Never removed.
pub const DEFAULT_AVATAR: &str = "default-avatar.png";

/// Per-file size cap for every upload field.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "wmv"];

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("at least one image is required")]
    NoImages,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// MediaKind
///
/// The upload fields, each with its own allow-list and file-count limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Avatar,
    Image,
    Video,
}

impl MediaKind {
    pub fn field_name(self) -> &'static str {
        match self {
            MediaKind::Avatar => "avatar",
            MediaKind::Image => "images",
            MediaKind::Video => "video",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "avatar" => Some(MediaKind::Avatar),
            "images" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Avatar | MediaKind::Image => IMAGE_EXTENSIONS,
            MediaKind::Video => VIDEO_EXTENSIONS,
        }
    }

    pub fn max_count(self) -> usize {
        match self {
            MediaKind::Image => 10,
            MediaKind::Avatar | MediaKind::Video => 1,
        }
    }

    pub fn accepts(self, original_name: &str) -> bool {
        extension_of(original_name)
            .is_some_and(|ext| self.allowed_extensions().contains(&ext.as_str()))
    }
}

/// IncomingFile
///
/// An uploaded file, validated and buffered in memory but not stored yet.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub kind: MediaKind,
    pub original_name: String,
    pub bytes: Bytes,
}

/// NoteUploads
///
/// The file part of a create or edit request.
#[derive(Debug, Clone, Default)]
pub struct NoteUploads {
    pub images: Vec<IncomingFile>,
    pub video: Option<IncomingFile>,
}

/// The lower-cased extension of a client-supplied file name, if it has a plain one.
pub fn extension_of(original_name: &str) -> Option<String> {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
}

/// generate_file_name
///
/// `<unix millis>-<random 0..1e9>.<ext>`. The client's name contributes only its
/// extension, so stored names cannot collide with or traverse out of the upload directory.
pub fn generate_file_name(original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    match extension_of(original_name) {
        Some(ext) => format!("{millis}-{suffix}.{ext}"),
        None => format!("{millis}-{suffix}"),
    }
}

/// StoredMedia
///
/// File names for a note that is about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    pub images: Vec<String>,
    pub video: Option<String>,
}

impl StoredMedia {
    pub fn all(&self) -> Vec<String> {
        self.images.iter().cloned().chain(self.video.clone()).collect()
    }
}

/// MediaReplacement
///
/// New files stored for an edit, plus the files they supersede once the edit is saved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaReplacement {
    pub images: Option<Vec<String>>,
    pub video: Option<String>,
    superseded: Vec<String>,
}

impl MediaReplacement {
    pub fn stored(&self) -> Vec<String> {
        self.images
            .iter()
            .flatten()
            .cloned()
            .chain(self.video.clone())
            .collect()
    }

    pub fn superseded(&self) -> &[String] {
        &self.superseded
    }
}

/// MediaManager
///
/// Applies the file-side effects of note and avatar operations through the shared storage.
#[derive(Clone)]
pub struct MediaManager {
    storage: StorageState,
}

impl MediaManager {
    pub fn new(storage: StorageState) -> Self {
        Self { storage }
    }

    async fn store(&self, file: &IncomingFile) -> Result<String, StorageError> {
        let name = generate_file_name(&file.original_name);
        self.storage.put(&name, file.bytes.clone()).await?;
        Ok(name)
    }

    /// Stores every file or none: a failure part-way removes what was already written.
    async fn store_all(&self, files: &[IncomingFile]) -> Result<Vec<String>, MediaError> {
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            match self.store(file).await {
                Ok(name) => stored.push(name),
                Err(e) => {
                    self.purge(&stored).await;
                    return Err(e.into());
                }
            }
        }
        Ok(stored)
    }

    /// Stores the media of a new note. Fails with `NoImages` before writing anything.
    pub async fn store_for_new_note(&self, uploads: NoteUploads) -> Result<StoredMedia, MediaError> {
        if uploads.images.is_empty() {
            return Err(MediaError::NoImages);
        }
        let images = self.store_all(&uploads.images).await?;
        let video = match &uploads.video {
            Some(file) => match self.store(file).await {
                Ok(name) => Some(name),
                Err(e) => {
                    self.purge(&images).await;
                    return Err(e.into());
                }
            },
            None => None,
        };
        Ok(StoredMedia { images, video })
    }

    /// Stores the files of an edit and works out which of the note's current files they replace.
    pub async fn stage_replacement(
        &self,
        note: &TravelNote,
        uploads: NoteUploads,
    ) -> Result<MediaReplacement, MediaError> {
        let mut replacement = MediaReplacement::default();

        if !uploads.images.is_empty() {
            replacement.images = Some(self.store_all(&uploads.images).await?);
            replacement.superseded.extend(note.images.iter().cloned());
        }

        if let Some(file) = &uploads.video {
            match self.store(file).await {
                Ok(name) => {
                    replacement.video = Some(name);
                    replacement.superseded.extend(note.video.iter().cloned());
                }
                Err(e) => {
                    self.purge(&replacement.stored()).await;
                    return Err(e.into());
                }
            }
        }

        Ok(replacement)
    }

    /// The edit was saved: sweep the files it superseded.
    pub async fn commit(&self, replacement: &MediaReplacement) {
        self.purge(replacement.superseded()).await;
    }

    /// The edit was not saved: sweep the files staged for it.
    pub async fn rollback(&self, replacement: &MediaReplacement) {
        self.purge(&replacement.stored()).await;
    }

    /// Best-effort removal. Missing files and storage faults are logged, never returned.
    /// Returns how many files were actually removed.
    pub async fn purge(&self, names: &[String]) -> usize {
        let mut removed = 0;
        for name in names {
            match self.storage.remove(name).await {
                Ok(true) => removed += 1,
                Ok(false) => tracing::debug!(file = %name, "file already absent"),
                Err(e) => tracing::warn!(file = %name, error = %e, "failed to remove file"),
            }
        }
        removed
    }

    pub async fn store_avatar(&self, file: &IncomingFile) -> Result<String, MediaError> {
        Ok(self.store(file).await?)
    }

    /// Removes a replaced avatar. The default sentinel is never touched.
    pub async fn retire_avatar(&self, old: &str) {
        if old == DEFAULT_AVATAR {
            return;
        }
        self.purge(&[old.to_string()]).await;
    }
}
