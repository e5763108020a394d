//! Multipart receiver.
//!
//! Buffers a multipart body into text fields and [`IncomingFile`]s while enforcing, per
//! file field, the extension allow-list, the file-count limit and the 10 MB cap. Nothing
//! is written to storage here; a rejected request leaves no trace.

use axum::extract::{Multipart, multipart::Field};
use std::collections::HashMap;

use crate::{
    credentials::check_password_policy,
    error::{AppError, AppResult, FieldError},
    media::{IncomingFile, MAX_FILE_BYTES, MediaKind, NoteUploads},
};

/// Largest request body accepted on multipart routes: a full note at the size cap plus form overhead.
pub const MAX_REQUEST_BYTES: usize = 12 * MAX_FILE_BYTES + 1024 * 1024;

/// ParsedForm
///
/// The buffered content of a multipart body.
#[derive(Debug, Default)]
pub struct ParsedForm {
    texts: HashMap<String, String>,
    files: Vec<IncomingFile>,
}

impl ParsedForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str)
    }

    /// Removes and returns every file uploaded under `kind`'s field.
    pub fn take_files(&mut self, kind: MediaKind) -> Vec<IncomingFile> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.kind == kind);
        self.files = rest;
        taken
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::validation("form", &e.body_text())
}

async fn read_file(mut field: Field<'_>, kind: MediaKind, original_name: String) -> AppResult<IncomingFile> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > MAX_FILE_BYTES {
            return Err(AppError::validation(
                kind.field_name(),
                &format!("'{original_name}' exceeds the {} MB limit", MAX_FILE_BYTES / (1024 * 1024)),
            ));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(IncomingFile {
        kind,
        original_name,
        bytes: buf.into(),
    })
}

/// Reads the whole body, accepting file uploads only for the given fields.
pub async fn read_form(mut multipart: Multipart, accepted: &[MediaKind]) -> AppResult<ParsedForm> {
    let mut form = ParsedForm::default();
    let mut counts: HashMap<MediaKind, usize> = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(original_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await.map_err(multipart_error)?;
            form.texts.insert(name, value);
            continue;
        };

        // Browsers send an empty, unnamed part for a file input left blank.
        if original_name.is_empty() {
            continue;
        }

        let kind = MediaKind::from_field_name(&name)
            .filter(|kind| accepted.contains(kind))
            .ok_or_else(|| AppError::validation(&name, "unexpected file field"))?;

        if !kind.accepts(&original_name) {
            return Err(AppError::validation(
                kind.field_name(),
                &format!(
                    "unsupported file type '{original_name}'; allowed: {}",
                    kind.allowed_extensions().join(", ")
                ),
            ));
        }

        let count = counts.entry(kind).or_default();
        *count += 1;
        if *count > kind.max_count() {
            return Err(AppError::validation(
                kind.field_name(),
                &format!("at most {} file(s) allowed", kind.max_count()),
            ));
        }

        form.files.push(read_file(field, kind, original_name).await?);
    }

    Ok(form)
}

fn required_text(form: &ParsedForm, field: &str, msg: &str, errors: &mut Vec<FieldError>) -> String {
    match form.text(field).map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => {
            errors.push(FieldError::new(field, msg));
            String::new()
        }
    }
}

/// NoteForm
///
/// The create/edit request of a travel note.
#[derive(Debug)]
pub struct NoteForm {
    pub title: String,
    pub content: String,
    pub uploads: NoteUploads,
}

impl NoteForm {
    pub async fn read(multipart: Multipart) -> AppResult<Self> {
        let form = read_form(multipart, &[MediaKind::Image, MediaKind::Video]).await?;
        Self::from_parsed(form)
    }

    pub fn from_parsed(mut form: ParsedForm) -> AppResult<Self> {
        let mut errors = Vec::new();
        let title = required_text(&form, "title", "title must not be empty", &mut errors);
        let content = match form.text("content") {
            Some(value) if !value.trim().is_empty() => value.to_string(),
            _ => {
                errors.push(FieldError::new("content", "content must not be empty"));
                String::new()
            }
        };
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let images = form.take_files(MediaKind::Image);
        let video = form.take_files(MediaKind::Video).into_iter().next();
        Ok(Self {
            title,
            content,
            uploads: NoteUploads { images, video },
        })
    }
}

/// RegisterForm
///
/// The registration request: credentials, nickname and an optional avatar.
#[derive(Debug)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub nickname: String,
    pub avatar: Option<IncomingFile>,
}

impl RegisterForm {
    pub async fn read(multipart: Multipart) -> AppResult<Self> {
        let form = read_form(multipart, &[MediaKind::Avatar]).await?;
        Self::from_parsed(form)
    }

    pub fn from_parsed(mut form: ParsedForm) -> AppResult<Self> {
        let mut errors = Vec::new();
        let username = required_text(&form, "username", "username must not be empty", &mut errors);
        let nickname = required_text(&form, "nickname", "nickname must not be empty", &mut errors);
        let password = form.text("password").unwrap_or_default().to_string();
        errors.extend(check_password_policy(&password));
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let avatar = form.take_files(MediaKind::Avatar).into_iter().next();
        Ok(Self {
            username,
            password,
            nickname,
            avatar,
        })
    }
}

/// Reads the single required `avatar` file of `POST /users/avatar`.
pub async fn read_avatar(multipart: Multipart) -> AppResult<IncomingFile> {
    let mut form = read_form(multipart, &[MediaKind::Avatar]).await?;
    form.take_files(MediaKind::Avatar)
        .into_iter()
        .next()
        .ok_or_else(|| AppError::validation("avatar", "an avatar file is required"))
}
