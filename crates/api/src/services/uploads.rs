//! Book cover uploads.
//!
//! Covers arrive as the `itemImage` field of a multipart form, are written to
//! the uploads directory as `{millis}-{sanitized name}` and served from
//! `/uploads`.

use std::path::Path;

use axum::body::Bytes;
use axum::extract::Multipart;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

/// Largest accepted cover image.
pub const MAX_COVER_BYTES: usize = 5 * 1024 * 1024;

/// Multipart field carrying the image.
pub const COVER_FIELD: &str = "itemImage";

/// URL prefix covers are served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

const MAX_NAME_CHARS: usize = 100;

/// Errors from reading or storing an upload. `Display` strings are
/// client-facing except for `Io`.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Please upload an image file")]
    MissingFile,

    #[error("Not an image! Please upload only images.")]
    NotAnImage,

    #[error("Image must be 5 MB or smaller")]
    TooLarge,

    #[error("Invalid upload: {0}")]
    Malformed(String),

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// An image read from the request, not yet stored.
#[derive(Debug, Clone)]
pub struct CoverUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl CoverUpload {
    /// # Errors
    ///
    /// Returns `UploadError::NotAnImage` unless the content type is `image/*`,
    /// `UploadError::MissingFile` for an empty body and
    /// `UploadError::TooLarge` above `MAX_COVER_BYTES`.
    pub fn validate(&self) -> Result<(), UploadError> {
        let is_image = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("image/"));
        if !is_image {
            return Err(UploadError::NotAnImage);
        }
        if self.bytes.is_empty() {
            return Err(UploadError::MissingFile);
        }
        if self.bytes.len() > MAX_COVER_BYTES {
            return Err(UploadError::TooLarge);
        }
        Ok(())
    }
}

/// Pull the `itemImage` field out of a multipart body. Other fields are
/// skipped.
///
/// # Errors
///
/// Returns `UploadError::MissingFile` if the field is absent and
/// `UploadError::Malformed` if the body cannot be parsed (including bodies
/// over the route's size limit).
pub async fn read_cover(multipart: &mut Multipart) -> Result<CoverUpload, UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Malformed(e.body_text()))?
    {
        if field.name() != Some(COVER_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| UploadError::Malformed(e.body_text()))?;

        return Ok(CoverUpload {
            file_name,
            content_type,
            bytes,
        });
    }

    Err(UploadError::MissingFile)
}

/// Validate and write `upload` into `dir`. Returns the public path.
///
/// # Errors
///
/// Returns a validation `UploadError`, or `UploadError::Io` if the file
/// cannot be written.
#[instrument(skip(upload), fields(size = upload.bytes.len()))]
pub async fn store_cover(dir: &Path, upload: &CoverUpload) -> Result<String, UploadError> {
    upload.validate()?;

    let name = cover_file_name(upload.file_name.as_deref().unwrap_or_default(), Utc::now());
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(&name), &upload.bytes).await?;

    tracing::info!(file = %name, "Cover stored");
    Ok(format!("{UPLOADS_ROUTE}/{name}"))
}

/// `{millis}-{sanitized original name}`.
#[must_use]
pub fn cover_file_name(original: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", now.timestamp_millis(), sanitize_file_name(original))
}

/// Reduce a client-supplied file name to a safe basename.
///
/// Directory parts are dropped, whitespace becomes `-`, anything outside
/// `[A-Za-z0-9._-]` is removed and leading dots are stripped.
#[must_use]
pub fn sanitize_file_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('-'),
            _ => None,
        })
        .take(MAX_NAME_CHARS)
        .collect();

    let trimmed = cleaned.trim_start_matches(['.', '-']);
    if trimmed.is_empty() {
        "cover".to_owned()
    } else {
        trimmed.to_owned()
    }
}
