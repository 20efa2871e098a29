use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::Multipart;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use agora_db::models::ImageRow;

use crate::error::ApiError;

/// URL segment the upload directory is served under.
pub const URL_PREFIX: &str = "uploads";

/// One file pulled out of a multipart submission.
pub struct UploadFile {
    pub name: Option<String>,
    pub data: Bytes,
}

/// On-disk blob store for image attachments. Every blob gets a fresh
/// UUID-prefixed name, so concurrent uploads cannot collide.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating upload directory {}", dir.display()))?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Write a blob and return its stored reference, e.g. `uploads/<name>`.
    pub async fn save(&self, original_name: Option<&str>, data: &[u8]) -> Result<String> {
        let file_name = match original_name {
            Some(name) if !name.is_empty() => {
                format!("{}_{}", Uuid::new_v4(), sanitize_file_name(name))
            }
            _ => Uuid::new_v4().to_string(),
        };
        let full = self.dir.join(&file_name);
        let mut file = tokio::fs::File::create(&full)
            .await
            .with_context(|| format!("creating {}", full.display()))?;
        file.write_all(data)
            .await
            .with_context(|| format!("writing {}", full.display()))?;
        Ok(format!("{}/{}", URL_PREFIX, file_name))
    }

    /// Best-effort blob removal after a cascade has committed. Failures are
    /// logged, never surfaced: the rows are already gone.
    pub async fn remove(&self, stored_path: &str) {
        let Some(file_name) = Path::new(stored_path).file_name() else {
            warn!("Refusing to remove malformed image path '{}'", stored_path);
            return;
        };
        let full = self.dir.join(file_name);
        if let Err(e) = tokio::fs::remove_file(&full).await {
            warn!("Failed to remove image blob {}: {}", full.display(), e);
        }
    }
}

/// Keep uploaded filenames readable but path- and shell-safe.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Split a multipart submission into its text fields and file parts.
/// Empty file parts are skipped; unknown text fields are kept for the
/// caller to pick over.
pub(crate) async fn collect_multipart(
    mut multipart: Multipart,
) -> Result<(HashMap<String, String>, Vec<UploadFile>), ApiError> {
    let mut fields = HashMap::new();
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "files" {
            let file_name = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?;
            if !data.is_empty() {
                files.push(UploadFile {
                    name: file_name,
                    data,
                });
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?;
            fields.insert(name, value);
        }
    }
    Ok((fields, files))
}

/// Persist the uploaded files and build their image rows, linked to either
/// a question or an answer.
pub(crate) async fn store_images(
    store: &ImageStore,
    files: &[UploadFile],
    question_id: Option<&str>,
    answer_id: Option<&str>,
) -> Result<Vec<ImageRow>, ApiError> {
    let mut rows = Vec::with_capacity(files.len());
    for file in files {
        let path = store
            .save(file.name.as_deref(), &file.data)
            .await
            .map_err(ApiError::Internal)?;
        rows.push(ImageRow {
            id: Uuid::new_v4().to_string(),
            path,
            question_id: question_id.map(str::to_string),
            answer_id: answer_id.map(str::to_string),
            uploaded_at: Utc::now().to_rfc3339(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("photo.png"), "photo.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_file_name(".."), "file");
    }

    #[tokio::test]
    async fn save_and_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("uploads")).await.unwrap();

        let stored = store.save(Some("cat.png"), b"not really a png").await.unwrap();
        assert!(stored.starts_with("uploads/"));
        assert!(stored.ends_with("_cat.png"));

        let file_name = stored.strip_prefix("uploads/").unwrap();
        let on_disk = dir.path().join("uploads").join(file_name);
        assert!(on_disk.exists());

        store.remove(&stored).await;
        assert!(!on_disk.exists());

        // Removing again must not panic or error out.
        store.remove(&stored).await;
    }

    #[tokio::test]
    async fn nameless_uploads_still_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("uploads")).await.unwrap();
        let stored = store.save(None, b"bytes").await.unwrap();
        assert!(stored.starts_with("uploads/"));
    }
}
