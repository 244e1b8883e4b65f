//! Media Service
//!
//! Content-addressed uploads on top of a [`Storage`] backend.

use std::sync::Arc;

use http::StatusCode;

use crate::models::{FileMetadata, UploadedFile};
use crate::utils::file::{
    compute_md5, extension_of, extract_image_dimensions, guess_extension, is_image,
    md5_filename, mime_type_of, stem_of,
};
use super::storage::{Storage, StorageError};

/// Media service error
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("File with key '{0}' already exists.")]
    Conflict(String),
    #[error("File not found")]
    NotFound(String),
    #[error("Failed to save file: {0}")]
    Internal(#[source] StorageError),
}

impl MediaError {
    /// HTTP status matching the error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Stores uploads under their MD5 digest and extracts metadata
pub struct MediaStorageService {
    storage: Arc<dyn Storage>,
}

impl MediaStorageService {
    /// Create a new media storage service
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Underlying backend
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Storage key for an upload: `{folder}/{md5}.{ext}`
    pub fn key_for(upload: &UploadedFile, md5: &str, folder: &str) -> String {
        let ext = extension_of(&upload.filename)
            .unwrap_or_else(|| guess_extension(upload.content_type.as_deref()));
        let filename = md5_filename(md5, &ext);

        let folder = folder.trim_matches('/');
        if folder.is_empty() {
            filename
        } else {
            format!("{}/{}", folder, filename)
        }
    }

    /// Save an upload and return its metadata
    pub async fn save(&self, upload: &UploadedFile, folder: &str) -> Result<FileMetadata, MediaError> {
        let md5 = compute_md5(&upload.data);
        let key = Self::key_for(upload, &md5, folder);

        let key = match self.storage.save(&key, &upload.data, false).await {
            Ok(stored) => stored,
            Err(StorageError::FileExists(_)) => {
                tracing::info!("Duplicate upload rejected: {}", key);
                return Err(MediaError::Conflict(key));
            }
            Err(e) => {
                tracing::error!("Failed to save {}: {}", key, e);
                return Err(MediaError::Internal(e));
            }
        };

        let mime_type = mime_type_of(&upload.filename, upload.content_type.as_deref(), &upload.data);

        let mut metadata = FileMetadata {
            key,
            title: stem_of(&upload.filename),
            size: upload.data.len() as u64,
            md5,
            mime_type,
            width: None,
            height: None,
        };

        if is_image(Some(&metadata.mime_type)) {
            let (width, height) = extract_image_dimensions(&upload.data);
            metadata.width = Some(width);
            metadata.height = Some(height);
        }

        tracing::debug!(key = %metadata.key, size = metadata.size, "Saved upload");
        Ok(metadata)
    }

    /// Delete a stored file
    pub async fn delete(&self, key: &str) -> Result<(), MediaError> {
        match self.storage.delete(key).await {
            Ok(()) => Ok(()),
            Err(StorageError::FileNotFound(_)) => Err(MediaError::NotFound(key.to_string())),
            Err(e) => Err(MediaError::Internal(e)),
        }
    }
}
