//! Media Models

use serde::{Deserialize, Serialize};

/// An uploaded file as received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original filename
    pub filename: String,
    /// Content type declared by the client
    pub content_type: Option<String>,
    /// File content
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content_type: Option<&str>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.map(str::to_string),
            data,
        }
    }
}

/// Metadata of a stored file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Storage key
    pub key: String,
    /// Title, the original filename without extension
    pub title: String,
    /// Size in bytes
    pub size: u64,
    /// Hex MD5 digest of the content
    pub md5: String,
    /// MIME type
    pub mime_type: String,
    /// Image width, images only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Image height, images only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}
