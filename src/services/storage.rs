//! Storage Service
//!
//! Pluggable storage backends and the local filesystem backend.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;

/// Default lifetime of signed URLs
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage not found: {0}")]
    NotFound(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Folder not found: {0}")]
    FolderNotFound(String),
    #[error("File already exists: {0}")]
    FileExists(String),
    #[error("Folder already exists: {0}")]
    FolderExists(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Storage initialization failed: {0}")]
    Initialization(String),
    #[error("Storage misconfigured: {0}")]
    Configuration(String),
    #[error("Storage operation failed: {0}")]
    Operation(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Invalid file type: {0}")]
    InvalidFileType(String),
    #[error("Storage quota exceeded")]
    QuotaExceeded,
    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),
}

impl StorageError {
    /// Classify an IO error raised while working on `name`
    pub fn from_io(name: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(name.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(name.to_string()),
            std::io::ErrorKind::AlreadyExists => Self::FileExists(name.to_string()),
            _ => Self::Io(err),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Pluggable storage backend
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend name, e.g. `local` or `s3`
    fn name(&self) -> &str;

    /// Save content under a name and return the stored key
    async fn save(&self, name: &str, content: &[u8], overwrite: bool) -> StorageResult<String>;

    /// Delete a file
    async fn delete(&self, name: &str) -> StorageResult<()>;

    /// Check whether a file exists
    async fn exists(&self, name: &str) -> StorageResult<bool>;

    /// Public URL of a file
    async fn url(&self, name: &str) -> StorageResult<String>;

    /// Temporary signed URL. Backends without signing return the public URL.
    async fn signed_url(&self, name: &str, _expires: Duration) -> StorageResult<String> {
        self.url(name).await
    }

    /// Size of a file in bytes
    async fn size(&self, name: &str) -> StorageResult<u64>;
}

/// Local filesystem storage
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Base directory, every key lives below it
    base_path: PathBuf,
    /// Base URL, always ends with `/`
    base_url: String,
    /// Largest accepted file in bytes
    max_file_size: Option<u64>,
}

impl LocalStorage {
    /// Create a local storage, creating the base directory if needed
    pub fn new(base_path: impl AsRef<Path>, base_url: &str) -> StorageResult<Self> {
        std::fs::create_dir_all(base_path.as_ref())
            .map_err(|e| StorageError::Initialization(e.to_string()))?;
        let base_path = base_path
            .as_ref()
            .canonicalize()
            .map_err(|e| StorageError::Initialization(e.to_string()))?;

        Ok(Self {
            base_path,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            max_file_size: None,
        })
    }

    /// Reject files larger than `bytes`
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Base directory
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a key to a path below the base directory
    fn resolve_path(&self, name: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(name);
        let mut resolved = self.base_path.clone();

        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(name.to_string())),
            }
        }

        if resolved == self.base_path {
            return Err(StorageError::InvalidPath(name.to_string()));
        }

        Ok(resolved)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn save(&self, name: &str, content: &[u8], overwrite: bool) -> StorageResult<String> {
        let file_path = self.resolve_path(name)?;

        let size = content.len() as u64;
        if self.max_file_size.map_or(false, |max| size > max) {
            return Err(StorageError::FileTooLarge(size));
        }

        if !overwrite && fs::try_exists(&file_path).await? {
            return Err(StorageError::FileExists(name.to_string()));
        }

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(name, e))?;
        }

        fs::write(&file_path, content)
            .await
            .map_err(|e| StorageError::from_io(name, e))?;
        tracing::debug!("Stored {} bytes at {}", content.len(), file_path.display());

        let relative = file_path
            .strip_prefix(&self.base_path)
            .map_err(|_| StorageError::InvalidPath(name.to_string()))?;
        Ok(relative.to_string_lossy().replace('\\', "/"))
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        let file_path = self.resolve_path(name)?;

        if !fs::try_exists(&file_path).await? {
            return Err(StorageError::FileNotFound(name.to_string()));
        }

        fs::remove_file(&file_path)
            .await
            .map_err(|e| StorageError::from_io(name, e))?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let file_path = self.resolve_path(name)?;
        Ok(fs::try_exists(&file_path).await?)
    }

    async fn url(&self, name: &str) -> StorageResult<String> {
        Ok(format!("{}{}", self.base_url, name.trim_start_matches('/')))
    }

    async fn size(&self, name: &str) -> StorageResult<u64> {
        let file_path = self.resolve_path(name)?;

        match fs::metadata(&file_path).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(e) => Err(StorageError::from_io(name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_storage_save_and_size() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("media"), "/media").unwrap();

        let key = storage.save("docs/hello.txt", b"Hello, World!", false).await.unwrap();
        assert_eq!(key, "docs/hello.txt");
        assert!(storage.exists(&key).await.unwrap());
        assert_eq!(storage.size(&key).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn test_storage_overwrite() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media/").unwrap();

        storage.save("a.txt", b"one", false).await.unwrap();
        let err = storage.save("a.txt", b"two", false).await.unwrap_err();
        assert!(matches!(err, StorageError::FileExists(_)));

        storage.save("a.txt", b"three", true).await.unwrap();
        assert_eq!(storage.size("a.txt").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_storage_max_file_size() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media")
            .unwrap()
            .with_max_file_size(4);

        storage.save("small.txt", b"tiny", false).await.unwrap();
        assert!(matches!(
            storage.save("big.txt", b"too big", false).await,
            Err(StorageError::FileTooLarge(7))
        ));
        assert!(!storage.exists("big.txt").await.unwrap());
    }

    #[test]
    fn test_io_error_classification() {
        use std::io::{Error, ErrorKind};

        assert!(matches!(
            StorageError::from_io("a.txt", Error::from(ErrorKind::PermissionDenied)),
            StorageError::PermissionDenied(name) if name == "a.txt"
        ));
        assert!(matches!(
            StorageError::from_io("a.txt", Error::from(ErrorKind::NotFound)),
            StorageError::FileNotFound(_)
        ));
        assert!(matches!(
            StorageError::from_io("a.txt", Error::from(ErrorKind::Interrupted)),
            StorageError::Io(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_storage_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media").unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Root ignores directory permissions
        if std::fs::write(locked.join("write-check"), b"x").is_ok() {
            return;
        }

        assert!(matches!(
            storage.save("locked/a.txt", b"x", false).await,
            Err(StorageError::PermissionDenied(_))
        ));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_storage_delete() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media").unwrap();

        storage.save("delete-me.txt", b"Test data", false).await.unwrap();
        storage.delete("delete-me.txt").await.unwrap();

        assert!(!storage.exists("delete-me.txt").await.unwrap());
        assert!(matches!(
            storage.delete("delete-me.txt").await,
            Err(StorageError::FileNotFound(_))
        ));
        assert!(matches!(
            storage.size("delete-me.txt").await,
            Err(StorageError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_urls() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/media").unwrap();

        assert_eq!(storage.base_url(), "/media/");
        assert_eq!(storage.url("2024/a.png").await.unwrap(), "/media/2024/a.png");
        assert_eq!(
            storage.signed_url("a.png", DEFAULT_SIGNED_URL_EXPIRY).await.unwrap(),
            "/media/a.png"
        );
    }

    #[tokio::test]
    async fn test_storage_rejects_traversal() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("root"), "/media").unwrap();

        for name in ["../escape.txt", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(storage.save(name, b"x", false).await, Err(StorageError::InvalidPath(_))),
                "{name} should be rejected"
            );
        }
    }
}
