//! FastCMS Services
//!
//! Storage backends, media uploads and generic record CRUD.

pub mod db;
pub mod media;
pub mod storage;
#[cfg(feature = "cloud-storage")]
pub mod s3;

pub use db::{DbError, DbService, DeleteMode, MemoryStore, Query, RecordStore, StoreError};
pub use media::{MediaError, MediaStorageService};
pub use storage::{LocalStorage, Storage, StorageError, StorageResult};
#[cfg(feature = "cloud-storage")]
pub use s3::S3Storage;
