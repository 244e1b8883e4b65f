//! FastCMS - Core building blocks for the FastCMS content management system
//!
//! FastCMS provides the pieces a CMS backend is assembled from:
//!
//! - **Migrations**: `fastcms-migrate` dispatches to an external schema migration tool
//! - **Logging**: one-shot `tracing` subscriber setup and named loggers
//! - **Storage Backends**: Local filesystem and S3-compatible
//! - **Media**: Content-addressed uploads with metadata extraction
//! - **Records**: Model mixins, schema derivation and a generic CRUD service
//! - **Security**: Password hashing (argon2, bcrypt) and JWT tokens
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fastcms::{MediaStorageService, Settings, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     fastcms::setup_logging(&settings.logging)?;
//!
//!     let media = MediaStorageService::new(settings.build_storage().await?);
//!     let data = std::fs::read("photo.jpg")?;
//!     let meta = media.save(&UploadedFile::new("photo.jpg", None, data), "images").await?;
//!     println!("Stored {} ({} bytes)", meta.key, meta.size);
//!     Ok(())
//! }
//! ```
//!
//! ## Records
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fastcms::{DbService, MemoryStore, Query};
//!
//! let posts = DbService::<Post>::new(Arc::new(MemoryStore::new()));
//! let recent = posts.filter(Query::new().lookup("is_published", true).order_by("-created_at")).await?;
//! ```

pub mod logging;
pub mod migrate;
pub mod models;
pub mod services;
pub mod settings;
pub mod utils;

// Re-exports
pub use logging::{get_logger, setup_logging, Logger, LoggingConfig, LoggingError};
pub use migrate::{run_cli, MigrateError, MigrationCommand, MigrationRunner, ProcessRunner};

pub use models::{
    CommonFields, FieldKind, FieldSpec, FileMetadata, Model, ModelSchema, Publishable, Schema,
    SoftDelete, Timestamps, UploadedFile,
};

pub use services::{
    DbError, DbService, DeleteMode, LocalStorage, MediaError, MediaStorageService, MemoryStore,
    Query, RecordStore, Storage, StorageError,
};

pub use settings::{ConfigError, Settings};

pub use utils::{
    current_time, get_random_string, slugify, HashingScheme, JwtAlgorithm, JwtHandler,
    PasswordHasher, TokenPayload,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
