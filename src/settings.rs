//! FastCMS Settings

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logging::{parse_level, LoggingConfig};
use crate::migrate::{DEFAULT_ENV_FILE, DEFAULT_TOOL};
use crate::services::storage::{LocalStorage, Storage, StorageError, StorageResult};
use crate::utils::crypto::{get_random_string, CryptoError, HashingScheme, PasswordHasher, DEFAULT_ALLOWED_CHARS};
use crate::utils::jwt::{
    JwtAlgorithm, JwtError, JwtHandler, DEFAULT_ACCESS_TOKEN_MINUTES, DEFAULT_REFRESH_TOKEN_MINUTES,
};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "FASTCMS_";

/// Log level of the migration CLI unless configured
pub const MIGRATION_LOG_LEVEL: &str = "WARNING";

/// Settings error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    Env { key: String, value: String },
}

/// Connection settings for an S3-compatible service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    pub region_name: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Storage section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Storage backend (local, s3)
    pub backend: String,
    /// Path for local storage
    pub path: PathBuf,
    /// Base URL for stored files
    pub base_url: String,
    /// Public bucket (S3 only)
    pub public: bool,
    /// Key prefix (S3 only)
    pub prefix: Option<String>,
    pub s3: S3Settings,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            path: PathBuf::from("uploads"),
            base_url: "/media".to_string(),
            public: true,
            prefix: None,
            s3: S3Settings::default(),
        }
    }
}

/// JWT section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    pub secret: String,
    pub algorithm: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_minutes: i64,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: get_random_string(50, DEFAULT_ALLOWED_CHARS),
            algorithm: JwtAlgorithm::default().to_string(),
            access_token_expire_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_token_expire_minutes: DEFAULT_REFRESH_TOKEN_MINUTES,
        }
    }
}

/// Password hashing section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingSettings {
    pub scheme: String,
    pub bcrypt_cost: u32,
}

impl Default for HashingSettings {
    fn default() -> Self {
        Self {
            scheme: HashingScheme::default().to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Migration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// External migration tool
    pub tool: String,
    /// Env file loaded before running it
    pub env_file: PathBuf,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
        }
    }
}

/// FastCMS settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub jwt: JwtSettings,
    pub hashing: HashingSettings,
    pub logging: LoggingConfig,
    pub migration: MigrationSettings,
}

fn parse_env<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value,
    })
}

impl Settings {
    /// Load settings from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults overridden by `FASTCMS_*` variables, after loading `.env`
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut settings = Self::default();
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply overrides looked up by `get`
    pub fn apply_env<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            get(&key).map(|value| (key, value))
        };

        if let Some((_, v)) = var("STORAGE_BACKEND") {
            self.storage.backend = v;
        }
        if let Some((_, v)) = var("STORAGE_PATH") {
            self.storage.path = PathBuf::from(v);
        }
        if let Some((_, v)) = var("BASE_URL") {
            self.storage.base_url = v;
        }
        if let Some((k, v)) = var("STORAGE_PUBLIC") {
            self.storage.public = parse_env(&k, v)?;
        }
        if let Some((_, v)) = var("S3_ACCESS_KEY") {
            self.storage.s3.access_key = v;
        }
        if let Some((_, v)) = var("S3_SECRET_KEY") {
            self.storage.s3.secret_key = v;
        }
        if let Some((_, v)) = var("S3_BUCKET") {
            self.storage.s3.bucket_name = v;
        }
        if let Some((_, v)) = var("S3_REGION") {
            self.storage.s3.region_name = Some(v);
        }
        if let Some((_, v)) = var("S3_ENDPOINT") {
            self.storage.s3.endpoint_url = Some(v);
        }
        if let Some((_, v)) = var("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Some((_, v)) = var("JWT_ALGORITHM") {
            self.jwt.algorithm = v;
        }
        if let Some((k, v)) = var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            self.jwt.access_token_expire_minutes = parse_env(&k, v)?;
        }
        if let Some((k, v)) = var("REFRESH_TOKEN_EXPIRE_MINUTES") {
            self.jwt.refresh_token_expire_minutes = parse_env(&k, v)?;
        }
        if let Some((_, v)) = var("HASHING_SCHEME") {
            self.hashing.scheme = v;
        }
        if let Some((k, v)) = var("BCRYPT_COST") {
            self.hashing.bcrypt_cost = parse_env(&k, v)?;
        }
        if let Some((_, v)) = var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some((_, v)) = var("LOG_FILE") {
            self.logging.file = Some(PathBuf::from(v));
        }
        if let Some((_, v)) = var("MIGRATION_TOOL") {
            self.migration.tool = v;
        }

        Ok(())
    }

    /// Settings for the migration CLI. Environment overrides apply on top
    /// of the defaults, explicit `tool` and `log_level` flags win over both.
    pub fn for_migrations<F>(get: F, tool: Option<String>, log_level: Option<String>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        settings.logging.level = MIGRATION_LOG_LEVEL.to_string();
        settings.apply_env(|key| get(key).filter(|v| !v.is_empty()))?;

        if let Some(tool) = tool {
            settings.migration.tool = tool;
        }
        if let Some(level) = log_level {
            settings.logging.level = level;
        }
        Ok(settings)
    }

    /// Validate settings, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match self.storage.backend.as_str() {
            "local" => {
                if self.storage.path.as_os_str().is_empty() {
                    errors.push("Storage path cannot be empty".to_string());
                }
            }
            "s3" => {
                if self.storage.s3.bucket_name.is_empty() {
                    errors.push("S3 bucket name is required".to_string());
                }
                if self.storage.s3.access_key.is_empty() {
                    errors.push("S3 access key is required".to_string());
                }
                if self.storage.s3.secret_key.is_empty() {
                    errors.push("S3 secret key is required".to_string());
                }
            }
            other => errors.push(format!("Unknown storage backend: {}", other)),
        }

        if self.jwt.secret.is_empty() {
            errors.push("JWT secret cannot be empty".to_string());
        }
        if !JwtAlgorithm::is_valid(&self.jwt.algorithm) {
            errors.push(format!("Unsupported JWT algorithm: {}", self.jwt.algorithm));
        }
        if self.jwt.access_token_expire_minutes <= 0 {
            errors.push("Access token lifetime must be greater than 0".to_string());
        }
        if self.jwt.refresh_token_expire_minutes <= 0 {
            errors.push("Refresh token lifetime must be greater than 0".to_string());
        }

        if !HashingScheme::is_valid(&self.hashing.scheme) {
            errors.push(format!("Unsupported hashing scheme: {}", self.hashing.scheme));
        }
        if !(4..=31).contains(&self.hashing.bcrypt_cost) {
            errors.push("Bcrypt cost must be between 4 and 31".to_string());
        }

        if let Err(e) = parse_level(&self.logging.level) {
            errors.push(e.to_string());
        }

        if self.migration.tool.is_empty() {
            errors.push("Migration tool cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Password hasher for the configured scheme
    pub fn password_hasher(&self) -> Result<PasswordHasher, CryptoError> {
        Ok(PasswordHasher::from_name(&self.hashing.scheme)?.with_bcrypt_cost(self.hashing.bcrypt_cost))
    }

    /// JWT handler for the configured secret and lifetimes
    pub fn jwt_handler(&self) -> Result<JwtHandler, JwtError> {
        Ok(JwtHandler::with_lifetimes(
            &self.jwt.secret,
            self.jwt.algorithm.parse()?,
            self.jwt.access_token_expire_minutes,
            self.jwt.refresh_token_expire_minutes,
        ))
    }

    /// Build the configured storage backend
    pub async fn build_storage(&self) -> StorageResult<Arc<dyn Storage>> {
        match self.storage.backend.as_str() {
            "local" => Ok(Arc::new(LocalStorage::new(
                &self.storage.path,
                &self.storage.base_url,
            )?)),
            #[cfg(feature = "cloud-storage")]
            "s3" => Ok(Arc::new(
                crate::services::s3::S3Storage::new(
                    self.storage.s3.clone(),
                    self.storage.public,
                    self.storage.prefix.as_deref(),
                )
                .await,
            )),
            #[cfg(not(feature = "cloud-storage"))]
            "s3" => Err(StorageError::Unsupported(
                "S3 storage requires the cloud-storage feature".to_string(),
            )),
            other => Err(StorageError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.storage.backend, "local");
        assert_eq!(settings.jwt.secret.len(), 50);
        assert_eq!(settings.hashing.scheme, "argon2");
        assert_eq!(settings.migration.tool, "alembic");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut settings = Settings::default();
        settings.storage.backend = "s3".to_string();
        settings.jwt.secret.clear();
        settings.hashing.scheme = "sha1".to_string();
        settings.logging.level = "LOUD".to_string();

        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&"S3 bucket name is required".to_string()));
        assert!(errors.contains(&"Unsupported hashing scheme: sha1".to_string()));
    }

    #[test]
    fn test_load_and_save() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");

        let mut settings = Settings::default();
        settings.storage.base_url = "https://cdn.example.com".to_string();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{"hashing": {"scheme": "bcrypt"}}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.hashing.scheme, "bcrypt");
        assert_eq!(settings.hashing.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(settings.storage.backend, "local");

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_apply_env() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FASTCMS_STORAGE_BACKEND", "s3"),
            ("FASTCMS_S3_BUCKET", "media"),
            ("FASTCMS_ACCESS_TOKEN_EXPIRE_MINUTES", "15"),
            ("FASTCMS_MIGRATION_TOOL", "/usr/local/bin/alembic"),
        ]);

        let mut settings = Settings::default();
        settings
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.storage.backend, "s3");
        assert_eq!(settings.storage.s3.bucket_name, "media");
        assert_eq!(settings.jwt.access_token_expire_minutes, 15);
        assert_eq!(settings.migration.tool, "/usr/local/bin/alembic");

        let err = settings
            .apply_env(|key| (key == "FASTCMS_BCRYPT_COST").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { key, .. } if key == "FASTCMS_BCRYPT_COST"));
    }

    #[test]
    fn test_for_migrations_precedence() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FASTCMS_MIGRATION_TOOL", "custom-alembic"),
            ("FASTCMS_LOG_LEVEL", "DEBUG"),
        ]);
        let get = |key: &str| vars.get(key).map(|v| v.to_string());

        let settings = Settings::for_migrations(get, None, None).unwrap();
        assert_eq!(settings.migration.tool, "custom-alembic");
        assert_eq!(settings.logging.level, "DEBUG");

        let settings =
            Settings::for_migrations(get, Some("flyway".to_string()), Some("ERROR".to_string())).unwrap();
        assert_eq!(settings.migration.tool, "flyway");
        assert_eq!(settings.logging.level, "ERROR");

        let settings = Settings::for_migrations(|_| None, None, None).unwrap();
        assert_eq!(settings.migration.tool, "alembic");
        assert_eq!(settings.logging.level, MIGRATION_LOG_LEVEL);
    }

    #[test]
    fn test_for_migrations_reads_env_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        std::fs::write(&path, "FASTCMS_LOG_LEVEL=ERROR\nFASTCMS_MIGRATION_TOOL=from-env-file\n").unwrap();

        assert!(crate::migrate::load_env_file(&path));
        let settings = Settings::for_migrations(|key| std::env::var(key).ok(), None, None).unwrap();

        assert_eq!(settings.logging.level, "ERROR");
        assert_eq!(settings.migration.tool, "from-env-file");
    }

    #[test]
    fn test_builders() {
        let mut settings = Settings::default();
        settings.hashing.scheme = "bcrypt".to_string();
        settings.hashing.bcrypt_cost = 4;

        let hasher = settings.password_hasher().unwrap();
        assert_eq!(hasher.scheme(), HashingScheme::Bcrypt);
        let hashed = hasher.hash("secret").unwrap();
        assert!(hasher.verify("secret", &hashed));

        let jwt = settings.jwt_handler().unwrap();
        assert_eq!(jwt.algorithm(), JwtAlgorithm::Hs256);

        settings.jwt.algorithm = "RS512".to_string();
        assert!(settings.jwt_handler().is_err());
    }

    #[tokio::test]
    async fn test_build_local_storage() {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.storage.path = temp.path().join("media");

        let storage = settings.build_storage().await.unwrap();
        assert_eq!(storage.name(), "local");

        settings.storage.backend = "ftp".to_string();
        assert!(matches!(
            settings.build_storage().await,
            Err(StorageError::NotFound(backend)) if backend == "ftp"
        ));
    }
}
