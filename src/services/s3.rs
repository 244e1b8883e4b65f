//! S3-compatible storage backend

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;

use super::storage::{Storage, StorageError, StorageResult};
use crate::settings::S3Settings;

/// S3 storage backend
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    settings: S3Settings,
    public: bool,
    prefix: String,
}

impl S3Storage {
    /// Create a backend. Without an explicit prefix, public buckets use
    /// `public` and private ones `private`.
    pub async fn new(settings: S3Settings, public: bool, prefix: Option<&str>) -> Self {
        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "fastcms",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials);
        if let Some(region) = &settings.region_name {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.endpoint_url.is_some())
            .build();

        let prefix = match prefix {
            Some(p) => p.trim_end_matches('/').to_string(),
            None if public => "public".to_string(),
            None => "private".to_string(),
        };

        Self {
            client: Client::from_conf(config),
            settings,
            public,
            prefix,
        }
    }

    /// Key prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full object key for a name
    pub fn full_key(&self, name: &str) -> String {
        object_key(&self.prefix, name)
    }
}

/// Join a prefix and a name into a normalised object key
pub fn object_key(prefix: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    let joined = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[async_trait]
impl Storage for S3Storage {
    fn name(&self) -> &str {
        "s3"
    }

    async fn save(&self, name: &str, content: &[u8], overwrite: bool) -> StorageResult<String> {
        let key = self.full_key(name);

        if !overwrite && self.exists(&key).await? {
            return Err(StorageError::FileExists(key));
        }

        let content_type = mime_guess::from_path(name)
            .first_or_octet_stream()
            .to_string();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.settings.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(content.to_vec()));
        if self.public {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;

        tracing::debug!("Uploaded {} bytes to s3://{}/{}", content.len(), self.settings.bucket_name, key);
        Ok(key)
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        if !self.exists(name).await? {
            return Err(StorageError::FileNotFound(name.to_string()));
        }

        self.client
            .delete_object()
            .bucket(&self.settings.bucket_name)
            .key(name)
            .send()
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.settings.bucket_name)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Operation(service.to_string()))
                }
            }
        }
    }

    async fn url(&self, name: &str) -> StorageResult<String> {
        let endpoint = self
            .settings
            .endpoint_url
            .as_deref()
            .ok_or_else(|| StorageError::Configuration("endpoint_url is not set".to_string()))?;

        Ok(format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            self.settings.bucket_name,
            name.trim_start_matches('/')
        ))
    }

    async fn signed_url(&self, name: &str, expires: Duration) -> StorageResult<String> {
        let config = PresigningConfig::expires_in(expires)
            .map_err(|e| StorageError::Configuration(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.settings.bucket_name)
            .key(name)
            .presigned(config)
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    async fn size(&self, name: &str) -> StorageResult<u64> {
        match self
            .client
            .head_object()
            .bucket(&self.settings.bucket_name)
            .key(name)
            .send()
            .await
        {
            Ok(output) => Ok(output.content_length().unwrap_or(0).max(0) as u64),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Err(StorageError::FileNotFound(name.to_string()))
                } else {
                    Err(StorageError::Operation(service.to_string()))
                }
            }
        }
    }
}
