//! Object storage gateway for original uploads and result bundles.
//!
//! Objects live under two prefixes: `uploads/<file name>` for the original upload and
//! `results/<stem>.json` for the generated bundle. Downloads go through provider-signed,
//! time-limited URLs; expiry is enforced by the provider.

use crate::config::StorageSettings;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use reqwest::Method;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Prefix holding original uploads.
pub const UPLOADS_PREFIX: &str = "uploads/";
/// Prefix holding JSON result bundles.
pub const RESULTS_PREFIX: &str = "results/";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors returned by the storage gateway.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage client could not be configured.
    #[error("Invalid storage configuration: {0}")]
    Configuration(String),
    /// Requested object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),
    /// Provider rejected or failed an operation.
    #[error("Storage operation failed: {0}")]
    Backend(#[source] object_store::Error),
    /// Reading the local file failed.
    #[error("Failed to read local file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON bundle could not be encoded or decoded.
    #[error("Invalid JSON object: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    fn from_store(remote_name: &str, error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { .. } => Self::NotFound(remote_name.to_string()),
            other => Self::Backend(other),
        }
    }
}

/// Uploads objects, reads JSON bundles, and mints signed URLs.
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn Signer>,
    signed_url_ttl: Duration,
}

impl StorageGateway {
    /// Assemble a gateway from an object store and a URL signer.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        signer: Arc<dyn Signer>,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            signer,
            signed_url_ttl,
        }
    }

    /// Gateway backed by a Cloudflare R2 bucket through its S3-compatible API.
    pub fn r2(settings: &StorageSettings) -> Result<Self, StorageError> {
        let bucket = AmazonS3Builder::new()
            .with_endpoint(settings.endpoint())
            .with_region("auto")
            .with_bucket_name(&settings.bucket_name)
            .with_access_key_id(&settings.access_key_id)
            .with_secret_access_key(&settings.secret_access_key)
            .build()
            .map_err(|error| StorageError::Configuration(error.to_string()))?;
        let bucket = Arc::new(bucket);
        tracing::debug!(
            endpoint = %settings.endpoint(),
            bucket = %settings.bucket_name,
            "Initialized R2 storage client"
        );
        Ok(Self::new(bucket.clone(), bucket, settings.signed_url_ttl()))
    }

    /// Default lifetime of URLs minted by [`StorageGateway::sign`].
    pub fn signed_url_ttl(&self) -> Duration {
        self.signed_url_ttl
    }

    /// Upload the file at `local_path` as `remote_name` in a single put.
    pub async fn store(
        &self,
        local_path: &Path,
        remote_name: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let bytes = tokio::fs::read(local_path).await?;
        self.put(remote_name, bytes, content_type).await
    }

    /// Serialize `value` and upload it as `remote_name`.
    pub async fn store_json<T: Serialize + Sync>(
        &self,
        remote_name: &str,
        value: &T,
    ) -> Result<String, StorageError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.put(remote_name, bytes, JSON_CONTENT_TYPE).await
    }

    /// Download and parse the JSON object stored as `remote_name`.
    pub async fn fetch_json(&self, remote_name: &str) -> Result<serde_json::Value, StorageError> {
        let location = ObjectPath::from(remote_name);
        let bytes = self
            .store
            .get(&location)
            .await
            .map_err(|error| StorageError::from_store(remote_name, error))?
            .bytes()
            .await
            .map_err(|error| StorageError::from_store(remote_name, error))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Mint a GET URL for `remote_name` valid for `ttl`.
    pub async fn sign(&self, remote_name: &str, ttl: Duration) -> Result<String, StorageError> {
        let location = ObjectPath::from(remote_name);
        let url = self
            .signer
            .signed_url(Method::GET, &location, ttl)
            .await
            .map_err(|error| StorageError::from_store(remote_name, error))?;
        tracing::debug!(
            object = remote_name,
            ttl_secs = ttl.as_secs(),
            "Signed URL minted"
        );
        Ok(url.to_string())
    }

    async fn put(
        &self,
        remote_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let location = ObjectPath::from(remote_name);
        let size = bytes.len();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&location, PutPayload::from(bytes), options)
            .await
            .map_err(|error| StorageError::from_store(remote_name, error))?;
        tracing::info!(
            object = remote_name,
            bytes = size,
            content_type,
            "Object stored"
        );
        Ok(remote_name.to_string())
    }
}

/// Final path component of a client-supplied file name, or `None` when nothing usable remains.
pub fn sanitize_file_name(file_name: &str) -> Option<String> {
    let last = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}

/// Object key for an original upload.
pub fn upload_key(file_name: &str) -> String {
    format!("{UPLOADS_PREFIX}{file_name}")
}

/// Object key for the result bundle of `file_name` (extension replaced with `.json`).
pub fn result_key(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(file_name);
    format!("{RESULTS_PREFIX}{stem}.json")
}
