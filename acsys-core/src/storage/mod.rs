//! File storage providers.
//!
//! A provider turns a stored file path into a URL a client can fetch. The
//! local provider signs short-lived links served by [`StorageDriver::fetch_file`];
//! cloud providers hand out their own public object URLs.
//!
//! # Path Rules
//! Paths are relative, `/`-separated and may not climb out of the storage
//! root. Every provider applies [`validate_file_path`] before doing anything
//! else.

mod gcs;
mod local;

pub use gcs::GcsStorage;
pub use local::{FILE_ROUTE, LocalStorage};

use crate::Result;
use crate::config::StorageSettings;
use crate::error::AcsysError;
use crate::models::StorageType;
use crate::security::TokenIssuer;
use async_trait::async_trait;
use std::path::{Component, Path};
use std::sync::Arc;

/// Request for a retrievable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRequest {
    /// Relative path of the stored file
    pub path: String,
    /// Link lifetime; the configured default when absent
    pub expires_in: Option<chrono::Duration>,
}

impl StorageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expires_in: None,
        }
    }

    pub fn expires_in(mut self, lifetime: chrono::Duration) -> Self {
        self.expires_in = Some(lifetime);
        self
    }
}

/// File storage provider.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// URL from which the file can be retrieved.
    ///
    /// # Errors
    /// Returns `InvalidPath` for absolute or escaping paths.
    async fn get_storage_url(&self, request: &StorageRequest) -> Result<String>;

    /// Reads a stored file, checking the link that names it.
    ///
    /// Providers that serve files themselves reject this with
    /// `UnsupportedFeature`.
    async fn fetch_file(&self, path: &str, token: Option<&str>) -> Result<Vec<u8>> {
        let _ = (path, token);
        Err(AcsysError::unsupported_feature(
            "file retrieval",
            self.storage_type().to_string(),
        ))
    }

    fn storage_type(&self) -> StorageType;
}

/// Builds the provider selected by configuration.
///
/// # Errors
/// Returns `Configuration` if a cloud provider has no bucket.
pub fn create_storage(
    settings: &StorageSettings,
    tokens: TokenIssuer,
) -> Result<Arc<dyn StorageDriver>> {
    match settings.storage_type {
        StorageType::Local => Ok(Arc::new(LocalStorage::new(settings, tokens)?)),
        StorageType::Gcp => {
            let bucket = settings
                .bucket
                .as_deref()
                .filter(|bucket| !bucket.is_empty())
                .ok_or_else(|| AcsysError::configuration("storage.bucket is required for gcp storage"))?;
            Ok(Arc::new(GcsStorage::new(bucket)))
        }
    }
}

/// Rejects paths that are empty, absolute or contain `..`.
pub fn validate_file_path(path: &str) -> Result<()> {
    let invalid = || AcsysError::InvalidPath {
        path: path.to_string(),
    };

    if path.trim().is_empty() || path.contains('\0') || path.contains('\\') {
        return Err(invalid());
    }

    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid());
            }
        }
    }

    Ok(())
}
