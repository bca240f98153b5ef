//! Local directory storage with signed retrieval links.

use super::{StorageDriver, StorageRequest, validate_file_path};
use crate::Result;
use crate::config::StorageSettings;
use crate::error::AcsysError;
use crate::models::StorageType;
use crate::security::{MAX_LINK_TTL_SECS, TokenIssuer, constant_time_eq, expiry_after};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::PathBuf;
use url::Url;

/// Route the server exposes for file retrieval.
pub const FILE_ROUTE: &str = "api/getFile";

/// Serves files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: Url,
    public_files: bool,
    link_ttl: Duration,
    tokens: TokenIssuer,
}

impl LocalStorage {
    /// # Errors
    /// Returns `Configuration` for an unparseable base URL or a link
    /// lifetime outside `1..=MAX_LINK_TTL_SECS`.
    pub fn new(settings: &StorageSettings, tokens: TokenIssuer) -> Result<Self> {
        let mut base_url = Url::parse(&settings.base_url).map_err(|_| {
            AcsysError::configuration(format!(
                "storage.base_url is not a valid URL: {}",
                settings.base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AcsysError::configuration("storage.base_url cannot be a base URL"));
        }
        // Joining keeps any path prefix only when it ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let link_ttl = i64::try_from(settings.link_ttl_secs)
            .ok()
            .filter(|secs| (1..=MAX_LINK_TTL_SECS).contains(secs))
            .and_then(Duration::try_seconds)
            .ok_or_else(|| AcsysError::configuration("storage.link_ttl_secs is out of range"))?;

        Ok(Self {
            root: settings.root.clone(),
            base_url,
            public_files: settings.public_files,
            link_ttl,
            tokens,
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Whether a request may retrieve `path`.
    fn check_access(&self, path: &str, token: Option<&str>) -> Result<()> {
        match token {
            Some(token) => {
                let bound = self.tokens.resolve_file_link(token)?;
                if constant_time_eq(bound.as_bytes(), path.as_bytes()) {
                    Ok(())
                } else {
                    tracing::warn!("File link does not match the requested path");
                    Err(AcsysError::InvalidLink)
                }
            }
            None if self.public_files => Ok(()),
            None => {
                tracing::debug!("Refused unsigned file request");
                Err(AcsysError::InvalidLink)
            }
        }
    }

    /// Resolves `path` under the root, refusing symlinks that lead out of it.
    async fn resolve(&self, path: &str) -> Result<PathBuf> {
        let not_found = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AcsysError::not_found("file")
            } else {
                AcsysError::io("Failed to resolve file", e)
            }
        };

        let root = tokio::fs::canonicalize(&self.root).await.map_err(not_found)?;
        let full = tokio::fs::canonicalize(self.root.join(path))
            .await
            .map_err(not_found)?;

        if !full.starts_with(&root) {
            return Err(AcsysError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(full)
    }
}

#[async_trait]
impl StorageDriver for LocalStorage {
    async fn get_storage_url(&self, request: &StorageRequest) -> Result<String> {
        validate_file_path(&request.path)?;

        let lifetime = request.expires_in.unwrap_or(self.link_ttl);
        if lifetime <= Duration::zero() {
            return Err(AcsysError::invalid_query("Link lifetime must be positive"));
        }
        if lifetime.num_seconds() > MAX_LINK_TTL_SECS {
            return Err(AcsysError::invalid_query(format!(
                "Link lifetime cannot exceed {} seconds",
                MAX_LINK_TTL_SECS
            )));
        }
        let token = self
            .tokens
            .sign_file_link(&request.path, expiry_after(Utc::now(), lifetime)?)?;

        let mut url = self.base_url.join(FILE_ROUTE).map_err(|_| {
            AcsysError::configuration("storage.base_url cannot be joined with the file route")
        })?;
        url.query_pairs_mut()
            .append_pair("file", &request.path)
            .append_pair("token", &token);

        Ok(url.to_string())
    }

    async fn fetch_file(&self, path: &str, token: Option<&str>) -> Result<Vec<u8>> {
        validate_file_path(path)?;
        self.check_access(path, token)?;

        let full = self.resolve(path).await?;
        let bytes = tokio::fs::read(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AcsysError::not_found("file")
            } else {
                AcsysError::io("Failed to read file", e)
            }
        })?;

        tracing::debug!("Served {} bytes for '{}'", bytes.len(), path);
        Ok(bytes)
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Local
    }
}
