//! Google Cloud Storage: public object URLs.

use super::{StorageDriver, StorageRequest, validate_file_path};
use crate::Result;
use crate::error::AcsysError;
use crate::models::StorageType;
use async_trait::async_trait;
use url::Url;

const GCS_ENDPOINT: &str = "https://storage.googleapis.com/";

/// Google Cloud Storage provider.
///
/// URLs are plain public object URLs, not signed URLs. They carry no expiry
/// and grant access only if the bucket or object is publicly readable.
/// Signing needs provider credentials, which this crate does not handle.
#[derive(Debug, Clone)]
pub struct GcsStorage {
    bucket: String,
}

impl GcsStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl StorageDriver for GcsStorage {
    /// Objects are served by the bucket itself, so `expires_in` is ignored.
    async fn get_storage_url(&self, request: &StorageRequest) -> Result<String> {
        validate_file_path(&request.path)?;

        let mut url = Url::parse(GCS_ENDPOINT)
            .map_err(|_| AcsysError::configuration("Invalid storage endpoint"))?;
        url.path_segments_mut()
            .map_err(|()| AcsysError::configuration("Invalid storage endpoint"))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(
                request
                    .path
                    .split('/')
                    .filter(|segment| !segment.is_empty() && *segment != "."),
            );

        Ok(url.to_string())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Gcp
    }
}
