//! PhotoPrism client: read-only access to albums, photos and album
//! membership, plus the local originals folder the photos are streamed from.

pub mod error;
pub mod payload;
pub mod types;

pub use error::SourceError;
pub use payload::AssetPayload;
pub use types::{Album, Photo, PhotoDetails};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::PhotoprismConfig;
use crate::retry::{self, RetryConfig};

/// Read side of the migration. Implemented by [`PhotoprismClient`]; tests
/// provide in-memory fakes.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// All albums of type `album`, in PhotoPrism's listing order.
    async fn list_albums(&self) -> Result<Vec<Album>, SourceError>;

    /// All photos stored under the primary file root, in listing order.
    async fn list_assets(&self) -> Result<Vec<Photo>, SourceError>;

    /// Titles of the albums a photo belongs to. Not part of the bulk
    /// listing, so this costs one request per photo.
    async fn asset_albums(&self, uid: &str) -> Result<Vec<String>, SourceError>;

    /// Stat the photo's original so it can be streamed with a known length.
    async fn stat_asset(&self, photo: &Photo) -> Result<AssetPayload, SourceError>;
}

/// Keep only photos from the primary root, preserving order.
pub fn primary_root_only(photos: Vec<Photo>) -> Vec<Photo> {
    let total = photos.len();
    let kept: Vec<Photo> = photos.into_iter().filter(Photo::is_primary_root).collect();
    if kept.len() < total {
        tracing::debug!(
            excluded = total - kept.len(),
            "Excluded photos outside the primary file root"
        );
    }
    kept
}

pub struct PhotoprismClient {
    client: Client,
    base_url: String,
    originals_dir: PathBuf,
    retry: RetryConfig,
}

impl std::fmt::Debug for PhotoprismClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoprismClient")
            .field("base_url", &self.base_url)
            .field("originals_dir", &self.originals_dir)
            .finish_non_exhaustive()
    }
}

impl PhotoprismClient {
    pub fn new(
        config: &PhotoprismConfig,
        timeout: Duration,
        retry: RetryConfig,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.access_token))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            originals_dir: PathBuf::from("/originals"),
            retry,
        })
    }

    pub fn with_originals_dir(mut self, originals_dir: PathBuf) -> Self {
        self.originals_dir = originals_dir;
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = self.api_url(path);
        retry::retry_transient(&self.retry, || self.get_json_once(&url)).await
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Http {
                source,
                url: url.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(|source| SourceError::Http {
            source,
            url: url.to_string(),
        })?;
        serde_json::from_str(&body).map_err(|source| SourceError::Decode {
            source,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl SourceApi for PhotoprismClient {
    async fn list_albums(&self) -> Result<Vec<Album>, SourceError> {
        self.get_json("/albums?count=-1&type=album").await
    }

    async fn list_assets(&self) -> Result<Vec<Photo>, SourceError> {
        let photos: Vec<Photo> = self.get_json("/photos?count=-1").await?;
        Ok(primary_root_only(photos))
    }

    async fn asset_albums(&self, uid: &str) -> Result<Vec<String>, SourceError> {
        let details: PhotoDetails = self.get_json(&format!("/photos/{}", uid)).await?;
        Ok(details.album_titles())
    }

    async fn stat_asset(&self, photo: &Photo) -> Result<AssetPayload, SourceError> {
        let Some(path) = photo.original_path(&self.originals_dir) else {
            return Err(SourceError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("unusable file name {:?} for photo {}", photo.file_name, photo.uid),
                ),
                path: self.originals_dir.clone(),
            });
        };
        AssetPayload::stat(path.clone())
            .await
            .map_err(|source| SourceError::Io { source, path })
    }
}
