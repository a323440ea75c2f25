//! Immich client: album listing and creation, asset upload with checksum
//! dedup, location backfill and album linking.

pub mod error;
pub mod types;

pub use error::DestinationError;
pub use types::{Album, ApiResponse, AssetUpload, UploadOutcome, DEVICE_ID};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};

use crate::config::ImmichConfig;
use crate::retry::{self, RetryConfig};
use types::{BulkIdsRequest, CreateAlbumRequest, UpdateLocationRequest, UploadResponse};

const API_KEY_HEADER: &str = "x-api-key";
const CHECKSUM_HEADER: &str = "x-immich-checksum";

/// Write side of the migration. Implemented by [`ImmichClient`]; tests
/// provide in-memory fakes.
///
/// Mutating calls return the HTTP status and body instead of failing on a
/// non-2xx answer so the caller can record it; only transport problems are
/// `Err`.
#[async_trait]
pub trait DestinationApi: Send + Sync {
    async fn list_albums(&self) -> Result<Vec<Album>, DestinationError>;

    async fn create_album(&self, name: &str) -> Result<ApiResponse, DestinationError>;

    async fn upload_asset(&self, upload: &AssetUpload) -> Result<UploadOutcome, DestinationError>;

    async fn update_asset_location(
        &self,
        asset_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<ApiResponse, DestinationError>;

    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<ApiResponse, DestinationError>;
}

pub struct ImmichClient {
    client: Client,
    base_url: String,
    upload_timeout: Duration,
    retry: RetryConfig,
}

impl std::fmt::Debug for ImmichClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmichClient")
            .field("base_url", &self.base_url)
            .field("upload_timeout", &self.upload_timeout)
            .finish_non_exhaustive()
    }
}

impl ImmichClient {
    pub fn new(
        config: &ImmichConfig,
        timeout: Duration,
        upload_timeout: Duration,
        retry: RetryConfig,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&config.api_key)?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            upload_timeout,
            retry,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Send a mutating request and capture its status and body.
    async fn send(&self, url: &str, request: RequestBuilder) -> Result<ApiResponse, DestinationError> {
        let response = request.send().await.map_err(|source| DestinationError::Http {
            source,
            url: url.to_string(),
        })?;
        let status = response.status().as_u16();
        let raw = response.text().await.map_err(|source| DestinationError::Http {
            source,
            url: url.to_string(),
        })?;
        Ok(ApiResponse::new(status, &raw))
    }

    async fn list_albums_once(&self, url: &str) -> Result<Vec<Album>, DestinationError> {
        tracing::debug!("GET {}", url);
        let response = self.send(url, self.client.get(url)).await?;
        if !response.is_success() {
            return Err(DestinationError::HttpStatus {
                status: response.status,
                url: url.to_string(),
            });
        }
        serde_json::from_value(response.body).map_err(|source| DestinationError::Decode {
            source,
            url: url.to_string(),
        })
    }

    async fn build_form(&self, upload: &AssetUpload) -> Result<Form, DestinationError> {
        let payload = &upload.payload;
        let body = payload
            .open()
            .await
            .map_err(|source| DestinationError::Payload {
                source,
                path: payload.path().to_path_buf(),
            })?;
        let asset_data =
            Part::stream_with_length(body, payload.size()).file_name(payload.file_name().to_string());

        Ok(Form::new()
            .text("deviceAssetId", upload.device_asset_id.clone())
            .text("deviceId", DEVICE_ID)
            .text("fileCreatedAt", upload.file_created_at.to_rfc3339())
            .text("fileModifiedAt", upload.file_modified_at.to_rfc3339())
            .text("fileSize", payload.size().to_string())
            .text("isFavorite", upload.is_favorite.to_string())
            .part("assetData", asset_data))
    }

    async fn checksum_for(&self, upload: &AssetUpload) -> Result<String, DestinationError> {
        match upload.checksum.as_deref() {
            Some(checksum) if !checksum.is_empty() => Ok(checksum.to_string()),
            _ => {
                tracing::debug!(
                    path = %upload.payload.path().display(),
                    "No source checksum, hashing original"
                );
                upload
                    .payload
                    .sha1_hex()
                    .await
                    .map_err(|source| DestinationError::Payload {
                        source,
                        path: upload.payload.path().to_path_buf(),
                    })
            }
        }
    }
}

/// Interpret an upload answer: a 2xx must carry the new (or matching) id.
fn upload_outcome(
    device_asset_id: &str,
    response: ApiResponse,
) -> Result<UploadOutcome, DestinationError> {
    if !response.is_success() {
        return Ok(UploadOutcome::Rejected(response));
    }
    let parsed: Option<UploadResponse> = serde_json::from_value(response.body.clone()).ok();
    match parsed {
        Some(UploadResponse {
            id: Some(id),
            status,
        }) => Ok(UploadOutcome::Created {
            id,
            duplicate: status.as_deref() == Some("duplicate"),
        }),
        _ => Err(DestinationError::MissingAssetId {
            device_asset_id: device_asset_id.to_string(),
            body: response.body.to_string(),
        }),
    }
}

#[async_trait]
impl DestinationApi for ImmichClient {
    async fn list_albums(&self) -> Result<Vec<Album>, DestinationError> {
        let url = self.api_url("/albums");
        retry::retry_transient(&self.retry, || self.list_albums_once(&url)).await
    }

    async fn create_album(&self, name: &str) -> Result<ApiResponse, DestinationError> {
        let url = self.api_url("/albums");
        let request = self
            .client
            .post(&url)
            .json(&CreateAlbumRequest { album_name: name });
        self.send(&url, request).await
    }

    async fn upload_asset(&self, upload: &AssetUpload) -> Result<UploadOutcome, DestinationError> {
        let url = self.api_url("/assets");
        let checksum = self.checksum_for(upload).await?;
        let form = self.build_form(upload).await?;
        let request = self
            .client
            .post(&url)
            .timeout(self.upload_timeout)
            .header(CHECKSUM_HEADER, checksum)
            .multipart(form);
        let response = self.send(&url, request).await?;
        upload_outcome(&upload.device_asset_id, response)
    }

    async fn update_asset_location(
        &self,
        asset_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<ApiResponse, DestinationError> {
        let url = self.api_url("/assets");
        let request = self.client.put(&url).json(&UpdateLocationRequest {
            ids: [asset_id],
            latitude,
            longitude,
        });
        self.send(&url, request).await
    }

    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<ApiResponse, DestinationError> {
        let url = self.api_url(&format!("/albums/{}/assets", album_id));
        let request = self
            .client
            .put(&url)
            .json(&BulkIdsRequest { ids: asset_ids });
        self.send(&url, request).await
    }
}
