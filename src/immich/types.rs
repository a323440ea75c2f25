use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::photoprism::AssetPayload;

/// Device id sent with every upload of a run.
pub const DEVICE_ID: &str = "CLI";

/// Album entry from `GET /api/albums`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub album_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateAlbumRequest<'a> {
    pub album_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateLocationRequest<'a> {
    pub ids: [&'a str; 1],
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct BulkIdsRequest<'a> {
    pub ids: &'a [String],
}

/// Response from `POST /api/assets`.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Status and body of a mutating call, kept verbatim for the failure log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// Wrap a raw body, keeping it as JSON when it parses and as a string
    /// otherwise.
    pub fn new(status: u16, raw: &str) -> Self {
        let body = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One asset upload: multipart metadata plus the streamed original.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub device_asset_id: String,
    pub file_created_at: DateTime<Utc>,
    pub file_modified_at: DateTime<Utc>,
    pub is_favorite: bool,
    /// Content fingerprint for server-side dedup; computed from the file
    /// when `None`.
    pub checksum: Option<String>,
    pub payload: AssetPayload,
}

/// Result of an upload that reached Immich.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Stored, or matched an existing asset by checksum (`duplicate`).
    Created { id: String, duplicate: bool },
    /// Non-2xx answer.
    Rejected(ApiResponse),
}
