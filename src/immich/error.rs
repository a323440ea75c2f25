use std::path::PathBuf;

use thiserror::Error;

use crate::retry::Retryable;

/// Errors raised by calls against Immich that cannot be recorded as a
/// per-asset failure: transport problems, failed reads and malformed bodies.
/// A non-2xx answer to a mutating call is not an error here; it is returned
/// to the caller as an [`super::ApiResponse`].
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("Immich returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Http {
        source: reqwest::Error,
        url: String,
    },

    #[error("Unexpected response body from {url}: {source}")]
    Decode {
        source: serde_json::Error,
        url: String,
    },

    #[error("Immich accepted the upload of {device_asset_id} but returned no asset id: {body}")]
    MissingAssetId {
        device_asset_id: String,
        body: String,
    },

    #[error("Cannot read payload {}: {source}", path.display())]
    Payload {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl Retryable for DestinationError {
    fn is_retryable(&self) -> bool {
        match self {
            DestinationError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            DestinationError::Http { .. } => true,
            DestinationError::Decode { .. }
            | DestinationError::MissingAssetId { .. }
            | DestinationError::Payload { .. } => false,
        }
    }
}
