//! Per-run failure collection and the JSON artifact it is flushed to.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::immich::ApiResponse;
use crate::photoprism::Photo;

const LOG_FILE_PREFIX: &str = "error-logs-";
const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Album creation rejected by the destination.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumCreationFailure {
    pub album_name: String,
    pub response: ApiResponse,
}

/// Upload rejected by the destination.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    pub photo: Photo,
    pub device_asset_id: String,
    pub response: ApiResponse,
}

/// Location backfill rejected by the destination.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdateFailure {
    pub photo_uid: String,
    pub asset_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub response: ApiResponse,
}

/// Album membership rejected by the destination.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumLinkFailure {
    pub photo: Photo,
    pub album_name: String,
    pub album_id: String,
    pub asset_id: String,
    pub response: ApiResponse,
}

/// Every failure of one run, grouped by stage. Serialized as a whole, so
/// empty lists still appear in the artifact.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureLog {
    pub album_creation_failures: Vec<AlbumCreationFailure>,
    pub upload_failures: Vec<UploadFailure>,
    pub metadata_update_failures: Vec<MetadataUpdateFailure>,
    pub album_link_failures: Vec<AlbumLinkFailure>,
}

impl FailureLog {
    pub fn record_album_creation(&mut self, failure: AlbumCreationFailure) {
        tracing::error!(
            album = %failure.album_name,
            status = failure.response.status,
            "Album creation failed: {}",
            failure.response.body
        );
        self.album_creation_failures.push(failure);
    }

    pub fn record_upload(&mut self, failure: UploadFailure) {
        tracing::error!(
            uid = %failure.photo.uid,
            device_asset_id = %failure.device_asset_id,
            status = failure.response.status,
            "Upload failed: {}",
            failure.response.body
        );
        self.upload_failures.push(failure);
    }

    pub fn record_metadata_update(&mut self, failure: MetadataUpdateFailure) {
        tracing::error!(
            uid = %failure.photo_uid,
            asset_id = %failure.asset_id,
            status = failure.response.status,
            "Location update failed: {}",
            failure.response.body
        );
        self.metadata_update_failures.push(failure);
    }

    pub fn record_album_link(&mut self, failure: AlbumLinkFailure) {
        tracing::error!(
            uid = %failure.photo.uid,
            album = %failure.album_name,
            status = failure.response.status,
            "Adding to album failed: {}",
            failure.response.body
        );
        self.album_link_failures.push(failure);
    }

    pub fn len(&self) -> usize {
        self.album_creation_failures.len()
            + self.upload_failures.len()
            + self.metadata_update_failures.len()
            + self.album_link_failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the log to `dir` when anything was recorded. Returns the path
    /// written, or `None` for a clean run.
    pub fn write_if_any(&self, dir: &Path, now: &DateTime<Local>) -> anyhow::Result<Option<PathBuf>> {
        if self.is_empty() {
            return Ok(None);
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize failure log")?;

        let stem = log_file_stem(now);
        let mut suffix = 0u32;
        loop {
            let path = dir.join(log_file_name(&stem, suffix));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    return Ok(Some(path));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create {}", path.display()))
                }
            }
        }
    }
}

fn log_file_stem(now: &DateTime<Local>) -> String {
    format!("{}{}", LOG_FILE_PREFIX, now.format(LOG_TIMESTAMP_FORMAT))
}

fn log_file_name(stem: &str, suffix: u32) -> String {
    if suffix == 0 {
        format!("{}.json", stem)
    } else {
        format!("{}-{}.json", stem, suffix)
    }
}
