use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only file root that is migrated; sidecar and import roots are not.
pub const PRIMARY_FILE_ROOT: &str = "/";

/// Album entry from `GET /api/v1/albums`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Album {
    #[serde(rename = "UID", default)]
    pub uid: String,
    #[serde(default)]
    pub title: String,
}

/// Photo entry from `GET /api/v1/photos`. Serialized back with PhotoPrism's
/// own field names so failure logs show the record as the source reported it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Photo {
    #[serde(rename = "UID")]
    pub uid: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_root: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub hash: String,
}

impl Photo {
    pub fn is_primary_root(&self) -> bool {
        self.file_root == PRIMARY_FILE_ROOT
    }

    /// Latitude/longitude pair, if both are known. PhotoPrism reports `0`
    /// for an unknown coordinate, so zero counts as absent.
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => Some((lat, lng)),
            _ => None,
        }
    }

    /// Where the original lives on the local filesystem. `None` when the
    /// file name is empty or climbs out of `originals_dir`.
    pub fn original_path(&self, originals_dir: &Path) -> Option<PathBuf> {
        let relative = Path::new(self.file_name.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || relative.components().any(|c| c == Component::ParentDir)
        {
            return None;
        }
        Some(originals_dir.join(relative))
    }
}

/// Album reference inside a photo detail response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumRef {
    #[serde(default)]
    pub title: String,
}

/// Response from `GET /api/v1/photos/{uid}`; only album membership is used.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhotoDetails {
    #[serde(default)]
    pub albums: Option<Vec<AlbumRef>>,
}

impl PhotoDetails {
    pub fn album_titles(self) -> Vec<String> {
        self.albums
            .unwrap_or_default()
            .into_iter()
            .map(|a| a.title)
            .collect()
    }
}
