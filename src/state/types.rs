//! Types for the migration ledger.

use chrono::{DateTime, Utc};

/// Where an asset stands after its last migration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    /// Uploaded; location and album links not finished yet.
    Uploaded,
    /// Uploaded, located and linked without any recorded failure.
    Completed,
    /// Uploaded, but a location update or album link failed.
    Partial,
    /// The upload itself was rejected.
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Outcome of the GPS backfill step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStatus {
    /// The source had no usable coordinates.
    Skipped,
    Updated,
    Failed,
}

impl LocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Updated => "updated",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "skipped" => Some(Self::Skipped),
            "updated" => Some(Self::Updated),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One asset row of the ledger.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    /// PhotoPrism photo UID.
    pub uid: String,
    pub file_name: String,
    pub device_asset_id: String,
    /// Immich asset id, once uploaded.
    pub destination_id: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub attempts: u32,
    pub albums_linked: u32,
    pub albums_failed: u32,
    pub status: AssetStatus,
    pub location_status: LocationStatus,
}

/// Counters for one migration run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub assets_seen: u64,
    pub assets_uploaded: u64,
    pub assets_failed: u64,
    /// Stopped early because an upload was rejected.
    pub halted: bool,
    /// Stopped early because of a shutdown signal.
    pub interrupted: bool,
}

/// Summary of the ledger for the `status` command.
#[derive(Debug, Clone)]
pub struct StateSummary {
    pub total_assets: u64,
    pub completed: u64,
    pub partial: u64,
    pub uploaded: u64,
    pub failed: u64,
    pub last_run_started: Option<DateTime<Utc>>,
    pub last_run_completed: Option<DateTime<Utc>>,
}
