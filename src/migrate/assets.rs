//! Per-asset migration: upload, location backfill, album links.

use std::collections::HashSet;
use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::immich::{AssetUpload, DestinationApi, UploadOutcome};
use crate::photoprism::{Photo, SourceApi};
use crate::state::{LocationStatus, StateDb, StateError};
use crate::types::UploadFailurePolicy;

use super::failures::{AlbumLinkFailure, FailureLog, MetadataUpdateFailure, UploadFailure};
use super::reconcile::AlbumIdMap;
use super::MigrateError;

/// Create a progress bar with a consistent template.
///
/// Hidden when `--no-progress-bar` was passed or stdout is not a TTY.
pub fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    pb.set_style(style);
    pb
}

/// Counters for one pass over the asset list.
#[derive(Debug, Clone, Default)]
pub struct MigrationSummary {
    pub total: usize,
    /// Completed in an earlier run according to the ledger.
    pub skipped_completed: usize,
    pub uploaded: usize,
    /// Uploads the destination matched to an existing asset by checksum.
    pub duplicates: usize,
    pub upload_failures: usize,
    pub location_updates: usize,
    pub location_failures: usize,
    pub album_links: usize,
    pub album_link_failures: usize,
    /// Stopped after a rejected upload under the halt policy.
    pub halted: bool,
    pub interrupted: bool,
}

enum Step {
    Continue,
    Halt,
}

pub struct AssetMigrator<'a> {
    source: &'a dyn SourceApi,
    destination: &'a dyn DestinationApi,
    album_ids: &'a AlbumIdMap,
    policy: UploadFailurePolicy,
    state: Option<&'a dyn StateDb>,
    progress: ProgressBar,
}

impl<'a> AssetMigrator<'a> {
    pub fn new(
        source: &'a dyn SourceApi,
        destination: &'a dyn DestinationApi,
        album_ids: &'a AlbumIdMap,
        policy: UploadFailurePolicy,
    ) -> Self {
        Self {
            source,
            destination,
            album_ids,
            policy,
            state: None,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_state(mut self, state: &'a dyn StateDb) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Migrate `photos` sequentially in the given order.
    ///
    /// Non-2xx answers are recorded in `failures` and the pass continues,
    /// except for a rejected upload under [`UploadFailurePolicy::Halt`].
    /// Transport errors and unresolved albums end the pass with an error;
    /// `failures` and `summary` keep whatever was recorded up to then.
    pub async fn run(
        &self,
        photos: &[Photo],
        failures: &mut FailureLog,
        summary: &mut MigrationSummary,
        shutdown: &CancellationToken,
    ) -> Result<(), MigrateError> {
        let completed = self.completed_uids().await;
        let total = photos.len();
        summary.total = total;
        self.progress.set_length(total as u64);

        for (index, photo) in photos.iter().enumerate() {
            if shutdown.is_cancelled() {
                self.progress
                    .suspend(|| tracing::info!("Shutdown requested, stopping before next asset"));
                summary.interrupted = true;
                break;
            }
            if completed.contains(&photo.uid) {
                tracing::debug!(uid = %photo.uid, "Already migrated, skipping");
                summary.skipped_completed += 1;
                self.progress.inc(1);
                continue;
            }

            let step = self
                .migrate_one(photo, (index + 1, total), failures, summary)
                .await;
            self.progress.inc(1);

            if let Step::Halt = step? {
                self.progress.suspend(|| {
                    tracing::error!("Upload failed, halting migration (use --on-upload-failure skip to continue past failed uploads)")
                });
                summary.halted = true;
                break;
            }
        }

        self.progress.finish_and_clear();
        Ok(())
    }

    async fn completed_uids(&self) -> HashSet<String> {
        let Some(state) = self.state else {
            return HashSet::new();
        };
        match state.completed_uids().await {
            Ok(uids) => {
                if !uids.is_empty() {
                    tracing::info!("{} assets already migrated in earlier runs", uids.len());
                }
                uids
            }
            Err(e) => {
                tracing::warn!("Failed to read ledger, migrating every asset: {}", e);
                HashSet::new()
            }
        }
    }

    fn ledger_warning(&self, uid: &str, e: StateError) {
        self.progress
            .suspend(|| tracing::warn!(uid = %uid, "Failed to update ledger: {}", e));
    }

    /// `position` is the 1-based index and total, reported once the upload
    /// has been answered.
    async fn migrate_one(
        &self,
        photo: &Photo,
        position: (usize, usize),
        failures: &mut FailureLog,
        summary: &mut MigrationSummary,
    ) -> Result<Step, MigrateError> {
        let payload = self.source.stat_asset(photo).await?;
        let device_asset_id = payload.device_asset_id();
        let upload = AssetUpload {
            device_asset_id: device_asset_id.clone(),
            file_created_at: photo.created_at,
            file_modified_at: photo.updated_at,
            is_favorite: photo.favorite,
            checksum: Some(photo.hash.clone()).filter(|h| !h.is_empty()),
            payload,
        };

        let outcome = self.destination.upload_asset(&upload).await?;
        self.progress.suspend(|| {
            tracing::info!("{} / {} {}", position.0, position.1, photo.file_name)
        });
        self.progress.set_message(photo.file_name.clone());

        let asset_id = match outcome {
            UploadOutcome::Rejected(response) => {
                summary.upload_failures += 1;
                if let Some(state) = self.state {
                    let error = format!("HTTP {}: {}", response.status, response.body);
                    if let Err(e) = state
                        .mark_upload_failed(&photo.uid, &photo.file_name, &device_asset_id, &error)
                        .await
                    {
                        self.ledger_warning(&photo.uid, e);
                    }
                }
                self.progress.suspend(|| {
                    failures.record_upload(UploadFailure {
                        photo: photo.clone(),
                        device_asset_id,
                        response,
                    })
                });
                return Ok(match self.policy {
                    UploadFailurePolicy::Halt => Step::Halt,
                    UploadFailurePolicy::Skip => Step::Continue,
                });
            }
            UploadOutcome::Created { id, duplicate } => {
                summary.uploaded += 1;
                if duplicate {
                    summary.duplicates += 1;
                    tracing::debug!(uid = %photo.uid, asset_id = %id, "Destination already had this asset");
                }
                id
            }
        };

        if let Some(state) = self.state {
            if let Err(e) = state
                .mark_uploaded(&photo.uid, &photo.file_name, &device_asset_id, &asset_id)
                .await
            {
                self.ledger_warning(&photo.uid, e);
            }
        }

        let location_status = self
            .update_location(photo, &asset_id, failures, summary)
            .await?;
        if let Some(state) = self.state {
            if let Err(e) = state.set_location_status(&photo.uid, location_status).await {
                self.ledger_warning(&photo.uid, e);
            }
        }

        let (linked, failed) = self.link_albums(photo, &asset_id, failures, summary).await?;
        if let Some(state) = self.state {
            if let Err(e) = state.mark_linked(&photo.uid, linked, failed).await {
                self.ledger_warning(&photo.uid, e);
            }
        }

        Ok(Step::Continue)
    }

    async fn update_location(
        &self,
        photo: &Photo,
        asset_id: &str,
        failures: &mut FailureLog,
        summary: &mut MigrationSummary,
    ) -> Result<LocationStatus, MigrateError> {
        let Some((latitude, longitude)) = photo.location() else {
            return Ok(LocationStatus::Skipped);
        };
        let response = self
            .destination
            .update_asset_location(asset_id, latitude, longitude)
            .await?;
        if response.is_success() {
            summary.location_updates += 1;
            return Ok(LocationStatus::Updated);
        }
        summary.location_failures += 1;
        self.progress.suspend(|| {
            failures.record_metadata_update(MetadataUpdateFailure {
                photo_uid: photo.uid.clone(),
                asset_id: asset_id.to_string(),
                latitude,
                longitude,
                response,
            })
        });
        Ok(LocationStatus::Failed)
    }

    /// Add the asset to every album its source photo belongs to. Returns the
    /// number of links made and failed.
    async fn link_albums(
        &self,
        photo: &Photo,
        asset_id: &str,
        failures: &mut FailureLog,
        summary: &mut MigrationSummary,
    ) -> Result<(u32, u32), MigrateError> {
        let titles = self.source.asset_albums(&photo.uid).await?;
        let asset_ids = [asset_id.to_string()];
        let mut linked = 0;
        let mut failed = 0;

        for title in titles {
            let album_id =
                self.album_ids
                    .get(&title)
                    .ok_or_else(|| MigrateError::UnresolvedAlbum {
                        album: title.clone(),
                        uid: photo.uid.clone(),
                    })?;
            let response = self
                .destination
                .add_assets_to_album(album_id, &asset_ids)
                .await?;
            if response.is_success() {
                tracing::debug!(uid = %photo.uid, album = %title, "Added to album");
                summary.album_links += 1;
                linked += 1;
            } else {
                summary.album_link_failures += 1;
                failed += 1;
                self.progress.suspend(|| {
                    failures.record_album_link(AlbumLinkFailure {
                        photo: photo.clone(),
                        album_name: title.clone(),
                        album_id: album_id.to_string(),
                        asset_id: asset_id.to_string(),
                        response,
                    })
                });
            }
        }

        Ok((linked, failed))
    }
}
