//! Migration pipeline: album reconciliation, then the per-asset pass, then
//! the failure log.

pub mod assets;
pub mod failures;
pub mod reconcile;
#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::immich::{DestinationApi, DestinationError};
use crate::photoprism::{SourceApi, SourceError};
use crate::state::{RunStats, StateDb};
use crate::types::UploadFailurePolicy;

pub use assets::{create_progress_bar, AssetMigrator, MigrationSummary};
pub use failures::FailureLog;
pub use reconcile::{reconcile_albums, AlbumIdMap, ReconcileReport};

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Destination(#[from] DestinationError),

    /// Albums the destination refused to create; details are in the failure log.
    #[error("{failed} album(s) could not be created, not migrating assets")]
    AlbumCreation { failed: usize },

    /// A photo belongs to an album that reconciliation did not produce.
    #[error("Photo {uid} belongs to album {album:?}, which has no destination album")]
    UnresolvedAlbum { album: String, uid: String },
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Directory the failure log is written to.
    pub log_dir: PathBuf,
    pub on_upload_failure: UploadFailurePolicy,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

#[derive(Debug)]
pub struct RunReport {
    pub reconcile: ReconcileReport,
    /// Primary-root assets listed by the source.
    pub eligible_assets: usize,
    /// `None` on a dry run.
    pub summary: Option<MigrationSummary>,
    pub failures: usize,
    pub log_file: Option<PathBuf>,
}

/// Write the failure log if anything was recorded. When the run is already
/// ending with an error, a write failure is logged instead of returned so the
/// original error wins.
fn flush_failure_log(
    failures: &FailureLog,
    dir: &Path,
    ending_with_error: bool,
) -> anyhow::Result<Option<PathBuf>> {
    let log_file = match failures.write_if_any(dir, &Local::now()) {
        Ok(path) => path,
        Err(e) if ending_with_error => {
            tracing::error!("{:#}", e);
            None
        }
        Err(e) => return Err(e),
    };
    if let Some(path) = &log_file {
        tracing::info!(
            "Wrote {} failure record(s) to {}",
            failures.len(),
            path.display()
        );
    }
    Ok(log_file)
}

/// Run one full migration pass.
///
/// The failure log is written whenever anything was recorded, including when
/// the pass ends early with an error; the error is returned afterwards. A
/// rejected album creation ends the run before any asset is uploaded.
pub async fn run_migration(
    source: &dyn SourceApi,
    destination: &dyn DestinationApi,
    state: Option<&dyn StateDb>,
    options: &MigrationOptions,
    shutdown: &CancellationToken,
) -> anyhow::Result<RunReport> {
    let mut failures = FailureLog::default();
    let reconciled =
        reconcile_albums(source, destination, &mut failures, options.dry_run).await;
    let reconcile = match reconciled {
        Ok(report) if report.failed_creations == 0 => report,
        Ok(report) => {
            flush_failure_log(&failures, &options.log_dir, true)?;
            return Err(MigrateError::AlbumCreation {
                failed: report.failed_creations,
            }
            .into());
        }
        Err(e) => {
            flush_failure_log(&failures, &options.log_dir, true)?;
            return Err(e.into());
        }
    };
    let photos = source.list_assets().await?;
    tracing::info!("Found {} assets to migrate", photos.len());

    if options.dry_run {
        return Ok(RunReport {
            reconcile,
            eligible_assets: photos.len(),
            summary: None,
            failures: 0,
            log_file: None,
        });
    }

    let run_id = match state {
        Some(db) => match db.start_run().await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Failed to record run start: {}", e);
                None
            }
        },
        None => None,
    };

    let mut summary = MigrationSummary::default();
    let migrator = AssetMigrator::new(
        source,
        destination,
        &reconcile.album_ids,
        options.on_upload_failure,
    )
    .with_progress(create_progress_bar(
        options.no_progress_bar,
        photos.len() as u64,
    ));
    let migrator = match state {
        Some(db) => migrator.with_state(db),
        None => migrator,
    };
    let result = migrator
        .run(&photos, &mut failures, &mut summary, shutdown)
        .await;

    let log_file = flush_failure_log(&failures, &options.log_dir, result.is_err())?;

    if let (Some(db), Some(id)) = (state, run_id) {
        let stats = RunStats {
            assets_seen: summary.total as u64,
            assets_uploaded: summary.uploaded as u64,
            assets_failed: summary.upload_failures as u64,
            halted: summary.halted,
            interrupted: summary.interrupted,
        };
        if let Err(e) = db.complete_run(id, &stats).await {
            tracing::warn!("Failed to record run completion: {}", e);
        }
    }

    result?;
    Ok(RunReport {
        reconcile,
        eligible_assets: photos.len(),
        summary: Some(summary),
        failures: failures.len(),
        log_file,
    })
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::testing::{located_photo, photo, FakeDestination, FakeSource};
    use crate::state::SqliteStateDb;
    use serde_json::Value;

    fn options(dir: &std::path::Path, policy: UploadFailurePolicy) -> MigrationOptions {
        MigrationOptions {
            log_dir: dir.to_path_buf(),
            on_upload_failure: policy,
            dry_run: false,
            no_progress_bar: true,
        }
    }

    fn log_files(dir: &std::path::Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 02m 05s");
    }

    #[tokio::test]
    async fn test_full_run_creates_albums_before_linking() {
        let source = FakeSource::with_albums(&["Trip", "Family"])
            .photo(located_photo("p1", 48.8, 2.3), &["Trip"])
            .photo(photo("p2"), &["Family", "Trip"]);
        let dest = FakeDestination::with_albums(&["Family"]);
        let dir = tempfile::tempdir().unwrap();

        let report = run_migration(
            &source,
            &dest,
            None,
            &options(dir.path(), UploadFailurePolicy::Halt),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.reconcile.created, vec!["Trip"]);
        let summary = report.summary.unwrap();
        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.location_updates, 1);
        assert_eq!(summary.album_links, 3);
        assert!(report.log_file.is_none());
        assert!(log_files(dir.path()).is_empty());

        let calls = dest.calls();
        let first_upload = calls
            .iter()
            .position(|c| matches!(c, testing::Call::Upload(_)))
            .unwrap();
        let last_create = calls
            .iter()
            .rposition(|c| matches!(c, testing::Call::CreateAlbum(_)))
            .unwrap();
        assert!(last_create < first_upload);
    }

    #[tokio::test]
    async fn test_upload_500_halts_and_writes_log() {
        let source = FakeSource::default()
            .photo(photo("p1"), &[])
            .photo(photo("p2"), &[]);
        let dest = FakeDestination::default();
        dest.reject_upload("p1.jpg-102", 500);
        let dir = tempfile::tempdir().unwrap();

        let report = run_migration(
            &source,
            &dest,
            None,
            &options(dir.path(), UploadFailurePolicy::Halt),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(report.summary.unwrap().halted);
        assert_eq!(dest.uploads(), vec!["p1.jpg-102"]);
        assert!(source.detail_calls().is_empty());

        let path = report.log_file.unwrap();
        let value: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["uploadFailures"].as_array().unwrap().len(), 1);
        assert_eq!(value["uploadFailures"][0]["response"]["status"], 500);
        assert!(value["metadataUpdateFailures"].as_array().unwrap().is_empty());
        assert!(value["albumLinkFailures"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_two_failing_runs_write_two_logs() {
        let source = FakeSource::default().photo(photo("p1"), &[]);
        let dest = FakeDestination::default();
        dest.reject_upload("p1.jpg-102", 500);
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), UploadFailurePolicy::Halt);

        let first = run_migration(&source, &dest, None, &opts, &CancellationToken::new())
            .await
            .unwrap();
        let second = run_migration(&source, &dest, None, &opts, &CancellationToken::new())
            .await
            .unwrap();
        assert_ne!(first.log_file, second.log_file);
        assert_eq!(log_files(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_still_flushes_log() {
        let source = FakeSource::default()
            .photo(photo("p1"), &[])
            .photo(photo("p2"), &["Ghost"]);
        let dest = FakeDestination::default();
        dest.reject_upload("p1.jpg-102", 500);
        let dir = tempfile::tempdir().unwrap();

        let err = run_migration(
            &source,
            &dest,
            None,
            &options(dir.path(), UploadFailurePolicy::Skip),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrateError>(),
            Some(MigrateError::UnresolvedAlbum { .. })
        ));
        assert_eq!(log_files(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_album_creation_stops_before_uploads() {
        let source =
            FakeSource::with_albums(&["Trip", "Family"]).photo(photo("p1"), &["Trip"]);
        let dest = FakeDestination::default();
        dest.reject_album_creation("Trip");
        let dir = tempfile::tempdir().unwrap();

        let err = run_migration(
            &source,
            &dest,
            None,
            &options(dir.path(), UploadFailurePolicy::Halt),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrateError>(),
            Some(MigrateError::AlbumCreation { failed: 1 })
        ));
        assert!(dest.uploads().is_empty());
        assert_eq!(dest.created_albums(), vec!["Trip", "Family"]);

        let files = log_files(dir.path());
        assert_eq!(files.len(), 1);
        let value: Value = serde_json::from_slice(&std::fs::read(&files[0]).unwrap()).unwrap();
        assert_eq!(value["albumCreationFailures"][0]["albumName"], "Trip");
        assert_eq!(value["albumCreationFailures"][0]["response"]["status"], 400);
        assert!(value["uploadFailures"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let source = FakeSource::with_albums(&["Trip"]).photo(photo("p1"), &["Trip"]);
        let dest = FakeDestination::default();
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), UploadFailurePolicy::Halt);
        opts.dry_run = true;

        let report = run_migration(&source, &dest, None, &opts, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.summary.is_none());
        assert_eq!(report.eligible_assets, 1);
        assert_eq!(report.reconcile.created, vec!["Trip"]);
        assert!(dest.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_recorded_in_ledger() {
        let source = FakeSource::with_albums(&["Trip"]).photo(photo("p1"), &["Trip"]);
        let dest = FakeDestination::default();
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteStateDb::open_in_memory().unwrap();

        run_migration(
            &source,
            &dest,
            Some(&db),
            &options(dir.path(), UploadFailurePolicy::Halt),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let summary = db.get_summary().await.unwrap();
        assert_eq!(summary.completed, 1);
        assert!(summary.last_run_completed.is_some());
    }
}
