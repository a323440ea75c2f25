//! photoprism-immich-migrate: one-shot migration from PhotoPrism to Immich.
//!
//! Creates every PhotoPrism album that Immich is missing, then uploads each
//! original with Immich's checksum dedup, backfills GPS coordinates and
//! re-links the asset into its albums. Rejected calls are collected into an
//! `error-logs-*.json` file; a local SQLite ledger lets later runs skip
//! assets that were already migrated.

#![warn(clippy::all)]

mod cli;
mod config;
mod immich;
mod migrate;
mod photoprism;
mod retry;
mod shutdown;
mod state;
mod types;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use immich::ImmichClient;
use migrate::MigrationOptions;
use photoprism::PhotoprismClient;
use state::StateDb;

/// `<path><suffix>` next to the ledger, e.g. `migration-state.db-wal`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Run the status command.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let db_path = config::expand_tilde(&args.state_db);

    if !db_path.exists() {
        println!("No ledger found at {}", db_path.display());
        println!("Run a migration first to create it.");
        return Ok(());
    }

    let db = state::SqliteStateDb::open_read_only(&db_path).await?;
    let summary = db.get_summary().await?;

    println!("Ledger: {}", db_path.display());
    println!();
    println!("Assets:");
    println!("  Total:     {}", summary.total_assets);
    println!("  Completed: {}", summary.completed);
    println!("  Partial:   {}", summary.partial);
    println!("  Uploaded:  {}", summary.uploaded);
    println!("  Failed:    {}", summary.failed);
    println!();

    if let Some(started) = &summary.last_run_started {
        println!(
            "Last run started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_run_completed {
        println!(
            "Last run completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if args.failed {
        let failed = db.get_failed().await?;
        if !failed.is_empty() {
            println!();
            println!("Failed assets:");
            for asset in failed {
                println!(
                    "  {} ({}) [{}] - {}",
                    asset.file_name,
                    asset.uid,
                    asset.status.as_str(),
                    asset.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let incomplete = db.get_incomplete().await?;
        if !incomplete.is_empty() {
            println!();
            println!("Uploaded but never linked (interrupted):");
            for asset in incomplete {
                println!(
                    "  {} ({}) -> {}",
                    asset.file_name,
                    asset.uid,
                    asset.destination_id.as_deref().unwrap_or("?")
                );
            }
        }
    }

    Ok(())
}

/// Run the reset-state command.
async fn run_reset_state(args: cli::ResetStateArgs) -> anyhow::Result<()> {
    let db_path = config::expand_tilde(&args.state_db);

    if !db_path.exists() {
        println!("No ledger found at {}", db_path.display());
        return Ok(());
    }

    if !args.yes {
        println!("This will delete the migration ledger at:");
        println!("  {}", db_path.display());
        println!();
        print!("Are you sure? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    // Refuse while a migration holds the ledger.
    drop(state::SqliteStateDb::open(&db_path).await?);

    std::fs::remove_file(&db_path)
        .with_context(|| format!("Failed to delete {}", db_path.display()))?;
    println!("Ledger deleted.");

    for suffix in ["-wal", "-shm", ".lock"] {
        let _ = std::fs::remove_file(sibling(&db_path, suffix));
    }

    Ok(())
}

/// Run the albums command: reconcile only, then print the mapping.
async fn run_albums(args: cli::AlbumsArgs) -> anyhow::Result<()> {
    let connection = config::ConnectionConfig::from_args(&args.connection)?;
    let source = PhotoprismClient::new(
        &connection.photoprism,
        connection.request_timeout,
        connection.retry,
    )?;
    let destination = ImmichClient::new(
        &connection.immich,
        connection.request_timeout,
        connection.request_timeout,
        connection.retry,
    )?;

    let mut failures = migrate::FailureLog::default();
    let report =
        migrate::reconcile_albums(&source, &destination, &mut failures, args.dry_run).await?;

    if report.dry_run {
        println!("Albums that would be created:");
        for name in &report.created {
            println!("  {}", name);
        }
        return Ok(());
    }

    println!("Created {} album(s)", report.created.len());
    if report.failed_creations > 0 {
        println!("Failed to create {} album(s)", report.failed_creations);
        if let Some(path) = failures.write_if_any(Path::new("."), &chrono::Local::now())? {
            println!("Responses written to {}", path.display());
        }
    }
    println!("Album map:");
    for (name, id) in report.album_ids.sorted() {
        println!("  {} -> {}", name, id);
    }
    Ok(())
}

/// Run the migrate command.
async fn run_migrate(args: cli::MigrateArgs) -> anyhow::Result<()> {
    let config = config::MigrateConfig::from_args(&args)?;
    let connection = &config.connection;
    tracing::info!(
        photoprism = %connection.photoprism.url,
        immich = %connection.immich.url,
        "Starting photoprism-immich-migrate"
    );

    let source = PhotoprismClient::new(
        &connection.photoprism,
        connection.request_timeout,
        connection.retry,
    )?
    .with_originals_dir(config.originals_dir.clone());
    let destination = ImmichClient::new(
        &connection.immich,
        connection.request_timeout,
        config.upload_timeout,
        connection.retry,
    )?;

    let ledger = match &config.state_db {
        Some(path) if !config.dry_run => {
            let db = state::SqliteStateDb::open(path)
                .await
                .with_context(|| format!("Failed to open ledger {}", path.display()))?;
            tracing::debug!("Using ledger at {}", db.path().display());
            Some(db)
        }
        _ => None,
    };

    let shutdown_token = shutdown::install_signal_handler()?;
    let options = MigrationOptions {
        log_dir: config.log_dir.clone(),
        on_upload_failure: config.on_upload_failure,
        dry_run: config.dry_run,
        no_progress_bar: config.no_progress_bar,
    };

    let started = Instant::now();
    let report = migrate::run_migration(
        &source,
        &destination,
        ledger.as_ref().map(|db| db as &dyn StateDb),
        &options,
        &shutdown_token,
    )
    .await?;

    let albums = &report.reconcile;
    let Some(summary) = &report.summary else {
        tracing::info!("── Dry Run Summary ──");
        tracing::info!(
            "  {} album(s) would be created ({} source, {} destination)",
            albums.created.len(),
            albums.source_albums,
            albums.destination_albums_before
        );
        tracing::info!("  {} asset(s) would be uploaded", report.eligible_assets);
        return Ok(());
    };

    tracing::info!("── Summary ──");
    tracing::info!(
        "  albums: {} created, {} failed, {} mapped",
        albums.created.len(),
        albums.failed_creations,
        albums.album_ids.len()
    );
    tracing::info!(
        "  assets: {} uploaded ({} already in Immich), {} failed, {} skipped, {} total",
        summary.uploaded,
        summary.duplicates,
        summary.upload_failures,
        summary.skipped_completed,
        summary.total
    );
    tracing::info!(
        "  locations: {} updated, {} failed",
        summary.location_updates,
        summary.location_failures
    );
    tracing::info!(
        "  album links: {} added, {} failed",
        summary.album_links,
        summary.album_link_failures
    );
    if let Some(path) = &report.log_file {
        tracing::info!("  failures: {} recorded in {}", report.failures, path.display());
    }
    if summary.halted {
        tracing::info!("  halted after a rejected upload");
    } else if summary.interrupted {
        tracing::info!("  interrupted by shutdown signal");
    }
    tracing::info!(
        "  elapsed: {}",
        migrate::format_duration(started.elapsed())
    );

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.effective_command() {
        Command::Migrate(args) => run_migrate(args).await,
        Command::Albums(args) => run_albums(args).await,
        Command::Status(args) => run_status(args).await,
        Command::ResetState(args) => run_reset_state(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_appends_suffix() {
        assert_eq!(
            sibling(Path::new("/data/migration-state.db"), "-wal"),
            PathBuf::from("/data/migration-state.db-wal")
        );
        assert_eq!(
            sibling(Path::new("ledger.sqlite"), ".lock"),
            PathBuf::from("ledger.sqlite.lock")
        );
    }

    #[tokio::test]
    async fn test_reset_state_removes_ledger_files() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("migration-state.db");
        drop(state::SqliteStateDb::open(&db_path).await.unwrap());
        assert!(sibling(&db_path, ".lock").exists());

        run_reset_state(cli::ResetStateArgs {
            state_db: db_path.display().to_string(),
            yes: true,
        })
        .await
        .unwrap();
        assert!(!db_path.exists());
        assert!(!sibling(&db_path, ".lock").exists());
    }

    #[tokio::test]
    async fn test_status_while_migration_holds_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("migration-state.db");
        let running = state::SqliteStateDb::open(&db_path).await.unwrap();
        running
            .mark_uploaded("p1", "p1.jpg", "p1.jpg-3", "im-1")
            .await
            .unwrap();

        run_status(cli::StatusArgs {
            state_db: db_path.display().to_string(),
            failed: true,
        })
        .await
        .unwrap();
        drop(running);
    }

    #[tokio::test]
    async fn test_status_without_ledger() {
        let dir = tempfile::tempdir().unwrap();
        run_status(cli::StatusArgs {
            state_db: dir.path().join("none.db").display().to_string(),
            failed: true,
        })
        .await
        .unwrap();
        assert!(!dir.path().join("none.db").exists());
    }
}
