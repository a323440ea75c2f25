//! Album reconciliation: make every source album title exist on the
//! destination, then map destination names to ids.

use std::collections::{HashMap, HashSet};

use crate::immich::{Album, DestinationApi};
use crate::photoprism::SourceApi;

use super::failures::{AlbumCreationFailure, FailureLog};
use super::MigrateError;

/// Destination album name to id. Built once after reconciliation; there is
/// no way to mutate it afterwards.
#[derive(Debug, Clone, Default)]
pub struct AlbumIdMap {
    ids: HashMap<String, String>,
}

impl AlbumIdMap {
    /// Fold destination albums into the map. When names collide the first
    /// album listed wins.
    pub fn from_albums(albums: &[Album]) -> Self {
        let mut ids = HashMap::with_capacity(albums.len());
        for album in albums {
            ids.entry(album.album_name.clone())
                .or_insert_with(|| album.id.clone());
        }
        Self { ids }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.ids.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Entries sorted by name.
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .ids
            .iter()
            .map(|(name, id)| (name.as_str(), id.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }
}

/// Source titles missing from the destination, in source order, each once.
/// Comparison is exact and case-sensitive.
pub fn missing_albums<'a>(
    source_titles: impl IntoIterator<Item = &'a str>,
    destination: &[Album],
) -> Vec<String> {
    let mut known: HashSet<&str> = destination.iter().map(|a| a.album_name.as_str()).collect();
    let mut missing = Vec::new();
    for title in source_titles {
        if known.insert(title) {
            missing.push(title.to_string());
        }
    }
    missing
}

#[derive(Debug)]
pub struct ReconcileReport {
    pub source_albums: usize,
    pub destination_albums_before: usize,
    /// Albums created, or that would be created on a dry run.
    pub created: Vec<String>,
    pub failed_creations: usize,
    pub album_ids: AlbumIdMap,
    pub dry_run: bool,
}

/// Create missing albums and return the resulting name-to-id map.
///
/// Creation is sequential in source order. A rejected creation is recorded
/// in `failures` and counted but does not stop reconciliation.
pub async fn reconcile_albums(
    source: &dyn SourceApi,
    destination: &dyn DestinationApi,
    failures: &mut FailureLog,
    dry_run: bool,
) -> Result<ReconcileReport, MigrateError> {
    let source_albums = source.list_albums().await?;
    let before = destination.list_albums().await?;
    tracing::info!(
        "Found {} source albums, {} destination albums",
        source_albums.len(),
        before.len()
    );

    let missing = missing_albums(source_albums.iter().map(|a| a.title.as_str()), &before);

    if dry_run {
        for name in &missing {
            tracing::info!("[DRY RUN] Would create album {:?}", name);
        }
        return Ok(ReconcileReport {
            source_albums: source_albums.len(),
            destination_albums_before: before.len(),
            created: missing,
            failed_creations: 0,
            album_ids: AlbumIdMap::from_albums(&before),
            dry_run: true,
        });
    }

    let mut created = Vec::with_capacity(missing.len());
    let mut failed_creations = 0;
    for name in missing {
        let response = destination.create_album(&name).await?;
        if response.is_success() {
            tracing::info!("Created album {:?}", name);
            created.push(name);
        } else {
            failures.record_album_creation(AlbumCreationFailure {
                album_name: name,
                response,
            });
            failed_creations += 1;
        }
    }

    let after = if created.is_empty() && failed_creations == 0 {
        before.clone()
    } else {
        destination.list_albums().await?
    };
    let album_ids = AlbumIdMap::from_albums(&after);
    tracing::debug!("Album map has {} entries", album_ids.len());

    Ok(ReconcileReport {
        source_albums: source_albums.len(),
        destination_albums_before: before.len(),
        created,
        failed_creations,
        album_ids,
        dry_run: false,
    })
}
