//! Duplicate song detection and removal.
//!
//! Songs sharing an exact (title, artist, album) triple form a group; the
//! earliest created row survives and every other row is deleted together with
//! its audio and artwork files.

use std::collections::HashSet;
use std::path::PathBuf;

use common::{DuplicateDetail, Song, SongKey};
use tracing::{debug, info};

use crate::files::{file_size, remove_file, RemoveOutcome, StorageLayout};
use crate::{Catalog, CatalogError};

#[derive(Clone, Debug)]
pub struct DuplicateGroup {
    pub key: SongKey,
    /// Oldest first.
    pub songs: Vec<Song>,
}

impl DuplicateGroup {
    pub fn survivor(&self) -> Option<&Song> {
        self.songs.first()
    }

    pub fn redundant(&self) -> &[Song] {
        self.songs.split_first().map(|(_, rest)| rest).unwrap_or(&[])
    }

    pub fn detail(&self) -> DuplicateDetail {
        DuplicateDetail {
            title: self.key.title.clone(),
            artist: self.key.artist.clone(),
            album: self.key.album.clone(),
            count: self.songs.len(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DuplicateOutcome {
    pub details: Vec<DuplicateDetail>,
    pub removed: usize,
    pub bytes_reclaimed: u64,
    pub failures: usize,
}

pub fn find_duplicates(catalog: &Catalog) -> Result<Vec<DuplicateGroup>, CatalogError> {
    let groups = catalog
        .duplicate_groups()?
        .into_iter()
        .map(|(key, songs)| DuplicateGroup { key, songs })
        .collect();
    Ok(groups)
}

/// Removes every non-surviving song of `groups`.
///
/// Files go first and failures there are only counted; the catalog rows are
/// then deleted in a single batch. With `dry_run` nothing is touched and the
/// outcome reports what a full run would remove.
pub fn resolve_duplicates(
    catalog: &Catalog,
    layout: &StorageLayout,
    groups: &[DuplicateGroup],
    dry_run: bool,
) -> Result<DuplicateOutcome, CatalogError> {
    let mut outcome = DuplicateOutcome {
        details: groups.iter().map(DuplicateGroup::detail).collect(),
        ..DuplicateOutcome::default()
    };
    if groups.is_empty() {
        return Ok(outcome);
    }

    let doomed: HashSet<&str> = groups
        .iter()
        .flat_map(|group| group.redundant())
        .map(|song| song.id.as_str())
        .collect();
    let protected = retained_paths(catalog, layout, &doomed)?;

    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut doomed_ids = Vec::with_capacity(doomed.len());
    for group in groups {
        if let Some(survivor) = group.survivor() {
            debug!(
                "Keeping {} for '{}' by '{}' ({} copies)",
                survivor.id,
                group.key.title,
                group.key.artist,
                group.songs.len()
            );
        }
        for song in group.redundant() {
            let stored = std::iter::once(song.file_path.as_str())
                .chain(song.album_art_path.as_deref())
                .filter(|path| !path.is_empty());
            for path in stored {
                let canonical = layout.canonical(path);
                if protected.contains(&canonical) || !visited.insert(canonical) {
                    continue;
                }
                let resolved = layout.resolve(path);
                if dry_run {
                    if let Some(size) = file_size(&resolved) {
                        outcome.bytes_reclaimed += size;
                    }
                    continue;
                }
                match remove_file(&resolved) {
                    RemoveOutcome::Deleted { bytes } => outcome.bytes_reclaimed += bytes,
                    RemoveOutcome::NotFound => {}
                    RemoveOutcome::Failed(_) => outcome.failures += 1,
                }
            }
            doomed_ids.push(song.id.clone());
        }
    }

    outcome.removed = if dry_run {
        doomed_ids.len()
    } else {
        catalog.delete_songs(&doomed_ids)?
    };
    info!(
        "Duplicate pass: {} groups, {} songs {}",
        groups.len(),
        outcome.removed,
        if dry_run { "would be removed" } else { "removed" }
    );
    Ok(outcome)
}

// Paths still referenced by a song that is not being removed.
fn retained_paths(
    catalog: &Catalog,
    layout: &StorageLayout,
    doomed: &HashSet<&str>,
) -> Result<HashSet<PathBuf>, CatalogError> {
    let mut paths = HashSet::new();
    for song in catalog.list_songs()? {
        if doomed.contains(song.id.as_str()) {
            continue;
        }
        if !song.file_path.is_empty() {
            paths.insert(layout.canonical(&song.file_path));
        }
        if let Some(art) = song.album_art_path.as_deref().filter(|art| !art.is_empty()) {
            paths.insert(layout.canonical(art));
        }
    }
    Ok(paths)
}
