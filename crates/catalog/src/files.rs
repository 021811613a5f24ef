use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::{absolute_path, normalize_path, Song};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{Catalog, CatalogError};

/// Where uploaded audio and extracted artwork live on disk.
///
/// All three directories are absolute once constructed. Relative paths stored
/// in the catalog resolve against `base_dir`.
#[derive(Clone, Debug)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
    pub audio_root: PathBuf,
    pub artwork_root: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf, audio_root: PathBuf, artwork_root: PathBuf) -> Self {
        Self {
            base_dir: absolute_path(&base_dir),
            audio_root: absolute_path(&audio_root),
            artwork_root: absolute_path(&artwork_root),
        }
    }

    /// `<upload_dir>/audio` and `<upload_dir>/artwork`.
    pub fn under(upload_dir: &Path) -> Self {
        let upload_dir = absolute_path(upload_dir);
        Self {
            audio_root: upload_dir.join("audio"),
            artwork_root: upload_dir.join("artwork"),
            base_dir: upload_dir,
        }
    }

    pub fn audio_dir_for(&self, user_id: &str) -> PathBuf {
        self.audio_root.join(user_id)
    }

    pub fn artwork_dir_for(&self, user_id: &str) -> PathBuf {
        self.artwork_root.join(user_id)
    }

    /// Filesystem location of a path string stored in the catalog.
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn canonical(&self, stored: &str) -> PathBuf {
        normalize_path(&self.base_dir, Path::new(stored))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Deleted { bytes: u64 },
    NotFound,
    Failed(io::ErrorKind),
}

/// Deletes one regular file, reading its size first.
pub fn remove_file(path: &Path) -> RemoveOutcome {
    let bytes = match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => {
            warn!("Refusing to delete non-file {:?}", path);
            return RemoveOutcome::Failed(io::ErrorKind::Other);
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => return RemoveOutcome::NotFound,
        Err(err) => {
            warn!("Failed to stat {:?}: {}", path, err);
            return RemoveOutcome::Failed(err.kind());
        }
    };
    match fs::remove_file(path) {
        Ok(()) => RemoveOutcome::Deleted { bytes },
        Err(err) if err.kind() == io::ErrorKind::NotFound => RemoveOutcome::NotFound,
        Err(err) => {
            warn!("Failed to delete {:?}: {}", path, err);
            RemoveOutcome::Failed(err.kind())
        }
    }
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

/// Regular files under `root`, sorted. A missing root has no files.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => warn!("Skipping unreadable entry under {:?}: {}", root, err),
        }
    }
    files.sort();
    files
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongRemoval {
    pub song: Song,
    pub files_removed: usize,
    pub bytes_reclaimed: u64,
}

/// Deletes a song row, then its audio and artwork files.
///
/// Files another song still points at are kept. Files that cannot be removed
/// stay on disk and show up in the next orphan scan.
pub fn remove_song(
    catalog: &Catalog,
    layout: &StorageLayout,
    song_id: &str,
) -> Result<Option<SongRemoval>, CatalogError> {
    let song = match catalog.delete_song(song_id)? {
        Some(song) => song,
        None => return Ok(None),
    };
    let referenced = catalog.referenced_paths()?;
    let still_used: HashSet<PathBuf> = referenced
        .audio
        .iter()
        .chain(referenced.artwork.iter())
        .map(|path| layout.canonical(path))
        .collect();

    let mut files_removed = 0usize;
    let mut bytes_reclaimed = 0u64;
    let stored = std::iter::once(song.file_path.as_str())
        .chain(song.album_art_path.as_deref())
        .filter(|path| !path.is_empty());
    for path in stored {
        if still_used.contains(&layout.canonical(path)) {
            continue;
        }
        if let RemoveOutcome::Deleted { bytes } = remove_file(&layout.resolve(path)) {
            files_removed += 1;
            bytes_reclaimed += bytes;
        }
    }
    info!("Deleted song {} ({} files, {} bytes)", song.id, files_removed, bytes_reclaimed);
    Ok(Some(SongRemoval {
        song,
        files_removed,
        bytes_reclaimed,
    }))
}
