//! Files on disk that no catalog row points at.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use common::normalize_path;
use tracing::info;

use crate::files::{file_size, list_files, remove_file, RemoveOutcome, StorageLayout};
use crate::{Catalog, CatalogError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrphanFile {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrphanScan {
    pub audio: Vec<OrphanFile>,
    pub artwork: Vec<OrphanFile>,
}

impl OrphanScan {
    pub fn total_bytes(&self) -> u64 {
        self.audio
            .iter()
            .chain(self.artwork.iter())
            .map(|file| file.size)
            .sum()
    }

    /// First `limit` orphan paths, audio before artwork.
    pub fn preview(&self, limit: usize) -> Vec<String> {
        self.audio
            .iter()
            .chain(self.artwork.iter())
            .take(limit)
            .map(|file| file.path.display().to_string())
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrphanRemoval {
    pub audio_removed: usize,
    pub artwork_removed: usize,
    pub bytes_reclaimed: u64,
    pub failures: usize,
}

pub fn scan_orphans(catalog: &Catalog, layout: &StorageLayout) -> Result<OrphanScan, CatalogError> {
    let referenced = catalog.referenced_paths()?;
    let audio_refs = canonical_set(layout, &referenced.audio);
    let artwork_refs = canonical_set(layout, &referenced.artwork);

    let scan = OrphanScan {
        audio: unreferenced_files(layout, &layout.audio_root, &audio_refs),
        artwork: unreferenced_files(layout, &layout.artwork_root, &artwork_refs),
    };
    info!(
        "Found {} orphaned audio files and {} orphaned artwork files",
        scan.audio.len(),
        scan.artwork.len()
    );
    Ok(scan)
}

/// Deletes every file of `scan`; files that vanished or cannot be removed are skipped.
pub fn remove_orphans(scan: &OrphanScan) -> OrphanRemoval {
    let mut removal = OrphanRemoval::default();
    for file in &scan.audio {
        match remove_file(&file.path) {
            RemoveOutcome::Deleted { bytes } => {
                removal.audio_removed += 1;
                removal.bytes_reclaimed += bytes;
            }
            RemoveOutcome::NotFound => {}
            RemoveOutcome::Failed(_) => removal.failures += 1,
        }
    }
    for file in &scan.artwork {
        match remove_file(&file.path) {
            RemoveOutcome::Deleted { bytes } => {
                removal.artwork_removed += 1;
                removal.bytes_reclaimed += bytes;
            }
            RemoveOutcome::NotFound => {}
            RemoveOutcome::Failed(_) => removal.failures += 1,
        }
    }
    info!(
        "Removed {} orphaned audio and {} orphaned artwork files ({} bytes)",
        removal.audio_removed, removal.artwork_removed, removal.bytes_reclaimed
    );
    removal
}

fn canonical_set(layout: &StorageLayout, stored: &[String]) -> HashSet<PathBuf> {
    stored.iter().map(|path| layout.canonical(path)).collect()
}

fn unreferenced_files(
    layout: &StorageLayout,
    root: &Path,
    referenced: &HashSet<PathBuf>,
) -> Vec<OrphanFile> {
    list_files(root)
        .into_iter()
        .filter(|path| !referenced.contains(&normalize_path(&layout.base_dir, path)))
        .map(|path| {
            let size = file_size(&path).unwrap_or(0);
            OrphanFile { path, size }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{song, write_file, Fixture};

    #[test]
    fn flags_only_unreferenced_files() {
        let fx = Fixture::new();
        let a = fx.write_audio("u1/a.mp3", b"aaaa");
        let b = fx.write_audio("u1/b.mp3", b"bbbbbb");
        let c = fx.write_artwork("u1/c.jpg", b"cc");

        let mut referenced = song("1", "A", "B", None, 1);
        referenced.file_path = a.display().to_string();
        referenced.album_art_path = Some(c.display().to_string());
        fx.catalog.insert_song(&referenced).unwrap();

        let scan = scan_orphans(&fx.catalog, &fx.layout).unwrap();
        assert_eq!(
            scan.audio,
            vec![OrphanFile {
                path: b.clone(),
                size: 6
            }]
        );
        assert!(scan.artwork.is_empty());

        let removal = remove_orphans(&scan);
        assert_eq!(removal.audio_removed, 1);
        assert_eq!(removal.artwork_removed, 0);
        assert_eq!(removal.bytes_reclaimed, 6);
        assert!(a.exists());
        assert!(!b.exists());
        assert!(c.exists());
    }

    #[test]
    fn audio_and_artwork_reference_sets_are_independent() {
        let fx = Fixture::new();
        let audio = fx.write_audio("x.mp3", b"x");
        let art = fx.write_artwork("x.jpg", b"y");

        // The artwork is only listed as an audio path, so it is still an orphan.
        let mut odd = song("1", "A", "B", None, 1);
        odd.file_path = art.display().to_string();
        odd.album_art_path = Some(audio.display().to_string());
        fx.catalog.insert_song(&odd).unwrap();

        let scan = scan_orphans(&fx.catalog, &fx.layout).unwrap();
        assert_eq!(scan.audio.len(), 1);
        assert_eq!(scan.artwork.len(), 1);
    }

    #[test]
    fn relative_catalog_paths_match_walked_files() {
        let temp = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&temp.path().join("catalog.redb")).unwrap();
        let uploads = temp.path().join("uploads");
        let layout = StorageLayout::new(
            temp.path().to_path_buf(),
            uploads.join("audio"),
            uploads.join("artwork"),
        );
        write_file(&layout.audio_root.join("u1").join("a.mp3"), b"a");

        let mut relative = song("1", "A", "B", None, 1);
        relative.file_path = "./uploads/audio/../audio/u1/a.mp3".to_string();
        catalog.insert_song(&relative).unwrap();

        let scan = scan_orphans(&catalog, &layout).unwrap();
        assert!(scan.audio.is_empty());
    }

    #[test]
    fn relative_base_keeps_referenced_files() {
        let fx = Fixture::relative();
        let kept = fx.write_audio("u1/a.mp3", b"keep");
        let art = fx.write_artwork("u1/a.jpg", b"art");
        let stray = fx.write_audio("u1/stray.mp3", b"zz");

        let mut referenced = song("1", "A", "B", None, 1);
        referenced.file_path = "uploads/audio/u1/a.mp3".to_string();
        referenced.album_art_path = Some("uploads/artwork/u1/a.jpg".to_string());
        fx.catalog.insert_song(&referenced).unwrap();

        let scan = scan_orphans(&fx.catalog, &fx.layout).unwrap();
        assert_eq!(scan.audio, vec![OrphanFile { path: stray.clone(), size: 2 }]);
        assert!(scan.artwork.is_empty());

        remove_orphans(&scan);
        assert!(kept.exists());
        assert!(art.exists());
        assert!(!stray.exists());
    }

    #[cfg(unix)]
    #[test]
    fn undeletable_orphans_are_counted_and_the_rest_removed() {
        use crate::test_support::{lock_dir, unlock_dir};

        let fx = Fixture::new();
        let locked = fx.write_audio("locked/a.mp3", b"aa");
        let free = fx.write_audio("free/b.mp3", b"bbb");
        let locked_dir = locked.parent().unwrap().to_path_buf();
        if !lock_dir(&locked_dir) {
            return;
        }

        let scan = scan_orphans(&fx.catalog, &fx.layout).unwrap();
        let removal = remove_orphans(&scan);
        unlock_dir(&locked_dir);

        assert_eq!(scan.audio.len(), 2);
        assert_eq!(removal.failures, 1);
        assert_eq!(removal.audio_removed, 1);
        assert_eq!(removal.bytes_reclaimed, 3);
        assert!(locked.exists());
        assert!(!free.exists());
    }

    #[test]
    fn missing_roots_have_no_orphans() {
        let fx = Fixture::new();
        let scan = scan_orphans(&fx.catalog, &fx.layout).unwrap();
        assert_eq!(scan, OrphanScan::default());
        assert_eq!(remove_orphans(&scan), OrphanRemoval::default());
    }

    #[test]
    fn preview_is_bounded_but_removal_is_not() {
        let fx = Fixture::new();
        for i in 0..25 {
            fx.write_audio(&format!("o{:02}.mp3", i), b"z");
        }
        fx.write_artwork("o.jpg", b"z");

        let scan = scan_orphans(&fx.catalog, &fx.layout).unwrap();
        assert_eq!(scan.preview(20).len(), 20);
        assert_eq!(scan.total_bytes(), 26);

        let removal = remove_orphans(&scan);
        assert_eq!(removal.audio_removed, 25);
        assert_eq!(removal.artwork_removed, 1);
        assert!(list_files(&fx.layout.audio_root).is_empty());
    }

    #[test]
    fn vanished_files_are_skipped() {
        let fx = Fixture::new();
        let gone = fx.write_audio("gone.mp3", b"zz");
        let scan = scan_orphans(&fx.catalog, &fx.layout).unwrap();
        std::fs::remove_file(&gone).unwrap();

        let removal = remove_orphans(&scan);
        assert_eq!(removal, OrphanRemoval::default());
    }
}
