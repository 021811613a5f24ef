use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub duration_ms: Option<u32>,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub format: Option<String>,
    pub file_path: String,
    pub album_art_path: Option<String>,
    pub file_size: u64,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub play_count: u64,
    /// Unix millis; the earliest row of a duplicate group survives.
    pub created_at: u64,
    pub updated_at: u64,
}

impl Song {
    /// `None` when the song cannot take part in duplicate detection.
    pub fn duplicate_key(&self) -> Option<SongKey> {
        Some(SongKey {
            title: self.title.clone()?,
            artist: self.artist.clone()?,
            album: self.album.clone(),
        })
    }

    pub fn age_key(&self) -> (u64, &str) {
        (self.created_at, self.id.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SongKey {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupMode {
    #[serde(rename = "dry-run")]
    DryRun,
    #[serde(rename = "full")]
    Full,
}

impl CleanupMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dry-run" => Some(CleanupMode::DryRun),
            "full" => Some(CleanupMode::Full),
            _ => None,
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == CleanupMode::DryRun
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateDetail {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub duplicates_removed: usize,
    pub orphaned_audio_removed: usize,
    pub orphaned_artwork_removed: usize,
    /// Bytes reclaimed from duplicate and orphaned files.
    pub space_saved: u64,
    pub removal_failures: usize,
    pub duplicate_details: Vec<DuplicateDetail>,
    pub orphaned_files: Vec<String>,
}

/// Canonical absolute form of `path` for comparisons.
///
/// Relative paths are resolved against `base`. Existing paths go through
/// `fs::canonicalize` so symlinked roots compare equal; missing paths are
/// folded lexically.
pub fn normalize_path(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        absolute_path(base).join(path)
    };
    match std::fs::canonicalize(&joined) {
        Ok(canonical) => canonical,
        Err(_) => canonicalize_missing(&joined),
    }
}

/// `path` joined onto the current directory unless it is already absolute.
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

// Canonicalize the deepest existing ancestor, then fold the rest lexically.
fn canonicalize_missing(path: &Path) -> PathBuf {
    let lexical = lexical_normalize(path);
    let mut existing = lexical.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(existing) {
            let mut out = canonical;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
