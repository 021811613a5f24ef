use std::fs;
use std::path::{Path, PathBuf};

use common::{now_millis, Song};
use metadata::{read_cover, read_tags, TagInfo};
use tracing::{info, warn};
use uuid::Uuid;

use crate::files::{remove_file, StorageLayout};
use crate::{Catalog, CatalogError};

#[derive(Clone, Debug)]
pub struct ImportOptions {
    pub max_file_size: u64,
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            max_file_size: 50_000_000,
            allowed_extensions: ["mp3", "wav", "flac", "m4a"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl ImportOptions {
    pub fn accepts(&self, path: &Path) -> bool {
        audio_extension(path)
            .map(|ext| self.allowed_extensions.iter().any(|allowed| *allowed == ext))
            .unwrap_or(false)
    }
}

/// Copies `source` into the user's upload folder and records it as a song.
///
/// Tags and cover art are best effort: unreadable tags fall back to the file
/// name as title, and a song without embedded art has no artwork path.
pub fn import_file(
    catalog: &Catalog,
    layout: &StorageLayout,
    source: &Path,
    user_id: &str,
    options: &ImportOptions,
) -> Result<Song, CatalogError> {
    validate_user_id(user_id)?;
    let ext = match audio_extension(source) {
        Some(ext) if options.accepts(source) => ext,
        _ => {
            return Err(CatalogError::InvalidInput(format!(
                "unsupported file type: {}",
                source.display()
            )))
        }
    };
    let size = fs::metadata(source)?.len();
    if size > options.max_file_size {
        return Err(CatalogError::InvalidInput(format!(
            "file too large: {} bytes (limit {})",
            size, options.max_file_size
        )));
    }

    let id = Uuid::new_v4().to_string();
    let audio_dir = layout.audio_dir_for(user_id);
    fs::create_dir_all(&audio_dir)?;
    let audio_path = audio_dir.join(format!("{}.{}", id, ext));
    fs::copy(source, &audio_path)?;

    let tags = match read_tags(&audio_path) {
        Ok(tags) => tags,
        Err(err) => {
            warn!("Failed to read tags from {:?}: {}", source, err);
            TagInfo::default()
        }
    };
    let art_path = extract_artwork(layout, &audio_path, user_id, &id);

    let now = now_millis();
    let song = Song {
        id,
        title: tags.title.or_else(|| file_stem(source)),
        artist: tags.artist,
        album: tags.album,
        genre: tags.genre,
        year: tags.year,
        duration_ms: tags.duration_ms,
        bitrate: tags.bitrate,
        sample_rate: tags.sample_rate,
        format: Some(ext),
        file_path: audio_path.display().to_string(),
        album_art_path: art_path.as_ref().map(|path| path.display().to_string()),
        file_size: size,
        uploaded_by: Some(user_id.to_string()),
        play_count: 0,
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = catalog.insert_song(&song) {
        remove_file(&audio_path);
        if let Some(art_path) = &art_path {
            remove_file(art_path);
        }
        return Err(err);
    }
    info!("Imported {:?} as song {}", source, song.id);
    Ok(song)
}

fn extract_artwork(
    layout: &StorageLayout,
    audio_path: &Path,
    user_id: &str,
    song_id: &str,
) -> Option<PathBuf> {
    let art = match read_cover(audio_path) {
        Ok(Some(art)) => art,
        Ok(None) => return None,
        Err(err) => {
            warn!("Failed to read cover from {:?}: {}", audio_path, err);
            return None;
        }
    };
    let dir = layout.artwork_dir_for(user_id);
    let path = dir.join(format!("{}_artwork.{}", song_id, art.extension()));
    let written = fs::create_dir_all(&dir).and_then(|_| fs::write(&path, &art.data));
    match written {
        Ok(()) => Some(path),
        Err(err) => {
            warn!("Failed to write artwork {:?}: {}", path, err);
            None
        }
    }
}

fn validate_user_id(user_id: &str) -> Result<(), CatalogError> {
    let valid = !user_id.is_empty()
        && user_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidInput(format!("invalid user id: {:?}", user_id)))
    }
}

fn audio_extension(path: &Path) -> Option<String> {
    Some(path.extension()?.to_string_lossy().to_ascii_lowercase())
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .filter(|stem| !stem.is_empty())
}
