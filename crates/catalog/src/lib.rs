pub mod cleanup;
pub mod duplicates;
pub mod files;
pub mod import;
pub mod orphans;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{now_millis, Song, SongKey};
use metadata::MetadataError;
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use cleanup::{run_cleanup, CleanupOptions, DEFAULT_PREVIEW_LIMIT};
pub use duplicates::{find_duplicates, resolve_duplicates, DuplicateGroup, DuplicateOutcome};
pub use files::{list_files, remove_file, remove_song, RemoveOutcome, SongRemoval, StorageLayout};
pub use import::{import_file, ImportOptions};
pub use orphans::{remove_orphans, scan_orphans, OrphanFile, OrphanRemoval, OrphanScan};

const CATALOG_VERSION: u32 = 1;

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const SONGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("songs");

const META_VERSION_KEY: &str = "version";

/// Song rows persisted in a single redb file.
#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
}

/// Every non-null path the catalog points at, split by kind.
#[derive(Clone, Debug, Default)]
pub struct ReferencedPaths {
    pub audio: Vec<String>,
    pub artwork: Vec<String>,
}

/// Metadata edit; `None` leaves a field untouched, an empty string clears it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SongUpdate {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let db = open_or_create_db(path)?;
        let catalog = Self::with_db(Arc::new(db));
        catalog.init_tables()?;
        info!("Opened catalog at {:?}", path);
        Ok(catalog)
    }

    pub fn with_db(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn init_tables(&self) -> Result<(), CatalogError> {
        if let Some(version) = read_version(&self.db)? {
            if version != CATALOG_VERSION {
                return Err(CatalogError::VersionMismatch(version));
            }
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META_TABLE)?;
            let bytes = encode_value(&CATALOG_VERSION)?;
            meta.insert(META_VERSION_KEY, bytes.as_slice())?;
            let _ = write_txn.open_table(SONGS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn insert_song(&self, song: &Song) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SONGS_TABLE)?;
            let bytes = encode_value(song)?;
            table.insert(song.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_song(&self, song_id: &str) -> Result<Option<Song>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SONGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let song = match table.get(song_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(song)
    }

    /// All songs, oldest first.
    pub fn list_songs(&self) -> Result<Vec<Song>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SONGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut songs = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let song: Song = decode_value(entry.1.value())?;
            songs.push(song);
        }
        songs.sort_by(|a, b| a.age_key().cmp(&b.age_key()));
        Ok(songs)
    }

    pub fn count_songs(&self) -> Result<usize, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SONGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        Ok(table.len()? as usize)
    }

    /// Songs whose (title, artist, album) equals `key`, oldest first.
    pub fn songs_with_key(&self, key: &SongKey) -> Result<Vec<Song>, CatalogError> {
        let songs = self.list_songs()?;
        Ok(songs
            .into_iter()
            .filter(|song| song.duplicate_key().as_ref() == Some(key))
            .collect())
    }

    /// Groups of more than one song sharing (title, artist, album), ordered by key.
    pub fn duplicate_groups(&self) -> Result<Vec<(SongKey, Vec<Song>)>, CatalogError> {
        let mut groups: BTreeMap<SongKey, Vec<Song>> = BTreeMap::new();
        for song in self.list_songs()? {
            if let Some(key) = song.duplicate_key() {
                groups.entry(key).or_default().push(song);
            }
        }
        Ok(groups
            .into_iter()
            .filter(|(_, songs)| songs.len() > 1)
            .collect())
    }

    pub fn referenced_paths(&self) -> Result<ReferencedPaths, CatalogError> {
        let mut paths = ReferencedPaths::default();
        for song in self.list_songs()? {
            if !song.file_path.is_empty() {
                paths.audio.push(song.file_path);
            }
            if let Some(art) = song.album_art_path.filter(|art| !art.is_empty()) {
                paths.artwork.push(art);
            }
        }
        Ok(paths)
    }

    pub fn update_song_metadata(
        &self,
        song_id: &str,
        update: SongUpdate,
    ) -> Result<Option<Song>, CatalogError> {
        self.modify_song(song_id, |song| {
            if let Some(title) = update.title {
                song.title = clearable(title);
            }
            if let Some(artist) = update.artist {
                song.artist = clearable(artist);
            }
            if let Some(album) = update.album {
                song.album = clearable(album);
            }
            if let Some(genre) = update.genre {
                song.genre = clearable(genre);
            }
            if let Some(year) = update.year {
                song.year = Some(year);
            }
            song.updated_at = now_millis();
        })
    }

    /// Bumps the play counter and returns the new value.
    pub fn record_play(&self, song_id: &str) -> Result<Option<u64>, CatalogError> {
        let updated = self.modify_song(song_id, |song| {
            song.play_count = song.play_count.saturating_add(1);
        })?;
        Ok(updated.map(|song| song.play_count))
    }

    pub fn delete_song(&self, song_id: &str) -> Result<Option<Song>, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SONGS_TABLE)?;
            let removed = match table.remove(song_id)? {
                Some(value) => Some(decode_value::<Song>(value.value())?),
                None => None,
            };
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Deletes all `song_ids` in one transaction; rows already gone are skipped.
    pub fn delete_songs(&self, song_ids: &[String]) -> Result<usize, CatalogError> {
        if song_ids.is_empty() {
            return Ok(0);
        }
        let write_txn = self.db.begin_write()?;
        let mut deleted = 0usize;
        {
            let mut table = write_txn.open_table(SONGS_TABLE)?;
            for song_id in song_ids {
                if table.remove(song_id.as_str())?.is_some() {
                    deleted += 1;
                } else {
                    debug!("Song {} already removed", song_id);
                }
            }
        }
        write_txn.commit()?;
        Ok(deleted)
    }

    fn modify_song<F>(&self, song_id: &str, apply: F) -> Result<Option<Song>, CatalogError>
    where
        F: FnOnce(&mut Song),
    {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(SONGS_TABLE)?;
            let existing = match table.get(song_id)? {
                Some(value) => Some(decode_value::<Song>(value.value())?),
                None => None,
            };
            match existing {
                Some(mut song) => {
                    apply(&mut song);
                    let bytes = encode_value(&song)?;
                    table.insert(song_id, bytes.as_slice())?;
                    Some(song)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Metadata(MetadataError),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    InvalidInput(String),
    VersionMismatch(u32),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Metadata(err) => write!(f, "metadata error: {}", err),
            CatalogError::Redb(err) => write!(f, "db error: {}", err),
            CatalogError::Bincode(err) => write!(f, "bincode error: {}", err),
            CatalogError::InvalidInput(message) => write!(f, "invalid input: {}", message),
            CatalogError::VersionMismatch(version) => {
                write!(f, "catalog version mismatch: {}", version)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<MetadataError> for CatalogError {
    fn from(err: MetadataError) -> Self {
        CatalogError::Metadata(err)
    }
}

impl From<redb::Error> for CatalogError {
    fn from(err: redb::Error) -> Self {
        CatalogError::Redb(err)
    }
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TableError> for CatalogError {
    fn from(err: TableError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TransactionError> for CatalogError {
    fn from(err: TransactionError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<CommitError> for CatalogError {
    fn from(err: CommitError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for CatalogError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CatalogError::Bincode(err)
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, CatalogError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn read_version(db: &Database) -> Result<Option<u32>, CatalogError> {
    let read_txn = db.begin_read()?;
    let table = match read_txn.open_table(META_TABLE) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let version = match table.get(META_VERSION_KEY)? {
        Some(value) => Some(decode_value(value.value())?),
        None => None,
    };
    Ok(version)
}

fn clearable(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, CatalogError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(bincode::deserialize(bytes)?)
}


#[cfg(test)]
mod tests {
    use super::test_support::{song, Fixture};
    use super::*;

    #[test]
    fn lists_songs_oldest_first() {
        let fx = Fixture::new();
        fx.catalog.insert_song(&song("c", "T", "A", None, 30)).unwrap();
        fx.catalog.insert_song(&song("a", "T", "A", None, 10)).unwrap();
        fx.catalog.insert_song(&song("b", "T", "A", None, 20)).unwrap();

        let ids: Vec<String> = fx
            .catalog
            .list_songs()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(fx.catalog.count_songs().unwrap(), 3);
    }

    #[test]
    fn groups_by_exact_title_artist_album() {
        let fx = Fixture::new();
        fx.catalog.insert_song(&song("1", "A", "Artist1", Some("X"), 1)).unwrap();
        fx.catalog.insert_song(&song("2", "A", "Artist1", Some("X"), 2)).unwrap();
        fx.catalog.insert_song(&song("3", "A", "Artist1", None, 3)).unwrap();
        fx.catalog.insert_song(&song("4", "A", "Artist1", None, 4)).unwrap();
        fx.catalog.insert_song(&song("5", "a", "Artist1", Some("X"), 5)).unwrap();
        let mut untitled = song("6", "A", "Artist1", Some("X"), 6);
        untitled.title = None;
        fx.catalog.insert_song(&untitled).unwrap();

        let groups = fx.catalog.duplicate_groups().unwrap();
        assert_eq!(groups.len(), 2);
        let sizes: Vec<(Option<String>, usize)> = groups
            .iter()
            .map(|(key, songs)| (key.album.clone(), songs.len()))
            .collect();
        assert!(sizes.contains(&(None, 2)));
        assert!(sizes.contains(&(Some("X".to_string()), 2)));

        let key = SongKey {
            title: "A".to_string(),
            artist: "Artist1".to_string(),
            album: None,
        };
        let members: Vec<String> = fx
            .catalog
            .songs_with_key(&key)
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(members, vec!["3", "4"]);
    }

    #[test]
    fn delete_songs_tolerates_missing_rows() {
        let fx = Fixture::new();
        fx.catalog.insert_song(&song("1", "A", "B", None, 1)).unwrap();
        let deleted = fx
            .catalog
            .delete_songs(&["1".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(fx.catalog.delete_songs(&["1".to_string()]).unwrap(), 0);
        assert!(fx.catalog.get_song("1").unwrap().is_none());
    }

    #[test]
    fn updates_metadata_and_play_count() {
        let fx = Fixture::new();
        fx.catalog.insert_song(&song("1", "Old", "B", Some("X"), 1)).unwrap();

        let updated = fx
            .catalog
            .update_song_metadata(
                "1",
                SongUpdate {
                    title: Some("New".to_string()),
                    album: Some("  ".to_string()),
                    ..SongUpdate::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("New"));
        assert_eq!(updated.album, None);
        assert_eq!(updated.artist.as_deref(), Some("B"));

        assert_eq!(fx.catalog.record_play("1").unwrap(), Some(1));
        assert_eq!(fx.catalog.record_play("1").unwrap(), Some(2));
        assert_eq!(fx.catalog.record_play("missing").unwrap(), None);
    }

    #[test]
    fn referenced_paths_skip_missing_artwork() {
        let fx = Fixture::new();
        let mut with_art = song("1", "A", "B", None, 1);
        with_art.album_art_path = Some("/art/1.jpg".to_string());
        fx.catalog.insert_song(&with_art).unwrap();
        fx.catalog.insert_song(&song("2", "C", "D", None, 2)).unwrap();

        let paths = fx.catalog.referenced_paths().unwrap();
        assert_eq!(paths.audio.len(), 2);
        assert_eq!(paths.artwork, vec!["/art/1.jpg".to_string()]);
    }

    #[test]
    fn reopening_keeps_rows() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("catalog.redb");
        {
            let catalog = Catalog::open(&path).unwrap();
            catalog.insert_song(&song("1", "A", "B", None, 1)).unwrap();
        }
        let catalog = Catalog::open(&path).unwrap();
        assert!(catalog.get_song("1").unwrap().is_some());
    }
}
