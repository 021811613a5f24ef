use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use catalog::{ImportOptions, StorageLayout, DEFAULT_PREVIEW_LIMIT};
use serde::{Deserialize, Serialize};

use crate::streaming::DEFAULT_CHUNK_SIZE;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub port: u16,
    pub catalog_path: String,
    pub upload_dir: String,
    /// Overrides `<upload_dir>/audio` when set.
    pub audio_dir: String,
    /// Overrides `<upload_dir>/artwork` when set.
    pub artwork_dir: String,
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
    pub stream_chunk_size: usize,
    pub orphan_preview_limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let import = ImportOptions::default();
        Self {
            version: CONFIG_VERSION,
            port: 8000,
            catalog_path: "catalog.redb".to_string(),
            upload_dir: "uploads".to_string(),
            audio_dir: String::new(),
            artwork_dir: String::new(),
            max_file_size: import.max_file_size,
            allowed_extensions: import.allowed_extensions,
            stream_chunk_size: DEFAULT_CHUNK_SIZE,
            orphan_preview_limit: DEFAULT_PREVIEW_LIMIT,
            api_token: None,
        }
    }
}

impl ServerConfig {
    pub fn storage_layout(&self, config_path: &Path) -> StorageLayout {
        let upload_dir = resolve_path(config_path, non_empty_or(&self.upload_dir, "uploads"));
        let audio_root = match self.audio_dir.trim() {
            "" => upload_dir.join("audio"),
            value => resolve_path(config_path, value),
        };
        let artwork_root = match self.artwork_dir.trim() {
            "" => upload_dir.join("artwork"),
            value => resolve_path(config_path, value),
        };
        StorageLayout::new(config_base(config_path), audio_root, artwork_root)
    }

    pub fn catalog_path(&self, config_path: &Path) -> PathBuf {
        resolve_path(config_path, non_empty_or(&self.catalog_path, "catalog.redb"))
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            max_file_size: self.max_file_size,
            allowed_extensions: self
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("SOUNDVAULT_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.port == 0 {
            config.port = 8000;
        }
        if config.stream_chunk_size == 0 {
            config.stream_chunk_size = DEFAULT_CHUNK_SIZE;
        }
        if config.allowed_extensions.is_empty() {
            config.allowed_extensions = ImportOptions::default().allowed_extensions;
        }
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    config_base(config_path).join(raw)
}

fn config_base(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}
