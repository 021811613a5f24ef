use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use catalog::{Catalog, StorageLayout};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub layout: StorageLayout,
    pub config: Arc<RwLock<ServerConfig>>,
}

impl AppState {
    pub fn chunk_size(&self) -> usize {
        self.config.read().stream_chunk_size
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteSongResponse {
    pub id: String,
    pub files_removed: usize,
    pub bytes_reclaimed: u64,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

impl Default for CleanupRequest {
    fn default() -> Self {
        Self {
            mode: None,
            dry_run: default_dry_run(),
        }
    }
}

fn default_dry_run() -> bool {
    true
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
