use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    Json,
};
use catalog::{remove_song, SongUpdate};
use common::Song;

use crate::state::{AppState, DeleteSongResponse, JsonResult, ListResponse};
use crate::utils::{json_error, run_catalog};

pub async fn list_songs(State(state): State<AppState>) -> JsonResult<ListResponse<Song>> {
    let catalog = state.catalog.clone();
    let items = run_catalog(move || catalog.list_songs()).await?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

pub async fn get_song(
    State(state): State<AppState>,
    AxumPath(song_id): AxumPath<String>,
) -> JsonResult<Song> {
    let catalog = state.catalog.clone();
    match run_catalog(move || catalog.get_song(&song_id)).await? {
        Some(song) => Ok(Json(song)),
        None => Err(json_error(StatusCode::NOT_FOUND, "song not found")),
    }
}

pub async fn update_song(
    State(state): State<AppState>,
    AxumPath(song_id): AxumPath<String>,
    Json(update): Json<SongUpdate>,
) -> JsonResult<Song> {
    let catalog = state.catalog.clone();
    match run_catalog(move || catalog.update_song_metadata(&song_id, update)).await? {
        Some(song) => Ok(Json(song)),
        None => Err(json_error(StatusCode::NOT_FOUND, "song not found")),
    }
}

pub async fn delete_song(
    State(state): State<AppState>,
    AxumPath(song_id): AxumPath<String>,
) -> JsonResult<DeleteSongResponse> {
    let catalog = state.catalog.clone();
    let layout = state.layout.clone();
    match run_catalog(move || remove_song(&catalog, &layout, &song_id)).await? {
        Some(removal) => Ok(Json(DeleteSongResponse {
            id: removal.song.id,
            files_removed: removal.files_removed,
            bytes_reclaimed: removal.bytes_reclaimed,
        })),
        None => Err(json_error(StatusCode::NOT_FOUND, "song not found")),
    }
}
