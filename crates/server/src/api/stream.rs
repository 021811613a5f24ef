use axum::{
    extract::{Path as AxumPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};

use crate::range::parse_range_header;
use crate::state::AppState;
use crate::streaming::{stream_file, StreamError, DEFAULT_AUDIO_MIME};
use crate::utils::{json_error_response, run_catalog};

const DEFAULT_ARTWORK_MIME: &str = "image/jpeg";

pub async fn stream_song(
    State(state): State<AppState>,
    AxumPath(song_id): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let catalog = state.catalog.clone();
    let lookup_id = song_id.clone();
    let song = match run_catalog(move || catalog.get_song(&lookup_id)).await {
        Ok(Some(song)) => song,
        Ok(None) => return json_error_response(StatusCode::NOT_FOUND, "song not found"),
        Err(err) => return err.into_response(),
    };

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let path = state.layout.resolve(&song.file_path);
    let response = match stream_file(&path, range, state.chunk_size(), DEFAULT_AUDIO_MIME).await {
        Ok(response) => response,
        Err(StreamError::NotFound) => {
            warn!("Audio file missing for song {}: {:?}", song.id, path);
            return json_error_response(StatusCode::NOT_FOUND, "audio file not found");
        }
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("stream failed: {}", err),
            )
        }
    };

    if response.status().is_success() && starts_at_beginning(range) {
        let catalog = state.catalog.clone();
        match run_catalog(move || catalog.record_play(&song_id)).await {
            Ok(count) => debug!("Play recorded for {:?}: {:?}", song.id, count),
            Err((_, Json(body))) => warn!("Failed to record play for {}: {}", song.id, body.error),
        }
    }
    response
}

pub async fn stream_album_art(
    State(state): State<AppState>,
    AxumPath(song_id): AxumPath<String>,
) -> Response {
    let catalog = state.catalog.clone();
    let song = match run_catalog(move || catalog.get_song(&song_id)).await {
        Ok(Some(song)) => song,
        Ok(None) => return json_error_response(StatusCode::NOT_FOUND, "song not found"),
        Err(err) => return err.into_response(),
    };
    let art_path = match song.album_art_path.as_deref().filter(|p| !p.is_empty()) {
        Some(path) => state.layout.resolve(path),
        None => return json_error_response(StatusCode::NOT_FOUND, "album art not found"),
    };

    match stream_file(&art_path, None, state.chunk_size(), DEFAULT_ARTWORK_MIME).await {
        Ok(response) => response,
        Err(StreamError::NotFound) => {
            json_error_response(StatusCode::NOT_FOUND, "album art not found")
        }
        Err(err) => json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("stream failed: {}", err),
        ),
    }
}

// A request without a range, or one starting at byte 0, counts as a new play.
fn starts_at_beginning(range: Option<&str>) -> bool {
    match range {
        None => true,
        Some(value) => parse_range_header(value, u64::MAX)
            .map(|range| range.start == 0)
            .unwrap_or(false),
    }
}
