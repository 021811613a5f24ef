pub mod admin;
pub mod songs;
pub mod stream;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::state::{AppState, HealthResponse};
use crate::utils::json_error_response;

pub fn api_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/stream/songs/:song_id", get(stream::stream_song))
        .route("/stream/songs/:song_id/album-art", get(stream::stream_album_art))
        .route("/songs", get(songs::list_songs))
        .route(
            "/songs/:song_id",
            get(songs::get_song)
                .patch(songs::update_song)
                .delete(songs::delete_song),
        )
        .route("/admin/cleanup", post(admin::cleanup))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn require_auth(
    State(state): State<AppState>,
    req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let expected = state.config.read().api_token().map(str::to_string);
    let expected = match expected {
        Some(token) => token,
        None => return next.run(req).await,
    };
    match extract_token(req.headers()) {
        Some(token) if token == expected => next.run(req).await,
        _ => json_error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
    }
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  secret "));
        assert_eq!(extract_token(&headers), Some("secret".to_string()));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_token(&headers), None);
    }
}
