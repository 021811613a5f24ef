use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalog::CatalogError;

use crate::state::ErrorResponse;

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn json_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_error(status, message).into_response()
}

pub fn catalog_error(err: CatalogError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        CatalogError::InvalidInput(message) => json_error(StatusCode::BAD_REQUEST, message),
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("catalog error: {}", other),
        ),
    }
}

/// Runs blocking catalog work off the async runtime.
pub async fn run_catalog<T, F>(task: F) -> Result<T, (StatusCode, Json<ErrorResponse>)>
where
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result.map_err(catalog_error),
        Err(err) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("task failed: {}", err),
        )),
    }
}
