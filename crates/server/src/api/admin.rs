use axum::{extract::State, http::StatusCode, Json};
use catalog::{run_cleanup, CleanupOptions};
use common::{CleanupMode, CleanupReport};
use tracing::{info, warn};

use crate::state::{AppState, CleanupRequest, JsonResult};
use crate::utils::json_error;

pub async fn cleanup(
    State(state): State<AppState>,
    body: Option<Json<CleanupRequest>>,
) -> JsonResult<CleanupReport> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let mode = resolve_mode(&request).map_err(|message| json_error(StatusCode::BAD_REQUEST, message))?;
    let options = CleanupOptions {
        mode,
        preview_limit: state.config.read().orphan_preview_limit,
    };
    info!("Cleanup requested ({:?})", mode);

    let catalog = state.catalog.clone();
    let layout = state.layout.clone();
    match tokio::task::spawn_blocking(move || run_cleanup(&catalog, &layout, options)).await {
        Ok(Ok(report)) => Ok(Json(report)),
        Ok(Err(err)) => {
            warn!("Cleanup failed: {}", err);
            Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("cleanup failed: {}", err),
            ))
        }
        Err(err) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cleanup failed: {}", err),
        )),
    }
}

/// `dry_run: true` wins over any mode; otherwise the mode decides and a
/// missing mode means a full run.
fn resolve_mode(request: &CleanupRequest) -> Result<CleanupMode, String> {
    let mode = match request.mode.as_deref() {
        Some(value) => {
            CleanupMode::parse(value).ok_or_else(|| format!("invalid mode: {}", value))?
        }
        None => CleanupMode::Full,
    };
    if request.dry_run {
        Ok(CleanupMode::DryRun)
    } else {
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::TestApp;

    fn request(mode: Option<&str>, dry_run: bool) -> CleanupRequest {
        CleanupRequest {
            mode: mode.map(str::to_string),
            dry_run,
        }
    }

    #[test]
    fn dry_run_flag_or_mode_selects_dry_run() {
        assert_eq!(resolve_mode(&request(Some("full"), true)), Ok(CleanupMode::DryRun));
        assert_eq!(resolve_mode(&request(Some("dry-run"), false)), Ok(CleanupMode::DryRun));
        assert_eq!(resolve_mode(&request(Some("full"), false)), Ok(CleanupMode::Full));
        assert_eq!(resolve_mode(&request(None, false)), Ok(CleanupMode::Full));
        assert_eq!(resolve_mode(&CleanupRequest::default()), Ok(CleanupMode::DryRun));
        assert!(resolve_mode(&request(Some("nuke"), false)).is_err());
    }

    #[test]
    fn request_body_defaults_to_dry_run() {
        let parsed: CleanupRequest = serde_json::from_str(r#"{"mode":"full"}"#).unwrap();
        assert!(parsed.dry_run);
        let parsed: CleanupRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.mode, None);
    }

    fn seed(app: &TestApp) {
        for (id, created_at) in [("a", 1u64), ("b", 2)] {
            let audio = app.write_audio(&format!("u1/{}.mp3", id), b"12345");
            app.insert(id, "Same", created_at, &audio);
        }
        app.write_audio("u1/stray.mp3", b"xyz");
    }

    #[tokio::test]
    async fn default_request_only_reports() {
        let app = TestApp::new();
        seed(&app);

        let Json(report) = cleanup(State(app.state.clone()), None).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.orphaned_audio_removed, 1);
        assert_eq!(report.space_saved, 5 + 3);
        assert_eq!(app.state.catalog.count_songs().unwrap(), 2);
    }

    #[tokio::test]
    async fn full_request_removes_duplicates_and_orphans() {
        let app = TestApp::new();
        seed(&app);

        let body = Json(request(Some("full"), false));
        let Json(report) = cleanup(State(app.state.clone()), Some(body)).await.unwrap();
        assert!(!report.dry_run);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.orphaned_audio_removed, 1);
        assert_eq!(report.orphaned_artwork_removed, 0);
        assert_eq!(report.space_saved, 5 + 3);
        assert_eq!(report.duplicate_details.len(), 1);
        assert_eq!(report.duplicate_details[0].count, 2);

        let songs = app.state.catalog.list_songs().unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].id, "a");
    }

    #[tokio::test]
    async fn unknown_mode_is_rejected() {
        let app = TestApp::new();
        let body = Json(request(Some("everything"), false));
        let (status, Json(error)) = cleanup(State(app.state.clone()), Some(body))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.error, "invalid mode: everything");
    }

    #[tokio::test]
    async fn catalog_failure_is_a_single_server_error() {
        use catalog::Catalog;
        use redb::{Database, TableDefinition};
        use std::sync::Arc;

        const SONGS: TableDefinition<&str, &[u8]> = TableDefinition::new("songs");

        let mut app = TestApp::new();
        let db = Database::create(app.temp.path().join("broken.redb")).unwrap();
        let write_txn = db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(SONGS).unwrap();
            table.insert("bad", [0xffu8].as_slice()).unwrap();
        }
        write_txn.commit().unwrap();
        app.state.catalog = Catalog::with_db(Arc::new(db));
        app.write_audio("u1/stray.mp3", b"xyz");

        let body = Json(request(Some("full"), false));
        let (status, Json(error)) = cleanup(State(app.state.clone()), Some(body))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.error.starts_with("cleanup failed: "), "{}", error.error);
        assert!(app.state.layout.audio_root.join("u1/stray.mp3").exists());
    }
}
