use super::state::AppState;
use crate::backup::{self, listing};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

#[derive(Deserialize)]
struct RestoreRequest {
    filename: String,
}

pub async fn start_server(state: Arc<AppState>, port: u16) {
    let app = Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/backups", get(list_handler).post(trigger_handler))
        .route("/api/restore", post(restore_handler))
        .route("/api/scheduler/start", post(scheduler_start_handler))
        .route("/api/scheduler/stop", post(scheduler_stop_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    info!("Starting backup admin API on http://localhost:{}", port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Admin API server error: {}", e);
    }
}

fn check_auth(headers: &HeaderMap, state: &AppState) -> bool {
    let auth_header = match headers.get(header::AUTHORIZATION) {
        Some(h) => h,
        None => return false,
    };

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(_) => return false,
    };

    if !auth_str.starts_with("Basic ") {
        return false;
    }

    let decoded = match STANDARD.decode(&auth_str[6..]) {
        Ok(d) => d,
        Err(_) => return false,
    };

    let credentials = match String::from_utf8(decoded) {
        Ok(s) => s,
        Err(_) => return false,
    };

    let parts: Vec<&str> = credentials.splitn(2, ':').collect();
    if parts.len() != 2 {
        return false;
    }

    state.check_credentials(parts[0], parts[1])
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Backup Admin\"")],
        "Unauthorized",
    )
        .into_response()
}

async fn status_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let scheduler = state.scheduler.read().await;
    let history = state.history.read().await;

    let total_runs = history.len();
    let successful_runs = history.iter().filter(|b| b.success).count();

    #[derive(Serialize)]
    struct StatusData<'a> {
        scheduler: &'a super::state::SchedulerStatus,
        total_runs: usize,
        successful_runs: usize,
        recent: &'a [super::state::BackupEntry],
    }

    let data = StatusData {
        scheduler: &scheduler,
        total_runs,
        successful_runs,
        recent: &history[..history.len().min(10)],
    };

    Json(ApiResponse {
        success: true,
        data,
    })
    .into_response()
}

async fn list_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    match listing::list_backups(&state.config.backup.dir) {
        Ok(backups) => Json(ApiResponse {
            success: true,
            data: backups,
        })
        .into_response(),
        Err(e) => {
            error!("Failed to list backups: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn trigger_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    info!("Manual backup triggered via admin API");
    let result = {
        let _guard = state.run_lock.lock().await;
        backup::run_backup(&state.config).await
    };
    state.record_backup(&result).await;

    Json(ApiResponse {
        success: result.success,
        data: result,
    })
    .into_response()
}

async fn restore_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RestoreRequest>,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    info!("Restore of {} triggered via admin API", request.filename);
    let result = {
        let _guard = state.run_lock.lock().await;
        backup::restore_backup(&state.config, &request.filename).await
    };

    Json(ApiResponse {
        success: result.success,
        data: result,
    })
    .into_response()
}

async fn scheduler_start_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let mut slot = state.scheduler_handle.lock().await;
    if slot.is_some() {
        return Json(ApiResponse {
            success: true,
            data: "scheduler already running",
        })
        .into_response();
    }

    match backup::start_backup_scheduler(state.config.clone(), state.clone()) {
        Some(handle) => {
            *slot = Some(handle);
            Json(ApiResponse {
                success: true,
                data: "scheduler started",
            })
            .into_response()
        }
        None => Json(ApiResponse {
            success: false,
            data: "scheduler not started; see service logs",
        })
        .into_response(),
    }
}

async fn scheduler_stop_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state) {
        return unauthorized();
    }

    let handle = state.scheduler_handle.lock().await.take();
    match handle {
        Some(handle) => {
            backup::stop_backup_scheduler(handle).await;
            Json(ApiResponse {
                success: true,
                data: "scheduler stopped",
            })
            .into_response()
        }
        None => Json(ApiResponse {
            success: true,
            data: "scheduler was not running",
        })
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::http::HeaderValue;

    fn state_with_credentials(username: &str, password: &str) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.web.username = username.to_string();
        config.web.password = password.to_string();
        AppState::new(Arc::new(config))
    }

    fn basic_auth_headers(username: &str, password: &str) -> HeaderMap {
        let encoded = STANDARD.encode(format!("{}:{}", username, password));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_check_auth_accepts_valid_credentials() {
        let state = state_with_credentials("admin", "hunter2");
        assert!(check_auth(&basic_auth_headers("admin", "hunter2"), &state));
    }

    #[test]
    fn test_check_auth_rejects_bad_credentials() {
        let state = state_with_credentials("admin", "hunter2");
        assert!(!check_auth(&basic_auth_headers("admin", "wrong"), &state));
        assert!(!check_auth(&HeaderMap::new(), &state));
    }

    #[test]
    fn test_check_auth_rejects_malformed_header() {
        let state = state_with_credentials("admin", "hunter2");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token"),
        );
        assert!(!check_auth(&headers, &state));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic notbase64!!!"),
        );
        assert!(!check_auth(&headers, &state));
    }
}
