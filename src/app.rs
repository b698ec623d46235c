use crate::api::{MediaApi, SimulatedDelays};
use crate::cache::{Clock, SystemClock};
use crate::catalog::{FetchError, InMemoryCatalog};
use crate::config::AppConfig;
use crate::models::Media;
use crate::notify::{LogNotifier, Notifier};
use crate::player::{PlaybackRequest, VideoSource};
use crate::profile::{
    DisplayNameChange, HttpProfileClient, InMemoryProfileStore, LoginInfo, NewUser, ProfileApi,
    ProfileError, ProfileService, ProfileUpdate,
};
use crate::search::SearchController;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub media: Arc<MediaApi>,
    pub profiles: Arc<dyn ProfileApi>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvalidateRequest {
    key: Option<String>,
    prefix: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchPayload {
    id: String,
    title: String,
    video_url: String,
    sources: Vec<VideoSource>,
}

pub fn build_state(config: &AppConfig) -> Result<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let catalog = InMemoryCatalog::seeded()?;
    info!("Loaded {} catalog records", catalog.records().len());

    let delays = if config.simulated_delay {
        SimulatedDelays::realistic()
    } else {
        SimulatedDelays::none()
    };
    let media = MediaApi::new(
        Arc::new(catalog),
        Arc::new(LogNotifier),
        config.cache_ttl,
        config.cache_max_entries,
        clock.clone(),
    )
    .with_delays(delays);
    let profiles = InMemoryProfileStore::new(clock, config.name_change_cooldown_days);

    Ok(AppState {
        media: Arc::new(media),
        profiles: Arc::new(profiles),
    })
}

/// Front-end services for a consumer of a running server: search over the
/// shared media API and profile edits sent to `profile_api_url`.
pub struct ClientServices {
    pub search: SearchController,
    pub profiles: ProfileService,
}

pub fn build_client(
    config: &AppConfig,
    media: Arc<MediaApi>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
) -> Result<ClientServices> {
    let api = HttpProfileClient::new(config.profile_api_url.clone())?;
    debug!(url = %config.profile_api_url, "Profile client configured");
    Ok(ClientServices {
        search: SearchController::new(media, config.search),
        profiles: ProfileService::new(
            Arc::new(api),
            notifier,
            clock,
            config.name_change_cooldown_days,
        ),
    })
}

pub async fn run_server(config: AppConfig) -> Result<()> {
    let state = build_state(&config)?;
    let app = build_router(state);

    info!("Listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/catalog/trending", get(trending))
        .route("/api/catalog/popular", get(popular))
        .route("/api/catalog/series", get(web_series))
        .route("/api/catalog/tv", get(tv_shows))
        .route("/api/catalog/search", get(search))
        .route("/api/catalog/:id", get(movie_by_id))
        .route("/api/watch/:id", get(watch))
        .route("/api/cache/invalidate", post(invalidate_cache))
        .route("/api/users", post(create_user))
        .route("/api/users/:uid", get(get_user).put(update_user))
        .route("/api/users/:uid/login-info", put(update_login_info))
        .route("/api/users/:uid/display-name", put(change_display_name))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"status": "error", "message": message.into()})),
    )
        .into_response()
}

fn etag_for(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

fn matches_etag(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .any(|tag| tag == "*" || tag == etag || tag.strip_prefix("W/") == Some(etag))
        })
        .unwrap_or(false)
}

/// JSON body with a content hash `ETag`; answers 304 when the client already
/// holds this exact body.
fn cacheable_json<T: Serialize>(headers: &HeaderMap, value: &T) -> Response {
    let body = match serde_json::to_vec(value) {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to serialize response: {}", e);
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode response");
        }
    };
    let etag = etag_for(&body);
    let etag_header = match HeaderValue::from_str(&etag) {
        Ok(v) => v,
        Err(_) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Invalid ETag"),
    };
    if matches_etag(headers, &etag) {
        debug!(etag = %etag, "Not modified");
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag_header)]).into_response();
    }
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::ETAG, etag_header),
        ],
        body,
    )
        .into_response()
}

fn fetch_failed(err: FetchError) -> Response {
    error_body(StatusCode::BAD_GATEWAY, err.to_string())
}

fn list_response(headers: &HeaderMap, result: Result<Vec<Media>, FetchError>) -> Response {
    match result {
        Ok(items) => cacheable_json(headers, &items),
        Err(e) => fetch_failed(e),
    }
}

async fn trending(State(state): State<AppState>, headers: HeaderMap) -> Response {
    list_response(&headers, state.media.fetch_trending().await)
}

async fn popular(State(state): State<AppState>, headers: HeaderMap) -> Response {
    list_response(&headers, state.media.fetch_popular().await)
}

async fn web_series(State(state): State<AppState>, headers: HeaderMap) -> Response {
    list_response(&headers, state.media.fetch_web_series().await)
}

async fn tv_shows(State(state): State<AppState>, headers: HeaderMap) -> Response {
    list_response(&headers, state.media.fetch_tv_shows().await)
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
) -> Response {
    let term = params.q.unwrap_or_default();
    list_response(&headers, state.media.fetch_movies(&term).await)
}

async fn movie_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.media.fetch_movie_by_id(&id).await {
        Ok(Some(media)) => cacheable_json(&headers, &media),
        Ok(None) => error_body(StatusCode::NOT_FOUND, format!("Movie {} not found", id)),
        Err(e) => fetch_failed(e),
    }
}

async fn watch(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.media.fetch_movie_by_id(&id).await {
        Ok(Some(media)) => {
            let request = PlaybackRequest::for_media(&media);
            Json(WatchPayload {
                id: media.id.clone(),
                title: request.title().to_string(),
                video_url: request.url().to_string(),
                sources: request.sources(),
            })
            .into_response()
        }
        Ok(None) => error_body(StatusCode::NOT_FOUND, format!("Movie {} not found", id)),
        Err(e) => fetch_failed(e),
    }
}

async fn invalidate_cache(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Response {
    let removed = match (req.key, req.prefix) {
        (Some(key), None) => usize::from(state.media.invalidate(&key).await),
        (None, Some(prefix)) => state.media.invalidate_prefix(&prefix).await,
        _ => {
            return error_body(
                StatusCode::BAD_REQUEST,
                "Provide exactly one of \"key\" or \"prefix\"",
            )
        }
    };
    info!("Invalidated {} cache entries", removed);
    Json(json!({"status": "ok", "removed": removed})).into_response()
}

fn profile_error(err: ProfileError) -> Response {
    let status = match &err {
        ProfileError::NotFound(_) => StatusCode::NOT_FOUND,
        ProfileError::EmptyName | ProfileError::SameName | ProfileError::Invalid(_) => {
            StatusCode::BAD_REQUEST
        }
        ProfileError::Cooldown { days_remaining } => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "status": "error",
                    "message": err.to_string(),
                    "daysRemaining": days_remaining,
                })),
            )
                .into_response();
        }
        ProfileError::Server { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        ProfileError::Transport(_) | ProfileError::Identity(_) => StatusCode::BAD_GATEWAY,
    };
    error_body(status, err.to_string())
}

async fn create_user(State(state): State<AppState>, Json(user): Json<NewUser>) -> Response {
    match state.profiles.create_user(user).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => profile_error(e),
    }
}

async fn get_user(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    match state.profiles.get_user(&uid).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => profile_error(e),
    }
}

async fn update_user(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    match state.profiles.update_user(&uid, update).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => profile_error(e),
    }
}

async fn update_login_info(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(login): Json<LoginInfo>,
) -> Response {
    match state.profiles.update_login_info(&uid, login).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => profile_error(e),
    }
}

async fn change_display_name(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(change): Json<DisplayNameChange>,
) -> Response {
    match state
        .profiles
        .change_display_name(&uid, &change.display_name)
        .await
    {
        Ok(user) => Json(user).into_response(),
        Err(e) => {
            warn!(uid = %uid, "Display name change rejected: {}", e);
            profile_error(e)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
