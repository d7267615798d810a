//! HTTP shell around the [`Relay`].
//!
//! ## Routes
//!
//! - `GET /` - Redirect to the project site
//! - `GET /health` - Health check (JSON)
//! - `GET /embed?url=` - OG page for crawlers, redirect for everyone else
//! - `GET /api/embed?url=` - Handler result as JSON
//! - `GET /oembed`, `GET /owoembed` - oEmbed provider document
//! - `GET /activity/{data}`, `GET /activity/{data}/actor` - ActivityPub
//! - `GET /users/{author}`, `GET /users/{author}/statuses/{status}` - Legacy ActivityPub
//! - `GET /video/{instagram,threads}`, `GET /proxy/{pixiv,bilibili}` - Media proxies
//! - `GET /{platform}/{*path}` - Shortcut such as `/twitter/jack/status/20`

mod activity;
mod proxy;

use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::{Path, Query, RawQuery, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::config::Config;
use crate::embed::HandlerResult;
use crate::relay::Relay;
use crate::render::{self, OEmbedQuery, PROVIDER_URL};

/// Shared state handed to every route.
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

impl AppState {
    #[must_use]
    pub fn new(relay: Relay) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }

    fn config(&self) -> &Config {
        self.relay.config()
    }
}

/// Build the complete relay router with middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .route("/embed", get(embed))
        .route("/api/embed", get(api_embed))
        .route("/oembed", get(oembed))
        .route("/owoembed", get(owoembed))
        .route("/activity/{data}", get(activity::note))
        .route("/activity/{data}/actor", get(activity::actor))
        .route("/users/{author}", get(activity::legacy_actor))
        .route("/users/{author}/statuses/{status}", get(activity::legacy_status))
        .route("/video/instagram", get(proxy::instagram))
        .route("/video/threads", get(proxy::threads))
        .route("/proxy/pixiv", get(proxy::pixiv))
        .route("/proxy/bilibili", get(proxy::bilibili))
        .route("/{platform}/{*path}", get(platform_shortcut))
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `config.bind_addr` and serve until Ctrl-C.
pub async fn serve(relay: Relay) -> anyhow::Result<()> {
    let bind_addr = relay.config().bind_addr.clone();
    let app = router(AppState::new(relay));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "starting embed relay");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// ============================================================================
// Response helpers
// ============================================================================

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    redirect(StatusCode::FOUND, location)
}

fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(header::LOCATION, value)]).into_response(),
        Err(_) => bad_request("Invalid redirect target"),
    }
}

pub(crate) fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn with_cache_control(config: &Config, mut response: Response) -> Response {
    if let Some(value) = config
        .cache_control()
        .and_then(|v| HeaderValue::from_str(&v).ok())
    {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }
    response
}

#[derive(Debug, Deserialize)]
pub(crate) struct UrlQuery {
    url: Option<String>,
}

impl UrlQuery {
    pub(crate) fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

// ============================================================================
// Routes
// ============================================================================

async fn home() -> Response {
    found(&format!("{PROVIDER_URL}/"))
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "fixembed",
        version: crate::VERSION,
    })
}

/// Crawlers get the Open Graph page; people are sent to the post itself.
async fn embed(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(url) = query.url() else {
        return bad_request("Missing url parameter");
    };
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.relay.handle(url).await {
        HandlerResult::Success(data) if render::is_bot(user_agent) => {
            tracing::debug!(platform = %data.platform(), "serving embed page");
            let page = render::embed_page(&data, state.config());
            with_cache_control(state.config(), page.into_response())
        }
        HandlerResult::Success(data) => found(data.url()),
        HandlerResult::Failure(failure) => match failure.redirect_url() {
            Some(target) => found(target),
            None => {
                let message = failure.error_message().unwrap_or("Failed to fetch embed");
                render::error_page(message, url).into_response()
            }
        },
    }
}

/// Raw handler result for API consumers.
async fn api_embed(State(state): State<AppState>, Query(query): Query<UrlQuery>) -> Response {
    let Some(url) = query.url() else {
        return bad_request("Missing url parameter");
    };
    let Some(platform) = state.relay.dispatch(url).map(|h| h.platform()) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Unsupported URL", "supported": false })),
        )
            .into_response();
    };

    match state.relay.handle(url).await {
        HandlerResult::Success(data) => {
            let body = Json(json!({ "success": true, "platform": platform, "data": data }));
            with_cache_control(state.config(), body.into_response())
        }
        HandlerResult::Failure(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": failure.error_message().unwrap_or("Failed to fetch embed"),
                "redirect": failure.redirect_url(),
            })),
        )
            .into_response(),
    }
}

async fn oembed(State(state): State<AppState>, Query(query): Query<OEmbedQuery>) -> Response {
    if query.wants_xml() {
        (
            [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
            render::oembed_xml(&query, state.config()),
        )
            .into_response()
    } else {
        Json(render::oembed_json(&query, state.config())).into_response()
    }
}

/// Older oEmbed path some clients still request.
async fn owoembed(RawQuery(query): RawQuery) -> Response {
    let location = format!("/oembed?{}", query.unwrap_or_default());
    redirect(StatusCode::MOVED_PERMANENTLY, &location)
}

/// Host a shortcut prefix stands for.
fn shortcut_domain(platform: &str) -> Option<&'static str> {
    Some(match platform.to_ascii_lowercase().as_str() {
        "twitter" => "twitter.com",
        "x" => "x.com",
        "reddit" => "reddit.com",
        "youtube" | "yt" => "youtube.com",
        "bluesky" | "bsky" => "bsky.app",
        "instagram" | "ig" => "instagram.com",
        "threads" => "threads.net",
        "pixiv" => "pixiv.net",
        "bilibili" | "b23" => "bilibili.com",
        _ => return None,
    })
}

/// Original URL behind a shortcut path, query string included.
fn shortcut_target(platform: &str, path: &str, query: Option<&str>) -> Option<String> {
    let mut original = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("https://{}/{path}", shortcut_domain(platform)?)
    };
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        original.push('?');
        original.push_str(query);
    }
    Some(original)
}

async fn platform_shortcut(
    Path((platform, path)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Response {
    let Some(original) = shortcut_target(&platform, &path, query.as_deref()) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Unknown platform" })),
        )
            .into_response();
    };
    found(&format!("/embed?url={}", urlencoding::encode(&original)))
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
