//! Media proxies for CDNs that refuse Discord's fetcher.
//!
//! Each route replays the headers its CDN expects and streams the body
//! straight through. Targets are limited to the platform's own media hosts.
//! If the upstream refuses, the client is redirected to the raw URL, which
//! is no worse than not proxying at all.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use super::{bad_request, found, AppState, UrlQuery};
use crate::http_client::UpstreamClient;
use crate::profile::{HeaderProfile, TELEGRAM_UA};

/// How one proxy route talks to its CDN and what it sends back.
#[derive(Debug)]
struct MediaRoute {
    name: &'static str,
    profile: HeaderProfile,
    /// Registrable domains the target host must equal or end with.
    hosts: &'static [&'static str],
    missing: &'static str,
    content_type: &'static str,
    /// Prefer the upstream `Content-Type` over `content_type`.
    upstream_type: bool,
    /// Forward `Range` (default `bytes=0-`) and pass 206 responses through.
    ranges: bool,
    accept_ranges: bool,
    cache_control: Option<&'static str>,
}

const INSTAGRAM: MediaRoute = MediaRoute {
    name: "instagram",
    profile: HeaderProfile::discordbot()
        .with_user_agent(TELEGRAM_UA)
        .with_accept("*/*"),
    hosts: &["cdninstagram.com", "fbcdn.net"],
    missing: "Missing video URL",
    content_type: "video/mp4",
    upstream_type: false,
    ranges: false,
    accept_ranges: true,
    cache_control: None,
};

const THREADS: MediaRoute = MediaRoute {
    name: "threads",
    ..INSTAGRAM
};

const PIXIV: MediaRoute = MediaRoute {
    name: "pixiv",
    profile: HeaderProfile::desktop()
        .with_referer("https://www.pixiv.net/")
        .with_accept("image/*"),
    hosts: &["pximg.net"],
    missing: "Missing image URL",
    content_type: "image/jpeg",
    upstream_type: true,
    ranges: false,
    accept_ranges: false,
    cache_control: Some("public, max-age=86400"),
};

const BILIBILI: MediaRoute = MediaRoute {
    name: "bilibili",
    profile: HeaderProfile::desktop()
        .with_referer("https://www.bilibili.com/")
        .with_accept("video/*,*/*"),
    hosts: &["bilivideo.com", "bilivideo.cn", "hdslb.com", "akamaized.net"],
    missing: "Missing video URL",
    content_type: "video/mp4",
    upstream_type: true,
    ranges: true,
    accept_ranges: true,
    cache_control: Some("public, max-age=3600"),
};

impl MediaRoute {
    fn allows(&self, target: &str) -> bool {
        let Ok(url) = Url::parse(target) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return false;
        };
        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

pub(super) async fn instagram(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
    headers: HeaderMap,
) -> Response {
    proxy(&state, &INSTAGRAM, &query, &headers).await
}

pub(super) async fn threads(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
    headers: HeaderMap,
) -> Response {
    proxy(&state, &THREADS, &query, &headers).await
}

pub(super) async fn pixiv(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
    headers: HeaderMap,
) -> Response {
    proxy(&state, &PIXIV, &query, &headers).await
}

pub(super) async fn bilibili(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
    headers: HeaderMap,
) -> Response {
    proxy(&state, &BILIBILI, &query, &headers).await
}

async fn proxy(
    state: &AppState,
    route: &MediaRoute,
    query: &UrlQuery,
    headers: &HeaderMap,
) -> Response {
    let Some(target) = query.url() else {
        return bad_request(route.missing);
    };
    if !route.allows(target) {
        tracing::warn!(route = route.name, target = %target, "proxy target host not allowed");
        return bad_request("URL not allowed for this proxy");
    }
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    relay_media(state.relay.client(), route, target, range).await
}

/// Fetch `target` with the route's headers and stream it back.
async fn relay_media(
    client: &UpstreamClient,
    route: &MediaRoute,
    target: &str,
    range: Option<&str>,
) -> Response {
    let range = route.ranges.then(|| range.unwrap_or("bytes=0-"));
    let upstream = match client.stream(target, &route.profile, range).await {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!(route = route.name, error = %err, "media upstream failed, redirecting");
            return found(target);
        }
    };

    let status = if route.ranges {
        upstream.status()
    } else {
        StatusCode::OK
    };

    let mut headers = HeaderMap::new();
    let content_type = route
        .upstream_type
        .then(|| upstream.headers().get(header::CONTENT_TYPE).cloned())
        .flatten()
        .unwrap_or(HeaderValue::from_static(route.content_type));
    headers.insert(header::CONTENT_TYPE, content_type);
    if route.accept_ranges {
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    }
    if let Some(cache) = route.cache_control {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache));
    }
    if let Some(length) = upstream.headers().get(header::CONTENT_LENGTH) {
        headers.insert(header::CONTENT_LENGTH, length.clone());
    }
    if route.ranges {
        if let Some(content_range) = upstream.headers().get(header::CONTENT_RANGE) {
            headers.insert(header::CONTENT_RANGE, content_range.clone());
        }
    }

    (status, headers, Body::from_stream(upstream.bytes_stream())).into_response()
}
