//! Upstream HTTP Client
//!
//! One reqwest client shared by every handler:
//! - HTTP/2 negotiated via ALPN, HTTP/1.1 fallback
//! - rustls, Brotli/Gzip/Deflate/Zstd
//! - Connection pooling with keep-alive
//! - A hard per-request timeout, so a slow upstream is just a failed tier
//!
//! Headers are not baked into the client: each call passes the
//! [`HeaderProfile`] its upstream expects.
//!
//! Media streams use a sibling client bounded by an idle read timeout
//! instead of a total one, so a long video is not cut off mid-body.

use std::time::Duration;

use anyhow::Result;
use reqwest::header::LOCATION;
use reqwest::{Client, ClientBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::{FetchError, FetchResult};
use crate::profile::HeaderProfile;

/// HTTP client for upstream platform APIs
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    media: Client,
    redirects: Client,
    timeout: Duration,
}

/// Hops a short link may take before resolution gives up.
const MAX_REDIRECTS: usize = 10;

impl UpstreamClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = base_builder(timeout).timeout(timeout).build()?;
        let media = base_builder(timeout).read_timeout(timeout).build()?;
        let redirects = base_builder(timeout)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            media,
            redirects,
            timeout,
        })
    }

    /// Per-request timeout this client was built with
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET a URL, failing on any non-2xx status
    #[instrument(skip(self, profile), fields(url = %url))]
    pub async fn get(&self, url: &str, profile: &HeaderProfile) -> FetchResult<Response> {
        debug!("Fetching upstream");
        let response = self
            .client
            .get(url)
            .headers(profile.to_headers())
            .send()
            .await?;
        ensure_success(response)
    }

    /// GET and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        profile: &HeaderProfile,
    ) -> FetchResult<T> {
        let response = self.get(url, profile).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// GET and return the body as text
    pub async fn get_text(&self, url: &str, profile: &HeaderProfile) -> FetchResult<String> {
        let response = self.get(url, profile).await?;
        Ok(response.text().await?)
    }

    /// POST an urlencoded form and decode a JSON body
    #[instrument(skip(self, profile, form), fields(url = %url))]
    pub async fn post_form_json<T: DeserializeOwned>(
        &self,
        url: &str,
        profile: &HeaderProfile,
        form: &[(&str, &str)],
    ) -> FetchResult<T> {
        debug!("Posting form upstream");
        let response = self
            .client
            .post(url)
            .headers(profile.to_headers())
            .form(form)
            .send()
            .await?;
        let bytes = ensure_success(response)?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Follow a short link's redirects until a hop lands on a URL `accept`
    /// recognizes, or the chain ends.
    ///
    /// Uses HEAD and walks `Location` headers one hop at a time, so a
    /// recognized target is never requested.
    #[instrument(skip(self, profile, accept), fields(url = %url))]
    pub async fn resolve_redirect(
        &self,
        url: &str,
        profile: &HeaderProfile,
        accept: impl Fn(&str) -> bool,
    ) -> FetchResult<String> {
        let mut current = Url::parse(url)
            .map_err(|err| FetchError::Upstream(format!("invalid short link {url}: {err}")))?;
        let mut hops = 0;

        while hops < MAX_REDIRECTS {
            let response = self
                .redirects
                .head(current.clone())
                .headers(profile.to_headers())
                .send()
                .await?;
            let next = response
                .status()
                .is_redirection()
                .then(|| response.headers().get(LOCATION))
                .flatten()
                .and_then(|location| location.to_str().ok())
                .and_then(|location| current.join(location).ok());
            let Some(next) = next else {
                debug!(status = %response.status(), "Redirect chain ended");
                break;
            };

            hops += 1;
            current = next;
            if accept(current.as_str()) {
                break;
            }
        }

        if hops == 0 {
            return Err(FetchError::Upstream(format!(
                "short link {url} did not redirect"
            )));
        }
        debug!(resolved = %current, hops, "Short link resolved");
        Ok(current.into())
    }

    /// Open a media stream, forwarding the caller's `Range` if any.
    ///
    /// `206 Partial Content` counts as success; the body is left unread for
    /// the caller to stream.
    #[instrument(skip(self, profile), fields(url = %url))]
    pub async fn stream(
        &self,
        url: &str,
        profile: &HeaderProfile,
        range: Option<&str>,
    ) -> FetchResult<Response> {
        debug!("Opening media stream");
        let mut request = self.media.get(url).headers(profile.to_headers());
        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range);
        }
        ensure_success(request.send().await?)
    }

    /// Get the underlying reqwest client
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

fn base_builder(timeout: Duration) -> ClientBuilder {
    Client::builder()
        // ═══════════════════════════════════════════════════════════════
        // CONNECTION
        // ═══════════════════════════════════════════════════════════════
        // Let the server negotiate HTTP/2; mirrors are often HTTP/1.1 only
        .http2_adaptive_window(true)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        // ═══════════════════════════════════════════════════════════════
        // TLS
        // ═══════════════════════════════════════════════════════════════
        .use_rustls_tls()
        // ═══════════════════════════════════════════════════════════════
        // COMPRESSION (auto-negotiated via Accept-Encoding)
        // ═══════════════════════════════════════════════════════════════
        .brotli(true)
        .zstd(true)
        .gzip(true)
        .deflate(true)
        // ═══════════════════════════════════════════════════════════════
        // TIMEOUTS
        // ═══════════════════════════════════════════════════════════════
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        // ═══════════════════════════════════════════════════════════════
        // REDIRECTS
        // ═══════════════════════════════════════════════════════════════
        // Followed so short links resolve; no cookie store, requests
        // never share state.
        .redirect(reqwest::redirect::Policy::limited(10))
}

fn ensure_success(response: Response) -> FetchResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::Status {
            status: status.as_u16(),
        })
    }
}
