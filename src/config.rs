//! Relay configuration loaded from environment variables.

use std::time::Duration;

use anyhow::Context as _;

/// Default Invidious instances tried for YouTube metadata.
pub const DEFAULT_INVIDIOUS_INSTANCES: &[&str] = &[
    "https://invidious.io.lol",
    "https://iv.nboeck.de",
    "https://invidious.einfachzocken.eu",
];

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8787").
    pub bind_addr: String,

    /// Public host of this relay, substituted into media proxy URLs.
    pub embed_domain: String,

    /// Provider name reported in oEmbed and ActivityPub documents.
    pub site_name: String,

    /// Prefix of every branded `og:site_name`.
    pub branding_name: String,

    /// Bound on every upstream request and every fetch tier.
    pub upstream_timeout: Duration,

    /// Whether embed responses carry a public `Cache-Control` header.
    pub enable_cache: bool,

    /// `max-age` used when `enable_cache` is set.
    pub cache_ttl: Duration,

    /// Invidious instances for YouTube, tried in selector order.
    pub invidious_instances: Vec<String>,

    /// Upstream base URLs.
    pub endpoints: Endpoints,
}

/// Base URLs of every upstream the handlers talk to.
///
/// Only overridden in tests, where they all point at one mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub twitter_syndication: String,
    pub fxtwitter: String,
    pub reddit: String,
    pub youtube: String,
    pub bluesky: String,
    pub instagram: String,
    pub instagram_api: String,
    pub threads: String,
    pub phixiv: String,
    pub pixiv: String,
    pub bilibili: String,
    /// Short-link hosts, resolved by redirect before any API call.
    pub redd_it: String,
    pub b23: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            twitter_syndication: "https://cdn.syndication.twimg.com".into(),
            fxtwitter: "https://api.fxtwitter.com".into(),
            reddit: "https://www.reddit.com".into(),
            youtube: "https://www.youtube.com".into(),
            bluesky: "https://public.api.bsky.app".into(),
            instagram: "https://www.instagram.com".into(),
            instagram_api: "https://api.instagram.com".into(),
            threads: "https://www.threads.net".into(),
            phixiv: "https://phixiv.net".into(),
            pixiv: "https://www.pixiv.net".into(),
            bilibili: "https://api.bilibili.com".into(),
            redd_it: "https://redd.it".into(),
            b23: "https://b23.tv".into(),
        }
    }
}

impl Endpoints {
    /// Every upstream served from the same base URL.
    #[must_use]
    pub fn uniform(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            twitter_syndication: base.clone(),
            fxtwitter: base.clone(),
            reddit: base.clone(),
            youtube: base.clone(),
            bluesky: base.clone(),
            instagram: base.clone(),
            instagram_api: base.clone(),
            threads: base.clone(),
            phixiv: base.clone(),
            pixiv: base.clone(),
            bilibili: base.clone(),
            redd_it: base.clone(),
            b23: base,
        }
    }

    /// A public short link moved onto the configured short-link host.
    #[must_use]
    pub fn short_link(&self, url: &str) -> String {
        let hosts = [("https://redd.it", &self.redd_it), ("https://b23.tv", &self.b23)];
        for (public, configured) in hosts {
            if let Some(rest) = url.strip_prefix(public) {
                return format!("{configured}{rest}");
            }
        }
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8787".into(),
            embed_domain: "embed.ken.tools".into(),
            site_name: "FixEmbed".into(),
            branding_name: "FixEmbed".into(),
            upstream_timeout: Duration::from_millis(8000),
            enable_cache: false,
            cache_ttl: Duration::from_secs(3600),
            invidious_instances: DEFAULT_INVIDIOUS_INSTANCES
                .iter()
                .map(ToString::to_string)
                .collect(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - None (all have defaults)
    ///
    /// Optional:
    /// - `FIXEMBED_BIND_ADDR`: Server bind address (default: "0.0.0.0:8787")
    /// - `EMBED_DOMAIN`: Public host used in proxy URLs (default: "embed.ken.tools")
    /// - `SITE_NAME`: oEmbed provider name (default: "FixEmbed")
    /// - `BRANDING_NAME`: `og:site_name` prefix (default: "FixEmbed")
    /// - `UPSTREAM_TIMEOUT_MS`: Upstream timeout in milliseconds (default: 8000)
    /// - `ENABLE_CACHE`: "true"/"1" to emit `Cache-Control` (default: false)
    /// - `CACHE_TTL`: Cache max-age in seconds (default: 3600)
    /// - `INVIDIOUS_INSTANCES`: Comma-separated Invidious base URLs
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind_addr = std::env::var("FIXEMBED_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let embed_domain = std::env::var("EMBED_DOMAIN")
            .map(|d| {
                d.trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string()
            })
            .unwrap_or(defaults.embed_domain);

        let site_name = std::env::var("SITE_NAME").unwrap_or(defaults.site_name);
        let branding_name = std::env::var("BRANDING_NAME").unwrap_or(defaults.branding_name);

        let upstream_timeout = match std::env::var("UPSTREAM_TIMEOUT_MS") {
            Ok(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("UPSTREAM_TIMEOUT_MS is not a number: {ms}"))?,
            ),
            Err(_) => defaults.upstream_timeout,
        };

        let enable_cache = std::env::var("ENABLE_CACHE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(defaults.enable_cache);

        let cache_ttl = match std::env::var("CACHE_TTL") {
            Ok(secs) => Duration::from_secs(
                secs.trim()
                    .parse()
                    .with_context(|| format!("CACHE_TTL is not a number: {secs}"))?,
            ),
            Err(_) => defaults.cache_ttl,
        };

        let invidious_instances: Vec<String> = match std::env::var("INVIDIOUS_INSTANCES") {
            Ok(list) => list
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.invidious_instances,
        };

        tracing::info!(
            bind_addr = %bind_addr,
            embed_domain = %embed_domain,
            branding_name = %branding_name,
            upstream_timeout_ms = upstream_timeout.as_millis(),
            enable_cache,
            invidious_count = invidious_instances.len(),
            "relay configuration loaded"
        );

        Ok(Self {
            bind_addr,
            embed_domain,
            site_name,
            branding_name,
            upstream_timeout,
            enable_cache,
            cache_ttl,
            invidious_instances,
            endpoints: defaults.endpoints,
        })
    }

    /// `Cache-Control` value for embed responses, if caching is enabled.
    #[must_use]
    pub fn cache_control(&self) -> Option<String> {
        self.enable_cache
            .then(|| format!("public, max-age={}", self.cache_ttl.as_secs()))
    }
}
