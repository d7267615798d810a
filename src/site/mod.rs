//! Per-platform embed handlers.
//!
//! Every platform implements [`Handler`]: pull an identifier out of the URL,
//! fetch raw upstream data through one or more fallback tiers, and normalize
//! it into [`EmbedData`]. The blanket [`PlatformHandler`] impl composes those
//! steps into one `handle` call that always ends in a [`HandlerResult`].
//!
//! # Architecture
//!
//! - [`Handler`]: typed per-platform contract (extract, fetch, normalize, degrade)
//! - [`PlatformHandler`]: object-safe view used for dispatch
//! - [`Registry`]: ordered handler list; first pattern match wins
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fixembed::site::{Context, Registry};
//! use fixembed::{Config, RandomSelector, UpstreamClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let ctx = Context::new(
//!     UpstreamClient::new(config.upstream_timeout)?,
//!     Arc::new(config),
//!     Arc::new(RandomSelector),
//! );
//! let registry = Registry::new();
//!
//! if let Some(handler) = registry.dispatch("https://x.com/user/status/123") {
//!     let result = handler.handle("https://x.com/user/status/123", &ctx).await;
//!     println!("{}", serde_json::to_string(&result)?);
//! }
//! # Ok(())
//! # }
//! ```

/// Compile a fixed pattern list once.
macro_rules! patterns {
    ($($re:expr),+ $(,)?) => {{
        static PATTERNS: std::sync::LazyLock<Vec<regex::Regex>> = std::sync::LazyLock::new(|| {
            vec![$(regex::Regex::new($re).expect("static pattern compiles")),+]
        });
        &PATTERNS
    }};
}

pub mod bilibili;
pub mod bluesky;
pub mod instagram;
pub mod pixiv;
pub mod reddit;
pub mod threads;
pub mod twitter;
pub mod youtube;

mod scrape;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embed::{EmbedData, Failure, HandlerResult, Platform};
use crate::error::{FetchError, FetchResult};
use crate::http_client::UpstreamClient;
use crate::profile::HeaderProfile;
use crate::tier::InstanceSelector;

/// Everything a handler may use while fetching. Read-only and shared by all
/// requests.
#[derive(Clone)]
pub struct Context {
    pub client: UpstreamClient,
    pub config: Arc<Config>,
    pub selector: Arc<dyn InstanceSelector>,
}

impl Context {
    #[must_use]
    pub fn new(
        client: UpstreamClient,
        config: Arc<Config>,
        selector: Arc<dyn InstanceSelector>,
    ) -> Self {
        Self {
            client,
            config,
            selector,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("timeout", &self.client.timeout())
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

/// What a handler could read out of a URL it claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction<I> {
    /// Identifier known without any network call.
    Found(I),
    /// Short link; the contained URL must be resolved via redirect first.
    ShortLink(String),
    /// Recognized but not embeddable (e.g. Instagram stories): send the
    /// caller to the original URL.
    Passthrough,
    /// Matched a broad pattern but no identifier could be extracted.
    Invalid,
}

/// Typed per-platform contract.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Identifier extracted from the URL.
    type Id: Send + Sync + fmt::Debug;
    /// Raw upstream data handed from `fetch` to `normalize`.
    type Raw: Send;

    fn platform(&self) -> Platform;

    /// Dispatch patterns, tested in order.
    fn patterns(&self) -> &'static [Regex];

    fn extract(&self, url: &str) -> Extraction<Self::Id>;

    /// Stable URL of the content, independent of the input URL's shape.
    fn canonical_url(&self, id: &Self::Id) -> String;

    /// Run the platform's fallback tiers.
    async fn fetch(&self, id: &Self::Id, ctx: &Context) -> FetchResult<Self::Raw>;

    /// Map raw upstream data to an embed. Pure.
    fn normalize(&self, id: &Self::Id, raw: Self::Raw, config: &Config) -> EmbedData;

    /// Static embed used when every tier failed, for platforms that can
    /// still say something useful without upstream data.
    fn degrade(&self, _id: &Self::Id, _config: &Config) -> Option<EmbedData> {
        None
    }
}

/// Object-safe handler used by the registry.
#[async_trait]
pub trait PlatformHandler: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether any of this handler's patterns matches `url`.
    fn matches(&self, url: &str) -> bool;

    /// Resolve `url` to an embed or an actionable failure. Never errors.
    async fn handle(&self, url: &str, ctx: &Context) -> HandlerResult;
}

#[async_trait]
impl<H: Handler> PlatformHandler for H {
    fn platform(&self) -> Platform {
        Handler::platform(self)
    }

    fn matches(&self, url: &str) -> bool {
        self.patterns().iter().any(|p| p.is_match(url))
    }

    async fn handle(&self, url: &str, ctx: &Context) -> HandlerResult {
        let platform = Handler::platform(self);

        let id = match self.extract(url) {
            Extraction::Found(id) => id,
            Extraction::ShortLink(short) => match resolve_short_link(self, &short, ctx).await {
                Ok(id) => id,
                Err(err) => {
                    warn!(%platform, url, error = %err, "Short link resolution failed");
                    return Failure::with_redirect(
                        format!("Could not resolve {} short link: {err}", platform.display_name()),
                        url,
                    )
                    .into();
                }
            },
            Extraction::Passthrough => {
                debug!(%platform, url, "Passing through unembeddable URL");
                return Failure::redirect(url).into();
            }
            Extraction::Invalid => {
                return Failure::error(format!("Invalid {} URL", platform.display_name())).into();
            }
        };

        debug!(%platform, ?id, "Identifier extracted");

        match self.fetch(&id, ctx).await {
            Ok(raw) => HandlerResult::Success(self.normalize(&id, raw, &ctx.config)),
            Err(err) => {
                warn!(%platform, ?id, error = %err, "All upstream tiers failed");
                if let Some(data) = self.degrade(&id, &ctx.config) {
                    return HandlerResult::Success(data);
                }
                Failure::with_redirect(
                    format!("{} upstream unavailable: {err}", platform.display_name()),
                    self.canonical_url(&id),
                )
                .into()
            }
        }
    }
}

async fn resolve_short_link<H: Handler + ?Sized>(
    handler: &H,
    short: &str,
    ctx: &Context,
) -> FetchResult<H::Id> {
    let profile = HeaderProfile::desktop();
    let short = ctx.config.endpoints.short_link(short);
    let resolution = ctx.client.resolve_redirect(&short, &profile, |url| {
        matches!(handler.extract(url), Extraction::Found(_))
    });
    let resolved = tokio::time::timeout(ctx.config.upstream_timeout, resolution)
        .await
        .map_err(|_| FetchError::Timeout)??;

    match handler.extract(&resolved) {
        Extraction::Found(id) => Ok(id),
        _ => Err(FetchError::Upstream(format!(
            "short link led to unrecognized URL {resolved}"
        ))),
    }
}

/// Ordered handler registry.
///
/// Handlers are checked in registration order and the first one with a
/// matching pattern wins, so overlapping patterns resolve deterministically.
pub struct Registry {
    handlers: Vec<Box<dyn PlatformHandler>>,
}

impl Registry {
    /// Registry with every platform, in priority order.
    #[must_use]
    pub fn new() -> Self {
        let handlers: Vec<Box<dyn PlatformHandler>> = vec![
            Box::new(twitter::TwitterHandler),
            Box::new(reddit::RedditHandler),
            Box::new(youtube::YouTubeHandler),
            Box::new(bluesky::BlueskyHandler),
            Box::new(instagram::InstagramHandler),
            Box::new(threads::ThreadsHandler),
            Box::new(pixiv::PixivHandler),
            Box::new(bilibili::BilibiliHandler),
        ];

        Self { handlers }
    }

    /// Registry with a custom handler list, kept in the given order.
    #[must_use]
    pub fn with_handlers(handlers: Vec<Box<dyn PlatformHandler>>) -> Self {
        Self { handlers }
    }

    /// First handler whose patterns match `url`, or `None` when the URL is
    /// not from a supported platform.
    pub fn dispatch(&self, url: &str) -> Option<&dyn PlatformHandler> {
        let handler = self.handlers.iter().find(|h| h.matches(url))?;
        info!(platform = %handler.platform(), url, "Dispatched");
        Some(handler.as_ref())
    }

    /// Registered platforms in priority order.
    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.handlers.iter().map(|h| h.platform())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.platforms()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EmbedData;
    use crate::tier::DeclaredOrder;
    use std::time::Duration;

    #[test]
    fn registry_registers_all_platforms_in_priority_order() {
        let registry = Registry::new();
        assert_eq!(registry.len(), 8);
        let order: Vec<Platform> = registry.platforms().collect();
        assert_eq!(order, Platform::ALL.to_vec());
    }

    #[test]
    fn dispatch_picks_the_right_platform() {
        let registry = Registry::new();
        let cases = [
            ("https://x.com/user/status/123", Platform::Twitter),
            ("https://twitter.com/user/status/456", Platform::Twitter),
            ("https://www.reddit.com/r/rust/comments/abc123/title/", Platform::Reddit),
            ("https://redd.it/abc123", Platform::Reddit),
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Platform::YouTube),
            ("https://youtu.be/dQw4w9WgXcQ", Platform::YouTube),
            ("https://bsky.app/profile/jay.bsky.team/post/3k2yihcrp6f2c", Platform::Bluesky),
            ("https://www.instagram.com/p/C1a2b3c4d5e/", Platform::Instagram),
            ("https://www.threads.net/@zuck/post/C8abcdEFG12", Platform::Threads),
            ("https://www.pixiv.net/en/artworks/12345678", Platform::Pixiv),
            ("https://www.bilibili.com/video/BV1xx411c7mD", Platform::Bilibili),
            ("https://b23.tv/abc123", Platform::Bilibili),
        ];
        for (url, expected) in cases {
            let handler = registry.dispatch(url).unwrap_or_else(|| panic!("{url}"));
            assert_eq!(handler.platform(), expected, "{url}");
        }
    }

    #[test]
    fn dispatch_is_deterministic() {
        let registry = Registry::new();
        for url in [
            "https://x.com/a/status/1",
            "https://example.com/foo",
            "https://youtu.be/abc",
        ] {
            let first = registry.dispatch(url).map(|h| h.platform());
            let second = registry.dispatch(url).map(|h| h.platform());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn unsupported_urls_have_no_handler() {
        let registry = Registry::new();
        assert!(registry.dispatch("https://example.com/foo").is_none());
        assert!(registry.dispatch("https://x.com/naval").is_none());
        assert!(registry.dispatch("not a url").is_none());
    }

    /// Claims every URL containing "shared".
    struct Greedy(Platform);

    #[async_trait]
    impl Handler for Greedy {
        type Id = String;
        type Raw = ();

        fn platform(&self) -> Platform {
            self.0
        }

        fn patterns(&self) -> &'static [Regex] {
            patterns![r"shared"]
        }

        fn extract(&self, url: &str) -> Extraction<String> {
            if url.contains("short") {
                Extraction::ShortLink(url.to_string())
            } else if url.contains("story") {
                Extraction::Passthrough
            } else if url.contains("bad") {
                Extraction::Invalid
            } else {
                Extraction::Found(url.to_string())
            }
        }

        fn canonical_url(&self, id: &String) -> String {
            format!("https://canonical.example/{}", id.len())
        }

        async fn fetch(&self, _id: &String, _ctx: &Context) -> FetchResult<()> {
            Err(FetchError::Status { status: 503 })
        }

        fn normalize(&self, id: &String, _raw: (), _config: &Config) -> EmbedData {
            EmbedData::builder(self.0, id.clone(), self.canonical_url(id), "test").build()
        }
    }

    fn context() -> Context {
        let config = Config {
            upstream_timeout: Duration::from_millis(500),
            ..Config::default()
        };
        Context::new(
            UpstreamClient::new(config.upstream_timeout).unwrap(),
            Arc::new(config),
            Arc::new(DeclaredOrder),
        )
    }

    #[test]
    fn earlier_registration_wins_on_overlap() {
        let registry = Registry::with_handlers(vec![
            Box::new(Greedy(Platform::Pixiv)),
            Box::new(Greedy(Platform::Bilibili)),
        ]);
        for _ in 0..10 {
            let handler = registry.dispatch("https://shared.example/1").unwrap();
            assert_eq!(handler.platform(), Platform::Pixiv);
        }
    }

    #[tokio::test]
    async fn fetch_failure_redirects_to_canonical_url() {
        let url = "https://shared.example/post";
        let result = Greedy(Platform::Twitter).handle(url, &context()).await;
        assert!(!result.is_success());
        let canonical = format!("https://canonical.example/{}", url.len());
        assert_eq!(result.redirect(), Some(canonical.as_str()));
        assert!(result.error().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn invalid_urls_error_without_redirect() {
        let result = Greedy(Platform::YouTube)
            .handle("https://shared.example/bad", &context())
            .await;
        assert_eq!(result.error(), Some("Invalid YouTube URL"));
        assert!(result.redirect().is_none());
    }

    #[tokio::test]
    async fn passthrough_redirects_to_input() {
        let url = "https://shared.example/story/1";
        let result = Greedy(Platform::Instagram).handle(url, &context()).await;
        assert_eq!(result.redirect(), Some(url));
    }

    #[tokio::test]
    async fn unresolvable_short_link_redirects_to_input() {
        // Nothing listens on port 9; resolution fails fast.
        let url = "http://127.0.0.1:9/shared/short";
        let result = Greedy(Platform::Reddit).handle(url, &context()).await;
        assert!(!result.is_success());
        assert_eq!(result.redirect(), Some(url));
    }
}
