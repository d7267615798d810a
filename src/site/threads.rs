//! Threads embeds via the web app's GraphQL API, with oEmbed as fallback.
//!
//! The GraphQL query wants the numeric post id, which is the URL shortcode
//! read as a base-64 number over Instagram's alphabet. When both tiers fail
//! the handler still returns a minimal "Thread" card so the link is not bare.
//!
//! Threads puts the caption in the embed title and the counters in the
//! description; that is what Discord shows most prominently for this site.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{Context, Extraction, Handler};
use crate::config::Config;
use crate::embed::{EmbedData, Platform, VideoEmbed};
use crate::error::{FetchError, FetchResult};
use crate::format::{branded_site_name, proxy_url, truncate, Stats};
use crate::profile::{HeaderProfile, MAC_UA};
use crate::tier::{run_tiers, Tier};

const SHORTCODE_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

const APP_ID: &str = "238260118697367";
const LSD: &str = "hgmSkqDnLNFckqa7t1vJdn";
const DOC_ID: &str = "7448594591874178";

const GRAPHQL_PROFILE: HeaderProfile = HeaderProfile::desktop_json()
    .with_user_agent(MAC_UA)
    .with_extra(&[
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("x-fb-lsd", LSD),
        ("x-ig-app-id", APP_ID),
    ]);
const OEMBED_PROFILE: HeaderProfile = HeaderProfile::service();

/// Threads handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadsHandler;

/// Post identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadsPost {
    /// Present for `/@user/post/<code>` URLs, absent for `/t/<code>`.
    pub username: Option<String>,
    pub code: String,
    pub post_id: u128,
}

/// Raw post from whichever tier answered.
#[derive(Debug)]
pub enum ThreadsSource {
    GraphQl(ThreadsItem),
    OEmbed(ThreadsOEmbed),
}

#[async_trait]
impl Handler for ThreadsHandler {
    type Id = ThreadsPost;
    type Raw = ThreadsSource;

    fn platform(&self) -> Platform {
        Platform::Threads
    }

    fn patterns(&self) -> &'static [Regex] {
        patterns![
            r"(?i)threads\.(?:net|com)/@?([^/?#]+)/post/([^/?#]+)",
            r"(?i)threads\.(?:net|com)/t/([^/?#]+)",
        ]
    }

    fn extract(&self, url: &str) -> Extraction<ThreadsPost> {
        let patterns = self.patterns();
        let (username, code) = if let Some(caps) = patterns[0].captures(url) {
            (Some(caps[1].to_string()), caps[2].to_string())
        } else if let Some(caps) = patterns[1].captures(url) {
            (None, caps[1].to_string())
        } else {
            return Extraction::Invalid;
        };

        match decode_shortcode(&code) {
            Some(post_id) => Extraction::Found(ThreadsPost {
                username,
                code,
                post_id,
            }),
            None => Extraction::Invalid,
        }
    }

    fn canonical_url(&self, id: &ThreadsPost) -> String {
        match &id.username {
            Some(user) => format!("https://www.threads.net/@{user}/post/{}", id.code),
            None => format!("https://www.threads.net/t/{}", id.code),
        }
    }

    async fn fetch(&self, id: &ThreadsPost, ctx: &Context) -> FetchResult<ThreadsSource> {
        let endpoints = &ctx.config.endpoints;
        let graphql_url = format!("{}/api/graphql", endpoints.threads);
        let oembed_url = format!(
            "{}/oembed/?url={}",
            endpoints.threads,
            urlencoding::encode(&self.canonical_url(id))
        );
        let variables = serde_json::json!({
            "check_for_unavailable_replies": true,
            "first": 10,
            "postID": id.post_id.to_string(),
            "__relay_internal__pv__BarcelonaIsLoggedInrelayprovider": true,
            "__relay_internal__pv__BarcelonaIsThreadContextHeaderEnabledrelayprovider": false,
            "__relay_internal__pv__BarcelonaIsThreadContextHeaderFollowButtonEnabledrelayprovider": false,
            "__relay_internal__pv__BarcelonaUseCometVideoPlaybackEnginerelayprovider": false,
            "__relay_internal__pv__BarcelonaOptionalCookiesEnabledrelayprovider": false,
            "__relay_internal__pv__BarcelonaIsViewCountEnabledrelayprovider": false,
            "__relay_internal__pv__BarcelonaShouldShowFediverseM075Featuresrelayprovider": false,
        })
        .to_string();

        let tiers = vec![
            Tier::new("graphql", async {
                tracing::debug!("Fetching from Threads GraphQL: {}", graphql_url);
                let form = [
                    ("variables", variables.as_str()),
                    ("doc_id", DOC_ID),
                    ("lsd", LSD),
                ];
                let response: GraphQlResponse = ctx
                    .client
                    .post_form_json(&graphql_url, &GRAPHQL_PROFILE, &form)
                    .await?;
                response.into_post(&id.code).map(ThreadsSource::GraphQl)
            }),
            Tier::new("oembed", async {
                tracing::debug!("Fetching from Threads oEmbed: {}", oembed_url);
                let oembed: ThreadsOEmbed = ctx.client.get_json(&oembed_url, &OEMBED_PROFILE).await?;
                Ok(ThreadsSource::OEmbed(oembed))
            }),
        ];

        run_tiers(Platform::Threads, ctx.config.upstream_timeout, tiers).await
    }

    fn normalize(&self, id: &ThreadsPost, raw: ThreadsSource, config: &Config) -> EmbedData {
        match raw {
            ThreadsSource::GraphQl(item) => self.from_graphql(id, item, config),
            ThreadsSource::OEmbed(oembed) => self.from_oembed(id, oembed, config),
        }
    }

    fn degrade(&self, id: &ThreadsPost, config: &Config) -> Option<EmbedData> {
        let builder = EmbedData::builder(
            Platform::Threads,
            "Thread",
            self.canonical_url(id),
            branded_site_name(&config.branding_name, Platform::Threads, None),
        );
        let builder = match &id.username {
            Some(user) => builder
                .author_name(format!("@{user}"))
                .author_url(format!("https://www.threads.net/@{user}")),
            None => builder,
        };
        Some(builder.build())
    }
}

impl ThreadsHandler {
    /// Post URL keyed on the author, so `/t/<code>` and `/@user/post/<code>`
    /// inputs link to the same place once the author is known.
    fn post_url(&self, id: &ThreadsPost, username: Option<&str>) -> String {
        match username {
            Some(user) if !user.is_empty() => {
                format!("https://www.threads.net/@{user}/post/{}", id.code)
            }
            _ => self.canonical_url(id),
        }
    }

    fn from_graphql(&self, id: &ThreadsPost, item: ThreadsItem, config: &Config) -> EmbedData {
        let user = item.user.unwrap_or_default();
        let known = user.username.or_else(|| id.username.clone());
        let url = self.post_url(id, known.as_deref());
        let username = known.unwrap_or_else(|| "threads".to_string());

        let caption = item.caption.map(|c| c.text).unwrap_or_default();
        let title = if caption.trim().is_empty() {
            "Thread".to_string()
        } else {
            truncate(&caption, 280)
        };

        let stats = Stats {
            comments: item.text_post_app_info.and_then(|i| i.direct_reply_count),
            likes: item.like_count,
            ..Stats::default()
        }
        .render();

        let mut images: Vec<String> = item
            .carousel_media
            .iter()
            .filter_map(|m| m.first_image())
            .collect();
        if images.is_empty() {
            images.extend(item.image_versions2.as_ref().and_then(ImageVersions::first));
        }

        let video_url = item
            .video_versions
            .first()
            .map(|v| v.url.clone())
            .or_else(|| {
                item.carousel_media
                    .iter()
                    .find_map(|m| m.video_versions.first().map(|v| v.url.clone()))
            });

        let builder = EmbedData::builder(
            Platform::Threads,
            title,
            url,
            branded_site_name(&config.branding_name, Platform::Threads, None),
        )
        .description(stats.clone().unwrap_or_default())
        .author_name(format!("@{username}"))
        .author_url(format!("https://www.threads.net/@{username}"))
        .stats(stats);

        let builder = if let Some(video_url) = video_url {
            let thumbnail = images.first().cloned();
            builder
                .video(
                    VideoEmbed::new(proxy_url(&config.embed_domain, "video/threads", &video_url), 0, 0)
                        .with_thumbnail(thumbnail.clone()),
                )
                .image(thumbnail)
        } else if !images.is_empty() {
            builder.carousel(images)
        } else {
            builder.image(user.profile_pic_url)
        };

        builder.build()
    }

    fn from_oembed(&self, id: &ThreadsPost, oembed: ThreadsOEmbed, config: &Config) -> EmbedData {
        let known = oembed.author_name.or_else(|| id.username.clone());
        let url = self.post_url(id, known.as_deref());
        let username = known.unwrap_or_else(|| "threads".to_string());
        let (title, description) = match oembed.title.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => (truncate(text, 100), truncate(text, 280)),
            _ => ("Thread".to_string(), String::new()),
        };

        EmbedData::builder(
            Platform::Threads,
            title,
            url,
            branded_site_name(&config.branding_name, Platform::Threads, None),
        )
        .description(description)
        .author_name(format!("@{username}"))
        .author_url(format!("https://www.threads.net/@{username}"))
        .image(oembed.thumbnail_url)
        .build()
    }
}

/// Shortcode to numeric post id. `None` on characters outside the alphabet
/// or on overflow.
fn decode_shortcode(code: &str) -> Option<u128> {
    if code.is_empty() {
        return None;
    }
    code.bytes().try_fold(0u128, |acc, byte| {
        let digit = SHORTCODE_ALPHABET.iter().position(|&c| c == byte)?;
        acc.checked_mul(64)?.checked_add(u128::try_from(digit).ok()?)
    })
}

// ============================================================================
// Threads GraphQL Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlOuter>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    summary: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlOuter {
    data: Option<GraphQlEdges>,
}

#[derive(Debug, Deserialize)]
struct GraphQlEdges {
    #[serde(default)]
    edges: Vec<GraphQlEdge>,
}

#[derive(Debug, Deserialize)]
struct GraphQlEdge {
    node: Option<ThreadNode>,
}

#[derive(Debug, Deserialize)]
struct ThreadNode {
    #[serde(default)]
    thread_items: Vec<ThreadItemWrapper>,
}

#[derive(Debug, Deserialize)]
struct ThreadItemWrapper {
    post: Option<ThreadsItem>,
}

impl GraphQlResponse {
    /// The post whose code matches, else the first post of the thread.
    fn into_post(self, code: &str) -> FetchResult<ThreadsItem> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(FetchError::Upstream(
                err.summary
                    .or(err.message)
                    .unwrap_or_else(|| "GraphQL error".to_string()),
            ));
        }

        let mut posts: Vec<ThreadsItem> = self
            .data
            .and_then(|d| d.data)
            .and_then(|d| d.edges.into_iter().next())
            .and_then(|e| e.node)
            .map(|n| n.thread_items.into_iter().filter_map(|i| i.post).collect())
            .unwrap_or_default();

        if posts.is_empty() {
            return Err(FetchError::Missing("thread items"));
        }
        let index = posts
            .iter()
            .position(|p| p.code.as_deref() == Some(code))
            .unwrap_or(0);
        Ok(posts.swap_remove(index))
    }
}

#[derive(Debug, Deserialize)]
pub struct ThreadsItem {
    code: Option<String>,
    user: Option<ThreadsUser>,
    caption: Option<Caption>,
    like_count: Option<u64>,
    text_post_app_info: Option<TextPostInfo>,
    image_versions2: Option<ImageVersions>,
    #[serde(default)]
    video_versions: Vec<MediaVersion>,
    #[serde(default)]
    carousel_media: Vec<CarouselItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadsUser {
    username: Option<String>,
    profile_pic_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Caption {
    text: String,
}

#[derive(Debug, Deserialize)]
struct TextPostInfo {
    direct_reply_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ImageVersions {
    #[serde(default)]
    candidates: Vec<MediaVersion>,
}

impl ImageVersions {
    fn first(&self) -> Option<String> {
        self.candidates.first().map(|c| c.url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MediaVersion {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CarouselItem {
    image_versions2: Option<ImageVersions>,
    #[serde(default)]
    video_versions: Vec<MediaVersion>,
}

impl CarouselItem {
    fn first_image(&self) -> Option<String> {
        self.image_versions2.as_ref().and_then(ImageVersions::first)
    }
}

// ============================================================================
// Threads oEmbed Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ThreadsOEmbed {
    author_name: Option<String>,
    title: Option<String>,
    thumbnail_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::PlatformHandler;
    use serde_json::json;

    fn id() -> ThreadsPost {
        ThreadsPost {
            username: Some("zuck".into()),
            code: "C8abcdEFG12".into(),
            post_id: decode_shortcode("C8abcdEFG12").unwrap(),
        }
    }

    fn graphql(items: serde_json::Value) -> ThreadsItem {
        let response: GraphQlResponse = serde_json::from_value(json!({
            "data": { "data": { "edges": [{ "node": { "thread_items": items } }] } }
        }))
        .unwrap();
        response.into_post("C8abcdEFG12").unwrap()
    }

    #[test]
    fn matches_threads_urls() {
        let handler = ThreadsHandler;
        assert!(handler.matches("https://www.threads.net/@zuck/post/C8abcdEFG12"));
        assert!(handler.matches("https://www.threads.com/@zuck/post/C8abcdEFG12"));
        assert!(handler.matches("https://threads.net/t/C8abcdEFG12"));
        assert!(!handler.matches("https://www.threads.net/@zuck"));
    }

    #[test]
    fn decodes_shortcodes() {
        assert_eq!(decode_shortcode("A"), Some(0));
        assert_eq!(decode_shortcode("B"), Some(1));
        assert_eq!(decode_shortcode("BA"), Some(64));
        assert_eq!(decode_shortcode("_"), Some(63));
        assert_eq!(decode_shortcode("CuXFPIeLLod"), Some(3_141_002_295_235_099_165));
        assert_eq!(decode_shortcode("bad!code"), None);
        assert_eq!(decode_shortcode(""), None);
        assert_eq!(decode_shortcode(&"_".repeat(30)), None);
    }

    #[test]
    fn invalid_shortcode_characters_are_invalid() {
        assert_eq!(
            ThreadsHandler.extract("https://www.threads.net/@zuck/post/abc!def"),
            Extraction::Invalid
        );
    }

    #[test]
    fn extracts_post_and_short_forms() {
        assert_eq!(
            ThreadsHandler.extract("https://www.threads.net/@zuck/post/C8abcdEFG12?xmt=1"),
            Extraction::Found(id())
        );
        let Extraction::Found(short) = ThreadsHandler.extract("https://threads.net/t/C8abcdEFG12")
        else {
            panic!("expected id");
        };
        assert_eq!(short.username, None);
        assert_eq!(
            ThreadsHandler.canonical_url(&short),
            "https://www.threads.net/t/C8abcdEFG12"
        );
    }

    #[test]
    fn caption_is_title_and_stats_are_description() {
        let item = graphql(json!([
            { "post": { "code": "other", "caption": { "text": "parent" } } },
            { "post": {
                "code": "C8abcdEFG12",
                "user": { "username": "zuck", "profile_pic_url": "https://cdn/pp.jpg" },
                "caption": { "text": "hello threads" },
                "like_count": 4200,
                "text_post_app_info": { "direct_reply_count": 17 }
            }}
        ]));

        let data = ThreadsHandler.normalize(&id(), ThreadsSource::GraphQl(item), &Config::default());
        assert_eq!(data.title(), "hello threads");
        assert_eq!(data.description(), "💬 17 ❤️ 4.2K");
        assert_eq!(data.stats(), Some("💬 17 ❤️ 4.2K"));
        assert_eq!(data.author_name(), Some("@zuck"));
        assert_eq!(data.image(), Some("https://cdn/pp.jpg"));
        assert_eq!(data.url(), "https://www.threads.net/@zuck/post/C8abcdEFG12");
    }

    #[test]
    fn short_and_long_forms_share_the_author_url() {
        let post = || {
            graphql(json!([{ "post": {
                "code": "C8abcdEFG12",
                "user": { "username": "zuck" },
                "caption": { "text": "same post" }
            }}]))
        };
        let Extraction::Found(short) = ThreadsHandler.extract("https://www.threads.net/t/C8abcdEFG12")
        else {
            panic!("expected id");
        };
        let config = Config::default();

        let from_short = ThreadsHandler.normalize(&short, ThreadsSource::GraphQl(post()), &config);
        let from_long = ThreadsHandler.normalize(&id(), ThreadsSource::GraphQl(post()), &config);
        assert_eq!(from_short.url(), "https://www.threads.net/@zuck/post/C8abcdEFG12");
        assert_eq!(from_short.url(), from_long.url());

        let oembed = || ThreadsOEmbed {
            title: Some("same post".into()),
            author_name: Some("zuck".into()),
            thumbnail_url: None,
        };
        let short_oembed = ThreadsHandler.normalize(&short, ThreadsSource::OEmbed(oembed()), &config);
        let long_oembed = ThreadsHandler.normalize(&id(), ThreadsSource::OEmbed(oembed()), &config);
        assert_eq!(short_oembed.url(), long_oembed.url());
        assert_eq!(short_oembed.url(), from_long.url());
    }

    #[test]
    fn unknown_author_keeps_the_short_url() {
        let item = graphql(json!([{ "post": { "code": "C8abcdEFG12" } }]));
        let short = ThreadsPost {
            username: None,
            ..id()
        };
        let data = ThreadsHandler.normalize(&short, ThreadsSource::GraphQl(item), &Config::default());
        assert_eq!(data.url(), "https://www.threads.net/t/C8abcdEFG12");
        assert_eq!(data.author_name(), Some("@threads"));
    }

    #[test]
    fn video_is_proxied_without_dimensions() {
        let item = graphql(json!([{ "post": {
            "code": "C8abcdEFG12",
            "user": { "username": "zuck" },
            "image_versions2": { "candidates": [{ "url": "https://cdn/thumb.jpg" }] },
            "video_versions": [{ "url": "https://cdn/v.mp4" }]
        }}]));

        let data = ThreadsHandler.normalize(&id(), ThreadsSource::GraphQl(item), &Config::default());
        let video = data.video().unwrap();
        assert_eq!(
            video.url,
            "https://embed.ken.tools/video/threads?url=https%3A%2F%2Fcdn%2Fv.mp4"
        );
        assert!(!video.has_dimensions());
        assert_eq!(data.image(), Some("https://cdn/thumb.jpg"));
        assert_eq!(data.title(), "Thread");
    }

    #[test]
    fn carousel_images_are_kept() {
        let item = graphql(json!([{ "post": {
            "code": "C8abcdEFG12",
            "carousel_media": [
                { "image_versions2": { "candidates": [{ "url": "https://cdn/1.jpg" }] } },
                { "image_versions2": { "candidates": [{ "url": "https://cdn/2.jpg" }] } }
            ]
        }}]));
        let data = ThreadsHandler.normalize(&id(), ThreadsSource::GraphQl(item), &Config::default());
        assert_eq!(data.images(), ["https://cdn/1.jpg", "https://cdn/2.jpg"]);
        assert_eq!(data.author_name(), Some("@zuck"));
    }

    #[test]
    fn graphql_errors_fail_the_tier() {
        let response: GraphQlResponse = serde_json::from_value(json!({
            "errors": [{ "summary": "Rate limited" }]
        }))
        .unwrap();
        let err = response.into_post("C8abcdEFG12").unwrap_err();
        assert!(err.to_string().contains("Rate limited"));
    }

    #[test]
    fn degrades_to_basic_thread_card() {
        let data = ThreadsHandler.degrade(&id(), &Config::default()).unwrap();
        assert_eq!(data.title(), "Thread");
        assert_eq!(data.author_url(), Some("https://www.threads.net/@zuck"));
        assert_eq!(data.site_name(), "FixEmbed • 🧵 Threads");
    }
}
