//! Instagram embeds for posts, reels and carousels.
//!
//! Three tiers, most to least detailed:
//!
//! 1. the web app's GraphQL shortcode query (carousels, video URL, counters)
//! 2. the public `embed/captioned` page, scraped for media URLs and caption
//! 3. the official oEmbed endpoint (thumbnail and author only)
//!
//! Videos are handed to Discord through the relay's `/video/instagram` proxy
//! because the CDN URLs are signed for the requesting client.
//!
//! Stories cannot be embedded; those URLs are passed through unchanged.

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;

use super::scrape::{first_attr, first_text, json_string_field};
use super::{Context, Extraction, Handler};
use crate::config::Config;
use crate::embed::{EmbedData, Platform, VideoEmbed};
use crate::error::{FetchError, FetchResult};
use crate::format::{branded_site_name, proxy_url, truncate, Stats};
use crate::profile::HeaderProfile;
use crate::tier::{run_tiers, Tier};

const APP_ID: &str = "936619743392459";
const LSD: &str = "AVqbxe3J_YA";
const DOC_ID: &str = "10015901848480474";

const GRAPHQL_PROFILE: HeaderProfile = HeaderProfile::desktop_json()
    .with_referer("https://www.instagram.com/")
    .with_origin("https://www.instagram.com")
    .with_extra(&[
        ("x-ig-app-id", APP_ID),
        ("x-fb-lsd", LSD),
        ("x-asbd-id", "129477"),
        ("sec-fetch-site", "same-origin"),
    ]);
const PAGE_PROFILE: HeaderProfile = HeaderProfile::desktop();
const OEMBED_PROFILE: HeaderProfile = HeaderProfile::service();

/// Instagram handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstagramHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Post,
    Reel,
}

impl MediaKind {
    const fn path(self) -> &'static str {
        match self {
            Self::Post => "p",
            Self::Reel => "reel",
        }
    }

    const fn noun(self) -> &'static str {
        match self {
            Self::Post => "Post",
            Self::Reel => "Reel",
        }
    }
}

/// Post identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcode {
    pub code: String,
    pub kind: MediaKind,
}

/// Raw media from whichever tier answered.
#[derive(Debug)]
pub enum InstagramSource {
    GraphQl(ShortcodeMedia),
    EmbedPage(EmbedPage),
    OEmbed(InstagramOEmbed),
}

#[async_trait]
impl Handler for InstagramHandler {
    type Id = Shortcode;
    type Raw = InstagramSource;

    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn patterns(&self) -> &'static [Regex] {
        patterns![
            r"(?i)instagram\.com/stories/([^/?#]+)/(\d+)",
            r"(?i)instagram\.com/(?:[^/?#]+/)?(p|reels?|tv)/([^/?#]+)",
            r"(?i)instagr\.am/(p|reels?|tv)/([^/?#]+)",
        ]
    }

    fn extract(&self, url: &str) -> Extraction<Shortcode> {
        let patterns = self.patterns();
        if patterns[0].is_match(url) {
            return Extraction::Passthrough;
        }

        let Some(caps) = patterns[1..].iter().find_map(|p| p.captures(url)) else {
            return Extraction::Invalid;
        };
        let kind = if caps[1].to_ascii_lowercase().starts_with("reel") {
            MediaKind::Reel
        } else {
            MediaKind::Post
        };
        Extraction::Found(Shortcode {
            code: caps[2].to_string(),
            kind,
        })
    }

    fn canonical_url(&self, id: &Shortcode) -> String {
        format!("https://www.instagram.com/{}/{}/", id.kind.path(), id.code)
    }

    async fn fetch(&self, id: &Shortcode, ctx: &Context) -> FetchResult<InstagramSource> {
        let endpoints = &ctx.config.endpoints;
        let graphql_url = format!("{}/api/graphql", endpoints.instagram);
        let embed_url = format!("{}/p/{}/embed/captioned/", endpoints.instagram, id.code);
        let oembed_url = format!(
            "{}/oembed/?url={}",
            endpoints.instagram_api,
            urlencoding::encode(&self.canonical_url(id))
        );
        let variables = serde_json::json!({
            "shortcode": id.code,
            "fetch_tagged_user_count": null,
            "hoisted_comment_id": null,
            "hoisted_reply_id": null,
        })
        .to_string();

        let tiers = vec![
            Tier::new("graphql", async {
                tracing::debug!("Fetching from Instagram GraphQL: {}", graphql_url);
                let form = [
                    ("av", "0"),
                    ("__d", "www"),
                    ("__user", "0"),
                    ("__a", "1"),
                    ("lsd", LSD),
                    ("doc_id", DOC_ID),
                    ("variables", variables.as_str()),
                ];
                let response: GraphQlResponse = ctx
                    .client
                    .post_form_json(&graphql_url, &GRAPHQL_PROFILE, &form)
                    .await?;
                response
                    .data
                    .and_then(|d| d.xdt_shortcode_media)
                    .map(InstagramSource::GraphQl)
                    .ok_or(FetchError::Missing("shortcode media"))
            }),
            Tier::new("embed", async {
                tracing::debug!("Fetching Instagram embed page: {}", embed_url);
                let html = ctx.client.get_text(&embed_url, &PAGE_PROFILE).await?;
                parse_embed_page(&html).map(InstagramSource::EmbedPage)
            }),
            Tier::new("oembed", async {
                tracing::debug!("Fetching from Instagram oEmbed: {}", oembed_url);
                let oembed: InstagramOEmbed = ctx.client.get_json(&oembed_url, &OEMBED_PROFILE).await?;
                Ok(InstagramSource::OEmbed(oembed))
            }),
        ];

        run_tiers(Platform::Instagram, ctx.config.upstream_timeout, tiers).await
    }

    fn normalize(&self, id: &Shortcode, raw: InstagramSource, config: &Config) -> EmbedData {
        let post = match raw {
            InstagramSource::GraphQl(media) => from_graphql(media),
            InstagramSource::EmbedPage(page) => from_embed_page(page),
            InstagramSource::OEmbed(oembed) => from_oembed(oembed),
        };

        let username = post.username.unwrap_or_else(|| "Instagram user".to_string());
        let description = match post.caption.as_deref().map(str::trim) {
            Some(caption) if !caption.is_empty() => truncate(caption, 280),
            _ => format!("{} by {username}", id.kind.noun()),
        };

        let video = post.video.map(|v| {
            VideoEmbed::new(
                proxy_url(&config.embed_domain, "video/instagram", &v.url),
                v.width,
                v.height,
            )
            .with_thumbnail(post.images.first().cloned())
        });

        let author_url = post
            .author_url
            .unwrap_or_else(|| format!("https://www.instagram.com/{username}/"));

        EmbedData::builder(
            Platform::Instagram,
            format!("{username} on Instagram"),
            self.canonical_url(id),
            branded_site_name(&config.branding_name, Platform::Instagram, None),
        )
        .description(description)
        .author_name(username)
        .author_url(author_url)
        .author_avatar(post.avatar)
        .carousel(post.images)
        .video(video)
        .stats(post.stats.render())
        .build()
    }
}

/// Tier-independent view of a post.
#[derive(Debug, Default)]
struct Post {
    username: Option<String>,
    author_url: Option<String>,
    avatar: Option<String>,
    caption: Option<String>,
    images: Vec<String>,
    video: Option<RawVideo>,
    stats: Stats,
}

#[derive(Debug)]
struct RawVideo {
    url: String,
    width: u32,
    height: u32,
}

fn from_graphql(media: ShortcodeMedia) -> Post {
    let caption = media
        .edge_media_to_caption
        .and_then(|c| c.edges.into_iter().next())
        .map(|e| e.node.text);

    let children: Vec<SidecarChild> = media
        .edge_sidecar_to_children
        .map(|s| s.edges.into_iter().map(|e| e.node).collect())
        .unwrap_or_default();

    let (width, height) = media
        .dimensions
        .map_or((0, 0), |d| (d.width, d.height));

    let video = if media.is_video {
        media.video_url.map(|url| RawVideo { url, width, height })
    } else {
        None
    };

    let images = if children.is_empty() {
        media.display_url.into_iter().collect()
    } else {
        children.into_iter().map(|c| c.display_url).collect()
    };

    let comments = media
        .edge_media_to_parent_comment
        .or(media.edge_media_to_comment)
        .map(|c| c.count);

    let owner = media.owner.unwrap_or_default();
    Post {
        username: owner.username,
        author_url: None,
        avatar: owner.profile_pic_url,
        caption,
        images,
        video,
        stats: Stats {
            comments,
            likes: media.edge_media_preview_like.map(|l| l.count),
            views: media.video_view_count,
            ..Stats::default()
        },
    }
}

fn from_embed_page(page: EmbedPage) -> Post {
    Post {
        username: page.username,
        avatar: page.avatar,
        caption: page.caption,
        images: page.image.into_iter().collect(),
        video: page.video_url.map(|url| RawVideo {
            url,
            width: 0,
            height: 0,
        }),
        ..Post::default()
    }
}

fn from_oembed(oembed: InstagramOEmbed) -> Post {
    Post {
        username: oembed.author_name,
        author_url: oembed.author_url,
        caption: oembed.title,
        images: oembed.thumbnail_url.into_iter().collect(),
        ..Post::default()
    }
}

/// Scrape the `embed/captioned` page.
///
/// The media URLs live in inline JSON; the caption and author only in markup.
fn parse_embed_page(html: &str) -> FetchResult<EmbedPage> {
    let doc = Html::parse_document(html);

    let video_url = json_string_field(html, "video_url");
    let image = json_string_field(html, "display_url")
        .or_else(|| first_attr(&doc, "img.EmbeddedMediaImage", "src"));
    if image.is_none() && video_url.is_none() {
        return Err(FetchError::Missing("embed media"));
    }

    let username = first_text(&doc, ".UsernameText")
        .or_else(|| first_text(&doc, ".Username"))
        .or_else(|| json_string_field(html, "username"));
    let caption = first_text(&doc, ".Caption").map(|text| {
        // The caption block starts with the author's username.
        match &username {
            Some(user) => text
                .strip_prefix(user.as_str())
                .map_or(text.clone(), |rest| rest.trim().to_string()),
            None => text,
        }
    });

    Ok(EmbedPage {
        username,
        avatar: first_attr(&doc, ".Avatar img", "src"),
        caption,
        image,
        video_url,
    })
}

/// Fields scraped from the embed page.
#[derive(Debug, Default)]
pub struct EmbedPage {
    username: Option<String>,
    avatar: Option<String>,
    caption: Option<String>,
    image: Option<String>,
    video_url: Option<String>,
}

// ============================================================================
// Instagram GraphQL Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    xdt_shortcode_media: Option<ShortcodeMedia>,
}

#[derive(Debug, Deserialize)]
pub struct ShortcodeMedia {
    display_url: Option<String>,
    #[serde(default)]
    is_video: bool,
    video_url: Option<String>,
    video_view_count: Option<u64>,
    dimensions: Option<Dimensions>,
    owner: Option<Owner>,
    edge_media_to_caption: Option<Edges<CaptionNode>>,
    edge_sidecar_to_children: Option<Edges<SidecarChild>>,
    edge_media_preview_like: Option<Count>,
    edge_media_to_parent_comment: Option<Count>,
    edge_media_to_comment: Option<Count>,
}

#[derive(Debug, Deserialize)]
struct Dimensions {
    width: u32,
    height: u32,
}

#[derive(Debug, Default, Deserialize)]
struct Owner {
    username: Option<String>,
    profile_pic_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Edges<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct CaptionNode {
    text: String,
}

#[derive(Debug, Deserialize)]
struct SidecarChild {
    display_url: String,
}

#[derive(Debug, Deserialize)]
struct Count {
    count: u64,
}

// ============================================================================
// Instagram oEmbed API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InstagramOEmbed {
    author_name: Option<String>,
    author_url: Option<String>,
    title: Option<String>,
    thumbnail_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::PlatformHandler;
    use serde_json::json;

    fn post_id() -> Shortcode {
        Shortcode {
            code: "C1a2b3c4d5e".into(),
            kind: MediaKind::Post,
        }
    }

    fn graphql(value: serde_json::Value) -> InstagramSource {
        InstagramSource::GraphQl(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn matches_instagram_post_urls() {
        let handler = InstagramHandler;
        assert!(handler.matches("https://instagram.com/p/ABC123xyz"));
        assert!(handler.matches("https://www.instagram.com/p/XYZ789abc/?igsh=1"));
        assert!(handler.matches("https://INSTAGRAM.COM/P/test123"));
        assert!(handler.matches("https://www.instagram.com/natgeo/p/ABC123/"));
        assert!(handler.matches("https://instagr.am/p/ABC123"));
    }

    #[test]
    fn matches_instagram_reel_urls() {
        let handler = InstagramHandler;
        assert!(handler.matches("https://instagram.com/reel/ABC123xyz"));
        assert!(handler.matches("https://www.instagram.com/reels/XYZ789"));
        assert!(handler.matches("https://www.instagram.com/tv/XYZ789"));
    }

    #[test]
    fn does_not_match_non_post_urls() {
        let handler = InstagramHandler;
        assert!(!handler.matches("https://instagram.com/username"));
        assert!(!handler.matches("https://instagram.com/"));
        assert!(!handler.matches("https://youtube.com/watch?v=abc"));
    }

    #[test]
    fn extracts_kind_and_shortcode() {
        assert_eq!(
            InstagramHandler.extract("https://www.instagram.com/p/C1a2b3c4d5e/"),
            Extraction::Found(post_id())
        );
        let Extraction::Found(reel) = InstagramHandler.extract("https://instagram.com/reels/Cxyz/")
        else {
            panic!("expected reel");
        };
        assert_eq!(reel.kind, MediaKind::Reel);
        assert_eq!(
            InstagramHandler.canonical_url(&reel),
            "https://www.instagram.com/reel/Cxyz/"
        );
    }

    #[test]
    fn stories_pass_through() {
        assert_eq!(
            InstagramHandler.extract("https://www.instagram.com/stories/natgeo/3141592653589793/"),
            Extraction::Passthrough
        );
    }

    #[test]
    fn sidecar_becomes_a_three_image_carousel() {
        let raw = graphql(json!({
            "__typename": "XDTGraphSidecar",
            "display_url": "https://cdn/cover.jpg",
            "is_video": false,
            "owner": { "username": "natgeo", "profile_pic_url": "https://cdn/pp.jpg" },
            "edge_media_to_caption": { "edges": [{ "node": { "text": "Three views" } }] },
            "edge_sidecar_to_children": { "edges": [
                { "node": { "display_url": "https://cdn/1.jpg" } },
                { "node": { "display_url": "https://cdn/2.jpg" } },
                { "node": { "display_url": "https://cdn/3.jpg" } }
            ]},
            "edge_media_preview_like": { "count": 2500 },
            "edge_media_to_parent_comment": { "count": 12 }
        }));

        let data = InstagramHandler.normalize(&post_id(), raw, &Config::default());
        assert_eq!(data.title(), "natgeo on Instagram");
        assert_eq!(data.description(), "Three views");
        assert_eq!(data.url(), "https://www.instagram.com/p/C1a2b3c4d5e/");
        assert_eq!(data.images().len(), 3);
        assert_eq!(data.image(), Some(data.images()[0].as_str()));
        assert_eq!(data.author_url(), Some("https://www.instagram.com/natgeo/"));
        assert_eq!(data.stats(), Some("💬 12 ❤️ 2.5K"));
        assert_eq!(data.site_name(), "FixEmbed • 📷 Instagram");
    }

    #[test]
    fn reel_video_is_proxied() {
        let raw = graphql(json!({
            "display_url": "https://cdn/thumb.jpg",
            "is_video": true,
            "video_url": "https://cdn/v.mp4?sig=a&b=c",
            "dimensions": { "width": 720, "height": 1280 },
            "owner": { "username": "natgeo" }
        }));
        let id = Shortcode {
            code: "Cxyz".into(),
            kind: MediaKind::Reel,
        };

        let data = InstagramHandler.normalize(&id, raw, &Config::default());
        let video = data.video().unwrap();
        assert_eq!(
            video.url,
            "https://embed.ken.tools/video/instagram?url=https%3A%2F%2Fcdn%2Fv.mp4%3Fsig%3Da%26b%3Dc"
        );
        assert_eq!((video.width, video.height), (720, 1280));
        assert_eq!(video.thumbnail.as_deref(), Some("https://cdn/thumb.jpg"));
        assert_eq!(data.description(), "Reel by natgeo");
        assert_eq!(data.image(), Some("https://cdn/thumb.jpg"));
    }

    #[test]
    fn parses_embed_page() {
        let html = r#"<html><body>
            <div class="Avatar"><img src="https://cdn/pp.jpg"></div>
            <span class="UsernameText">natgeo</span>
            <img class="EmbeddedMediaImage" src="https://cdn/fallback.jpg">
            <div class="Caption"><a class="CaptionUsername">natgeo</a> Sunset over the bay</div>
            <script>window.__additionalData = {"display_url":"https:\/\/cdn\/full.jpg"};</script>
        </body></html>"#;

        let page = parse_embed_page(html).unwrap();
        assert_eq!(page.username.as_deref(), Some("natgeo"));
        assert_eq!(page.caption.as_deref(), Some("Sunset over the bay"));
        assert_eq!(page.image.as_deref(), Some("https://cdn/full.jpg"));
        assert!(page.video_url.is_none());

        let data = InstagramHandler.normalize(
            &post_id(),
            InstagramSource::EmbedPage(page),
            &Config::default(),
        );
        assert_eq!(data.author_avatar(), Some("https://cdn/pp.jpg"));
    }

    #[test]
    fn embed_page_without_media_is_an_error() {
        assert!(parse_embed_page("<html><body>Login required</body></html>").is_err());
    }

    #[test]
    fn oembed_fallback_uses_author_and_thumbnail() {
        let oembed: InstagramOEmbed = serde_json::from_value(json!({
            "author_name": "natgeo",
            "author_url": "https://www.instagram.com/natgeo",
            "thumbnail_url": "https://cdn/t.jpg"
        }))
        .unwrap();
        let data = InstagramHandler.normalize(
            &post_id(),
            InstagramSource::OEmbed(oembed),
            &Config::default(),
        );
        assert_eq!(data.description(), "Post by natgeo");
        assert_eq!(data.author_url(), Some("https://www.instagram.com/natgeo"));
        assert_eq!(data.image(), Some("https://cdn/t.jpg"));
        assert!(data.images().is_empty());
    }
}
