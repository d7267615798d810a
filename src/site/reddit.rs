//! Reddit embeds via the public `.json` listing endpoint.
//!
//! Appending `.json` to a post's comments URL returns a two-element listing
//! array: the post itself, then the comment tree. Only the post is used.
//! `redd.it` short links carry no subreddit, so they are resolved by redirect
//! before the listing can be requested.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{Context, Extraction, Handler};
use crate::config::Config;
use crate::embed::{EmbedData, Platform, VideoEmbed};
use crate::error::{FetchError, FetchResult};
use crate::format::{branded_site_name, decode_entities, format_number, truncate};
use crate::profile::HeaderProfile;
use crate::tier::{run_tiers, Tier};

const PROFILE: HeaderProfile = HeaderProfile::service();

/// Reddit handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedditHandler;

/// Reddit post identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditId {
    pub subreddit: String,
    pub post_id: String,
}

fn post_pattern() -> &'static Regex {
    &patterns![r"(?i)reddit\.com/r/([^/?#]+)/comments/([a-z0-9]+)"][0]
}

fn short_pattern() -> &'static Regex {
    &patterns![r"(?i)redd\.it/([a-z0-9]+)"][0]
}

#[async_trait]
impl Handler for RedditHandler {
    type Id = RedditId;
    type Raw = RedditPost;

    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    fn patterns(&self) -> &'static [Regex] {
        patterns![
            r"(?i)reddit\.com/r/[^/?#]+/comments/",
            r"(?i)redd\.it/",
        ]
    }

    fn extract(&self, url: &str) -> Extraction<RedditId> {
        if let Some(caps) = post_pattern().captures(url) {
            return Extraction::Found(RedditId {
                subreddit: caps[1].to_string(),
                post_id: caps[2].to_ascii_lowercase(),
            });
        }
        match short_pattern().captures(url) {
            Some(caps) => Extraction::ShortLink(format!("https://redd.it/{}", &caps[1])),
            None => Extraction::Invalid,
        }
    }

    fn canonical_url(&self, id: &RedditId) -> String {
        format!(
            "https://www.reddit.com/r/{}/comments/{}/",
            id.subreddit, id.post_id
        )
    }

    async fn fetch(&self, id: &RedditId, ctx: &Context) -> FetchResult<RedditPost> {
        let api_url = format!(
            "{}/r/{}/comments/{}.json?raw_json=1",
            ctx.config.endpoints.reddit, id.subreddit, id.post_id
        );

        let tiers = vec![Tier::new("listing", async {
            tracing::debug!("Fetching from Reddit: {}", api_url);
            let listings: Vec<Listing> = ctx.client.get_json(&api_url, &PROFILE).await?;
            listings
                .into_iter()
                .next()
                .and_then(|l| l.data.children.into_iter().next())
                .map(|child| child.data)
                .ok_or(FetchError::Missing("post"))
        })];

        run_tiers(Platform::Reddit, ctx.config.upstream_timeout, tiers).await
    }

    fn normalize(&self, id: &RedditId, post: RedditPost, config: &Config) -> EmbedData {
        let title = post.title.clone().unwrap_or_default();
        let subreddit = post.subreddit.clone().unwrap_or_else(|| id.subreddit.clone());

        let body = match post.selftext.as_deref() {
            Some(text) if !text.trim().is_empty() => truncate(text, 280),
            _ => title.clone(),
        };
        let description = format!(
            "{body}\n\n⬆️ {} 💬 {}",
            format_number(post.score.unwrap_or(0).max(0).unsigned_abs()),
            format_number(post.num_comments.unwrap_or(0))
        );

        let url = match post.permalink.as_deref() {
            Some(permalink) if permalink.starts_with('/') => {
                format!("https://www.reddit.com{permalink}")
            }
            _ => self.canonical_url(id),
        };

        let author = post.author.clone().filter(|a| a != "[deleted]");

        EmbedData::builder(
            Platform::Reddit,
            format!("r/{subreddit} • {}", truncate(&title, 100)),
            url,
            branded_site_name(&config.branding_name, Platform::Reddit, None),
        )
        .description(description)
        .author_name(author.as_ref().map(|a| format!("u/{a}")))
        .author_url(author.as_ref().map(|a| format!("https://www.reddit.com/u/{a}")))
        .video(post.video())
        .image(post.image())
        .carousel(post.gallery())
        .build()
    }
}

// ============================================================================
// Reddit API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: RedditPost,
}

/// One Reddit post (a `t3` thing).
#[derive(Debug, Default, Deserialize)]
pub struct RedditPost {
    title: Option<String>,
    selftext: Option<String>,
    author: Option<String>,
    subreddit: Option<String>,
    url: Option<String>,
    permalink: Option<String>,
    thumbnail: Option<String>,
    score: Option<i64>,
    num_comments: Option<u64>,
    #[serde(default)]
    is_video: bool,
    preview: Option<Preview>,
    media: Option<Media>,
    secure_media: Option<Media>,
    gallery_data: Option<GalleryData>,
    media_metadata: Option<HashMap<String, MediaMetadata>>,
}

#[derive(Debug, Deserialize)]
struct Preview {
    #[serde(default)]
    images: Vec<PreviewImage>,
}

#[derive(Debug, Deserialize)]
struct PreviewImage {
    source: ImageSource,
}

#[derive(Debug, Deserialize)]
struct ImageSource {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Media {
    reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Deserialize)]
struct RedditVideo {
    fallback_url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Deserialize)]
struct GalleryData {
    #[serde(default)]
    items: Vec<GalleryItem>,
}

#[derive(Debug, Deserialize)]
struct GalleryItem {
    media_id: String,
}

#[derive(Debug, Deserialize)]
struct MediaMetadata {
    s: Option<MediaSource>,
}

#[derive(Debug, Deserialize)]
struct MediaSource {
    u: Option<String>,
}

impl RedditPost {
    fn video(&self) -> Option<VideoEmbed> {
        if !self.is_video {
            return None;
        }
        let video = self
            .secure_media
            .as_ref()
            .and_then(|m| m.reddit_video.as_ref())
            .or_else(|| self.media.as_ref().and_then(|m| m.reddit_video.as_ref()))?;
        let thumbnail = self
            .thumbnail
            .clone()
            .filter(|t| t.starts_with("http"));
        Some(
            VideoEmbed::new(decode_entities(&video.fallback_url), video.width, video.height)
                .with_thumbnail(thumbnail),
        )
    }

    fn image(&self) -> Option<String> {
        if let Some(image) = self.preview.as_ref().and_then(|p| p.images.first()) {
            return Some(decode_entities(&image.source.url));
        }
        self.url
            .as_deref()
            .filter(|u| is_image_link(u))
            .map(ToString::to_string)
    }

    /// Gallery images in the order the poster arranged them.
    fn gallery(&self) -> Vec<String> {
        let (Some(gallery), Some(metadata)) = (&self.gallery_data, &self.media_metadata) else {
            return Vec::new();
        };
        gallery
            .items
            .iter()
            .filter_map(|item| metadata.get(&item.media_id))
            .filter_map(|m| m.s.as_ref().and_then(|s| s.u.as_deref()))
            .map(decode_entities)
            .collect()
    }
}

fn is_image_link(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::PlatformHandler;
    use serde_json::json;

    fn id() -> RedditId {
        RedditId {
            subreddit: "rust".into(),
            post_id: "abc123".into(),
        }
    }

    fn post(value: serde_json::Value) -> RedditPost {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn matches_reddit_urls() {
        let handler = RedditHandler;
        assert!(handler.matches("https://www.reddit.com/r/rust/comments/abc123/some_title/"));
        assert!(handler.matches("https://old.reddit.com/r/rust/comments/abc123"));
        assert!(handler.matches("https://redd.it/abc123"));
        assert!(!handler.matches("https://www.reddit.com/r/rust/"));
        assert!(!handler.matches("https://www.reddit.com/user/spez"));
    }

    #[test]
    fn extracts_posts_and_short_links() {
        assert_eq!(
            RedditHandler.extract("https://www.reddit.com/r/rust/comments/ABC123/title/"),
            Extraction::Found(id())
        );
        assert_eq!(
            RedditHandler.extract("https://redd.it/abc123?utm=x"),
            Extraction::ShortLink("https://redd.it/abc123".into())
        );
        assert_eq!(
            RedditHandler.extract("https://www.reddit.com/r/rust/comments/"),
            Extraction::Invalid
        );
    }

    #[test]
    fn normalizes_image_post() {
        let raw = post(json!({
            "title": "Look at this crab",
            "selftext": "",
            "author": "ferris",
            "subreddit": "rust",
            "url": "https://i.redd.it/crab.png",
            "permalink": "/r/rust/comments/abc123/look_at_this_crab/",
            "score": 1500,
            "num_comments": 42,
            "preview": { "images": [{ "source": { "url": "https://preview.redd.it/crab.png?width=640&amp;s=abc" } }] }
        }));

        let data = RedditHandler.normalize(&id(), raw, &Config::default());
        assert_eq!(data.title(), "r/rust • Look at this crab");
        assert_eq!(
            data.description(),
            "Look at this crab\n\n⬆️ 1.5K 💬 42"
        );
        assert_eq!(
            data.url(),
            "https://www.reddit.com/r/rust/comments/abc123/look_at_this_crab/"
        );
        assert_eq!(data.image(), Some("https://preview.redd.it/crab.png?width=640&s=abc"));
        assert_eq!(data.author_name(), Some("u/ferris"));
        assert!(data.video().is_none());
    }

    #[test]
    fn normalizes_video_post() {
        let raw = post(json!({
            "title": "clip",
            "selftext": "",
            "subreddit": "rust",
            "permalink": "/r/rust/comments/abc123/clip/",
            "thumbnail": "https://b.thumbs.redditmedia.com/t.jpg",
            "is_video": true,
            "secure_media": { "reddit_video": {
                "fallback_url": "https://v.redd.it/xyz/DASH_720.mp4?source=fallback",
                "width": 1280, "height": 720
            }}
        }));

        let data = RedditHandler.normalize(&id(), raw, &Config::default());
        let video = data.video().unwrap();
        assert_eq!(video.url, "https://v.redd.it/xyz/DASH_720.mp4?source=fallback");
        assert_eq!((video.width, video.height), (1280, 720));
        assert_eq!(video.thumbnail.as_deref(), Some("https://b.thumbs.redditmedia.com/t.jpg"));
    }

    #[test]
    fn self_post_text_is_truncated() {
        let raw = post(json!({
            "title": "essay",
            "selftext": "word ".repeat(100),
            "subreddit": "rust",
            "score": 3,
            "num_comments": 0
        }));
        let data = RedditHandler.normalize(&id(), raw, &Config::default());
        let (body, stats) = data.description().split_once("\n\n").unwrap();
        assert!(body.chars().count() <= 280);
        assert!(body.ends_with("..."));
        assert_eq!(stats, "⬆️ 3 💬 0");
        assert_eq!(data.url(), "https://www.reddit.com/r/rust/comments/abc123/");
    }

    #[test]
    fn gallery_keeps_order() {
        let raw = post(json!({
            "title": "gallery",
            "subreddit": "rust",
            "gallery_data": { "items": [{ "media_id": "b" }, { "media_id": "a" }] },
            "media_metadata": {
                "a": { "s": { "u": "https://preview.redd.it/a.jpg?x=1&amp;y=2" } },
                "b": { "s": { "u": "https://preview.redd.it/b.jpg" } }
            }
        }));
        let data = RedditHandler.normalize(&id(), raw, &Config::default());
        assert_eq!(
            data.images(),
            ["https://preview.redd.it/b.jpg", "https://preview.redd.it/a.jpg?x=1&y=2"]
        );
        assert_eq!(data.image(), Some("https://preview.redd.it/b.jpg"));
    }

    #[test]
    fn detects_direct_image_links() {
        assert!(is_image_link("https://i.imgur.com/a.JPG"));
        assert!(is_image_link("https://i.imgur.com/a.webp?x=1"));
        assert!(!is_image_link("https://imgur.com/gallery/a"));
    }
}
