//! Twitter/X embeds via the syndication API, with `FxTwitter` as fallback.
//!
//! The syndication endpoint is what Twitter's own embed widget uses; it needs
//! no auth but answers deleted or protected tweets with a `TweetTombstone`.
//! `FxTwitter` serves the same data in a friendlier shape when syndication is
//! down or rate limited.
//!
//! # Example
//!
//! ```rust,no_run
//! use fixembed::site::{Extraction, Handler, twitter::TwitterHandler};
//!
//! let handler = TwitterHandler;
//! let Extraction::Found(id) = handler.extract("https://x.com/naval/status/1234567890") else {
//!     unreachable!()
//! };
//! assert_eq!(handler.canonical_url(&id), "https://twitter.com/naval/status/1234567890");
//! ```

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{Context, Extraction, Handler};
use crate::config::Config;
use crate::embed::{EmbedData, Platform, VideoEmbed};
use crate::error::{FetchError, FetchResult};
use crate::format::{best_mp4, branded_site_name, truncate, Stats, VideoVariant};
use crate::profile::HeaderProfile;
use crate::tier::{run_tiers, Tier};

const PROFILE: HeaderProfile = HeaderProfile::desktop_json();
const VIDEO_WIDTH: u32 = 1280;

/// Twitter/X handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwitterHandler;

/// Tweet identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetId {
    pub username: String,
    pub tweet_id: String,
}

/// Raw tweet from whichever tier answered.
#[derive(Debug)]
pub enum TweetSource {
    Syndication(SyndicationTweet),
    FxTwitter(FxTweet),
}

#[async_trait]
impl Handler for TwitterHandler {
    type Id = TweetId;
    type Raw = TweetSource;

    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn patterns(&self) -> &'static [Regex] {
        patterns![r"(?i)(?:twitter\.com|x\.com)/([^/?#]+)/status(?:es)?/(\d+)"]
    }

    fn extract(&self, url: &str) -> Extraction<TweetId> {
        match self.patterns()[0].captures(url) {
            Some(caps) => Extraction::Found(TweetId {
                username: caps[1].to_string(),
                tweet_id: caps[2].to_string(),
            }),
            None => Extraction::Invalid,
        }
    }

    fn canonical_url(&self, id: &TweetId) -> String {
        format!("https://twitter.com/{}/status/{}", id.username, id.tweet_id)
    }

    async fn fetch(&self, id: &TweetId, ctx: &Context) -> FetchResult<TweetSource> {
        let endpoints = &ctx.config.endpoints;
        let syndication_url = format!(
            "{}/tweet-result?id={}&lang=en&token=0",
            endpoints.twitter_syndication, id.tweet_id
        );
        let fx_url = format!(
            "{}/{}/status/{}",
            endpoints.fxtwitter, id.username, id.tweet_id
        );

        let tiers = vec![
            Tier::new("syndication", async {
                tracing::debug!("Fetching from syndication: {}", syndication_url);
                let tweet: SyndicationTweet = ctx.client.get_json(&syndication_url, &PROFILE).await?;
                if tweet.typename.as_deref() == Some("TweetTombstone") {
                    return Err(FetchError::Upstream("Tweet not found or deleted".into()));
                }
                if tweet.user.is_none() {
                    return Err(FetchError::Missing("tweet author"));
                }
                Ok(TweetSource::Syndication(tweet))
            }),
            Tier::new("fxtwitter", async {
                tracing::debug!("Fetching from FxTwitter: {}", fx_url);
                let response: FxTwitterResponse = ctx.client.get_json(&fx_url, &PROFILE).await?;
                response
                    .tweet
                    .map(TweetSource::FxTwitter)
                    .ok_or(FetchError::Missing("tweet"))
            }),
        ];

        run_tiers(Platform::Twitter, ctx.config.upstream_timeout, tiers).await
    }

    fn normalize(&self, id: &TweetId, raw: TweetSource, config: &Config) -> EmbedData {
        let tweet = match raw {
            TweetSource::Syndication(t) => from_syndication(t),
            TweetSource::FxTwitter(t) => from_fxtwitter(t),
        };

        let handle = if tweet.handle.is_empty() {
            id.username.clone()
        } else {
            tweet.handle
        };
        let name = if tweet.name.is_empty() {
            handle.clone()
        } else {
            tweet.name
        };

        EmbedData::builder(
            Platform::Twitter,
            format!("{name} (@{handle})"),
            format!("https://twitter.com/{handle}/status/{}", id.tweet_id),
            branded_site_name(&config.branding_name, Platform::Twitter, None),
        )
        .description(truncate(&tweet.text, 500))
        .author_name(name)
        .author_url(format!("https://twitter.com/{handle}"))
        .author_avatar(tweet.avatar)
        .image(tweet.image)
        .carousel(tweet.photos)
        .video(tweet.video)
        .stats(tweet.stats.render())
        .build()
    }
}

/// Tier-independent view of a tweet.
struct Tweet {
    name: String,
    handle: String,
    avatar: Option<String>,
    text: String,
    stats: Stats,
    image: Option<String>,
    photos: Vec<String>,
    video: Option<VideoEmbed>,
}

fn from_syndication(tweet: SyndicationTweet) -> Tweet {
    let user = tweet.user.unwrap_or_default();

    let views = tweet
        .view_count_info
        .and_then(|v| v.count)
        .and_then(|c| c.parse().ok());
    let stats = Stats {
        comments: tweet.conversation_count,
        reposts: Some(tweet.retweet_count.unwrap_or(0) + tweet.quote_count.unwrap_or(0)),
        likes: tweet.favorite_count,
        views,
        shares: None,
    };

    let media = [
        tweet.media_details,
        tweet.extended_entities.and_then(|e| e.media),
        tweet.entities.and_then(|e| e.media),
    ]
    .into_iter()
    .flatten()
    .find(|m| !m.is_empty())
    .unwrap_or_default();

    let mut image = None;
    let mut video = None;
    let mut photos = Vec::new();

    if let Some(first) = media.first() {
        match first.kind.as_str() {
            "video" | "animated_gif" => {
                if let Some(info) = &first.video_info {
                    let variants: Vec<VideoVariant<'_>> = info
                        .variants
                        .iter()
                        .map(|v| VideoVariant {
                            url: &v.url,
                            content_type: &v.content_type,
                            bitrate: v.bitrate,
                        })
                        .collect();
                    if let Some(url) = best_mp4(&variants) {
                        let height = aspect_height(info.aspect_ratio);
                        video = Some(
                            VideoEmbed::new(url, VIDEO_WIDTH, height)
                                .with_thumbnail(first.media_url_https.clone()),
                        );
                    }
                }
                image = first.media_url_https.clone();
            }
            _ => {
                photos = media
                    .iter()
                    .filter(|m| m.kind == "photo")
                    .filter_map(|m| m.media_url_https.clone())
                    .collect();
                if photos.len() < 2 {
                    image = photos.pop();
                }
            }
        }
    }

    Tweet {
        name: user.name.unwrap_or_default(),
        handle: user.screen_name.unwrap_or_default(),
        avatar: user.profile_image_url_https,
        text: tweet.text.unwrap_or_default(),
        stats,
        image,
        photos,
        video,
    }
}

fn from_fxtwitter(tweet: FxTweet) -> Tweet {
    let stats = Stats {
        comments: tweet.replies,
        reposts: tweet.retweets,
        likes: tweet.likes,
        views: tweet.views,
        shares: None,
    };

    let media = tweet.media.unwrap_or_default();
    let video = media.videos.into_iter().find(|v| !v.url.is_empty()).map(|v| {
        let height = if v.width > 0 && v.height > 0 {
            aspect_height(Some((v.width, v.height)))
        } else {
            aspect_height(None)
        };
        VideoEmbed::new(v.url, VIDEO_WIDTH, height).with_thumbnail(v.thumbnail_url)
    });

    let mut photos: Vec<String> = media.photos.into_iter().map(|p| p.url).collect();
    let mut image = video.as_ref().and_then(|v| v.thumbnail.clone());
    if image.is_none() && photos.len() < 2 {
        image = photos.pop();
    }

    Tweet {
        name: tweet.author.name,
        handle: tweet.author.screen_name,
        avatar: tweet.author.avatar_url,
        text: tweet.text.unwrap_or_default(),
        stats,
        image,
        photos,
        video,
    }
}

/// Height of a 1280-wide video for the given aspect ratio (16:9 if unknown).
fn aspect_height(ratio: Option<(u32, u32)>) -> u32 {
    let (w, h) = match ratio {
        Some((w, h)) if w > 0 => (w, h),
        _ => (16, 9),
    };
    let height = (u64::from(VIDEO_WIDTH) * u64::from(h) + u64::from(w) / 2) / u64::from(w);
    u32::try_from(height).unwrap_or(VIDEO_WIDTH)
}

// ============================================================================
// Syndication API Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SyndicationTweet {
    #[serde(rename = "__typename")]
    typename: Option<String>,
    text: Option<String>,
    user: Option<SyndicationUser>,
    favorite_count: Option<u64>,
    retweet_count: Option<u64>,
    quote_count: Option<u64>,
    conversation_count: Option<u64>,
    view_count_info: Option<ViewCount>,
    #[serde(rename = "mediaDetails")]
    media_details: Option<Vec<SyndicationMedia>>,
    extended_entities: Option<Entities>,
    entities: Option<Entities>,
}

#[derive(Debug, Default, Deserialize)]
struct SyndicationUser {
    name: Option<String>,
    screen_name: Option<String>,
    profile_image_url_https: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewCount {
    count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Entities {
    media: Option<Vec<SyndicationMedia>>,
}

#[derive(Debug, Deserialize)]
struct SyndicationMedia {
    #[serde(rename = "type")]
    kind: String,
    media_url_https: Option<String>,
    video_info: Option<VideoInfo>,
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    variants: Vec<Variant>,
    aspect_ratio: Option<(u32, u32)>,
}

#[derive(Debug, Deserialize)]
struct Variant {
    bitrate: Option<u64>,
    content_type: String,
    url: String,
}

// ============================================================================
// FxTwitter API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct FxTwitterResponse {
    tweet: Option<FxTweet>,
}

#[derive(Debug, Deserialize)]
pub struct FxTweet {
    text: Option<String>,
    author: FxAuthor,
    likes: Option<u64>,
    retweets: Option<u64>,
    replies: Option<u64>,
    views: Option<u64>,
    media: Option<FxMedia>,
}

#[derive(Debug, Deserialize)]
struct FxAuthor {
    name: String,
    screen_name: String,
    avatar_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FxMedia {
    #[serde(default)]
    photos: Vec<FxPhoto>,
    #[serde(default)]
    videos: Vec<FxVideo>,
}

#[derive(Debug, Deserialize)]
struct FxPhoto {
    url: String,
}

#[derive(Debug, Deserialize)]
struct FxVideo {
    url: String,
    thumbnail_url: Option<String>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}
