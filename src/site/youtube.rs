//! YouTube embeds via Invidious, with YouTube's own oEmbed as fallback.
//!
//! Invidious instances expose `/api/v1/videos/{id}` with view counts, likes
//! and duration. Instances come and go, so every configured instance is its
//! own tier, tried in the order the [`InstanceSelector`] picks. YouTube's
//! oEmbed endpoint has no statistics but is always up; if even that fails the
//! handler still returns a static player embed built from the video id.
//!
//! [`InstanceSelector`]: crate::tier::InstanceSelector

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::{Context, Extraction, Handler};
use crate::config::Config;
use crate::embed::{EmbedData, Platform, VideoEmbed};
use crate::error::{FetchError, FetchResult};
use crate::format::{format_duration, format_number_fixed, truncate};
use crate::profile::HeaderProfile;
use crate::tier::{run_tiers, Tier};

const PROFILE: HeaderProfile = HeaderProfile::service();
const THUMBNAIL_PREFERENCE: [&str; 3] = ["maxres", "hq720", "sddefault"];

/// YouTube handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct YouTubeHandler;

/// Raw video metadata from whichever tier answered.
#[derive(Debug)]
pub enum YouTubeSource {
    Invidious {
        instance: String,
        video: InvidiousVideo,
    },
    OEmbed(YouTubeOEmbed),
}

#[async_trait]
impl Handler for YouTubeHandler {
    type Id = String;
    type Raw = YouTubeSource;

    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn patterns(&self) -> &'static [Regex] {
        patterns![
            r"(?i)youtube\.com/watch\?",
            r"(?i)youtu\.be/",
            r"(?i)youtube\.com/shorts/",
            r"(?i)youtube\.com/embed/",
            r"(?i)youtube\.com/live/",
        ]
    }

    fn extract(&self, url: &str) -> Extraction<String> {
        video_id(url).map_or(Extraction::Invalid, Extraction::Found)
    }

    fn canonical_url(&self, id: &String) -> String {
        format!("https://www.youtube.com/watch?v={id}")
    }

    async fn fetch(&self, id: &String, ctx: &Context) -> FetchResult<YouTubeSource> {
        let mut tiers: Vec<Tier<'_, YouTubeSource>> = ctx
            .selector
            .order(&ctx.config.invidious_instances)
            .into_iter()
            .map(|instance| {
                Tier::new("invidious", async move {
                    let api_url = format!("{instance}/api/v1/videos/{id}");
                    tracing::debug!("Fetching from Invidious: {}", api_url);
                    let video: InvidiousVideo = ctx.client.get_json(&api_url, &PROFILE).await?;
                    if video.title.trim().is_empty() {
                        return Err(FetchError::Missing("video title"));
                    }
                    Ok(YouTubeSource::Invidious {
                        instance: instance.to_string(),
                        video,
                    })
                })
            })
            .collect();

        let oembed_url = format!(
            "{}/oembed?url={}&format=json",
            ctx.config.endpoints.youtube,
            urlencoding::encode(&self.canonical_url(id))
        );
        tiers.push(Tier::new("oembed", async move {
            tracing::debug!("Fetching from YouTube oEmbed: {}", oembed_url);
            let oembed: YouTubeOEmbed = ctx.client.get_json(&oembed_url, &PROFILE).await?;
            Ok(YouTubeSource::OEmbed(oembed))
        }));

        run_tiers(Platform::YouTube, ctx.config.upstream_timeout, tiers).await
    }

    fn normalize(&self, id: &String, raw: YouTubeSource, _config: &Config) -> EmbedData {
        match raw {
            YouTubeSource::Invidious { instance, video } => from_invidious(id, &instance, video),
            YouTubeSource::OEmbed(oembed) => from_oembed(id, oembed),
        }
    }

    fn degrade(&self, id: &String, _config: &Config) -> Option<EmbedData> {
        Some(
            EmbedData::builder(
                Platform::YouTube,
                "YouTube Video",
                self.canonical_url(id),
                "YouTube",
            )
            .description("Watch on YouTube")
            .image(format!("https://i.ytimg.com/vi/{id}/maxresdefault.jpg"))
            .video(player(id, Some(format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg"))))
            .build(),
        )
    }
}

/// Pull the video id out of any supported URL shape.
fn video_id(url: &str) -> Option<String> {
    let parsed = if url.contains("://") {
        Url::parse(url).ok()?
    } else {
        Url::parse(&format!("https://{url}")).ok()?
    };

    let host = parsed.host_str()?.to_ascii_lowercase();
    let mut segments = parsed.path_segments()?;

    let candidate = if host.ends_with("youtu.be") {
        segments.next().map(ToString::to_string)
    } else {
        match segments.next()? {
            "watch" => parsed
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            "shorts" | "embed" | "live" => segments.next().map(ToString::to_string),
            _ => None,
        }
    }?;

    is_video_id(&candidate).then_some(candidate)
}

fn is_video_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn player(id: &str, thumbnail: Option<String>) -> VideoEmbed {
    VideoEmbed::new(format!("https://www.youtube.com/embed/{id}"), 1280, 720).with_thumbnail(thumbnail)
}

fn from_invidious(id: &str, instance: &str, video: InvidiousVideo) -> EmbedData {
    let thumbnail = best_thumbnail(&video.video_thumbnails)
        .map(|url| absolutize(instance, url))
        .unwrap_or_else(|| format!("https://i.ytimg.com/vi/{id}/maxresdefault.jpg"));

    let mut stats = vec![format!("👁️ {}", format_number_fixed(video.view_count))];
    if video.like_count > 0 {
        stats.push(format!("👍 {}", format_number_fixed(video.like_count)));
    }
    let stats = stats.join(" • ");

    let description = if video.description.trim().is_empty() {
        stats
    } else {
        format!("{}\n\n{stats}", truncate(&video.description, 200))
    };

    let site_name = if video.length_seconds > 0 {
        format!("YouTube • {}", format_duration(video.length_seconds))
    } else {
        "YouTube".to_string()
    };

    let avatar = video
        .author_thumbnails
        .iter()
        .max_by_key(|t| t.width)
        .map(|t| absolutize(instance, &t.url));

    EmbedData::builder(
        Platform::YouTube,
        video.title,
        format!("https://www.youtube.com/watch?v={id}"),
        site_name,
    )
    .description(description)
    .author_name(video.author)
    .author_url(
        video
            .author_url
            .map(|path| format!("https://www.youtube.com{path}")),
    )
    .author_avatar(avatar)
    .image(thumbnail.clone())
    .video(player(id, Some(thumbnail)))
    .build()
}

fn from_oembed(id: &str, oembed: YouTubeOEmbed) -> EmbedData {
    let thumbnail = oembed
        .thumbnail_url
        .unwrap_or_else(|| format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg"));

    EmbedData::builder(
        Platform::YouTube,
        oembed.title.unwrap_or_else(|| "YouTube Video".to_string()),
        format!("https://www.youtube.com/watch?v={id}"),
        "YouTube",
    )
    .author_name(oembed.author_name)
    .author_url(oembed.author_url)
    .image(thumbnail.clone())
    .video(player(id, Some(thumbnail)))
    .build()
}

fn best_thumbnail(thumbnails: &[Thumbnail]) -> Option<&str> {
    THUMBNAIL_PREFERENCE
        .iter()
        .find_map(|quality| thumbnails.iter().find(|t| t.quality.as_deref() == Some(*quality)))
        .or_else(|| thumbnails.first())
        .map(|t| t.url.as_str())
}

/// Some instances return thumbnails relative to themselves.
fn absolutize(instance: &str, url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else if url.starts_with('/') {
        format!("{}{url}", instance.trim_end_matches('/'))
    } else {
        url.to_string()
    }
}

// ============================================================================
// Invidious API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvidiousVideo {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    view_count: u64,
    #[serde(default)]
    like_count: u64,
    author: Option<String>,
    author_url: Option<String>,
    #[serde(default)]
    author_thumbnails: Vec<Thumbnail>,
    #[serde(default)]
    length_seconds: u64,
    #[serde(default)]
    video_thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    quality: Option<String>,
    url: String,
    #[serde(default)]
    width: u32,
}

// ============================================================================
// YouTube oEmbed Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct YouTubeOEmbed {
    title: Option<String>,
    author_name: Option<String>,
    author_url: Option<String>,
    thumbnail_url: Option<String>,
}
