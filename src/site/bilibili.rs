//! Bilibili video embeds via the web-interface view API.
//!
//! The view API gives metadata and the `cid` needed to ask `playurl` for a
//! progressive MP4. With `platform=html5` the stream skips the Referer check
//! for the first request, but Discord refetches with ranges, so the stream
//! still goes through the relay's `/proxy/bilibili`. `playurl` runs after the
//! view tier under its own budget: a failed or slow lookup only costs the
//! inline player and the embed falls back to the cover image.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{Context, Extraction, Handler};
use crate::config::Config;
use crate::embed::{EmbedData, Platform, VideoEmbed};
use crate::error::{FetchError, FetchResult};
use crate::format::{absolute_url, format_number_cjk, proxy_url, truncate};
use crate::profile::HeaderProfile;
use crate::tier::{enrich, run_tiers, Tier};

const VIEW_PROFILE: HeaderProfile =
    HeaderProfile::desktop_json().with_referer("https://www.bilibili.com/");
const PLAYURL_PROFILE: HeaderProfile =
    HeaderProfile::mobile().with_referer("https://www.bilibili.com/");

/// Bilibili handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct BilibiliHandler;

/// Video identifier; new-style BV id or legacy numeric av id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoId {
    Bv(String),
    Av(u64),
}

impl VideoId {
    fn query(&self) -> String {
        match self {
            Self::Bv(bvid) => format!("bvid={bvid}"),
            Self::Av(aid) => format!("aid={aid}"),
        }
    }
}

/// View metadata plus the proxied stream, if `playurl` produced one.
#[derive(Debug)]
pub struct BilibiliVideo {
    info: VideoInfo,
    stream: Option<String>,
}

#[async_trait]
impl Handler for BilibiliHandler {
    type Id = VideoId;
    type Raw = BilibiliVideo;

    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    fn patterns(&self) -> &'static [Regex] {
        patterns![
            r"(?i)bilibili\.com/video/(BV[a-zA-Z0-9]+)",
            r"(?i)bilibili\.com/video/av(\d+)",
            r"(?i)b23\.tv/([a-zA-Z0-9]+)",
        ]
    }

    fn extract(&self, url: &str) -> Extraction<VideoId> {
        let patterns = self.patterns();
        if let Some(caps) = patterns[0].captures(url) {
            return Extraction::Found(VideoId::Bv(caps[1].to_string()));
        }
        if let Some(caps) = patterns[1].captures(url) {
            return caps[1]
                .parse()
                .map_or(Extraction::Invalid, |aid| Extraction::Found(VideoId::Av(aid)));
        }
        if let Some(caps) = patterns[2].captures(url) {
            return Extraction::ShortLink(format!("https://b23.tv/{}", &caps[1]));
        }
        Extraction::Invalid
    }

    fn canonical_url(&self, id: &VideoId) -> String {
        match id {
            VideoId::Bv(bvid) => format!("https://www.bilibili.com/video/{bvid}"),
            VideoId::Av(aid) => format!("https://www.bilibili.com/video/av{aid}"),
        }
    }

    async fn fetch(&self, id: &VideoId, ctx: &Context) -> FetchResult<BilibiliVideo> {
        let base = &ctx.config.endpoints.bilibili;
        let view_url = format!("{base}/x/web-interface/view?{}", id.query());

        let tiers = vec![Tier::new("view", async {
            tracing::debug!("Fetching from Bilibili: {}", view_url);
            let response: ApiResponse<VideoInfo> = ctx.client.get_json(&view_url, &VIEW_PROFILE).await?;
            response.into_data("video")
        })];
        let info = run_tiers(Platform::Bilibili, ctx.config.upstream_timeout, tiers).await?;

        let playurl = format!(
            "{base}/x/player/playurl?bvid={}&cid={}&qn=64&fnval=1&platform=html5&high_quality=1",
            info.bvid, info.cid
        );
        let stream = enrich(Platform::Bilibili, "stream", ctx.config.upstream_timeout, async {
            let response: ApiResponse<PlayUrl> = ctx.client.get_json(&playurl, &PLAYURL_PROFILE).await?;
            let play = response.into_data("stream")?;
            play.durl
                .into_iter()
                .next()
                .map(|d| d.url)
                .ok_or(FetchError::Missing("stream segment"))
        })
        .await;

        Ok(BilibiliVideo { info, stream })
    }

    fn normalize(&self, _id: &VideoId, raw: BilibiliVideo, config: &Config) -> EmbedData {
        let BilibiliVideo { info, stream } = raw;

        let stats = format!(
            "▶️ {} • 👍 {} • ⭐ {}",
            format_number_cjk(info.stat.view, "亿"),
            format_number_cjk(info.stat.like, "亿"),
            format_number_cjk(info.stat.favorite, "亿"),
        );
        let description = if info.desc.trim().is_empty() || info.desc == "-" {
            stats
        } else {
            format!("{}\n\n{stats}", truncate(&info.desc, 180))
        };

        let site_name = format!(
            "Bilibili • {}:{:02}",
            info.duration / 60,
            info.duration % 60
        );
        let cover = Some(absolute_url(&info.pic)).filter(|pic| !pic.is_empty());
        let video = stream.map(|url| {
            VideoEmbed::new(proxy_url(&config.embed_domain, "proxy/bilibili", &url), 1280, 720)
                .with_thumbnail(cover.clone())
        });

        EmbedData::builder(
            Platform::Bilibili,
            info.title,
            format!("https://www.bilibili.com/video/{}", info.bvid),
            site_name,
        )
        .description(description)
        .author_name(info.owner.name)
        .author_url(format!("https://space.bilibili.com/{}", info.owner.mid))
        .author_avatar(info.owner.face.map(|face| absolute_url(&face)))
        .image(cover)
        .video(video)
        .build()
    }
}

// ============================================================================
// Bilibili API Response Types
// ============================================================================

/// Bilibili's `{code, message, data}` envelope; `code != 0` is an error.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    message: Option<String>,
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self, what: &'static str) -> FetchResult<T> {
        if self.code != 0 {
            return Err(FetchError::Upstream(format!(
                "Bilibili API code {}: {}",
                self.code,
                self.message.unwrap_or_default()
            )));
        }
        self.data.ok_or(FetchError::Missing(what))
    }
}

#[derive(Debug, Deserialize)]
pub struct VideoInfo {
    bvid: String,
    #[serde(default)]
    cid: u64,
    title: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    pic: String,
    #[serde(default)]
    duration: u64,
    owner: Owner,
    #[serde(default)]
    stat: VideoStat,
}

#[derive(Debug, Deserialize)]
struct Owner {
    mid: u64,
    name: Option<String>,
    face: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoStat {
    #[serde(default)]
    view: u64,
    #[serde(default)]
    like: u64,
    #[serde(default)]
    favorite: u64,
}

#[derive(Debug, Deserialize)]
struct PlayUrl {
    #[serde(default)]
    durl: Vec<StreamSegment>,
}

#[derive(Debug, Deserialize)]
struct StreamSegment {
    url: String,
}
