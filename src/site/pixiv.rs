//! Pixiv artwork embeds.
//!
//! Pixiv's own pages sit behind Cloudflare, so the first tier scrapes the
//! Open Graph tags phixiv renders for Discordbot; its image URLs already go
//! through phixiv's Referer-fixing proxy. The ajax illust API is the fallback
//! and its `i.pximg.net` images are routed through the relay's `/proxy/pixiv`.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;

use super::scrape::meta_content;
use super::{Context, Extraction, Handler};
use crate::config::Config;
use crate::embed::{EmbedData, Platform};
use crate::error::{FetchError, FetchResult};
use crate::format::{branded_site_name, format_number_cjk, proxy_url, truncate};
use crate::profile::HeaderProfile;
use crate::tier::{run_tiers, Tier};

const PHIXIV_PROFILE: HeaderProfile = HeaderProfile::discordbot();
const AJAX_PROFILE: HeaderProfile =
    HeaderProfile::desktop_json().with_referer("https://www.pixiv.net/");

/// "Title by (@author)" in phixiv's `og:title`.
static TITLE_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?) by \(@([^)]+)\)$").expect("static pattern compiles"));

static ILLUST_ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]illust_id=(\d+)").expect("static pattern compiles"));

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static pattern compiles"));

/// Pixiv handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixivHandler;

/// Raw artwork from whichever tier answered.
#[derive(Debug)]
pub enum PixivSource {
    Phixiv(PhixivMeta),
    Ajax(IllustBody),
}

#[async_trait]
impl Handler for PixivHandler {
    /// Numeric illust id.
    type Id = String;
    type Raw = PixivSource;

    fn platform(&self) -> Platform {
        Platform::Pixiv
    }

    fn patterns(&self) -> &'static [Regex] {
        patterns![
            r"(?i)pixiv\.net/(?:\w+/)?artworks/(\d+)",
            r"(?i)pixiv\.net/member_illust\.php",
            r"(?i)pixiv\.net/i/(\d+)",
        ]
    }

    fn extract(&self, url: &str) -> Extraction<String> {
        let patterns = self.patterns();
        let id = patterns[0]
            .captures(url)
            .or_else(|| patterns[2].captures(url))
            .map(|caps| caps[1].to_string())
            .or_else(|| {
                patterns[1]
                    .is_match(url)
                    .then(|| ILLUST_ID_PARAM.captures(url))
                    .flatten()
                    .map(|caps| caps[1].to_string())
            });
        id.map_or(Extraction::Invalid, Extraction::Found)
    }

    fn canonical_url(&self, id: &String) -> String {
        format!("https://www.pixiv.net/artworks/{id}")
    }

    async fn fetch(&self, id: &String, ctx: &Context) -> FetchResult<PixivSource> {
        let endpoints = &ctx.config.endpoints;
        let phixiv_url = format!("{}/artworks/{id}", endpoints.phixiv);
        let ajax_url = format!("{}/ajax/illust/{id}", endpoints.pixiv);

        let tiers = vec![
            Tier::new("phixiv", async {
                tracing::debug!("Fetching from phixiv: {}", phixiv_url);
                let html = ctx.client.get_text(&phixiv_url, &PHIXIV_PROFILE).await?;
                parse_phixiv(&html).map(PixivSource::Phixiv)
            }),
            Tier::new("ajax", async {
                tracing::debug!("Fetching from Pixiv ajax: {}", ajax_url);
                let response: AjaxResponse = ctx.client.get_json(&ajax_url, &AJAX_PROFILE).await?;
                if response.error {
                    return Err(FetchError::Upstream(
                        response.message.unwrap_or_else(|| "Pixiv ajax error".to_string()),
                    ));
                }
                response
                    .body
                    .map(PixivSource::Ajax)
                    .ok_or(FetchError::Missing("illust body"))
            }),
        ];

        run_tiers(Platform::Pixiv, ctx.config.upstream_timeout, tiers).await
    }

    fn normalize(&self, id: &String, raw: PixivSource, config: &Config) -> EmbedData {
        match raw {
            PixivSource::Phixiv(meta) => from_phixiv(self.canonical_url(id), meta, config),
            PixivSource::Ajax(body) => from_ajax(self.canonical_url(id), body, config),
        }
    }

    fn degrade(&self, id: &String, config: &Config) -> Option<EmbedData> {
        Some(
            EmbedData::builder(
                Platform::Pixiv,
                "Pixiv Artwork",
                self.canonical_url(id),
                branded_site_name(&config.branding_name, Platform::Pixiv, None),
            )
            .description(format!("View artwork #{id} on Pixiv"))
            .build(),
        )
    }
}

fn from_phixiv(url: String, meta: PhixivMeta, config: &Config) -> EmbedData {
    let author_url = meta
        .author
        .as_ref()
        .map(|author| format!("https://www.pixiv.net/users/{author}"));

    EmbedData::builder(
        Platform::Pixiv,
        meta.title,
        url,
        branded_site_name(&config.branding_name, Platform::Pixiv, None),
    )
    .description(meta.description.unwrap_or_default())
    .author_name(meta.author)
    .author_url(author_url)
    .image(meta.image)
    .build()
}

fn from_ajax(url: String, body: IllustBody, config: &Config) -> EmbedData {
    let caption = HTML_TAG.replace_all(&body.description, " ");
    let caption = caption.split_whitespace().collect::<Vec<_>>().join(" ");

    let stats = format!(
        "❤️ {} • 🔖 {} • 👁 {}",
        format_number_cjk(body.like_count, "億"),
        format_number_cjk(body.bookmark_count, "億"),
        format_number_cjk(body.view_count, "億"),
    );
    let description = if caption.is_empty() {
        stats
    } else {
        format!("{}\n\n{stats}", truncate(&caption, 280))
    };

    let site_name = if body.page_count > 1 {
        let pages = format!("{} pages", body.page_count);
        branded_site_name(&config.branding_name, Platform::Pixiv, Some(&pages))
    } else {
        branded_site_name(&config.branding_name, Platform::Pixiv, None)
    };

    let image = body
        .urls
        .regular
        .or(body.urls.original)
        .map(|src| proxy_url(&config.embed_domain, "proxy/pixiv", &src));

    let title = if body.title.trim().is_empty() {
        "Pixiv Artwork".to_string()
    } else {
        body.title
    };

    EmbedData::builder(Platform::Pixiv, title, url, site_name)
        .description(description)
        .author_name(body.user_name)
        .author_url(body.user_id.map(|uid| format!("https://www.pixiv.net/users/{uid}")))
        .image(image)
        .build()
}

/// Open Graph fields from a phixiv artwork page.
#[derive(Debug)]
pub struct PhixivMeta {
    title: String,
    author: Option<String>,
    description: Option<String>,
    image: String,
}

fn parse_phixiv(html: &str) -> FetchResult<PhixivMeta> {
    let doc = Html::parse_document(html);
    let image = meta_content(&doc, "og:image").ok_or(FetchError::Missing("og:image"))?;
    let og_title = meta_content(&doc, "og:title");

    let (title, author) = match og_title.as_deref().and_then(|t| TITLE_AUTHOR.captures(t)) {
        Some(caps) => (caps[1].to_string(), Some(caps[2].to_string())),
        None => (og_title.unwrap_or_else(|| "Pixiv Artwork".to_string()), None),
    };

    Ok(PhixivMeta {
        title,
        author,
        description: meta_content(&doc, "og:description"),
        image,
    })
}

// ============================================================================
// Pixiv Ajax API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AjaxResponse {
    #[serde(default)]
    error: bool,
    message: Option<String>,
    body: Option<IllustBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IllustBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    user_id: Option<String>,
    user_name: Option<String>,
    #[serde(default)]
    urls: IllustUrls,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    bookmark_count: u64,
    #[serde(default)]
    view_count: u64,
    #[serde(default)]
    page_count: u32,
}

#[derive(Debug, Default, Deserialize)]
struct IllustUrls {
    regular: Option<String>,
    original: Option<String>,
}
