//! Output formats for chat-client crawlers.
//!
//! - [`embed_page`]: Open Graph / Twitter-card HTML for a successful embed
//! - [`error_page`]: minimal page when a handler had nowhere to redirect
//! - [`oembed_json`] / [`oembed_xml`]: provider and stats row for Discord
//! - [`ActivityData`], [`activity_note`], [`activity_actor`]: ActivityPub
//!   documents that give Discord's footer the branding and author line
//! - [`legacy_status`] / [`legacy_actor`]: the older `/users/...` documents
//!
//! Everything user-controlled is escaped by maud; optional fields that are
//! absent produce no tag at all rather than an empty one.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use maud::{html, Markup, DOCTYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Config;
use crate::embed::EmbedData;

/// Logo used for favicons and the fallback actor icon.
pub const LOGO_URL: &str =
    "https://raw.githubusercontent.com/kenhendricks00/FixEmbed/main/assets/logo.png";
pub const PROVIDER_URL: &str = "https://fixembed.app";

const ICON_SIZES: [&str; 5] = ["16", "24", "32", "48", "64"];
const BOT_AGENTS: [&str; 7] = [
    "discord", "telegram", "slack", "facebook", "twitter", "linkedin", "whatsapp",
];

/// Whether a `User-Agent` belongs to a link-preview crawler.
#[must_use]
pub fn is_bot(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    BOT_AGENTS.iter().any(|bot| ua.contains(bot))
}

/// Open Graph page for a resolved embed.
#[must_use]
pub fn embed_page(data: &EmbedData, config: &Config) -> Markup {
    let og_type = if data.video().is_some() { "video.other" } else { "article" };
    let activity = ActivityData::from_embed(data).encode();
    let oembed_href = oembed_href(data, config);
    let primary_image = data.images().first().map(String::as_str).or(data.image());

    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta property="og:title" content=(data.title());
                @if !data.description().is_empty() {
                    meta property="og:description" content=(data.description());
                }
                meta property="og:url" content=(data.url());
                meta property="og:site_name" content=(data.site_name());
                meta property="og:type" content=(og_type);
                @if let Some(color) = data.color() {
                    meta name="theme-color" content=(color);
                }
                @if let Some(author) = data.author_name() {
                    meta property="og:article:author" content=(author);
                }

                @if data.images().is_empty() {
                    @if let Some(image) = data.image() {
                        meta property="og:image" content=(image);
                    }
                } @else {
                    @for image in data.images() {
                        meta property="og:image" content=(image);
                    }
                }
                @if let Some(image) = primary_image {
                    meta name="twitter:card" content="summary_large_image";
                    meta name="twitter:image" content=(image);
                }

                @if let Some(video) = data.video() {
                    meta property="og:video" content=(video.url);
                    meta property="og:video:url" content=(video.url);
                    meta property="og:video:secure_url" content=(video.url);
                    meta property="og:video:type" content="video/mp4";
                    @if video.has_dimensions() {
                        meta property="og:video:width" content=(video.width);
                        meta property="og:video:height" content=(video.height);
                    }
                    @if let Some(thumbnail) = &video.thumbnail {
                        @if data.image() != Some(thumbnail.as_str()) {
                            meta property="og:image" content=(thumbnail);
                        }
                    }
                    @if primary_image.is_none() {
                        meta name="twitter:card" content="summary_large_image";
                    }
                }

                meta name="twitter:title" content=(data.title());
                @if !data.description().is_empty() {
                    meta name="twitter:description" content=(data.description());
                }

                @for size in ICON_SIZES {
                    link href=(LOGO_URL) rel="icon" sizes=(format!("{size}x{size}")) type="image/png";
                }
                link rel="apple-touch-icon" href=(LOGO_URL);
                link rel="alternate" type="application/json+oembed" href=(oembed_href);
                link href=(format!("https://{}/activity/{activity}", config.embed_domain))
                    rel="alternate" type="application/activity+json";
                meta http-equiv="refresh" content=(format!("0; url={}", data.url()));
            }
            body {
                p { "Redirecting to " a href=(data.url()) { (data.url()) } }
            }
        }
    }
}

/// `/oembed` link carrying the stats row (or author) and the branded provider.
fn oembed_href(data: &EmbedData, config: &Config) -> String {
    let mut href = format!(
        "https://{}/oembed?url={}&format=json&provider={}",
        config.embed_domain,
        urlencoding::encode(data.url()),
        urlencoding::encode(data.site_name()),
    );
    if let Some(stats) = data.stats() {
        href.push_str(&format!("&stats={}", urlencoding::encode(stats)));
    } else if let Some(author) = data.author_name() {
        href.push_str(&format!("&author={}", urlencoding::encode(author)));
    }
    href
}

/// Page shown when a handler failed without a redirect target.
#[must_use]
pub fn error_page(message: &str, url: &str) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta property="og:title" content="FixEmbed Error";
                meta property="og:description" content=(message);
                meta name="theme-color" content="#ff0000";
            }
            body {
                h1 { "Error" }
                p { (message) }
                @if !url.is_empty() {
                    p { a href=(url) { "Go to original URL" } }
                }
            }
        }
    }
}

/// Query parameters of `/oembed`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OEmbedQuery {
    pub url: Option<String>,
    pub stats: Option<String>,
    pub author: Option<String>,
    pub provider: Option<String>,
    pub format: Option<String>,
}

impl OEmbedQuery {
    #[must_use]
    pub fn wants_xml(&self) -> bool {
        self.format.as_deref() == Some("xml")
    }

    /// Stats win over the author; Discord shows this as the author line.
    fn author_line(&self) -> Option<&str> {
        self.stats
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.author.as_deref().filter(|a| !a.is_empty()))
    }

    fn provider_name<'a>(&'a self, config: &'a Config) -> &'a str {
        self.provider
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&config.site_name)
    }

    fn author_url(&self) -> &str {
        self.url.as_deref().unwrap_or(PROVIDER_URL)
    }
}

/// Rich oEmbed document. No thumbnail fields, so Discord keeps the large
/// image from the Open Graph tags.
#[must_use]
pub fn oembed_json(query: &OEmbedQuery, config: &Config) -> Value {
    let mut doc = json!({
        "version": "1.0",
        "type": "rich",
        "provider_name": query.provider_name(config),
        "provider_url": PROVIDER_URL,
        "title": "Post",
    });
    if let Some(author) = query.author_line() {
        doc["author_name"] = json!(author);
        doc["author_url"] = json!(query.author_url());
    }
    doc
}

/// XML form of [`oembed_json`].
#[must_use]
pub fn oembed_xml(query: &OEmbedQuery, config: &Config) -> String {
    let field = |name: &str, value: &str| format!("  <{name}>{}</{name}>\n", escape(value));
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<oembed>\n");
    xml.push_str(&field("version", "1.0"));
    xml.push_str(&field("type", "rich"));
    xml.push_str(&field("provider_name", query.provider_name(config)));
    xml.push_str(&field("provider_url", PROVIDER_URL));
    if let Some(author) = query.author_line() {
        xml.push_str(&field("author_name", author));
        xml.push_str(&field("author_url", query.author_url()));
    }
    xml.push_str(&field("title", "Post"));
    xml.push_str("</oembed>\n");
    xml
}

fn escape(value: &str) -> String {
    html! { (value) }.into_string()
}

/// Embed summary carried in `/activity/{data}` URLs as base64url JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityData {
    /// Title, first 100 characters.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub t: String,
    /// Description, first 200 characters.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub d: String,
    /// Image.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub i: String,
    /// Video.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub v: String,
    /// Author display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub a: String,
    /// Author handle.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub h: String,
    /// Author icon.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ic: String,
    /// Stats row.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub s: String,
    /// Original URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub u: String,
}

impl ActivityData {
    #[must_use]
    pub fn from_embed(data: &EmbedData) -> Self {
        let author = data.author_name().unwrap_or_default();
        Self {
            t: data.title().chars().take(100).collect(),
            d: data.description().chars().take(200).collect(),
            i: data
                .image()
                .or_else(|| data.video().and_then(|v| v.thumbnail.as_deref()))
                .unwrap_or_default()
                .to_string(),
            v: data.video().map(|v| v.url.clone()).unwrap_or_default(),
            a: author.to_string(),
            h: author.trim_start_matches('@').to_string(),
            ic: data.author_avatar().unwrap_or_default().to_string(),
            s: data.stats().unwrap_or_default().to_string(),
            u: data.url().to_string(),
        }
    }

    /// Unpadded base64url of the JSON form.
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Inverse of [`encode`](Self::encode). Padding is tolerated; anything
    /// undecodable yields `None`.
    #[must_use]
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// ActivityPub `Note` for `/activity/{encoded}`.
#[must_use]
pub fn activity_note(
    data: &ActivityData,
    encoded: &str,
    config: &Config,
    published: DateTime<Utc>,
) -> Value {
    let base = format!("https://{}/activity/{encoded}", config.embed_domain);
    let mut note = json!({
        "@context": [
            "https://www.w3.org/ns/activitystreams",
            {
                "sensitive": "as:sensitive",
                "toot": "http://joinmastodon.org/ns#",
                "Emoji": "toot:Emoji"
            }
        ],
        "id": base,
        "type": "Note",
        "summary": (!data.s.is_empty()).then_some(&data.s),
        "content": html! { p { (data.d) } }.into_string(),
        "attributedTo": format!("{base}/actor"),
        "published": published.to_rfc3339_opts(SecondsFormat::Millis, true),
        "url": if data.u.is_empty() { PROVIDER_URL } else { data.u.as_str() },
    });

    let attachment = if !data.v.is_empty() {
        Some(json!({
            "type": "Document",
            "mediaType": "video/mp4",
            "url": data.v,
            "name": if data.t.is_empty() { "Video" } else { data.t.as_str() },
        }))
    } else if !data.i.is_empty() {
        Some(json!({
            "type": "Document",
            "mediaType": "image/jpeg",
            "url": data.i,
            "name": if data.t.is_empty() { "Image" } else { data.t.as_str() },
        }))
    } else {
        None
    };
    if let Some(attachment) = attachment {
        note["attachment"] = json!([attachment]);
    }
    note
}

/// ActivityPub `Person` for `/activity/{encoded}/actor`.
#[must_use]
pub fn activity_actor(data: &ActivityData, encoded: &str, config: &Config) -> Value {
    let name = if data.a.is_empty() { config.site_name.as_str() } else { data.a.as_str() };
    let handle = if data.h.is_empty() { "fixembed" } else { data.h.as_str() };
    let icon = if data.ic.is_empty() { LOGO_URL } else { data.ic.as_str() };

    json!({
        "@context": [
            "https://www.w3.org/ns/activitystreams",
            {
                "manuallyApprovesFollowers": "as:manuallyApprovesFollowers",
                "toot": "http://joinmastodon.org/ns#",
                "featured": { "@id": "toot:featured", "@type": "@id" }
            }
        ],
        "id": format!("https://{}/activity/{encoded}/actor", config.embed_domain),
        "type": "Person",
        "name": name,
        "preferredUsername": handle.trim_start_matches('@'),
        "summary": format!("{} Service", config.site_name),
        "url": format!("{PROVIDER_URL}/users/{}", urlencoding::encode(name)),
        "icon": { "type": "Image", "mediaType": "image/jpeg", "url": icon },
    })
}

/// Bare `Note` for the older `/users/{author}/statuses/{status}` links.
#[must_use]
pub fn legacy_status(author: &str, status: &str, published: DateTime<Utc>) -> Value {
    let author_url = format!("{PROVIDER_URL}/users/{author}");
    json!({
        "@context": ["https://www.w3.org/ns/activitystreams"],
        "id": format!("{author_url}/statuses/{status}"),
        "type": "Note",
        "content": "",
        "attributedTo": author_url,
        "published": published.to_rfc3339_opts(SecondsFormat::Millis, true),
        "url": format!("{author_url}/statuses/{status}"),
    })
}

/// Branding-only `Person` for the older `/users/{author}` links.
#[must_use]
pub fn legacy_actor(author: &str, config: &Config) -> Value {
    let logo = json!({ "type": "Image", "mediaType": "image/png", "url": LOGO_URL });
    json!({
        "@context": [
            "https://www.w3.org/ns/activitystreams",
            "https://w3id.org/security/v1"
        ],
        "id": format!("{PROVIDER_URL}/users/{author}"),
        "type": "Person",
        "preferredUsername": author,
        "name": config.site_name,
        "summary": "Better embeds for social media links",
        "url": PROVIDER_URL,
        "icon": logo.clone(),
        "image": logo,
    })
}
