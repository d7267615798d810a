//! Normalized embed model shared by every platform handler.
//!
//! A handler turns whatever its upstream returned into one [`EmbedData`] and
//! wraps it in a [`HandlerResult`]. Nothing downstream mutates it: the
//! renderer and the CLI only read through the accessors.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// The closed set of platforms the relay knows how to embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Instagram,
    Reddit,
    Threads,
    Pixiv,
    Bluesky,
    YouTube,
    Bilibili,
}

impl Platform {
    /// Every platform, in registry priority order.
    pub const ALL: [Self; 8] = [
        Self::Twitter,
        Self::Reddit,
        Self::YouTube,
        Self::Bluesky,
        Self::Instagram,
        Self::Threads,
        Self::Pixiv,
        Self::Bilibili,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Instagram => "instagram",
            Self::Reddit => "reddit",
            Self::Threads => "threads",
            Self::Pixiv => "pixiv",
            Self::Bluesky => "bluesky",
            Self::YouTube => "youtube",
            Self::Bilibili => "bilibili",
        }
    }

    /// Human-readable name, used in "Invalid <Platform> URL" errors.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Twitter => "Twitter",
            Self::Instagram => "Instagram",
            Self::Reddit => "Reddit",
            Self::Threads => "Threads",
            Self::Pixiv => "Pixiv",
            Self::Bluesky => "Bluesky",
            Self::YouTube => "YouTube",
            Self::Bilibili => "Bilibili",
        }
    }

    /// Label shown after the branding name in `og:site_name`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Twitter => "𝕏",
            Self::Instagram => "📷 Instagram",
            Self::Reddit => "🔗 Reddit",
            Self::Threads => "🧵 Threads",
            Self::Pixiv => "🎨 Pixiv",
            Self::Bluesky => "🦋 Bluesky",
            Self::YouTube => "▶️ YouTube",
            Self::Bilibili => "📺 Bilibili",
        }
    }

    /// Brand color used for `theme-color`.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Twitter => "#1DA1F2",
            Self::Instagram => "#E4405F",
            Self::Reddit => "#FF4500",
            Self::Threads => "#000000",
            Self::Pixiv => "#0096FA",
            Self::Bluesky => "#1185FE",
            Self::YouTube => "#FF0000",
            Self::Bilibili => "#00A1D6",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playable video attached to an embed.
///
/// `width`/`height` are best effort; `0` means unknown and the renderer
/// leaves the dimension tags out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoEmbed {
    pub url: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl VideoEmbed {
    #[must_use]
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            thumbnail: None,
        }
    }

    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail: impl Into<Option<String>>) -> Self {
        self.thumbnail = thumbnail.into();
        self
    }

    /// Whether both dimensions are known.
    #[must_use]
    pub const fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Normalized embed produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedData {
    title: String,
    description: String,
    url: String,
    site_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author_avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<VideoEmbed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<String>,
}

impl EmbedData {
    /// Start building an embed. The color defaults to the platform's brand color.
    #[must_use]
    pub fn builder(
        platform: Platform,
        title: impl Into<String>,
        url: impl Into<String>,
        site_name: impl Into<String>,
    ) -> EmbedBuilder {
        EmbedBuilder {
            data: Self {
                title: title.into(),
                description: String::new(),
                url: url.into(),
                site_name: site_name.into(),
                author_name: None,
                author_url: None,
                author_avatar: None,
                image: None,
                images: Vec::new(),
                video: None,
                color: Some(platform.color().to_string()),
                platform,
                stats: None,
            },
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    #[must_use]
    pub fn author_name(&self) -> Option<&str> {
        self.author_name.as_deref()
    }

    #[must_use]
    pub fn author_url(&self) -> Option<&str> {
        self.author_url.as_deref()
    }

    #[must_use]
    pub fn author_avatar(&self) -> Option<&str> {
        self.author_avatar.as_deref()
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Ordered carousel images; empty for single-image posts.
    #[must_use]
    pub fn images(&self) -> &[String] {
        &self.images
    }

    #[must_use]
    pub const fn video(&self) -> Option<&VideoEmbed> {
        self.video.as_ref()
    }

    #[must_use]
    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    #[must_use]
    pub fn stats(&self) -> Option<&str> {
        self.stats.as_deref()
    }
}

/// Builder for [`EmbedData`]. Empty strings passed to optional setters are
/// treated as absent.
#[derive(Debug, Clone)]
pub struct EmbedBuilder {
    data: EmbedData,
}

fn non_empty(value: impl Into<Option<String>>) -> Option<String> {
    value.into().filter(|s| !s.trim().is_empty())
}

impl EmbedBuilder {
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.data.description = description.into();
        self
    }

    #[must_use]
    pub fn author_name(mut self, name: impl Into<Option<String>>) -> Self {
        self.data.author_name = non_empty(name);
        self
    }

    #[must_use]
    pub fn author_url(mut self, url: impl Into<Option<String>>) -> Self {
        self.data.author_url = non_empty(url);
        self
    }

    #[must_use]
    pub fn author_avatar(mut self, url: impl Into<Option<String>>) -> Self {
        self.data.author_avatar = non_empty(url);
        self
    }

    #[must_use]
    pub fn image(mut self, url: impl Into<Option<String>>) -> Self {
        self.data.image = non_empty(url);
        self
    }

    /// Set the carousel. The first entry also becomes `image` for clients
    /// without carousel support; a single entry is just the `image`.
    #[must_use]
    pub fn carousel(mut self, images: Vec<String>) -> Self {
        let mut images: Vec<String> = images.into_iter().filter(|s| !s.is_empty()).collect();
        if let Some(first) = images.first() {
            self.data.image = Some(first.clone());
        }
        if images.len() < 2 {
            images.clear();
        }
        self.data.images = images;
        self
    }

    #[must_use]
    pub fn video(mut self, video: impl Into<Option<VideoEmbed>>) -> Self {
        self.data.video = video.into();
        self
    }

    #[must_use]
    pub fn stats(mut self, stats: impl Into<Option<String>>) -> Self {
        self.data.stats = non_empty(stats);
        self
    }

    #[must_use]
    pub fn color(mut self, color: impl Into<Option<String>>) -> Self {
        self.data.color = non_empty(color);
        self
    }

    #[must_use]
    pub fn build(self) -> EmbedData {
        self.data
    }
}

/// Why a handler could not produce an embed.
///
/// Only constructible with at least one of `error`/`redirect` set, so the
/// caller always has something to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    error: Option<String>,
    redirect: Option<String>,
}

const GENERIC_ERROR: &str = "Failed to fetch embed";

impl Failure {
    /// Failure with a message and nowhere to redirect (invalid input).
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: Some(if message.trim().is_empty() {
                GENERIC_ERROR.to_string()
            } else {
                message
            }),
            redirect: None,
        }
    }

    /// Failure that only sends the caller elsewhere.
    #[must_use]
    pub fn redirect(url: impl Into<String>) -> Self {
        let url = url.into();
        if url.trim().is_empty() {
            return Self::error(GENERIC_ERROR);
        }
        Self {
            error: None,
            redirect: Some(url),
        }
    }

    /// Upstream unavailable: diagnostic plus a redirect for the user.
    #[must_use]
    pub fn with_redirect(message: impl Into<String>, url: impl Into<String>) -> Self {
        let mut failure = Self::redirect(url);
        let message = message.into();
        if !message.trim().is_empty() {
            failure.error = Some(message);
        }
        failure
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect.as_deref()
    }
}

/// Outcome of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult {
    Success(EmbedData),
    Failure(Failure),
}

impl HandlerResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub const fn data(&self) -> Option<&EmbedData> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => f.error_message(),
        }
    }

    #[must_use]
    pub fn redirect(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => f.redirect_url(),
        }
    }
}

impl From<EmbedData> for HandlerResult {
    fn from(data: EmbedData) -> Self {
        Self::Success(data)
    }
}

impl From<Failure> for HandlerResult {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

impl Serialize for HandlerResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success(data) => {
                let mut s = serializer.serialize_struct("HandlerResult", 2)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("data", data)?;
                s.end()
            }
            Self::Failure(failure) => {
                let mut s = serializer.serialize_struct("HandlerResult", 3)?;
                s.serialize_field("success", &false)?;
                if let Some(error) = &failure.error {
                    s.serialize_field("error", error)?;
                }
                if let Some(redirect) = &failure.redirect {
                    s.serialize_field("redirect", redirect)?;
                }
                s.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carousel_sets_first_image() {
        let data = EmbedData::builder(Platform::Instagram, "t", "https://x", "s")
            .carousel(vec!["a".into(), "b".into(), "c".into()])
            .build();
        assert_eq!(data.images().len(), 3);
        assert_eq!(data.image(), Some("a"));
    }

    #[test]
    fn single_entry_carousel_is_just_an_image() {
        let data = EmbedData::builder(Platform::Bluesky, "t", "https://x", "s")
            .carousel(vec!["only".into()])
            .build();
        assert!(data.images().is_empty());
        assert_eq!(data.image(), Some("only"));
    }

    #[test]
    fn empty_optional_fields_are_absent() {
        let data = EmbedData::builder(Platform::Reddit, "t", "https://x", "s")
            .author_name(String::new())
            .image(None)
            .stats(" ".to_string())
            .build();
        assert!(data.author_name().is_none());
        assert!(data.image().is_none());
        assert!(data.stats().is_none());
        assert_eq!(data.color(), Some("#FF4500"));
    }

    #[test]
    fn failure_always_has_error_or_redirect() {
        assert!(Failure::error("").error_message().is_some());
        let f = Failure::redirect("");
        assert!(f.error_message().is_some() || f.redirect_url().is_some());
        let f = Failure::with_redirect("", "https://a");
        assert_eq!(f.redirect_url(), Some("https://a"));
        assert!(f.error_message().is_none());
    }

    #[test]
    fn result_serializes_discriminated_shape() {
        let ok: HandlerResult = EmbedData::builder(Platform::YouTube, "t", "https://y", "s")
            .build()
            .into();
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["platform"], "youtube");
        assert_eq!(json["data"]["siteName"], "s");
        assert!(json["data"].get("images").is_none());

        let err: HandlerResult = Failure::with_redirect("HTTP 503", "https://t").into();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "HTTP 503");
        assert_eq!(json["redirect"], "https://t");
    }

    #[test]
    fn platform_order_matches_priority() {
        assert_eq!(Platform::ALL[0], Platform::Twitter);
        assert_eq!(Platform::ALL[7], Platform::Bilibili);
        assert_eq!(Platform::YouTube.to_string(), "youtube");
    }
}
