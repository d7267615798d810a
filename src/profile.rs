//! Request header profiles
//!
//! Several upstreams only answer with a 2xx when the request looks like a
//! particular client. Bilibili and Pixiv check `Referer`, phixiv serves its
//! Open Graph tags to Discordbot, Threads wants the web app's id headers.
//! Each handler picks one of these profiles per tier.

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT,
};

pub const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
pub const DISCORDBOT_UA: &str = "Mozilla/5.0 (compatible; Discordbot/2.0; +https://discordapp.com)";
pub const SERVICE_UA: &str = "FixEmbed/1.0 (embed service)";
/// Meta's CDNs hand this crawler a plain progressive MP4.
pub const TELEGRAM_UA: &str = "TelegramBot (like TwitterBot)";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json";
const ACCEPT_ANY: &str = "*/*";

/// Static header set for one kind of upstream request.
///
/// Everything is `&'static str` so building the `HeaderMap` cannot fail.
/// Names in `extra` must be lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderProfile {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: Option<&'static str>,
    pub referer: Option<&'static str>,
    pub origin: Option<&'static str>,
    pub extra: &'static [(&'static str, &'static str)],
}

impl Default for HeaderProfile {
    fn default() -> Self {
        Self::service()
    }
}

impl HeaderProfile {
    /// Desktop Chrome asking for HTML.
    #[must_use]
    pub const fn desktop() -> Self {
        Self {
            user_agent: DESKTOP_UA,
            accept: ACCEPT_HTML,
            accept_language: Some("en-US,en;q=0.9"),
            referer: None,
            origin: None,
            extra: &[],
        }
    }

    /// Desktop Chrome asking for JSON.
    #[must_use]
    pub const fn desktop_json() -> Self {
        Self {
            accept: ACCEPT_JSON,
            ..Self::desktop()
        }
    }

    /// Mobile Safari; some CDNs only hand out progressive MP4 to it.
    #[must_use]
    pub const fn mobile() -> Self {
        Self {
            user_agent: MOBILE_UA,
            accept: ACCEPT_ANY,
            ..Self::desktop()
        }
    }

    /// Discord's crawler, for mirrors that render OG tags for bots only.
    #[must_use]
    pub const fn discordbot() -> Self {
        Self {
            user_agent: DISCORDBOT_UA,
            accept: ACCEPT_HTML,
            accept_language: None,
            referer: None,
            origin: None,
            extra: &[],
        }
    }

    /// Honest service identification for public JSON APIs.
    #[must_use]
    pub const fn service() -> Self {
        Self {
            user_agent: SERVICE_UA,
            accept: ACCEPT_JSON,
            accept_language: None,
            referer: None,
            origin: None,
            extra: &[],
        }
    }

    #[must_use]
    pub const fn with_user_agent(mut self, user_agent: &'static str) -> Self {
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub const fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }

    #[must_use]
    pub const fn with_referer(mut self, referer: &'static str) -> Self {
        self.referer = Some(referer);
        self
    }

    #[must_use]
    pub const fn with_origin(mut self, origin: &'static str) -> Self {
        self.origin = Some(origin);
        self
    }

    #[must_use]
    pub const fn with_extra(mut self, extra: &'static [(&'static str, &'static str)]) -> Self {
        self.extra = extra;
        self
    }

    /// Convert to a header map for reqwest.
    #[must_use]
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(USER_AGENT, HeaderValue::from_static(self.user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static(self.accept));
        if let Some(lang) = self.accept_language {
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(lang));
        }
        if let Some(referer) = self.referer {
            headers.insert(REFERER, HeaderValue::from_static(referer));
        }
        if let Some(origin) = self.origin {
            headers.insert(ORIGIN, HeaderValue::from_static(origin));
        }

        for &(name, value) in self.extra {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        headers
    }
}
