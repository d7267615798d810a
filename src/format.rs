//! Text and number helpers shared by the normalizers.
//!
//! Number formatting is deliberately per-platform: most handlers use the
//! compact K/M form with a trailing `.0` dropped, YouTube keeps the `.0`, and
//! Bilibili/Pixiv use CJK myriad units.

use crate::embed::Platform;

/// Truncate `text` to at most `max` characters.
///
/// When truncation happens the result ends in `...` and still fits in `max`.
/// Operates on `char`s, so a multi-byte character is never split.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max < 3 {
        return text.chars().take(max).collect();
    }
    let mut cut: String = text.chars().take(max - 3).collect();
    cut.truncate(cut.trim_end().len());
    cut.push_str("...");
    cut
}

/// 1234 -> "1.2K", 1000 -> "1K", 2500000 -> "2.5M".
#[must_use]
pub fn format_number(n: u64) -> String {
    compact(n, false)
}

/// Like [`format_number`] but keeps a trailing `.0` ("1.0K").
#[must_use]
pub fn format_number_fixed(n: u64) -> String {
    compact(n, true)
}

#[allow(clippy::cast_precision_loss)]
fn compact(n: u64, keep_zero: bool) -> String {
    let (value, suffix) = if n >= 1_000_000 {
        (n as f64 / 1_000_000.0, "M")
    } else if n >= 1_000 {
        (n as f64 / 1_000.0, "K")
    } else {
        return n.to_string();
    };
    let mut s = format!("{value:.1}");
    if !keep_zero && s.ends_with(".0") {
        s.truncate(s.len() - 2);
    }
    s.push_str(suffix);
    s
}

/// Myriad-based formatting: 12345 -> "1.2万", 230000000 -> "2.3亿".
///
/// `hundred_million` is the 10^8 unit ("亿" for Chinese, "億" for Japanese).
/// Values below 10 000 are grouped with commas.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_number_cjk(n: u64, hundred_million: &str) -> String {
    if n >= 100_000_000 {
        format!("{:.1}{hundred_million}", n as f64 / 100_000_000.0)
    } else if n >= 10_000 {
        format!("{:.1}万", n as f64 / 10_000.0)
    } else {
        group_thousands(n)
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Engagement counters for a stats row. Absent counters are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub comments: Option<u64>,
    pub reposts: Option<u64>,
    pub likes: Option<u64>,
    pub views: Option<u64>,
    pub shares: Option<u64>,
}

impl Stats {
    /// "💬 12 🔁 3 ❤️ 1.2K 👁 40K"; `None` when every counter is absent.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        let parts: Vec<String> = [
            ("💬", self.comments),
            ("🔁", self.reposts),
            ("❤️", self.likes),
            ("👁", self.views),
            ("↗️", self.shares),
        ]
        .into_iter()
        .filter_map(|(icon, count)| count.map(|c| format!("{icon} {}", format_number(c))))
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Seconds to "H:MM:SS" or "M:SS".
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// "FixEmbed • 📷 Instagram" or "FixEmbed • 𝕏 • extra".
#[must_use]
pub fn branded_site_name(branding: &str, platform: Platform, extra: Option<&str>) -> String {
    match extra {
        Some(extra) if !extra.is_empty() => {
            format!("{branding} • {} • {extra}", platform.label())
        }
        _ => format!("{branding} • {}", platform.label()),
    }
}

/// Decode the handful of entities upstream JSON leaves in URLs and text.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
}

/// One downloadable rendition of a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoVariant<'a> {
    pub url: &'a str,
    pub content_type: &'a str,
    pub bitrate: Option<u64>,
}

/// Highest-bitrate `video/mp4` rendition. Variants without a bitrate (HLS
/// playlists, mostly) never win; ties keep the first one seen.
#[must_use]
pub fn best_mp4<'a>(variants: &[VideoVariant<'a>]) -> Option<&'a str> {
    variants
        .iter()
        .filter(|v| v.content_type == "video/mp4")
        .filter_map(|v| v.bitrate.map(|b| (b, v.url)))
        .fold(None, |best: Option<(u64, &str)>, (bitrate, url)| match best {
            Some((b, _)) if b >= bitrate => best,
            _ => Some((bitrate, url)),
        })
        .map(|(_, url)| url)
}

/// Prefix protocol-relative URLs (`//i0.hdslb.com/...`) with `https:`.
#[must_use]
pub fn absolute_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

/// Media URL routed through one of the relay's own proxy endpoints.
#[must_use]
pub fn proxy_url(embed_domain: &str, route: &str, target: &str) -> String {
    format!(
        "https://{embed_domain}/{route}?url={}",
        urlencoding::encode(target)
    )
}
