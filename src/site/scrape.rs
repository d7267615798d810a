//! Small HTML helpers for the tiers that scrape pages instead of calling APIs.

use regex::Regex;
use scraper::{Html, Selector};

/// `content` of the first `<meta property=key>` or `<meta name=key>`.
pub(crate) fn meta_content(doc: &Html, key: &str) -> Option<String> {
    let selector =
        Selector::parse(&format!(r#"meta[property="{key}"], meta[name="{key}"]"#)).ok()?;
    doc.select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(ToString::to_string)
}

/// Attribute of the first element matching `selector`.
pub(crate) fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Whitespace-collapsed text of the first element matching `selector`.
pub(crate) fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let el = doc.select(&selector).next()?;
    let text = el.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// First `"field":"..."` string in inline JSON, with JSON escapes undone.
///
/// Pages often embed their data as escaped JSON inside a script tag, so the
/// value is decoded as a JSON string literal (`&` and `\/` included).
pub(crate) fn json_string_field(html: &str, field: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#,
        regex::escape(field)
    ))
    .ok()?;
    let raw = pattern.captures(html)?.get(1)?.as_str();
    let value: String = serde_json::from_str(&format!("\"{raw}\"")).ok()?;
    (!value.is_empty()).then_some(value)
}
