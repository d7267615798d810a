//! Bluesky embeds via the public AppView XRPC API.
//!
//! Posts are addressed by `at://{did}/app.bsky.feed.post/{rkey}`, so a handle
//! in the URL is first resolved to a DID. Once the thread has loaded, the
//! author's profile is fetched under its own budget; it only fills in fields
//! the thread view leaves out, so its failure is not fatal.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{Context, Extraction, Handler};
use crate::config::Config;
use crate::embed::{EmbedData, Platform};
use crate::error::{FetchError, FetchResult};
use crate::format::{branded_site_name, truncate, Stats};
use crate::profile::HeaderProfile;
use crate::tier::{enrich, run_tiers, Tier};

const PROFILE: HeaderProfile = HeaderProfile::service();

/// Bluesky handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlueskyHandler;

/// Post identifier as it appears in the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    /// Handle or DID.
    pub actor: String,
    pub rkey: String,
}

/// Thread post plus the author's profile, if it loaded.
#[derive(Debug)]
pub struct BlueskyPost {
    post: PostView,
    profile: Option<ProfileView>,
}

#[async_trait]
impl Handler for BlueskyHandler {
    type Id = PostRef;
    type Raw = BlueskyPost;

    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    fn patterns(&self) -> &'static [Regex] {
        patterns![r"(?i)bsky\.app/profile/([^/?#]+)/post/([^/?#]+)"]
    }

    fn extract(&self, url: &str) -> Extraction<PostRef> {
        match self.patterns()[0].captures(url) {
            Some(caps) => Extraction::Found(PostRef {
                actor: caps[1].to_string(),
                rkey: caps[2].to_string(),
            }),
            None => Extraction::Invalid,
        }
    }

    fn canonical_url(&self, id: &PostRef) -> String {
        format!("https://bsky.app/profile/{}/post/{}", id.actor, id.rkey)
    }

    async fn fetch(&self, id: &PostRef, ctx: &Context) -> FetchResult<BlueskyPost> {
        let base = &ctx.config.endpoints.bluesky;

        let tiers = vec![Tier::new("appview", async {
            let did = if id.actor.starts_with("did:") {
                id.actor.clone()
            } else {
                let resolve_url = format!(
                    "{base}/xrpc/com.atproto.identity.resolveHandle?handle={}",
                    urlencoding::encode(&id.actor)
                );
                tracing::debug!("Resolving Bluesky handle: {}", resolve_url);
                let resolved: ResolvedHandle = ctx.client.get_json(&resolve_url, &PROFILE).await?;
                resolved.did
            };

            let at_uri = format!("at://{did}/app.bsky.feed.post/{}", id.rkey);
            let thread_url = format!(
                "{base}/xrpc/app.bsky.feed.getPostThread?uri={}&depth=0",
                urlencoding::encode(&at_uri)
            );
            tracing::debug!("Fetching from Bluesky: {}", thread_url);
            let thread: ThreadResponse = ctx.client.get_json(&thread_url, &PROFILE).await?;
            let post = thread
                .thread
                .and_then(|t| t.post)
                .ok_or(FetchError::Missing("post"))?;
            Ok((did, post))
        })];
        let (did, post) = run_tiers(Platform::Bluesky, ctx.config.upstream_timeout, tiers).await?;

        let profile_url = format!(
            "{base}/xrpc/app.bsky.actor.getProfile?actor={}",
            urlencoding::encode(&did)
        );
        let profile = enrich(
            Platform::Bluesky,
            "profile",
            ctx.config.upstream_timeout,
            ctx.client.get_json::<ProfileView>(&profile_url, &PROFILE),
        )
        .await;

        Ok(BlueskyPost { post, profile })
    }

    fn normalize(&self, id: &PostRef, raw: BlueskyPost, config: &Config) -> EmbedData {
        let BlueskyPost { post, profile } = raw;
        let author = merge_author(post.author, profile);

        let handle = author.handle.unwrap_or_else(|| id.actor.clone());
        let display = author
            .display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| handle.clone());

        let text = post.record.and_then(|r| r.text).unwrap_or_default();
        let mut description = truncate(&text, 280);
        let stats = Stats {
            comments: post.reply_count,
            reposts: post.repost_count,
            likes: post.like_count,
            ..Stats::default()
        };
        if let Some(stats) = stats.render() {
            if description.is_empty() {
                description = stats;
            } else {
                description = format!("{description}\n\n{stats}");
            }
        }

        let images = post.embed.map(PostEmbed::into_images).unwrap_or_default();

        EmbedData::builder(
            Platform::Bluesky,
            format!("{display} (@{handle})"),
            format!("https://bsky.app/profile/{handle}/post/{}", id.rkey),
            branded_site_name(&config.branding_name, Platform::Bluesky, None),
        )
        .description(description)
        .author_name(display)
        .author_url(format!("https://bsky.app/profile/{handle}"))
        .author_avatar(author.avatar)
        .carousel(images)
        .build()
    }
}

/// Thread author fields win; the profile only fills gaps.
fn merge_author(author: Author, profile: Option<ProfileView>) -> Author {
    let Some(profile) = profile else {
        return author;
    };
    Author {
        handle: author.handle.or(profile.handle),
        display_name: author
            .display_name
            .filter(|n| !n.trim().is_empty())
            .or(profile.display_name),
        avatar: author.avatar.or(profile.avatar),
    }
}

impl PostEmbed {
    /// Images worth showing, in post order.
    fn into_images(self) -> Vec<String> {
        if let Some(images) = self.images.filter(|i| !i.is_empty()) {
            return images.into_iter().map(|i| i.fullsize).collect();
        }
        if let Some(thumb) = self.external.and_then(|e| e.thumb) {
            return vec![thumb];
        }
        if let Some(thumbnail) = self.thumbnail {
            return vec![thumbnail];
        }
        self.media.map(|m| m.into_images()).unwrap_or_default()
    }
}

// ============================================================================
// AppView API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ResolvedHandle {
    did: String,
}

#[derive(Debug, Deserialize)]
struct ThreadResponse {
    thread: Option<ThreadView>,
}

#[derive(Debug, Deserialize)]
struct ThreadView {
    post: Option<PostView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    author: Author,
    record: Option<PostRecord>,
    embed: Option<PostEmbed>,
    like_count: Option<u64>,
    repost_count: Option<u64>,
    reply_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Author {
    handle: Option<String>,
    display_name: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView {
    handle: Option<String>,
    display_name: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostRecord {
    text: Option<String>,
}

/// Union of the `images`, `external`, `video` and `recordWithMedia` views.
#[derive(Debug, Deserialize)]
struct PostEmbed {
    images: Option<Vec<ImageView>>,
    external: Option<ExternalView>,
    thumbnail: Option<String>,
    media: Option<Box<PostEmbed>>,
}

#[derive(Debug, Deserialize)]
struct ImageView {
    fullsize: String,
}

#[derive(Debug, Deserialize)]
struct ExternalView {
    thumb: Option<String>,
}
