//! End-to-end relay behavior against mock upstreams.
//!
//! Every upstream base URL points at one `httpmock` server, so these tests
//! exercise real HTTP, real tier fallback and real normalization without
//! touching the network.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fixembed::{Config, DeclaredOrder, Endpoints, Platform, Relay};
use httpmock::prelude::*;
use serde_json::json;

fn config(server: &MockServer, timeout: Duration) -> Config {
    Config {
        upstream_timeout: timeout,
        invidious_instances: vec![server.base_url()],
        endpoints: Endpoints::uniform(&server.base_url()),
        ..Config::default()
    }
}

fn relay(server: &MockServer) -> Relay {
    Relay::with_selector(config(server, Duration::from_secs(2)), Arc::new(DeclaredOrder))
        .expect("relay builds")
}

// ─── Success paths ───────────────────────────────────────────────────────────

#[tokio::test]
async fn youtube_resolves_through_invidious() {
    let server = MockServer::start();
    let invidious = server.mock(|when, then| {
        when.method(GET).path("/api/v1/videos/dQw4w9WgXcQ");
        then.status(200).json_body(json!({
            "title": "Never Gonna Give You Up",
            "description": "The official video",
            "viewCount": 1_500_000_000u64,
            "likeCount": 17_000_000u64,
            "author": "Rick Astley",
            "authorUrl": "/channel/UCuAXFkgsw1L7xaCfnd5JJOw",
            "lengthSeconds": 213,
            "videoThumbnails": [
                { "quality": "maxres", "url": "/vi/dQw4w9WgXcQ/maxres.jpg", "width": 1280 }
            ]
        }));
    });

    let result = relay(&server)
        .handle("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await;

    invidious.assert();
    let data = result.data().expect("embed");
    assert_eq!(data.platform(), Platform::YouTube);
    assert_eq!(data.title(), "Never Gonna Give You Up");
    assert_eq!(data.url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    assert_eq!(data.author_name(), Some("Rick Astley"));
    assert!(data.site_name().contains("3:33"));
    assert!(data.description().starts_with("The official video"));
    assert_eq!(
        data.image(),
        Some(format!("{}/vi/dQw4w9WgXcQ/maxres.jpg", server.base_url()).as_str())
    );
}

#[tokio::test]
async fn instagram_graphql_sidecar_is_a_carousel() {
    let server = MockServer::start();
    let graphql = server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .header("x-ig-app-id", "936619743392459")
            .body_contains("doc_id=");
        then.status(200).json_body(json!({
            "data": {
                "xdt_shortcode_media": {
                    "__typename": "XDTGraphSidecar",
                    "display_url": "https://cdn/cover.jpg",
                    "is_video": false,
                    "owner": { "username": "natgeo", "profile_pic_url": "https://cdn/pp.jpg" },
                    "edge_media_to_caption": { "edges": [{ "node": { "text": "Three views" } }] },
                    "edge_sidecar_to_children": { "edges": [
                        { "node": { "display_url": "https://cdn/1.jpg" } },
                        { "node": { "display_url": "https://cdn/2.jpg" } },
                        { "node": { "display_url": "https://cdn/3.jpg" } }
                    ]}
                }
            }
        }));
    });

    let result = relay(&server)
        .handle("https://www.instagram.com/p/C1a2b3c4d5e/")
        .await;

    graphql.assert();
    let data = result.data().expect("embed");
    assert_eq!(data.images().len(), 3);
    assert_eq!(data.image(), Some("https://cdn/1.jpg"));
    assert_eq!(data.title(), "natgeo on Instagram");
}

#[tokio::test]
async fn scheme_less_input_is_accepted() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/api/v1/videos/dQw4w9WgXcQ");
        then.status(200).json_body(json!({ "title": "Short link" }));
    });

    let result = relay(&server).handle("youtu.be/dQw4w9WgXcQ").await;
    assert_eq!(result.data().map(|d| d.title()), Some("Short link"));
}

fn bilibili_view(server: &MockServer, delay: Duration) {
    server.mock(|when, then| {
        when.method(GET).path("/x/web-interface/view");
        then.status(200).delay(delay).json_body(json!({
            "code": 0,
            "message": "0",
            "data": {
                "bvid": "BV1xx411c7mD",
                "cid": 4242,
                "title": "字幕君交流场所",
                "pic": "https://i0.hdslb.com/cover.jpg",
                "duration": 95,
                "owner": { "mid": 2, "name": "碧诗" }
            }
        }));
    });
}

fn bilibili_playurl(server: &MockServer, delay: Duration) {
    server.mock(|when, then| {
        when.method(GET).path("/x/player/playurl").query_param("cid", "4242");
        then.status(200).delay(delay).json_body(json!({
            "code": 0,
            "data": { "durl": [{ "url": "https://upos.bilivideo.com/seg.mp4" }] }
        }));
    });
}

#[tokio::test]
async fn bilibili_view_and_stream_each_get_the_full_timeout() {
    let server = MockServer::start();
    bilibili_view(&server, Duration::from_millis(600));
    bilibili_playurl(&server, Duration::from_millis(600));
    let relay = Relay::with_selector(
        config(&server, Duration::from_millis(1000)),
        Arc::new(DeclaredOrder),
    )
    .unwrap();

    let result = relay.handle("https://www.bilibili.com/video/BV1xx411c7mD").await;

    let data = result.data().expect("embed");
    assert_eq!(data.title(), "字幕君交流场所");
    let video = data.video().expect("stream within its own budget");
    assert!(video.url.contains("proxy/bilibili"));
}

#[tokio::test]
async fn slow_bilibili_stream_keeps_the_cover_embed() {
    let server = MockServer::start();
    bilibili_view(&server, Duration::ZERO);
    bilibili_playurl(&server, Duration::from_secs(3));
    let relay = Relay::with_selector(
        config(&server, Duration::from_millis(400)),
        Arc::new(DeclaredOrder),
    )
    .unwrap();

    let result = relay.handle("https://www.bilibili.com/video/BV1xx411c7mD").await;

    let data = result.data().expect("view data alone is an embed");
    assert!(data.video().is_none());
    assert_eq!(data.image(), Some("https://i0.hdslb.com/cover.jpg"));
}

#[tokio::test]
async fn slow_bluesky_profile_keeps_the_post() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/xrpc/com.atproto.identity.resolveHandle");
        then.status(200).json_body(json!({ "did": "did:plc:abc" }));
    });
    server.mock(|when, then| {
        when.path("/xrpc/app.bsky.feed.getPostThread");
        then.status(200).json_body(json!({
            "thread": { "post": {
                "author": { "handle": "jay.bsky.team", "displayName": "Jay" },
                "record": { "text": "hello atmosphere" },
                "likeCount": 12
            }}
        }));
    });
    server.mock(|when, then| {
        when.path("/xrpc/app.bsky.actor.getProfile");
        then.status(200)
            .delay(Duration::from_secs(3))
            .json_body(json!({ "avatar": "https://cdn/avatar.jpg" }));
    });
    let relay = Relay::with_selector(
        config(&server, Duration::from_millis(400)),
        Arc::new(DeclaredOrder),
    )
    .unwrap();

    let result = relay.handle("https://bsky.app/profile/jay.bsky.team/post/3kabc").await;

    let data = result.data().expect("post without profile");
    assert_eq!(data.title(), "Jay (@jay.bsky.team)");
    assert!(data.description().starts_with("hello atmosphere"));
    assert_eq!(data.author_avatar(), None);
}

#[tokio::test]
async fn reddit_short_link_embeds_like_the_long_form() {
    let server = MockServer::start();
    let short = server.mock(|when, then| {
        when.method(httpmock::Method::HEAD).path("/abc123");
        then.status(301)
            .header("location", "https://www.reddit.com/r/rust/comments/abc123/hello_world/");
    });
    let listing = server.mock(|when, then| {
        when.method(GET).path("/r/rust/comments/abc123.json");
        then.status(200).json_body(json!([{ "data": { "children": [{ "data": {
            "title": "Hello world",
            "subreddit": "rust",
            "author": "ferris",
            "permalink": "/r/rust/comments/abc123/hello_world/",
            "score": 10,
            "num_comments": 2
        }}]}}]));
    });
    let relay = relay(&server);

    let from_short = relay.handle("https://redd.it/abc123").await;
    let from_long = relay
        .handle("https://www.reddit.com/r/rust/comments/abc123/hello_world/")
        .await;

    short.assert();
    listing.assert_hits(2);
    let (short_data, long_data) = (from_short.data().expect("embed"), from_long.data().expect("embed"));
    assert_eq!(short_data.url(), "https://www.reddit.com/r/rust/comments/abc123/hello_world/");
    assert_eq!(short_data.url(), long_data.url());
    assert_eq!(short_data.title(), long_data.title());
}

#[tokio::test]
async fn b23_short_link_embeds_like_the_long_form() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::HEAD).path("/xYz9");
        then.status(302).header(
            "location",
            "https://m.bilibili.com/video/BV1xx411c7mD?share_source=copy",
        );
    });
    bilibili_view(&server, Duration::ZERO);
    bilibili_playurl(&server, Duration::ZERO);
    let relay = relay(&server);

    let from_short = relay.handle("https://b23.tv/xYz9").await;
    let from_long = relay.handle("https://www.bilibili.com/video/BV1xx411c7mD").await;

    let (short_data, long_data) = (from_short.data().expect("embed"), from_long.data().expect("embed"));
    assert_eq!(short_data.url(), "https://www.bilibili.com/video/BV1xx411c7mD");
    assert_eq!(short_data.url(), long_data.url());
}

// ─── Failure paths ───────────────────────────────────────────────────────────

#[tokio::test]
async fn twitter_outage_redirects_to_canonical_url() {
    let server = MockServer::start();
    let syndication = server.mock(|when, then| {
        when.path("/tweet-result");
        then.status(503);
    });
    let fxtwitter = server.mock(|when, then| {
        when.path("/jack/status/20");
        then.status(503);
    });

    let result = relay(&server).handle("https://x.com/jack/status/20").await;

    syndication.assert();
    fxtwitter.assert();
    assert!(!result.is_success());
    assert_eq!(result.redirect(), Some("https://twitter.com/jack/status/20"));
    assert!(result.error().is_some_and(|e| e.contains("503")));
}

#[tokio::test]
async fn unsupported_url_redirects_without_upstream_calls() {
    let server = MockServer::start();
    let any = server.mock(|_when, then| {
        then.status(500);
    });

    let result = relay(&server).handle("https://example.com/foo").await;

    assert!(!result.is_success());
    assert_eq!(result.redirect(), Some("https://example.com/foo"));
    any.assert_hits(0);
}

#[tokio::test]
async fn every_platform_survives_a_total_outage() {
    let server = MockServer::start();
    server.mock(|_when, then| {
        then.status(500).body("internal error");
    });
    let relay = relay(&server);

    let urls = [
        "https://twitter.com/jack/status/20",
        "https://www.reddit.com/r/rust/comments/abc123/title/",
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "https://bsky.app/profile/jay.bsky.team/post/3kabc",
        "https://www.instagram.com/reel/Cxyz123/",
        "https://www.threads.net/@zuck/post/C8Fh6NzSxyz",
        "https://www.pixiv.net/en/artworks/12345678",
        "https://www.bilibili.com/video/BV1xx411c7mD",
    ];

    for url in urls {
        let result = relay.handle(url).await;
        assert!(
            result.is_success() || result.redirect().is_some(),
            "{url} produced neither an embed nor a redirect"
        );
    }
}

#[tokio::test]
async fn platforms_with_static_fallbacks_degrade() {
    let server = MockServer::start();
    server.mock(|_when, then| {
        then.status(500);
    });
    let relay = relay(&server);

    let youtube = relay.handle("https://youtu.be/dQw4w9WgXcQ").await;
    let data = youtube.data().expect("static YouTube embed");
    assert!(data.image().is_some_and(|i| i.contains("dQw4w9WgXcQ")));

    let pixiv = relay.handle("https://www.pixiv.net/artworks/12345678").await;
    assert!(pixiv.is_success());

    let threads = relay.handle("https://www.threads.net/@zuck/post/C8Fh6NzSxyz").await;
    assert!(threads.is_success());
}

#[tokio::test]
async fn slow_upstreams_are_bounded_by_the_timeout() {
    let server = MockServer::start();
    server.mock(|_when, then| {
        then.status(200)
            .delay(Duration::from_secs(3))
            .json_body(json!({}));
    });
    let relay = Relay::with_selector(
        config(&server, Duration::from_millis(300)),
        Arc::new(DeclaredOrder),
    )
    .unwrap();

    let started = Instant::now();
    let result = relay.handle("https://twitter.com/jack/status/20").await;

    assert!(!result.is_success());
    assert_eq!(result.redirect(), Some("https://twitter.com/jack/status/20"));
    // Two tiers, each capped at 300ms.
    assert!(started.elapsed() < Duration::from_millis(2000));
}
