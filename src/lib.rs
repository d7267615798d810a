//! `FixEmbed` - embed-fixing relay for chat clients
//!
//! # Features
//!
//! - **Eight platforms**: Twitter/X, Reddit, YouTube, Bluesky, Instagram,
//!   Threads, Pixiv, Bilibili
//! - **Fallback tiers**: richer upstream sources first, cheaper ones after,
//!   a static embed or a redirect when everything fails
//! - **Never throws**: every URL ends in an embed or an actionable failure
//! - **HTTP shell**: Open Graph pages, oEmbed, ActivityPub, media proxies
//!
//! # Example
//!
//! ```rust,no_run
//! use fixembed::{Config, Relay};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let relay = Relay::new(Config::default())?;
//!     let result = relay.handle("https://youtu.be/dQw4w9WgXcQ").await;
//!     if let Some(embed) = result.data() {
//!         println!("{} ({})", embed.title(), embed.site_name());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embed;
pub mod error;
pub mod format;
pub mod http_client;
pub mod profile;
pub mod relay;
pub mod render;
pub mod server;
pub mod site;
pub mod tier;

pub use config::{Config, Endpoints};
pub use embed::{EmbedData, Failure, HandlerResult, Platform, VideoEmbed};
pub use error::{FetchError, FetchResult};
pub use http_client::UpstreamClient;
pub use profile::HeaderProfile;
pub use relay::Relay;
pub use site::{Registry, PlatformHandler};
pub use tier::{DeclaredOrder, InstanceSelector, RandomSelector};

/// Version of fixembed
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
