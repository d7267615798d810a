//! Top-level entry point: URL in, [`HandlerResult`] out.
//!
//! The relay owns the handler registry and the shared fetch context. It is
//! cheap to share behind an `Arc` and safe to call from many tasks at once;
//! nothing in it is mutated after construction.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use tracing::{error, info};

use crate::config::Config;
use crate::embed::{Failure, HandlerResult};
use crate::http_client::UpstreamClient;
use crate::site::{Context, PlatformHandler, Registry};
use crate::tier::{InstanceSelector, RandomSelector};

/// Dispatches URLs to platform handlers.
#[derive(Debug)]
pub struct Relay {
    registry: Registry,
    ctx: Context,
}

impl Relay {
    /// Relay with every platform and randomized Invidious instance order.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_selector(config, Arc::new(RandomSelector))
    }

    /// Relay with a custom instance selector (deterministic in tests).
    pub fn with_selector(config: Config, selector: Arc<dyn InstanceSelector>) -> Result<Self> {
        let client = UpstreamClient::new(config.upstream_timeout)?;
        Ok(Self {
            registry: Registry::new(),
            ctx: Context::new(client, Arc::new(config), selector),
        })
    }

    /// Handler that would serve `url`, if any.
    pub fn dispatch(&self, url: &str) -> Option<&dyn PlatformHandler> {
        self.registry.dispatch(&normalize_input(url))
    }

    /// Resolve `url` to an embed or an actionable failure.
    ///
    /// Never errors and never panics: an unsupported URL redirects back to
    /// itself, and a panicking handler is reported as a failure that
    /// redirects to the input.
    pub async fn handle(&self, url: &str) -> HandlerResult {
        let url = normalize_input(url);
        let Some(handler) = self.registry.dispatch(&url) else {
            info!(url = %url, "No handler for URL");
            return Failure::redirect(url).into();
        };

        match AssertUnwindSafe(handler.handle(&url, &self.ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(platform = %handler.platform(), url = %url, "Handler panicked");
                Failure::with_redirect("internal handler error", url).into()
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.ctx.client
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Trim whitespace and assume `https://` when the scheme is missing.
fn normalize_input(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}
