//! Ordered fallback tiers.
//!
//! A handler lists its upstream strategies richest-first as [`Tier`]s and
//! hands them to [`run_tiers`]. Each tier is a lazy future, so nothing is sent
//! to a third party until every earlier tier has failed.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use fixembed::{Platform, FetchError};
//! use fixembed::tier::{run_tiers, Tier};
//!
//! # async fn example() {
//! let tiers = vec![
//!     Tier::new("api", async { Err::<String, _>(FetchError::Status { status: 503 }) }),
//!     Tier::new("mirror", async { Ok("data".to_string()) }),
//! ];
//! let raw = run_tiers(Platform::Pixiv, Duration::from_secs(8), tiers).await;
//! assert_eq!(raw.unwrap(), "data");
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::embed::Platform;
use crate::error::{FetchError, FetchResult};

/// One named upstream strategy.
pub struct Tier<'a, T> {
    name: &'static str,
    attempt: BoxFuture<'a, FetchResult<T>>,
}

impl<'a, T> Tier<'a, T> {
    pub fn new<F>(name: &'static str, attempt: F) -> Self
    where
        F: Future<Output = FetchResult<T>> + Send + 'a,
    {
        Self {
            name,
            attempt: attempt.boxed(),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for Tier<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tier").field("name", &self.name).finish()
    }
}

/// Try `tiers` strictly in order, each bounded by `budget`, and return the
/// first success. A timeout counts as an ordinary failure. When every tier
/// fails, the last tier's error is returned.
pub async fn run_tiers<T>(
    platform: Platform,
    budget: Duration,
    tiers: Vec<Tier<'_, T>>,
) -> FetchResult<T> {
    let mut last_error = FetchError::Upstream(format!("no {platform} upstream configured"));

    for tier in tiers {
        debug!(%platform, tier = tier.name, "Trying tier");
        let outcome = match tokio::time::timeout(budget, tier.attempt).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::Timeout),
        };

        match outcome {
            Ok(raw) => {
                debug!(%platform, tier = tier.name, "Tier succeeded");
                return Ok(raw);
            }
            Err(err) => {
                warn!(%platform, tier = tier.name, error = %err, "Tier failed");
                last_error = err;
            }
        }
    }

    Err(last_error)
}

/// Optional upstream data fetched after the required tiers succeeded.
///
/// Runs under its own `budget`, so a slow extra can only cost the fields it
/// would have filled. Failure or timeout yields `None`.
pub async fn enrich<T, F>(
    platform: Platform,
    what: &'static str,
    budget: Duration,
    attempt: F,
) -> Option<T>
where
    F: Future<Output = FetchResult<T>>,
{
    let outcome = match tokio::time::timeout(budget, attempt).await {
        Ok(outcome) => outcome,
        Err(_) => Err(FetchError::Timeout),
    };
    outcome
        .inspect_err(|err| debug!(%platform, what, error = %err, "Optional upstream data unavailable"))
        .ok()
}

/// Order in which interchangeable mirror instances are tried.
///
/// Passed in rather than kept as global state so tests can pin the order.
pub trait InstanceSelector: Send + Sync + fmt::Debug {
    fn order<'a>(&self, instances: &'a [String]) -> Vec<&'a str>;
}

/// Spread load by shuffling instances on every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl InstanceSelector for RandomSelector {
    fn order<'a>(&self, instances: &'a [String]) -> Vec<&'a str> {
        let mut ordered: Vec<&str> = instances.iter().map(String::as_str).collect();
        ordered.shuffle(&mut rand::thread_rng());
        ordered
    }
}

/// Configured order, deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredOrder;

impl InstanceSelector for DeclaredOrder {
    fn order<'a>(&self, instances: &'a [String]) -> Vec<&'a str> {
        instances.iter().map(String::as_str).collect()
    }
}
