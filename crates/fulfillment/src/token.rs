//! Cached bearer token for the shipping aggregator.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::Result;

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Holds one bearer token and refreshes it on demand.
///
/// A token is treated as expired `skew` before its real expiry so that a
/// request started just before expiry still carries a valid credential.
/// Concurrent callers that find the cache empty wait for a single fetch.
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    skew: Duration,
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(ttl: Duration, skew: Duration) -> Self {
        Self {
            ttl,
            skew,
            current: Mutex::new(None),
        }
    }

    /// Returns the cached token, or fetches and caches a fresh one.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref()
            && Instant::now() + self.skew < token.expires_at
        {
            return Ok(token.value.clone());
        }

        let value = fetch().await?;
        tracing::debug!(ttl_secs = self.ttl.as_secs(), "aggregator token refreshed");
        metrics::counter!("aggregator_token_refreshes_total").increment(1);
        *current = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(value)
    }

    /// Drops the cached token, typically after the upstream answered 401.
    pub async fn invalidate(&self) {
        self.current.lock().await.take();
    }
}
