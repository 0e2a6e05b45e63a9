//! Bearer token cache shared by every row of a run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AuthError;

/// Xray Cloud tokens live for 24 hours; refresh a little earlier.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(23 * 60 * 60);

#[derive(Debug)]
struct CachedToken {
    value: Arc<str>,
    fetched_at: Instant,
}

/// Lazily populated token slot.
///
/// The lock is held across the credential exchange, so at most one exchange
/// is in flight and every waiter observes the token it produced.
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

impl TokenCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached token, running `fetch` if none is held or it expired.
    pub async fn get<F, Fut>(&self, fetch: F) -> Result<Arc<str>, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, AuthError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.fetched_at.elapsed() < self.ttl) {
            return Ok(Arc::clone(&token.value));
        }
        Ok(Self::store(&mut slot, fetch().await?))
    }

    /// Replace a token the API rejected.
    ///
    /// If the slot already holds a different live token, another caller
    /// refreshed first and that token is returned without a new exchange.
    pub async fn refresh<F, Fut>(&self, stale: &str, fetch: F) -> Result<Arc<str>, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, AuthError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot
            .as_ref()
            .filter(|t| &*t.value != stale && t.fetched_at.elapsed() < self.ttl)
        {
            return Ok(Arc::clone(&token.value));
        }
        Ok(Self::store(&mut slot, fetch().await?))
    }

    fn store(slot: &mut Option<CachedToken>, value: String) -> Arc<str> {
        let value: Arc<str> = value.into();
        *slot = Some(CachedToken {
            value: Arc::clone(&value),
            fetched_at: Instant::now(),
        });
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn counted_fetch(calls: &AtomicUsize) -> Result<String, AuthError> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{n}"))
    }

    #[tokio::test]
    async fn test_get_fetches_once() {
        let cache = TokenCache::default();
        let calls = AtomicUsize::new(0);

        let first = cache.get(|| counted_fetch(&calls)).await.unwrap();
        let second = cache.get(|| counted_fetch(&calls)).await.unwrap();

        assert_eq!(&*first, "token-1");
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_refetches_after_ttl() {
        let cache = TokenCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache.get(|| counted_fetch(&calls)).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let token = cache.get(|| counted_fetch(&calls)).await.unwrap();

        assert_eq!(&*token, "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_replaces_stale_token() {
        let cache = TokenCache::default();
        let calls = AtomicUsize::new(0);

        let stale = cache.get(|| counted_fetch(&calls)).await.unwrap();
        let fresh = cache.refresh(&stale, || counted_fetch(&calls)).await.unwrap();

        assert_eq!(&*fresh, "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_exchange() {
        let cache = TokenCache::default();
        let calls = AtomicUsize::new(0);
        let stale = cache.get(|| counted_fetch(&calls)).await.unwrap();

        let (a, b, c) = tokio::join!(
            cache.refresh(&stale, || counted_fetch(&calls)),
            cache.refresh(&stale, || counted_fetch(&calls)),
            cache.refresh(&stale, || counted_fetch(&calls)),
        );

        assert_eq!(&*a.unwrap(), "token-2");
        assert_eq!(&*b.unwrap(), "token-2");
        assert_eq!(&*c.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_slot_empty() {
        let cache = TokenCache::default();
        let err = cache
            .get(|| async { Err(AuthError("denied".to_string())) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Xray authentication failed: denied");

        let calls = AtomicUsize::new(0);
        let token = cache.get(|| counted_fetch(&calls)).await.unwrap();
        assert_eq!(&*token, "token-1");
    }
}
