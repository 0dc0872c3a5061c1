use crate::utils::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Single-value cache with time-based expiry, used for ILS reference data
/// (loan policies, libraries, service points) and session tokens.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<(Instant, Arc<T>)>>,
}

impl<T: Send + Sync> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Option<Arc<T>> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| Arc::clone(value))
    }

    /// Returns the cached value or runs `fetch`. A failed fetch leaves the
    /// cache empty so the next call tries again.
    pub async fn get_or_try_insert<F, Fut>(&self, fetch: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get().await {
            return Ok(value);
        }

        let mut slot = self.slot.write().await;
        // another task may have filled it while we waited for the lock
        if let Some((stored_at, value)) = slot.as_ref() {
            if stored_at.elapsed() < self.ttl {
                return Ok(Arc::clone(value));
            }
        }

        let value = Arc::new(fetch().await?);
        *slot = Some((Instant::now(), Arc::clone(&value)));
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::PortalError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_value_is_reused_until_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["GREEN".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(value.len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refetches() {
        let cache = TtlCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_try_insert(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1u8)
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_try_insert(|| async { Err(PortalError::ils("down")) })
            .await;
        assert!(err.is_err());
        assert!(cache.get().await.is_none());
    }
}
