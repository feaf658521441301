//! Generic memoization primitive (spec §4.1).
//!
//! A lazily-resolved value with a maximum lifetime and a background purge. The whole `get()`
//! call — including the `await` on the resolver — runs under one `tokio::sync::Mutex`, so
//! concurrent callers single-flight onto the same resolution rather than racing independent
//! locks for "am I the one refreshing" plus "what's the cached value" (the teacher reaches for
//! the same trick in `scrapers/binance_session.rs`'s `RwLock`-guarded state machine whenever a
//! transition must be observed atomically).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// How a failed resolution should be reported when no fresh value is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Clear the cache and return `T::default()`.
    DefaultForType,
    /// Report failure now but leave any stale cached value in place for a later
    /// `SuccessPreviously` caller.
    FailedNow,
    /// Reuse the last successfully resolved value, even if stale, and report success.
    SuccessPreviously,
}

/// A fallible async resolver. Implemented as a trait (rather than a boxed `Fn`) so resolvers can
/// carry their own state (an HTTP client, an account handle) without an extra `Arc` layer.
#[async_trait]
pub trait Resolve<T>: Send + Sync {
    async fn resolve(&self) -> anyhow::Result<T>;
}

struct CachedEntry<T> {
    value: T,
    resolved_at: Instant,
}

struct Inner<T> {
    entry: Option<CachedEntry<T>>,
    purge_handle: Option<JoinHandle<()>>,
}

/// `lifetime = None` means "cache forever; no purge" (spec §4.1).
pub struct Cacheable<T, R: Resolve<T>> {
    resolver: R,
    lifetime: Option<Duration>,
    state: Arc<Mutex<Inner<T>>>,
}

impl<T, R> fmt::Debug for Cacheable<T, R>
where
    R: Resolve<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cacheable")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl<T, R> Cacheable<T, R>
where
    T: Clone + Default + Send + Sync + 'static,
    R: Resolve<T>,
{
    pub fn new(resolver: R, lifetime: Option<Duration>) -> Self {
        Self {
            resolver,
            lifetime,
            state: Arc::new(Mutex::new(Inner {
                entry: None,
                purge_handle: None,
            })),
        }
    }

    fn is_fresh(&self, entry: &CachedEntry<T>) -> bool {
        match self.lifetime {
            None => true,
            Some(lifetime) => entry.resolved_at.elapsed() < lifetime,
        }
    }

    /// Returns `(success, value)`. See [`FallbackPolicy`] for failure-path semantics.
    pub async fn get(&self, fallback: FallbackPolicy) -> (bool, T) {
        let mut inner = self.state.lock().await;

        if let Some(entry) = &inner.entry {
            if self.is_fresh(entry) {
                return (true, entry.value.clone());
            }
        }

        match self.resolver.resolve().await {
            Ok(value) => {
                self.schedule_purge(&mut inner);
                inner.entry = Some(CachedEntry {
                    value: value.clone(),
                    resolved_at: Instant::now(),
                });
                (true, value)
            }
            Err(err) => {
                debug!(error = %err, "cacheable resolver failed");
                match fallback {
                    FallbackPolicy::DefaultForType => {
                        self.cancel_purge(&mut inner);
                        inner.entry = None;
                        (false, T::default())
                    }
                    FallbackPolicy::FailedNow => {
                        let value = T::default();
                        (false, value)
                    }
                    FallbackPolicy::SuccessPreviously => match &inner.entry {
                        Some(entry) => (true, entry.value.clone()),
                        None => (false, T::default()),
                    },
                }
            }
        }
    }

    /// Clears the cached value and cancels the purge timer, if any.
    pub async fn reset(&self) {
        let mut inner = self.state.lock().await;
        self.cancel_purge(&mut inner);
        inner.entry = None;
    }

    fn cancel_purge(&self, inner: &mut Inner<T>) {
        if let Some(handle) = inner.purge_handle.take() {
            handle.abort();
        }
    }

    fn schedule_purge(&self, inner: &mut Inner<T>) {
        self.cancel_purge(inner);
        let Some(lifetime) = self.lifetime else {
            return;
        };
        let purge_after = lifetime + Duration::from_secs(5 * 60);
        let state = self.state.clone();
        inner.purge_handle = Some(tokio::spawn(async move {
            tokio::time::sleep(purge_after).await;
            let mut inner = state.lock().await;
            inner.entry = None;
            inner.purge_handle = None;
        }));
    }
}

/// Adapts any `Fn() -> Fut` closure into a [`Resolve`] implementation without requiring callers
/// to box the future up front.
pub struct FnResolver<F>(pub F);

#[async_trait]
impl<F, Fut, T> Resolve<T> for FnResolver<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<T>> + Send,
    T: Send,
{
    async fn resolve(&self) -> anyhow::Result<T> {
        (self.0)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_cached_value_within_lifetime() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let cacheable = Cacheable::new(
            FnResolver(move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42u32)
                }
            }),
            Some(Duration::from_secs(60)),
        );

        let (ok1, v1) = cacheable.get(FallbackPolicy::FailedNow).await;
        let (ok2, v2) = cacheable.get(FallbackPolicy::FailedNow).await;
        assert!(ok1 && ok2);
        assert_eq!(v1, 42);
        assert_eq!(v2, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn re_resolves_after_lifetime_elapses() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let cacheable = Cacheable::new(
            FnResolver(move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(calls.load(Ordering::SeqCst))
                }
            }),
            Some(Duration::from_millis(10)),
        );

        let (_, v1) = cacheable.get(FallbackPolicy::FailedNow).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        let (_, v2) = cacheable.get(FallbackPolicy::FailedNow).await;
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn default_for_type_clears_stale_value_on_failure() {
        let first = Arc::new(AtomicU32::new(0));
        let first2 = first.clone();
        let cacheable: Cacheable<u32, _> = Cacheable::new(
            FnResolver(move || {
                let first = first2.clone();
                async move {
                    if first.fetch_add(1, Ordering::SeqCst) == 0 {
                        Ok(7)
                    } else {
                        Err(anyhow::anyhow!("boom"))
                    }
                }
            }),
            Some(Duration::from_millis(5)),
        );

        let (ok, v) = cacheable.get(FallbackPolicy::FailedNow).await;
        assert!(ok);
        assert_eq!(v, 7);

        tokio::time::sleep(Duration::from_millis(15)).await;
        let (ok, v) = cacheable.get(FallbackPolicy::DefaultForType).await;
        assert!(!ok);
        assert_eq!(v, 0);
    }

    #[tokio::test]
    async fn success_previously_reuses_stale_value_on_failure() {
        let first = Arc::new(AtomicU32::new(0));
        let first2 = first.clone();
        let cacheable: Cacheable<u32, _> = Cacheable::new(
            FnResolver(move || {
                let first = first2.clone();
                async move {
                    if first.fetch_add(1, Ordering::SeqCst) == 0 {
                        Ok(9)
                    } else {
                        Err(anyhow::anyhow!("boom"))
                    }
                }
            }),
            Some(Duration::from_millis(5)),
        );

        let _ = cacheable.get(FallbackPolicy::FailedNow).await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        let (ok, v) = cacheable.get(FallbackPolicy::SuccessPreviously).await;
        assert!(ok);
        assert_eq!(v, 9);
    }

    #[tokio::test]
    async fn reset_clears_cache() {
        let cacheable = Cacheable::new(
            FnResolver(|| async { Ok(5u32) }),
            Some(Duration::from_secs(60)),
        );
        let _ = cacheable.get(FallbackPolicy::FailedNow).await;
        cacheable.reset().await;
        let inner = cacheable.state.lock().await;
        assert!(inner.entry.is_none());
    }
}
