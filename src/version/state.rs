use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::contracts::RemoteRelease;
use crate::version::errors::VersionResult;

/// (owner, repoName)
pub type CacheKey = (String, String);

type SharedFetch = Shared<BoxFuture<'static, VersionResult<RemoteRelease>>>;

/// Cached upstream release
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: RemoteRelease,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    /// Fetch currently running for this key, tagged with its flight id
    in_flight: Option<(u64, SharedFetch)>,
}

type Slots = Arc<Mutex<HashMap<CacheKey, Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-repository memo of the latest release with single-flight fetching.
///
/// Concurrent callers for one key share a single fetch. Failures are handed to every
/// waiter and are never stored, so the next call fetches again.
#[derive(Clone)]
pub struct ResolutionCache {
    ttl: Duration,
    slots: Slots,
    next_flight: Arc<AtomicU64>,
}

impl ResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the fresh cached release for (`owner`, `repo`) or run `fetcher` to get one.
    ///
    /// `fetcher` is only called when no fresh value and no running fetch exist. It is called
    /// under the cache lock, so it must only build the future. The fetch runs on its own
    /// task; it must be bounded by its own deadline. Requires a tokio runtime.
    pub async fn get<F, Fut>(&self, owner: &str, repo: &str, fetcher: F) -> VersionResult<RemoteRelease>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = VersionResult<RemoteRelease>> + Send + 'static,
    {
        let key: CacheKey = (owner.to_string(), repo.to_string());

        let flight = {
            let mut slots = lock(&self.slots);
            let slot = slots.entry(key.clone()).or_default();

            if let Some(entry) = &slot.entry {
                if !entry.is_expired(self.ttl) {
                    trace!(owner, repo, "release cache hit");
                    return Ok(entry.value.clone());
                }
            }

            let running = slot.in_flight.as_ref().map(|(_, shared)| shared.clone());
            match running {
                Some(shared) => {
                    trace!(owner, repo, "joining running fetch");
                    shared
                }
                None => {
                    let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                    debug!(owner, repo, flight = id, "release cache miss, fetching");

                    let fetch = fetcher();
                    let slots = Arc::clone(&self.slots);
                    let flight_key = key.clone();
                    let shared = async move {
                        let result = fetch.await;
                        finish_flight(&slots, &flight_key, id, &result);
                        result
                    }
                    .boxed()
                    .shared();

                    slot.in_flight = Some((id, shared.clone()));
                    // Drive the fetch even if every waiter goes away
                    tokio::spawn(shared.clone());
                    shared
                }
            }
        };

        flight.await
    }

    /// Drop the cached value and detach any running fetch for the key
    pub fn invalidate(&self, owner: &str, repo: &str) {
        let key: CacheKey = (owner.to_string(), repo.to_string());
        lock(&self.slots).remove(&key);
    }

    /// Remove expired entries that have no fetch running
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        lock(&self.slots).retain(|_, slot| {
            if slot.entry.as_ref().is_some_and(|entry| entry.is_expired(ttl)) {
                slot.entry = None;
            }
            slot.entry.is_some() || slot.in_flight.is_some()
        });
    }

    /// Number of stored releases, fresh or not
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn finish_flight(slots: &Slots, key: &CacheKey, id: u64, result: &VersionResult<RemoteRelease>) {
    let mut slots = lock(slots);
    let Some(slot) = slots.get_mut(key) else {
        return;
    };

    // An invalidated key may already be running a newer flight
    if !matches!(&slot.in_flight, Some((running, _)) if *running == id) {
        return;
    }
    slot.in_flight = None;

    match result {
        Ok(release) => {
            slot.entry = Some(CacheEntry {
                value: release.clone(),
                fetched_at: Instant::now(),
            });
        }
        Err(err) => debug!(owner = %key.0, repo = %key.1, error = %err, "fetch failed, nothing cached"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use chrono::{TimeZone, Utc};
    use futures::future::join_all;

    use super::*;
    use crate::contracts::{BuildDescriptor, Channel};
    use crate::version::errors::VersionError;

    const TTL: Duration = Duration::from_secs(600);

    fn release(build: u64) -> RemoteRelease {
        RemoteRelease {
            descriptor: BuildDescriptor::new(
                "Nycticorax",
                "Winds-Studio",
                "Nycticorax",
                Channel::Release,
                Some(build),
                None,
            )
            .unwrap(),
            published_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            download_url: None,
        }
    }

    fn counting_fetcher(
        calls: &Arc<AtomicUsize>,
        result: VersionResult<RemoteRelease>,
    ) -> impl FnOnce() -> BoxFuture<'static, VersionResult<RemoteRelease>> + Send {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_gets_within_ttl_fetch_once() {
        let cache = ResolutionCache::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let value = cache
                .get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Ok(release(105))))
                .await
                .unwrap();
            assert_eq!(value.descriptor.build_number, Some(105));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let cache = ResolutionCache::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Ok(release(105))))
            .await
            .unwrap();
        tokio::time::advance(TTL).await;
        let value = cache
            .get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Ok(release(106))))
            .await
            .unwrap();

        assert_eq!(value.descriptor.build_number, Some(106));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_share_one_fetch() {
        let cache = ResolutionCache::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all((0..16).map(|_| {
            cache.get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Ok(release(105))))
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| result == &Ok(release(105))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_share_one_fetch() {
        let cache = ResolutionCache::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let cache = cache.clone();
                let fetcher = counting_fetcher(&calls, Ok(release(105)));
                tokio::spawn(async move { cache.get("Winds-Studio", "Nycticorax", fetcher).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(release(105)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_all_waiters_and_is_not_cached() {
        let cache = ResolutionCache::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = VersionError::UpstreamUnavailable("HTTP 503".to_string());

        let results = join_all((0..8).map(|_| {
            cache.get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Err(failure.clone())))
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| result == &Err(failure.clone())));
        assert!(cache.is_empty());

        let value = cache
            .get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Ok(release(105))))
            .await;
        assert_eq!(value, Ok(release(105)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_project_is_fetched_again_only_when_asked() {
        let cache = ResolutionCache::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));
        let missing = VersionError::ProjectNotFound {
            owner: "Winds-Studio".to_string(),
            repo: "DoesNotExist".to_string(),
        };

        let first = cache
            .get("Winds-Studio", "DoesNotExist", counting_fetcher(&calls, Err(missing.clone())))
            .await;
        assert_eq!(first, Err(missing.clone()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = cache
            .get("Winds-Studio", "DoesNotExist", counting_fetcher(&calls, Err(missing.clone())))
            .await;
        assert_eq!(second, Err(missing));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let cache = ResolutionCache::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Ok(release(105))))
            .await
            .unwrap();
        cache
            .get("Winds-Studio", "Sapling", counting_fetcher(&calls, Ok(release(7))))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_and_purge() {
        let cache = ResolutionCache::new(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Ok(release(105))))
            .await
            .unwrap();
        cache.invalidate("Winds-Studio", "Nycticorax");
        assert!(cache.is_empty());

        cache
            .get("Winds-Studio", "Nycticorax", counting_fetcher(&calls, Ok(release(105))))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(TTL).await;
        cache.purge_expired();
        assert!(cache.is_empty());
    }
}
