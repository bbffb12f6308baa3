//! Configuration refresh built on deferred results.
//!
//! A [`ConfigFetcher`] produces a deferred [`FetchResponse`]; a refresh
//! policy chains a transform onto it that reconciles the response with the
//! cached value in a [`ConfigStore`] and hands the caller a deferred
//! configuration value. Only the manual variant lives here: it fetches on
//! every call and has no background work, so its [`close`] is a no-op.
//!
//! [`close`]: RefreshPolicy::close

use std::sync::{Arc, Mutex};

use log::debug;

use crate::Deferred;

/// The raw configuration body moved between fetcher, store and caller.
pub type ConfigPayload = String;

/// Outcome classification of one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// A new configuration body was downloaded.
    Fetched,
    /// The upstream copy matches what we already have.
    NotModified,
    /// The attempt failed; the body carries nothing useful.
    Failure,
}

/// The result record of one fetch attempt. Failures are data, not errors:
/// a response with `is_fetched() == false` is delivered normally and means
/// "keep serving the cached value".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: FetchStatus,
    pub body: ConfigPayload,
}

impl FetchResponse {
    pub fn is_fetched(&self) -> bool {
        self.status == FetchStatus::Fetched
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == FetchStatus::NotModified
    }

    pub fn is_failed(&self) -> bool {
        self.status == FetchStatus::Failure
    }
}

/// Produces configuration fetch attempts. The transport behind it (HTTP or
/// otherwise) is not this crate's concern.
pub trait ConfigFetcher: Send + Sync {
    fn fetch_configuration(&self) -> Deferred<FetchResponse>;
}

/// Storage backend for the last-known-good configuration value.
pub trait ConfigCache: Send + Sync {
    fn get(&self) -> ConfigPayload;
    fn set(&self, value: ConfigPayload);
}

/// [`ConfigCache`] backed by a single in-process value slot.
#[derive(Debug, Default)]
pub struct InMemoryConfigCache {
    value: Mutex<ConfigPayload>,
}

impl ConfigCache for InMemoryConfigCache {
    fn get(&self) -> ConfigPayload {
        self.value.lock().unwrap().clone()
    }

    fn set(&self, value: ConfigPayload) {
        *self.value.lock().unwrap() = value;
    }
}

/// Last-known-good configuration store: a single value slot with atomic
/// replace, delegating to a [`ConfigCache`] backend. Reads of a never-set
/// store return the empty payload.
pub struct ConfigStore {
    cache: Box<dyn ConfigCache>,
}

impl ConfigStore {
    pub fn new(cache: Box<dyn ConfigCache>) -> Self {
        Self { cache }
    }

    /// Store over an [`InMemoryConfigCache`].
    pub fn in_memory() -> Self {
        Self::new(Box::<InMemoryConfigCache>::default())
    }

    pub fn get(&self) -> ConfigPayload {
        self.cache.get()
    }

    pub fn set(&self, value: ConfigPayload) {
        self.cache.set(value);
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// The surface every refresh-policy variant exposes to the client: an
/// asynchronous read of the current configuration, and a shutdown hook for
/// variants that hold background work.
pub trait RefreshPolicy {
    fn get_configuration(&self) -> Deferred<ConfigPayload>;
    fn close(&self);
}

/// Fetcher/store pair shared by refresh-policy variants.
pub struct Refresher {
    pub fetcher: Arc<dyn ConfigFetcher>,
    pub store: Arc<ConfigStore>,
}

/// Refresh policy that fetches the latest configuration on every read.
///
/// Stateless between calls: each [`get_configuration`] triggers one fetch
/// and chains the cache reconciliation onto its deferred response, so the
/// returned deferred result completes as soon as the fetch does.
///
/// [`get_configuration`]: RefreshPolicy::get_configuration
pub struct ManualPollingPolicy {
    refresher: Refresher,
}

impl ManualPollingPolicy {
    pub fn new(fetcher: Arc<dyn ConfigFetcher>, store: Arc<ConfigStore>) -> Self {
        Self {
            refresher: Refresher { fetcher, store },
        }
    }
}

impl RefreshPolicy for ManualPollingPolicy {
    fn get_configuration(&self) -> Deferred<ConfigPayload> {
        let store = Arc::clone(&self.refresher.store);
        self.refresher
            .fetcher
            .fetch_configuration()
            .apply_then(move |response| {
                let cached = store.get();
                if response.is_fetched() {
                    let fetched = response.body.clone();
                    if cached != fetched {
                        debug!("configuration changed, updating cache");
                        store.set(fetched.clone());
                    }
                    fetched
                } else {
                    debug!("fetch did not produce a new configuration, serving cached value");
                    cached
                }
            })
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigCache, ConfigFetcher, ConfigPayload, ConfigStore, FetchResponse, FetchStatus,
        ManualPollingPolicy, RefreshPolicy,
    };
    use crate::Deferred;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct StaticFetcher {
        response: FetchResponse,
    }

    impl ConfigFetcher for StaticFetcher {
        fn fetch_configuration(&self) -> Deferred<FetchResponse> {
            Deferred::completed(self.response.clone())
        }
    }

    #[derive(Clone, Default)]
    struct CountingCache {
        writes: Arc<AtomicUsize>,
        value: Arc<Mutex<ConfigPayload>>,
    }

    impl ConfigCache for CountingCache {
        fn get(&self) -> ConfigPayload {
            self.value.lock().unwrap().clone()
        }

        fn set(&self, value: ConfigPayload) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.value.lock().unwrap() = value;
        }
    }

    fn fetcher_with(status: FetchStatus, body: &str) -> Arc<StaticFetcher> {
        Arc::new(StaticFetcher {
            response: FetchResponse {
                status,
                body: body.to_owned(),
            },
        })
    }

    #[test]
    fn test_fetched_value_replaces_cache() {
        let store = Arc::new(ConfigStore::in_memory());
        store.set("v1".to_owned());
        let policy = ManualPollingPolicy::new(fetcher_with(FetchStatus::Fetched, "v2"), store.clone());
        assert_eq!(*policy.get_configuration().get(), "v2");
        assert_eq!(store.get(), "v2");
    }

    #[test]
    fn test_failed_fetch_falls_back_to_cache() {
        let store = Arc::new(ConfigStore::in_memory());
        store.set("v1".to_owned());
        let policy = ManualPollingPolicy::new(fetcher_with(FetchStatus::Failure, ""), store.clone());
        assert_eq!(*policy.get_configuration().get(), "v1");
        assert_eq!(store.get(), "v1");
    }

    #[test]
    fn test_unchanged_value_skips_cache_write() {
        let cache = CountingCache::default();
        let store = Arc::new(ConfigStore::new(Box::new(cache.clone())));
        store.set("v1".to_owned());
        let policy = ManualPollingPolicy::new(fetcher_with(FetchStatus::Fetched, "v1"), store);
        assert_eq!(*policy.get_configuration().get(), "v1");
        // The priming write is the only one.
        assert_eq!(cache.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_store_reads_empty_payload() {
        assert_eq!(ConfigStore::in_memory().get(), "");
    }

    #[test]
    fn test_close_is_a_no_op() {
        let store = Arc::new(ConfigStore::in_memory());
        let policy = ManualPollingPolicy::new(fetcher_with(FetchStatus::Fetched, "v1"), store);
        policy.close();
        assert_eq!(*policy.get_configuration().get(), "v1");
    }
}
