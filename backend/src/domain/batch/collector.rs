//! Generic batch collector: register keys, flush once, dispatch per registrant.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::Error;
use crate::domain::ports::Collection;

/// How a batch maps keys to results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupMode {
    /// One result per key, possibly absent.
    ById,
    /// Zero or more results per key, grouped by a foreign key column.
    ByForeignKeyGroup,
}

impl LookupMode {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ById => "by-id-one",
            Self::ByForeignKeyGroup => "by-foreign-key-group",
        }
    }
}

impl fmt::Display for LookupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (collection, mode) pair a collector batches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchTarget {
    pub collection: Collection,
    pub mode: LookupMode,
}

/// Source of batched values.
///
/// `load` receives the deduplicated key set of one batch and returns the
/// values it found. Keys missing from the returned map resolve to
/// `Value::default()`, which is how absence (`None`) and empty groups are
/// expressed.
#[async_trait]
pub trait BatchLoad: Send + Sync {
    type Key: Copy + Ord + Hash + fmt::Debug + Send + Sync + 'static;
    type Value: Clone + Default + Send + 'static;

    /// Collection and mode served by this loader.
    fn target(&self) -> BatchTarget;

    /// Fetch every key of the batch with a single store call.
    async fn load(
        &self,
        keys: &BTreeSet<Self::Key>,
    ) -> Result<HashMap<Self::Key, Self::Value>, Error>;
}

type Waiter<K, V> = (K, oneshot::Sender<Result<V, Error>>);

struct PendingBatch<K, V> {
    keys: BTreeSet<K>,
    waiters: Vec<Waiter<K, V>>,
}

impl<K, V> Default for PendingBatch<K, V> {
    fn default() -> Self {
        Self {
            keys: BTreeSet::new(),
            waiters: Vec::new(),
        }
    }
}

/// Summary of one flush, used for logging and call-count assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    pub target: BatchTarget,
    /// Distinct keys sent to the store.
    pub keys: usize,
    /// Registrations resolved by this flush.
    pub registrations: usize,
    /// Whether the store call failed.
    pub failed: bool,
}

impl FlushOutcome {
    /// True when the flush issued a store call.
    #[must_use]
    pub fn dispatched(&self) -> bool {
        self.registrations > 0
    }
}

/// Accumulates registrations for one (collection, mode) within a request.
///
/// Registration is synchronous and never touches the store. [`flush`] takes
/// the whole pending batch under the lock, so registrations racing with an
/// in-flight store call land in the next batch instead of being lost.
///
/// A [`Deferred`] only completes once its batch has been flushed (or the
/// collector dropped); awaiting it before the flush never returns.
///
/// [`flush`]: BatchCollector::flush
pub struct BatchCollector<L: BatchLoad> {
    loader: L,
    pending: Mutex<PendingBatch<L::Key, L::Value>>,
}

impl<L: BatchLoad> BatchCollector<L> {
    /// Create an empty collector around `loader`.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            pending: Mutex::new(PendingBatch::default()),
        }
    }

    /// Queue `key` for the next flush and return a handle to its value.
    pub fn register(&self, key: L::Key) -> Deferred<L::Value> {
        let (sender, receiver) = oneshot::channel();
        let mut pending = self.lock();
        pending.keys.insert(key);
        pending.waiters.push((key, sender));
        Deferred { receiver }
    }

    /// Number of distinct keys awaiting the next flush.
    pub fn pending_keys(&self) -> usize {
        self.lock().keys.len()
    }

    /// True when at least one registration awaits a flush.
    pub fn has_pending(&self) -> bool {
        !self.lock().waiters.is_empty()
    }

    /// Collection and mode served by this collector.
    pub fn target(&self) -> BatchTarget {
        self.loader.target()
    }

    /// Issue one store call for the pending batch and resolve every registrant.
    ///
    /// An empty collector performs no store call. When the store call fails,
    /// every registrant of the batch receives the same error.
    pub async fn flush(&self) -> FlushOutcome {
        let target = self.loader.target();
        let PendingBatch { keys, waiters } = std::mem::take(&mut *self.lock());
        if waiters.is_empty() {
            return FlushOutcome {
                target,
                keys: 0,
                registrations: 0,
                failed: false,
            };
        }

        let result = self.loader.load(&keys).await;
        let outcome = FlushOutcome {
            target,
            keys: keys.len(),
            registrations: waiters.len(),
            failed: result.is_err(),
        };

        // Registrants that went away no longer need their value, so send
        // failures are ignored.
        match result {
            Ok(values) => {
                for (key, sender) in waiters {
                    let value = values.get(&key).cloned().unwrap_or_default();
                    sender.send(Ok(value)).ok();
                }
            }
            Err(error) => {
                for (_, sender) in waiters {
                    sender.send(Err(error.clone())).ok();
                }
            }
        }

        debug!(
            collection = %target.collection,
            mode = %target.mode,
            keys = outcome.keys,
            registrations = outcome.registrations,
            failed = outcome.failed,
            "batch flushed"
        );
        outcome
    }

    fn lock(&self) -> MutexGuard<'_, PendingBatch<L::Key, L::Value>> {
        // The guarded state is plain collections; a panic mid-push leaves it
        // usable.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a value that becomes available when its batch is flushed.
#[must_use = "a deferred value does nothing unless awaited"]
#[derive(Debug)]
pub struct Deferred<V> {
    receiver: oneshot::Receiver<Result<V, Error>>,
}

impl<V> Future for Deferred<V> {
    type Output = Result<V, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| match received {
                Ok(result) => result,
                Err(_) => Err(Error::internal("batch was dropped before it was flushed")),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::ErrorCode;
    use rstest::{fixture, rstest};

    /// Doubles each key; keys above 100 are treated as missing.
    #[derive(Default)]
    struct Doubling {
        calls: AtomicUsize,
        seen: Mutex<Vec<BTreeSet<u32>>>,
        fail: bool,
    }

    #[async_trait]
    impl BatchLoad for Arc<Doubling> {
        type Key = u32;
        type Value = Option<u32>;

        fn target(&self) -> BatchTarget {
            BatchTarget {
                collection: Collection::Users,
                mode: LookupMode::ById,
            }
        }

        async fn load(&self, keys: &BTreeSet<u32>) -> Result<HashMap<u32, Option<u32>>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().expect("seen lock").push(keys.clone());
            if self.fail {
                return Err(Error::batch_fetch_failure("store offline"));
            }
            Ok(keys
                .iter()
                .filter(|key| **key <= 100)
                .map(|key| (*key, Some(key * 2)))
                .collect())
        }
    }

    #[fixture]
    fn loader() -> Arc<Doubling> {
        Arc::new(Doubling::default())
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_keys_share_one_store_call(loader: Arc<Doubling>) {
        let collector = BatchCollector::new(Arc::clone(&loader));
        let first = collector.register(1);
        let second = collector.register(2);
        let again = collector.register(1);
        assert_eq!(collector.pending_keys(), 2);

        let outcome = collector.flush().await;

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            loader.seen.lock().expect("seen lock").as_slice(),
            &[BTreeSet::from([1, 2])]
        );
        assert_eq!(outcome.keys, 2);
        assert_eq!(outcome.registrations, 3);
        assert_eq!(first.await, Ok(Some(2)));
        assert_eq!(second.await, Ok(Some(4)));
        assert_eq!(again.await, Ok(Some(2)));
    }

    #[rstest]
    #[tokio::test]
    async fn missing_keys_resolve_to_default(loader: Arc<Doubling>) {
        let collector = BatchCollector::new(loader);
        let missing = collector.register(500);
        collector.flush().await;
        assert_eq!(missing.await, Ok(None));
    }

    #[rstest]
    #[tokio::test]
    async fn empty_flush_skips_the_store(loader: Arc<Doubling>) {
        let collector = BatchCollector::new(Arc::clone(&loader));
        let outcome = collector.flush().await;
        assert!(!outcome.dispatched());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_reaches_every_registrant() {
        let loader = Arc::new(Doubling {
            fail: true,
            ..Doubling::default()
        });
        let collector = BatchCollector::new(loader);
        let first = collector.register(1);
        let second = collector.register(2);

        let outcome = collector.flush().await;

        assert!(outcome.failed);
        let first_err = first.await.expect_err("first registrant fails");
        let second_err = second.await.expect_err("second registrant fails");
        assert_eq!(first_err.code(), ErrorCode::BatchFetchFailure);
        assert_eq!(first_err, second_err);
    }

    #[rstest]
    #[tokio::test]
    async fn registrations_after_a_flush_start_a_new_batch(loader: Arc<Doubling>) {
        let collector = BatchCollector::new(Arc::clone(&loader));
        let early = collector.register(3);
        collector.flush().await;
        let late = collector.register(3);
        assert!(collector.has_pending());
        collector.flush().await;

        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(early.await, Ok(Some(6)));
        assert_eq!(late.await, Ok(Some(6)));
    }

    #[rstest]
    #[tokio::test]
    async fn dropping_the_collector_fails_pending_handles(loader: Arc<Doubling>) {
        let collector = BatchCollector::new(Arc::clone(&loader));
        let orphan = collector.register(1);
        drop(collector);

        let err = orphan.await.expect_err("orphaned registration fails");
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_land_in_one_batch(loader: Arc<Doubling>) {
        let collector = Arc::new(BatchCollector::new(Arc::clone(&loader)));
        let handles: Vec<_> = (0..16_u32)
            .map(|key| {
                let collector = Arc::clone(&collector);
                tokio::spawn(async move { collector.register(key % 4) })
            })
            .collect();
        let mut deferred = Vec::new();
        for handle in handles {
            deferred.push(handle.await.expect("registration task"));
        }

        collector.flush().await;

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        for value in deferred {
            assert!(value.await.expect("resolved").is_some());
        }
    }
}
