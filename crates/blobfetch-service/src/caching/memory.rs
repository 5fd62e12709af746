use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use sentry::{Hub, SentryFutureExt};

use super::{CacheEntry, CacheKey, CacheName, FetchError};

type ComputationChannel<T> = Shared<oneshot::Receiver<CacheEntry<T>>>;
type ComputationMap<T> = Arc<Mutex<HashMap<CacheKey, ComputationChannel<T>>>>;

/// An in-memory, single-flight cache of fetch results.
///
/// Transparently deduplicates requests via the [`CacheItemRequest`] trait: the first request
/// for a [`CacheKey`] spawns its computation, every other request for that key subscribes to
/// the same computation, whether it is still running or already finished.
///
/// Entries are never evicted. Clones share the same entries.
pub struct Cacher<T: CacheItemRequest> {
    name: CacheName,

    /// All computations, running or finished, by their key.
    computations: ComputationMap<T::Item>,
}

impl<T: CacheItemRequest> std::fmt::Debug for Cacher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Cacher");
        debug.field("name", &self.name);
        match self.computations.try_lock() {
            Ok(computations) => debug.field("entries", &computations.len()),
            Err(_) => debug.field("entries", &format_args!("<locked>")),
        };
        debug.finish()
    }
}

impl<T: CacheItemRequest> Clone for Cacher<T> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Cacher {
            name: self.name,
            computations: Arc::clone(&self.computations),
        }
    }
}

pub trait CacheItemRequest: 'static + Send + Sync {
    type Item: 'static + Send + Sync + Clone;

    /// Returns the key by which this item is cached.
    fn get_cache_key(&self) -> CacheKey;

    /// Invoked to compute an instance of this item.
    ///
    /// This is called at most once per [`CacheKey`] over the lifetime of a [`Cacher`].
    fn compute(&self) -> BoxFuture<'_, CacheEntry<Self::Item>>;
}

impl<T: CacheItemRequest> Cacher<T> {
    pub fn new(name: CacheName) -> Self {
        Cacher {
            name,
            computations: Default::default(),
        }
    }

    pub fn name(&self) -> CacheName {
        self.name
    }

    /// The number of keys that have a computation, running or finished.
    pub fn len(&self) -> usize {
        self.computations.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.computations.lock().unwrap().contains_key(key)
    }

    /// Spawns the computation as a separate task that reports its result into `sender`.
    fn spawn_computation<F, Fut>(
        &self,
        key: &CacheKey,
        sender: oneshot::Sender<CacheEntry<T::Item>>,
        producer: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheEntry<T::Item>> + Send + 'static,
    {
        let name = self.name;

        tracing::trace!("Spawning {} computation for key {}", name, key);

        let computation = async move {
            metric!(counter("caches.computation") += 1, "cache" => name.as_ref());
            let result = producer().await;
            if let Err(err) = &result {
                tracing::debug!(error = %err, "{} computation failed", name);
            }
            sender.send(result).ok();
        }
        .bind_hub(Hub::new_from_top(Hub::current()));

        tokio::spawn(computation);
    }

    /// Returns the result for `key`, invoking `producer` only if nothing is registered for it.
    ///
    /// This does deduplication by keeping every computation based on its [`CacheKey`]. The
    /// `producer` is invoked at most once per key, on its own task, and its outcome is handed
    /// to all current and future callers for that key. Errors are stored the same way.
    ///
    /// NOTE: This function itself is *not* `async`, because it should eagerly spawn the computation
    /// on an executor, even if you don’t explicitly `await` its results.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime and a new computation needs to be spawned.
    /// The key is registered regardless, and all callers of it receive
    /// [`FetchError::InternalError`].
    pub fn get_or_create<F, Fut>(
        &self,
        key: CacheKey,
        producer: F,
    ) -> BoxFuture<'static, CacheEntry<T::Item>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheEntry<T::Item>> + Send + 'static,
    {
        let name = self.name;
        metric!(counter("caches.access") += 1, "cache" => name.as_ref());

        let (channel, sender) = {
            let mut computations = self.computations.lock().unwrap();
            if let Some(channel) = computations.get(&key) {
                // A request was deduplicated.
                metric!(counter("caches.channel.hit") += 1, "cache" => name.as_ref());
                tracing::trace!("Subscribing to {} computation for key {}", name, key);
                (channel.clone(), None)
            } else {
                metric!(counter("caches.channel.miss") += 1, "cache" => name.as_ref());
                let (sender, receiver) = oneshot::channel();
                let channel = receiver.shared();
                computations.insert(key.clone(), channel.clone());
                (channel, Some(sender))
            }
        };

        // Spawned outside of the lock, a failed spawn only cancels this key's channel.
        if let Some(sender) = sender {
            self.spawn_computation(&key, sender, producer);
        }

        let future = channel.unwrap_or_else(move |_cancelled_error| {
            tracing::error!("{} computation channel dropped", name);
            Err(FetchError::InternalError)
        });

        Box::pin(future)
    }

    /// Spawns or joins the computation for `request` without waiting for it.
    pub fn spawn_memoized(&self, request: T) -> BoxFuture<'static, CacheEntry<T::Item>> {
        let key = request.get_cache_key();
        self.get_or_create(key, move || async move { request.compute().await })
    }

    /// Computes an item, or returns the memoized result of an earlier computation.
    ///
    /// The computation itself is done by [`T::compute`](CacheItemRequest::compute), but only if
    /// no computation for the same key was started before.
    ///
    /// # Errors
    ///
    /// Computation can fail, in which case the error is stored and returned to this and all
    /// later callers of the same key.
    pub async fn compute_memoized(&self, request: T) -> CacheEntry<T::Item> {
        self.spawn_memoized(request).await
    }
}
