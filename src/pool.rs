//! Core object pool implementation

use crate::config::PoolConfig;
use crate::errors::{BoxError, PoolError, PoolResult};
use crate::eviction::{EvictionPolicy, Evictor};
use crate::factory::{FnFactory, ObjectFactory};
use crate::idle_queue::{IdleQueue, Release, Waited};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::pooled::{ObjectId, PooledObject, PooledObjectState, ReturnFn, SharedMeta};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Bounded, thread-safe pool of factory-made objects.
///
/// Cloning a `Pool` is cheap and yields another handle to the same pool.
///
/// # Examples
///
/// ```
/// use objpool::{Pool, PoolConfig};
///
/// let pool = Pool::from_fn(Vec::<u8>::new, PoolConfig::new().with_capacity(3)).unwrap();
/// assert_eq!(pool.idle_num(), 2);
///
/// let buf = pool.get_object().unwrap();
/// assert_eq!(pool.active_num(), 1);
/// pool.return_object(buf).unwrap();
///
/// pool.close();
/// assert!(pool.is_closed());
/// assert_eq!(pool.idle_num(), 0);
/// ```
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.inner.config.capacity)
            .field("total", &self.inner.registry.len())
            .field("idle", &self.inner.idle.len())
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

pub(crate) struct PoolInner<T> {
    factory: Arc<dyn ObjectFactory<T>>,
    config: PoolConfig,
    eviction: EvictionPolicy,
    idle: IdleQueue<T>,
    registry: DashMap<ObjectId, SharedMeta>,
    /// Reserved creation slots; never below `registry.len()`.
    total: AtomicUsize,
    closed: AtomicBool,
    blocked: AtomicBool,
    maintenance: Mutex<()>,
    metrics: MetricsTracker,
    evictor: Mutex<Option<Evictor>>,
    return_fn: ReturnFn<T>,
}

impl<T: Send + 'static> Pool<T> {
    /// Create a pool and fill it up to `config.min_idle` idle objects.
    ///
    /// Fails on an invalid configuration, when the factory cannot produce the
    /// initial objects, or when the eviction thread cannot be started.
    pub fn new<F>(factory: F, config: PoolConfig) -> PoolResult<Self>
    where
        F: ObjectFactory<T> + 'static,
    {
        config.validate()?;

        let eviction = EvictionPolicy {
            max_idle_lifetime: config.max_idle_lifetime,
            max_lifetime: config.max_lifetime,
        };
        let factory: Arc<dyn ObjectFactory<T>> = Arc::new(factory);
        let inner = Arc::new_cyclic(|weak: &Weak<PoolInner<T>>| {
            let weak = weak.clone();
            let orphan_factory = Arc::clone(&factory);
            let return_fn: ReturnFn<T> = Arc::new(move |obj: PooledObject<T>| {
                let id = obj.id();
                match weak.upgrade() {
                    Some(inner) => {
                        if let Err(err) = inner.release(obj) {
                            warn!(object_id = %id, error = %err, "Failed to return dropped object to pool");
                        }
                    }
                    // The pool is gone; its factory still disposes of the value.
                    None => {
                        obj.set_state(PooledObjectState::Destroyed);
                        match orphan_factory.destroy(obj) {
                            Ok(()) => debug!(object_id = %id, "Destroyed object outliving its pool"),
                            Err(err) => {
                                warn!(object_id = %id, error = %err, "Factory failed to destroy object outliving its pool")
                            }
                        }
                    }
                }
            });

            PoolInner {
                factory,
                idle: IdleQueue::new(config.capacity),
                registry: DashMap::with_capacity(config.capacity),
                config,
                eviction,
                total: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                blocked: AtomicBool::new(false),
                maintenance: Mutex::new(()),
                metrics: MetricsTracker::new(),
                evictor: Mutex::new(None),
                return_fn,
            }
        });

        inner.ensure_min_idle()?;

        if let Some(interval) = inner.config.eviction_interval {
            let weak = Arc::downgrade(&inner);
            let evictor = Evictor::spawn(
                "objpool-evictor".to_string(),
                inner.config.eviction_initial_delay,
                interval,
                move || match weak.upgrade() {
                    Some(inner) => {
                        inner.remove_timed_out_objects();
                        !inner.is_closed()
                    }
                    None => false,
                },
            )
            .map_err(|err| PoolError::EvictorSpawn(Arc::new(err)))?;
            *inner.evictor.lock() = Some(evictor);
        }

        debug!(
            capacity = inner.config.capacity,
            min_idle = inner.config.min_idle,
            idle = inner.idle.len(),
            "Pool created"
        );
        Ok(Self { inner })
    }

    /// Create a pool whose objects come from an infallible closure.
    pub fn from_fn<C>(create: C, config: PoolConfig) -> PoolResult<Self>
    where
        C: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(
            FnFactory::new(move || -> Result<T, BoxError> { Ok(create()) }),
            config,
        )
    }

    /// Create one more idle object.
    ///
    /// Fails with [`PoolError::Closed`] once the pool is closed and with
    /// [`PoolError::IdleSpaceExhausted`] when the pool or its idle queue is
    /// full.
    pub fn add_object(&self) -> PoolResult<()> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(PoolError::Closed);
        }
        if inner.idle.len() >= inner.config.idle_bound() || !inner.try_reserve() {
            MetricsTracker::incr(&inner.metrics.exhausted);
            return Err(PoolError::IdleSpaceExhausted);
        }
        let obj = inner.create_reserved()?;
        inner.push_new(obj);
        if inner.is_closed() {
            inner.clear();
        }
        Ok(())
    }

    /// Check out an object.
    ///
    /// Takes an idle object if there is one, otherwise creates a new one
    /// while below capacity. At capacity it either fails right away or, in
    /// blocking mode, waits up to `max_wait` for an object to come back.
    pub fn get_object(&self) -> PoolResult<PooledObject<T>> {
        match self.inner.acquire(true) {
            Ok(obj) => Ok(self.inner.check_out(obj)),
            Err(err) => {
                if matches!(err, PoolError::IdleSpaceExhausted) {
                    MetricsTracker::incr(&self.inner.metrics.exhausted);
                }
                Err(err)
            }
        }
    }

    /// Try to check out an object without waiting.
    ///
    /// Returns `Ok(None)` when the pool is at capacity with nothing idle.
    /// Factory failures are reported as errors.
    pub fn try_get_object(&self) -> PoolResult<Option<PooledObject<T>>> {
        match self.inner.acquire(false) {
            Ok(obj) => Ok(Some(self.inner.check_out(obj))),
            Err(PoolError::IdleSpaceExhausted) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Check out an object without blocking the executor thread.
    ///
    /// Polls the pool until an object is available, bounded by `max_wait`.
    pub async fn get_object_async(&self) -> PoolResult<PooledObject<T>> {
        let poll = async {
            loop {
                match self.inner.acquire(false) {
                    Ok(obj) => return Ok(self.inner.check_out(obj)),
                    Err(PoolError::IdleSpaceExhausted) if self.inner.config.blocking => {
                        if self.inner.is_closed() {
                            return Err(PoolError::WaitInterrupted);
                        }
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        let result = match self.inner.config.max_wait {
            Some(max_wait) => tokio::time::timeout(max_wait, poll)
                .await
                .unwrap_or(Err(PoolError::IdleSpaceExhausted)),
            None => poll.await,
        };
        if matches!(result, Err(PoolError::IdleSpaceExhausted)) {
            MetricsTracker::incr(&self.inner.metrics.exhausted);
        }
        result
    }

    /// Hand a checked-out object back.
    ///
    /// The object is re-queued as idle, or destroyed when the pool is closed
    /// or its idle queue is full. An object that does not belong to this pool
    /// is rejected with [`PoolError::NotPartOfPool`] and goes back to its own
    /// pool as it is dropped.
    pub fn return_object(&self, obj: PooledObject<T>) -> PoolResult<()> {
        self.inner.release(obj)
    }

    /// Destroy a checked-out object instead of returning it.
    pub fn destroy_object(&self, mut obj: PooledObject<T>) -> PoolResult<()> {
        let inner = &self.inner;
        if !inner.owns(&obj) {
            return Err(PoolError::NotPartOfPool(obj.id()));
        }
        obj.detach();
        PoolInner::transition(&obj, PooledObjectState::InUse, PooledObjectState::Destroyed)?;
        inner.destroy(obj)
    }

    /// Ask the factory whether a member of this pool is still usable.
    pub fn validate_object(&self, obj: &PooledObject<T>) -> bool {
        self.inner.owns(obj) && self.inner.factory.validate(obj)
    }

    /// Evict idle objects past their lifetime, then top the idle queue back
    /// up to `min_idle`. Returns the number of evicted objects.
    ///
    /// The background thread calls this on its schedule; it can also be
    /// called directly.
    pub fn remove_timed_out_objects(&self) -> usize {
        self.inner.remove_timed_out_objects()
    }
}

impl<T> Pool<T> {
    /// Maximum number of live objects
    pub fn max_num(&self) -> usize {
        self.inner.config.capacity
    }

    /// Objects currently checked out
    pub fn active_num(&self) -> usize {
        self.inner
            .registry
            .len()
            .saturating_sub(self.inner.idle.len())
    }

    /// Get the number of idle objects
    pub fn idle_num(&self) -> usize {
        self.inner.idle.len()
    }

    /// Live objects, idle and checked out
    pub fn total_num(&self) -> usize {
        self.inner.registry.len()
    }

    /// Check whether the pool has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Whether the last idle top-up stopped short because of the capacity.
    pub fn is_blocked(&self) -> bool {
        self.inner.blocked.load(Ordering::Acquire)
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Destroy every idle object. Checked-out objects are left alone.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Close the pool: destroy idle objects, stop the eviction thread and
    /// refuse further [`add_object`](Pool::add_object) calls.
    ///
    /// Objects returned afterwards are destroyed. Calling `close` again has
    /// no effect.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.metrics.snapshot(
            self.active_num(),
            self.idle_num(),
            self.inner.config.capacity,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }
}

impl<T> PoolInner<T> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn owns(&self, obj: &PooledObject<T>) -> bool {
        self.registry
            .get(&obj.id())
            .is_some_and(|meta| Arc::ptr_eq(meta.value(), obj.meta()))
    }

    fn transition(
        obj: &PooledObject<T>,
        from: PooledObjectState,
        to: PooledObjectState,
    ) -> PoolResult<()> {
        let mut meta = obj.meta().lock();
        if meta.state != from {
            return Err(PoolError::IllegalState {
                id: obj.id(),
                actual: meta.state,
                expected: from,
            });
        }
        meta.state = to;
        Ok(())
    }

    fn try_reserve(&self) -> bool {
        let capacity = self.config.capacity;
        self.total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn unreserve(&self) {
        self.total.fetch_sub(1, Ordering::AcqRel);
        self.idle.wake_all();
    }

    /// Create an object in a slot taken by `try_reserve`.
    ///
    /// The object is not registered yet; `push_new` or `acquire` does that
    /// once its state is final.
    fn create_reserved(&self) -> PoolResult<PooledObject<T>> {
        let obj = match self.factory.make_object() {
            Ok(obj) => obj,
            Err(err) => {
                self.unreserve();
                warn!(error = %err, "Factory failed to create object");
                return Err(PoolError::creation(err));
            }
        };
        MetricsTracker::incr(&self.metrics.created);
        debug!(object_id = %obj.id(), "Created pooled object");
        Ok(obj)
    }

    fn register(&self, obj: &PooledObject<T>) {
        self.registry.insert(obj.id(), Arc::clone(obj.meta()));
    }

    /// Queue a freshly created object as idle, registering it under the
    /// queue lock.
    fn push_new(&self, obj: PooledObject<T>) {
        self.idle
            .push(obj, self.config.obtain_policy, |obj| self.register(obj));
    }

    /// Keep at least `min_idle` objects idle, as far as capacity allows.
    fn ensure_min_idle(&self) -> PoolResult<()> {
        let target = self.config.min_idle;
        if target == 0 || self.is_closed() {
            return Ok(());
        }

        let _guard = self.maintenance.lock();
        let mut blocked = false;
        while self.idle.len() < target && !self.is_closed() {
            if !self.try_reserve() {
                blocked = true;
                break;
            }
            let obj = self.create_reserved()?;
            self.push_new(obj);
        }
        self.blocked.store(blocked, Ordering::Release);

        if self.is_closed() {
            self.clear();
        }
        Ok(())
    }

    /// Take an idle object or create one. With `wait` set and blocking
    /// enabled, waits for a return or a freed slot when at capacity.
    fn acquire(&self, wait: bool) -> PoolResult<PooledObject<T>> {
        let deadline = self
            .config
            .max_wait
            .and_then(|max_wait| Instant::now().checked_add(max_wait));

        loop {
            let epoch = self.idle.epoch();
            if let Some(obj) = self.idle.pop() {
                return Ok(obj);
            }
            if self.try_reserve() {
                let obj = self.create_reserved()?;
                obj.set_state(PooledObjectState::InUse);
                self.register(&obj);
                return Ok(obj);
            }
            if !(wait && self.config.blocking) {
                return Err(PoolError::IdleSpaceExhausted);
            }
            if self.is_closed() {
                return Err(PoolError::WaitInterrupted);
            }
            match self.idle.wait(epoch, deadline) {
                Waited::Ready(obj) => return Ok(obj),
                Waited::Woken => continue,
                Waited::TimedOut => return Err(PoolError::IdleSpaceExhausted),
            }
        }
    }

    fn check_out(&self, mut obj: PooledObject<T>) -> PooledObject<T> {
        self.factory.activate(&mut obj);
        obj.attach(Arc::clone(&self.return_fn));
        MetricsTracker::incr(&self.metrics.borrowed);
        debug!(object_id = %obj.id(), "Checked out pooled object");

        if let Err(err) = self.ensure_min_idle() {
            warn!(error = %err, "Failed to restore minimum idle objects");
        }
        obj
    }

    fn release(&self, mut obj: PooledObject<T>) -> PoolResult<()> {
        let id = obj.id();
        if !self.owns(&obj) {
            return Err(PoolError::NotPartOfPool(id));
        }
        obj.detach();

        let state = obj.state();
        if state != PooledObjectState::InUse {
            return Err(PoolError::IllegalState {
                id,
                actual: state,
                expected: PooledObjectState::InUse,
            });
        }

        if self.config.validate_on_return && !self.factory.validate(&obj) {
            Self::transition(&obj, PooledObjectState::InUse, PooledObjectState::Destroyed)?;
            debug!(object_id = %id, "Returned object failed validation");
            return self.destroy(obj);
        }

        match self.idle.release(
            obj,
            self.config.obtain_policy,
            self.config.idle_bound(),
            &self.closed,
            |obj| self.factory.passivate(obj),
        ) {
            Ok(Release::Requeued) => {
                MetricsTracker::incr(&self.metrics.returned);
                debug!(object_id = %id, "Returned pooled object");
                Ok(())
            }
            Ok(Release::Discard(obj)) => self.destroy(obj),
            Err((_, actual)) => Err(PoolError::IllegalState {
                id,
                actual,
                expected: PooledObjectState::InUse,
            }),
        }
    }

    /// Drop an object that has already left the idle queue.
    ///
    /// A no-op for objects no longer in the registry. The registry entry and
    /// the capacity slot are released even when the factory hook fails.
    fn destroy(&self, mut obj: PooledObject<T>) -> PoolResult<()> {
        obj.detach();
        obj.set_state(PooledObjectState::Destroyed);
        let id = obj.id();
        let removed = self
            .registry
            .remove_if(&id, |_, meta| Arc::ptr_eq(meta, obj.meta()))
            .is_some();
        if !removed {
            return Ok(());
        }

        let result = self.factory.destroy(obj).map_err(|err| {
            MetricsTracker::incr(&self.metrics.destroy_failures);
            warn!(object_id = %id, error = %err, "Factory failed to destroy object");
            PoolError::destroy(id, err)
        });
        MetricsTracker::incr(&self.metrics.destroyed);
        debug!(object_id = %id, "Destroyed pooled object");
        self.unreserve();
        result
    }

    fn remove_timed_out_objects(&self) -> usize {
        let now = Instant::now();
        let candidates: Vec<ObjectId> = self
            .registry
            .iter()
            .filter(|entry| {
                let meta = entry.value().lock();
                meta.state == PooledObjectState::Idle && self.eviction.is_expired(&meta, now)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in candidates {
            if let Some(obj) = self
                .idle
                .remove_if(id, |meta| self.eviction.is_expired(meta, now))
            {
                evicted += 1;
                MetricsTracker::incr(&self.metrics.evicted);
                debug!(object_id = %id, "Evicting idle object");
                let _ = self.destroy(obj);
            }
        }

        if let Err(err) = self.ensure_min_idle() {
            warn!(error = %err, "Failed to restore minimum idle objects after eviction");
        }
        evicted
    }

    fn clear(&self) {
        for obj in self.idle.drain() {
            let _ = self.destroy(obj);
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clear();
        let evictor = self.evictor.lock().take();
        if let Some(mut evictor) = evictor {
            evictor.stop();
        }
        self.idle.wake_all();
        debug!("Pool closed");
    }
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;
    use std::thread;

    #[derive(Default)]
    struct Counting {
        next: AtomicU32,
        destroyed: Arc<AtomicUsize>,
        passivated: Arc<AtomicUsize>,
        fail_create: bool,
        fail_destroy: bool,
        reject_odd: bool,
    }

    impl ObjectFactory<u32> for Counting {
        fn create(&self) -> Result<u32, BoxError> {
            if self.fail_create {
                return Err("factory offline".into());
            }
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        fn destroy(&self, _object: PooledObject<u32>) -> Result<(), BoxError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy {
                return Err("close failed".into());
            }
            Ok(())
        }

        fn validate(&self, object: &PooledObject<u32>) -> bool {
            !self.reject_odd || **object % 2 == 0
        }

        fn passivate(&self, _object: &mut PooledObject<u32>) {
            self.passivated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(capacity: usize, min_idle: usize) -> PoolConfig {
        PoolConfig::new()
            .with_capacity(capacity)
            .with_min_idle(min_idle)
            .without_eviction_thread()
    }

    fn idle_in_registry(pool: &Pool<u32>) -> usize {
        pool.inner
            .registry
            .iter()
            .filter(|entry| entry.value().lock().state == PooledObjectState::Idle)
            .count()
    }

    #[test]
    fn test_fills_min_idle_on_creation() {
        let pool = Pool::new(Counting::default(), config(5, 2)).unwrap();
        assert_eq!(pool.idle_num(), 2);
        assert_eq!(pool.total_num(), 2);
        assert_eq!(pool.active_num(), 0);
        assert!(!pool.is_blocked());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = Pool::new(Counting::default(), config(2, 3)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_get_backfills_and_return_requeues() {
        let pool = Pool::new(Counting::default(), config(5, 2)).unwrap();

        let obj = pool.get_object().unwrap();
        assert_eq!(obj.state(), PooledObjectState::InUse);
        assert_eq!(pool.active_num(), 1);
        assert_eq!(pool.idle_num(), 2);
        assert_eq!(pool.total_num(), 3);
        assert_eq!(idle_in_registry(&pool), pool.idle_num());

        pool.return_object(obj).unwrap();
        assert_eq!(pool.idle_num(), 3);
        assert_eq!(pool.active_num(), 0);
        assert_eq!(idle_in_registry(&pool), 3);
    }

    #[test]
    fn test_double_return_is_illegal_state() {
        let pool = Pool::new(Counting::default(), config(3, 0)).unwrap();
        let obj = pool.get_object().unwrap();
        let duplicate = obj.forge_duplicate(*obj);

        pool.return_object(obj).unwrap();
        let err = pool.return_object(duplicate).unwrap_err();
        assert!(matches!(
            err,
            PoolError::IllegalState {
                actual: PooledObjectState::Idle,
                expected: PooledObjectState::InUse,
                ..
            }
        ));
        assert_eq!(pool.idle_num(), 1);
        assert_eq!(pool.total_num(), 1);
    }

    #[test]
    fn test_concurrent_duplicate_returns_requeue_once() {
        let passivated = Arc::new(AtomicUsize::new(0));
        let factory = Counting {
            passivated: Arc::clone(&passivated),
            ..Default::default()
        };
        let pool = Pool::new(factory, config(2, 0)).unwrap();
        let obj = pool.get_object().unwrap();
        let duplicate = obj.forge_duplicate(*obj);

        let handles: Vec<_> = [obj, duplicate]
            .into_iter()
            .map(|o| {
                let pool = pool.clone();
                thread::spawn(move || pool.return_object(o).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(pool.idle_num(), 1);
        assert_eq!(passivated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreign_object_is_not_part_of_pool() {
        let home = Pool::new(Counting::default(), config(1, 0)).unwrap();
        let other = Pool::new(Counting::default(), config(1, 0)).unwrap();

        let obj = home.get_object().unwrap();
        let id = obj.id();
        let err = other.return_object(obj).unwrap_err();
        assert!(matches!(err, PoolError::NotPartOfPool(rejected) if rejected == id));

        // Dropping the rejected handle sent it back home.
        assert_eq!(home.idle_num(), 1);
        assert_eq!(other.total_num(), 0);
    }

    #[test]
    fn test_non_blocking_exhaustion_is_immediate() {
        let pool = Pool::new(Counting::default(), config(1, 0).with_blocking(false)).unwrap();
        let _held = pool.get_object().unwrap();

        let started = Instant::now();
        let err = pool.get_object().unwrap_err();
        assert!(matches!(err, PoolError::IdleSpaceExhausted));
        assert!(err.is_retryable());
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(pool.metrics().exhausted_events, 1);
    }

    #[test]
    fn test_creation_failure_releases_slot() {
        let factory = Counting {
            fail_create: true,
            ..Default::default()
        };
        let pool = Pool::new(factory, config(2, 0)).unwrap();

        let err = pool.get_object().unwrap_err();
        assert!(matches!(err, PoolError::CreationFailed(_)));
        assert_eq!(pool.total_num(), 0);
        assert_eq!(pool.inner.total.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_creation_failure_during_fill_fails_construction() {
        let factory = Counting {
            fail_create: true,
            ..Default::default()
        };
        let err = Pool::new(factory, config(2, 1)).unwrap_err();
        assert!(matches!(err, PoolError::CreationFailed(_)));
    }

    #[test]
    fn test_destroy_failure_keeps_bookkeeping() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory = Counting {
            destroyed: Arc::clone(&destroyed),
            fail_destroy: true,
            ..Default::default()
        };
        let pool = Pool::new(factory, config(2, 0)).unwrap();
        let obj = pool.get_object().unwrap();
        let id = obj.id();

        let err = pool.destroy_object(obj).unwrap_err();
        assert!(matches!(err, PoolError::DestroyFailed { id: failed, .. } if failed == id));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.total_num(), 0);
        assert_eq!(pool.metrics().destroy_failures, 1);

        // The slot is free again.
        let _a = pool.get_object().unwrap();
        let _b = pool.get_object().unwrap();
    }

    #[test]
    fn test_return_to_closed_pool_destroys() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let passivated = Arc::new(AtomicUsize::new(0));
        let factory = Counting {
            destroyed: Arc::clone(&destroyed),
            passivated: Arc::clone(&passivated),
            ..Default::default()
        };
        let pool = Pool::new(factory, config(3, 1)).unwrap();
        let obj = pool.get_object().unwrap();
        pool.close();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        pool.return_object(obj).unwrap();
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_num(), 0);
        assert_eq!(pool.total_num(), 0);
        assert_eq!(passivated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_idle_bound_discards_extra_returns() {
        let pool = Pool::new(Counting::default(), config(3, 0).with_max_idle(1)).unwrap();
        let a = pool.get_object().unwrap();
        let b = pool.get_object().unwrap();

        pool.return_object(a).unwrap();
        pool.return_object(b).unwrap();
        assert_eq!(pool.idle_num(), 1);
        assert_eq!(pool.total_num(), 1);
    }

    #[test]
    fn test_validate_on_return_destroys_rejected() {
        let factory = Counting {
            reject_odd: true,
            ..Default::default()
        };
        let pool = Pool::new(factory, config(3, 0).with_validate_on_return(true)).unwrap();
        let even = pool.get_object().unwrap();
        let odd = pool.get_object().unwrap();
        assert_eq!((*even, *odd), (0, 1));
        assert!(pool.validate_object(&even));
        assert!(!pool.validate_object(&odd));

        pool.return_object(even).unwrap();
        pool.return_object(odd).unwrap();
        assert_eq!(pool.idle_num(), 1);
        assert_eq!(pool.total_num(), 1);
    }

    #[test]
    fn test_drop_returns_to_pool() {
        let pool = Pool::new(Counting::default(), config(2, 0)).unwrap();
        {
            let _obj = pool.get_object().unwrap();
            assert_eq!(pool.active_num(), 1);
        }
        assert_eq!(pool.active_num(), 0);
        assert_eq!(pool.idle_num(), 1);
        assert_eq!(pool.metrics().total_returned, 1);
    }

    #[test]
    fn test_blocked_when_capacity_caps_min_idle() {
        let pool = Pool::new(Counting::default(), config(2, 2)).unwrap();
        assert!(!pool.is_blocked());
        let _obj = pool.get_object().unwrap();
        assert!(pool.is_blocked());
        assert_eq!(pool.total_num(), 2);
    }

    #[test]
    fn test_sweep_evicts_and_refills() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory = Counting {
            destroyed: Arc::clone(&destroyed),
            ..Default::default()
        };
        let pool = Pool::new(
            factory,
            config(2, 1).with_max_idle_lifetime(Duration::from_millis(50)),
        )
        .unwrap();
        let first = pool.inner.registry.iter().map(|e| *e.key()).next().unwrap();

        assert_eq!(pool.remove_timed_out_objects(), 0);
        thread::sleep(Duration::from_millis(80));
        assert_eq!(pool.remove_timed_out_objects(), 1);

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_num(), 1);
        assert!(!pool.inner.registry.contains_key(&first));
        assert_eq!(pool.metrics().total_evicted, 1);
    }

    #[test]
    fn test_sweep_ignores_checked_out_objects() {
        let pool = Pool::new(
            Counting::default(),
            config(1, 0).with_max_idle_lifetime(Duration::ZERO),
        )
        .unwrap();
        let obj = pool.get_object().unwrap();
        assert_eq!(pool.remove_timed_out_objects(), 0);
        assert_eq!(pool.total_num(), 1);
        pool.return_object(obj).unwrap();
        assert_eq!(pool.remove_timed_out_objects(), 1);
        assert_eq!(pool.total_num(), 0);
    }

    #[test]
    fn test_background_sweep_runs() {
        let config = config(2, 0)
            .with_max_idle_lifetime(Duration::from_millis(20))
            .with_eviction_schedule(Duration::from_millis(10), Duration::from_millis(10));
        let pool = Pool::new(Counting::default(), config).unwrap();
        pool.add_object().unwrap();
        assert_eq!(pool.total_num(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.total_num() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.total_num(), 0);
        pool.close();
    }

    #[test]
    fn test_close_is_idempotent() {
        let pool = Pool::new(Counting::default(), config(3, 2)).unwrap();
        pool.close();
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.idle_num(), 0);
        assert!(matches!(pool.add_object(), Err(PoolError::Closed)));
    }

    #[test]
    fn test_add_object_respects_capacity() {
        let pool = Pool::new(Counting::default(), config(2, 0)).unwrap();
        pool.add_object().unwrap();
        pool.add_object().unwrap();
        assert!(matches!(pool.add_object(), Err(PoolError::IdleSpaceExhausted)));
        assert_eq!(pool.idle_num(), 2);
    }

    #[test]
    fn test_close_interrupts_unbounded_wait() {
        let pool = Pool::new(Counting::default(), config(1, 0).with_unbounded_wait()).unwrap();
        let held = pool.get_object().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.get_object().map(|o| *o))
        };
        thread::sleep(Duration::from_millis(50));
        pool.close();

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(PoolError::WaitInterrupted)));
        drop(held);
    }

    #[test]
    fn test_destroyed_slot_unblocks_waiter() {
        let pool = Pool::new(
            Counting::default(),
            config(1, 0).with_max_wait(Duration::from_secs(5)),
        )
        .unwrap();
        let held = pool.get_object().unwrap();
        let held_id = held.id();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.get_object().map(|o| o.id()))
        };
        thread::sleep(Duration::from_millis(50));
        pool.destroy_object(held).unwrap();

        let id = waiter.join().unwrap().unwrap();
        assert_ne!(id, held_id);
    }

    #[test]
    fn test_concurrent_checkouts_stay_within_capacity() {
        let pool = Pool::new(Counting::default(), config(4, 1)).unwrap();
        let checked_out = Arc::new(Mutex::new(HashSet::new()));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let checked_out = Arc::clone(&checked_out);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let obj = pool.get_object().unwrap();
                        assert!(checked_out.lock().insert(obj.id()), "double checkout");
                        assert!(pool.total_num() <= 4);
                        thread::yield_now();
                        assert!(checked_out.lock().remove(&obj.id()));
                        pool.return_object(obj).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(pool.total_num() <= 4);
        assert_eq!(pool.active_num(), 0);
        assert_eq!(idle_in_registry(&pool), pool.idle_num());
        assert_eq!(pool.metrics().total_borrowed, 1600);
    }

    #[test]
    fn test_try_get_reports_creation_failure() {
        let factory = Counting {
            fail_create: true,
            ..Default::default()
        };
        let pool = Pool::new(factory, config(1, 0)).unwrap();
        assert!(matches!(pool.try_get_object(), Err(PoolError::CreationFailed(_))));
        assert_eq!(pool.metrics().exhausted_events, 0);
    }

    #[test]
    fn test_try_get_returns_none_when_exhausted() {
        let pool = Pool::new(Counting::default(), config(1, 0)).unwrap();
        let held = pool.try_get_object().unwrap().unwrap();
        assert!(pool.try_get_object().unwrap().is_none());
        pool.return_object(held).unwrap();
        assert!(pool.try_get_object().unwrap().is_some());
    }

    #[test]
    fn test_destroy_twice_is_a_no_op() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory = Counting {
            destroyed: Arc::clone(&destroyed),
            ..Default::default()
        };
        let pool = Pool::new(factory, config(2, 0)).unwrap();
        let _other = pool.get_object().unwrap();
        let obj = pool.get_object().unwrap();
        let duplicate = obj.forge_duplicate(*obj);
        assert_eq!(pool.inner.total.load(Ordering::SeqCst), 2);

        pool.destroy_object(obj).unwrap();
        pool.inner.destroy(duplicate).unwrap();

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.inner.total.load(Ordering::SeqCst), 1);
        assert_eq!(pool.total_num(), 1);
        assert_eq!(pool.metrics().total_destroyed, 1);
    }

    #[test]
    fn test_object_outliving_pool_is_destroyed() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory = Counting {
            destroyed: Arc::clone(&destroyed),
            ..Default::default()
        };
        let pool = Pool::new(factory, config(2, 1)).unwrap();
        let obj = pool.get_object().unwrap();

        drop(pool);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);

        drop(obj);
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registry_idle_count_tracks_queue_under_load() {
        let pool = Pool::new(Counting::default(), config(4, 2)).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let obj = pool.get_object().unwrap();
                        if i % 7 == 0 {
                            pool.destroy_object(obj).unwrap();
                        } else {
                            pool.return_object(obj).unwrap();
                        }
                    }
                })
            })
            .collect();
        let observer = {
            let pool = pool.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checks = 0;
                while !done.load(Ordering::Acquire) {
                    let (queued, registered) = pool
                        .inner
                        .idle
                        .with_locked_len(|len| (len, idle_in_registry(&pool)));
                    assert_eq!(queued, registered);
                    checks += 1;
                }
                checks
            })
        };

        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::Release);
        assert!(observer.join().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_async_get() {
        let pool = Pool::new(Counting::default(), config(2, 1)).unwrap();
        let obj = pool.get_object_async().await.unwrap();
        assert_eq!(pool.active_num(), 1);
        pool.return_object(obj).unwrap();
    }

    #[tokio::test]
    async fn test_async_get_times_out() {
        let pool = Pool::new(
            Counting::default(),
            config(1, 0).with_max_wait(Duration::from_millis(50)),
        )
        .unwrap();
        let _held = pool.get_object_async().await.unwrap();
        let err = pool.get_object_async().await.unwrap_err();
        assert!(matches!(err, PoolError::IdleSpaceExhausted));
    }
}
