//! Bounded, blocking double-ended queue of idle objects

use crate::config::ObtainPolicy;
use crate::pooled::{ObjectId, ObjectMeta, PooledObject, PooledObjectState};

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Outcome of handing a checked-out object back to the queue.
pub(crate) enum Release<T> {
    Requeued,
    /// The object was marked destroyed and must be disposed of by the caller.
    Discard(PooledObject<T>),
}

/// Outcome of a single wait on the queue.
pub(crate) enum Waited<T> {
    Ready(PooledObject<T>),
    /// Something changed (an object was destroyed or the pool closed); the
    /// caller should re-check its options before waiting again.
    Woken,
    TimedOut,
}

struct IdleState<T> {
    objects: VecDeque<PooledObject<T>>,
    epoch: u64,
}

/// Every state transition into or out of the queue happens under its lock,
/// so queue membership and `PooledObjectState::Idle` always agree.
pub(crate) struct IdleQueue<T> {
    state: Mutex<IdleState<T>>,
    available: Condvar,
}

impl<T> IdleQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(IdleState {
                objects: VecDeque::with_capacity(capacity),
                epoch: 0,
            }),
            available: Condvar::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Counter bumped on every push and wake-up. Snapshot it before deciding
    /// to wait so that nothing that happens in between is missed.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Queue an object as idle. `on_queued` runs before the queue lock is
    /// released, so whatever it records is never seen out of step with the
    /// queue.
    pub fn push<F>(&self, obj: PooledObject<T>, policy: ObtainPolicy, on_queued: F)
    where
        F: FnOnce(&PooledObject<T>),
    {
        let mut state = self.state.lock();
        Self::mark_idle(&obj);
        on_queued(&obj);
        Self::insert(&mut state, obj, policy);
        drop(state);
        self.available.notify_one();
    }

    pub fn pop(&self) -> Option<PooledObject<T>> {
        Self::take_head(&mut self.state.lock())
    }

    /// Wait until an object shows up, the epoch moves past `seen_epoch`, or
    /// `deadline` passes. `None` waits without a deadline.
    pub fn wait(&self, seen_epoch: u64, deadline: Option<Instant>) -> Waited<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(obj) = Self::take_head(&mut state) {
                return Waited::Ready(obj);
            }
            if state.epoch != seen_epoch {
                return Waited::Woken;
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        return match Self::take_head(&mut state) {
                            Some(obj) => Waited::Ready(obj),
                            None => Waited::TimedOut,
                        };
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Put a checked-out object back, or mark it destroyed when the pool is
    /// closed or the queue already holds `idle_bound` objects.
    ///
    /// `passivate` runs only for objects that are re-queued, after the state
    /// check and with the queue locked.
    ///
    /// Fails with the object's actual state if it is not in use.
    pub fn release<F>(
        &self,
        mut obj: PooledObject<T>,
        policy: ObtainPolicy,
        idle_bound: usize,
        closed: &AtomicBool,
        passivate: F,
    ) -> Result<Release<T>, (PooledObject<T>, PooledObjectState)>
    where
        F: FnOnce(&mut PooledObject<T>),
    {
        let mut state = self.state.lock();
        let mut meta = obj.meta().lock();
        if meta.state != PooledObjectState::InUse {
            let actual = meta.state;
            drop(meta);
            return Err((obj, actual));
        }
        if closed.load(Ordering::Acquire) || state.objects.len() >= idle_bound {
            meta.state = PooledObjectState::Destroyed;
            drop(meta);
            return Ok(Release::Discard(obj));
        }
        drop(meta);

        passivate(&mut obj);
        {
            let mut meta = obj.meta().lock();
            if meta.state != PooledObjectState::InUse {
                let actual = meta.state;
                drop(meta);
                return Err((obj, actual));
            }
            meta.state = PooledObjectState::Idle;
            meta.last_idle = Instant::now();
        }
        Self::insert(&mut state, obj, policy);
        drop(state);
        self.available.notify_one();
        Ok(Release::Requeued)
    }

    /// Remove the idle object `id` if `expired` still holds for it.
    pub fn remove_if<F>(&self, id: ObjectId, expired: F) -> Option<PooledObject<T>>
    where
        F: Fn(&ObjectMeta) -> bool,
    {
        let mut state = self.state.lock();
        let position = state.objects.iter().position(|obj| obj.id() == id)?;
        {
            let mut meta = state.objects[position].meta().lock();
            if meta.state != PooledObjectState::Idle || !expired(&*meta) {
                return None;
            }
            meta.state = PooledObjectState::Destroyed;
        }
        state.objects.remove(position)
    }

    /// Empty the queue, marking everything destroyed.
    pub fn drain(&self) -> Vec<PooledObject<T>> {
        let mut state = self.state.lock();
        let drained: Vec<_> = state.objects.drain(..).collect();
        for obj in &drained {
            obj.set_state(PooledObjectState::Destroyed);
        }
        drained
    }

    /// Run `check` with the queue length while the queue stays locked.
    #[cfg(test)]
    pub fn with_locked_len<R>(&self, check: impl FnOnce(usize) -> R) -> R {
        let state = self.state.lock();
        check(state.objects.len())
    }

    /// Wake every waiter so it re-evaluates capacity and pool state.
    pub fn wake_all(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        drop(state);
        self.available.notify_all();
    }

    fn mark_idle(obj: &PooledObject<T>) {
        let mut meta = obj.meta().lock();
        meta.state = PooledObjectState::Idle;
        meta.last_idle = Instant::now();
    }

    fn insert(state: &mut IdleState<T>, obj: PooledObject<T>, policy: ObtainPolicy) {
        match policy {
            ObtainPolicy::Lifo => state.objects.push_front(obj),
            ObtainPolicy::Fifo => state.objects.push_back(obj),
        }
        state.epoch = state.epoch.wrapping_add(1);
    }

    fn take_head(state: &mut IdleState<T>) -> Option<PooledObject<T>> {
        let obj = state.objects.pop_front()?;
        obj.set_state(PooledObjectState::InUse);
        Some(obj)
    }
}
