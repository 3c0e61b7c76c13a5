//! Pooled object wrapper and its lifecycle state

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a pooled object.
///
/// The pool keys its registry by this id rather than by the wrapped value,
/// so two equal values are still two distinct pool members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        ObjectId(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a pooled object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PooledObjectState {
    /// Sitting in the idle queue
    Idle,

    /// Checked out by a caller
    InUse,

    /// Removed from the pool; terminal
    Destroyed,
}

impl fmt::Display for PooledObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PooledObjectState::Idle => "idle",
            PooledObjectState::InUse => "in use",
            PooledObjectState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Metadata shared between an object and the pool registry.
#[derive(Debug)]
pub(crate) struct ObjectMeta {
    pub state: PooledObjectState,
    pub created_at: Instant,
    pub last_idle: Instant,
}

pub(crate) type SharedMeta = Arc<Mutex<ObjectMeta>>;

pub(crate) type ReturnFn<T> = Arc<dyn Fn(PooledObject<T>) + Send + Sync>;

/// A value managed by a pool, together with its pool-visible metadata.
///
/// Factories produce these through [`ObjectFactory::wrap`](crate::ObjectFactory::wrap).
/// A checked-out object derefs to the wrapped value and goes back to its
/// pool when dropped, unless it was handed to
/// [`Pool::return_object`](crate::Pool::return_object) or
/// [`Pool::destroy_object`](crate::Pool::destroy_object) first.
///
/// # Examples
///
/// ```
/// use objpool::{PooledObject, PooledObjectState};
///
/// let obj = PooledObject::new(String::from("conn"));
/// assert_eq!(obj.state(), PooledObjectState::Idle);
/// assert_eq!(obj.len(), 4);
/// ```
pub struct PooledObject<T> {
    id: ObjectId,
    value: Option<T>,
    meta: SharedMeta,
    return_fn: Option<ReturnFn<T>>,
}

impl<T> PooledObject<T> {
    /// Wrap a freshly created value. The object starts out idle.
    pub fn new(value: T) -> Self {
        let now = Instant::now();
        Self {
            id: ObjectId::next(),
            value: Some(value),
            meta: Arc::new(Mutex::new(ObjectMeta {
                state: PooledObjectState::Idle,
                created_at: now,
                last_idle: now,
            })),
            return_fn: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn state(&self) -> PooledObjectState {
        self.meta.lock().state
    }

    pub fn is_idle(&self) -> bool {
        self.state() == PooledObjectState::Idle
    }

    pub fn created_at(&self) -> Instant {
        self.meta.lock().created_at
    }

    /// When the object last entered the idle state
    pub fn last_idle(&self) -> Instant {
        self.meta.lock().last_idle
    }

    pub fn age(&self) -> Duration {
        self.created_at().elapsed()
    }

    pub(crate) fn meta(&self) -> &SharedMeta {
        &self.meta
    }

    pub(crate) fn set_state(&self, state: PooledObjectState) {
        self.meta.lock().state = state;
    }

    pub(crate) fn attach(&mut self, return_fn: ReturnFn<T>) {
        self.return_fn = Some(return_fn);
    }

    pub(crate) fn detach(&mut self) {
        self.return_fn = None;
    }

    /// A second handle to the same pool member, used to exercise the
    /// duplicate-return guards.
    #[cfg(test)]
    pub(crate) fn forge_duplicate(&self, value: T) -> Self {
        Self {
            id: self.id,
            value: Some(value),
            meta: Arc::clone(&self.meta),
            return_fn: None,
        }
    }
}

impl<T> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<T> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledObject")
            .field("id", &self.id)
            .field("value", &self.value)
            .field("state", &self.state())
            .finish()
    }
}

impl<T> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if let Some(return_fn) = self.return_fn.take()
            && let Some(value) = self.value.take()
        {
            return_fn(PooledObject {
                id: self.id,
                value: Some(value),
                meta: Arc::clone(&self.meta),
                return_fn: None,
            });
        }
    }
}
