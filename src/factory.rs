//! Object factory contract supplied by pool users

use crate::errors::BoxError;
use crate::pooled::PooledObject;

/// Creates, checks and disposes of the objects a [`Pool`](crate::Pool) manages.
///
/// Only [`create`](ObjectFactory::create) is required. The remaining hooks
/// default to plain wrapping, dropping and no-op checks.
///
/// # Examples
///
/// ```
/// use objpool::{BoxError, ObjectFactory, Pool, PoolConfig, PooledObject};
///
/// struct Buffers;
///
/// impl ObjectFactory<Vec<u8>> for Buffers {
///     fn create(&self) -> Result<Vec<u8>, BoxError> {
///         Ok(Vec::with_capacity(4096))
///     }
///
///     fn passivate(&self, object: &mut PooledObject<Vec<u8>>) {
///         object.clear();
///     }
/// }
///
/// let pool: Pool<Vec<u8>> = Pool::new(Buffers, PoolConfig::new().without_eviction_thread()).unwrap();
/// let mut buf = pool.get_object().unwrap();
/// buf.extend_from_slice(b"hello");
/// pool.return_object(buf).unwrap();
///
/// let buf = pool.get_object().unwrap();
/// assert!(buf.is_empty());
/// ```
pub trait ObjectFactory<T>: Send + Sync {
    /// Construct a new raw value.
    fn create(&self) -> Result<T, BoxError>;

    /// Wrap a raw value. Must not do anything beyond building the wrapper.
    fn wrap(&self, value: T) -> PooledObject<T> {
        PooledObject::new(value)
    }

    fn make_object(&self) -> Result<PooledObject<T>, BoxError> {
        Ok(self.wrap(self.create()?))
    }

    /// Release whatever the wrapped value owns.
    ///
    /// Called at most once per object, after it has left both the idle queue
    /// and the registry.
    fn destroy(&self, object: PooledObject<T>) -> Result<(), BoxError> {
        drop(object);
        Ok(())
    }

    /// Whether the object is still fit to be pooled.
    fn validate(&self, _object: &PooledObject<T>) -> bool {
        true
    }

    /// Called on every checkout, before the caller sees the object.
    fn activate(&self, _object: &mut PooledObject<T>) {}

    /// Called on every return that re-queues the object.
    ///
    /// Runs while the pool's idle queue is locked, so it must not call back
    /// into the pool. Objects that are destroyed instead are not passivated.
    fn passivate(&self, _object: &mut PooledObject<T>) {}
}

/// Factory backed by a fallible closure.
///
/// # Examples
///
/// ```
/// use objpool::{BoxError, FnFactory, ObjectFactory};
///
/// let factory = FnFactory::new(|| -> Result<u32, BoxError> { Ok(7) });
/// assert_eq!(*factory.make_object().unwrap(), 7);
/// ```
pub struct FnFactory<F> {
    create: F,
}

impl<F> FnFactory<F> {
    pub fn new(create: F) -> Self {
        Self { create }
    }
}

impl<T, F> ObjectFactory<T> for FnFactory<F>
where
    F: Fn() -> Result<T, BoxError> + Send + Sync,
{
    fn create(&self) -> Result<T, BoxError> {
        (self.create)()
    }
}
