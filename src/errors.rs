//! Error types for the object pool

use crate::pooled::{ObjectId, PooledObjectState};

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by [`ObjectFactory`](crate::ObjectFactory) hooks.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared form of a foreign error, so that [`PoolError`] stays `Clone`.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to create a pooled object")]
    CreationFailed(#[source] SharedError),

    #[error("No idle object available and the pool is at capacity")]
    IdleSpaceExhausted,

    #[error("Object {id} is {actual}, expected {expected}")]
    IllegalState {
        id: ObjectId,
        actual: PooledObjectState,
        expected: PooledObjectState,
    },

    #[error("Object {0} is not part of this pool")]
    NotPartOfPool(ObjectId),

    #[error("Failed to destroy object {id}")]
    DestroyFailed {
        id: ObjectId,
        #[source]
        source: SharedError,
    },

    #[error("Pool is closed")]
    Closed,

    #[error("Wait for an idle object was interrupted")]
    WaitInterrupted,

    #[error("Failed to start the eviction thread")]
    EvictorSpawn(#[source] Arc<std::io::Error>),
}

impl PoolError {
    pub(crate) fn creation(err: BoxError) -> Self {
        PoolError::CreationFailed(Arc::from(err))
    }

    pub(crate) fn destroy(id: ObjectId, err: BoxError) -> Self {
        PoolError::DestroyFailed {
            id,
            source: Arc::from(err),
        }
    }

    /// Whether the caller may simply try the same operation again.
    ///
    /// Only exhaustion is transient; the other variants are either contract
    /// violations or failures of the factory itself.
    ///
    /// ```
    /// use objpool::PoolError;
    ///
    /// assert!(PoolError::IdleSpaceExhausted.is_retryable());
    /// assert!(!PoolError::Closed.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::IdleSpaceExhausted)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
