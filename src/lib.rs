//! # objpool
//!
//! Bounded, thread-safe object pool that caches expensive-to-create values,
//! hands them out under concurrent load and evicts the ones that sit idle for
//! too long.
//!
//! ## Features
//!
//! - Capacity bound over idle and checked-out objects together
//! - Minimum idle target, restored after every checkout and sweep
//! - Optional idle bound independent of the capacity
//! - LIFO or FIFO hand-out order
//! - Blocking acquisition with a timeout, or immediate failure
//! - Background idle-eviction thread that stops deterministically on close
//! - Factory hooks for creation, destruction, validation and (de)activation
//! - Automatic return of objects via RAII (Drop trait)
//! - Async acquisition on tokio
//! - Metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use objpool::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! let config = PoolConfig::new()
//!     .with_capacity(3)
//!     .with_min_idle(1)
//!     .with_max_wait(Duration::from_millis(500));
//!
//! let pool = Pool::from_fn(|| String::with_capacity(1024), config).unwrap();
//! {
//!     let mut buf = pool.get_object().unwrap();
//!     buf.push_str("hello");
//!     // Object automatically returned when `buf` goes out of scope
//! }
//! assert_eq!(pool.active_num(), 0);
//! pool.close();
//! ```

mod config;
mod errors;
mod eviction;
mod factory;
mod idle_queue;
mod metrics;
mod pool;
mod pooled;

pub use config::{ObtainPolicy, PoolConfig};
pub use errors::{BoxError, PoolError, PoolResult, SharedError};
pub use factory::{FnFactory, ObjectFactory};
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::Pool;
pub use pooled::{ObjectId, PooledObject, PooledObjectState};
