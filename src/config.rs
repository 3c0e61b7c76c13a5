//! Pool configuration options

use crate::errors::{PoolError, PoolResult};

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Order in which idle objects are handed out.
///
/// Objects are always taken from the head of the idle queue; the policy
/// decides which end a returned object is put back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ObtainPolicy {
    /// Hand out the most recently returned object first.
    #[default]
    Lifo,

    /// Hand out the object that has been idle the longest first.
    Fifo,
}

/// Configuration for object pool behavior
///
/// The pool copies the configuration at construction time; changing a
/// `PoolConfig` afterwards has no effect on a running pool.
///
/// # Examples
///
/// ```
/// use objpool::{ObtainPolicy, PoolConfig};
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_capacity(10)
///     .with_min_idle(3)
///     .with_max_wait(Duration::from_millis(500))
///     .with_obtain_policy(ObtainPolicy::Fifo);
///
/// assert_eq!(config.capacity, 10);
/// assert_eq!(config.max_wait, Some(Duration::from_millis(500)));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Maximum number of live objects, idle and in use together
    pub capacity: usize,

    /// Number of idle objects the pool tries to keep around
    pub min_idle: usize,

    /// Upper bound on the idle queue; `None` means `capacity`
    pub max_idle: Option<usize>,

    /// How long a blocking acquire waits; `None` waits indefinitely
    pub max_wait: Option<Duration>,

    /// Idle objects older than this are evicted by the sweep
    pub max_idle_lifetime: Duration,

    /// Idle objects created longer ago than this are evicted by the sweep
    pub max_lifetime: Option<Duration>,

    /// Which idle object an acquire receives
    pub obtain_policy: ObtainPolicy,

    /// Wait for a returned object instead of failing when at capacity
    pub blocking: bool,

    /// Ask the factory to validate objects when they are returned
    pub validate_on_return: bool,

    /// Delay before the first background sweep
    pub eviction_initial_delay: Duration,

    /// Period of the background sweep; `None` disables the sweep thread
    pub eviction_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            min_idle: 2,
            max_idle: None,
            max_wait: Some(Duration::from_secs(10)),
            max_idle_lifetime: Duration::from_secs(60),
            max_lifetime: None,
            obtain_policy: ObtainPolicy::Lifo,
            blocking: true,
            validate_on_return: false,
            eviction_initial_delay: Duration::from_secs(1),
            eviction_interval: Some(Duration::from_secs(5)),
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the idle target the pool maintains
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Bound the idle queue below the capacity
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Set how long a blocking acquire may wait
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Let a blocking acquire wait until an object becomes available
    pub fn with_unbounded_wait(mut self) -> Self {
        self.max_wait = None;
        self
    }

    /// Set the maximum idle lifetime
    pub fn with_max_idle_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_idle_lifetime = lifetime;
        self
    }

    /// Set the maximum age of an idle object
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn with_obtain_policy(mut self, policy: ObtainPolicy) -> Self {
        self.obtain_policy = policy;
        self
    }

    /// Enable or disable waiting when the pool is at capacity
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_validate_on_return(mut self, validate: bool) -> Self {
        self.validate_on_return = validate;
        self
    }

    /// Configure the background sweep schedule
    ///
    /// # Examples
    ///
    /// ```
    /// use objpool::PoolConfig;
    /// use std::time::Duration;
    ///
    /// let config = PoolConfig::new()
    ///     .with_eviction_schedule(Duration::from_millis(100), Duration::from_secs(1));
    ///
    /// assert_eq!(config.eviction_initial_delay, Duration::from_millis(100));
    /// assert_eq!(config.eviction_interval, Some(Duration::from_secs(1)));
    /// ```
    pub fn with_eviction_schedule(mut self, initial_delay: Duration, interval: Duration) -> Self {
        self.eviction_initial_delay = initial_delay;
        self.eviction_interval = Some(interval);
        self
    }

    /// Turn off the background sweep
    pub fn without_eviction_thread(mut self) -> Self {
        self.eviction_interval = None;
        self
    }

    /// Effective bound on the idle queue.
    pub fn idle_bound(&self) -> usize {
        self.max_idle.unwrap_or(self.capacity)
    }

    /// Check the configuration for values the pool cannot run with.
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfiguration(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if self.min_idle > self.capacity {
            return Err(PoolError::InvalidConfiguration(format!(
                "min_idle ({}) must not exceed capacity ({})",
                self.min_idle, self.capacity
            )));
        }
        if let Some(max_idle) = self.max_idle
            && (max_idle == 0 || max_idle > self.capacity)
        {
            return Err(PoolError::InvalidConfiguration(format!(
                "max_idle ({}) must be between 1 and capacity ({})",
                max_idle, self.capacity
            )));
        }
        if self.min_idle > self.idle_bound() {
            return Err(PoolError::InvalidConfiguration(format!(
                "min_idle ({}) must not exceed max_idle ({})",
                self.min_idle,
                self.idle_bound()
            )));
        }
        if let Some(interval) = self.eviction_interval
            && interval.is_zero()
        {
            return Err(PoolError::InvalidConfiguration(
                "eviction_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
