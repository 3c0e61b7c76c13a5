//! Idle-object expiry rules and the background sweep thread

use crate::pooled::ObjectMeta;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// When an idle object has outstayed its welcome.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvictionPolicy {
    pub max_idle_lifetime: Duration,
    pub max_lifetime: Option<Duration>,
}

impl EvictionPolicy {
    /// An object is expired once it has been idle for at least
    /// `max_idle_lifetime`, or has lived at least `max_lifetime`.
    pub fn is_expired(&self, meta: &ObjectMeta, now: Instant) -> bool {
        if now.saturating_duration_since(meta.last_idle) >= self.max_idle_lifetime {
            return true;
        }
        match self.max_lifetime {
            Some(ttl) => now.saturating_duration_since(meta.created_at) >= ttl,
            None => false,
        }
    }
}

/// Handle to the thread running the periodic sweep.
///
/// Dropping the handle (or calling [`Evictor::stop`]) disconnects the
/// shutdown channel, which wakes the thread immediately.
pub(crate) struct Evictor {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Evictor {
    /// Run `sweep` after `initial_delay` and then every `interval`, until it
    /// returns `false` or the evictor is stopped.
    pub fn spawn<F>(
        name: String,
        initial_delay: Duration,
        interval: Duration,
        mut sweep: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (shutdown, signal) = channel::bounded::<()>(1);
        let handle = thread::Builder::new().name(name).spawn(move || {
            let mut wait = initial_delay;
            loop {
                match signal.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => {
                        trace!("Running idle eviction sweep");
                        if !sweep() {
                            break;
                        }
                        wait = interval;
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("Eviction thread stopped");
        })?;

        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Stop the sweep and wait for the thread to exit.
    ///
    /// When called from the sweep thread itself the join is skipped; the
    /// thread exits on its own once the current sweep returns.
    pub fn stop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take()
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
    }
}

impl Drop for Evictor {
    fn drop(&mut self) {
        self.stop();
    }
}
