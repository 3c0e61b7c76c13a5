// Sample driver: five threads share a pool of three sessions. The first
// thread holds its session for a while, so the later ones have to wait for
// it or give up once their wait budget runs out.
//
// Run with: RUST_LOG=objpool=debug cargo run

use objpool::{BoxError, ObjectFactory, Pool, PoolConfig, PoolError, PooledObject};

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Session {
    number: u32,
}

#[derive(Default)]
struct SessionFactory {
    next: AtomicU32,
}

impl ObjectFactory<Session> for SessionFactory {
    fn create(&self) -> Result<Session, BoxError> {
        let number = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        info!(session = number, "Opening session");
        Ok(Session { number })
    }

    fn destroy(&self, object: PooledObject<Session>) -> Result<(), BoxError> {
        info!(session = object.number, "Closing session");
        Ok(())
    }
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let config = PoolConfig::new()
        .with_capacity(3)
        .with_min_idle(1)
        .with_max_wait(Duration::from_millis(1500));
    let pool = Pool::new(SessionFactory::default(), config)?;
    info!(idle = pool.idle_num(), "Pool ready");

    let workers: Vec<_> = (0..5u64)
        .map(|worker| {
            let pool = pool.clone();
            thread::Builder::new()
                .name(format!("worker-{}", worker))
                .spawn(move || {
                    thread::sleep(Duration::from_millis(200 * worker));
                    match pool.get_object() {
                        Ok(session) => {
                            info!(session = session.number, active = pool.active_num(), "Got session");
                            let hold = if worker == 0 { 1000 } else { 3000 };
                            thread::sleep(Duration::from_millis(hold));
                            if let Err(err) = pool.return_object(session) {
                                warn!(error = %err, "Could not return session");
                            }
                        }
                        Err(err) => warn!(error = %err, retryable = err.is_retryable(), "No session"),
                    }
                })
                .expect("failed to spawn worker thread")
        })
        .collect();

    for worker in workers {
        let _ = worker.join();
    }

    info!(metrics = ?pool.metrics(), "Done");
    pool.close();
    Ok(())
}
