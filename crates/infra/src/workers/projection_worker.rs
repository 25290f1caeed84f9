use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

use woodhop_events::{EventBus, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic bus consumer loop.
///
/// - Subscribes to an event bus before returning, so nothing published after
///   `spawn` is missed
/// - Applies an idempotent handler for each message, retrying a failed one a
///   few times with backoff before giving up on it
/// - Supports graceful shutdown
/// - Runs inside the caller's tokio runtime context when there is one, so
///   handlers can reach runtime-backed stores
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread that processes messages from a bus subscription.
    ///
    /// `handler` must be idempotent (at-least-once delivery safe).
    pub fn spawn<M, B, H, E>(name: &'static str, bus: &B, mut handler: H) -> std::io::Result<WorkerHandle>
    where
        M: Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(&M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();
        let runtime = tokio::runtime::Handle::try_current().ok();

        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _guard = runtime.as_ref().map(|h| h.enter());
            worker_loop(name, sub, shutdown_rx, &mut handler)
        })?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

fn worker_loop<M, H, E>(name: &'static str, sub: Subscription<M>, shutdown_rx: mpsc::Receiver<()>, handler: &mut H)
where
    H: FnMut(&M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if !handle_with_retry(name, &msg, &shutdown_rx, handler) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Returns `false` when shutdown was requested while backing off.
fn handle_with_retry<M, H, E>(name: &'static str, msg: &M, shutdown_rx: &mpsc::Receiver<()>, handler: &mut H) -> bool
where
    H: FnMut(&M) -> Result<(), E>,
    E: core::fmt::Display,
{
    for attempt in 1..=MAX_ATTEMPTS {
        match handler(msg) {
            Ok(()) => return true,
            Err(err) if attempt < MAX_ATTEMPTS => {
                warn!(worker = name, attempt, error = %err, "worker handler failed, retrying");
                if shutdown_rx.recv_timeout(RETRY_BACKOFF * attempt).is_ok() {
                    return false;
                }
            }
            Err(err) => {
                error!(worker = name, attempts = MAX_ATTEMPTS, error = %err, "worker handler gave up on message");
            }
        }
    }
    true
}
