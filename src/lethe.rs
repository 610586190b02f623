use crate::error::{BoxError, Error};
use crate::model::{Config, FnJob, Job, Stats};
use crate::queue::Queue;
use crate::worker::Worker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::watch;

#[cfg(feature = "tracing")]
use tracing::{debug, info, instrument, warn};

// No-op macros when tracing is disabled
#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($tt:tt)*) => {{}};
}

/// Main Lethe API for deduplicated sequential processing.
///
/// Cheap to clone; every clone submits to the same queue and worker.
pub struct Lethe<T> {
    queue: Arc<Queue<T>>,
    config: Arc<Config>,
    started: Arc<AtomicBool>,
}

impl<T> Clone for Lethe<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            config: Arc::clone(&self.config),
            started: Arc::clone(&self.started),
        }
    }
}

impl<T> Lethe<T>
where
    T: Send + 'static,
{
    /// Create a new Lethe instance. Nothing is consumed until [`Lethe::start`].
    pub fn new(config: Config) -> Self {
        Self {
            queue: Arc::new(Queue::new()),
            config: Arc::new(config),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the worker thread.
    ///
    /// Items submitted before this call are consumed once the worker runs.
    /// Dropping the returned handle detaches the worker; it then lives until
    /// the process exits.
    pub fn start(&self) -> Result<LetheHandle<T>, Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let worker = Worker::new(Arc::clone(&self.queue), self.config.on_consume_failure);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run());

        match spawned {
            Ok(thread) => {
                info!(thread_name = %self.config.thread_name, "Started worker");
                Ok(LetheHandle {
                    queue: Arc::clone(&self.queue),
                    thread,
                })
            }
            Err(err) => {
                self.started.store(false, Ordering::SeqCst);
                Err(Error::Spawn(err))
            }
        }
    }

    /// Preprocess on the calling thread and queue the result for consumption.
    ///
    /// `consume` runs once, on the worker thread, with what `filter` returns.
    /// `filter` receives the raw result together with the consumed results of
    /// every item that completed after this submission started, and must
    /// return what is left to consume. The two callbacks may fail with
    /// different error types.
    ///
    /// A preprocessing error is returned here and leaves no trace in the
    /// processor. A panic in `preprocess` unwinds into the caller the same way.
    pub fn submit<P, C, F, EP, EC>(&self, preprocess: P, consume: C, filter: F) -> Result<(), Error>
    where
        EP: Into<BoxError>,
        EC: Into<BoxError>,
        P: FnOnce() -> Result<T, EP> + Send + 'static,
        C: FnMut(&T) -> Result<(), EC> + Send + 'static,
        F: Fn(T, &[&T]) -> T + Send + 'static,
    {
        self.submit_job(FnJob::new(preprocess, consume, filter))
    }

    /// Like [`Lethe::submit`], for a [`Job`] implementation
    #[cfg_attr(feature = "tracing", instrument(skip(self, job)))]
    pub fn submit_job<J>(&self, mut job: J) -> Result<(), Error>
    where
        J: Job<T>,
    {
        let ticket = self.queue.register()?;
        debug!(seq = ticket.seq(), "Preprocessing");

        match job.preprocess() {
            Ok(result) => {
                debug!(seq = ticket.seq(), "Queued");
                ticket.enqueue(result, Box::new(job));
                Ok(())
            }
            Err(err) => {
                // Dropping the ticket deregisters the submission.
                warn!(seq = ticket.seq(), error = %err, "Preprocessing failed");
                Err(Error::Preprocessing(err))
            }
        }
    }

    /// Latest published state
    pub fn stats(&self) -> Stats {
        *self.queue.stats().borrow()
    }

    /// Receiver notified after every submission and every processed item
    pub fn subscribe(&self) -> watch::Receiver<Stats> {
        self.queue.stats().subscribe()
    }

    /// Items waiting for the worker
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<T: Send + 'static> Default for Lethe<T> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Owner of the running worker thread
pub struct LetheHandle<T> {
    queue: Arc<Queue<T>>,
    thread: JoinHandle<()>,
}

impl<T> LetheHandle<T> {
    /// Stop accepting submissions, let the worker drain what is already
    /// queued or preprocessing, and wait for it to exit.
    pub fn shutdown(self) -> Result<(), Error> {
        info!("Shutting down worker");
        self.queue.close();
        self.thread
            .join()
            .map_err(|_| Error::Internal("worker thread panicked".to_string()))
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

impl<T> std::fmt::Debug for LetheHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LetheHandle")
            .field("thread", &self.thread.thread().name())
            .finish_non_exhaustive()
    }
}
