use crate::error::Error;
use crate::model::{Job, Stats, WorkItem};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

/// Blocking FIFO shared by the submitting threads and the worker.
///
/// Besides queued items it tracks submissions whose preprocessing is still
/// running: their start time is already fixed, so pruning must account for
/// them before they reach the queue.
pub(crate) struct Queue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    stats: watch::Sender<Stats>,
}

struct State<T> {
    pending: VecDeque<WorkItem<T>>,
    in_flight: BTreeMap<u64, Instant>,
    next_seq: u64,
    closed: bool,
}

impl<T> Queue<T> {
    pub(crate) fn new() -> Self {
        let (stats, _) = watch::channel(Stats::default());
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                in_flight: BTreeMap::new(),
                next_seq: 0,
                closed: false,
            }),
            available: Condvar::new(),
            stats,
        }
    }

    pub(crate) fn stats(&self) -> &watch::Sender<Stats> {
        &self.stats
    }

    // The protected state is never left half-updated, so a panic elsewhere
    // while holding the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish depth counters. Called with the lock held so snapshots are
    /// published in the order the changes happened.
    fn publish_depth(&self, state: &State<T>) {
        let queue_depth = state.pending.len();
        let in_flight = state.in_flight.len();
        self.stats.send_modify(|stats| {
            stats.queue_depth = queue_depth;
            stats.in_flight = in_flight;
        });
    }

    /// Register a new submission and fix its start time.
    ///
    /// The returned ticket deregisters the submission when dropped unless it
    /// was turned into a queued item.
    pub(crate) fn register(&self) -> Result<Ticket<'_, T>, Error> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::ShutDown);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let started_at = Instant::now();
        state.in_flight.insert(seq, started_at);
        self.publish_depth(&state);

        Ok(Ticket {
            queue: self,
            seq,
            started_at,
            enqueued: false,
        })
    }

    fn push(&self, item: WorkItem<T>) {
        let mut state = self.lock();
        state.in_flight.remove(&item.seq);
        state.pending.push_back(item);
        self.publish_depth(&state);
        self.available.notify_one();
    }

    fn abandon(&self, seq: u64) {
        let mut state = self.lock();
        state.in_flight.remove(&seq);
        self.publish_depth(&state);
        // A worker draining for shutdown may be waiting on this submission.
        self.available.notify_all();
    }

    /// Block until an item is available.
    ///
    /// Returns `None` once the queue is closed and nothing is queued or still
    /// preprocessing.
    pub(crate) fn take(&self) -> Option<WorkItem<T>> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.pending.pop_front() {
                self.publish_depth(&state);
                return Some(item);
            }
            if state.closed && state.in_flight.is_empty() {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Earliest start time among queued and in-flight submissions
    pub(crate) fn earliest_pending(&self) -> Option<Instant> {
        let state = self.lock();
        state
            .pending
            .iter()
            .map(|item| item.started_at)
            .chain(state.in_flight.values().copied())
            .min()
    }

    /// Refuse new submissions and let the worker exit once drained
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.available.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn depth(&self) -> usize {
        self.lock().pending.len()
    }
}

/// A registered submission whose preprocessing has not finished yet
pub(crate) struct Ticket<'a, T> {
    queue: &'a Queue<T>,
    seq: u64,
    started_at: Instant,
    enqueued: bool,
}

impl<T> Ticket<'_, T> {
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    #[cfg(test)]
    pub(crate) fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Hand the preprocessed result to the worker
    pub(crate) fn enqueue(mut self, result: T, job: Box<dyn Job<T>>) {
        self.enqueued = true;
        self.queue
            .push(WorkItem::new(self.seq, self.started_at, result, job));
    }
}

impl<T> Drop for Ticket<'_, T> {
    fn drop(&mut self) {
        if !self.enqueued {
            self.queue.abandon(self.seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::model::FnJob;

    fn noop_job() -> Box<dyn Job<u32>> {
        Box::new(FnJob::new(
            || Ok::<_, BoxError>(0),
            |_: &u32| Ok::<_, BoxError>(()),
            |current: u32, _: &[&u32]| -> u32 { current },
        ))
    }

    #[test]
    fn test_take_is_fifo() {
        let queue = Queue::new();
        for value in [10, 20, 30] {
            queue.register().unwrap().enqueue(value, noop_job());
        }

        let taken: Vec<u32> = (0..3).map(|_| queue.take().unwrap().result).collect();
        assert_eq!(taken, vec![10, 20, 30]);
    }

    #[test]
    fn test_register_assigns_increasing_seq_and_start() {
        let queue: Queue<u32> = Queue::new();
        let first = queue.register().unwrap();
        let second = queue.register().unwrap();

        assert!(first.seq() < second.seq());
        assert!(first.started_at() <= second.started_at());
    }

    #[test]
    fn test_in_flight_counts_towards_earliest_pending() {
        let queue: Queue<u32> = Queue::new();
        assert_eq!(queue.earliest_pending(), None);

        let early = queue.register().unwrap();
        let early_start = early.started_at();
        let late = queue.register().unwrap();
        let late_start = late.started_at();
        late.enqueue(1, noop_job());

        assert_eq!(queue.earliest_pending(), Some(early_start));
        assert_eq!(queue.stats().borrow().in_flight, 1);
        assert_eq!(queue.stats().borrow().queue_depth, 1);

        drop(early);
        assert_eq!(queue.stats().borrow().in_flight, 0);
        assert_eq!(queue.earliest_pending(), Some(late_start));
    }

    #[test]
    fn test_closed_queue_rejects_registration() {
        let queue: Queue<u32> = Queue::new();
        queue.close();

        assert!(queue.is_closed());
        assert!(matches!(queue.register(), Err(Error::ShutDown)));
    }

    #[test]
    fn test_closed_queue_drains_before_returning_none() {
        let queue = Queue::new();
        queue.register().unwrap().enqueue(7, noop_job());
        queue.close();

        assert_eq!(queue.take().map(|item| item.result), Some(7));
        assert!(queue.take().is_none());
    }

    #[test]
    fn test_take_waits_for_in_flight_after_close() {
        let queue = std::sync::Arc::new(Queue::new());
        let ticket_queue = std::sync::Arc::clone(&queue);

        let (registered_tx, registered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let submitter = std::thread::spawn(move || {
            let ticket = ticket_queue.register().unwrap();
            registered_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            ticket.enqueue(42, noop_job());
        });

        registered_rx.recv().unwrap();
        queue.close();
        release_tx.send(()).unwrap();

        assert_eq!(queue.take().map(|item| item.result), Some(42));
        assert!(queue.take().is_none());
        submitter.join().unwrap();
    }
}
