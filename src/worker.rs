use crate::journal::Journal;
use crate::model::{ConsumeFailurePolicy, JournalEntry, WorkItem};
use crate::queue::Queue;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{debug, error, info, instrument, warn};

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
#[cfg(not(feature = "tracing"))]
macro_rules! error {
    ($($tt:tt)*) => {{}};
}

/// What happened to a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Consumed,
    FilterFailed,
    ConsumeFailed,
}

/// The single consumer: filters, consumes, journals and prunes, one item at a time.
pub(crate) struct Worker<T> {
    queue: Arc<Queue<T>>,
    journal: Journal<T>,
    on_consume_failure: ConsumeFailurePolicy,
}

impl<T: Send + 'static> Worker<T> {
    pub(crate) fn new(queue: Arc<Queue<T>>, on_consume_failure: ConsumeFailurePolicy) -> Self {
        Self {
            queue,
            journal: Journal::new(),
            on_consume_failure,
        }
    }

    /// Run until the queue is closed and drained
    pub(crate) fn run(mut self) {
        info!("Worker started");
        while let Some(item) = self.queue.take() {
            self.process(item);
        }
        info!(journal_len = self.journal.len(), "Worker stopped");
    }

    #[cfg_attr(feature = "tracing", instrument(skip(self, item), fields(seq = item.seq)))]
    pub(crate) fn process(&mut self, item: WorkItem<T>) -> Outcome {
        let WorkItem {
            seq,
            started_at,
            result,
            mut job,
        } = item;

        let past = self.journal.overlapping(started_at);
        debug!(overlapping = past.len(), "Filtering against journal");

        let filtered = match panic::catch_unwind(AssertUnwindSafe(|| job.filter(result, &past))) {
            Ok(filtered) => filtered,
            Err(_panic) => {
                // Fail closed: unfiltered data may contain duplicates.
                error!(
                    panic = %panic_message(_panic.as_ref()),
                    "Filter panicked - dropping item unconsumed"
                );
                self.finish(Outcome::FilterFailed);
                return Outcome::FilterFailed;
            }
        };

        let consumed = panic::catch_unwind(AssertUnwindSafe(|| job.consume(&filtered)));
        let ended_at = Instant::now();

        let outcome = match consumed {
            Ok(Ok(())) => {
                debug!("Consumed");
                Outcome::Consumed
            }
            Ok(Err(_err)) => {
                warn!(error = %_err, policy = ?self.on_consume_failure, "Consume failed");
                Outcome::ConsumeFailed
            }
            Err(_panic) => {
                error!(
                    panic = %panic_message(_panic.as_ref()),
                    policy = ?self.on_consume_failure,
                    "Consume panicked"
                );
                Outcome::ConsumeFailed
            }
        };

        if outcome == Outcome::Consumed || self.on_consume_failure == ConsumeFailurePolicy::Journal
        {
            self.journal.append(JournalEntry {
                seq,
                started_at,
                ended_at,
                result: filtered,
            });
        }

        self.finish(outcome);
        outcome
    }

    /// Prune the journal and publish the new state
    fn finish(&mut self, outcome: Outcome) {
        let _pruned = self.journal.prune(self.queue.earliest_pending());
        let journal_len = self.journal.len();
        debug!(pruned = _pruned, journal_len, "Pruned journal");

        self.queue.stats().send_modify(|stats| {
            stats.journal_len = journal_len;
            match outcome {
                Outcome::Consumed => stats.consumed += 1,
                Outcome::FilterFailed => stats.filter_failures += 1,
                Outcome::ConsumeFailed => stats.consume_failures += 1,
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn journal(&self) -> &Journal<T> {
        &self.journal
    }
}

#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
