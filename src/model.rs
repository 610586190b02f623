use crate::error::BoxError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// A unit of deduplicated processing.
///
/// `preprocess` runs once on the submitting thread. `filter` and `consume` run
/// later on the worker thread, paired with the result that same `preprocess`
/// produced.
pub trait Job<T>: Send + 'static {
    /// Produce the raw snapshot
    fn preprocess(&mut self) -> Result<T, BoxError>;

    /// Remove from `current` everything already represented in `past`.
    ///
    /// `past` holds the consumed results of every completed item that finished
    /// after this job started, in completion order. Must not panic; a panic is
    /// treated as a filter failure and the item is dropped unconsumed.
    fn filter(&self, current: T, past: &[&T]) -> T;

    /// Apply the side effect to the filtered result
    fn consume(&mut self, filtered: &T) -> Result<(), BoxError>;
}

/// [`Job`] assembled from three closures
pub struct FnJob<P, C, F> {
    preprocess: Option<P>,
    consume: C,
    filter: F,
}

impl<P, C, F> FnJob<P, C, F> {
    pub fn new(preprocess: P, consume: C, filter: F) -> Self {
        Self {
            preprocess: Some(preprocess),
            consume,
            filter,
        }
    }
}

impl<T, EP, EC, P, C, F> Job<T> for FnJob<P, C, F>
where
    EP: Into<BoxError>,
    EC: Into<BoxError>,
    P: FnOnce() -> Result<T, EP> + Send + 'static,
    C: FnMut(&T) -> Result<(), EC> + Send + 'static,
    F: Fn(T, &[&T]) -> T + Send + 'static,
{
    fn preprocess(&mut self) -> Result<T, BoxError> {
        let preprocess = self
            .preprocess
            .take()
            .ok_or_else(|| BoxError::from("preprocess already ran"))?;
        preprocess().map_err(Into::into)
    }

    fn filter(&self, current: T, past: &[&T]) -> T {
        (self.filter)(current, past)
    }

    fn consume(&mut self, filtered: &T) -> Result<(), BoxError> {
        (self.consume)(filtered).map_err(Into::into)
    }
}

impl<P, C, F> fmt::Debug for FnJob<P, C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob")
            .field("preprocessed", &self.preprocess.is_none())
            .finish_non_exhaustive()
    }
}

/// A preprocessed submission waiting in the queue
pub struct WorkItem<T> {
    /// Submission sequence number, in registration order
    pub seq: u64,
    /// Captured before preprocessing began
    pub started_at: Instant,
    /// Raw preprocessing result
    pub result: T,
    pub(crate) job: Box<dyn Job<T>>,
}

impl<T> WorkItem<T> {
    pub(crate) fn new(seq: u64, started_at: Instant, result: T, job: Box<dyn Job<T>>) -> Self {
        Self {
            seq,
            started_at,
            result,
            job,
        }
    }
}

/// A completed item retained as dedup context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry<T> {
    pub seq: u64,
    pub started_at: Instant,
    /// When consumption finished
    pub ended_at: Instant,
    /// The filtered result that was consumed
    pub result: T,
}

impl<T: fmt::Debug> fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("seq", &self.seq)
            .field("started_at", &self.started_at)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// Whether a candidate that started at `started_at` may have observed data
/// already consumed by an item that finished at `ended_at`.
///
/// One-sided on purpose: only the candidate's start and the completed item's
/// end matter.
pub fn overlaps(started_at: Instant, ended_at: Instant) -> bool {
    started_at < ended_at
}

/// What the worker does with an item whose `consume` failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeFailurePolicy {
    /// Keep the filtered result as dedup context, as if consumed
    #[default]
    Journal,
    /// Forget the item; overlapping successors may consume its data again
    Discard,
}

/// Configuration for Lethe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the worker thread
    pub thread_name: String,
    /// Handling of failed consumption
    pub on_consume_failure: ConsumeFailurePolicy,
}

impl Config {
    pub fn new(thread_name: impl Into<String>, on_consume_failure: ConsumeFailurePolicy) -> Self {
        Self {
            thread_name: thread_name.into(),
            on_consume_failure,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_name: "lethe-worker".to_string(),
            on_consume_failure: ConsumeFailurePolicy::default(),
        }
    }
}

/// Snapshot of processor state, republished after every change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Items waiting in the queue
    pub queue_depth: usize,
    /// Submissions whose preprocessing is still running
    pub in_flight: usize,
    /// Entries currently retained in the journal
    pub journal_len: usize,
    /// Items consumed successfully
    pub consumed: u64,
    /// Items dropped because their filter panicked
    pub filter_failures: u64,
    /// Items whose consume returned an error or panicked
    pub consume_failures: u64,
}

impl Stats {
    /// Items the worker has finished with, whatever the outcome
    pub fn processed(&self) -> u64 {
        self.consumed + self.filter_failures + self.consume_failures
    }
}
