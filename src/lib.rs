//! Lethe - deduplicating sequential processor for overlapping snapshots
//!
//! Named after the river of forgetfulness, Lethe lets concurrent triggers each
//! compute a snapshot of changed entities and consumes those snapshots one at a
//! time on a single worker thread. Before a snapshot is consumed it is filtered
//! against the results of every item that completed after the snapshot started,
//! so data an overlapping earlier run already consumed is not consumed again.
//! Completed items are remembered only while some pending submission could
//! still overlap them.
//!
//! State lives in memory only: nothing survives a restart.
//!
//! # Example
//!
//! ```no_run
//! use lethe_rs::{Config, Lethe};
//! use std::collections::BTreeSet;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lethe: Lethe<BTreeSet<u64>> = Lethe::new(Config::default());
//! let handle = lethe.start()?;
//!
//! // Typically called from an event handler, possibly from many threads
//! lethe.submit(
//!     || Ok::<_, std::io::Error>(BTreeSet::from([1, 2, 3])), // recompute changed ids
//!     |_ids| {
//!         // persist the remaining ids
//!         Ok::<_, std::io::Error>(())
//!     },
//!     |current, past| {
//!         // drop whatever an overlapping earlier run already consumed
//!         current
//!             .into_iter()
//!             .filter(|id| !past.iter().any(|done| done.contains(id)))
//!             .collect()
//!     },
//! )?;
//!
//! handle.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod journal;
pub mod lethe;
pub mod model;
mod queue;
mod worker;

// Re-export commonly used types
pub use error::{BoxError, Error};
pub use journal::Journal;
pub use lethe::{Lethe, LetheHandle};
pub use model::{overlaps, Config, ConsumeFailurePolicy, FnJob, Job, JournalEntry, Stats};
