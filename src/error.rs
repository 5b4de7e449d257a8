//! Error types.
//!
//! The end of the stream is not an error: [`HandoffChannel::take()`](crate::HandoffChannel::take)
//! reports it as `None`. The types here cover bounded waits running out and the
//! [`driver`](crate::driver) failing.

use std::fmt;
use std::io;

use thiserror::Error;

/// A bounded [`take`](crate::HandoffChannel::take_timeout) gave up while the channel was still open.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("timed out waiting for an item")]
pub struct TimedOut;

/// A bounded [`publish`](crate::HandoffChannel::publish_timeout) gave up because the slot stayed full.
///
/// Carries the value that could not be published.
#[derive(Error, PartialEq, Eq)]
#[error("timed out waiting for an empty slot")]
pub struct PublishTimeoutError<T>(pub T);

impl<T> PublishTimeoutError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for PublishTimeoutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishTimeoutError").finish_non_exhaustive()
    }
}

/// Failures of a producer/consumer [`run`](crate::driver::run).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DriverError {
    /// Without consumers the producer would block forever on its first item.
    #[error("at least one consumer is required")]
    NoConsumers,

    /// The source could not be read. The channel was still closed, so every consumer exited.
    #[error("source failed after {produced} items")]
    Source {
        produced: u64,
        #[source]
        error: io::Error,
    },

    /// A worker thread could not be started.
    #[error("failed to spawn a worker thread")]
    Spawn(#[source] io::Error),

    /// A worker thread panicked.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// Name of the thread.
        worker: String,
    },
}

impl DriverError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DriverError::NoConsumers => "driver_no_consumers",
            DriverError::Source { .. } => "driver_source",
            DriverError::Spawn(_) => "driver_spawn",
            DriverError::WorkerPanicked { .. } => "driver_worker_panicked",
        }
    }
}
