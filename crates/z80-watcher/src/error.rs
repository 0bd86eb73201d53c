use std::fmt;

use thiserror::Error;

use crate::context::ContextSnapshot;
use crate::expectation::ExpectationError;
use crate::watch::WatchId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the watcher's own operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("the watcher has been disposed")]
    Disposed,

    #[error("symbol not found: {0}")]
    MissingSymbol(String),

    #[error("watch {0} no longer exists")]
    UnknownWatch(WatchId),

    #[error(transparent)]
    Expectation(#[from] ExpectationError),
}

/// Where in the dispatch of a watch an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// While evaluating the watch's predicate.
    Matching,
    /// While running one of the watch's callbacks.
    Callback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Matching => f.write_str("the matching predicate"),
            Phase::Callback => f.write_str("one of the callbacks"),
        }
    }
}

/// A predicate or callback failed while an event was being dispatched.
///
/// This is the error type the watcher hands back to the CPU, so it is what
/// `Z80::run` returns when a watch fails. The run is over at that point;
/// nothing is retried.
#[derive(Debug, Error)]
#[error("Unhandled error when invoking {phase} for the watch \"{watch_name}\": {source}")]
pub struct WatchExecutionError {
    pub watch_name: String,
    pub phase: Phase,
    /// The context as it was when the error was raised.
    pub context: ContextSnapshot,
    #[source]
    pub source: anyhow::Error,
}

impl WatchExecutionError {
    pub(crate) fn new(
        watch_name: &str,
        phase: Phase,
        context: ContextSnapshot,
        source: anyhow::Error,
    ) -> Self {
        Self {
            watch_name: watch_name.to_owned(),
            phase,
            context,
            source,
        }
    }

    #[must_use]
    pub fn during_matching(&self) -> bool {
        self.phase == Phase::Matching
    }
}
