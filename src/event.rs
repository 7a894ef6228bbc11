//! Verification event system.

use crate::checker::Outcome;
use tokio::sync::broadcast;

/// Lifecycle state of one planned check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Not started.
    Pending,
    /// Waiting on the backend or on a coalesced lookup.
    Checking,
    /// Terminal: the check finished with this outcome.
    Done(Outcome),
}

impl CheckState {
    /// Returns true once the check has an outcome.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Events emitted during a verification run.
#[derive(Debug, Clone)]
pub enum VerifyEvent {
    /// The run has started.
    RunStarted {
        /// Number of planned checks.
        total: usize,
    },

    /// A check moved to a new state.
    CheckStateChanged {
        /// Position of the check in the matrix.
        index: usize,
        /// Check label.
        label: String,
        /// New state.
        state: CheckState,
    },

    /// The run has finished.
    RunFinished {
        /// Checks that passed.
        passed: usize,
        /// Checks that found the artifact missing.
        failed: usize,
        /// Checks that could not determine existence.
        errored: usize,
    },
}

/// Channel for receiving verification events.
pub type VerifyEventsChannel = broadcast::Receiver<VerifyEvent>;

/// Sender for verification events.
pub type VerifyEventsSender = broadcast::Sender<VerifyEvent>;

/// Minimum event channel capacity.
const MIN_CAPACITY: usize = 256;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (VerifyEventsSender, VerifyEventsChannel) {
    broadcast::channel(MIN_CAPACITY)
}

/// Create an event channel that can buffer a whole run of `total` checks.
///
/// Each check emits three state changes and the run adds two more, so a
/// subscriber that starts reading late never lags.
#[must_use]
pub fn create_run_event_channel(total: usize) -> (VerifyEventsSender, VerifyEventsChannel) {
    let capacity = total.saturating_mul(3).saturating_add(2).max(MIN_CAPACITY);
    broadcast::channel(capacity)
}
