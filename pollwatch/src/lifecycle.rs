//! Watcher lifecycle state machine.

use parking_lot::{Condvar, Mutex};

/// Lifecycle state of a [`PollWatcher`](crate::PollWatcher).
///
/// States only ever move forward, in declaration order. `Closing` and `Closed` may be reached
/// from any earlier state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// Built, roots may be registered, polling has not started.
    Idle,
    /// `start` is building the baseline snapshot.
    Populating,
    /// The baseline snapshot is in place; waiters are released.
    Ready,
    /// The poll loop is running.
    Running,
    /// Close was requested while the loop was active; it exits at its next safe point.
    Closing,
    /// Terminal.
    Closed,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: Mutex<State>,
    changed: Condvar,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Moves to `next` unless the current state is already at or past it.
    ///
    /// Returns the state found before the call.
    pub fn advance(&self, next: State) -> State {
        self.transition(|current| (next > current).then_some(next))
    }

    /// Atomically inspects the state and moves it to whatever `decide` returns.
    ///
    /// Transitions backwards are ignored. Returns the state found before the call.
    pub fn transition(&self, decide: impl FnOnce(State) -> Option<State>) -> State {
        let mut state = self.state.lock();
        let previous = *state;
        if let Some(next) = decide(previous) {
            if next > previous {
                log::trace!("watcher state {previous:?} -> {next:?}");
                *state = next;
                self.changed.notify_all();
            }
        }
        previous
    }

    /// Blocks until the state is at or past `target`.
    pub fn wait_for(&self, target: State) {
        let mut state = self.state.lock();
        while *state < target {
            self.changed.wait(&mut state);
        }
    }
}
