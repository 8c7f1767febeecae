//! Runtime-configurable operation filter.

use std::sync::atomic::{AtomicU32, Ordering};

use pollwatch_types::event::{Event, OpMask};

/// The set of operations delivered to consumers.
///
/// It may be replaced from any thread at any time. The poll loop reads it once per cycle, so a
/// new set applies from the next cycle on and a cycle never mixes two sets.
#[derive(Debug)]
pub(crate) struct OpFilter {
    bits: AtomicU32,
}

impl OpFilter {
    pub fn new(ops: OpMask) -> Self {
        Self {
            bits: AtomicU32::new(ops.bits()),
        }
    }

    pub fn configure(&self, ops: OpMask) {
        self.bits.store(ops.bits(), Ordering::Release);
    }

    pub fn current(&self) -> OpMask {
        OpMask::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }

    /// Drops every event the current set does not admit.
    pub fn screen(&self, mut events: Vec<Event>) -> Vec<Event> {
        let ops = self.current();
        if ops != OpMask::ALL {
            events.retain(|event| ops.matches(event.op));
        }
        events
    }
}

impl Default for OpFilter {
    fn default() -> Self {
        Self::new(OpMask::ALL)
    }
}
