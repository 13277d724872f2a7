//! Interrupt-safe event aggregation.
//!
//! Each endpoint owns one [`EventAggregator`].  Producers are the edge
//! ISR or periodic timer callback bound to the endpoint; the consumer is
//! the main loop, which periodically *harvests* the window.
//!
//! ```text
//! ┌─────────────┐  record()  ┌──────────────────────────┐  harvest()  ┌───────────┐
//! │ GPIO ISR    │──────────▶│ events · readings · t0   │───────────▶│ Main loop │
//! │ Timer cb    │──────────▶│ (critical-section cell)  │            │ (Bridge)  │
//! └─────────────┘            └──────────────────────────┘            └───────────┘
//! ```
//!
//! The harvest swap runs with interrupts masked, but only for the
//! capture-and-clear itself: the replacement buffer is allocated before
//! entering the critical section, so the masked window is a handful of
//! word moves regardless of how many readings were buffered.  Producers
//! never allocate: once the pre-sized buffer is full, further readings
//! are dropped and counted.

use core::cell::RefCell;
use core::mem;

use critical_section::Mutex;

use crate::endpoint::reading::Reading;

/// Default number of readings buffered between two harvests.
pub const DEFAULT_CAPACITY: usize = 32;

/// What a single producer invocation contributed.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The read function produced a reading.
    Reading(Reading),
    /// The event was counted but produced nothing (count-only endpoints).
    Empty,
    /// The read function failed; the event is still counted.
    Fault,
}

/// Everything captured by one harvest.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Events counted since the previous harvest.
    pub events: u32,
    /// Buffered readings in arrival order.
    pub readings: Vec<Reading>,
    /// Monotonic timestamp (ms) at which the window opened.
    pub window_start_ms: u64,
    /// Readings dropped because the buffer was full.
    pub dropped: u32,
    /// Read-function failures inside the window.
    pub faults: u32,
}

struct Window {
    events: u32,
    readings: Vec<Reading>,
    last_reset_ms: u64,
    dropped: u32,
    faults: u32,
}

/// Counter + reading buffer shared between callback context and the main loop.
pub struct EventAggregator {
    window: Mutex<RefCell<Window>>,
    capacity: usize,
}

impl EventAggregator {
    /// New empty aggregator whose first window opens at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, now_ms)
    }

    pub fn with_capacity(capacity: usize, now_ms: u64) -> Self {
        Self {
            window: Mutex::new(RefCell::new(Window {
                events: 0,
                readings: Vec::with_capacity(capacity),
                last_reset_ms: now_ms,
                dropped: 0,
                faults: 0,
            })),
            capacity,
        }
    }

    /// Producer side: count one event and keep its reading, if any.
    ///
    /// Safe to call from interrupt context.  Returns `false` if a reading
    /// had to be dropped because the buffer is full.
    pub fn record(&self, outcome: EventOutcome) -> bool {
        critical_section::with(|cs| {
            let mut w = self.window.borrow_ref_mut(cs);
            w.events = w.events.wrapping_add(1);
            match outcome {
                EventOutcome::Reading(reading) => {
                    if w.readings.len() < self.capacity {
                        w.readings.push(reading);
                        true
                    } else {
                        w.dropped = w.dropped.saturating_add(1);
                        false
                    }
                }
                EventOutcome::Empty => true,
                EventOutcome::Fault => {
                    w.faults = w.faults.saturating_add(1);
                    true
                }
            }
        })
    }

    /// Consumer side: capture the window and reset it atomically.
    ///
    /// `now_ms` becomes the start of the next window.
    pub fn harvest(&self, now_ms: u64) -> Snapshot {
        let fresh = Vec::with_capacity(self.capacity);
        critical_section::with(|cs| {
            let mut w = self.window.borrow_ref_mut(cs);
            Snapshot {
                events: mem::take(&mut w.events),
                readings: mem::replace(&mut w.readings, fresh),
                window_start_ms: mem::replace(&mut w.last_reset_ms, now_ms),
                dropped: mem::take(&mut w.dropped),
                faults: mem::take(&mut w.faults),
            }
        })
    }

    /// Events counted in the current window (non-destructive).
    pub fn pending_events(&self) -> u32 {
        critical_section::with(|cs| self.window.borrow_ref(cs).events)
    }

    /// Maximum readings held between two harvests.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
