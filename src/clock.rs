//! The discrete-event clock.
//!
//! The core only needs to read the current time and schedule future events,
//! which is what [`EventClock`] exposes. [`EventQueue`] is the default
//! implementation: a min-heap keyed by `(time, insertion order)`, so two
//! runs with the same inputs dispatch events in exactly the same order.

use std::collections::BinaryHeap;

use crate::event::{Event, EventId, EventPayload};
use crate::types::SimTime;

/// Scheduling interface consumed by the routing engine and sensors.
pub trait EventClock {
    /// Schedules `payload` to fire at `time`.
    fn schedule_at(&mut self, time: SimTime, payload: EventPayload) -> EventId;

    /// The time of the event currently being processed.
    fn current_time(&self) -> SimTime;
}

/// Deterministic event queue.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: BinaryHeap<Event>,
    next_id: u64,
    now: SimTime,
    peak_len: usize,
}

impl EventQueue {
    /// Creates an empty queue at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops the earliest event and advances the clock to its time.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.queue.pop()?;
        self.now = self.now.max(event.time);
        Some(event)
    }

    /// Time of the earliest pending event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|e| e.time)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Largest number of simultaneously pending events seen.
    pub fn peak_len(&self) -> usize {
        self.peak_len
    }

    /// Moves the clock forward without firing anything.
    pub fn advance_to(&mut self, time: SimTime) {
        self.now = self.now.max(time);
    }

    /// Drains all pending events in dispatch order.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(e) = self.queue.pop() {
            events.push(e);
        }
        events
    }
}

impl EventClock for EventQueue {
    fn schedule_at(&mut self, time: SimTime, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        // Never schedule into the past.
        let time = time.max(self.now);
        self.queue.push(Event::new(id, time, payload));
        self.peak_len = self.peak_len.max(self.queue.len());
        id
    }

    fn current_time(&self) -> SimTime {
        self.now
    }
}
