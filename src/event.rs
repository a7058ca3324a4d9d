//! Event definitions for the fog simulation.
//!
//! Events are the only way simulated time advances: a sensor firing or a
//! tuple arriving at its destination.

use std::cmp::Ordering;

use crate::routing::Delivery;
use crate::types::SimTime;

/// Strictly increasing identifier assigned by the clock on insertion.
///
/// Breaks ties between events scheduled at the same time, so equal-time
/// events fire in insertion (FIFO) order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// What happens when an event fires.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// A sensor emits its next tuple.
    SensorEmit { sensor: String },
    /// A tuple reaches its destination module or actuator.
    TupleArrival(Delivery),
}

impl EventPayload {
    /// Short label used in traces.
    pub fn label(&self) -> String {
        match self {
            EventPayload::SensorEmit { sensor } => format!("SensorEmit({})", sensor),
            EventPayload::TupleArrival(d) => format!(
                "TupleArrival({} -> {}, {})",
                d.tuple.source, d.destination, d.tuple.tuple_type
            ),
        }
    }
}

/// A scheduled event.
#[derive(Clone, Debug)]
pub struct Event {
    pub id: EventId,
    pub time: SimTime,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, time: SimTime, payload: EventPayload) -> Self {
        Self { id, time, payload }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

/// Reversed `(time, id)` ordering so that `BinaryHeap` pops the earliest
/// event first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
