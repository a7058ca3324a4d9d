//! Tuples: the typed messages that flow along application edges.

use serde::Serialize;

use crate::application::Endpoint;
use crate::types::{CorrelationId, SimTime, TupleId, TupleType};

/// One emitted tuple.
///
/// Multicast copies share the tuple; each delivery carries its own cost.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tuple {
    pub id: TupleId,
    /// Shared by every tuple descending from the same sensor emission
    pub correlation: CorrelationId,
    pub tuple_type: TupleType,
    /// Sensor or module that emitted it
    pub source: Endpoint,
    pub emitted_at: SimTime,
}

impl Tuple {
    pub fn new(
        id: TupleId,
        correlation: CorrelationId,
        tuple_type: impl Into<String>,
        source: Endpoint,
        emitted_at: SimTime,
    ) -> Self {
        Self {
            id,
            correlation,
            tuple_type: tuple_type.into(),
            source,
            emitted_at,
        }
    }

    /// Derives the output of a module that consumed `self`.
    ///
    /// The correlation id is carried over unchanged.
    pub fn derive(
        &self,
        id: TupleId,
        tuple_type: impl Into<String>,
        source: Endpoint,
        emitted_at: SimTime,
    ) -> Self {
        Self::new(id, self.correlation, tuple_type, source, emitted_at)
    }
}
