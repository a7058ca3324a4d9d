//! Core type definitions for the fog simulation.
//!
//! This module defines the fundamental identifiers and units shared by the
//! topology, application graph, placement and routing layers.

use serde::{Deserialize, Serialize};

/// Simulation time unit (milliseconds of simulated time).
///
/// Path latencies, transfer times and processing times are all fractional,
/// so unlike cycle-driven engines the timeline is continuous.
pub type SimTime = f64;

/// Name of a module, unique within an application.
pub type ModuleName = String;

/// Label of a tuple type (e.g. `"SENSOR_DATA"`).
pub type TupleType = String;

/// Identifier carried by a tuple through every transformation and copy
/// that descends from a single sensor emission.
pub type CorrelationId = u64;

/// Unique identifier of a single tuple instance.
pub type TupleId = u64;

/// Identifier of a physical node in the topology.
///
/// Ids are assigned sequentially in registration order, so a lower id means
/// the node was declared earlier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Returns the raw index of this node.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Direction of travel through the topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward the root (cloud)
    Up,
    /// Toward the leaves (edge devices)
    Down,
}

/// Compute and memory amounts, used both for capacities and requirements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// Compute in MIPS
    pub compute: f64,
    /// Memory in MB
    pub memory: f64,
}

impl Resources {
    /// Creates a new resource amount.
    pub fn new(compute: f64, memory: f64) -> Self {
        Self { compute, memory }
    }

    /// Returns true if `self` can hold `required`.
    pub fn fits(&self, required: &Resources) -> bool {
        self.compute >= required.compute && self.memory >= required.memory
    }

    /// Returns `self - other`.
    pub fn minus(&self, other: &Resources) -> Resources {
        Resources::new(self.compute - other.compute, self.memory - other.memory)
    }

    /// Returns `self + other`.
    pub fn plus(&self, other: &Resources) -> Resources {
        Resources::new(self.compute + other.compute, self.memory + other.memory)
    }
}
