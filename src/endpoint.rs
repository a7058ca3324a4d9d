//! External endpoints: sensors that originate tuples and actuators that
//! consume them.

use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::types::{NodeId, TupleType};

/// A data source bound to a physical node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    /// Type of every tuple this sensor emits
    pub tuple_type: TupleType,
    /// Node the sensor is attached to
    pub node: NodeId,
    /// Time between emissions
    pub interval: Distribution,
}

impl Sensor {
    pub fn new(
        name: impl Into<String>,
        tuple_type: impl Into<String>,
        node: NodeId,
        interval: Distribution,
    ) -> Self {
        Self {
            name: name.into(),
            tuple_type: tuple_type.into(),
            node,
            interval,
        }
    }
}

/// A terminal consumer bound to a physical node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actuator {
    pub name: String,
    /// Type of tuple the actuator accepts
    pub tuple_type: TupleType,
    pub node: NodeId,
}

impl Actuator {
    pub fn new(name: impl Into<String>, tuple_type: impl Into<String>, node: NodeId) -> Self {
        Self {
            name: name.into(),
            tuple_type: tuple_type.into(),
            node,
        }
    }
}
