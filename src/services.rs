//! Services the core consumes from its surroundings.
//!
//! - [`LinkRegistry`]: latency and bandwidth of directly linked nodes,
//!   applied to the topology during construction.
//! - [`CpuTimeEstimator`]: how long a module takes to process a tuple on
//!   its host node.
//!
//! The default implementations are deliberately simple; callers with a
//! richer host model plug in their own estimator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::application::Module;
use crate::topology::PhysicalNode;
use crate::types::{NodeId, SimTime};

/// Latency and bandwidth of one direct link.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub latency: SimTime,
    pub bandwidth: f64,
}

/// Registry of direct links between nodes.
///
/// Links are undirected: `(a, b)` and `(b, a)` name the same link, and
/// registering it again replaces the previous spec.
#[derive(Clone, Debug, Default)]
pub struct LinkRegistry {
    links: BTreeMap<(NodeId, NodeId), LinkSpec>,
}

impl LinkRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a link between `a` and `b`.
    pub fn add_link(&mut self, a: NodeId, b: NodeId, latency: SimTime, bandwidth: f64) {
        self.links
            .insert(Self::key(a, b), LinkSpec { latency, bandwidth });
    }

    /// Looks up the link between two directly linked nodes.
    pub fn latency_and_bandwidth(&self, a: NodeId, b: NodeId) -> Option<LinkSpec> {
        self.links.get(&Self::key(a, b)).copied()
    }

    /// Iterates registered links in key order.
    pub fn links(&self) -> impl Iterator<Item = ((NodeId, NodeId), LinkSpec)> + '_ {
        self.links.iter().map(|(&key, &spec)| (key, spec))
    }

    /// Number of registered links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Returns true if no link is registered.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    fn key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Estimates tuple processing time for a module hosted on a node.
pub trait CpuTimeEstimator: Send + Sync {
    /// Time for `module` on `node` to execute `cpu_length` instructions
    /// (in millions of instructions).
    fn estimate_processing_time(
        &self,
        module: &Module,
        node: &PhysicalNode,
        cpu_length: f64,
    ) -> SimTime;
}

/// Divides the tuple's CPU length by the MIPS available to the module.
///
/// A module runs at its own requested MIPS, capped by the host's total
/// compute. A module with no compute allocation processes instantly.
#[derive(Clone, Copy, Debug, Default)]
pub struct MipsEstimator;

impl CpuTimeEstimator for MipsEstimator {
    fn estimate_processing_time(
        &self,
        module: &Module,
        node: &PhysicalNode,
        cpu_length: f64,
    ) -> SimTime {
        let mips = module.requirements.compute.min(node.capacity.compute);
        if cpu_length <= 0.0 || mips <= 0.0 {
            0.0
        } else {
            cpu_length / mips
        }
    }
}

/// Ignores CPU cost entirely; useful to isolate network timing.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroCpuEstimator;

impl CpuTimeEstimator for ZeroCpuEstimator {
    fn estimate_processing_time(&self, _: &Module, _: &PhysicalNode, _: f64) -> SimTime {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_registry_is_undirected() {
        let mut registry = LinkRegistry::new();
        registry.add_link(NodeId(2), NodeId(1), 2.0, 1000.0);

        let spec = registry.latency_and_bandwidth(NodeId(1), NodeId(2)).unwrap();
        assert_eq!(spec.latency, 2.0);
        assert_eq!(spec.bandwidth, 1000.0);
        assert_eq!(registry.latency_and_bandwidth(NodeId(2), NodeId(1)), Some(spec));
        assert!(registry.latency_and_bandwidth(NodeId(0), NodeId(1)).is_none());

        registry.add_link(NodeId(1), NodeId(2), 4.0, 10.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mips_estimator() {
        let node = PhysicalNode::new("iotA", 2).with_capacity(2000.0, 1024.0);
        let module = Module::new("sender", 1000.0, 10.0);
        assert_eq!(MipsEstimator.estimate_processing_time(&module, &node, 1000.0), 1.0);

        let greedy = Module::new("greedy", 4000.0, 10.0);
        assert_eq!(MipsEstimator.estimate_processing_time(&greedy, &node, 1000.0), 0.5);

        let idle = Module::new("idle", 0.0, 0.0);
        assert_eq!(MipsEstimator.estimate_processing_time(&idle, &node, 1000.0), 0.0);
        assert_eq!(ZeroCpuEstimator.estimate_processing_time(&module, &node, 1000.0), 0.0);
    }
}
