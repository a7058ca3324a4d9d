//! Physical topology: a forest of fog nodes joined by parent links.
//!
//! Every node except a root has exactly one parent, and its tier level is
//! strictly greater than its parent's. Because parents must be registered
//! before their children, the parent relation can never contain a cycle.
//!
//! # Paths
//!
//! Traffic between two nodes climbs from the source to the nearest common
//! ancestor and then descends to the destination:
//!
//! ```text
//!            cloud (0)
//!              │
//!           gateway (1)        iotA → gateway → iotB
//!            ╱     ╲           latency   = 2.0 + 2.0
//!      iotA (2)   iotB (2)     bandwidth = min(up(iotA), down(gateway))
//! ```
//!
//! Each parent link has one latency, used in both directions, so path
//! latency is symmetric. An up hop is limited by the child's uplink
//! bandwidth, a down hop by the parent's downlink bandwidth.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{ConfigurationError, SimError, SimResult};
use crate::services::LinkRegistry;
use crate::types::{Direction, NodeId, Resources, SimTime};

/// A physical device in the fog hierarchy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhysicalNode {
    /// Identifier assigned by the topology on registration
    pub id: NodeId,
    /// Unique human-readable name (e.g. "gateway")
    pub name: String,
    /// Parent node, `None` for a root
    pub parent: Option<NodeId>,
    /// Tier level, 0 is the topmost tier
    pub level: u32,
    /// Total compute and memory
    pub capacity: Resources,
    /// Bandwidth toward the parent
    pub uplink_bandwidth: f64,
    /// Bandwidth toward the children
    pub downlink_bandwidth: f64,
    /// Latency of the link to the parent
    pub uplink_latency: SimTime,
    /// Resources committed by placement
    #[serde(default)]
    committed: Resources,
}

impl PhysicalNode {
    /// Creates a node with no capacity and unconstrained links.
    pub fn new(name: impl Into<String>, level: u32) -> Self {
        Self {
            id: NodeId(0),
            name: name.into(),
            parent: None,
            level,
            capacity: Resources::default(),
            uplink_bandwidth: f64::INFINITY,
            downlink_bandwidth: f64::INFINITY,
            uplink_latency: 0.0,
            committed: Resources::default(),
        }
    }

    /// Sets compute (MIPS) and memory capacity.
    pub fn with_capacity(mut self, compute: f64, memory: f64) -> Self {
        self.capacity = Resources::new(compute, memory);
        self
    }

    /// Sets uplink bandwidth and the latency of the link to the parent.
    pub fn with_uplink(mut self, bandwidth: f64, latency: SimTime) -> Self {
        self.uplink_bandwidth = bandwidth;
        self.uplink_latency = latency;
        self
    }

    /// Sets downlink bandwidth.
    pub fn with_downlink(mut self, bandwidth: f64) -> Self {
        self.downlink_bandwidth = bandwidth;
        self
    }

    /// Resources committed to placed modules.
    pub fn committed(&self) -> Resources {
        self.committed
    }

    /// Capacity not yet committed to placed modules.
    pub fn free(&self) -> Resources {
        self.capacity.minus(&self.committed)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |name: &'static str, reason: &str| ConfigurationError::InvalidParameter {
            owner: format!("node '{}'", self.name),
            name,
            reason: reason.to_string(),
        };

        if !(self.capacity.compute.is_finite() && self.capacity.compute >= 0.0) {
            return Err(invalid("compute", "must be finite and non-negative"));
        }
        if !(self.capacity.memory.is_finite() && self.capacity.memory >= 0.0) {
            return Err(invalid("memory", "must be finite and non-negative"));
        }
        if !(self.uplink_bandwidth > 0.0) {
            return Err(invalid("uplink_bandwidth", "must be positive"));
        }
        if !(self.downlink_bandwidth > 0.0) {
            return Err(invalid("downlink_bandwidth", "must be positive"));
        }
        if !(self.uplink_latency.is_finite() && self.uplink_latency >= 0.0) {
            return Err(invalid("uplink_latency", "must be finite and non-negative"));
        }
        Ok(())
    }
}

/// Cost of the link between a child and its parent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkCost {
    /// One-way latency, same in both directions
    pub latency: SimTime,
    /// Bandwidth for child → parent traffic
    pub up_bandwidth: f64,
    /// Bandwidth for parent → child traffic
    pub down_bandwidth: f64,
}

/// One traversed link on a path.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Hop {
    pub from: NodeId,
    pub to: NodeId,
    pub direction: Direction,
    pub latency: SimTime,
    pub bandwidth: f64,
}

/// The unique tree path between two nodes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetworkPath {
    /// Traversed links in order
    pub hops: Vec<Hop>,
    /// Sum of hop latencies
    pub latency: SimTime,
    /// Minimum hop bandwidth (infinite for a local path)
    pub bandwidth: f64,
}

impl NetworkPath {
    /// A path that never leaves its node.
    pub fn local() -> Self {
        Self {
            hops: Vec::new(),
            latency: 0.0,
            bandwidth: f64::INFINITY,
        }
    }

    /// Returns true if no link is traversed.
    pub fn is_local(&self) -> bool {
        self.hops.is_empty()
    }

    /// Time to push `payload` through the tightest link.
    pub fn transfer_time(&self, payload: f64) -> SimTime {
        if payload <= 0.0 || self.bandwidth.is_infinite() {
            0.0
        } else {
            payload / self.bandwidth
        }
    }

    /// Latency plus transfer time for `payload`.
    pub fn cost(&self, payload: f64) -> SimTime {
        self.latency + self.transfer_time(payload)
    }
}

/// The physical topology.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    nodes: Vec<PhysicalNode>,
    /// Link to parent, indexed by child id
    links: HashMap<NodeId, LinkCost>,
    by_name: HashMap<String, NodeId>,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node` under `parent` and returns its assigned id.
    ///
    /// The parent must already be registered.
    pub fn add_node(
        &mut self,
        mut node: PhysicalNode,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ConfigurationError> {
        if self.by_name.contains_key(&node.name) {
            return Err(ConfigurationError::DuplicateDeclaration {
                kind: "node",
                name: node.name,
            });
        }
        node.validate()?;

        let id = NodeId(self.nodes.len() as u32);
        if let Some(parent_id) = parent {
            let parent_node = self.nodes.get(parent_id.index()).ok_or_else(|| {
                ConfigurationError::CycleOrMissingParent {
                    node: node.name.clone(),
                    parent: parent_id,
                }
            })?;
            if node.level <= parent_node.level {
                return Err(ConfigurationError::InvalidTier {
                    node: node.name,
                    level: node.level,
                    parent_level: parent_node.level,
                });
            }
            self.links.insert(
                id,
                LinkCost {
                    latency: node.uplink_latency,
                    up_bandwidth: node.uplink_bandwidth,
                    down_bandwidth: parent_node.downlink_bandwidth,
                },
            );
        }

        node.id = id;
        node.parent = parent;
        node.committed = Resources::default();
        self.by_name.insert(node.name.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Returns a node by id.
    pub fn node(&self, id: NodeId) -> Option<&PhysicalNode> {
        self.nodes.get(id.index())
    }

    /// Returns a node by name.
    pub fn node_by_name(&self, name: &str) -> Option<&PhysicalNode> {
        self.by_name.get(name).and_then(|&id| self.node(id))
    }

    /// Resolves a node name to its id.
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Iterates nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &PhysicalNode> {
        self.nodes.iter()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no node is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root nodes in registration order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.parent.is_none())
            .map(|n| n.id)
            .collect()
    }

    /// Direct children of `id` in registration order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.parent == Some(id))
            .map(|n| n.id)
            .collect()
    }

    /// Cost of the link between `child` and its parent.
    pub fn link(&self, child: NodeId) -> Option<&LinkCost> {
        self.links.get(&child)
    }

    /// The chain `id, parent(id), ..., root`.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.node(id).map(|n| n.id);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.nodes[current.index()].parent;
        }
        chain
    }

    /// Computes the path from `a` to `b` through their nearest common ancestor.
    pub fn path_between(&self, a: NodeId, b: NodeId) -> SimResult<NetworkPath> {
        let unreachable = || SimError::UnreachableNode { from: a, to: b };
        if self.node(a).is_none() || self.node(b).is_none() {
            return Err(unreachable());
        }
        if a == b {
            return Ok(NetworkPath::local());
        }

        let up_chain = self.ancestors(a);
        let down_chain = self.ancestors(b);
        let on_up_chain: HashSet<NodeId> = up_chain.iter().copied().collect();
        let (down_pos, common) = down_chain
            .iter()
            .enumerate()
            .find(|(_, id)| on_up_chain.contains(id))
            .map(|(pos, &id)| (pos, id))
            .ok_or_else(unreachable)?;

        let mut hops = Vec::new();
        for &child in up_chain.iter().take_while(|&&id| id != common) {
            let link = self.links[&child];
            hops.push(Hop {
                from: child,
                to: self.nodes[child.index()].parent.ok_or_else(unreachable)?,
                direction: Direction::Up,
                latency: link.latency,
                bandwidth: link.up_bandwidth,
            });
        }
        for &child in down_chain[..down_pos].iter().rev() {
            let link = self.links[&child];
            hops.push(Hop {
                from: self.nodes[child.index()].parent.ok_or_else(unreachable)?,
                to: child,
                direction: Direction::Down,
                latency: link.latency,
                bandwidth: link.down_bandwidth,
            });
        }

        let latency = hops.iter().map(|h| h.latency).sum();
        let bandwidth = hops
            .iter()
            .map(|h| h.bandwidth)
            .fold(f64::INFINITY, f64::min);
        Ok(NetworkPath {
            hops,
            latency,
            bandwidth,
        })
    }

    /// Applies direct links from the registry to the parent links.
    ///
    /// A registered link overrides the latency and caps both bandwidths.
    /// Every link is checked before any is applied.
    pub fn apply_links(&mut self, registry: &LinkRegistry) -> Result<(), ConfigurationError> {
        let mut updates = Vec::with_capacity(registry.len());
        for ((a, b), spec) in registry.links() {
            let child = match (self.node(a), self.node(b)) {
                (Some(na), Some(_)) if na.parent == Some(b) => a,
                (Some(_), Some(nb)) if nb.parent == Some(a) => b,
                _ => {
                    return Err(ConfigurationError::InvalidLink {
                        a: self.display_name(a),
                        b: self.display_name(b),
                    })
                }
            };
            let invalid = |name: &'static str, reason: &str| ConfigurationError::InvalidParameter {
                owner: format!("link {} <-> {}", self.display_name(a), self.display_name(b)),
                name,
                reason: reason.to_string(),
            };
            if !(spec.latency.is_finite() && spec.latency >= 0.0) {
                return Err(invalid("latency", "must be finite and non-negative"));
            }
            if !(spec.bandwidth > 0.0) {
                return Err(invalid("bandwidth", "must be positive"));
            }
            updates.push((child, spec));
        }

        for (child, spec) in updates {
            if let Some(link) = self.links.get_mut(&child) {
                link.latency = spec.latency;
                link.up_bandwidth = link.up_bandwidth.min(spec.bandwidth);
                link.down_bandwidth = link.down_bandwidth.min(spec.bandwidth);
            }
        }
        Ok(())
    }

    /// Free capacity of a node.
    pub fn free_capacity(&self, id: NodeId) -> Option<Resources> {
        self.node(id).map(PhysicalNode::free)
    }

    /// Records resources committed by placement.
    pub(crate) fn commit(&mut self, id: NodeId, resources: &Resources) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.committed = node.committed.plus(resources);
        }
    }

    fn display_name(&self, id: NodeId) -> String {
        self.node(id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}
