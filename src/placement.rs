//! Edge-ward module placement.
//!
//! Every module is anchored at the endpoint (sensor or actuator) nearest to
//! it in the application graph and placed on the anchor's node if it fits,
//! otherwise on the first ancestor with enough free capacity:
//!
//! ```text
//!   cloud    ▲  3. last resort
//!   gateway  │  2. parent has room?
//!   iotA     │  1. sensor's node has room?
//! ```
//!
//! # Ordering
//!
//! 1. Pinned modules, in declaration order. Pins bypass the search but not
//!    the capacity check.
//! 2. Modules reachable from sensor-origin edges, breadth-first in edge
//!    declaration order.
//! 3. Everything else, in declaration order.
//!
//! Ties between equally near anchors go to the endpoint edge declared
//! first. Placement runs on a scratch ledger; the topology's bookkeeping is
//! only updated once every module has a node.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::application::{Application, EdgeKind, Endpoint};
use crate::endpoint::{Actuator, Sensor};
use crate::error::{ConfigurationError, SimError, SimResult};
use crate::topology::Topology;
use crate::types::{ModuleName, NodeId, Resources};

/// Caller-supplied module → node overrides.
pub type PlacementPins = BTreeMap<ModuleName, NodeId>;

/// The resolved module → node assignment.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Placement {
    assignments: BTreeMap<ModuleName, NodeId>,
    /// Modules in the order they were committed
    order: Vec<ModuleName>,
}

impl Placement {
    /// Node hosting `module`.
    pub fn node_of(&self, module: &str) -> Option<NodeId> {
        self.assignments.get(module).copied()
    }

    /// `(module, node)` pairs in commit order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.order
            .iter()
            .map(move |m| (m.as_str(), self.assignments[m]))
    }

    /// Modules hosted on `node`, in commit order.
    pub fn modules_on(&self, node: NodeId) -> Vec<&str> {
        self.iter()
            .filter(|&(_, n)| n == node)
            .map(|(m, _)| m)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn assign(&mut self, module: &str, node: NodeId) {
        self.assignments.insert(module.to_string(), node);
        self.order.push(module.to_string());
    }
}

/// Where the search for a module starts.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Anchor {
    node: NodeId,
    distance: usize,
    /// Declaration index of the endpoint edge
    rank: usize,
}

impl Anchor {
    fn beats(&self, other: &Anchor) -> bool {
        (self.distance, self.rank) < (other.distance, other.rank)
    }
}

/// Computes an edge-ward placement without touching the topology.
pub fn plan(
    topology: &Topology,
    application: &Application,
    sensors: &[Sensor],
    actuators: &[Actuator],
    pins: &PlacementPins,
) -> SimResult<Placement> {
    for (module, &node) in pins {
        if application.module(module).is_none() {
            return Err(ConfigurationError::UnknownModuleReference {
                module: module.clone(),
                context: "placement pin".into(),
            }
            .into());
        }
        if topology.node(node).is_none() {
            return Err(ConfigurationError::UnknownNode(node.to_string()).into());
        }
    }

    let mut ledger: Vec<Resources> = topology.nodes().map(|n| n.free()).collect();
    let mut placement = Placement::default();

    for module in application.modules() {
        if let Some(&node) = pins.get(&module.name) {
            let free = ledger[node.index()];
            if !free.fits(&module.requirements) {
                return Err(SimError::PlacementInfeasible {
                    module: module.name.clone(),
                    reason: format!(
                        "pinned node {} has {:?} free, needs {:?}",
                        node, free, module.requirements
                    ),
                });
            }
            ledger[node.index()] = free.minus(&module.requirements);
            placement.assign(&module.name, node);
            tracing::info!(module = %module.name, %node, "pinned module");
        }
    }

    let (sensor_order, sensor_anchors) = sensor_side(application, sensors)?;
    let actuator_anchors = actuator_side(application, actuators)?;

    let mut order: Vec<&str> = sensor_order;
    let reached: HashSet<&str> = order.iter().copied().collect();
    order.extend(
        application
            .modules()
            .iter()
            .map(|m| m.name.as_str())
            .filter(|m| !reached.contains(m)),
    );

    let fallback_root = topology.roots().first().copied();

    for name in order {
        if placement.node_of(name).is_some() {
            continue;
        }
        let module = application
            .module(name)
            .ok_or_else(|| ConfigurationError::UnknownModuleReference {
                module: name.to_string(),
                context: "placement".into(),
            })?;

        let anchor = match (sensor_anchors.get(name), actuator_anchors.get(name)) {
            (Some(s), Some(a)) => Some(if a.beats(s) { *a } else { *s }),
            (Some(s), None) => Some(*s),
            (None, Some(a)) => Some(*a),
            (None, None) => None,
        };
        let start = match anchor.map(|a| a.node).or(fallback_root) {
            Some(node) => node,
            None => {
                return Err(SimError::PlacementInfeasible {
                    module: name.to_string(),
                    reason: "topology has no nodes".into(),
                })
            }
        };
        tracing::debug!(module = name, anchor = ?anchor, %start, "searching placement");

        let chosen = topology
            .ancestors(start)
            .into_iter()
            .find(|node| ledger[node.index()].fits(&module.requirements))
            .ok_or_else(|| SimError::PlacementInfeasible {
                module: name.to_string(),
                reason: format!(
                    "no node from {} up to the root has {:?} free",
                    start, module.requirements
                ),
            })?;

        ledger[chosen.index()] = ledger[chosen.index()].minus(&module.requirements);
        placement.assign(name, chosen);
        tracing::info!(module = name, node = %chosen, "placed module");
    }

    Ok(placement)
}

/// Computes an edge-ward placement and commits it to the topology.
///
/// On error the topology is left untouched.
pub fn resolve(
    topology: &mut Topology,
    application: &Application,
    sensors: &[Sensor],
    actuators: &[Actuator],
    pins: &PlacementPins,
) -> SimResult<Placement> {
    let placement = plan(topology, application, sensors, actuators, pins)?;
    for (module, node) in placement.iter() {
        if let Some(m) = application.module(module) {
            topology.commit(node, &m.requirements);
        }
    }
    Ok(placement)
}

/// Breadth-first walk downstream from sensor-origin edges.
///
/// Returns the visit order and the anchor of every reached module.
fn sensor_side<'a>(
    application: &'a Application,
    sensors: &[Sensor],
) -> SimResult<(Vec<&'a str>, HashMap<&'a str, Anchor>)> {
    let mut downstream: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in application.edges().iter().filter(|e| e.kind == EdgeKind::Module) {
        if let (Endpoint::Module(src), Endpoint::Module(dst)) = (&edge.source, &edge.destination) {
            downstream.entry(src.as_str()).or_default().push(dst.as_str());
        }
    }

    let mut seeds = Vec::new();
    for (rank, edge) in application.edges().iter().enumerate() {
        if let (EdgeKind::Sensor, Endpoint::Sensor(sensor), Endpoint::Module(module)) =
            (edge.kind, &edge.source, &edge.destination)
        {
            let node = sensors
                .iter()
                .find(|s| &s.name == sensor)
                .map(|s| s.node)
                .ok_or_else(|| ConfigurationError::UnknownSensor(sensor.clone()))?;
            seeds.push((module.as_str(), Anchor { node, distance: 0, rank }));
        }
    }

    Ok(breadth_first(seeds, &downstream))
}

/// Breadth-first walk upstream from actuator-destination edges.
fn actuator_side<'a>(
    application: &'a Application,
    actuators: &[Actuator],
) -> SimResult<HashMap<&'a str, Anchor>> {
    let mut upstream: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in application.edges().iter().filter(|e| e.kind == EdgeKind::Module) {
        if let (Endpoint::Module(src), Endpoint::Module(dst)) = (&edge.source, &edge.destination) {
            upstream.entry(dst.as_str()).or_default().push(src.as_str());
        }
    }

    let mut seeds = Vec::new();
    for (rank, edge) in application.edges().iter().enumerate() {
        if let (EdgeKind::Actuator, Endpoint::Module(module), Endpoint::Actuator(actuator)) =
            (edge.kind, &edge.source, &edge.destination)
        {
            let node = actuators
                .iter()
                .find(|a| &a.name == actuator)
                .map(|a| a.node)
                .ok_or_else(|| ConfigurationError::UnknownActuator(actuator.clone()))?;
            seeds.push((module.as_str(), Anchor { node, distance: 0, rank }));
        }
    }

    Ok(breadth_first(seeds, &upstream).1)
}

/// Multi-source BFS. Seeds are expanded in the order given, so at equal
/// distance the earliest seed claims a module first.
fn breadth_first<'a>(
    seeds: Vec<(&'a str, Anchor)>,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
) -> (Vec<&'a str>, HashMap<&'a str, Anchor>) {
    let mut order = Vec::new();
    let mut anchors: HashMap<&str, Anchor> = HashMap::new();
    let mut queue = VecDeque::new();

    for (module, anchor) in seeds {
        if !anchors.contains_key(module) {
            anchors.insert(module, anchor);
            order.push(module);
            queue.push_back(module);
        }
    }

    while let Some(module) = queue.pop_front() {
        let anchor = anchors[module];
        for &next in adjacency.get(module).map(Vec::as_slice).unwrap_or_default() {
            if anchors.contains_key(next) {
                continue;
            }
            anchors.insert(
                next,
                Anchor {
                    distance: anchor.distance + 1,
                    ..anchor
                },
            );
            order.push(next);
            queue.push_back(next);
        }
    }

    (order, anchors)
}
