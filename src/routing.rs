//! Multicast routing.
//!
//! An emitted tuple is copied onto every edge that leaves its source with
//! its type. Each copy is planned on its own: destination node, network
//! path, transfer and processing time. Nothing one edge costs can affect
//! another edge's arrival time.
//!
//! With the `parallel` feature, per-edge planning runs on rayon. Planning
//! is read-only and results are collected in edge declaration order, so
//! scheduling stays serial and deterministic either way.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use serde::Serialize;

use crate::application::{Application, Edge, EdgeId, Endpoint};
use crate::clock::EventClock;
use crate::endpoint::{Actuator, Sensor};
use crate::error::{ConfigurationError, SimResult};
use crate::event::{EventId, EventPayload};
use crate::placement::Placement;
use crate::services::CpuTimeEstimator;
use crate::topology::Topology;
use crate::tuple::Tuple;
use crate::types::{NodeId, SimTime};

/// One planned copy of a tuple travelling along one edge.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Delivery {
    /// Edge this copy travels along
    pub edge: EdgeId,
    pub tuple: Tuple,
    pub destination: Endpoint,
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub payload_size: f64,
    /// Sum of link latencies on the path
    pub latency: SimTime,
    /// Payload over the path bandwidth
    pub transfer_time: SimTime,
    /// CPU time at the destination module, zero for actuators
    pub processing_time: SimTime,
    pub sent_at: SimTime,
    pub arrival_at: SimTime,
}

impl Delivery {
    /// Time spent in the network (latency plus transfer).
    pub fn network_time(&self) -> SimTime {
        self.latency + self.transfer_time
    }
}

/// Plans deliveries over a resolved placement.
pub struct RoutingEngine<'a> {
    topology: &'a Topology,
    application: &'a Application,
    placement: &'a Placement,
    sensors: &'a [Sensor],
    actuators: &'a [Actuator],
    estimator: &'a dyn CpuTimeEstimator,
}

impl<'a> RoutingEngine<'a> {
    pub fn new(
        topology: &'a Topology,
        application: &'a Application,
        placement: &'a Placement,
        sensors: &'a [Sensor],
        actuators: &'a [Actuator],
        estimator: &'a dyn CpuTimeEstimator,
    ) -> Self {
        Self {
            topology,
            application,
            placement,
            sensors,
            actuators,
            estimator,
        }
    }

    /// Node an endpoint lives on.
    pub fn node_of(&self, endpoint: &Endpoint) -> SimResult<NodeId> {
        let node = match endpoint {
            Endpoint::Module(name) => self.placement.node_of(name).ok_or_else(|| {
                ConfigurationError::UnknownModuleReference {
                    module: name.clone(),
                    context: "routing to an unplaced module".into(),
                }
            })?,
            Endpoint::Sensor(name) => self
                .sensors
                .iter()
                .find(|s| &s.name == name)
                .map(|s| s.node)
                .ok_or_else(|| ConfigurationError::UnknownSensor(name.clone()))?,
            Endpoint::Actuator(name) => self
                .actuators
                .iter()
                .find(|a| &a.name == name)
                .map(|a| a.node)
                .ok_or_else(|| ConfigurationError::UnknownActuator(name.clone()))?,
        };
        Ok(node)
    }

    /// Plans one delivery per outgoing edge of `tuple`, in edge declaration
    /// order. An empty result means the source has no consumer for the type.
    pub fn plan(&self, tuple: &Tuple, now: SimTime) -> SimResult<Vec<Delivery>> {
        let from_node = self.node_of(&tuple.source)?;
        let edges = self.application.outgoing_edges(&tuple.source, &tuple.tuple_type);

        #[cfg(feature = "parallel")]
        let planned = edges
            .par_iter()
            .map(|&(id, edge)| self.plan_edge(id, edge, tuple, from_node, now))
            .collect::<SimResult<Vec<_>>>();

        #[cfg(not(feature = "parallel"))]
        let planned = edges
            .iter()
            .map(|&(id, edge)| self.plan_edge(id, edge, tuple, from_node, now))
            .collect::<SimResult<Vec<_>>>();

        planned
    }

    /// Schedules planned deliveries into `clock`, preserving their order.
    pub fn schedule<C: EventClock + ?Sized>(
        clock: &mut C,
        deliveries: Vec<Delivery>,
    ) -> Vec<EventId> {
        deliveries
            .into_iter()
            .map(|d| clock.schedule_at(d.arrival_at, EventPayload::TupleArrival(d)))
            .collect()
    }

    /// Plans and schedules `tuple`, returning the number of copies sent.
    pub fn route<C: EventClock + ?Sized>(&self, clock: &mut C, tuple: &Tuple) -> SimResult<usize> {
        let deliveries = self.plan(tuple, clock.current_time())?;
        let count = deliveries.len();
        Self::schedule(clock, deliveries);
        Ok(count)
    }

    fn plan_edge(
        &self,
        id: EdgeId,
        edge: &Edge,
        tuple: &Tuple,
        from_node: NodeId,
        now: SimTime,
    ) -> SimResult<Delivery> {
        let to_node = self.node_of(&edge.destination)?;
        let path = self.topology.path_between(from_node, to_node)?;

        let processing_time = match &edge.destination {
            Endpoint::Module(name) => {
                let module = self.application.module(name).ok_or_else(|| {
                    ConfigurationError::UnknownModuleReference {
                        module: name.clone(),
                        context: format!("edge {}", id),
                    }
                })?;
                let host = self
                    .topology
                    .node(to_node)
                    .ok_or_else(|| ConfigurationError::UnknownNode(to_node.to_string()))?;
                self.estimator
                    .estimate_processing_time(module, host, edge.cpu_length)
            }
            _ => 0.0,
        };

        let transfer_time = path.transfer_time(edge.payload_size);
        let arrival_at = now + path.latency + transfer_time + processing_time;
        tracing::debug!(
            edge = id,
            tuple = tuple.id,
            destination = %edge.destination,
            from = %from_node,
            to = %to_node,
            hops = path.hops.len(),
            arrival_at,
            "planned delivery"
        );

        Ok(Delivery {
            edge: id,
            tuple: tuple.clone(),
            destination: edge.destination.clone(),
            from_node,
            to_node,
            payload_size: edge.payload_size,
            latency: path.latency,
            transfer_time,
            processing_time,
            sent_at: now,
            arrival_at,
        })
    }
}
