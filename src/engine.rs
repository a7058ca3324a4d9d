//! The fog simulation: builder, context and event loop.
//!
//! [`SimulationBuilder`] collects the topology, application, endpoints and
//! placement pins. [`SimulationBuilder::resolve_placement`] validates the
//! declarations, places every module and returns a runnable
//! [`FogSimulation`].
//!
//! # Example
//!
//! ```
//! use fogtap::{Distribution, Edge, Module, PhysicalNode, SimulationBuilder, TupleMapping, Selectivity};
//! use fogtap::types::Direction;
//!
//! let mut b = SimulationBuilder::new("demo");
//! let cloud = b.add_node(PhysicalNode::new("cloud", 0).with_capacity(4000.0, 4096.0), None)?;
//! let edge = b.add_node(
//!     PhysicalNode::new("edge", 1).with_capacity(1000.0, 512.0).with_uplink(1000.0, 3.0),
//!     Some(cloud),
//! )?;
//! b.add_module(Module::new("filter", 500.0, 64.0))?;
//! b.add_edge(Edge::sensor("cam", "filter", "FRAME").with_cpu_length(500.0))?;
//! b.add_edge(Edge::actuator("filter", "screen", "ALERT"))?;
//! b.add_tuple_mapping(TupleMapping::new("filter", "FRAME", "ALERT", Selectivity::deterministic()))?;
//! b.add_sensor_at("cam", "FRAME", edge, Distribution::deterministic(10.0))?;
//! b.add_actuator_at("screen", "ALERT", edge)?;
//!
//! let mut sim = b.resolve_placement()?;
//! sim.run(105.0)?;
//! let report = sim.finish();
//! assert_eq!(report.stats.engine.actuator_consumptions, 10);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashSet;

use crate::application::{AppLoop, Application, Edge, EdgeKind, EdgeId, Endpoint, Module, TupleMapping};
use crate::clock::{EventClock, EventQueue};
use crate::distribution::Distribution;
use crate::endpoint::{Actuator, Sensor};
use crate::error::{ConfigurationError, SimResult};
use crate::event::{Event, EventPayload};
use crate::loops::{IncompleteLoopWarning, LoopLatencyAccumulator, LoopSample};
use crate::placement::{self, Placement, PlacementPins};
use crate::routing::{Delivery, RoutingEngine};
use crate::services::{CpuTimeEstimator, LinkRegistry, MipsEstimator};
use crate::stats::{DeliveryRecord, SimulationStats, StatsCollector};
use crate::topology::{PhysicalNode, Topology};
use crate::tuple::Tuple;
use crate::types::{CorrelationId, NodeId, SimTime, TupleId};

/// Mutable per-run state passed through the event loop: clock, RNG and id
/// counters.
#[derive(Debug)]
pub struct SimContext {
    pub clock: EventQueue,
    rng: ChaCha8Rng,
    seed: u64,
    next_tuple: TupleId,
    next_correlation: CorrelationId,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: EventQueue::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            next_tuple: 0,
            next_correlation: 0,
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.clock.current_time()
    }

    /// The seeded RNG.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_tuple_id(&mut self) -> TupleId {
        let id = self.next_tuple;
        self.next_tuple += 1;
        id
    }

    pub fn next_correlation(&mut self) -> CorrelationId {
        let id = self.next_correlation;
        self.next_correlation += 1;
        id
    }

    /// Keeps generated correlation ids clear of one chosen elsewhere.
    pub fn reserve_correlation(&mut self, correlation: CorrelationId) {
        self.next_correlation = self.next_correlation.max(correlation.saturating_add(1));
    }
}

/// Declares a fog scenario.
pub struct SimulationBuilder {
    name: String,
    topology: Topology,
    application: Application,
    sensors: Vec<Sensor>,
    actuators: Vec<Actuator>,
    pins: PlacementPins,
    links: LinkRegistry,
    estimator: Box<dyn CpuTimeEstimator>,
    seed: u64,
    loop_timeout: Option<SimTime>,
    record_deliveries: bool,
    config_file: Option<String>,
}

impl SimulationBuilder {
    /// Creates an empty scenario whose application is called `app_id`.
    pub fn new(app_id: impl Into<String>) -> Self {
        let app_id = app_id.into();
        Self {
            name: app_id.clone(),
            topology: Topology::new(),
            application: Application::new(app_id),
            sensors: Vec::new(),
            actuators: Vec::new(),
            pins: PlacementPins::new(),
            links: LinkRegistry::new(),
            estimator: Box::new(MipsEstimator),
            seed: 0,
            loop_timeout: None,
            record_deliveries: true,
            config_file: None,
        }
    }

    /// Sets the scenario name shown in reports.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Sets the RNG seed.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    /// Expires loop instances open for longer than `timeout`.
    pub fn loop_timeout(&mut self, timeout: Option<SimTime>) -> &mut Self {
        self.loop_timeout = timeout;
        self
    }

    /// Replaces the CPU time estimator.
    pub fn estimator(&mut self, estimator: Box<dyn CpuTimeEstimator>) -> &mut Self {
        self.estimator = estimator;
        self
    }

    /// Keeps or drops the per-delivery log in the report.
    pub fn record_deliveries(&mut self, enabled: bool) -> &mut Self {
        self.record_deliveries = enabled;
        self
    }

    pub(crate) fn config_file(&mut self, path: impl Into<String>) -> &mut Self {
        self.config_file = Some(path.into());
        self
    }

    /// Registers a physical node under `parent`.
    pub fn add_node(
        &mut self,
        node: PhysicalNode,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ConfigurationError> {
        self.topology.add_node(node, parent)
    }

    /// Resolves a node name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.topology.id_of(name)
    }

    pub fn add_module(&mut self, module: Module) -> Result<(), ConfigurationError> {
        self.application.add_module(module)
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, ConfigurationError> {
        self.application.add_edge(edge)
    }

    pub fn add_tuple_mapping(&mut self, mapping: TupleMapping) -> Result<(), ConfigurationError> {
        self.application.add_tuple_mapping(mapping)
    }

    pub fn set_loops(&mut self, loops: Vec<AppLoop>) -> Result<(), ConfigurationError> {
        self.application.set_loops(loops)
    }

    /// Registers a sensor.
    pub fn add_sensor(&mut self, sensor: Sensor) -> Result<(), ConfigurationError> {
        if self.sensors.iter().any(|s| s.name == sensor.name) {
            return Err(ConfigurationError::DuplicateDeclaration {
                kind: "sensor",
                name: sensor.name,
            });
        }
        if self.topology.node(sensor.node).is_none() {
            return Err(ConfigurationError::UnknownNode(sensor.node.to_string()));
        }
        sensor
            .interval
            .validate()
            .map_err(|reason| ConfigurationError::InvalidParameter {
                owner: format!("sensor '{}'", sensor.name),
                name: "interval",
                reason,
            })?;
        self.sensors.push(sensor);
        Ok(())
    }

    /// Shorthand for [`add_sensor`](Self::add_sensor).
    pub fn add_sensor_at(
        &mut self,
        name: impl Into<String>,
        tuple_type: impl Into<String>,
        node: NodeId,
        interval: Distribution,
    ) -> Result<(), ConfigurationError> {
        self.add_sensor(Sensor::new(name, tuple_type, node, interval))
    }

    /// Registers an actuator.
    pub fn add_actuator(&mut self, actuator: Actuator) -> Result<(), ConfigurationError> {
        if self.actuators.iter().any(|a| a.name == actuator.name) {
            return Err(ConfigurationError::DuplicateDeclaration {
                kind: "actuator",
                name: actuator.name,
            });
        }
        if self.topology.node(actuator.node).is_none() {
            return Err(ConfigurationError::UnknownNode(actuator.node.to_string()));
        }
        self.actuators.push(actuator);
        Ok(())
    }

    /// Shorthand for [`add_actuator`](Self::add_actuator).
    pub fn add_actuator_at(
        &mut self,
        name: impl Into<String>,
        tuple_type: impl Into<String>,
        node: NodeId,
    ) -> Result<(), ConfigurationError> {
        self.add_actuator(Actuator::new(name, tuple_type, node))
    }

    /// Forces `module` onto `node`. Checked during placement.
    pub fn pin(&mut self, module: impl Into<String>, node: NodeId) -> &mut Self {
        self.pins.insert(module.into(), node);
        self
    }

    /// Registers a direct link between a node and its parent.
    pub fn add_link(&mut self, a: NodeId, b: NodeId, latency: SimTime, bandwidth: f64) -> &mut Self {
        self.links.add_link(a, b, latency, bandwidth);
        self
    }

    /// Checks registered links against the topology without applying them.
    pub fn check_links(&self) -> Result<(), ConfigurationError> {
        self.topology.clone().apply_links(&self.links)
    }

    /// Validates the scenario, places every module and returns a runnable
    /// simulation. Nothing is committed if placement fails.
    pub fn resolve_placement(mut self) -> SimResult<FogSimulation> {
        if let Some(timeout) = self.loop_timeout {
            if !(timeout > 0.0) {
                return Err(ConfigurationError::InvalidParameter {
                    owner: format!("scenario '{}'", self.name),
                    name: "loop_timeout",
                    reason: format!("must be positive, got {}", timeout),
                }
                .into());
            }
        }
        self.topology.apply_links(&self.links)?;
        self.check_endpoints()?;

        let placement = placement::resolve(
            &mut self.topology,
            &self.application,
            &self.sensors,
            &self.actuators,
            &self.pins,
        )?;

        let mut stats = StatsCollector::new(&self.application);
        stats.set_name(self.name.clone());
        stats.set_seed(self.seed);
        stats.set_record_deliveries(self.record_deliveries);
        if let Some(path) = &self.config_file {
            stats.set_config_file(path.clone());
        }
        for (module, node) in placement.iter() {
            let node_name = self.topology.node(node).map(|n| n.name.as_str()).unwrap_or_default();
            stats.record_placement(module, node, node_name);
        }

        tracing::info!(
            scenario = %self.name,
            nodes = self.topology.len(),
            modules = placement.len(),
            sensors = self.sensors.len(),
            actuators = self.actuators.len(),
            "placement resolved"
        );

        let loops = LoopLatencyAccumulator::new(self.application.loops(), self.loop_timeout);
        Ok(FogSimulation {
            name: self.name,
            topology: self.topology,
            application: self.application,
            sensors: self.sensors,
            actuators: self.actuators,
            placement,
            estimator: self.estimator,
            ctx: SimContext::new(self.seed),
            loops,
            stats,
            started: false,
        })
    }

    /// Every endpoint edge must name a registered sensor or actuator with a
    /// matching tuple type.
    fn check_endpoints(&self) -> Result<(), ConfigurationError> {
        let mismatch = |edge: &Edge, declared: &str| ConfigurationError::InconsistentEdge {
            src: edge.source.to_string(),
            dst: edge.destination.to_string(),
            reason: format!(
                "edge carries '{}' but the endpoint is declared with '{}'",
                edge.tuple_type, declared
            ),
        };

        for edge in self.application.edges() {
            match (edge.kind, &edge.source, &edge.destination) {
                (EdgeKind::Sensor, Endpoint::Sensor(name), _) => {
                    let sensor = self
                        .sensors
                        .iter()
                        .find(|s| &s.name == name)
                        .ok_or_else(|| ConfigurationError::UnknownSensor(name.clone()))?;
                    if sensor.tuple_type != edge.tuple_type {
                        return Err(mismatch(edge, &sensor.tuple_type));
                    }
                }
                (EdgeKind::Actuator, _, Endpoint::Actuator(name)) => {
                    let actuator = self
                        .actuators
                        .iter()
                        .find(|a| &a.name == name)
                        .ok_or_else(|| ConfigurationError::UnknownActuator(name.clone()))?;
                    if actuator.tuple_type != edge.tuple_type {
                        return Err(mismatch(edge, &actuator.tuple_type));
                    }
                }
                _ => {}
            }
        }

        let fed: HashSet<&str> = self
            .application
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::Sensor)
            .map(|e| e.source.name())
            .collect();
        for sensor in &self.sensors {
            if !fed.contains(sensor.name.as_str()) {
                tracing::warn!(sensor = %sensor.name, "sensor has no outgoing edge");
            }
        }
        Ok(())
    }
}

/// Everything a finished run produced.
#[derive(Clone, Debug, Serialize)]
pub struct SimulationReport {
    pub placement: Placement,
    pub stats: SimulationStats,
    /// Completed loop instances in completion order
    pub loop_samples: Vec<LoopSample>,
    pub incomplete_loops: Vec<IncompleteLoopWarning>,
    /// Arrivals in dispatch order (empty if the log was disabled)
    pub deliveries: Vec<DeliveryRecord>,
}

impl SimulationReport {
    /// Arrivals at `destination` (module name, or `actuator:name`).
    pub fn deliveries_to<'a>(&'a self, destination: &'a str) -> impl Iterator<Item = &'a DeliveryRecord> + 'a {
        self.deliveries.iter().filter(move |d| d.destination == destination)
    }

    /// Exports the report as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A placed, runnable fog simulation.
pub struct FogSimulation {
    name: String,
    topology: Topology,
    application: Application,
    sensors: Vec<Sensor>,
    actuators: Vec<Actuator>,
    placement: Placement,
    estimator: Box<dyn CpuTimeEstimator>,
    ctx: SimContext,
    loops: LoopLatencyAccumulator,
    stats: StatsCollector,
    started: bool,
}

impl FogSimulation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn current_time(&self) -> SimTime {
        self.ctx.now()
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.ctx.clock.len()
    }

    /// Loop bookkeeping so far.
    pub fn loops(&self) -> &LoopLatencyAccumulator {
        &self.loops
    }

    /// Schedules each sensor's first emission, one sampled interval from now.
    ///
    /// Called by [`run`](Self::run) if needed.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.stats.start();
        let now = self.ctx.now();
        for sensor in &self.sensors {
            let at = now + sensor.interval.sample(&mut self.ctx.rng);
            self.ctx.clock.schedule_at(
                at,
                EventPayload::SensorEmit {
                    sensor: sensor.name.clone(),
                },
            );
        }
        tracing::info!(scenario = %self.name, sensors = self.sensors.len(), "simulation started");
    }

    /// Emits one tuple from `sensor` now under a fresh correlation id and
    /// routes it.
    ///
    /// Returns the number of copies sent. Does not schedule the sensor's
    /// next emission.
    pub fn emit_from_sensor(&mut self, sensor: &str) -> SimResult<usize> {
        let correlation = self.ctx.next_correlation();
        self.emit_from_sensor_with(sensor, correlation)
    }

    /// Like [`emit_from_sensor`](Self::emit_from_sensor), with the
    /// correlation id chosen by the caller. Later generated ids start above
    /// it.
    pub fn emit_from_sensor_with(&mut self, sensor: &str, correlation: CorrelationId) -> SimResult<usize> {
        let tuple_type = self
            .sensors
            .iter()
            .find(|s| s.name == sensor)
            .map(|s| s.tuple_type.clone())
            .ok_or_else(|| ConfigurationError::UnknownSensor(sensor.to_string()))?;

        let now = self.ctx.now();
        let id = self.ctx.next_tuple_id();
        self.ctx.reserve_correlation(correlation);
        let tuple = Tuple::new(id, correlation, tuple_type, Endpoint::Sensor(sensor.to_string()), now);
        self.stats.record_sensor_emission();
        tracing::debug!(sensor, tuple = id, correlation, now, "sensor emission");
        self.route(&tuple)
    }

    /// Processes the next event. Returns its time, or `None` if the queue is
    /// empty.
    pub fn step(&mut self) -> SimResult<Option<SimTime>> {
        let Some(event) = self.ctx.clock.pop_next() else {
            return Ok(None);
        };
        let time = event.time;
        self.dispatch(event)?;
        self.loops.expire(time);
        Ok(Some(time))
    }

    /// Processes every event scheduled at or before `max_time`, then moves
    /// the clock to `max_time`.
    pub fn run(&mut self, max_time: SimTime) -> SimResult<()> {
        self.start();
        while let Some(next) = self.ctx.clock.peek_time() {
            if next > max_time {
                break;
            }
            self.step()?;
        }
        self.ctx.clock.advance_to(max_time);
        tracing::info!(
            scenario = %self.name,
            now = self.ctx.now(),
            pending = self.ctx.clock.len(),
            "run finished"
        );
        Ok(())
    }

    /// Reports still-open loop instances and returns the run's results.
    pub fn finish(mut self) -> SimulationReport {
        let now = self.ctx.now();
        self.loops.finish(now);
        self.stats.stop(
            now,
            self.ctx.clock.peak_len(),
            self.loops.summaries(),
            self.loops.warnings().to_vec(),
        );
        let loop_samples = self.loops.samples().to_vec();
        let incomplete_loops = self.loops.warnings().to_vec();
        let (stats, deliveries) = self.stats.into_parts();
        SimulationReport {
            placement: self.placement,
            stats,
            loop_samples,
            incomplete_loops,
            deliveries,
        }
    }

    /// Exports current statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let stats = self.stats.stats();
        serde_json::json!({
            "engine": {
                "current_time": self.ctx.now(),
                "seed": self.ctx.seed(),
                "events_processed": stats.engine.events_processed,
                "sensor_emissions": stats.engine.sensor_emissions,
                "tuples_emitted": stats.engine.tuples_emitted,
                "deliveries": stats.engine.deliveries,
                "actuator_consumptions": stats.engine.actuator_consumptions,
                "pending_events": self.ctx.clock.len(),
                "open_loops": self.loops.open_count(),
            },
            "placement": self
                .placement
                .iter()
                .map(|(m, n)| (m.to_string(), serde_json::json!(n.to_string())))
                .collect::<serde_json::Map<_, _>>(),
        })
    }

    fn dispatch(&mut self, event: Event) -> SimResult<()> {
        tracing::trace!(id = %event.id, time = event.time, event = %event.payload.label(), "dispatch");
        self.stats.record_event();
        match event.payload {
            EventPayload::SensorEmit { sensor } => {
                self.emit_from_sensor(&sensor)?;
                let interval = self
                    .sensors
                    .iter()
                    .find(|s| s.name == sensor)
                    .map(|s| s.interval.sample(&mut self.ctx.rng));
                if let Some(interval) = interval {
                    let at = self.ctx.now() + interval;
                    self.ctx.clock.schedule_at(at, EventPayload::SensorEmit { sensor });
                }
                Ok(())
            }
            EventPayload::TupleArrival(delivery) => self.arrive(delivery),
        }
    }

    fn arrive(&mut self, delivery: Delivery) -> SimResult<()> {
        let now = self.ctx.now();
        let node_name = self
            .topology
            .node(delivery.to_node)
            .map(|n| n.name.clone())
            .unwrap_or_default();
        self.stats.record_delivery(&delivery, &node_name);
        self.loops.on_delivery(
            &delivery.tuple.source,
            &delivery.destination,
            delivery.tuple.correlation,
            now,
        );

        let module = match &delivery.destination {
            Endpoint::Module(module) => module.clone(),
            Endpoint::Actuator(actuator) => {
                tracing::debug!(actuator = %actuator, tuple = delivery.tuple.id, now, "actuator consumed tuple");
                return Ok(());
            }
            Endpoint::Sensor(_) => return Ok(()),
        };

        let input = &delivery.tuple;
        let output = self
            .application
            .emit(&module, &input.tuple_type, now, &mut self.ctx.rng)
            .cloned();
        match output {
            Some(output_type) => {
                let id = self.ctx.next_tuple_id();
                let out = input.derive(id, output_type, Endpoint::Module(module.clone()), now);
                self.stats.record_module_emission(&module);
                self.loops.on_emit(&module, out.correlation, now);
                self.route(&out)?;
            }
            None if self.application.mapping(&module, &input.tuple_type).is_some() => {
                self.stats.record_selectivity_drop();
            }
            None => self.stats.record_sink(),
        }
        Ok(())
    }

    fn route(&mut self, tuple: &Tuple) -> SimResult<usize> {
        let now = self.ctx.now();
        let deliveries = RoutingEngine::new(
            &self.topology,
            &self.application,
            &self.placement,
            &self.sensors,
            &self.actuators,
            self.estimator.as_ref(),
        )
        .plan(tuple, now)?;
        let count = deliveries.len();
        RoutingEngine::schedule(&mut self.ctx.clock, deliveries);
        Ok(count)
    }
}
