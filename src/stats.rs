//! Statistics collection and export.
//!
//! [`StatsCollector`] is fed by the simulation as events fire and produces a
//! serializable [`SimulationStats`] at the end of a run. Exports: pretty
//! JSON, CSV (engine metrics and per-edge traffic) and a text summary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::application::{Application, Endpoint};
use crate::loops::{IncompleteLoopWarning, LoopSummary};
use crate::routing::Delivery;
use crate::types::{CorrelationId, NodeId, SimTime, TupleId};

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    pub metadata: SimulationMetadata,

    pub engine: EngineStats,

    /// Per-edge traffic in edge declaration order
    pub edges: Vec<EdgeStats>,

    /// Per-module execution counts
    pub modules: BTreeMap<String, ModuleStats>,

    /// Per-node CPU busy time
    pub nodes: BTreeMap<String, NodeStats>,

    pub loops: Vec<LoopSummary>,

    pub incomplete_loops: Vec<IncompleteLoopWarning>,

    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Scenario name
    pub name: String,

    pub application: String,

    /// RNG seed
    pub seed: u64,

    /// Start time (wall clock)
    pub start_time: Option<String>,

    /// End time (wall clock)
    pub end_time: Option<String>,

    pub version: String,

    /// Configuration file used (if any)
    pub config_file: Option<String>,
}

/// Engine-level counters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Final simulation time
    pub final_time: SimTime,

    pub events_processed: u64,

    /// Tuples created by sensors
    pub sensor_emissions: u64,

    /// Tuples created by module mappings
    pub tuples_emitted: u64,

    /// Tuple copies that reached their destination
    pub deliveries: u64,

    /// Deliveries consumed by actuators
    pub actuator_consumptions: u64,

    /// Inputs a mapping declined to transform
    pub selectivity_drops: u64,

    /// Inputs reaching a module without a mapping
    pub sink_consumptions: u64,

    /// Largest number of pending events
    pub peak_queue_len: usize,
}

/// Traffic carried by one edge.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EdgeStats {
    pub source: String,
    pub destination: String,
    pub tuple_type: String,
    pub deliveries: u64,
    /// Sum of payload sizes
    pub bytes: f64,
    /// Sum of `latency * payload` over deliveries
    pub network_usage: f64,
    /// Sum of time spent in the network
    pub network_time: SimTime,
}

impl EdgeStats {
    /// Mean network time per delivery.
    pub fn mean_network_time(&self) -> Option<SimTime> {
        (self.deliveries > 0).then(|| self.network_time / self.deliveries as f64)
    }
}

/// Work done by one module.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModuleStats {
    pub node: Option<NodeId>,
    /// Tuples processed
    pub executions: u64,
    /// Tuples produced
    pub emitted: u64,
    pub busy_time: SimTime,
}

/// Work done on one node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeStats {
    /// Modules placed on this node
    pub modules: Vec<String>,
    pub busy_time: SimTime,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Simulation time per wall-clock second
    pub sim_time_per_second: f64,

    /// Events processed per second
    pub events_per_second: f64,
}

/// One tuple copy that reached its destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub edge: usize,
    pub tuple: TupleId,
    pub correlation: CorrelationId,
    pub tuple_type: String,
    pub source: String,
    pub destination: String,
    pub node: NodeId,
    pub sent_at: SimTime,
    pub arrival_at: SimTime,
}

impl From<&Delivery> for DeliveryRecord {
    fn from(d: &Delivery) -> Self {
        Self {
            edge: d.edge,
            tuple: d.tuple.id,
            correlation: d.tuple.correlation,
            tuple_type: d.tuple.tuple_type.clone(),
            source: d.tuple.source.to_string(),
            destination: d.destination.to_string(),
            node: d.to_node,
            sent_at: d.sent_at,
            arrival_at: d.arrival_at,
        }
    }
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scenario name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Records the start time.
    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(unix_now());
    }

    /// Records the end time.
    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(unix_now());
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.sim_time_per_second = self.engine.final_time / seconds;
            self.timing.events_per_second = self.engine.events_processed as f64 / seconds;
        }
    }

    /// Total `latency * payload` over all edges.
    pub fn network_usage(&self) -> f64 {
        self.edges.iter().map(|e| e.network_usage).sum()
    }

    /// Summary of the loop named `name` (e.g. `sender->forwarder->receiver`).
    pub fn loop_summary(&self, name: &str) -> Option<&LoopSummary> {
        self.loops.iter().find(|l| l.name == name)
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports engine metrics to CSV.
    pub fn to_csv(&self) -> String {
        let e = &self.engine;
        let mut csv = String::from("metric,value\n");

        csv.push_str(&format!("final_time,{}\n", e.final_time));
        csv.push_str(&format!("events_processed,{}\n", e.events_processed));
        csv.push_str(&format!("sensor_emissions,{}\n", e.sensor_emissions));
        csv.push_str(&format!("tuples_emitted,{}\n", e.tuples_emitted));
        csv.push_str(&format!("deliveries,{}\n", e.deliveries));
        csv.push_str(&format!("actuator_consumptions,{}\n", e.actuator_consumptions));
        csv.push_str(&format!("selectivity_drops,{}\n", e.selectivity_drops));
        csv.push_str(&format!("sink_consumptions,{}\n", e.sink_consumptions));
        csv.push_str(&format!("peak_queue_len,{}\n", e.peak_queue_len));
        csv.push_str(&format!("network_usage,{}\n", self.network_usage()));
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));

        csv
    }

    /// Exports engine metrics to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Exports per-edge traffic to CSV.
    pub fn edges_to_csv(&self) -> String {
        let mut csv = String::from("edge,source,destination,tuple_type,deliveries,bytes,network_usage\n");
        for (id, edge) in self.edges.iter().enumerate() {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                id,
                edge.source,
                edge.destination,
                edge.tuple_type,
                edge.deliveries,
                edge.bytes,
                edge.network_usage,
            ));
        }
        csv
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        writeln!(w, "Application: {} (seed {})", self.metadata.application, self.metadata.seed)?;
        writeln!(w)?;

        let e = &self.engine;
        writeln!(w, "--- Engine ---")?;
        writeln!(w, "Final simulation time: {}", e.final_time)?;
        writeln!(w, "Events processed: {}", e.events_processed)?;
        writeln!(w, "Sensor emissions: {}", e.sensor_emissions)?;
        writeln!(w, "Module emissions: {}", e.tuples_emitted)?;
        writeln!(w, "Deliveries: {}", e.deliveries)?;
        writeln!(w, "Actuator consumptions: {}", e.actuator_consumptions)?;
        writeln!(w, "Selectivity drops: {}", e.selectivity_drops)?;
        writeln!(w, "Network usage: {:.3}", self.network_usage())?;
        writeln!(w)?;

        writeln!(w, "--- Edges ---")?;
        for edge in &self.edges {
            writeln!(
                w,
                "{} -> {} [{}]: {} deliveries, {} bytes",
                edge.source, edge.destination, edge.tuple_type, edge.deliveries, edge.bytes
            )?;
        }
        writeln!(w)?;

        writeln!(w, "--- Loops ---")?;
        for l in &self.loops {
            match (l.mean, l.min, l.max) {
                (Some(mean), Some(min), Some(max)) => writeln!(
                    w,
                    "{}: {} samples, mean {:.3}, min {:.3}, max {:.3}, {} incomplete",
                    l.name, l.count, mean, min, max, l.incomplete
                )?,
                _ => writeln!(w, "{}: no samples, {} incomplete", l.name, l.incomplete)?,
            }
        }

        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

fn unix_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

/// Accumulates statistics while a simulation runs.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
    deliveries: Vec<DeliveryRecord>,
    record_deliveries: bool,
    timer: Option<Timer>,
}

impl StatsCollector {
    /// Creates a collector with one entry per edge and module of `app`.
    pub fn new(app: &Application) -> Self {
        let mut stats = SimulationStats::new();
        stats.metadata.application = app.id().to_string();
        stats.metadata.version = env!("CARGO_PKG_VERSION").to_string();
        stats.edges = app
            .edges()
            .iter()
            .map(|e| EdgeStats {
                source: e.source.to_string(),
                destination: e.destination.to_string(),
                tuple_type: e.tuple_type.clone(),
                ..EdgeStats::default()
            })
            .collect();
        for m in app.modules() {
            stats.modules.insert(m.name.clone(), ModuleStats::default());
        }
        Self {
            stats,
            deliveries: Vec::new(),
            record_deliveries: true,
            timer: None,
        }
    }

    /// Enables or disables the per-delivery log.
    pub fn set_record_deliveries(&mut self, enabled: bool) {
        self.record_deliveries = enabled;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.stats.metadata.name = name.into();
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.stats.metadata.seed = seed;
    }

    pub fn set_config_file(&mut self, path: impl Into<String>) {
        self.stats.metadata.config_file = Some(path.into());
    }

    /// Records where a module was placed.
    pub fn record_placement(&mut self, module: &str, node: NodeId, node_name: &str) {
        self.stats.modules.entry(module.to_string()).or_default().node = Some(node);
        self.stats
            .nodes
            .entry(node_name.to_string())
            .or_default()
            .modules
            .push(module.to_string());
    }

    /// Starts timing.
    pub fn start(&mut self) {
        self.timer = Some(Timer::start());
        self.stats.record_start();
    }

    pub fn record_event(&mut self) {
        self.stats.engine.events_processed += 1;
    }

    pub fn record_sensor_emission(&mut self) {
        self.stats.engine.sensor_emissions += 1;
    }

    pub fn record_module_emission(&mut self, module: &str) {
        self.stats.engine.tuples_emitted += 1;
        self.stats.modules.entry(module.to_string()).or_default().emitted += 1;
    }

    pub fn record_selectivity_drop(&mut self) {
        self.stats.engine.selectivity_drops += 1;
    }

    pub fn record_sink(&mut self) {
        self.stats.engine.sink_consumptions += 1;
    }

    /// Records an arrival and, for module destinations, the CPU time spent.
    pub fn record_delivery(&mut self, delivery: &Delivery, node_name: &str) {
        self.stats.engine.deliveries += 1;
        if let Some(edge) = self.stats.edges.get_mut(delivery.edge) {
            edge.deliveries += 1;
            edge.bytes += delivery.payload_size;
            edge.network_usage += delivery.latency * delivery.payload_size;
            edge.network_time += delivery.network_time();
        }
        match &delivery.destination {
            Endpoint::Module(module) => {
                let m = self.stats.modules.entry(module.clone()).or_default();
                m.executions += 1;
                m.busy_time += delivery.processing_time;
                self.stats.nodes.entry(node_name.to_string()).or_default().busy_time +=
                    delivery.processing_time;
            }
            Endpoint::Actuator(_) => self.stats.engine.actuator_consumptions += 1,
            Endpoint::Sensor(_) => {}
        }
        if self.record_deliveries {
            self.deliveries.push(DeliveryRecord::from(delivery));
        }
    }

    /// Stops timing and stores the final engine state.
    pub fn stop(
        &mut self,
        final_time: SimTime,
        peak_queue_len: usize,
        loops: Vec<LoopSummary>,
        incomplete: Vec<IncompleteLoopWarning>,
    ) {
        self.stats.engine.final_time = final_time;
        self.stats.engine.peak_queue_len = peak_queue_len;
        self.stats.loops = loops;
        self.stats.incomplete_loops = incomplete;
        self.stats.record_end();
        if let Some(ref timer) = self.timer {
            self.stats.compute_timing(timer.elapsed_ms());
        }
    }

    /// Returns the collected statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Deliveries recorded so far, in arrival order.
    pub fn deliveries(&self) -> &[DeliveryRecord] {
        &self.deliveries
    }

    /// Consumes the collector.
    pub fn into_parts(self) -> (SimulationStats, Vec<DeliveryRecord>) {
        (self.stats, self.deliveries)
    }
}
