//! Scenario files.
//!
//! A whole fog scenario (topology, application, endpoints and placement
//! pins) can be declared in YAML or JSON and turned into a
//! [`SimulationBuilder`].
//!
//! # Scenario File Structure
//!
//! ```yaml
//! simulation:
//!   max_time: 100.0
//!   seed: 42
//!   loop_timeout: 50.0
//!
//! nodes:
//!   - name: cloud
//!     level: 0
//!     compute: 40000
//!     memory: 16384
//!     downlink_bandwidth: 10000
//!   - name: iotA
//!     parent: cloud
//!     level: 1
//!     compute: 2000
//!     memory: 1024
//!     uplink_bandwidth: 1000
//!     uplink_latency: 2.0
//!
//! application:
//!   id: iot_talk
//!   modules:
//!     - { name: sender, compute: 1000, memory: 10 }
//!   edges:
//!     - { source: sensorA, destination: sender, tuple_type: SENSOR_DATA, kind: sensor, cpu_length: 1000 }
//!   loops:
//!     - [sender, forwarder, receiver]
//!
//! sensors:
//!   - name: sensorA
//!     node: iotA
//!     tuple_type: SENSOR_DATA
//!     interval: { type: deterministic, value: 5.0 }
//!
//! placement:
//!   sender: iotA
//! ```
//!
//! Nodes must be listed parent first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::application::{AppLoop, Edge, EdgeKind, Endpoint, Module, TupleMapping};
use crate::distribution::Distribution;
use crate::engine::{SimulationBuilder, SimulationReport};
use crate::error::{ConfigurationError, SimError};
use crate::selectivity::Selectivity;
use crate::topology::PhysicalNode;
use crate::types::{Direction, SimTime};

/// Errors that can occur while loading or running a scenario file.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

impl From<ConfigurationError> for ScenarioError {
    fn from(e: ConfigurationError) -> Self {
        ScenarioError::Sim(e.into())
    }
}

/// Result type for scenario operations.
pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// Global run parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Scenario name, defaults to the application id
    #[serde(default)]
    pub name: Option<String>,

    /// Simulated time to run for
    #[serde(default = "default_max_time")]
    pub max_time: SimTime,

    /// RNG seed
    #[serde(default)]
    pub seed: u64,

    /// Expire loop instances older than this
    #[serde(default)]
    pub loop_timeout: Option<SimTime>,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Keep the per-delivery log in the report
    #[serde(default = "default_record_deliveries")]
    pub record_deliveries: bool,
}

fn default_max_time() -> SimTime {
    1000.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_record_deliveries() -> bool {
    true
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            name: None,
            max_time: default_max_time(),
            seed: 0,
            loop_timeout: None,
            log_level: default_log_level(),
            record_deliveries: default_record_deliveries(),
        }
    }
}

/// A physical node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,

    /// Parent node name, omitted for a root
    #[serde(default)]
    pub parent: Option<String>,

    pub level: u32,

    /// MIPS
    #[serde(default)]
    pub compute: f64,

    /// MB
    #[serde(default)]
    pub memory: f64,

    /// Omitted means unconstrained
    #[serde(default)]
    pub uplink_bandwidth: Option<f64>,

    #[serde(default)]
    pub downlink_bandwidth: Option<f64>,

    #[serde(default)]
    pub uplink_latency: SimTime,
}

/// A direct link between a node and its parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: String,
    pub b: String,
    pub latency: SimTime,
    pub bandwidth: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(default)]
    pub compute: f64,
    #[serde(default)]
    pub memory: f64,
}

/// An application edge. `source` and `destination` are names; `kind`
/// says which of them is a sensor or actuator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub source: String,
    pub destination: String,
    pub tuple_type: String,

    #[serde(default = "default_edge_kind")]
    pub kind: EdgeKind,

    /// Defaults to up for sensor and module edges, down for actuator edges
    #[serde(default)]
    pub direction: Option<Direction>,

    #[serde(default)]
    pub payload_size: f64,

    #[serde(default)]
    pub cpu_length: f64,
}

fn default_edge_kind() -> EdgeKind {
    EdgeKind::Module
}

impl EdgeConfig {
    fn to_edge(&self) -> Edge {
        let (source, destination) = match self.kind {
            EdgeKind::Sensor => (
                Endpoint::Sensor(self.source.clone()),
                Endpoint::Module(self.destination.clone()),
            ),
            EdgeKind::Module => (
                Endpoint::Module(self.source.clone()),
                Endpoint::Module(self.destination.clone()),
            ),
            EdgeKind::Actuator => (
                Endpoint::Module(self.source.clone()),
                Endpoint::Actuator(self.destination.clone()),
            ),
        };
        let direction = self.direction.unwrap_or(match self.kind {
            EdgeKind::Actuator => Direction::Down,
            _ => Direction::Up,
        });
        Edge::new(source, destination, self.tuple_type.clone(), self.kind, direction)
            .with_payload(self.payload_size)
            .with_cpu_length(self.cpu_length)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingConfig {
    pub module: String,
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub selectivity: Selectivity,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub id: String,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
    #[serde(default)]
    pub loops: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    pub node: String,
    pub tuple_type: String,
    pub interval: Distribution,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub name: String,
    pub node: String,
    pub tuple_type: String,
}

/// Complete scenario.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationParams,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub links: Vec<LinkConfig>,

    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    #[serde(default)]
    pub actuators: Vec<ActuatorConfig>,

    /// Module name → node name
    #[serde(default)]
    pub placement: BTreeMap<String, String>,
}

impl ScenarioConfig {
    /// Loads a scenario from a YAML string.
    pub fn from_yaml(yaml: &str) -> ScenarioResult<Self> {
        let config: ScenarioConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a scenario from a JSON string.
    pub fn from_json(json: &str) -> ScenarioResult<Self> {
        let config: ScenarioConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a scenario from a file, detecting the format from its extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ScenarioResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = std::fs::read_to_string(path)?;

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ScenarioError::UnknownFormat(ext.to_string())),
        }
    }

    /// Converts to a YAML string.
    pub fn to_yaml(&self) -> ScenarioResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to a pretty JSON string.
    pub fn to_json(&self) -> ScenarioResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Saves the scenario, choosing the format from the extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> ScenarioResult<()> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let text = match ext.to_lowercase().as_str() {
            "yaml" | "yml" => self.to_yaml()?,
            "json" => self.to_json()?,
            _ => return Err(ScenarioError::UnknownFormat(ext.to_string())),
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Checks run parameters and every declaration.
    pub fn validate(&self) -> ScenarioResult<()> {
        let sim = &self.simulation;
        if !(sim.max_time.is_finite() && sim.max_time >= 0.0) {
            return Err(ScenarioError::Validation(format!(
                "max_time must be finite and non-negative, got {}",
                sim.max_time
            )));
        }
        if let Some(timeout) = sim.loop_timeout {
            if !(timeout > 0.0) {
                return Err(ScenarioError::Validation(format!(
                    "loop_timeout must be positive, got {}",
                    timeout
                )));
            }
        }
        if self.application.id.is_empty() {
            return Err(ScenarioError::Validation("application id is empty".into()));
        }
        self.into_builder()?.check_links()?;
        Ok(())
    }

    /// Builds a [`SimulationBuilder`] declaring everything in the scenario.
    pub fn into_builder(&self) -> ScenarioResult<SimulationBuilder> {
        let mut b = SimulationBuilder::new(self.application.id.clone());
        if let Some(name) = &self.simulation.name {
            b.name(name.clone());
        }
        b.seed(self.simulation.seed)
            .loop_timeout(self.simulation.loop_timeout)
            .record_deliveries(self.simulation.record_deliveries);

        for n in &self.nodes {
            let parent = match &n.parent {
                Some(p) => Some(
                    b.node_id(p)
                        .ok_or_else(|| ConfigurationError::UnknownNode(p.clone()))?,
                ),
                None => None,
            };
            let mut node = PhysicalNode::new(n.name.clone(), n.level).with_capacity(n.compute, n.memory);
            node = node.with_uplink(n.uplink_bandwidth.unwrap_or(f64::INFINITY), n.uplink_latency);
            if let Some(down) = n.downlink_bandwidth {
                node = node.with_downlink(down);
            }
            b.add_node(node, parent)?;
        }

        let node = |b: &SimulationBuilder, name: &str| {
            b.node_id(name)
                .ok_or_else(|| ConfigurationError::UnknownNode(name.to_string()))
        };

        for l in &self.links {
            let (a, c) = (node(&b, &l.a)?, node(&b, &l.b)?);
            b.add_link(a, c, l.latency, l.bandwidth);
        }

        let app = &self.application;
        for m in &app.modules {
            b.add_module(Module::new(m.name.clone(), m.compute, m.memory))?;
        }
        for e in &app.edges {
            b.add_edge(e.to_edge())?;
        }
        for m in &app.mappings {
            b.add_tuple_mapping(TupleMapping::new(
                m.module.clone(),
                m.input.clone(),
                m.output.clone(),
                m.selectivity.clone(),
            ))?;
        }
        b.set_loops(app.loops.iter().map(AppLoop::new).collect())?;

        for s in &self.sensors {
            let at = node(&b, &s.node)?;
            b.add_sensor_at(s.name.clone(), s.tuple_type.clone(), at, s.interval.clone())?;
        }
        for a in &self.actuators {
            let at = node(&b, &a.node)?;
            b.add_actuator_at(a.name.clone(), a.tuple_type.clone(), at)?;
        }
        for (module, node_name) in &self.placement {
            let at = node(&b, node_name)?;
            b.pin(module.clone(), at);
        }
        Ok(b)
    }

    /// Loads, places and runs a scenario file for its configured duration.
    pub fn run_file<P: AsRef<Path>>(path: P) -> ScenarioResult<SimulationReport> {
        let path = path.as_ref();
        let config = Self::from_file(path)?;
        let mut b = config.into_builder()?;
        b.config_file(path.display().to_string());
        Self::run_builder(b, config.simulation.max_time)
    }

    /// Places and runs the scenario for its configured duration.
    pub fn run(&self) -> ScenarioResult<SimulationReport> {
        Self::run_builder(self.into_builder()?, self.simulation.max_time)
    }

    fn run_builder(b: SimulationBuilder, max_time: SimTime) -> ScenarioResult<SimulationReport> {
        let mut sim = b.resolve_placement()?;
        sim.run(max_time)?;
        Ok(sim.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_IOT: &str = r#"
simulation:
  max_time: 13.0
  seed: 7

nodes:
  - { name: cloud, level: 0, compute: 40000, memory: 16384, downlink_bandwidth: 10000 }
  - { name: gateway, parent: cloud, level: 1, compute: 10000, memory: 4096,
      uplink_bandwidth: 1000, uplink_latency: 5.0, downlink_bandwidth: 1000 }
  - { name: iotA, parent: gateway, level: 2, compute: 2000, memory: 1024,
      uplink_bandwidth: 1000, uplink_latency: 2.0 }
  - { name: iotB, parent: gateway, level: 2, compute: 2000, memory: 1024,
      uplink_bandwidth: 1000, uplink_latency: 2.0 }

links:
  - { a: iotA, b: gateway, latency: 2.0, bandwidth: 1000 }

application:
  id: iot_talk
  modules:
    - { name: sender, compute: 1000, memory: 10 }
    - { name: forwarder, compute: 1000, memory: 20 }
  edges:
    - { source: sensorA, destination: sender, tuple_type: SENSOR_DATA, kind: sensor, cpu_length: 1000 }
    - { source: sender, destination: forwarder, tuple_type: SENSOR_DATA, payload_size: 500, cpu_length: 1000 }
  mappings:
    - { module: sender, input: SENSOR_DATA, output: SENSOR_DATA }
  loops:
    - [sender, forwarder]

sensors:
  - { name: sensorA, node: iotA, tuple_type: SENSOR_DATA, interval: { type: deterministic, value: 5.0 } }

placement:
  forwarder: gateway
"#;

    #[test]
    fn test_default_params() {
        let config = ScenarioConfig::default();
        assert_eq!(config.simulation.max_time, 1000.0);
        assert_eq!(config.simulation.log_level, "info");
        assert!(config.simulation.record_deliveries);
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let config = ScenarioConfig::from_yaml(TWO_IOT).unwrap();
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.nodes.len(), 4);
        assert_eq!(config.application.edges[1].kind, EdgeKind::Module);
        assert_eq!(config.placement["forwarder"], "gateway");
    }

    #[test]
    fn test_edge_defaults() {
        let config = ScenarioConfig::from_yaml(TWO_IOT).unwrap();
        let edge = config.application.edges[0].to_edge();
        assert_eq!(edge.source, Endpoint::Sensor("sensorA".into()));
        assert_eq!(edge.direction, Direction::Up);
    }

    #[test]
    fn test_run_scenario() {
        let report = ScenarioConfig::from_yaml(TWO_IOT).unwrap().run().unwrap();
        // sensor at 5 and 10; forwarder arrivals at 9.5 and 14.5
        assert_eq!(report.stats.engine.sensor_emissions, 2);
        assert_eq!(report.deliveries_to("forwarder").count(), 1);
        assert_eq!(report.loop_samples.len(), 1);
        assert!((report.loop_samples[0].latency() - 3.5).abs() < 1e-9);
        assert_eq!(report.incomplete_loops.len(), 1);
    }

    #[test]
    fn test_unknown_parent() {
        let yaml = r#"
application: { id: x }
nodes:
  - { name: edge, parent: nowhere, level: 1 }
"#;
        let err = ScenarioConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Sim(SimError::Configuration(ConfigurationError::UnknownNode(_)))
        ));
    }

    #[test]
    fn test_unknown_module_in_mapping() {
        let yaml = TWO_IOT.replace("module: sender, input", "module: ghost, input");
        assert!(matches!(
            ScenarioConfig::from_yaml(&yaml),
            Err(ScenarioError::Sim(SimError::Configuration(
                ConfigurationError::UnknownModuleReference { .. }
            )))
        ));
    }

    #[test]
    fn test_invalid_params() {
        let yaml = TWO_IOT.replace("max_time: 13.0", "max_time: -1.0");
        assert!(matches!(ScenarioConfig::from_yaml(&yaml), Err(ScenarioError::Validation(_))));
    }

    #[test]
    fn test_rejects_bad_link_costs() {
        let yaml = TWO_IOT.replace("latency: 2.0, bandwidth: 1000", "latency: -50.0, bandwidth: 1000");
        assert!(matches!(
            ScenarioConfig::from_yaml(&yaml),
            Err(ScenarioError::Sim(SimError::Configuration(
                ConfigurationError::InvalidParameter { name: "latency", .. }
            )))
        ));

        let yaml = TWO_IOT.replace("latency: 2.0, bandwidth: 1000", "latency: 2.0, bandwidth: 0");
        assert!(matches!(
            ScenarioConfig::from_yaml(&yaml),
            Err(ScenarioError::Sim(SimError::Configuration(
                ConfigurationError::InvalidParameter { name: "bandwidth", .. }
            )))
        ));

        let yaml = TWO_IOT.replace("{ a: iotA, b: gateway,", "{ a: iotA, b: cloud,");
        assert!(matches!(
            ScenarioConfig::from_yaml(&yaml),
            Err(ScenarioError::Sim(SimError::Configuration(
                ConfigurationError::InvalidLink { .. }
            )))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ScenarioConfig::from_yaml(TWO_IOT).unwrap();
        let json = config.to_json().unwrap();
        let restored = ScenarioConfig::from_json(&json).unwrap();
        assert_eq!(restored.nodes.len(), config.nodes.len());
        assert_eq!(restored.application.loops, config.application.loops);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(TWO_IOT.as_bytes()).unwrap();

        let report = ScenarioConfig::run_file(file.path()).unwrap();
        assert!(report.stats.metadata.config_file.is_some());

        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("scenario.json");
        ScenarioConfig::from_yaml(TWO_IOT).unwrap().to_file(&json_path).unwrap();
        assert_eq!(ScenarioConfig::from_file(&json_path).unwrap().simulation.seed, 7);

        let txt = dir.path().join("scenario.txt");
        std::fs::write(&txt, "").unwrap();
        assert!(matches!(ScenarioConfig::from_file(&txt), Err(ScenarioError::UnknownFormat(_))));
    }
}
