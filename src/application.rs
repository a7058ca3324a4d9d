//! Application graph: modules, typed edges, tuple mappings and loops.
//!
//! An application is declared once, before placement, and is read-only for
//! the rest of the simulation. Edges are kept in declaration order and
//! indexed by `(source, tuple type)`, so the fan-out of one emission is a
//! single lookup:
//!
//! ```text
//!   sensorA ──SENSOR_DATA──▶ sender ──SENSOR_DATA──▶ forwarder ──FORWARD_TO_B──▶ receiver ──DISPLAY──▶ displayB
//!                                   ╲
//!                                    ╲─SENSOR_DATA──▶ attacker      (same source and type: multicast)
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigurationError;
use crate::selectivity::Selectivity;
use crate::types::{Direction, ModuleName, Resources, SimTime, TupleType};

/// Index of an edge in declaration order.
pub type EdgeId = usize;

/// A software module to be placed on one physical node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Unique name within the application
    pub name: ModuleName,
    /// Compute (MIPS) and memory the module needs
    pub requirements: Resources,
}

impl Module {
    /// Creates a module requiring `compute` MIPS and `memory` MB.
    pub fn new(name: impl Into<String>, compute: f64, memory: f64) -> Self {
        Self {
            name: name.into(),
            requirements: Resources::new(compute, memory),
        }
    }
}

/// One end of an edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Endpoint {
    /// External sensor, by sensor name
    Sensor(String),
    /// Application module, by module name
    Module(ModuleName),
    /// External actuator, by actuator name
    Actuator(String),
}

impl Endpoint {
    /// The name of the sensor, module or actuator.
    pub fn name(&self) -> &str {
        match self {
            Endpoint::Sensor(n) | Endpoint::Module(n) | Endpoint::Actuator(n) => n,
        }
    }

    /// Returns the module name if this endpoint is a module.
    pub fn as_module(&self) -> Option<&str> {
        match self {
            Endpoint::Module(n) => Some(n),
            _ => None,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Sensor(n) => write!(f, "sensor:{}", n),
            Endpoint::Module(n) => write!(f, "{}", n),
            Endpoint::Actuator(n) => write!(f, "actuator:{}", n),
        }
    }
}

/// What kind of hop an edge describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Sensor → module
    Sensor,
    /// Module → module
    Module,
    /// Module → actuator
    Actuator,
}

/// A directed, typed dependency between two endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub tuple_type: TupleType,
    pub direction: Direction,
    pub kind: EdgeKind,
    /// Network payload carried by each tuple
    pub payload_size: f64,
    /// Instructions (millions) the destination spends on each tuple
    pub cpu_length: f64,
}

impl Edge {
    /// Sensor-origin edge feeding `module`.
    pub fn sensor(sensor: impl Into<String>, module: impl Into<String>, tuple_type: impl Into<String>) -> Self {
        Self::new(
            Endpoint::Sensor(sensor.into()),
            Endpoint::Module(module.into()),
            tuple_type,
            EdgeKind::Sensor,
            Direction::Up,
        )
    }

    /// Module-to-module edge.
    pub fn module(
        source: impl Into<String>,
        destination: impl Into<String>,
        tuple_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self::new(
            Endpoint::Module(source.into()),
            Endpoint::Module(destination.into()),
            tuple_type,
            EdgeKind::Module,
            direction,
        )
    }

    /// Actuator-destination edge.
    pub fn actuator(module: impl Into<String>, actuator: impl Into<String>, tuple_type: impl Into<String>) -> Self {
        Self::new(
            Endpoint::Module(module.into()),
            Endpoint::Actuator(actuator.into()),
            tuple_type,
            EdgeKind::Actuator,
            Direction::Down,
        )
    }

    /// Creates an edge with explicit kind and direction and no cost.
    pub fn new(
        source: Endpoint,
        destination: Endpoint,
        tuple_type: impl Into<String>,
        kind: EdgeKind,
        direction: Direction,
    ) -> Self {
        Self {
            source,
            destination,
            tuple_type: tuple_type.into(),
            direction,
            kind,
            payload_size: 0.0,
            cpu_length: 0.0,
        }
    }

    /// Sets the network payload size.
    pub fn with_payload(mut self, payload_size: f64) -> Self {
        self.payload_size = payload_size;
        self
    }

    /// Sets the CPU length.
    pub fn with_cpu_length(mut self, cpu_length: f64) -> Self {
        self.cpu_length = cpu_length;
        self
    }

    fn check_shape(&self) -> Result<(), String> {
        let shape_ok = matches!(
            (self.kind, &self.source, &self.destination),
            (EdgeKind::Sensor, Endpoint::Sensor(_), Endpoint::Module(_))
                | (EdgeKind::Module, Endpoint::Module(_), Endpoint::Module(_))
                | (EdgeKind::Actuator, Endpoint::Module(_), Endpoint::Actuator(_))
        );
        if !shape_ok {
            return Err(format!("{:?} edge cannot connect these endpoints", self.kind));
        }
        if !(self.payload_size.is_finite() && self.payload_size >= 0.0) {
            return Err("payload_size must be finite and non-negative".into());
        }
        if !(self.cpu_length.is_finite() && self.cpu_length >= 0.0) {
            return Err("cpu_length must be finite and non-negative".into());
        }
        Ok(())
    }
}

/// `(module, input type) → (output type, selectivity)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TupleMapping {
    pub module: ModuleName,
    pub input_type: TupleType,
    pub output_type: TupleType,
    pub selectivity: Selectivity,
}

impl TupleMapping {
    pub fn new(
        module: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
        selectivity: Selectivity,
    ) -> Self {
        Self {
            module: module.into(),
            input_type: input_type.into(),
            output_type: output_type.into(),
            selectivity,
        }
    }
}

/// An ordered module sequence whose end-to-end latency is measured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppLoop {
    pub modules: Vec<ModuleName>,
}

impl AppLoop {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }

    /// Module whose emission starts an instance.
    pub fn first(&self) -> &str {
        &self.modules[0]
    }

    /// Module whose delivery completes an instance.
    pub fn last(&self) -> &str {
        &self.modules[self.modules.len() - 1]
    }

    /// Module that must deliver into [`AppLoop::last`].
    pub fn penultimate(&self) -> &str {
        &self.modules[self.modules.len() - 2]
    }

    /// Display name, e.g. `sender->forwarder->receiver`.
    pub fn name(&self) -> String {
        self.modules.join("->")
    }
}

/// The application graph.
#[derive(Clone, Debug, Default)]
pub struct Application {
    id: String,
    modules: Vec<Module>,
    module_index: HashMap<ModuleName, usize>,
    edges: Vec<Edge>,
    /// `(source, tuple type)` → edge ids in declaration order
    fanout: HashMap<(Endpoint, TupleType), Vec<EdgeId>>,
    mappings: Vec<TupleMapping>,
    mapping_index: HashMap<(ModuleName, TupleType), usize>,
    loops: Vec<AppLoop>,
}

impl Application {
    /// Creates an empty application.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Application identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declares a module.
    pub fn add_module(&mut self, module: Module) -> Result<(), ConfigurationError> {
        if self.module_index.contains_key(&module.name) {
            return Err(ConfigurationError::DuplicateDeclaration {
                kind: "module",
                name: module.name,
            });
        }
        let req = module.requirements;
        if !(req.compute.is_finite() && req.compute >= 0.0 && req.memory.is_finite() && req.memory >= 0.0) {
            return Err(ConfigurationError::InvalidParameter {
                owner: format!("module '{}'", module.name),
                name: "requirements",
                reason: "compute and memory must be finite and non-negative".into(),
            });
        }
        self.module_index.insert(module.name.clone(), self.modules.len());
        self.modules.push(module);
        Ok(())
    }

    /// Declares an edge and returns its id.
    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, ConfigurationError> {
        edge.check_shape()
            .map_err(|reason| ConfigurationError::InconsistentEdge {
                src: edge.source.to_string(),
                dst: edge.destination.to_string(),
                reason,
            })?;
        for end in [&edge.source, &edge.destination] {
            if let Some(module) = end.as_module() {
                self.require_module(module, || {
                    format!("edge {} -> {}", edge.source, edge.destination)
                })?;
            }
        }

        let id = self.edges.len();
        self.fanout
            .entry((edge.source.clone(), edge.tuple_type.clone()))
            .or_default()
            .push(id);
        self.edges.push(edge);
        Ok(id)
    }

    /// Declares how a module transforms one input type.
    pub fn add_tuple_mapping(&mut self, mapping: TupleMapping) -> Result<(), ConfigurationError> {
        self.require_module(&mapping.module, || {
            format!("tuple mapping on '{}'", mapping.input_type)
        })?;
        mapping
            .selectivity
            .validate()
            .map_err(|reason| ConfigurationError::InvalidSelectivity {
                module: mapping.module.clone(),
                tuple_type: mapping.input_type.clone(),
                reason,
            })?;

        let key = (mapping.module.clone(), mapping.input_type.clone());
        if self.mapping_index.contains_key(&key) {
            return Err(ConfigurationError::DuplicateDeclaration {
                kind: "tuple mapping",
                name: format!("{}/{}", key.0, key.1),
            });
        }
        self.mapping_index.insert(key, self.mappings.len());
        self.mappings.push(mapping);
        Ok(())
    }

    /// Replaces the measured loops.
    pub fn set_loops(&mut self, loops: Vec<AppLoop>) -> Result<(), ConfigurationError> {
        for app_loop in &loops {
            if app_loop.modules.len() < 2 {
                return Err(ConfigurationError::InvalidLoop {
                    modules: app_loop.modules.clone(),
                    reason: "a loop needs at least two modules".into(),
                });
            }
            for module in &app_loop.modules {
                self.require_module(module, || format!("loop {}", app_loop.name()))?;
            }
        }
        self.loops = loops;
        Ok(())
    }

    /// All edges leaving `source` with `tuple_type`, in declaration order.
    ///
    /// More than one edge means the emission is multicast.
    pub fn outgoing_edges(&self, source: &Endpoint, tuple_type: &str) -> Vec<(EdgeId, &Edge)> {
        // HashMap lookup needs an owned key; the tuple type is small.
        let key = (source.clone(), tuple_type.to_string());
        self.fanout
            .get(&key)
            .map(|ids| ids.iter().map(|&id| (id, &self.edges[id])).collect())
            .unwrap_or_default()
    }

    /// Applies `module`'s mapping for `input_type`.
    ///
    /// Returns the output type if one is produced. A module without a
    /// mapping for the input is a sink.
    pub fn emit<R: Rng + ?Sized>(
        &self,
        module: &str,
        input_type: &str,
        now: SimTime,
        rng: &mut R,
    ) -> Option<&TupleType> {
        let mapping = self.mapping(module, input_type)?;
        mapping
            .selectivity
            .can_select(now, rng)
            .then_some(&mapping.output_type)
    }

    /// Mapping for `(module, input_type)`, if any.
    pub fn mapping(&self, module: &str, input_type: &str) -> Option<&TupleMapping> {
        self.mapping_index
            .get(&(module.to_string(), input_type.to_string()))
            .map(|&i| &self.mappings[i])
    }

    /// Looks up a module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.module_index.get(name).map(|&i| &self.modules[i])
    }

    /// Declaration index of a module.
    pub fn module_position(&self, name: &str) -> Option<usize> {
        self.module_index.get(name).copied()
    }

    /// Modules in declaration order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Edges in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns an edge by id.
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Tuple mappings in declaration order.
    pub fn mappings(&self) -> &[TupleMapping] {
        &self.mappings
    }

    /// Measured loops.
    pub fn loops(&self) -> &[AppLoop] {
        &self.loops
    }

    fn require_module(
        &self,
        module: &str,
        context: impl FnOnce() -> String,
    ) -> Result<(), ConfigurationError> {
        if self.module_index.contains_key(module) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownModuleReference {
                module: module.to_string(),
                context: context(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn talk_app() -> Application {
        let mut app = Application::new("iot_talk");
        for m in ["sender", "forwarder", "receiver", "attacker"] {
            app.add_module(Module::new(m, 1000.0, 10.0)).unwrap();
        }
        app.add_edge(Edge::sensor("sensorA", "sender", "SENSOR_DATA")).unwrap();
        app.add_edge(Edge::module("sender", "forwarder", "SENSOR_DATA", Direction::Up).with_payload(500.0))
            .unwrap();
        app.add_edge(Edge::module("sender", "attacker", "SENSOR_DATA", Direction::Up).with_payload(1.0))
            .unwrap();
        app.add_edge(Edge::actuator("receiver", "displayB", "DISPLAY")).unwrap();
        app
    }

    #[test]
    fn test_duplicate_module() {
        let mut app = talk_app();
        let err = app.add_module(Module::new("sender", 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateDeclaration { kind: "module", .. }));
    }

    #[test]
    fn test_unknown_module_reference() {
        let mut app = talk_app();
        let err = app
            .add_edge(Edge::module("sender", "ghost", "X", Direction::Up))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownModuleReference { ref module, .. } if module == "ghost"
        ));

        let err = app
            .add_tuple_mapping(TupleMapping::new("ghost", "X", "Y", Selectivity::deterministic()))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownModuleReference { .. }));
    }

    #[test]
    fn test_external_markers_are_exempt() {
        let mut app = talk_app();
        // Sensor and actuator names are not modules and need no declaration.
        assert!(app.add_edge(Edge::sensor("sensorZ", "receiver", "OTHER")).is_ok());
        assert!(app.add_edge(Edge::actuator("sender", "panel", "ALERT")).is_ok());
    }

    #[test]
    fn test_inconsistent_edge_kind() {
        let mut app = talk_app();
        let bogus = Edge::new(
            Endpoint::Module("sender".into()),
            Endpoint::Actuator("displayB".into()),
            "X",
            EdgeKind::Module,
            Direction::Down,
        );
        assert!(matches!(
            app.add_edge(bogus),
            Err(ConfigurationError::InconsistentEdge { .. })
        ));

        let negative = Edge::module("sender", "receiver", "X", Direction::Up).with_payload(-1.0);
        assert!(app.add_edge(negative).is_err());
    }

    #[test]
    fn test_outgoing_edges_multicast_in_declaration_order() {
        let app = talk_app();
        let out = app.outgoing_edges(&Endpoint::Module("sender".into()), "SENSOR_DATA");
        let targets: Vec<_> = out.iter().map(|(_, e)| e.destination.name()).collect();
        assert_eq!(targets, vec!["forwarder", "attacker"]);
        assert_eq!(out[0].0, 1);
        assert_eq!(out[1].0, 2);

        assert!(app
            .outgoing_edges(&Endpoint::Module("sender".into()), "DISPLAY")
            .is_empty());
        assert_eq!(
            app.outgoing_edges(&Endpoint::Sensor("sensorA".into()), "SENSOR_DATA").len(),
            1
        );
    }

    #[test]
    fn test_emit_applies_mapping() {
        let mut app = talk_app();
        app.add_tuple_mapping(TupleMapping::new(
            "forwarder",
            "SENSOR_DATA",
            "FORWARD_TO_B",
            Selectivity::deterministic(),
        ))
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        assert_eq!(
            app.emit("forwarder", "SENSOR_DATA", 0.0, &mut rng).map(String::as_str),
            Some("FORWARD_TO_B")
        );
        // No mapping: the module is a sink.
        assert!(app.emit("attacker", "SENSOR_DATA", 0.0, &mut rng).is_none());
    }

    #[test]
    fn test_duplicate_mapping_and_bad_selectivity() {
        let mut app = talk_app();
        let m = TupleMapping::new("sender", "SENSOR_DATA", "SENSOR_DATA", Selectivity::deterministic());
        app.add_tuple_mapping(m.clone()).unwrap();
        assert!(matches!(
            app.add_tuple_mapping(m),
            Err(ConfigurationError::DuplicateDeclaration { .. })
        ));

        let bad = TupleMapping::new("receiver", "A", "B", Selectivity::fractional(2.0));
        assert!(matches!(
            app.add_tuple_mapping(bad),
            Err(ConfigurationError::InvalidSelectivity { .. })
        ));
    }

    #[test]
    fn test_loops_validation() {
        let mut app = talk_app();
        assert!(app
            .set_loops(vec![AppLoop::new(["sender", "forwarder", "receiver"])])
            .is_ok());
        assert_eq!(app.loops()[0].name(), "sender->forwarder->receiver");
        assert_eq!(app.loops()[0].penultimate(), "forwarder");

        assert!(matches!(
            app.set_loops(vec![AppLoop::new(["sender"])]),
            Err(ConfigurationError::InvalidLoop { .. })
        ));
        assert!(matches!(
            app.set_loops(vec![AppLoop::new(["sender", "nobody"])]),
            Err(ConfigurationError::UnknownModuleReference { .. })
        ));
    }
}
