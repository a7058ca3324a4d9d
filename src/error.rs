//! Error types for the fog simulation.
//!
//! Configuration problems surface while the topology and application are
//! being declared; placement and routing failures surface when the
//! simulation is resolved or run. Incomplete latency loops are not errors at
//! all, see [`crate::loops::IncompleteLoopWarning`].

use thiserror::Error;

use crate::types::NodeId;

/// Errors raised synchronously while declaring a topology, application or
/// scenario. Always fatal to the build step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("duplicate {kind} declaration: {name}")]
    DuplicateDeclaration { kind: &'static str, name: String },

    #[error("{context} references undeclared module '{module}'")]
    UnknownModuleReference { module: String, context: String },

    #[error("node '{node}' has an unknown parent {parent}; parents must be registered first")]
    CycleOrMissingParent { node: String, parent: NodeId },

    #[error("node '{node}' has level {level}, which must be greater than its parent's level {parent_level}")]
    InvalidTier {
        node: String,
        level: u32,
        parent_level: u32,
    },

    #[error("edge {src} -> {dst} is inconsistent: {reason}")]
    InconsistentEdge {
        src: String,
        dst: String,
        reason: String,
    },

    #[error("selectivity for module '{module}' on '{tuple_type}' is invalid: {reason}")]
    InvalidSelectivity {
        module: String,
        tuple_type: String,
        reason: String,
    },

    #[error("invalid loop {modules:?}: {reason}")]
    InvalidLoop { modules: Vec<String>, reason: String },

    #[error("invalid parameter '{name}' on {owner}: {reason}")]
    InvalidParameter {
        owner: String,
        name: &'static str,
        reason: String,
    },

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("unknown actuator: {0}")]
    UnknownActuator(String),

    #[error("link {a} <-> {b} does not connect a node to its parent")]
    InvalidLink { a: String, b: String },
}

/// Top-level error type for the simulation core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("placement infeasible for module '{module}': {reason}")]
    PlacementInfeasible { module: String, reason: String },

    #[error("no path between {from} and {to}")]
    UnreachableNode { from: NodeId, to: NodeId },
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let e = ConfigurationError::DuplicateDeclaration {
            kind: "module",
            name: "sender".into(),
        };
        assert_eq!(e.to_string(), "duplicate module declaration: sender");

        let e = ConfigurationError::UnknownModuleReference {
            module: "ghost".into(),
            context: "edge sender -> ghost".into(),
        };
        assert!(e.to_string().contains("'ghost'"));
    }

    #[test]
    fn test_sim_error_from_configuration() {
        let e: SimError = ConfigurationError::UnknownNode("fog-9".into()).into();
        assert!(matches!(e, SimError::Configuration(_)));
        assert!(e.to_string().contains("fog-9"));
    }

    #[test]
    fn test_unreachable_display() {
        let e = SimError::UnreachableNode {
            from: NodeId(1),
            to: NodeId(4),
        };
        assert_eq!(e.to_string(), "no path between N1 and N4");
    }
}
