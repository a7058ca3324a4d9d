//! # fogtap
//!
//! A discrete-event simulator for fog/edge deployments, built to study what
//! a passive tap on a multicast edge observes and costs.
//!
//! ## Model
//!
//! - **Topology**: a forest of physical nodes (cloud, gateways, devices).
//!   Traffic between two nodes climbs to their nearest common ancestor and
//!   descends again.
//! - **Application**: modules joined by typed edges. Several edges leaving
//!   the same source with the same tuple type form a multicast group, which
//!   is how an eavesdropper is attached.
//! - **Placement**: each module lands on the node of its nearest sensor or
//!   actuator, or the first ancestor with room ("edge-ward").
//! - **Loops**: module sequences whose end-to-end latency is measured.
//!
//! ## Features
//!
//! - `parallel` - plan multicast deliveries with rayon
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fogtap::config::ScenarioConfig;
//!
//! fogtap::init_logging("info");
//! let report = ScenarioConfig::run_file("demos/two_iot_eavesdrop.yaml")?;
//! println!("{}", report.stats.summary());
//! ```

pub mod types;
pub mod error;
pub mod topology;
pub mod services;
pub mod selectivity;
pub mod distribution;
pub mod application;
pub mod endpoint;
pub mod tuple;
pub mod event;
pub mod clock;
pub mod placement;
pub mod routing;
pub mod loops;
pub mod stats;
pub mod engine;
pub mod config;

// Re-export commonly used types
pub use types::{Direction, NodeId, Resources, SimTime};
pub use error::{ConfigurationError, SimError, SimResult};
pub use topology::{NetworkPath, PhysicalNode, Topology};
pub use services::{CpuTimeEstimator, LinkRegistry, MipsEstimator, ZeroCpuEstimator};
pub use selectivity::Selectivity;
pub use distribution::Distribution;
pub use application::{AppLoop, Application, Edge, EdgeKind, Endpoint, Module, TupleMapping};
pub use endpoint::{Actuator, Sensor};
pub use tuple::Tuple;
pub use event::{Event, EventPayload};
pub use clock::{EventClock, EventQueue};
pub use placement::{Placement, PlacementPins};
pub use routing::{Delivery, RoutingEngine};
pub use loops::{IncompleteLoopWarning, LoopLatencyAccumulator, LoopSample, LoopSummary};
pub use stats::{SimulationStats, StatsCollector};
pub use engine::{FogSimulation, SimContext, SimulationBuilder, SimulationReport};
pub use config::{ScenarioConfig, ScenarioError};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level`.
///
/// ```rust,ignore
/// fogtap::init_logging("debug");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A subscriber may already be installed (tests, embedding applications).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}
