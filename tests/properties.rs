//! Properties checked over generated topologies and seeded stochastic runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use fogtap::placement::{self, PlacementPins};
use fogtap::types::Direction;
use fogtap::{
    Application, Distribution, Edge, Module, NodeId, PhysicalNode, Selectivity, Sensor, SimError,
    SimulationBuilder, SimulationReport, Topology, TupleMapping,
};

// ============================================================================
// Generators
// ============================================================================

/// A random tree: every node after the root picks an earlier node as parent.
fn random_tree(seed: u64, size: usize) -> Topology {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut topo = Topology::new();
    topo.add_node(
        PhysicalNode::new("n0", 0).with_capacity(8000.0, 8192.0),
        None,
    )
    .unwrap();
    for i in 1..size {
        let parent = NodeId(rng.gen_range(0..i) as u32);
        let level = topo.node(parent).unwrap().level + 1;
        let node = PhysicalNode::new(format!("n{}", i), level)
            .with_capacity(rng.gen_range(500.0..4000.0), rng.gen_range(64.0..2048.0))
            .with_uplink(rng.gen_range(100.0..10000.0), rng.gen_range(0.5..10.0))
            .with_downlink(rng.gen_range(100.0..10000.0));
        topo.add_node(node, Some(parent)).unwrap();
    }
    topo
}

/// Sensor → sender → {forwarder, tap} with stochastic timing. Both
/// receivers sit on the cloud, one hop above the sender.
fn stochastic(seed: u64, tap_payload: f64) -> SimulationBuilder {
    let mut b = SimulationBuilder::new("noisy");
    let cloud = b
        .add_node(PhysicalNode::new("cloud", 0).with_capacity(40000.0, 16384.0), None)
        .unwrap();
    let edge = b
        .add_node(
            PhysicalNode::new("edge", 1)
                .with_capacity(2000.0, 1024.0)
                .with_uplink(1000.0, 3.0),
            Some(cloud),
        )
        .unwrap();

    for (name, compute) in [("sender", 800.0), ("forwarder", 1500.0), ("tap", 300.0)] {
        b.add_module(Module::new(name, compute, 16.0)).unwrap();
    }
    b.add_edge(Edge::sensor("probe", "sender", "RAW").with_cpu_length(200.0))
        .unwrap();
    b.add_edge(Edge::module("sender", "forwarder", "RAW", Direction::Up).with_payload(100.0))
        .unwrap();
    b.add_edge(Edge::module("sender", "tap", "RAW", Direction::Up).with_payload(tap_payload))
        .unwrap();
    b.add_tuple_mapping(TupleMapping::new("sender", "RAW", "RAW", Selectivity::fractional(0.5)))
        .unwrap();
    b.add_sensor_at("probe", "RAW", edge, Distribution::Exponential { mean: 4.0 })
        .unwrap();
    b.pin("tap", cloud);
    b.seed(seed);
    b
}

fn run(b: SimulationBuilder, until: f64) -> SimulationReport {
    let mut sim = b.resolve_placement().unwrap();
    sim.run(until).unwrap();
    sim.finish()
}

// ============================================================================
// Topology
// ============================================================================

#[test]
fn test_path_latency_is_sum_of_links_and_symmetric() {
    for seed in 0..5 {
        let topo = random_tree(seed, 24);
        let ids: Vec<NodeId> = topo.nodes().map(|n| n.id).collect();
        for &a in &ids {
            for &b in &ids {
                let ab = topo.path_between(a, b).unwrap();
                let ba = topo.path_between(b, a).unwrap();

                let summed: f64 = ab
                    .hops
                    .iter()
                    .map(|h| {
                        let child = if h.direction == Direction::Up { h.from } else { h.to };
                        topo.link(child).unwrap().latency
                    })
                    .sum();
                assert!((ab.latency - summed).abs() < 1e-9);
                assert!((ab.latency - ba.latency).abs() < 1e-9);
                assert_eq!(ab.hops.len(), ba.hops.len());
            }
        }
    }
}

// ============================================================================
// Placement
// ============================================================================

fn chain_app(seed: u64, modules: usize) -> Application {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut app = Application::new("chain");
    for i in 0..modules {
        app.add_module(Module::new(
            format!("m{}", i),
            rng.gen_range(50.0..1500.0),
            rng.gen_range(8.0..512.0),
        ))
        .unwrap();
    }
    for i in 1..modules {
        app.add_edge(Edge::module(
            format!("m{}", i - 1),
            format!("m{}", i),
            "T",
            Direction::Up,
        ))
        .unwrap();
    }
    app.add_edge(Edge::sensor("probe", "m0", "T")).unwrap();
    app
}

/// A sensor on the last (deepest-registered) node of a 12-node tree.
fn probe() -> Vec<Sensor> {
    vec![Sensor::new("probe", "T", NodeId(11), Distribution::deterministic(1.0))]
}

#[test]
fn test_placement_never_overcommits() {
    for seed in 0..10 {
        let mut topo = random_tree(seed, 12);
        let app = chain_app(seed, 8);
        match placement::resolve(&mut topo, &app, &probe(), &[], &PlacementPins::new()) {
            Ok(placement) => {
                assert_eq!(placement.len(), 8);
                for node in topo.nodes() {
                    assert!(node.committed().compute <= node.capacity.compute + 1e-9);
                    assert!(node.committed().memory <= node.capacity.memory + 1e-9);
                }
            }
            Err(SimError::PlacementInfeasible { .. }) => {
                assert!(topo.nodes().all(|n| n.committed().compute == 0.0));
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn test_placement_is_deterministic() {
    for seed in 0..5 {
        let topo = random_tree(seed, 12);
        let app = chain_app(seed, 8);
        let first = placement::plan(&topo, &app, &probe(), &[], &PlacementPins::new());
        let second = placement::plan(&topo, &app, &probe(), &[], &PlacementPins::new());
        assert_eq!(first, second);
    }
}

// ============================================================================
// Runs
// ============================================================================

#[test]
fn test_same_seed_same_run() {
    let a = run(stochastic(11, 100.0), 200.0);
    let b = run(stochastic(11, 100.0), 200.0);
    assert_eq!(a.deliveries, b.deliveries);
    assert_eq!(a.stats.engine.selectivity_drops, b.stats.engine.selectivity_drops);
}

#[test]
fn test_different_seed_different_run() {
    let a = run(stochastic(11, 100.0), 200.0);
    let b = run(stochastic(12, 100.0), 200.0);
    assert_ne!(a.deliveries, b.deliveries);
}

#[test]
fn test_multicast_copies_match_up() {
    let report = run(stochastic(3, 100.0), 200.0);

    // both copies of an emission leave together; the last few may still
    // be in flight at the horizon
    let emitted = report.stats.modules["sender"].emitted as usize;
    let copies = |destination: &str| {
        report
            .deliveries_to(destination)
            .map(|d| (d.tuple, d.sent_at))
            .collect::<Vec<_>>()
    };
    let forwarded = copies("forwarder");
    let tapped = copies("tap");
    assert!(emitted > 0);
    assert!(forwarded.len() <= emitted);
    assert_eq!(forwarded, tapped);
    assert_eq!(
        report.stats.engine.selectivity_drops + report.stats.modules["sender"].emitted,
        report.stats.modules["sender"].executions
    );
}

#[test]
fn test_payload_on_one_edge_does_not_move_the_other() {
    let light = run(stochastic(5, 100.0), 100.0);
    let heavy = run(stochastic(5, 1e6), 100.0);

    let times = |r: &SimulationReport| {
        r.deliveries_to("forwarder")
            .map(|d| d.arrival_at)
            .collect::<Vec<_>>()
    };
    assert_eq!(times(&light), times(&heavy));
}
