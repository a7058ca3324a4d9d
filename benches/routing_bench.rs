//! Performance benchmarks for fogtap.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench routing_bench`
//! With rayon-planned multicast: `cargo bench --features parallel`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use fogtap::placement::{self, PlacementPins};
use fogtap::types::Direction;
use fogtap::{
    Distribution, Edge, EventClock, EventPayload, EventQueue, Module, NodeId, PhysicalNode,
    Selectivity, Sensor, SimulationBuilder, Topology, TupleMapping,
};

// ============================================================================
// Fixtures
// ============================================================================

/// A complete tree of the given fan-out and depth. Returns the tree and
/// its deepest, last-registered leaf.
fn fanout_tree(fanout: usize, depth: u32) -> (Topology, NodeId) {
    let mut topo = Topology::new();
    let root = topo
        .add_node(PhysicalNode::new("root", 0).with_capacity(1e6, 1e6), None)
        .unwrap();
    let mut frontier = vec![root];
    let mut last = root;
    for level in 1..=depth {
        let mut next = Vec::new();
        for parent in frontier {
            for i in 0..fanout {
                let node = PhysicalNode::new(format!("n{}_{}_{}", level, parent.0, i), level)
                    .with_capacity(1000.0, 512.0)
                    .with_uplink(1000.0, 1.0)
                    .with_downlink(1000.0);
                last = topo.add_node(node, Some(parent)).unwrap();
                next.push(last);
            }
        }
        frontier = next;
    }
    (topo, last)
}

/// One sensor feeding a sender that multicasts to `receivers` modules.
fn multicast(receivers: usize) -> SimulationBuilder {
    let mut b = SimulationBuilder::new("bench");
    let cloud = b
        .add_node(PhysicalNode::new("cloud", 0).with_capacity(1e9, 1e9), None)
        .unwrap();
    let edge = b
        .add_node(
            PhysicalNode::new("edge", 1)
                .with_capacity(1000.0, 512.0)
                .with_uplink(1000.0, 2.0),
            Some(cloud),
        )
        .unwrap();

    b.add_module(Module::new("sender", 500.0, 10.0)).unwrap();
    b.add_edge(Edge::sensor("probe", "sender", "RAW").with_cpu_length(100.0))
        .unwrap();
    b.add_tuple_mapping(TupleMapping::new("sender", "RAW", "RAW", Selectivity::deterministic()))
        .unwrap();
    for i in 0..receivers {
        let name = format!("r{}", i);
        b.add_module(Module::new(name.clone(), 100.0, 1.0)).unwrap();
        b.add_edge(
            Edge::module("sender", name, "RAW", Direction::Up)
                .with_payload(100.0)
                .with_cpu_length(100.0),
        )
        .unwrap();
    }
    b.add_sensor_at("probe", "RAW", edge, Distribution::deterministic(1.0))
        .unwrap();
    b.record_deliveries(false);
    b
}

// ============================================================================
// Topology Benchmarks
// ============================================================================

fn bench_path_between(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_between");

    for depth in [2u32, 4, 6].iter() {
        let (topo, leaf) = fanout_tree(3, *depth);
        let first_child = NodeId(1);
        group.bench_with_input(BenchmarkId::new("depth", depth), &topo, |b, topo| {
            b.iter(|| black_box(topo.path_between(first_child, leaf).unwrap()));
        });
    }

    group.finish();
}

// ============================================================================
// Placement Benchmarks
// ============================================================================

fn bench_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement");

    for modules in [10usize, 50, 200].iter() {
        let (topo, leaf) = fanout_tree(4, 4);
        let mut app = fogtap::Application::new("chain");
        for i in 0..*modules {
            app.add_module(Module::new(format!("m{}", i), 300.0, 64.0)).unwrap();
            if i > 0 {
                app.add_edge(Edge::module(
                    format!("m{}", i - 1),
                    format!("m{}", i),
                    "T",
                    Direction::Up,
                ))
                .unwrap();
            }
        }
        app.add_edge(Edge::sensor("probe", "m0", "T")).unwrap();
        let sensors = vec![Sensor::new("probe", "T", leaf, Distribution::deterministic(1.0))];

        group.throughput(Throughput::Elements(*modules as u64));
        group.bench_with_input(BenchmarkId::new("modules", modules), modules, |b, _| {
            b.iter(|| {
                black_box(placement::plan(&topo, &app, &sensors, &[], &PlacementPins::new()).unwrap())
            });
        });
    }

    group.finish();
}

// ============================================================================
// Run Benchmarks
// ============================================================================

fn bench_multicast_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("multicast_run");

    for receivers in [1usize, 8, 64].iter() {
        group.throughput(Throughput::Elements(*receivers as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::new("receivers", receivers),
            receivers,
            |b, &receivers| {
                b.iter_batched(
                    || multicast(receivers).resolve_placement().unwrap(),
                    |mut sim| {
                        sim.run(1000.0).unwrap();
                        black_box(sim.finish().stats.engine.deliveries);
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

// ============================================================================
// Event Queue Benchmarks
// ============================================================================

fn bench_event_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue");

    for num_events in [1000usize, 10000, 100000].iter() {
        group.throughput(Throughput::Elements(*num_events as u64));

        group.bench_with_input(
            BenchmarkId::new("push_pop", num_events),
            num_events,
            |b, &num_events| {
                b.iter(|| {
                    let mut queue = EventQueue::new();
                    for i in 0..num_events {
                        // interleave times so the heap actually reorders
                        let time = ((i * 7919) % num_events) as f64;
                        queue.schedule_at(time, EventPayload::SensorEmit { sensor: "probe".into() });
                    }
                    while queue.pop_next().is_some() {}
                    black_box(queue.peak_len());
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Criterion Groups
// ============================================================================

criterion_group!(
    benches,
    bench_path_between,
    bench_placement,
    bench_multicast_run,
    bench_event_queue,
);

criterion_main!(benches);
