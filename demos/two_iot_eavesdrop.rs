//! Eavesdropping on a two-IoT chain.
//!
//! Loads `two_iot_eavesdrop.yaml`, runs it once as written and once with
//! the attacker removed, and compares what the tap saw against what it
//! cost the legitimate chain.
//!
//! Run with: `cargo run --example two_iot_eavesdrop [-- path/to/scenario.yaml]`

use std::path::PathBuf;

use fogtap::config::ScenarioConfig;
use fogtap::{ScenarioError, SimulationReport};

const ATTACKER: &str = "attacker";
const SCENARIO: &str = "demos/two_iot_eavesdrop.yaml";

// -----------------------------------------------------------------------------
// Scenario variants
// -----------------------------------------------------------------------------

/// The same scenario with the attacker module and every edge touching it
/// stripped out.
fn without_attacker(config: &ScenarioConfig) -> ScenarioConfig {
    let mut plain = config.clone();
    plain.simulation.name = Some("two_iot_plain".into());
    plain.application.modules.retain(|m| m.name != ATTACKER);
    plain
        .application
        .edges
        .retain(|e| e.source != ATTACKER && e.destination != ATTACKER);
    plain.application.mappings.retain(|m| m.module != ATTACKER);
    plain.placement.remove(ATTACKER);
    plain
}

fn print_report(title: &str, report: &SimulationReport) {
    println!("---- {} ----", title);
    for (module, node) in report.placement.iter() {
        println!("  {:<10} on {}", module, node);
    }
    println!("{}", report.stats.summary());
}

fn display_arrivals(report: &SimulationReport) -> Vec<f64> {
    report
        .deliveries_to("actuator:displayB")
        .map(|d| d.arrival_at)
        .collect()
}

// -----------------------------------------------------------------------------
// Main
// -----------------------------------------------------------------------------

fn main() -> Result<(), ScenarioError> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SCENARIO));

    let tapped_config = ScenarioConfig::from_file(&path)?;
    fogtap::init_logging(&tapped_config.simulation.log_level);
    let plain_config = without_attacker(&tapped_config);

    println!("==== Two-IoT eavesdropping example ====");
    println!("scenario: {}\n", path.display());

    let plain = plain_config.run()?;
    let tapped = tapped_config.run()?;
    print_report("without attacker", &plain);
    print_report("with attacker", &tapped);

    let observed = tapped.deliveries_to(ATTACKER).count();
    let emitted = tapped
        .stats
        .modules
        .get("sender")
        .map(|m| m.emitted)
        .unwrap_or(0);
    println!("attacker observed {} of {} sender emissions", observed, emitted);

    let extra_usage = tapped.stats.network_usage() - plain.stats.network_usage();
    println!("network usage added by the tap: {:.3}", extra_usage);

    if display_arrivals(&plain) == display_arrivals(&tapped) {
        println!("legitimate chain timing unchanged by the tap");
    } else {
        println!("legitimate chain timing CHANGED by the tap");
    }

    for summary in &tapped.stats.loops {
        match summary.mean {
            Some(mean) => println!("loop {}: {} samples, mean {:.3}", summary.name, summary.count, mean),
            None => println!("loop {}: no completed samples", summary.name),
        }
    }

    Ok(())
}
