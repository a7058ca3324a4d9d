//! End-to-end latency of application loops.
//!
//! A loop instance opens when the loop's first module emits a tuple for a
//! correlation id with no open instance, and closes when a tuple with the
//! same correlation id is delivered from the penultimate module into the
//! last one. Taps that are not part of a loop never touch it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::application::{AppLoop, Endpoint};
use crate::types::{CorrelationId, SimTime};

/// One completed loop instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoopSample {
    pub loop_index: usize,
    pub correlation: CorrelationId,
    pub started_at: SimTime,
    pub completed_at: SimTime,
}

impl LoopSample {
    pub fn latency(&self) -> SimTime {
        self.completed_at - self.started_at
    }
}

/// Why an instance never completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// Open longer than the configured timeout
    TimedOut,
    /// Still open when the simulation finished
    OpenAtTeardown,
}

/// A loop instance that started but never completed.
///
/// Reported, never raised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncompleteLoopWarning {
    pub loop_name: String,
    pub correlation: CorrelationId,
    pub started_at: SimTime,
    pub noticed_at: SimTime,
    pub reason: IncompleteReason,
}

/// Aggregate latency of one loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub name: String,
    pub modules: Vec<String>,
    /// Completed instances
    pub count: u64,
    pub min: Option<SimTime>,
    pub max: Option<SimTime>,
    pub mean: Option<SimTime>,
    /// Instances reported as incomplete
    pub incomplete: u64,
}

#[derive(Clone, Debug, Default)]
struct Running {
    count: u64,
    sum: SimTime,
    min: SimTime,
    max: SimTime,
    incomplete: u64,
}

impl Running {
    fn record(&mut self, latency: SimTime) {
        if self.count == 0 {
            self.min = latency;
            self.max = latency;
        } else {
            self.min = self.min.min(latency);
            self.max = self.max.max(latency);
        }
        self.count += 1;
        self.sum += latency;
    }
}

/// Tracks open loop instances and completed samples.
#[derive(Clone, Debug)]
pub struct LoopLatencyAccumulator {
    loops: Vec<AppLoop>,
    /// `(loop index, correlation)` → start time
    open: BTreeMap<(usize, CorrelationId), SimTime>,
    running: Vec<Running>,
    samples: Vec<LoopSample>,
    warnings: Vec<IncompleteLoopWarning>,
    timeout: Option<SimTime>,
}

impl LoopLatencyAccumulator {
    /// Creates an accumulator for `loops`. Without a timeout, instances stay
    /// open until [`finish`](Self::finish).
    ///
    /// Loops of fewer than two modules cannot complete and are skipped.
    pub fn new(loops: &[AppLoop], timeout: Option<SimTime>) -> Self {
        let loops: Vec<AppLoop> = loops
            .iter()
            .filter(|app_loop| {
                let usable = app_loop.modules.len() >= 2;
                if !usable {
                    tracing::warn!(app_loop = %app_loop.name(), "skipping loop with fewer than two modules");
                }
                usable
            })
            .cloned()
            .collect();
        Self {
            running: vec![Running::default(); loops.len()],
            loops,
            open: BTreeMap::new(),
            samples: Vec::new(),
            warnings: Vec::new(),
            timeout,
        }
    }

    /// Records that `module` emitted a tuple for `correlation` at `now`.
    pub fn on_emit(&mut self, module: &str, correlation: CorrelationId, now: SimTime) {
        for (index, app_loop) in self.loops.iter().enumerate() {
            if app_loop.first() == module {
                self.open.entry((index, correlation)).or_insert_with(|| {
                    tracing::trace!(app_loop = %app_loop.name(), correlation, now, "loop instance opened");
                    now
                });
            }
        }
    }

    /// Records a delivery and returns the loop instances it completed.
    pub fn on_delivery(
        &mut self,
        from: &Endpoint,
        to: &Endpoint,
        correlation: CorrelationId,
        now: SimTime,
    ) -> Vec<LoopSample> {
        let (Some(from), Some(to)) = (from.as_module(), to.as_module()) else {
            return Vec::new();
        };

        let mut completed = Vec::new();
        for (index, app_loop) in self.loops.iter().enumerate() {
            if app_loop.penultimate() != from || app_loop.last() != to {
                continue;
            }
            if let Some(started_at) = self.open.remove(&(index, correlation)) {
                let sample = LoopSample {
                    loop_index: index,
                    correlation,
                    started_at,
                    completed_at: now,
                };
                tracing::debug!(
                    app_loop = %app_loop.name(),
                    correlation,
                    latency = sample.latency(),
                    "loop instance completed"
                );
                self.running[index].record(sample.latency());
                completed.push(sample);
            }
        }
        self.samples.extend(completed.iter().cloned());
        completed
    }

    /// Expires instances open for longer than the timeout.
    pub fn expire(&mut self, now: SimTime) -> usize {
        let Some(timeout) = self.timeout else {
            return 0;
        };
        let stale: Vec<_> = self
            .open
            .iter()
            .filter(|&(_, &started)| now - started > timeout)
            .map(|(&key, _)| key)
            .collect();
        for key in &stale {
            if let Some(started_at) = self.open.remove(key) {
                self.warn(*key, started_at, now, IncompleteReason::TimedOut);
            }
        }
        stale.len()
    }

    /// Closes the accumulator, reporting every still-open instance.
    pub fn finish(&mut self, now: SimTime) {
        let open = std::mem::take(&mut self.open);
        for (key, started_at) in open {
            self.warn(key, started_at, now, IncompleteReason::OpenAtTeardown);
        }
    }

    /// Per-loop summaries in loop declaration order.
    pub fn summaries(&self) -> Vec<LoopSummary> {
        self.loops
            .iter()
            .zip(&self.running)
            .map(|(app_loop, r)| {
                let has = r.count > 0;
                LoopSummary {
                    name: app_loop.name(),
                    modules: app_loop.modules.clone(),
                    count: r.count,
                    min: has.then_some(r.min),
                    max: has.then_some(r.max),
                    mean: has.then(|| r.sum / r.count as f64),
                    incomplete: r.incomplete,
                }
            })
            .collect()
    }

    /// Completed samples in completion order.
    pub fn samples(&self) -> &[LoopSample] {
        &self.samples
    }

    pub fn warnings(&self) -> &[IncompleteLoopWarning] {
        &self.warnings
    }

    /// Number of instances currently open.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn warn(
        &mut self,
        (index, correlation): (usize, CorrelationId),
        started_at: SimTime,
        now: SimTime,
        reason: IncompleteReason,
    ) {
        let loop_name = self.loops[index].name();
        tracing::warn!(
            app_loop = %loop_name,
            correlation,
            started_at,
            ?reason,
            "incomplete loop instance"
        );
        self.running[index].incomplete += 1;
        self.warnings.push(IncompleteLoopWarning {
            loop_name,
            correlation,
            started_at,
            noticed_at: now,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str) -> Endpoint {
        Endpoint::Module(name.into())
    }

    fn talk_loop() -> Vec<AppLoop> {
        vec![AppLoop::new(["sender", "forwarder", "receiver"])]
    }

    #[test]
    fn test_completes_on_last_hop() {
        let mut acc = LoopLatencyAccumulator::new(&talk_loop(), None);
        acc.on_emit("sender", 0, 6.0);
        assert!(acc.on_delivery(&module("sender"), &module("forwarder"), 0, 9.5).is_empty());

        let done = acc.on_delivery(&module("forwarder"), &module("receiver"), 0, 12.7);
        assert_eq!(done.len(), 1);
        assert!((done[0].latency() - 6.7).abs() < 1e-9);
        assert_eq!(acc.open_count(), 0);

        let summary = &acc.summaries()[0];
        assert_eq!(summary.count, 1);
        assert_eq!(summary.name, "sender->forwarder->receiver");
        assert!((summary.mean.unwrap() - 6.7).abs() < 1e-9);
    }

    #[test]
    fn test_correlations_are_separate() {
        let mut acc = LoopLatencyAccumulator::new(&talk_loop(), None);
        acc.on_emit("sender", 0, 6.0);
        acc.on_emit("sender", 1, 11.0);
        // re-emission for an open correlation keeps the original start
        acc.on_emit("sender", 0, 7.0);

        acc.on_delivery(&module("forwarder"), &module("receiver"), 1, 17.0);
        acc.on_delivery(&module("forwarder"), &module("receiver"), 0, 13.0);

        let latencies: Vec<_> = acc.samples().iter().map(|s| s.latency()).collect();
        assert_eq!(latencies, vec![6.0, 7.0]);
        let summary = &acc.summaries()[0];
        assert_eq!(summary.min, Some(6.0));
        assert_eq!(summary.max, Some(7.0));
    }

    #[test]
    fn test_taps_do_not_complete() {
        let mut acc = LoopLatencyAccumulator::new(&talk_loop(), None);
        acc.on_emit("sender", 0, 6.0);
        assert!(acc.on_delivery(&module("sender"), &module("attacker"), 0, 8.0).is_empty());
        assert!(acc
            .on_delivery(&module("receiver"), &Endpoint::Actuator("displayB".into()), 0, 12.7)
            .is_empty());
        assert_eq!(acc.open_count(), 1);
    }

    #[test]
    fn test_timeout_and_teardown_warnings() {
        let mut acc = LoopLatencyAccumulator::new(&talk_loop(), Some(10.0));
        acc.on_emit("sender", 0, 0.0);
        acc.on_emit("sender", 1, 8.0);

        assert_eq!(acc.expire(5.0), 0);
        assert_eq!(acc.expire(12.0), 1);
        assert_eq!(acc.warnings()[0].reason, IncompleteReason::TimedOut);
        assert_eq!(acc.warnings()[0].correlation, 0);

        acc.finish(15.0);
        assert_eq!(acc.warnings().len(), 2);
        assert_eq!(acc.warnings()[1].reason, IncompleteReason::OpenAtTeardown);
        assert_eq!(acc.summaries()[0].incomplete, 2);
        assert_eq!(acc.summaries()[0].mean, None);
    }

    #[test]
    fn test_short_loops_are_skipped() {
        let loops = vec![
            AppLoop::new(["sender"]),
            AppLoop::new(Vec::<String>::new()),
            AppLoop::new(["sender", "forwarder"]),
        ];
        let mut acc = LoopLatencyAccumulator::new(&loops, None);
        acc.on_emit("sender", 0, 1.0);
        let done = acc.on_delivery(&module("sender"), &module("forwarder"), 0, 2.0);
        assert_eq!(done.len(), 1);
        assert_eq!(acc.summaries().len(), 1);
        assert_eq!(acc.summaries()[0].name, "sender->forwarder");
    }

    #[test]
    fn test_two_module_loop() {
        let loops = vec![AppLoop::new(["sender", "forwarder"])];
        let mut acc = LoopLatencyAccumulator::new(&loops, None);
        acc.on_emit("sender", 3, 6.0);
        let done = acc.on_delivery(&module("sender"), &module("forwarder"), 3, 9.5);
        assert_eq!(done[0].latency(), 3.5);
    }
}
