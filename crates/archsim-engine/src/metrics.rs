//! Streaming aggregation of tick records into a run result
//!
//! Latency percentiles are nearest-rank over the request-weighted latency
//! distribution of completed requests. A tick counts as downtime when its
//! error rate exceeds the configured threshold.

use crate::config::SimulationSettings;
use crate::simulator::SimulationTick;
use archsim_model::{ComponentId, ComponentKind, Graph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Run-level view of one routed component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    /// Component id
    pub id: ComponentId,
    /// Component kind
    pub kind: ComponentKind,
    /// Highest demand utilization seen
    pub peak_utilization: f64,
    /// Highest per-component latency seen (ms)
    pub peak_latency_ms: f64,
    /// Requests served over the run
    pub served_requests: f64,
    /// Requests shed over the run
    pub dropped_requests: f64,
}

/// One entry of the bounded per-tick trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    /// Tick start
    pub time_second: u32,
    /// Requests offered
    pub offered: f64,
    /// Requests failed
    pub failed: f64,
    /// Tick error rate
    pub error_rate: f64,
    /// Counted as downtime
    pub down: bool,
}

/// Aggregate metrics of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Simulated duration
    pub duration_seconds: u32,
    /// Median latency; `None` when no request completed
    pub p50_latency_ms: Option<f64>,
    /// 95th percentile latency
    pub p95_latency_ms: Option<f64>,
    /// 99th percentile latency
    pub p99_latency_ms: Option<f64>,
    /// Request-weighted mean latency
    pub mean_latency_ms: Option<f64>,
    /// Failed over offered requests
    pub error_rate: f64,
    /// `1 - downtime / duration`
    pub availability: f64,
    /// Seconds spent in down ticks
    pub downtime_seconds: f64,
    /// Requests offered
    pub total_requests: f64,
    /// Requests completed
    pub served_requests: f64,
    /// Requests failed
    pub failed_requests: f64,
    /// Routed components, declaration order
    pub components: Vec<ComponentSummary>,
    /// Leading ticks of the run
    pub trace: Vec<TickSummary>,
    /// Whether ticks were left out of the trace
    pub trace_truncated: bool,
}

impl SimulationResult {
    /// Components that shed load, heaviest first
    #[must_use]
    pub fn bottlenecks(&self) -> Vec<&ComponentSummary> {
        let mut shedding: Vec<_> = self
            .components
            .iter()
            .filter(|component| component.dropped_requests > 0.0)
            .collect();
        shedding.sort_by(|a, b| b.dropped_requests.total_cmp(&a.dropped_requests));
        shedding
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ComponentAccumulator {
    seen: bool,
    peak_utilization: f64,
    peak_latency_ms: f64,
    served_requests: f64,
    dropped_requests: f64,
}

/// Streaming aggregator; feed ticks in order with [`record`](Self::record)
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    duration_seconds: u32,
    downtime_error_threshold: f64,
    trace_limit: usize,
    components: Vec<(ComponentId, ComponentKind, ComponentAccumulator)>,
    /// Latency bits -> completed requests
    latencies: BTreeMap<u64, f64>,
    offered: f64,
    served: f64,
    failed: f64,
    downtime_seconds: f64,
    trace: Vec<TickSummary>,
    trace_truncated: bool,
}

impl MetricsAggregator {
    /// Aggregator for a run of `duration_seconds` over `graph`
    #[must_use]
    pub fn new(graph: &Graph, duration_seconds: u32, settings: &SimulationSettings) -> Self {
        Self {
            duration_seconds,
            downtime_error_threshold: settings.downtime_error_threshold,
            trace_limit: settings.trace_limit,
            components: graph
                .components()
                .map(|component| (component.id().clone(), component.kind(), ComponentAccumulator::default()))
                .collect(),
            latencies: BTreeMap::new(),
            offered: 0.0,
            served: 0.0,
            failed: 0.0,
            downtime_seconds: 0.0,
            trace: Vec::new(),
            trace_truncated: false,
        }
    }

    /// Fold one tick in
    pub fn record(&mut self, tick: &SimulationTick) {
        let seconds = f64::from(tick.duration_seconds);
        self.offered += tick.offered;
        self.served += tick.served;
        self.failed += tick.failed;

        for sample in &tick.samples {
            if sample.requests > 0.0 {
                *self.latencies.entry(latency_key(sample.latency_ms)).or_insert(0.0) += sample.requests;
            }
        }

        for component in &tick.components {
            if let Some((_, _, acc)) = self.components.get_mut(component.component) {
                acc.seen = true;
                acc.peak_utilization = acc.peak_utilization.max(component.utilization);
                acc.peak_latency_ms = acc.peak_latency_ms.max(component.latency_ms);
                acc.served_requests += component.served_load * seconds;
                acc.dropped_requests += component.dropped_load * seconds;
            }
        }

        let error_rate = tick.error_rate();
        let down = error_rate > self.downtime_error_threshold;
        if down {
            self.downtime_seconds += seconds;
        }

        if self.trace.len() < self.trace_limit {
            self.trace.push(TickSummary {
                time_second: tick.time_second,
                offered: tick.offered,
                failed: tick.failed,
                error_rate,
                down,
            });
        } else {
            self.trace_truncated = true;
        }
    }

    /// Produce the run result
    #[must_use]
    pub fn finish(self) -> SimulationResult {
        let completed: f64 = self.latencies.values().sum();
        let mean_latency_ms = (completed > 0.0).then(|| {
            self.latencies
                .iter()
                .map(|(bits, requests)| f64::from_bits(*bits) * requests)
                .sum::<f64>()
                / completed
        });
        let error_rate = if self.offered > 0.0 {
            (self.failed / self.offered).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let availability = if self.duration_seconds > 0 {
            (1.0 - self.downtime_seconds / f64::from(self.duration_seconds)).clamp(0.0, 1.0)
        } else {
            1.0
        };

        SimulationResult {
            duration_seconds: self.duration_seconds,
            p50_latency_ms: percentile(&self.latencies, completed, 50.0),
            p95_latency_ms: percentile(&self.latencies, completed, 95.0),
            p99_latency_ms: percentile(&self.latencies, completed, 99.0),
            mean_latency_ms,
            error_rate,
            availability,
            downtime_seconds: self.downtime_seconds,
            total_requests: self.offered,
            served_requests: self.served,
            failed_requests: self.failed,
            components: self
                .components
                .into_iter()
                .filter(|(_, _, acc)| acc.seen)
                .map(|(id, kind, acc)| ComponentSummary {
                    id,
                    kind,
                    peak_utilization: acc.peak_utilization,
                    peak_latency_ms: acc.peak_latency_ms,
                    served_requests: acc.served_requests,
                    dropped_requests: acc.dropped_requests,
                })
                .collect(),
            trace: self.trace,
            trace_truncated: self.trace_truncated,
        }
    }
}

/// Aggregate a complete sequence of ticks
#[must_use]
pub fn aggregate<'t>(
    graph: &Graph,
    duration_seconds: u32,
    settings: &SimulationSettings,
    ticks: impl IntoIterator<Item = &'t SimulationTick>,
) -> SimulationResult {
    let mut aggregator = MetricsAggregator::new(graph, duration_seconds, settings);
    for tick in ticks {
        aggregator.record(tick);
    }
    aggregator.finish()
}

/// Order-preserving key for a non-negative latency
fn latency_key(latency_ms: f64) -> u64 {
    if latency_ms > 0.0 {
        latency_ms.to_bits()
    } else {
        0.0_f64.to_bits()
    }
}

/// Nearest-rank percentile over a weighted histogram
fn percentile(histogram: &BTreeMap<u64, f64>, total: f64, p: f64) -> Option<f64> {
    if total <= 0.0 {
        return None;
    }
    let rank = total * p / 100.0;
    let tolerance = total * 1e-12;
    let mut cumulative = 0.0;
    for (bits, requests) in histogram {
        cumulative += requests;
        if cumulative + tolerance >= rank {
            return Some(f64::from_bits(*bits));
        }
    }
    histogram.keys().next_back().map(|bits| f64::from_bits(*bits))
}
