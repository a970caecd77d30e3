//! Load propagation along routed lanes
//!
//! Every routed path becomes a lane carrying its share of one class's load.
//! Each class visits its components in its own topological order; at each
//! one the demand of every arriving lane is summed, the component's profile
//! decides what fraction is served, and only served load moves on.
//!
//! Reads and writes may cross the same component in opposite directions, so
//! there is no single order for both. A component both classes reach admits
//! against the demand of the two together, and a tick repeats its sweep
//! until that combined demand settles.

use crate::error::{InternalError, RouteError};
use crate::router::{topological_order, Routes};
use archsim_capacity::CapacityProfile;
use archsim_model::{Graph, OfferedLoad, TrafficClass};
use serde::{Deserialize, Serialize};

/// Requests that completed with the same latency during one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    /// End-to-end latency (ms)
    pub latency_ms: f64,
    /// Number of requests
    pub requests: f64,
}

/// One component's view of a tick (loads in requests per second)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTick {
    /// Component index, declaration order
    pub component: usize,
    /// Demand arriving
    pub offered_load: f64,
    /// Demand served
    pub served_load: f64,
    /// Demand shed
    pub dropped_load: f64,
    /// Demand utilization, clamped to the latency curve's ceiling
    pub utilization: f64,
    /// Latency added by this component
    pub latency_ms: f64,
}

/// Outcome of one simulated tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTick {
    /// Simulated second the tick starts at
    pub time_second: u32,
    /// Tick length
    pub duration_seconds: u32,
    /// Requests entering the system
    pub offered: f64,
    /// Requests completed
    pub served: f64,
    /// Requests dropped anywhere on their path
    pub failed: f64,
    /// Latency distribution of completed requests
    pub samples: Vec<LatencySample>,
    /// Per-component detail, processing order
    pub components: Vec<ComponentTick>,
}

impl SimulationTick {
    /// Fraction of offered requests that failed
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.offered > 0.0 {
            self.failed / self.offered
        } else {
            0.0
        }
    }

    /// Reject NaN, infinite or negative quantities
    pub(crate) fn check(&self, graph: &Graph) -> Result<(), InternalError> {
        let time_second = self.time_second;
        let verify = |quantity: &'static str, value: f64, component: Option<usize>| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(InternalError::InvalidQuantity {
                    quantity,
                    value,
                    time_second,
                    component: component
                        .and_then(|index| graph.component_at(index))
                        .map(|c| c.id().clone()),
                })
            }
        };

        verify("offered requests", self.offered, None)?;
        verify("served requests", self.served, None)?;
        verify("failed requests", self.failed, None)?;
        for sample in &self.samples {
            verify("request latency", sample.latency_ms, None)?;
            verify("sample weight", sample.requests, None)?;
        }
        for tick in &self.components {
            let at = Some(tick.component);
            verify("offered load", tick.offered_load, at)?;
            verify("served load", tick.served_load, at)?;
            verify("dropped load", tick.dropped_load, at)?;
            verify("utilization", tick.utilization, at)?;
            verify("component latency", tick.latency_ms, at)?;
        }
        Ok(())
    }
}

/// One routed path of one class
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lane {
    pub(crate) class: TrafficClass,
    pub(crate) hops: Vec<usize>,
    pub(crate) weight: f64,
}

/// Flatten route sets into lanes, reads first
pub(crate) fn lanes(routes: &Routes) -> Vec<Lane> {
    routes
        .sets
        .iter()
        .flat_map(|set| {
            set.paths.iter().map(|path| Lane {
                class: set.class,
                hops: path.hops.clone(),
                weight: path.weight,
            })
        })
        .collect()
}

/// Sweeps allowed before a tick settles for the last computed demand
const MAX_SWEEPS: usize = 64;

/// Relative change in shared demand below which a sweep counts as settled
const SETTLED: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Arrival {
    lane: usize,
    hop: usize,
}

/// Inputs of one tick that do not depend on the plan
pub(crate) struct TickInput<'l> {
    pub(crate) time_second: u32,
    pub(crate) duration_seconds: u32,
    pub(crate) offered: OfferedLoad,
    pub(crate) lanes: &'l [Lane],
    pub(crate) transfer_ms: f64,
}

/// Lanes of one class, ordered among themselves
#[derive(Debug, Clone)]
struct ClassFlow {
    class: TrafficClass,
    order: Vec<usize>,
    /// Per component, the hops of this class landing on it
    arrivals: Vec<Vec<Arrival>>,
}

/// Per-class processing orders and the components more than one class reaches
#[derive(Debug, Clone)]
pub(crate) struct FlowPlan {
    classes: Vec<ClassFlow>,
    order: Vec<usize>,
    shared: Vec<bool>,
}

impl FlowPlan {
    /// Build a plan; `substitute` moves every hop on `.0` to `.1`
    pub(crate) fn build(
        graph: &Graph,
        lanes: &[Lane],
        substitute: Option<(usize, usize)>,
    ) -> Result<Self, RouteError> {
        let remap = |hop: usize| match substitute {
            Some((from, to)) if hop == from => to,
            _ => hop,
        };
        let remapped: Vec<Vec<usize>> = lanes
            .iter()
            .map(|lane| lane.hops.iter().map(|&hop| remap(hop)).collect())
            .collect();

        let mut classes = Vec::new();
        let mut order = Vec::new();
        for class in [TrafficClass::Read, TrafficClass::Write] {
            let members: Vec<usize> = (0..lanes.len()).filter(|&lane| lanes[lane].class == class).collect();
            if members.is_empty() {
                continue;
            }
            let class_order = topological_order(graph, members.iter().map(|&lane| remapped[lane].as_slice()))?;

            let mut arrivals = vec![Vec::new(); graph.len()];
            for &lane in &members {
                for (hop, &node) in remapped[lane].iter().enumerate() {
                    if let Some(slot) = arrivals.get_mut(node) {
                        slot.push(Arrival { lane, hop });
                    }
                }
            }
            for &node in &class_order {
                if !order.contains(&node) {
                    order.push(node);
                }
            }
            classes.push(ClassFlow {
                class,
                order: class_order,
                arrivals,
            });
        }

        let shared = (0..graph.len())
            .map(|node| {
                classes
                    .iter()
                    .filter(|flow| flow.arrivals.get(node).is_some_and(|hops| !hops.is_empty()))
                    .count()
                    > 1
            })
            .collect();
        Ok(Self { classes, order, shared })
    }

    /// Every component visited, each class's components in that class's order
    #[cfg(test)]
    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }

    /// Push one tick of load through the plan
    ///
    /// Cache hits on read lanes complete at the cache; everything else
    /// completes at the lane's last hop. Latency is the sum of the
    /// latencies of every component visited plus the response transfer.
    pub(crate) fn propagate<'p>(
        &self,
        input: &TickInput<'_>,
        profile_of: impl Fn(usize) -> Option<&'p CapacityProfile>,
        hit_scale_of: impl Fn(usize) -> f64,
    ) -> Result<SimulationTick, InternalError> {
        let seconds = f64::from(input.duration_seconds);
        let nodes = self.shared.len();
        let mut demand = vec![OfferedLoad::default(); nodes];

        let mut sweeps = 0;
        let sweep = loop {
            let mut sweep = Sweep::new(input, nodes);
            let changed = self.sweep(input, &profile_of, &hit_scale_of, &mut demand, &mut sweep)?;
            sweeps += 1;
            if !changed || sweeps >= MAX_SWEEPS {
                break sweep;
            }
        };

        let mut components = Vec::with_capacity(self.order.len());
        for &node in &self.order {
            let profile = profile_of(node).ok_or(InternalError::MissingProfile(node))?;
            let load = demand.get(node).copied().unwrap_or_default();
            let admission = profile.admit(load.reads, load.writes);
            let offered_load = load.total();
            let served_load = sweep.served_at.get(node).copied().unwrap_or_default();
            components.push(ComponentTick {
                component: node,
                offered_load,
                served_load,
                dropped_load: (offered_load - served_load).max(0.0),
                utilization: profile.latency_curve.clamp(admission.utilization),
                latency_ms: profile.latency_ms(admission.utilization),
            });
        }

        Ok(SimulationTick {
            time_second: input.time_second,
            duration_seconds: input.duration_seconds,
            offered: sweep.offered_rate * seconds,
            served: sweep.served_rate * seconds,
            failed: sweep.failed_rate * seconds,
            samples: sweep.samples,
            components,
        })
    }

    /// Run every class once; true when the demand on a shared component moved
    fn sweep<'p>(
        &self,
        input: &TickInput<'_>,
        profile_of: &impl Fn(usize) -> Option<&'p CapacityProfile>,
        hit_scale_of: &impl Fn(usize) -> f64,
        demand: &mut [OfferedLoad],
        sweep: &mut Sweep,
    ) -> Result<bool, InternalError> {
        let lanes = input.lanes;
        let mut changed = false;

        for flow in &self.classes {
            for &node in &flow.order {
                let profile = profile_of(node).ok_or(InternalError::MissingProfile(node))?;
                let arrivals = flow.arrivals.get(node).map_or(&[][..], Vec::as_slice);
                let arriving: f64 = arrivals.iter().map(|arrival| sweep.in_flight[arrival.lane]).sum();

                let load = &mut demand[node];
                let previous = load.for_class(flow.class);
                match flow.class {
                    TrafficClass::Read => load.reads = arriving,
                    TrafficClass::Write => load.writes = arriving,
                }
                if self.shared[node] && (previous - arriving).abs() > SETTLED * arriving.max(1.0) {
                    changed = true;
                }

                let admission = profile.admit(load.reads, load.writes);
                let fraction = admission.for_class(flow.class);
                let node_latency = profile.latency_ms(admission.utilization);
                let hit_ratio = profile
                    .cache
                    .map_or(0.0, |cache| cache.hit_ratio * hit_scale_of(node));

                for arrival in arrivals {
                    let lane = &lanes[arrival.lane];
                    let carried = sweep.in_flight[arrival.lane];
                    let served = carried * fraction;
                    sweep.failed_rate += carried - served;
                    sweep.served_at[node] += served;
                    sweep.latency[arrival.lane] += node_latency;
                    let lane_latency = sweep.latency[arrival.lane];

                    let mut continuing = served;
                    if arrival.hop + 1 >= lane.hops.len() {
                        sweep.complete(continuing, lane_latency, input);
                        continuing = 0.0;
                    } else if lane.class == TrafficClass::Read && hit_ratio > 0.0 {
                        let hits = served * hit_ratio;
                        sweep.complete(hits, lane_latency, input);
                        continuing -= hits;
                    }
                    sweep.in_flight[arrival.lane] = continuing;
                }
            }
        }
        Ok(changed)
    }
}

/// Accumulators of one sweep over every class
struct Sweep {
    in_flight: Vec<f64>,
    latency: Vec<f64>,
    served_at: Vec<f64>,
    samples: Vec<LatencySample>,
    offered_rate: f64,
    served_rate: f64,
    failed_rate: f64,
}

impl Sweep {
    fn new(input: &TickInput<'_>, nodes: usize) -> Self {
        let in_flight: Vec<f64> = input
            .lanes
            .iter()
            .map(|lane| input.offered.for_class(lane.class) * lane.weight)
            .collect();
        Self {
            offered_rate: in_flight.iter().sum(),
            latency: vec![0.0; in_flight.len()],
            in_flight,
            served_at: vec![0.0; nodes],
            samples: Vec::new(),
            served_rate: 0.0,
            failed_rate: 0.0,
        }
    }

    fn complete(&mut self, rate: f64, latency_ms: f64, input: &TickInput<'_>) {
        if rate > 0.0 {
            self.served_rate += rate;
            self.samples.push(LatencySample {
                latency_ms: latency_ms + input.transfer_ms,
                requests: rate * f64::from(input.duration_seconds),
            });
        }
    }
}
