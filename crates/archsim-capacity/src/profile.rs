//! Capacity profiles and the latency curve

use crate::constants::CurveShape;
use archsim_model::{CacheStrategy, ComponentKind, TrafficClass};
use serde::{Deserialize, Serialize};

/// Latency as a function of utilization
///
/// `latency(u) = base * (1 + slope*u + penalty*max(0, (u - knee)/(1 - knee))^2)`
/// with `u` clamped to `[0, max_utilization]`. The curve is non-decreasing
/// everywhere and strictly increasing whenever `base > 0` and `slope > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyCurve {
    /// Latency at zero load (ms)
    pub base_ms: f64,
    /// Queueing knee
    pub knee: f64,
    /// Linear slope
    pub slope: f64,
    /// Quadratic penalty past the knee
    pub penalty: f64,
    /// Utilization ceiling
    pub max_utilization: f64,
}

impl LatencyCurve {
    /// Build a curve from a base latency and shared shape
    #[inline]
    #[must_use]
    pub const fn new(base_ms: f64, shape: &CurveShape) -> Self {
        Self {
            base_ms,
            knee: shape.knee_utilization,
            slope: shape.linear_slope,
            penalty: shape.queueing_penalty,
            max_utilization: shape.max_utilization,
        }
    }

    /// Clamp a utilization into the curve's domain; NaN saturates
    #[inline]
    #[must_use]
    pub fn clamp(&self, utilization: f64) -> f64 {
        if utilization.is_nan() {
            self.max_utilization
        } else {
            utilization.clamp(0.0, self.max_utilization)
        }
    }

    /// Latency (ms) at the given utilization
    #[must_use]
    pub fn latency_ms(&self, utilization: f64) -> f64 {
        let u = self.clamp(utilization);
        let over = ((u - self.knee) / (1.0 - self.knee)).max(0.0);
        self.base_ms * self.penalty.mul_add(over * over, self.slope.mul_add(u, 1.0))
    }
}

/// Which fault class takes a component down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureDomain {
    /// Never fails (traffic source)
    None,
    /// Network plumbing
    Network,
    /// Stateless compute
    Compute,
    /// In-memory cache state
    Cache,
    /// Durable storage
    Storage,
}

/// Cache-specific behavior carried on a cache profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheBehavior {
    /// Fraction of reads served by the cache when warm
    pub hit_ratio: f64,
    /// Write handling
    pub strategy: CacheStrategy,
}

/// Load ratios and admitted fractions for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    /// Utilization fed to the latency curve (not clamped)
    pub utilization: f64,
    /// Fraction of offered reads served
    pub reads: f64,
    /// Fraction of offered writes served
    pub writes: f64,
}

impl Admission {
    /// Admitted fraction for a class
    #[inline]
    #[must_use]
    pub const fn for_class(&self, class: TrafficClass) -> f64 {
        match class {
            TrafficClass::Read => self.reads,
            TrafficClass::Write => self.writes,
        }
    }
}

/// Derived capacity of one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityProfile {
    /// Component kind
    pub kind: ComponentKind,
    /// Read ceiling (rps)
    pub max_throughput_reads: f64,
    /// Write ceiling (rps)
    pub max_throughput_writes: f64,
    /// Zero-load latency (ms)
    pub base_latency_ms: f64,
    /// Latency under load
    pub latency_curve: LatencyCurve,
    /// Fault class
    pub failure_domain: FailureDomain,
    /// Reads and writes draw on one budget
    pub shared_pool: bool,
    /// Present on caches only
    pub cache: Option<CacheBehavior>,
    /// Read replicas serving traffic (databases)
    pub replicas: u32,
    /// Write ceiling of a single leader, kept after a replica is promoted
    pub leader_write_ceiling: f64,
}

impl CapacityProfile {
    /// Ceiling for a traffic class
    #[inline]
    #[must_use]
    pub const fn max_throughput(&self, class: TrafficClass) -> f64 {
        match class {
            TrafficClass::Read => self.max_throughput_reads,
            TrafficClass::Write => self.max_throughput_writes,
        }
    }

    /// Latency (ms) at the given utilization
    #[inline]
    #[must_use]
    pub fn latency_ms(&self, utilization: f64) -> f64 {
        self.latency_curve.latency_ms(utilization)
    }

    /// Whether the component serves nothing
    #[inline]
    #[must_use]
    pub fn is_down(&self) -> bool {
        self.max_throughput_reads <= 0.0 && self.max_throughput_writes <= 0.0
    }

    /// Compute utilization and admitted fractions for offered demand
    ///
    /// A shared pool sheds both classes proportionally; separate pools
    /// shed each class against its own ceiling. A zero ceiling facing
    /// demand saturates utilization and admits nothing.
    #[must_use]
    pub fn admit(&self, reads: f64, writes: f64) -> Admission {
        let read_ratio = load_ratio(reads, self.max_throughput_reads);
        let write_ratio = load_ratio(writes, self.max_throughput_writes);

        if self.shared_pool {
            let utilization = read_ratio + write_ratio;
            let fraction = admitted(utilization);
            Admission {
                utilization,
                reads: fraction,
                writes: fraction,
            }
        } else {
            Admission {
                utilization: read_ratio.max(write_ratio),
                reads: admitted(read_ratio),
                writes: admitted(write_ratio),
            }
        }
    }

    /// Profile with every ceiling zeroed
    #[must_use]
    pub fn crashed(&self) -> Self {
        Self {
            max_throughput_reads: 0.0,
            max_throughput_writes: 0.0,
            ..self.clone()
        }
    }

    /// Profile after a replica has been promoted to replace a failed leader
    ///
    /// One node is gone: reads lose that node's share and writes fall back to
    /// what one leader sustains. Without replicas there is nothing to promote.
    #[must_use]
    pub fn with_replica_promoted(&self) -> Option<Self> {
        if self.replicas == 0 {
            return None;
        }
        let nodes = f64::from(self.replicas) + 1.0;
        Some(Self {
            max_throughput_reads: self.max_throughput_reads * (nodes - 1.0) / nodes,
            max_throughput_writes: self.max_throughput_writes.min(self.leader_write_ceiling),
            replicas: self.replicas - 1,
            ..self.clone()
        })
    }
}

fn load_ratio(demand: f64, ceiling: f64) -> f64 {
    if demand <= 0.0 {
        0.0
    } else if ceiling <= 0.0 {
        f64::INFINITY
    } else {
        demand / ceiling
    }
}

fn admitted(ratio: f64) -> f64 {
    if ratio <= 1.0 { 1.0 } else { 1.0 / ratio }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn curve(base_ms: f64) -> LatencyCurve {
        LatencyCurve::new(base_ms, &CurveShape::default())
    }

    fn app_profile(capacity: f64) -> CapacityProfile {
        CapacityProfile {
            kind: ComponentKind::AppServer,
            max_throughput_reads: capacity,
            max_throughput_writes: capacity,
            base_latency_ms: 15.0,
            latency_curve: curve(15.0),
            failure_domain: FailureDomain::Compute,
            shared_pool: true,
            cache: None,
            replicas: 0,
            leader_write_ceiling: capacity,
        }
    }

    #[test]
    fn latency_grows_slowly_below_knee_and_sharply_past_it() {
        let curve = curve(10.0);
        assert!((curve.latency_ms(0.0) - 10.0).abs() < 1e-9);
        assert!(curve.latency_ms(0.5) < 11.0);
        assert!(curve.latency_ms(1.5) > 3.0 * curve.latency_ms(0.8));
    }

    #[test]
    fn latency_saturates_at_ceiling() {
        let curve = curve(10.0);
        assert_eq!(curve.latency_ms(100.0), curve.latency_ms(4.0));
        assert_eq!(curve.latency_ms(f64::INFINITY), curve.latency_ms(4.0));
        assert_eq!(curve.latency_ms(f64::NAN), curve.latency_ms(4.0));
        assert!(curve.latency_ms(4.0).is_finite());
    }

    #[test]
    fn shared_pool_sheds_proportionally() {
        let admission = app_profile(1000.0).admit(1500.0, 500.0);
        assert!((admission.utilization - 2.0).abs() < 1e-12);
        assert!((admission.reads - 0.5).abs() < 1e-12);
        assert!((admission.writes - 0.5).abs() < 1e-12);
    }

    #[test]
    fn separate_pools_shed_per_class() {
        let profile = CapacityProfile {
            shared_pool: false,
            max_throughput_reads: 2000.0,
            max_throughput_writes: 1000.0,
            ..app_profile(0.0)
        };
        let admission = profile.admit(1000.0, 2000.0);
        assert_eq!(admission.reads, 1.0);
        assert!((admission.writes - 0.5).abs() < 1e-12);
        assert!((admission.utilization - 2.0).abs() < 1e-12);
    }

    #[test]
    fn crashed_profile_admits_nothing() {
        let crashed = app_profile(1000.0).crashed();
        assert!(crashed.is_down());
        let admission = crashed.admit(10.0, 0.0);
        assert_eq!(admission.reads, 0.0);
        assert!(admission.utilization.is_infinite());
        assert_eq!(crashed.admit(0.0, 0.0).reads, 1.0);
    }

    #[test]
    fn promotion_requires_a_replica() {
        let mut profile = app_profile(3000.0);
        assert!(profile.with_replica_promoted().is_none());

        profile.replicas = 2;
        let promoted = profile.with_replica_promoted().unwrap();
        assert!((promoted.max_throughput_reads - 2000.0).abs() < 1e-9);
        assert_eq!(promoted.max_throughput_writes, 3000.0);
        assert_eq!(promoted.replicas, 1);
    }

    #[test]
    fn promotion_drops_writes_to_one_leader() {
        let profile = CapacityProfile {
            shared_pool: false,
            max_throughput_writes: 2000.0,
            leader_write_ceiling: 1000.0,
            replicas: 1,
            ..app_profile(2000.0)
        };
        let promoted = profile.with_replica_promoted().unwrap();
        assert_eq!(promoted.max_throughput_writes, 1000.0);
        assert_eq!(promoted.leader_write_ceiling, 1000.0);
    }

    proptest! {
        #[test]
        fn latency_is_non_decreasing(base in 0.0f64..100.0, a in 0.0f64..10.0, b in 0.0f64..10.0) {
            let curve = curve(base);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(curve.latency_ms(lo) <= curve.latency_ms(hi));
        }
    }
}
