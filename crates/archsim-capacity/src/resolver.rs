//! Mapping from component kind + config to a capacity profile
//!
//! [`resolve`] is a pure function of the component config and the
//! constants. [`CapacityResolver`] memoizes it per `(kind, config hash)` so
//! concurrent grading runs over similar architectures share work.

use crate::constants::CapacityConstants;
use crate::error::CapacityError;
use crate::hash::ConfigHash;
use crate::profile::{CacheBehavior, CapacityProfile, FailureDomain, LatencyCurve};
use archsim_model::{
    Component, ComponentConfig, ComponentId, ComponentKind, DatabaseConfig, Graph, ReplicationMode,
};
use indexmap::IndexMap;
use moka::sync::Cache;
use std::sync::Arc;

/// Default number of cached profiles
pub const DEFAULT_CACHE_ENTRIES: u64 = 4096;

/// Resolve the capacity profile of one component
///
/// # Errors
/// Returns [`CapacityError::InvalidConfig`] if the config violates its
/// kind's constraints.
pub fn resolve(component: &Component, constants: &CapacityConstants) -> Result<CapacityProfile, CapacityError> {
    component
        .config()
        .validate()
        .map_err(|source| CapacityError::InvalidConfig {
            id: component.id().clone(),
            source,
        })?;

    let kind = component.kind();
    let profile = match component.config() {
        ComponentConfig::Client => pass_through(
            kind,
            constants.pass_through_max_rps,
            constants.client_latency_ms,
            FailureDomain::None,
            constants,
        ),
        ComponentConfig::LoadBalancer(config) => pass_through(
            kind,
            config.max_rps.unwrap_or(constants.pass_through_max_rps),
            constants.load_balancer_latency_ms,
            FailureDomain::Network,
            constants,
        ),
        ComponentConfig::MessageQueue(config) => pass_through(
            kind,
            config.max_rps.unwrap_or(constants.pass_through_max_rps),
            constants.message_queue_latency_ms,
            FailureDomain::Network,
            constants,
        ),
        ComponentConfig::Cdn(config) => pass_through(
            kind,
            config.max_rps.unwrap_or(constants.pass_through_max_rps),
            constants.cdn_latency_ms,
            FailureDomain::Network,
            constants,
        ),
        ComponentConfig::ObjectStore(config) => pass_through(
            kind,
            config.max_rps.unwrap_or(constants.pass_through_max_rps),
            constants.object_store_latency_ms,
            FailureDomain::Storage,
            constants,
        ),
        ComponentConfig::AppServer(config) => {
            let ceiling = f64::from(config.instances) * constants.app_server_rps_per_instance;
            CapacityProfile {
                kind,
                max_throughput_reads: ceiling,
                max_throughput_writes: ceiling,
                base_latency_ms: constants.app_server_latency_ms,
                latency_curve: LatencyCurve::new(constants.app_server_latency_ms, &constants.curve),
                failure_domain: FailureDomain::Compute,
                shared_pool: true,
                cache: None,
                replicas: 0,
                leader_write_ceiling: ceiling,
            }
        }
        ComponentConfig::Cache(config) => CapacityProfile {
            kind,
            max_throughput_reads: constants.cache_max_rps,
            max_throughput_writes: constants.cache_max_rps,
            base_latency_ms: constants.cache_latency_ms,
            latency_curve: LatencyCurve::new(constants.cache_latency_ms, &constants.curve),
            failure_domain: FailureDomain::Cache,
            shared_pool: true,
            cache: Some(CacheBehavior {
                hit_ratio: config.hit_ratio,
                strategy: config.strategy,
            }),
            replicas: 0,
            leader_write_ceiling: constants.cache_max_rps,
        },
        ComponentConfig::Database(config) => database(kind, config, constants),
    };
    Ok(profile)
}

fn pass_through(
    kind: ComponentKind,
    ceiling: f64,
    latency_ms: f64,
    failure_domain: FailureDomain,
    constants: &CapacityConstants,
) -> CapacityProfile {
    CapacityProfile {
        kind,
        max_throughput_reads: ceiling,
        max_throughput_writes: ceiling,
        base_latency_ms: latency_ms,
        latency_curve: LatencyCurve::new(latency_ms, &constants.curve),
        failure_domain,
        shared_pool: true,
        cache: None,
        replicas: 0,
        leader_write_ceiling: ceiling,
    }
}

/// Reads scale with every node holding data; writes scale with shards only,
/// since replicas replay the leader's writes.
fn database(kind: ComponentKind, config: &DatabaseConfig, constants: &CapacityConstants) -> CapacityProfile {
    let shards = f64::from(config.sharding.active_shards());
    let replicas = config.replication.active_replicas();

    let reads = constants.db_rps_per_instance * shards * (1.0 + f64::from(replicas));
    let leader_writes = if config.sharding.enabled {
        constants.db_rps_per_instance * shards
    } else {
        constants.single_leader_write_rps
    };
    let writes = if config.replication.enabled && config.replication.mode == ReplicationMode::MultiLeader {
        leader_writes * constants.multi_leader_write_multiplier
    } else {
        leader_writes
    };

    CapacityProfile {
        kind,
        max_throughput_reads: reads,
        max_throughput_writes: writes,
        base_latency_ms: constants.db_latency_ms,
        latency_curve: LatencyCurve::new(constants.db_latency_ms, &constants.curve),
        failure_domain: FailureDomain::Storage,
        shared_pool: false,
        cache: None,
        replicas,
        leader_write_ceiling: leader_writes,
    }
}

/// Profile cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ProfileKey {
    kind: ComponentKind,
    config: ConfigHash,
}

/// Memoizing resolver shared across runs
#[derive(Debug, Clone)]
pub struct CapacityResolver {
    constants: Arc<CapacityConstants>,
    cache: Cache<ProfileKey, Arc<CapacityProfile>>,
}

impl CapacityResolver {
    /// Create a resolver with default cache size
    ///
    /// # Errors
    /// Returns error if the constants are out of range
    pub fn new(constants: CapacityConstants) -> Result<Self, CapacityError> {
        Self::with_capacity(constants, DEFAULT_CACHE_ENTRIES)
    }

    /// Create a resolver holding at most `max_entries` profiles
    ///
    /// # Errors
    /// Returns error if the constants are out of range
    pub fn with_capacity(constants: CapacityConstants, max_entries: u64) -> Result<Self, CapacityError> {
        constants.validate()?;
        Ok(Self {
            constants: Arc::new(constants),
            cache: Cache::new(max_entries),
        })
    }

    /// Constants in use
    #[inline]
    #[must_use]
    pub fn constants(&self) -> &CapacityConstants {
        &self.constants
    }

    /// Resolve one component, reusing a cached profile for identical configs
    ///
    /// # Errors
    /// Returns error if the config is invalid
    pub fn resolve(&self, component: &Component) -> Result<Arc<CapacityProfile>, CapacityError> {
        let key = ProfileKey {
            kind: component.kind(),
            config: ConfigHash::of(component.config())?,
        };
        self.cache
            .try_get_with(key, || -> Result<_, CapacityError> {
                let profile = resolve(component, &self.constants)?;
                tracing::trace!(
                    component = %component.id(),
                    kind = %key.kind,
                    config = %key.config.short(),
                    reads = profile.max_throughput_reads,
                    writes = profile.max_throughput_writes,
                    "resolved capacity profile"
                );
                Ok(Arc::new(profile))
            })
            .map_err(CapacityError::Shared)
    }

    /// Resolve every component of a graph, in declaration order
    ///
    /// # Errors
    /// Returns the first invalid component
    pub fn resolve_graph(&self, graph: &Graph) -> Result<IndexMap<ComponentId, Arc<CapacityProfile>>, CapacityError> {
        graph
            .components()
            .map(|component| Ok((component.id().clone(), self.resolve(component)?)))
            .collect()
    }

    /// Approximate number of cached profiles
    #[must_use]
    pub fn cached_profiles(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}
