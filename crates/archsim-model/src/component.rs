//! Components of a submitted architecture
//!
//! Content authors describe components with a loosely-typed record
//! ([`ComponentSpec`] + [`RawConfig`]). It is converted exactly once, at
//! ingestion, into a [`Component`] whose [`ComponentConfig`] is a strict
//! per-kind variant. Nothing downstream ever looks at the raw record.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};

/// Identifier of a component inside one graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Create an id from any string
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ComponentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ComponentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Kind of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Traffic source (the entry of the graph)
    Client,
    /// Load balancer
    LoadBalancer,
    /// Stateless application server pool
    AppServer,
    /// In-memory cache
    Cache,
    /// Database
    Database,
    /// Blob / object storage
    ObjectStore,
    /// Message queue or log
    MessageQueue,
    /// Content delivery network
    Cdn,
}

impl ComponentKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 8] = [
        Self::Client,
        Self::LoadBalancer,
        Self::AppServer,
        Self::Cache,
        Self::Database,
        Self::ObjectStore,
        Self::MessageQueue,
        Self::Cdn,
    ];

    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::LoadBalancer => "load_balancer",
            Self::AppServer => "app_server",
            Self::Cache => "cache",
            Self::Database => "database",
            Self::ObjectStore => "object_store",
            Self::MessageQueue => "message_queue",
            Self::Cdn => "cdn",
        }
    }

    /// Durable storage kinds; links between two of them are failover links
    #[inline]
    #[must_use]
    pub const fn is_storage(self) -> bool {
        matches!(self, Self::Database | Self::ObjectStore)
    }

    /// Kinds modelled as pass-through nodes
    #[inline]
    #[must_use]
    pub const fn is_pass_through(self) -> bool {
        matches!(
            self,
            Self::LoadBalancer | Self::ObjectStore | Self::MessageQueue | Self::Cdn
        )
    }

    /// Raw config fields that belong to this kind's schema
    const fn allowed_fields(self) -> &'static [&'static str] {
        match self {
            Self::Client => &[],
            Self::AppServer => &["instances"],
            Self::Cache => &["hitRatio", "sizeMB", "strategy"],
            Self::Database => &["replication", "sharding"],
            Self::LoadBalancer | Self::ObjectStore | Self::MessageQueue | Self::Cdn => &["maxRps"],
        }
    }
}

impl Display for ComponentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cache participates in writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Application reads through the cache and writes straight to storage
    #[default]
    #[serde(alias = "cache-aside")]
    CacheAside,
    /// Writes pass through the cache on their way to storage
    #[serde(alias = "write-through")]
    WriteThrough,
}

/// Replication topology of a database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMode {
    /// Leader acknowledges after replicas confirm
    Sync,
    /// Leader acknowledges immediately
    #[default]
    Async,
    /// Every node accepts writes
    #[serde(alias = "multi-leader")]
    MultiLeader,
}

/// Database replication settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replication {
    /// Whether read replicas exist
    pub enabled: bool,
    /// Number of replicas besides the leader
    pub replica_count: u32,
    /// Replication mode
    pub mode: ReplicationMode,
}

impl Replication {
    /// Replicas actually serving traffic
    #[inline]
    #[must_use]
    pub fn active_replicas(&self) -> u32 {
        if self.enabled {
            self.replica_count
        } else {
            0
        }
    }
}

/// Database sharding settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sharding {
    /// Whether data is partitioned
    pub enabled: bool,
    /// Number of shards
    pub shard_count: u32,
    /// Partition key (informational)
    pub shard_key: Option<String>,
}

impl Sharding {
    /// Shards actually serving traffic (at least one)
    #[inline]
    #[must_use]
    pub fn active_shards(&self) -> u32 {
        if self.enabled {
            self.shard_count.max(1)
        } else {
            1
        }
    }
}

/// App server pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppServerConfig {
    /// Number of identical instances behind the component
    pub instances: u32,
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Fraction of reads served from the cache
    pub hit_ratio: f64,
    /// Cache size (informational)
    pub size_mb: Option<u64>,
    /// Write participation
    pub strategy: CacheStrategy,
}

/// Database settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Replication settings
    pub replication: Replication,
    /// Sharding settings
    pub sharding: Sharding,
}

/// Settings shared by pass-through kinds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassThroughConfig {
    /// Override of the default pass-through ceiling
    pub max_rps: Option<f64>,
}

/// Strict per-kind configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentConfig {
    /// Traffic source
    Client,
    /// Load balancer
    LoadBalancer(PassThroughConfig),
    /// App server pool
    AppServer(AppServerConfig),
    /// Cache
    Cache(CacheConfig),
    /// Database
    Database(DatabaseConfig),
    /// Object store
    ObjectStore(PassThroughConfig),
    /// Message queue
    MessageQueue(PassThroughConfig),
    /// CDN
    Cdn(PassThroughConfig),
}

impl ComponentConfig {
    /// App server with `instances` instances
    #[must_use]
    pub fn app_server(instances: u32) -> Self {
        Self::AppServer(AppServerConfig { instances })
    }

    /// Cache-aside cache with the given hit ratio
    #[must_use]
    pub fn cache(hit_ratio: f64) -> Self {
        Self::Cache(CacheConfig {
            hit_ratio,
            size_mb: None,
            strategy: CacheStrategy::CacheAside,
        })
    }

    /// Single-node database
    #[must_use]
    pub fn database() -> Self {
        Self::Database(DatabaseConfig::default())
    }

    /// Pass-through node of `kind` with the default ceiling
    ///
    /// Returns `None` for kinds that carry their own config.
    #[must_use]
    pub fn pass_through(kind: ComponentKind) -> Option<Self> {
        let config = PassThroughConfig::default();
        match kind {
            ComponentKind::Client => Some(Self::Client),
            ComponentKind::LoadBalancer => Some(Self::LoadBalancer(config)),
            ComponentKind::ObjectStore => Some(Self::ObjectStore(config)),
            ComponentKind::MessageQueue => Some(Self::MessageQueue(config)),
            ComponentKind::Cdn => Some(Self::Cdn(config)),
            ComponentKind::AppServer | ComponentKind::Cache | ComponentKind::Database => None,
        }
    }

    /// Kind this config belongs to
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        match self {
            Self::Client => ComponentKind::Client,
            Self::LoadBalancer(_) => ComponentKind::LoadBalancer,
            Self::AppServer(_) => ComponentKind::AppServer,
            Self::Cache(_) => ComponentKind::Cache,
            Self::Database(_) => ComponentKind::Database,
            Self::ObjectStore(_) => ComponentKind::ObjectStore,
            Self::MessageQueue(_) => ComponentKind::MessageQueue,
            Self::Cdn(_) => ComponentKind::Cdn,
        }
    }

    /// Check the config against its kind schema
    ///
    /// # Errors
    /// Returns the first field found out of range or inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Client => Ok(()),
            Self::AppServer(app) => {
                if app.instances == 0 {
                    return Err(ConfigError::OutOfRange {
                        field: "instances",
                        value: 0.0,
                        expected: ">= 1",
                    });
                }
                Ok(())
            }
            Self::Cache(cache) => {
                if !(0.0..=1.0).contains(&cache.hit_ratio) {
                    return Err(ConfigError::OutOfRange {
                        field: "hitRatio",
                        value: cache.hit_ratio,
                        expected: "[0, 1]",
                    });
                }
                if cache.size_mb == Some(0) {
                    return Err(ConfigError::OutOfRange {
                        field: "sizeMB",
                        value: 0.0,
                        expected: "> 0",
                    });
                }
                Ok(())
            }
            Self::Database(db) => {
                let replication = &db.replication;
                if replication.enabled && replication.replica_count == 0 {
                    return Err(ConfigError::OutOfRange {
                        field: "replication.replicaCount",
                        value: 0.0,
                        expected: ">= 1 when replication is enabled",
                    });
                }
                if !replication.enabled && replication.mode == ReplicationMode::MultiLeader {
                    return Err(ConfigError::Inconsistent(
                        "multi_leader replication requires replication to be enabled",
                    ));
                }
                if db.sharding.enabled && db.sharding.shard_count == 0 {
                    return Err(ConfigError::OutOfRange {
                        field: "sharding.shardCount",
                        value: 0.0,
                        expected: ">= 1 when sharding is enabled",
                    });
                }
                Ok(())
            }
            Self::LoadBalancer(pass) | Self::ObjectStore(pass) | Self::MessageQueue(pass) | Self::Cdn(pass) => {
                match pass.max_rps {
                    Some(rps) if !(rps.is_finite() && rps > 0.0) => Err(ConfigError::OutOfRange {
                        field: "maxRps",
                        value: rps,
                        expected: "a finite number > 0",
                    }),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Replication block as written by content authors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawReplication {
    /// Whether replication is on
    pub enabled: bool,
    /// Replica count
    #[serde(alias = "replicas", skip_serializing_if = "Option::is_none")]
    pub replica_count: Option<u32>,
    /// Replication mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ReplicationMode>,
}

/// Sharding block as written by content authors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSharding {
    /// Whether sharding is on
    pub enabled: bool,
    /// Shard count
    #[serde(alias = "shards", skip_serializing_if = "Option::is_none")]
    pub shard_count: Option<u32>,
    /// Shard key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_key: Option<String>,
}

/// Loosely-typed config record, the union of every kind's fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawConfig {
    /// App server instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    /// Cache hit ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_ratio: Option<f64>,
    /// Cache size
    #[serde(rename = "sizeMB", alias = "sizeMb", skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<u64>,
    /// Cache strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<CacheStrategy>,
    /// Database replication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<RawReplication>,
    /// Database sharding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharding: Option<RawSharding>,
    /// Pass-through ceiling override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rps: Option<f64>,
}

impl RawConfig {
    /// Convert into the strict variant for `kind`
    ///
    /// # Errors
    /// Fails on fields foreign to `kind`, missing required fields and values
    /// out of range.
    pub fn into_config(self, kind: ComponentKind) -> Result<ComponentConfig, ConfigError> {
        let allowed = kind.allowed_fields();
        if let Some(field) = self.present_fields().find(|field| !allowed.contains(field)) {
            return Err(ConfigError::NotApplicable { kind, field });
        }

        let pass = PassThroughConfig { max_rps: self.max_rps };
        let config = match kind {
            ComponentKind::Client => ComponentConfig::Client,
            ComponentKind::LoadBalancer => ComponentConfig::LoadBalancer(pass),
            ComponentKind::ObjectStore => ComponentConfig::ObjectStore(pass),
            ComponentKind::MessageQueue => ComponentConfig::MessageQueue(pass),
            ComponentKind::Cdn => ComponentConfig::Cdn(pass),
            ComponentKind::AppServer => ComponentConfig::AppServer(AppServerConfig {
                instances: self.instances.unwrap_or(1),
            }),
            ComponentKind::Cache => ComponentConfig::Cache(CacheConfig {
                hit_ratio: self.hit_ratio.ok_or(ConfigError::Missing {
                    kind,
                    field: "hitRatio",
                })?,
                size_mb: self.size_mb,
                strategy: self.strategy.unwrap_or_default(),
            }),
            ComponentKind::Database => {
                let replication = self.replication.map_or_else(Replication::default, |raw| {
                    Replication {
                        enabled: raw.enabled,
                        replica_count: raw.replica_count.unwrap_or(0),
                        mode: raw.mode.unwrap_or_default(),
                    }
                });
                let sharding = self.sharding.map_or_else(Sharding::default, |raw| Sharding {
                    enabled: raw.enabled,
                    shard_count: raw.shard_count.unwrap_or(0),
                    shard_key: raw.shard_key,
                });
                ComponentConfig::Database(DatabaseConfig {
                    replication,
                    sharding,
                })
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn present_fields(&self) -> impl Iterator<Item = &'static str> {
        [
            ("instances", self.instances.is_some()),
            ("hitRatio", self.hit_ratio.is_some()),
            ("sizeMB", self.size_mb.is_some()),
            ("strategy", self.strategy.is_some()),
            ("replication", self.replication.is_some()),
            ("sharding", self.sharding.is_some()),
            ("maxRps", self.max_rps.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, present)| present.then_some(field))
    }
}

impl From<&ComponentConfig> for RawConfig {
    fn from(config: &ComponentConfig) -> Self {
        match config {
            ComponentConfig::Client => Self::default(),
            ComponentConfig::LoadBalancer(pass)
            | ComponentConfig::ObjectStore(pass)
            | ComponentConfig::MessageQueue(pass)
            | ComponentConfig::Cdn(pass) => Self {
                max_rps: pass.max_rps,
                ..Self::default()
            },
            ComponentConfig::AppServer(app) => Self {
                instances: Some(app.instances),
                ..Self::default()
            },
            ComponentConfig::Cache(cache) => Self {
                hit_ratio: Some(cache.hit_ratio),
                size_mb: cache.size_mb,
                strategy: Some(cache.strategy),
                ..Self::default()
            },
            ComponentConfig::Database(db) => Self {
                replication: Some(RawReplication {
                    enabled: db.replication.enabled,
                    replica_count: Some(db.replication.replica_count),
                    mode: Some(db.replication.mode),
                }),
                sharding: Some(RawSharding {
                    enabled: db.sharding.enabled,
                    shard_count: Some(db.sharding.shard_count),
                    shard_key: db.sharding.shard_key.clone(),
                }),
                ..Self::default()
            },
        }
    }
}

/// Component as written by content authors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Component id
    pub id: ComponentId,
    /// Component kind
    pub kind: ComponentKind,
    /// Kind-specific settings
    #[serde(default)]
    pub config: RawConfig,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A validated component
///
/// The kind is fixed at creation; [`Component::with_config`] only accepts a
/// config of the same kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ComponentSpec", into = "ComponentSpec")]
pub struct Component {
    id: ComponentId,
    config: ComponentConfig,
    label: Option<String>,
}

impl Component {
    /// Create a component, validating its config
    ///
    /// # Errors
    /// Returns the config validation error.
    pub fn new(id: impl Into<ComponentId>, config: ComponentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id: id.into(),
            config,
            label: None,
        })
    }

    /// Attach a display label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Copy of this component with a new config of the same kind
    ///
    /// # Errors
    /// Fails when the kind would change or the config is invalid.
    pub fn with_config(&self, config: ComponentConfig) -> Result<Self, ConfigError> {
        if config.kind() != self.kind() {
            return Err(ConfigError::KindMismatch {
                expected: self.kind(),
                actual: config.kind(),
            });
        }
        config.validate()?;
        Ok(Self {
            id: self.id.clone(),
            config,
            label: self.label.clone(),
        })
    }

    /// Component id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Component kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        self.config.kind()
    }

    /// Strict config
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    /// Display label, if any
    #[inline]
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl TryFrom<ComponentSpec> for Component {
    type Error = ConfigError;

    fn try_from(spec: ComponentSpec) -> Result<Self, Self::Error> {
        let config = spec.config.into_config(spec.kind)?;
        Ok(Self {
            id: spec.id,
            config,
            label: spec.label,
        })
    }
}

impl From<Component> for ComponentSpec {
    fn from(component: Component) -> Self {
        Self {
            kind: component.kind(),
            config: RawConfig::from(&component.config),
            id: component.id,
            label: component.label,
        }
    }
}
