//! Testing utilities for archsim workspace
//!
//! Shared architecture fixtures and builders.

#![allow(missing_docs)]

use archsim_model::{
    CacheConfig, CacheStrategy, Component, ComponentConfig, ComponentSpec, Connection, DatabaseConfig, Graph,
    GraphSpec, RawConfig, Replication, ReplicationMode, RequiredTopology, Sharding, Submission, TestCase,
    TrafficType,
};

/// Incremental graph builder for tests; panics on invalid input
#[derive(Debug, Default, Clone)]
pub struct GraphFixture {
    components: Vec<Component>,
    connections: Vec<Connection>,
}

impl GraphFixture {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn component(mut self, id: &str, config: ComponentConfig) -> Self {
        self.components
            .push(Component::new(id, config).expect("fixture component config is valid"));
        self
    }

    #[must_use]
    pub fn link(mut self, from: &str, to: &str) -> Self {
        self.connections.push(Connection::read_write(from, to));
        self
    }

    #[must_use]
    pub fn link_typed(mut self, from: &str, to: &str, traffic_type: TrafficType) -> Self {
        self.connections.push(Connection::new(from, to, traffic_type));
        self
    }

    pub fn build(self) -> Graph {
        Graph::new(self.components, self.connections).expect("fixture graph is valid")
    }

    /// Loosely-typed wire form, as a content layer would send it
    pub fn into_spec(self) -> GraphSpec {
        GraphSpec {
            components: self
                .components
                .iter()
                .map(|component| ComponentSpec {
                    id: component.id().clone(),
                    kind: component.kind(),
                    config: RawConfig::from(component.config()),
                    label: None,
                })
                .collect(),
            connections: self.connections,
            entry: None,
        }
    }
}

pub fn replicated_db(replicas: u32) -> ComponentConfig {
    ComponentConfig::Database(DatabaseConfig {
        replication: Replication {
            enabled: replicas > 0,
            replica_count: replicas,
            mode: ReplicationMode::Async,
        },
        ..DatabaseConfig::default()
    })
}

pub fn sharded_db(shards: u32) -> ComponentConfig {
    ComponentConfig::Database(DatabaseConfig {
        sharding: Sharding {
            enabled: true,
            shard_count: shards,
            shard_key: Some("user_id".to_string()),
        },
        ..DatabaseConfig::default()
    })
}

pub fn cache(hit_ratio: f64, strategy: CacheStrategy) -> ComponentConfig {
    ComponentConfig::Cache(CacheConfig {
        hit_ratio,
        size_mb: Some(1024),
        strategy,
    })
}

/// `client -> lb -> app -> db`
pub fn three_tier(app_instances: u32, db: ComponentConfig) -> GraphFixture {
    GraphFixture::new()
        .component("client", ComponentConfig::Client)
        .component(
            "lb",
            ComponentConfig::pass_through(archsim_model::ComponentKind::LoadBalancer)
                .expect("load balancer is pass-through"),
        )
        .component("app", ComponentConfig::app_server(app_instances))
        .component("db", db)
        .link("client", "lb")
        .link("lb", "app")
        .link("app", "db")
}

/// `three_tier` plus a standby database behind a failover link
pub fn three_tier_with_standby(app_instances: u32) -> GraphFixture {
    three_tier(app_instances, ComponentConfig::database())
        .component("db-standby", ComponentConfig::database())
        .link("db", "db-standby")
}

/// `client -> app -> {cache, db}` with cache-aside reads
pub fn cache_aside(hit_ratio: f64) -> GraphFixture {
    GraphFixture::new()
        .component("client", ComponentConfig::Client)
        .component("app", ComponentConfig::app_server(4))
        .component("cache", cache(hit_ratio, CacheStrategy::CacheAside))
        .component("db", ComponentConfig::database())
        .link("client", "app")
        .link("app", "cache")
        .link("app", "db")
}

/// `client -> {a, b}` with reads continuing `a -> b` and writes `b -> a`
pub fn opposing_paths() -> GraphFixture {
    GraphFixture::new()
        .component("client", ComponentConfig::Client)
        .component("a", ComponentConfig::app_server(1))
        .component("b", ComponentConfig::app_server(1))
        .link("client", "a")
        .link("client", "b")
        .link_typed("a", "b", TrafficType::Read)
        .link_typed("b", "a", TrafficType::Write)
}

pub fn submission(graph: GraphFixture, test_cases: Vec<TestCase>) -> Submission {
    Submission {
        graph: graph.into_spec(),
        requirements: RequiredTopology::default(),
        test_cases,
    }
}
