//! Required topology supplied by the content layer
//!
//! A problem may demand that certain component kinds exist and that certain
//! kinds are wired to each other. The check runs before any simulation; a
//! failure short-circuits every test case of the submission.

use crate::component::{Component, ComponentKind};
use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A `(from-kind, to-kind)` connection requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KindLink {
    /// Upstream kind
    pub from: ComponentKind,
    /// Downstream kind
    pub to: ComponentKind,
}

/// Structural requirements of one problem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredTopology {
    /// Kinds that must appear at least once
    #[serde(default)]
    pub must_have: Vec<ComponentKind>,
    /// Kind pairs that must be directly connected
    #[serde(default)]
    pub must_connect: Vec<KindLink>,
}

/// One unmet requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyViolation {
    /// Required kind absent
    MissingKind(ComponentKind),
    /// No direct connection between the two kinds
    MissingConnection(KindLink),
    /// Connection exists but no traffic from the entry can reach it
    Unreachable(KindLink),
}

impl Display for TopologyViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKind(kind) => write!(f, "the architecture needs at least one {kind}"),
            Self::MissingConnection(link) => {
                write!(f, "expected a connection from a {} to a {}", link.from, link.to)
            }
            Self::Unreachable(link) => write!(
                f,
                "the {} -> {} connection is not reachable from the entry component",
                link.from, link.to
            ),
        }
    }
}

impl RequiredTopology {
    /// Whether nothing is required
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must_have.is_empty() && self.must_connect.is_empty()
    }

    /// Check a graph, collecting every unmet requirement
    ///
    /// # Errors
    /// Returns all violations, in requirement order.
    pub fn check(&self, graph: &Graph) -> Result<(), Vec<TopologyViolation>> {
        let mut violations = Vec::new();

        for kind in &self.must_have {
            if graph.components_of_kind(*kind).next().is_none() {
                violations.push(TopologyViolation::MissingKind(*kind));
            }
        }

        let reachable = graph.reachable(None);
        let is_reachable = |component: &Component| {
            graph
                .index_of(component.id().as_str())
                .is_some_and(|index| reachable[index])
        };

        for link in &self.must_connect {
            if !graph.connects_kinds(link.from, link.to) {
                violations.push(TopologyViolation::MissingConnection(*link));
                continue;
            }
            let wired_and_reachable = graph.connections().iter().any(|connection| {
                let from = graph.component(connection.from.as_str());
                let to = graph.component(connection.to.as_str());
                matches!(
                    (from, to),
                    (Some(from), Some(to)) if from.kind() == link.from
                        && to.kind() == link.to
                        && is_reachable(from)
                )
            });
            if !wired_and_reachable {
                violations.push(TopologyViolation::Unreachable(*link));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentConfig;
    use crate::connection::Connection;
    use pretty_assertions::assert_eq;

    fn graph() -> Graph {
        Graph::new(
            vec![
                Component::new("client", ComponentConfig::Client).unwrap(),
                Component::new("app", ComponentConfig::app_server(2)).unwrap(),
                Component::new("db", ComponentConfig::database()).unwrap(),
                Component::new("cache", ComponentConfig::cache(0.9)).unwrap(),
                Component::new("worker", ComponentConfig::app_server(1)).unwrap(),
            ],
            vec![
                Connection::read_write("client", "app"),
                Connection::read_write("app", "db"),
                Connection::read_write("worker", "cache"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn satisfied_requirements_pass() {
        let required = RequiredTopology {
            must_have: vec![ComponentKind::AppServer, ComponentKind::Database],
            must_connect: vec![KindLink {
                from: ComponentKind::AppServer,
                to: ComponentKind::Database,
            }],
        };
        assert_eq!(required.check(&graph()), Ok(()));
    }

    #[test]
    fn every_violation_is_reported() {
        let required = RequiredTopology {
            must_have: vec![ComponentKind::LoadBalancer, ComponentKind::Cdn],
            must_connect: vec![
                KindLink {
                    from: ComponentKind::Client,
                    to: ComponentKind::LoadBalancer,
                },
                KindLink {
                    from: ComponentKind::AppServer,
                    to: ComponentKind::Cache,
                },
            ],
        };

        let violations = required.check(&graph()).unwrap_err();
        assert_eq!(
            violations,
            vec![
                TopologyViolation::MissingKind(ComponentKind::LoadBalancer),
                TopologyViolation::MissingKind(ComponentKind::Cdn),
                TopologyViolation::MissingConnection(KindLink {
                    from: ComponentKind::Client,
                    to: ComponentKind::LoadBalancer,
                }),
                TopologyViolation::Unreachable(KindLink {
                    from: ComponentKind::AppServer,
                    to: ComponentKind::Cache,
                }),
            ]
        );
        assert_eq!(
            violations[0].to_string(),
            "the architecture needs at least one load_balancer"
        );
    }
}
