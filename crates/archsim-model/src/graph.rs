//! Architecture graph
//!
//! [`GraphSpec`] is the wire form. [`Graph`] can only be obtained through
//! validation, so every graph handed to the engine has unique ids, resolvable
//! endpoints, a designated entry and acyclic per-class traffic subgraphs.

use crate::component::{Component, ComponentId, ComponentKind, ComponentSpec};
use crate::connection::{Connection, TrafficClass};
use crate::error::GraphError;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Graph as submitted by the content layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSpec {
    /// Components
    pub components: Vec<ComponentSpec>,
    /// Connections
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Explicit entry component; defaults to the single client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<ComponentId>,
}

impl GraphSpec {
    /// Validate into a [`Graph`]
    ///
    /// # Errors
    /// Returns the first structural problem found.
    pub fn validate(self) -> Result<Graph, GraphError> {
        let components = self
            .components
            .into_iter()
            .map(|spec| {
                let id = spec.id.clone();
                Component::try_from(spec).map_err(|source| GraphError::InvalidComponent { id, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Graph::with_entry(components, self.connections, self.entry)
    }
}

/// Validated architecture graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphSpec", into = "GraphSpec")]
pub struct Graph {
    components: IndexMap<ComponentId, Component>,
    connections: Vec<Connection>,
    entry: ComponentId,
}

impl Graph {
    /// Build a graph whose entry is its single client
    ///
    /// # Errors
    /// See [`Graph::with_entry`].
    pub fn new(components: Vec<Component>, connections: Vec<Connection>) -> Result<Self, GraphError> {
        Self::with_entry(components, connections, None)
    }

    /// Build a graph with an optional explicit entry
    ///
    /// # Errors
    /// Fails on duplicate ids, dangling or duplicate connections, self loops,
    /// a missing or ambiguous entry, and cyclic traffic subgraphs.
    pub fn with_entry(
        components: Vec<Component>,
        connections: Vec<Connection>,
        entry: Option<ComponentId>,
    ) -> Result<Self, GraphError> {
        if components.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut by_id = IndexMap::with_capacity(components.len());
        for component in components {
            if by_id.contains_key(component.id()) {
                return Err(GraphError::DuplicateComponent(component.id().clone()));
            }
            by_id.insert(component.id().clone(), component);
        }

        let mut seen = HashSet::with_capacity(connections.len());
        for connection in &connections {
            for endpoint in [&connection.from, &connection.to] {
                if !by_id.contains_key(endpoint) {
                    return Err(GraphError::UnknownEndpoint {
                        from: connection.from.clone(),
                        to: connection.to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
            if connection.from == connection.to {
                return Err(GraphError::SelfLoop(connection.from.clone()));
            }
            if !seen.insert((&connection.from, &connection.to)) {
                return Err(GraphError::DuplicateConnection {
                    from: connection.from.clone(),
                    to: connection.to.clone(),
                });
            }
        }

        let entry = match entry {
            Some(id) if by_id.contains_key(&id) => id,
            Some(id) => return Err(GraphError::UnknownEntry(id)),
            None => {
                let mut clients: Vec<ComponentId> = by_id
                    .values()
                    .filter(|c| c.kind() == ComponentKind::Client)
                    .map(|c| c.id().clone())
                    .collect();
                match clients.len() {
                    0 => return Err(GraphError::MissingEntry),
                    1 => clients.swap_remove(0),
                    _ => return Err(GraphError::AmbiguousEntry(clients)),
                }
            }
        };

        let graph = Self {
            components: by_id,
            connections,
            entry,
        };
        for class in TrafficClass::ALL {
            graph.check_acyclic(class)?;
        }
        Ok(graph)
    }

    /// Entry component id
    #[inline]
    #[must_use]
    pub fn entry(&self) -> &ComponentId {
        &self.entry
    }

    /// Look up a component
    #[inline]
    #[must_use]
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    /// Position of a component in declaration order
    #[inline]
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.components.get_index_of(id)
    }

    /// Component at a declaration-order position
    #[inline]
    #[must_use]
    pub fn component_at(&self, index: usize) -> Option<&Component> {
        self.components.get_index(index).map(|(_, c)| c)
    }

    /// Components in declaration order
    pub fn components(&self) -> impl Iterator<Item = &Component> + '_ {
        self.components.values()
    }

    /// Components of one kind, in declaration order
    pub fn components_of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> + '_ {
        self.components.values().filter(move |c| c.kind() == kind)
    }

    /// Number of components
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false for a validated graph
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Connections in declaration order
    #[inline]
    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Whether a connection links two storage components
    ///
    /// Such links designate a standby and never carry routed traffic.
    #[must_use]
    pub fn is_failover_link(&self, connection: &Connection) -> bool {
        let kind = |id: &ComponentId| self.component(id.as_str()).map(Component::kind);
        matches!(
            (kind(&connection.from), kind(&connection.to)),
            (Some(from), Some(to)) if from.is_storage() && to.is_storage()
        )
    }

    /// Downstream components reachable over one routed hop for `class`
    pub fn outgoing<'a>(
        &'a self,
        id: &'a str,
        class: TrafficClass,
    ) -> impl Iterator<Item = &'a Component> + 'a {
        self.connections
            .iter()
            .filter(move |c| {
                c.from.as_str() == id && c.traffic_type.carries(class) && !self.is_failover_link(c)
            })
            .filter_map(|c| self.component(c.to.as_str()))
    }

    /// Standby components declared through failover links from `id`
    pub fn failover_targets<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Component> + 'a {
        self.connections
            .iter()
            .filter(move |c| c.from.as_str() == id && self.is_failover_link(c))
            .filter_map(|c| self.component(c.to.as_str()))
    }

    /// Whether any connection runs from a `from` component to a `to` component
    #[must_use]
    pub fn connects_kinds(&self, from: ComponentKind, to: ComponentKind) -> bool {
        let kind = |id: &ComponentId| self.component(id.as_str()).map(Component::kind);
        self.connections
            .iter()
            .any(|c| kind(&c.from) == Some(from) && kind(&c.to) == Some(to))
    }

    /// Reachability from the entry over routed hops, indexed by declaration order
    ///
    /// `None` follows every routed connection regardless of class.
    #[must_use]
    pub fn reachable(&self, class: Option<TrafficClass>) -> Vec<bool> {
        let mut seen = vec![false; self.components.len()];
        let mut queue = VecDeque::new();
        if let Some(start) = self.index_of(self.entry.as_str()) {
            seen[start] = true;
            queue.push_back(start);
        }

        while let Some(index) = queue.pop_front() {
            let Some((id, _)) = self.components.get_index(index) else {
                continue;
            };
            for connection in self.connections.iter().filter(|c| &c.from == id) {
                if self.is_failover_link(connection)
                    || class.is_some_and(|class| !connection.traffic_type.carries(class))
                {
                    continue;
                }
                if let Some(next) = self.index_of(connection.to.as_str()) {
                    if !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }

        seen
    }

    fn check_acyclic(&self, class: TrafficClass) -> Result<(), GraphError> {
        let reachable = self.reachable(Some(class));
        let mut dag: DiGraphMap<usize, ()> = DiGraphMap::new();
        for (index, _) in reachable.iter().enumerate().filter(|(_, r)| **r) {
            dag.add_node(index);
        }

        for connection in &self.connections {
            if !connection.traffic_type.carries(class) || self.is_failover_link(connection) {
                continue;
            }
            let (Some(from), Some(to)) = (
                self.index_of(connection.from.as_str()),
                self.index_of(connection.to.as_str()),
            ) else {
                continue;
            };
            if reachable[from] {
                dag.add_edge(from, to, ());
            }
        }

        toposort(&dag, None).map(|_| ()).map_err(|cycle| {
            let component = self
                .components
                .get_index(cycle.node_id())
                .map_or_else(|| self.entry.clone(), |(id, _)| id.clone());
            GraphError::CyclicTraffic { class, component }
        })
    }
}

impl TryFrom<GraphSpec> for Graph {
    type Error = GraphError;

    fn try_from(spec: GraphSpec) -> Result<Self, Self::Error> {
        spec.validate()
    }
}

impl From<Graph> for GraphSpec {
    fn from(graph: Graph) -> Self {
        Self {
            components: graph.components.into_values().map(ComponentSpec::from).collect(),
            connections: graph.connections,
            entry: Some(graph.entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentConfig;
    use crate::connection::TrafficType;
    use pretty_assertions::assert_eq;

    fn client() -> Component {
        Component::new("client", ComponentConfig::Client).unwrap()
    }

    fn app(id: &str) -> Component {
        Component::new(id, ComponentConfig::app_server(1)).unwrap()
    }

    fn db(id: &str) -> Component {
        Component::new(id, ComponentConfig::database()).unwrap()
    }

    #[test]
    fn entry_defaults_to_single_client() {
        let graph = Graph::new(
            vec![client(), app("app"), db("db")],
            vec![Connection::read_write("client", "app"), Connection::read_write("app", "db")],
        )
        .unwrap();

        assert_eq!(graph.entry().as_str(), "client");
        assert_eq!(graph.len(), 3);
        let next: Vec<_> = graph.outgoing("app", TrafficClass::Read).map(Component::id).collect();
        assert_eq!(next, vec![&ComponentId::from("db")]);
    }

    #[test]
    fn missing_and_ambiguous_entry() {
        let err = Graph::new(vec![app("app")], vec![]).unwrap_err();
        assert_eq!(err, GraphError::MissingEntry);

        let second = Component::new("client2", ComponentConfig::Client).unwrap();
        let err = Graph::new(vec![client(), second], vec![]).unwrap_err();
        assert!(matches!(err, GraphError::AmbiguousEntry(ref ids) if ids.len() == 2));
    }

    #[test]
    fn dangling_endpoint_rejected() {
        let err = Graph::new(vec![client()], vec![Connection::read_write("client", "ghost")])
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownEndpoint { ref missing, .. } if missing.as_str() == "ghost"));
    }

    #[test]
    fn self_loop_and_duplicates_rejected() {
        let err = Graph::new(vec![client(), app("app")], vec![Connection::read_write("app", "app")])
            .unwrap_err();
        assert_eq!(err, GraphError::SelfLoop(ComponentId::from("app")));

        let err = Graph::new(
            vec![client(), app("app")],
            vec![
                Connection::read_write("client", "app"),
                Connection::new("client", "app", TrafficType::Read),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateConnection { .. }));
    }

    #[test]
    fn cycle_in_read_subgraph_rejected() {
        let err = Graph::new(
            vec![client(), app("a"), app("b")],
            vec![
                Connection::read_write("client", "a"),
                Connection::new("a", "b", TrafficType::Read),
                Connection::new("b", "a", TrafficType::Read),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::CyclicTraffic { class: TrafficClass::Read, .. }));
    }

    #[test]
    fn opposite_classes_do_not_form_a_cycle() {
        let graph = Graph::new(
            vec![client(), app("a"), app("b")],
            vec![
                Connection::read_write("client", "a"),
                Connection::new("a", "b", TrafficType::Read),
                Connection::new("b", "a", TrafficType::Write),
            ],
        );
        assert!(graph.is_ok());
    }

    #[test]
    fn unreachable_cycle_is_ignored() {
        let graph = Graph::new(
            vec![client(), app("a"), app("x"), app("y")],
            vec![
                Connection::read_write("client", "a"),
                Connection::read_write("x", "y"),
                Connection::read_write("y", "x"),
            ],
        );
        assert!(graph.is_ok());
    }

    #[test]
    fn storage_links_are_failover_only() {
        let graph = Graph::new(
            vec![client(), app("app"), db("primary"), db("standby")],
            vec![
                Connection::read_write("client", "app"),
                Connection::read_write("app", "primary"),
                Connection::read_write("primary", "standby"),
                Connection::read_write("standby", "primary"),
            ],
        )
        .unwrap();

        assert_eq!(graph.outgoing("primary", TrafficClass::Read).count(), 0);
        let standby: Vec<_> = graph.failover_targets("primary").map(Component::id).collect();
        assert_eq!(standby, vec![&ComponentId::from("standby")]);
        assert!(!graph.reachable(None)[graph.index_of("standby").unwrap()]);
    }

    #[test]
    fn spec_validation_reports_component_id() {
        let spec: GraphSpec = serde_json::from_value(serde_json::json!({
            "components": [
                { "id": "client", "kind": "client" },
                { "id": "cache", "kind": "cache", "config": { "hitRatio": -0.1 } }
            ],
            "connections": [ { "from": "client", "to": "cache" } ]
        }))
        .unwrap();

        let err = spec.validate().unwrap_err();
        assert!(matches!(err, GraphError::InvalidComponent { ref id, .. } if id.as_str() == "cache"));
    }
}
