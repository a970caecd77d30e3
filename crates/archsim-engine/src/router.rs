//! Per-class path enumeration over the architecture graph
//!
//! Routing happens once per run. For each traffic class with offered load
//! the router walks the graph from the entry component and produces a
//! [`RouteSet`]: complete entry-to-terminal paths, each weighted by the
//! share of that class's load it carries. Weights sum to 1.
//!
//! Fan-out splits load in proportion to the effective capacity of each
//! branch (the bottleneck along it), or evenly when every branch is empty.
//! A node that feeds both caches and non-cache components is treated as
//! cache-aside: reads visit a cache and then continue to the non-cache
//! siblings, carrying the misses, while writes skip the caches unless they
//! are write-through.

use crate::error::RouteError;
use archsim_capacity::CapacityProfile;
use archsim_model::{CacheStrategy, ComponentId, ComponentKind, Graph, TrafficClass};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One entry-to-terminal path
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedPath {
    /// Component indices (declaration order) from the entry onwards
    pub hops: Vec<usize>,
    /// Share of the class's load carried
    pub weight: f64,
}

impl WeightedPath {
    /// Render as `a -> b -> c`
    #[must_use]
    pub fn render(&self, graph: &Graph) -> String {
        self.hops
            .iter()
            .filter_map(|&index| graph.component_at(index))
            .map(|component| component.id().as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Weighted paths for one traffic class
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSet {
    /// Traffic class
    pub class: TrafficClass,
    /// Paths, in discovery order
    pub paths: Vec<WeightedPath>,
}

impl RouteSet {
    /// Sum of path weights (1.0 up to rounding)
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.paths.iter().map(|path| path.weight).sum()
    }

    /// Components visited by any path
    #[must_use]
    pub fn components(&self) -> BTreeSet<usize> {
        self.paths.iter().flat_map(|path| path.hops.iter().copied()).collect()
    }
}

/// Route sets of every loaded class plus the components they visit
#[derive(Debug, Clone, PartialEq)]
pub struct Routes {
    /// Route sets, reads first
    pub sets: Vec<RouteSet>,
    /// Every routed component; each class's components keep that class's
    /// topological order, reads first
    pub order: Vec<usize>,
}

impl Routes {
    /// Route set of one class
    #[must_use]
    pub fn get(&self, class: TrafficClass) -> Option<&RouteSet> {
        self.sets.iter().find(|set| set.class == class)
    }

    /// Whether a component lies on any routed path
    #[must_use]
    pub fn is_routed(&self, index: usize) -> bool {
        self.order.contains(&index)
    }
}

/// Outgoing step from a node: one or two hops with a combined weight
type Branch = (Vec<usize>, f64);

/// Path enumerator bound to one graph and its resolved profiles
#[derive(Debug)]
pub struct Router<'a> {
    graph: &'a Graph,
    profiles: &'a [Arc<CapacityProfile>],
    max_paths: usize,
}

impl<'a> Router<'a> {
    /// Create a router; `profiles` is indexed by declaration order
    #[must_use]
    pub const fn new(graph: &'a Graph, profiles: &'a [Arc<CapacityProfile>], max_paths: usize) -> Self {
        Self {
            graph,
            profiles,
            max_paths,
        }
    }

    /// Route every class and collect the components they visit
    ///
    /// Classes are ordered independently: a read edge and a write edge may
    /// point in opposite directions between the same two components.
    ///
    /// # Errors
    /// Returns error if a class cannot leave the entry, fans out past the
    /// path bound, or loops back on itself
    pub fn route_all(&self, classes: &[TrafficClass]) -> Result<Routes, RouteError> {
        let sets = classes
            .iter()
            .map(|class| self.route(*class))
            .collect::<Result<Vec<_>, _>>()?;

        let mut order = Vec::new();
        for set in &sets {
            let class_order = topological_order(self.graph, set.paths.iter().map(|path| path.hops.as_slice()))?;
            for index in class_order {
                if !order.contains(&index) {
                    order.push(index);
                }
            }
        }
        tracing::debug!(
            classes = sets.len(),
            paths = sets.iter().map(|set| set.paths.len()).sum::<usize>(),
            components = order.len(),
            "routes computed"
        );
        Ok(Routes { sets, order })
    }

    /// Enumerate the weighted paths of one class
    ///
    /// # Errors
    /// See [`Router::route_all`]
    pub fn route(&self, class: TrafficClass) -> Result<RouteSet, RouteError> {
        let entry = self.graph.entry();
        let Some(start) = self.graph.index_of(entry.as_str()) else {
            return Err(RouteError::Disconnected {
                class,
                entry: entry.clone(),
            });
        };

        let mut walk = Walk {
            router: self,
            class,
            capacity: vec![None; self.graph.len()],
            visiting: vec![false; self.graph.len()],
            paths: Vec::new(),
        };
        if walk.branches(start)?.is_empty() {
            return Err(RouteError::Disconnected {
                class,
                entry: entry.clone(),
            });
        }

        let mut hops = vec![start];
        walk.descend(&mut hops, 1.0)?;
        Ok(RouteSet {
            class,
            paths: walk.paths,
        })
    }

    fn id(&self, index: usize) -> ComponentId {
        self.graph
            .component_at(index)
            .map_or_else(|| ComponentId::from(format!("#{index}")), |c| c.id().clone())
    }

    fn ceiling(&self, index: usize, class: TrafficClass) -> f64 {
        self.profiles
            .get(index)
            .map_or(0.0, |profile| profile.max_throughput(class))
    }

    fn cache_strategy(&self, index: usize) -> Option<CacheStrategy> {
        self.profiles
            .get(index)
            .and_then(|profile| profile.cache)
            .map(|cache| cache.strategy)
    }

    fn children(&self, index: usize, class: TrafficClass) -> Vec<usize> {
        let Some(component) = self.graph.component_at(index) else {
            return Vec::new();
        };
        self.graph
            .outgoing(component.id().as_str(), class)
            .filter_map(|child| self.graph.index_of(child.id().as_str()))
            .collect()
    }

    fn is_cache(&self, index: usize) -> bool {
        self.graph
            .component_at(index)
            .is_some_and(|component| component.kind() == ComponentKind::Cache)
    }
}

/// Depth-first enumeration state for one class
struct Walk<'r, 'a> {
    router: &'r Router<'a>,
    class: TrafficClass,
    capacity: Vec<Option<f64>>,
    visiting: Vec<bool>,
    paths: Vec<WeightedPath>,
}

impl Walk<'_, '_> {
    fn descend(&mut self, hops: &mut Vec<usize>, weight: f64) -> Result<(), RouteError> {
        let Some(&node) = hops.last() else {
            return Ok(());
        };
        let branches = self.branches(node)?;
        if branches.is_empty() {
            if self.paths.len() >= self.router.max_paths {
                return Err(RouteError::TooManyPaths {
                    class: self.class,
                    limit: self.router.max_paths,
                });
            }
            self.paths.push(WeightedPath {
                hops: hops.clone(),
                weight,
            });
            return Ok(());
        }

        for (step, share) in branches {
            if share <= 0.0 {
                continue;
            }
            if let Some(&repeat) = step.iter().find(|&&index| hops.contains(&index)) {
                return Err(RouteError::Cycle {
                    component: self.router.id(repeat),
                });
            }
            let depth = hops.len();
            hops.extend_from_slice(&step);
            self.descend(hops, weight * share)?;
            hops.truncate(depth);
        }
        Ok(())
    }

    /// Outgoing steps of `node` with normalized shares
    fn branches(&mut self, node: usize) -> Result<Vec<Branch>, RouteError> {
        let children = self.router.children(node, self.class);
        let (caches, others): (Vec<usize>, Vec<usize>) =
            children.iter().copied().partition(|&child| self.router.is_cache(child));

        if caches.is_empty() || others.is_empty() {
            return self.direct(&children);
        }

        let visited: Vec<usize> = match self.class {
            TrafficClass::Read => caches,
            TrafficClass::Write => caches
                .into_iter()
                .filter(|&cache| self.router.cache_strategy(cache) == Some(CacheStrategy::WriteThrough))
                .collect(),
        };
        if visited.is_empty() {
            return self.direct(&others);
        }

        let cache_ceilings: Vec<f64> = visited
            .iter()
            .map(|&cache| self.router.ceiling(cache, self.class))
            .collect();
        let other_capacities = others
            .iter()
            .map(|&other| self.effective_capacity(other))
            .collect::<Result<Vec<_>, _>>()?;

        let cache_shares = shares(&cache_ceilings);
        let other_shares = shares(&other_capacities);
        let mut branches = Vec::with_capacity(visited.len() * others.len());
        for (&cache, cache_share) in visited.iter().zip(&cache_shares) {
            for (&other, other_share) in others.iter().zip(&other_shares) {
                branches.push((vec![cache, other], cache_share * other_share));
            }
        }
        Ok(branches)
    }

    fn direct(&mut self, children: &[usize]) -> Result<Vec<Branch>, RouteError> {
        let capacities = children
            .iter()
            .map(|&child| self.effective_capacity(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(children
            .iter()
            .zip(shares(&capacities))
            .map(|(&child, share)| (vec![child], share))
            .collect())
    }

    /// Bottleneck capacity of everything downstream of `node`, inclusive
    fn effective_capacity(&mut self, node: usize) -> Result<f64, RouteError> {
        if let Some(capacity) = self.capacity.get(node).copied().flatten() {
            return Ok(capacity);
        }
        if self.visiting.get(node).copied().unwrap_or(false) {
            return Err(RouteError::Cycle {
                component: self.router.id(node),
            });
        }
        if let Some(flag) = self.visiting.get_mut(node) {
            *flag = true;
        }

        let own = self.router.ceiling(node, self.class);
        let branches = self.branches(node)?;
        let capacity = if branches.is_empty() {
            own
        } else {
            let mut downstream: Vec<usize> = branches
                .iter()
                .filter_map(|(step, _)| step.last().copied())
                .collect();
            downstream.sort_unstable();
            downstream.dedup();
            let mut total = 0.0;
            for next in downstream {
                total += self.effective_capacity(next)?;
            }
            own.min(total)
        };

        if let Some(flag) = self.visiting.get_mut(node) {
            *flag = false;
        }
        if let Some(slot) = self.capacity.get_mut(node) {
            *slot = Some(capacity);
        }
        Ok(capacity)
    }
}

/// Proportional shares, even when every value is zero
fn shares(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|value| value / total).collect()
    } else {
        #[allow(clippy::cast_precision_loss)]
        let even = 1.0 / values.len().max(1) as f64;
        vec![even; values.len()]
    }
}

/// Topologically sort the components visited by `paths`
///
/// # Errors
/// Returns [`RouteError::Cycle`] when consecutive hops form a loop
pub fn topological_order<'p>(
    graph: &Graph,
    paths: impl IntoIterator<Item = &'p [usize]>,
) -> Result<Vec<usize>, RouteError> {
    let mut dag: DiGraphMap<usize, ()> = DiGraphMap::new();
    for hops in paths {
        for &hop in hops {
            dag.add_node(hop);
        }
        for pair in hops.windows(2) {
            dag.add_edge(pair[0], pair[1], ());
        }
    }
    toposort(&dag, None).map_err(|cycle| RouteError::Cycle {
        component: graph
            .component_at(cycle.node_id())
            .map_or_else(|| ComponentId::from(format!("#{}", cycle.node_id())), |c| c.id().clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use archsim_capacity::{CapacityConstants, CapacityResolver};
    use archsim_model::{CacheConfig, Component, ComponentConfig, Connection, TrafficType};
    use pretty_assertions::assert_eq;

    fn profiles(graph: &Graph) -> Vec<Arc<CapacityProfile>> {
        CapacityResolver::new(CapacityConstants::default())
            .unwrap()
            .resolve_graph(graph)
            .unwrap()
            .into_values()
            .collect()
    }

    fn rendered(graph: &Graph, set: &RouteSet) -> Vec<(String, f64)> {
        set.paths
            .iter()
            .map(|path| (path.render(graph), (path.weight * 1000.0).round() / 1000.0))
            .collect()
    }

    fn component(id: &str, config: ComponentConfig) -> Component {
        Component::new(id, config).unwrap()
    }

    #[test]
    fn splits_by_downstream_capacity() {
        let graph = Graph::new(
            vec![
                component("client", ComponentConfig::Client),
                component("small", ComponentConfig::app_server(1)),
                component("large", ComponentConfig::app_server(3)),
            ],
            vec![
                Connection::read_write("client", "small"),
                Connection::read_write("client", "large"),
            ],
        )
        .unwrap();
        let profiles = profiles(&graph);
        let set = Router::new(&graph, &profiles, 64).route(TrafficClass::Read).unwrap();

        assert_eq!(
            rendered(&graph, &set),
            vec![
                ("client -> small".to_string(), 0.25),
                ("client -> large".to_string(), 0.75),
            ]
        );
        assert!((set.total_weight() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn branch_capacity_is_the_bottleneck() {
        // A wide app tier behind a single database is limited by the database.
        let graph = Graph::new(
            vec![
                component("client", ComponentConfig::Client),
                component("wide", ComponentConfig::app_server(8)),
                component("narrow", ComponentConfig::app_server(1)),
                component("db", ComponentConfig::database()),
            ],
            vec![
                Connection::read_write("client", "wide"),
                Connection::read_write("client", "narrow"),
                Connection::read_write("wide", "db"),
            ],
        )
        .unwrap();
        let profiles = profiles(&graph);
        let set = Router::new(&graph, &profiles, 64).route(TrafficClass::Read).unwrap();
        assert_eq!(
            rendered(&graph, &set),
            vec![
                ("client -> wide -> db".to_string(), 0.5),
                ("client -> narrow".to_string(), 0.5),
            ]
        );
    }

    fn cache_aside_graph(strategy: CacheStrategy) -> Graph {
        Graph::new(
            vec![
                component("client", ComponentConfig::Client),
                component("app", ComponentConfig::app_server(2)),
                component(
                    "cache",
                    ComponentConfig::Cache(CacheConfig {
                        hit_ratio: 0.9,
                        size_mb: None,
                        strategy,
                    }),
                ),
                component("db", ComponentConfig::database()),
            ],
            vec![
                Connection::read_write("client", "app"),
                Connection::read_write("app", "cache"),
                Connection::read_write("app", "db"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn reads_visit_cache_before_database() {
        let graph = cache_aside_graph(CacheStrategy::CacheAside);
        let profiles = profiles(&graph);
        let router = Router::new(&graph, &profiles, 64);

        let reads = router.route(TrafficClass::Read).unwrap();
        assert_eq!(rendered(&graph, &reads), vec![("client -> app -> cache -> db".to_string(), 1.0)]);

        let writes = router.route(TrafficClass::Write).unwrap();
        assert_eq!(rendered(&graph, &writes), vec![("client -> app -> db".to_string(), 1.0)]);
    }

    #[test]
    fn write_through_caches_see_writes() {
        let graph = cache_aside_graph(CacheStrategy::WriteThrough);
        let profiles = profiles(&graph);
        let writes = Router::new(&graph, &profiles, 64).route(TrafficClass::Write).unwrap();
        assert_eq!(rendered(&graph, &writes), vec![("client -> app -> cache -> db".to_string(), 1.0)]);
    }

    #[test]
    fn failover_links_are_not_routed() {
        let graph = Graph::new(
            vec![
                component("client", ComponentConfig::Client),
                component("primary", ComponentConfig::database()),
                component("standby", ComponentConfig::database()),
            ],
            vec![
                Connection::read_write("client", "primary"),
                Connection::read_write("primary", "standby"),
            ],
        )
        .unwrap();
        let profiles = profiles(&graph);
        let routes = Router::new(&graph, &profiles, 64)
            .route_all(&[TrafficClass::Read, TrafficClass::Write])
            .unwrap();
        assert_eq!(routes.order, vec![0, 1]);
        assert!(!routes.is_routed(2));
    }

    #[test]
    fn class_without_route_is_disconnected() {
        let graph = Graph::new(
            vec![
                component("client", ComponentConfig::Client),
                component("app", ComponentConfig::app_server(1)),
            ],
            vec![Connection::new("client", "app", TrafficType::Read)],
        )
        .unwrap();
        let profiles = profiles(&graph);
        let router = Router::new(&graph, &profiles, 64);
        assert!(router.route(TrafficClass::Read).is_ok());
        assert_eq!(
            router.route(TrafficClass::Write),
            Err(RouteError::Disconnected {
                class: TrafficClass::Write,
                entry: ComponentId::from("client"),
            })
        );
    }

    #[test]
    fn path_bound_is_enforced() {
        // Three layers of two-way fan-out give eight paths.
        let mut components = vec![component("client", ComponentConfig::Client)];
        let mut connections = Vec::new();
        let mut previous = vec!["client".to_string()];
        for layer in 0..3 {
            let ids: Vec<String> = (0..2).map(|i| format!("l{layer}-{i}")).collect();
            for id in &ids {
                components.push(component(id, ComponentConfig::app_server(1)));
                for from in &previous {
                    connections.push(Connection::read_write(from.as_str(), id.as_str()));
                }
            }
            previous = ids;
        }
        let graph = Graph::new(components, connections).unwrap();
        let profiles = profiles(&graph);

        assert_eq!(Router::new(&graph, &profiles, 8).route(TrafficClass::Read).unwrap().paths.len(), 8);
        assert_eq!(
            Router::new(&graph, &profiles, 7).route(TrafficClass::Read),
            Err(RouteError::TooManyPaths {
                class: TrafficClass::Read,
                limit: 7,
            })
        );
    }

    #[test]
    fn opposing_read_and_write_edges_route_independently() {
        let graph = Graph::new(
            vec![
                component("client", ComponentConfig::Client),
                component("a", ComponentConfig::app_server(1)),
                component("b", ComponentConfig::app_server(1)),
            ],
            vec![
                Connection::read_write("client", "a"),
                Connection::read_write("client", "b"),
                Connection::new("a", "b", TrafficType::Read),
                Connection::new("b", "a", TrafficType::Write),
            ],
        )
        .unwrap();
        let profiles = profiles(&graph);
        let routes = Router::new(&graph, &profiles, 64)
            .route_all(&[TrafficClass::Read, TrafficClass::Write])
            .unwrap();

        let reads = routes.get(TrafficClass::Read).unwrap();
        let writes = routes.get(TrafficClass::Write).unwrap();
        assert_eq!(
            rendered(&graph, reads),
            vec![
                ("client -> a -> b".to_string(), 0.5),
                ("client -> b".to_string(), 0.5)
            ]
        );
        assert_eq!(
            rendered(&graph, writes),
            vec![
                ("client -> a".to_string(), 0.5),
                ("client -> b -> a".to_string(), 0.5)
            ]
        );
        assert_eq!(routes.order, vec![0, 1, 2]);
    }
}
