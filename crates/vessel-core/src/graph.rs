//! Build ordering over the plan's declared `depends`.

use crate::CoreError;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use tracing::warn;
use vessel_schema::BuildPlan;

/// Edges run from a dependency to its dependents. Nodes carry the index of
/// the package in the plan.
pub struct DependencyGraph {
    graph: DiGraph<usize, ()>,
}

impl DependencyGraph {
    /// Dependencies on packages that are not part of the plan are ignored
    /// with a warning. A cycle is a configuration error.
    pub fn from_plan(plan: &BuildPlan) -> Result<Self, CoreError> {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for (i, spec) in plan.iter().enumerate() {
            nodes.insert(spec.name.as_str(), graph.add_node(i));
        }

        for spec in plan {
            let dependent = nodes[spec.name.as_str()];
            for dep in &spec.depends {
                match nodes.get(dep.as_str()) {
                    Some(&dep_idx) => {
                        graph.add_edge(dep_idx, dependent, ());
                    }
                    None => warn!(
                        "{} {} depends on {dep}, which is not in the release; ignoring",
                        spec.name, spec.version
                    ),
                }
            }
        }

        let dag = Self { graph };
        if toposort(&dag.graph, None).is_err() {
            return Err(CoreError::Cycle(dag.describe_cycle(plan)));
        }
        Ok(dag)
    }

    fn describe_cycle(&self, plan: &BuildPlan) -> String {
        let mut names: Vec<&str> = tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|idx| plan.iter().nth(self.graph[idx]))
            .map(|spec| spec.name.as_str())
            .collect();
        names.sort_unstable();
        names.join(", ")
    }

    /// Plan indices grouped into waves: every package's dependencies are in
    /// an earlier wave. Within a wave, plan order is kept.
    pub fn waves(&self) -> Vec<Vec<usize>> {
        let mut level: HashMap<NodeIndex, usize> = HashMap::new();
        // The graph is acyclic, checked at construction.
        let order = toposort(&self.graph, None).unwrap_or_default();
        for idx in &order {
            let l = self
                .graph
                .neighbors_directed(*idx, Direction::Incoming)
                .filter_map(|dep| level.get(&dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level.insert(*idx, l);
        }

        let depth = level.values().copied().max().map_or(0, |m| m + 1);
        let mut waves = vec![Vec::new(); depth];
        for (idx, l) in level {
            waves[l].push(self.graph[idx]);
        }
        for wave in &mut waves {
            wave.sort_unstable();
        }
        waves
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}
