use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeFiltered, EdgeRef};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::{is_positive_relation, RelationshipEdge, Student, StudentId};
use crate::resolver::match_key;

/// Directed, weighted multi-relationship graph over canonical students.
///
/// Parallel edges are allowed when their relation types differ. Nodes are
/// inserted in ascending student id, so node index order equals id order.
/// Avoidance-type edges are stored and listed, but degree, neighbour,
/// reachability, and component queries follow positive relations only.
#[derive(Debug, Clone)]
pub struct SocialGraph {
    graph: DiGraph<Student, RelationshipEdge>,
    index: BTreeMap<StudentId, NodeIndex>,
}

/// Relation-type layer totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationLayer {
    pub relation: String,
    pub edge_count: usize,
    pub total_weight: f64,
}

/// Collapsed view used by the metrics: one weighted arc per directed pair,
/// summed over the selected relations. Positions are node indices.
#[derive(Debug, Clone)]
pub(crate) struct Adjacency {
    pub outgoing: Vec<BTreeMap<usize, f64>>,
    pub incoming: Vec<BTreeMap<usize, f64>>,
}

impl Adjacency {
    pub fn len(&self) -> usize {
        self.outgoing.len()
    }

    /// Distinct successors, self excluded.
    pub fn out_degree(&self, node: usize) -> usize {
        self.outgoing[node].keys().filter(|&&other| other != node).count()
    }

    /// Distinct predecessors, self excluded.
    pub fn in_degree(&self, node: usize) -> usize {
        self.incoming[node].keys().filter(|&&other| other != node).count()
    }

    pub fn degree(&self, node: usize) -> usize {
        self.out_degree(node) + self.in_degree(node)
    }
}

impl SocialGraph {
    pub fn build(
        mut students: Vec<Student>,
        edges: Vec<RelationshipEdge>,
    ) -> Result<Self, PipelineError> {
        if edges.is_empty() {
            return Err(PipelineError::EmptyGraph);
        }

        students.sort_by_key(|student| student.id);
        let mut graph: DiGraph<Student, RelationshipEdge> = DiGraph::with_capacity(students.len(), edges.len());
        let mut index = BTreeMap::new();
        for student in students {
            let id = student.id;
            if index.insert(id, graph.add_node(student)).is_some() {
                return Err(PipelineError::InvariantViolation(format!(
                    "student {id} appears twice"
                )));
            }
        }

        for edge in edges {
            let endpoint = |id: StudentId| {
                index.get(&id).copied().ok_or_else(|| {
                    PipelineError::InvariantViolation(format!(
                        "edge endpoint {id} is not a known student"
                    ))
                })
            };
            let source = endpoint(edge.from)?;
            let target = endpoint(edge.to)?;

            let existing = graph
                .edges_connecting(source, target)
                .find(|e| e.weight().relation == edge.relation)
                .map(|e| e.id());
            match existing {
                Some(edge_id) => {
                    let current = &mut graph[edge_id];
                    current.weight += edge.weight;
                    current.mentions += edge.mentions;
                    current.source_row = current.source_row.min(edge.source_row);
                }
                None => {
                    graph.add_edge(source, target, edge);
                }
            }
        }

        tracing::info!(
            nodes = graph.node_count(),
            relationships = graph.edge_count(),
            "graph built"
        );
        Ok(Self { graph, index })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Typed edges, counting each relation between a pair separately.
    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Distinct directed (from, to) pairs between different students over
    /// positive relations.
    pub fn pair_count(&self) -> usize {
        let adjacency = self.adjacency();
        (0..adjacency.len())
            .map(|node| adjacency.out_degree(node))
            .sum()
    }

    pub fn students(&self) -> impl Iterator<Item = &Student> + '_ {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    pub fn student(&self, id: StudentId) -> Option<&Student> {
        self.index.get(&id).map(|&idx| &self.graph[idx])
    }

    /// Looks a student up by display name or any observed alias.
    pub fn find_by_name(&self, name: &str) -> Option<&Student> {
        let key = match_key(name);
        if key.is_empty() {
            return None;
        }
        self.students().find(|student| {
            student
                .aliases
                .iter()
                .chain(std::iter::once(&student.display_name))
                .any(|alias| match_key(alias) == key)
        })
    }

    /// Edges ordered by (from, to, relation).
    pub fn edges(&self) -> Vec<&RelationshipEdge> {
        let mut edges: Vec<&RelationshipEdge> = self.graph.edge_weights().collect();
        edges.sort_by(|a, b| (a.from, a.to, &a.relation).cmp(&(b.from, b.to, &b.relation)));
        edges
    }

    pub fn successors(&self, id: StudentId) -> BTreeSet<StudentId> {
        self.neighbors_directed(id, Direction::Outgoing)
    }

    pub fn predecessors(&self, id: StudentId) -> BTreeSet<StudentId> {
        self.neighbors_directed(id, Direction::Incoming)
    }

    /// Everyone connected to `id` in either direction.
    pub fn neighbors(&self, id: StudentId) -> BTreeSet<StudentId> {
        let mut all = self.successors(id);
        all.extend(self.predecessors(id));
        all
    }

    /// Distinct students nominated by `id`; a self-nomination does not count.
    pub fn out_degree(&self, id: StudentId) -> usize {
        self.successors(id).into_iter().filter(|&other| other != id).count()
    }

    /// Distinct students nominating `id`; a self-nomination does not count.
    pub fn in_degree(&self, id: StudentId) -> usize {
        self.predecessors(id).into_iter().filter(|&other| other != id).count()
    }

    /// Whether a directed path of positive relations leads from `from` to `to`.
    pub fn reachable(&self, from: StudentId, to: StudentId) -> bool {
        let positive = EdgeFiltered::from_fn(&self.graph, |edge| edge.weight().is_positive());
        match (self.index.get(&from), self.index.get(&to)) {
            (Some(&source), Some(&target)) => has_path_connecting(&positive, source, target, None),
            _ => false,
        }
    }

    /// Weakly connected components of the positive relations.
    pub fn weak_component_count(&self) -> usize {
        let mut components = UnionFind::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            if edge.weight().is_positive() {
                components.union(edge.source().index(), edge.target().index());
            }
        }
        let mut roots = components.into_labeling();
        roots.sort_unstable();
        roots.dedup();
        roots.len()
    }

    pub fn relation_layers(&self) -> Vec<RelationLayer> {
        let mut layers: BTreeMap<&str, RelationLayer> = BTreeMap::new();
        for edge in self.graph.edge_weights() {
            let layer = layers
                .entry(edge.relation.as_str())
                .or_insert_with(|| RelationLayer {
                    relation: edge.relation.clone(),
                    edge_count: 0,
                    total_weight: 0.0,
                });
            layer.edge_count += 1;
            layer.total_weight += edge.weight;
        }
        layers.into_values().collect()
    }

    pub(crate) fn node_ids(&self) -> Vec<StudentId> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].id)
            .collect()
    }

    /// Positive relations only.
    pub(crate) fn adjacency(&self) -> Adjacency {
        self.adjacency_where(RelationshipEdge::is_positive)
    }

    pub(crate) fn avoidance_adjacency(&self) -> Adjacency {
        self.adjacency_where(|edge| !edge.is_positive())
    }

    pub(crate) fn relation_adjacency(&self, relation: &str) -> Adjacency {
        self.adjacency_where(|edge| edge.relation == relation)
    }

    /// Relation types present in the graph that count as positive, sorted.
    pub fn positive_relations(&self) -> Vec<String> {
        self.relation_layers()
            .into_iter()
            .map(|layer| layer.relation)
            .filter(|relation| is_positive_relation(relation))
            .collect()
    }

    fn adjacency_where<F>(&self, keep: F) -> Adjacency
    where
        F: Fn(&RelationshipEdge) -> bool,
    {
        let n = self.graph.node_count();
        let mut outgoing = vec![BTreeMap::new(); n];
        let mut incoming = vec![BTreeMap::new(); n];
        for edge in self.graph.edge_references() {
            if !keep(edge.weight()) {
                continue;
            }
            let (source, target) = (edge.source().index(), edge.target().index());
            *outgoing[source].entry(target).or_insert(0.0) += edge.weight().weight;
            *incoming[target].entry(source).or_insert(0.0) += edge.weight().weight;
        }
        Adjacency { outgoing, incoming }
    }

    fn neighbors_directed(&self, id: StudentId, direction: Direction) -> BTreeSet<StudentId> {
        match self.index.get(&id) {
            Some(&idx) => self
                .graph
                .edges_directed(idx, direction)
                .filter(|edge| edge.weight().is_positive())
                .map(|edge| match direction {
                    Direction::Outgoing => self.graph[edge.target()].id,
                    Direction::Incoming => self.graph[edge.source()].id,
                })
                .collect(),
            None => BTreeSet::new(),
        }
    }
}
