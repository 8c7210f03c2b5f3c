//! Modularity-based community detection (Louvain local moving + aggregation).
//!
//! Directed arcs are folded into symmetric weights: `w(i,j) = w(i->j) + w(j->i)`.
//! Nodes are visited in ascending index order (= ascending student id) and
//! candidate communities in ascending label order, with ties kept in place,
//! so the partition is a pure function of the graph.

use std::collections::BTreeMap;

use crate::error::PipelineError;
use crate::graph::Adjacency;

use super::AbortSignal;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone)]
struct WeightedGraph {
    neighbors: Vec<BTreeMap<usize, f64>>,
    self_loops: Vec<f64>,
}

impl WeightedGraph {
    fn from_adjacency(adjacency: &Adjacency) -> Self {
        let n = adjacency.len();
        let mut neighbors = vec![BTreeMap::new(); n];
        let mut self_loops = vec![0.0; n];
        for (source, targets) in adjacency.outgoing.iter().enumerate() {
            for (&target, &weight) in targets {
                if source == target {
                    self_loops[source] += weight;
                } else {
                    *neighbors[source].entry(target).or_insert(0.0) += weight;
                    *neighbors[target].entry(source).or_insert(0.0) += weight;
                }
            }
        }
        Self {
            neighbors,
            self_loops,
        }
    }

    fn len(&self) -> usize {
        self.neighbors.len()
    }

    fn strength(&self, node: usize) -> f64 {
        self.neighbors[node].values().sum::<f64>() + 2.0 * self.self_loops[node]
    }

    fn aggregate(&self, labels: &[usize], count: usize) -> Self {
        let mut neighbors = vec![BTreeMap::new(); count];
        let mut self_loops = vec![0.0; count];
        for node in 0..self.len() {
            let community = labels[node];
            self_loops[community] += self.self_loops[node];
            for (&other, &weight) in &self.neighbors[node] {
                let other_community = labels[other];
                if other_community == community {
                    // Each internal edge is seen from both ends.
                    self_loops[community] += weight / 2.0;
                } else {
                    *neighbors[community].entry(other_community).or_insert(0.0) += weight;
                }
            }
        }
        Self {
            neighbors,
            self_loops,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Partition {
    /// Community label per node; labels are dense and numbered by first member.
    pub labels: Vec<usize>,
    pub count: usize,
    pub modularity: f64,
}

pub(crate) fn detect_communities(
    adjacency: &Adjacency,
    resolution: f64,
    max_passes: usize,
    abort: &AbortSignal,
) -> Result<Partition, PipelineError> {
    let base = WeightedGraph::from_adjacency(adjacency);
    let n = base.len();
    let total: f64 = (0..n).map(|node| base.strength(node)).sum();

    let mut membership: Vec<usize> = (0..n).collect();
    if total > 0.0 {
        let mut level = base.clone();
        for _ in 0..max_passes {
            abort.check("community detection")?;

            let (labels, moved) = local_moving(&level, total, resolution, max_passes);
            let (labels, count) = renumber(&labels);
            for community in membership.iter_mut() {
                *community = labels[*community];
            }
            if !moved || count == level.len() {
                break;
            }
            level = level.aggregate(&labels, count);
        }
    }

    let (labels, count) = renumber(&membership);
    let modularity = modularity(&base, &labels, count, total, resolution);
    tracing::debug!(communities = count, modularity, "community detection converged");
    Ok(Partition {
        labels,
        count,
        modularity,
    })
}

/// One Louvain phase: move single nodes while any move raises modularity.
fn local_moving(
    graph: &WeightedGraph,
    total: f64,
    resolution: f64,
    max_passes: usize,
) -> (Vec<usize>, bool) {
    let n = graph.len();
    let strengths: Vec<f64> = (0..n).map(|node| graph.strength(node)).collect();
    let mut labels: Vec<usize> = (0..n).collect();
    let mut community_totals = strengths.clone();
    let mut moved_any = false;

    for _ in 0..max_passes {
        let mut moved = false;
        for node in 0..n {
            let current = labels[node];
            let strength = strengths[node];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (&other, &weight) in &graph.neighbors[node] {
                *links.entry(labels[other]).or_insert(0.0) += weight;
            }

            community_totals[current] -= strength;
            let gain = |community: usize, link: f64| {
                link - resolution * community_totals[community] * strength / total
            };

            let mut best = current;
            let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
            for (&community, &link) in &links {
                let candidate = gain(community, link);
                if candidate > best_gain + MIN_GAIN {
                    best = community;
                    best_gain = candidate;
                }
            }

            community_totals[best] += strength;
            if best != current {
                labels[node] = best;
                moved = true;
                moved_any = true;
            }
        }
        if !moved {
            break;
        }
    }

    (labels, moved_any)
}

/// Relabels communities densely in order of their lowest member.
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
    let renumbered = labels
        .iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect();
    (renumbered, mapping.len())
}

fn modularity(
    graph: &WeightedGraph,
    labels: &[usize],
    count: usize,
    total: f64,
    resolution: f64,
) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let mut internal = vec![0.0; count];
    let mut totals = vec![0.0; count];
    for node in 0..graph.len() {
        let community = labels[node];
        totals[community] += graph.strength(node);
        internal[community] += 2.0 * graph.self_loops[node];
        for (&other, &weight) in &graph.neighbors[node] {
            if labels[other] == community {
                internal[community] += weight;
            }
        }
    }
    internal
        .iter()
        .zip(&totals)
        .map(|(inside, tot)| inside / total - resolution * (tot / total).powi(2))
        .sum()
}
