//! Degree, closeness, and betweenness centrality over the collapsed graph.
//!
//! All three use hop counts; edge weights do not shorten paths.

use std::collections::VecDeque;

use crate::config::ClosenessMode;
use crate::error::PipelineError;
use crate::graph::Adjacency;

use super::AbortSignal;

/// (in + out) / (n - 1). Zero for a single node.
pub(crate) fn degree_centrality(adjacency: &Adjacency) -> Vec<f64> {
    let n = adjacency.len();
    if n <= 1 {
        return vec![0.0; n];
    }
    let scale = (n - 1) as f64;
    (0..n)
        .map(|node| adjacency.degree(node) as f64 / scale)
        .collect()
}

/// Reachable count over summed distance, per node.
///
/// Unreachable nodes are left out of the sum, so on a disconnected graph each
/// node is scored within its own component. Nothing reachable scores 0. In
/// directed mode distances are measured along incoming paths, i.e. how close
/// everyone else is to the node.
pub(crate) fn closeness_centrality(
    adjacency: &Adjacency,
    mode: ClosenessMode,
    abort: &AbortSignal,
) -> Result<Vec<f64>, PipelineError> {
    let n = adjacency.len();
    let mut scores = vec![0.0; n];

    for (source, score) in scores.iter_mut().enumerate() {
        abort.check("closeness centrality")?;

        let mut distance: Vec<Option<usize>> = vec![None; n];
        distance[source] = Some(0);
        let mut queue = VecDeque::from([source]);
        let mut reached = 0usize;
        let mut total = 0usize;

        while let Some(node) = queue.pop_front() {
            let next_distance = distance[node].unwrap_or(0) + 1;
            let neighbors: Box<dyn Iterator<Item = &usize>> = match mode {
                ClosenessMode::Directed => Box::new(adjacency.incoming[node].keys()),
                ClosenessMode::Undirected => Box::new(
                    adjacency.outgoing[node]
                        .keys()
                        .chain(adjacency.incoming[node].keys()),
                ),
            };
            for &neighbor in neighbors {
                if distance[neighbor].is_none() {
                    distance[neighbor] = Some(next_distance);
                    reached += 1;
                    total += next_distance;
                    queue.push_back(neighbor);
                }
            }
        }

        if total > 0 {
            *score = reached as f64 / total as f64;
        }
    }

    Ok(scores)
}

/// Brandes' algorithm on directed hop distances, normalized by (n-1)(n-2).
///
/// Checks `abort` before each source node.
pub(crate) fn betweenness_centrality(
    adjacency: &Adjacency,
    abort: &AbortSignal,
) -> Result<Vec<f64>, PipelineError> {
    let n = adjacency.len();
    let mut centrality = vec![0.0; n];
    if n <= 2 {
        return Ok(centrality);
    }

    for source in 0..n {
        abort.check("betweenness centrality")?;

        let mut stack = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut paths = vec![0.0f64; n];
        let mut distance: Vec<Option<usize>> = vec![None; n];
        paths[source] = 1.0;
        distance[source] = Some(0);

        let mut queue = VecDeque::from([source]);
        while let Some(node) = queue.pop_front() {
            stack.push(node);
            let node_distance = distance[node].unwrap_or(0);
            for &next in adjacency.outgoing[node].keys() {
                if distance[next].is_none() {
                    distance[next] = Some(node_distance + 1);
                    queue.push_back(next);
                }
                if distance[next] == Some(node_distance + 1) {
                    paths[next] += paths[node];
                    predecessors[next].push(node);
                }
            }
        }

        let mut dependency = vec![0.0f64; n];
        while let Some(node) = stack.pop() {
            for &pred in &predecessors[node] {
                dependency[pred] += paths[pred] / paths[node] * (1.0 + dependency[node]);
            }
            if node != source {
                centrality[node] += dependency[node];
            }
        }
    }

    let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
    for value in centrality.iter_mut() {
        *value *= scale;
    }
    Ok(centrality)
}
