use serde::{Deserialize, Serialize};

use crate::graph::Adjacency;
use crate::models::StudentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reciprocity {
    /// Share of directed arcs whose reverse arc also exists. Self-loops are ignored.
    pub overall: f64,
    /// Mutual pairs, lower id first.
    pub mutual_pairs: Vec<(StudentId, StudentId)>,
    pub one_way_arcs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DyadCensus {
    pub mutual: usize,
    pub asymmetric: usize,
    pub null: usize,
}

pub(crate) fn reciprocity(adjacency: &Adjacency, ids: &[StudentId]) -> Reciprocity {
    let mut mutual_pairs = Vec::new();
    let mut arcs = 0usize;
    let mut reciprocated = 0usize;

    for (source, targets) in adjacency.outgoing.iter().enumerate() {
        for &target in targets.keys() {
            if source == target {
                continue;
            }
            arcs += 1;
            if adjacency.outgoing[target].contains_key(&source) {
                reciprocated += 1;
                if source < target {
                    mutual_pairs.push((ids[source], ids[target]));
                }
            }
        }
    }

    Reciprocity {
        overall: if arcs == 0 {
            0.0
        } else {
            reciprocated as f64 / arcs as f64
        },
        mutual_pairs,
        one_way_arcs: arcs - reciprocated,
    }
}

pub(crate) fn dyad_census(adjacency: &Adjacency) -> DyadCensus {
    let n = adjacency.len();
    let mut census = DyadCensus {
        mutual: 0,
        asymmetric: 0,
        null: 0,
    };
    for a in 0..n {
        for b in (a + 1)..n {
            let forward = adjacency.outgoing[a].contains_key(&b);
            let backward = adjacency.outgoing[b].contains_key(&a);
            match (forward, backward) {
                (true, true) => census.mutual += 1,
                (true, false) | (false, true) => census.asymmetric += 1,
                (false, false) => census.null += 1,
            }
        }
    }
    census
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::graph_from_pairs;

    #[test]
    fn reciprocity_counts_mutual_arcs() {
        let graph = graph_from_pairs(3, &[(0, 1), (1, 0), (1, 2)]);
        let result = reciprocity(&graph.adjacency(), &graph.node_ids());
        assert!((result.overall - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.mutual_pairs, vec![(StudentId(0), StudentId(1))]);
        assert_eq!(result.one_way_arcs, 1);
    }

    #[test]
    fn dyad_census_covers_all_pairs() {
        let graph = graph_from_pairs(4, &[(0, 1), (1, 0), (1, 2)]);
        let census = dyad_census(&graph.adjacency());
        assert_eq!(census.mutual, 1);
        assert_eq!(census.asymmetric, 1);
        assert_eq!(census.null, 4);
    }
}
