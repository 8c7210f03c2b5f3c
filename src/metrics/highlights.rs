use serde::{Deserialize, Serialize};

use crate::graph::Adjacency;
use crate::models::StudentId;

/// Entries kept in each ranked list.
pub const HIGHLIGHT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceCount {
    pub id: StudentId,
    pub count: usize,
}

/// Who is chosen most, who chooses most, and who nobody chose, within one
/// relation type or across all positive relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerHighlights {
    pub relation: String,
    pub most_chosen: Vec<ChoiceCount>,
    pub most_active: Vec<ChoiceCount>,
    /// Students with no nominations received in this layer.
    pub unchosen: Vec<StudentId>,
}

fn ranked<F>(n: usize, ids: &[StudentId], count: F) -> Vec<ChoiceCount>
where
    F: Fn(usize) -> usize,
{
    let mut entries: Vec<ChoiceCount> = (0..n)
        .map(|node| ChoiceCount {
            id: ids[node],
            count: count(node),
        })
        .filter(|entry| entry.count > 0)
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));
    entries.truncate(HIGHLIGHT_LIMIT);
    entries
}

pub(crate) fn layer_highlights(
    relation: &str,
    adjacency: &Adjacency,
    ids: &[StudentId],
) -> LayerHighlights {
    let n = adjacency.len();
    LayerHighlights {
        relation: relation.to_string(),
        most_chosen: ranked(n, ids, |node| adjacency.in_degree(node)),
        most_active: ranked(n, ids, |node| adjacency.out_degree(node)),
        unchosen: (0..n)
            .filter(|&node| adjacency.in_degree(node) == 0)
            .map(|node| ids[node])
            .collect(),
    }
}
