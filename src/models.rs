use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub u32);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:04}", self.0)
    }
}

/// A canonical identity for one person across every spelling seen in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub display_name: String,
    pub aliases: BTreeSet<String>,
}

/// One aggregated directed relationship of a single relation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub from: StudentId,
    pub to: StudentId,
    pub weight: f64,
    pub relation: String,
    /// How many nominations were folded into this edge.
    pub mentions: u32,
    /// Index of the first row that produced the edge.
    pub source_row: usize,
}

/// Relation types that express distance rather than closeness.
pub const NEGATIVE_RELATIONS: [&str; 4] = ["avoidance", "avoid", "dislike", "conflict"];

/// Whether a relation type counts toward centrality, communities, and isolation.
pub fn is_positive_relation(relation: &str) -> bool {
    let relation = relation.trim().to_lowercase();
    !NEGATIVE_RELATIONS.contains(&relation.as_str())
}

impl RelationshipEdge {
    pub fn is_positive(&self) -> bool {
        is_positive_relation(&self.relation)
    }
}
