use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AnalysisOptions;
use crate::error::{Diagnostics, PipelineError};
use crate::graph::{RelationLayer, SocialGraph};
use crate::metrics::{AvoidanceReport, DyadCensus, GraphMetrics, LayerHighlights, Reciprocity};
use crate::models::{RelationshipEdge, StudentId};
use crate::resolver::match_key;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub display_name: String,
    pub aliases: Vec<String>,
    pub in_degree: usize,
    pub out_degree: usize,
    pub degree: usize,
    pub weighted_in: f64,
    pub weighted_out: f64,
    pub degree_centrality: f64,
    pub closeness: f64,
    pub betweenness: f64,
    pub community: usize,
    pub isolated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityRecord {
    pub label: usize,
    pub members: Vec<StudentId>,
    pub member_count: usize,
    /// Sum of member degrees.
    pub total_degree: usize,
    pub isolated_count: usize,
    /// Directed pairs with both ends inside the community.
    pub internal_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub node_count: usize,
    /// Distinct directed pairs between different students, positive
    /// relations only.
    pub edge_count: usize,
    /// Typed relationships of every polarity, one per (from, to, relation).
    pub relationship_count: usize,
    pub density: f64,
    pub average_degree: f64,
    pub isolated_count: usize,
    pub community_count: usize,
    pub modularity: f64,
    pub reciprocity: f64,
    pub weak_components: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohesion {
    pub reciprocity: Reciprocity,
    pub dyads: DyadCensus,
}

/// Read-only snapshot of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    run_id: Uuid,
    fingerprint: String,
    options: AnalysisOptions,
    summary: SummaryStats,
    students: Vec<StudentRecord>,
    edges: Vec<RelationshipEdge>,
    communities: Vec<CommunityRecord>,
    relation_layers: Vec<RelationLayer>,
    cohesion: Cohesion,
    avoidance: AvoidanceReport,
    highlights: Vec<LayerHighlights>,
    diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentKey<'a> {
    Id(StudentId),
    Name(&'a str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationCounts {
    pub relation: String,
    pub given: usize,
    pub received: usize,
}

/// One student's scores and relationships, as shown on a student page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProfile {
    pub student: StudentRecord,
    pub given: Vec<RelationshipEdge>,
    pub received: Vec<RelationshipEdge>,
    pub by_relation: Vec<RelationCounts>,
}

impl AnalysisResult {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn summary(&self) -> &SummaryStats {
        &self.summary
    }

    pub fn students(&self) -> &[StudentRecord] {
        &self.students
    }

    pub fn edges(&self) -> &[RelationshipEdge] {
        &self.edges
    }

    pub fn communities(&self) -> &[CommunityRecord] {
        &self.communities
    }

    pub fn relation_layers(&self) -> &[RelationLayer] {
        &self.relation_layers
    }

    pub fn cohesion(&self) -> &Cohesion {
        &self.cohesion
    }

    pub fn avoidance(&self) -> &AvoidanceReport {
        &self.avoidance
    }

    /// Most-chosen and most-active lists; the combined positive network
    /// comes first.
    pub fn highlights(&self) -> &[LayerHighlights] {
        &self.highlights
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Display name for `id`, or the id itself when it is not in the network.
    pub fn name_of(&self, id: StudentId) -> String {
        self.student(id)
            .map(|record| record.display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn student(&self, id: StudentId) -> Option<&StudentRecord> {
        self.students
            .binary_search_by_key(&id, |record| record.id)
            .ok()
            .map(|idx| &self.students[idx])
    }

    /// Matches the display name or any alias, ignoring case, spacing, and hyphens.
    pub fn find_student(&self, name: &str) -> Option<&StudentRecord> {
        let key = match_key(name);
        if key.is_empty() {
            return None;
        }
        self.students.iter().find(|record| {
            std::iter::once(&record.display_name)
                .chain(record.aliases.iter())
                .any(|alias| match_key(alias) == key)
        })
    }

    pub fn profile(&self, key: StudentKey<'_>) -> Option<StudentProfile> {
        let student = match key {
            StudentKey::Id(id) => self.student(id),
            StudentKey::Name(name) => self.find_student(name),
        }?
        .clone();

        let given: Vec<RelationshipEdge> = self
            .edges
            .iter()
            .filter(|edge| edge.from == student.id)
            .cloned()
            .collect();
        let received: Vec<RelationshipEdge> = self
            .edges
            .iter()
            .filter(|edge| edge.to == student.id)
            .cloned()
            .collect();

        let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for edge in &given {
            counts.entry(edge.relation.as_str()).or_default().0 += 1;
        }
        for edge in &received {
            counts.entry(edge.relation.as_str()).or_default().1 += 1;
        }
        let by_relation = counts
            .into_iter()
            .map(|(relation, (given, received))| RelationCounts {
                relation: relation.to_string(),
                given,
                received,
            })
            .collect();

        Some(StudentProfile {
            student,
            given,
            received,
            by_relation,
        })
    }

    pub fn isolated_students(&self) -> impl Iterator<Item = &StudentRecord> + '_ {
        self.students.iter().filter(|record| record.isolated)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Packages graph and metrics into a snapshot, re-checking the invariants a
/// caller may rely on.
pub fn aggregate(
    run_id: Uuid,
    fingerprint: String,
    options: AnalysisOptions,
    graph: &SocialGraph,
    metrics: GraphMetrics,
    diagnostics: Diagnostics,
) -> Result<AnalysisResult, PipelineError> {
    let node_ids: Vec<StudentId> = graph.students().map(|student| student.id).collect();
    let metric_ids: Vec<StudentId> = metrics.nodes.iter().map(|node| node.id).collect();
    if node_ids != metric_ids {
        return Err(PipelineError::InvariantViolation(
            "metrics do not cover the node set".to_string(),
        ));
    }

    let mut communities: Vec<CommunityRecord> = (0..metrics.community_count)
        .map(|label| CommunityRecord {
            label,
            members: Vec::new(),
            member_count: 0,
            total_degree: 0,
            isolated_count: 0,
            internal_edges: 0,
        })
        .collect();

    let mut students = Vec::with_capacity(metrics.nodes.len());
    for (student, node) in graph.students().zip(&metrics.nodes) {
        let community = communities.get_mut(node.community).ok_or_else(|| {
            PipelineError::InvariantViolation(format!(
                "student {} has community {} outside 0..{}",
                node.id, node.community, metrics.community_count
            ))
        })?;
        community.members.push(node.id);
        community.member_count += 1;
        community.total_degree += node.degree;
        community.isolated_count += usize::from(node.isolated);

        students.push(StudentRecord {
            id: student.id,
            display_name: student.display_name.clone(),
            aliases: student.aliases.iter().cloned().collect(),
            in_degree: node.in_degree,
            out_degree: node.out_degree,
            degree: node.degree,
            weighted_in: node.weighted_in,
            weighted_out: node.weighted_out,
            degree_centrality: node.degree_centrality,
            closeness: node.closeness,
            betweenness: node.betweenness,
            community: node.community,
            isolated: node.isolated,
        });
    }

    if let Some(empty) = communities.iter().find(|c| c.member_count == 0) {
        return Err(PipelineError::InvariantViolation(format!(
            "community {} has no members",
            empty.label
        )));
    }

    let community_of: BTreeMap<StudentId, usize> = students
        .iter()
        .map(|record| (record.id, record.community))
        .collect();
    let mut pairs: BTreeSet<(StudentId, StudentId)> = BTreeSet::new();
    for edge in graph.edges() {
        if edge.from != edge.to && edge.is_positive() {
            pairs.insert((edge.from, edge.to));
        }
    }
    for (from, to) in &pairs {
        let (Some(a), Some(b)) = (community_of.get(from), community_of.get(to)) else {
            return Err(PipelineError::InvariantViolation(format!(
                "edge {from} -> {to} leaves the node set"
            )));
        };
        if a == b {
            communities[*a].internal_edges += 1;
        }
    }

    let node_count = students.len();
    let edge_count = pairs.len();
    let total_degree: usize = students.iter().map(|record| record.degree).sum();
    let summary = SummaryStats {
        node_count,
        edge_count,
        relationship_count: graph.relationship_count(),
        density: if node_count > 1 {
            edge_count as f64 / (node_count * (node_count - 1)) as f64
        } else {
            0.0
        },
        average_degree: if node_count > 0 {
            total_degree as f64 / node_count as f64
        } else {
            0.0
        },
        isolated_count: students.iter().filter(|record| record.isolated).count(),
        community_count: metrics.community_count,
        modularity: metrics.modularity,
        reciprocity: metrics.reciprocity.overall,
        weak_components: metrics.weak_components,
    };

    tracing::info!(
        %run_id,
        nodes = summary.node_count,
        edges = summary.edge_count,
        density = summary.density,
        "analysis result assembled"
    );

    Ok(AnalysisResult {
        run_id,
        fingerprint,
        options,
        summary,
        students,
        edges: graph.edges().into_iter().cloned().collect(),
        communities,
        relation_layers: graph.relation_layers(),
        cohesion: Cohesion {
            reciprocity: metrics.reciprocity,
            dyads: metrics.dyads,
        },
        avoidance: metrics.avoidance,
        highlights: metrics.highlights,
        diagnostics,
    })
}
