//! Network metrics over a built [`SocialGraph`].

mod avoidance;
mod centrality;
mod cohesion;
mod community;
mod highlights;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisOptions;
use crate::error::PipelineError;
use crate::graph::SocialGraph;
use crate::models::StudentId;

pub use avoidance::{AvoidanceReport, AvoidanceRisk, AvoidanceWarning, WarningLevel};
pub use cohesion::{DyadCensus, Reciprocity};
pub use highlights::{ChoiceCount, LayerHighlights};

/// Label of the highlights computed over every positive relation together.
pub const ALL_RELATIONS: &str = "all";

/// Cooperative cancellation flag shared with whoever may stop a run.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self, stage: &'static str) -> Result<(), PipelineError> {
        if self.is_aborted() {
            tracing::warn!(stage, "analysis aborted");
            return Err(PipelineError::ComputationAborted { stage });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub id: StudentId,
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
pub struct GraphMetrics {
    /// One entry per node, ascending by id.
    pub nodes: Vec<NodeMetrics>,
    pub community_count: usize,
    pub modularity: f64,
    pub reciprocity: Reciprocity,
    pub dyads: DyadCensus,
    pub weak_components: usize,
    pub avoidance: AvoidanceReport,
    /// The combined positive network first, then one entry per positive
    /// relation type in name order.
    pub highlights: Vec<LayerHighlights>,
}

pub struct MetricsEngine<'a> {
    graph: &'a SocialGraph,
    options: &'a AnalysisOptions,
}

impl<'a> MetricsEngine<'a> {
    pub fn new(graph: &'a SocialGraph, options: &'a AnalysisOptions) -> Self {
        Self { graph, options }
    }

    /// Computes every metric, checking `abort` between node iterations.
    ///
    /// Either all metrics are returned or none are.
    pub fn compute(&self, abort: &AbortSignal) -> Result<GraphMetrics, PipelineError> {
        let adjacency = self.graph.adjacency();
        let ids = self.graph.node_ids();

        let degree_centrality = centrality::degree_centrality(&adjacency);
        let closeness =
            centrality::closeness_centrality(&adjacency, self.options.closeness_mode, abort)?;
        let betweenness = centrality::betweenness_centrality(&adjacency, abort)?;
        let partition = community::detect_communities(
            &adjacency,
            self.options.community_resolution,
            self.options.max_community_passes,
            abort,
        )?;
        let reciprocity = cohesion::reciprocity(&adjacency, &ids);
        let dyads = cohesion::dyad_census(&adjacency);
        let avoidance =
            avoidance::analyze_avoidance(&self.graph.avoidance_adjacency(), &adjacency, &ids);

        let mut layer_highlights =
            vec![highlights::layer_highlights(ALL_RELATIONS, &adjacency, &ids)];
        for relation in self.graph.positive_relations() {
            let layer = self.graph.relation_adjacency(&relation);
            layer_highlights.push(highlights::layer_highlights(&relation, &layer, &ids));
        }

        let nodes: Vec<NodeMetrics> = ids
            .iter()
            .enumerate()
            .map(|(node, &id)| {
                let degree = adjacency.degree(node);
                NodeMetrics {
                    id,
                    in_degree: adjacency.in_degree(node),
                    out_degree: adjacency.out_degree(node),
                    degree,
                    weighted_in: adjacency.incoming[node].values().sum(),
                    weighted_out: adjacency.outgoing[node].values().sum(),
                    degree_centrality: degree_centrality[node],
                    closeness: closeness[node],
                    betweenness: betweenness[node],
                    community: partition.labels[node],
                    isolated: degree <= self.options.isolation_threshold,
                }
            })
            .collect();

        let isolated = nodes.iter().filter(|node| node.isolated).count();
        tracing::info!(
            nodes = nodes.len(),
            communities = partition.count,
            modularity = partition.modularity,
            isolated,
            "metrics computed"
        );

        Ok(GraphMetrics {
            nodes,
            community_count: partition.count,
            modularity: partition.modularity,
            reciprocity,
            dyads,
            weak_components: self.graph.weak_component_count(),
            avoidance,
            highlights: layer_highlights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{edge, graph_from_pairs, student};

    #[test]
    fn single_pair_scores() {
        let graph = graph_from_pairs(2, &[(0, 1)]);
        let options = AnalysisOptions::default();
        let metrics = MetricsEngine::new(&graph, &options)
            .compute(&AbortSignal::new())
            .unwrap();

        assert_eq!(metrics.nodes.len(), 2);
        for node in &metrics.nodes {
            assert_eq!(node.degree, 1);
            assert_eq!(node.degree_centrality, 1.0);
            assert_eq!(node.betweenness, 0.0);
            assert_eq!(node.community, 0);
            assert!(!node.isolated);
        }
        assert_eq!(metrics.nodes[0].closeness, 0.0);
        assert_eq!(metrics.nodes[1].closeness, 1.0);
        assert_eq!(metrics.community_count, 1);
    }

    #[test]
    fn single_node_self_loop_is_one_isolated_community() {
        let graph = SocialGraph::build(
            vec![student(0, "Park Ji-ho")],
            vec![edge(0, 0, "friendship", 1.0)],
        )
        .unwrap();
        let options = AnalysisOptions {
            allow_self_loops: true,
            ..AnalysisOptions::default()
        };
        let metrics = MetricsEngine::new(&graph, &options)
            .compute(&AbortSignal::new())
            .unwrap();
        let node = &metrics.nodes[0];
        assert_eq!(node.degree, 0);
        assert_eq!(node.degree_centrality, 0.0);
        assert_eq!(node.closeness, 0.0);
        assert_eq!(node.betweenness, 0.0);
        assert!(node.isolated);
        assert_eq!(metrics.community_count, 1);
    }

    #[test]
    fn isolation_threshold_is_configurable() {
        let graph = graph_from_pairs(4, &[(0, 1), (1, 2), (2, 1)]);
        let options = AnalysisOptions {
            isolation_threshold: 1,
            ..AnalysisOptions::default()
        };
        let metrics = MetricsEngine::new(&graph, &options)
            .compute(&AbortSignal::new())
            .unwrap();
        let flags: Vec<bool> = metrics.nodes.iter().map(|n| n.isolated).collect();
        assert_eq!(flags, vec![true, false, false, true]);
        assert_eq!(metrics.weak_components, 2);
    }

    #[test]
    fn avoided_student_stays_outside_the_friend_group() {
        let graph = SocialGraph::build(
            (0..3).map(|id| student(id, &format!("Student {id}"))).collect(),
            vec![
                edge(0, 1, "friendship", 1.0),
                edge(1, 0, "friendship", 1.0),
                edge(0, 2, "avoidance", 1.0),
                edge(1, 2, "avoidance", 1.0),
            ],
        )
        .unwrap();
        let options = AnalysisOptions::default();
        let metrics = MetricsEngine::new(&graph, &options)
            .compute(&AbortSignal::new())
            .unwrap();

        let avoided = &metrics.nodes[2];
        assert_eq!(avoided.degree, 0);
        assert_eq!(avoided.betweenness, 0.0);
        assert!(avoided.isolated);
        assert_ne!(avoided.community, metrics.nodes[0].community);
        assert_eq!(metrics.nodes[0].degree, 2);
        assert_eq!(metrics.reciprocity.overall, 1.0);
        assert_eq!(metrics.weak_components, 2);
        assert_eq!(metrics.avoidance.avoidance_edges, 2);

        let relations: Vec<&str> = metrics
            .highlights
            .iter()
            .map(|layer| layer.relation.as_str())
            .collect();
        assert_eq!(relations, vec![ALL_RELATIONS, "friendship"]);
        assert!(metrics.highlights[0].unchosen.contains(&StudentId(2)));
    }

    #[test]
    fn aborted_run_returns_no_metrics() {
        let graph = graph_from_pairs(3, &[(0, 1), (1, 2)]);
        let options = AnalysisOptions::default();
        let abort = AbortSignal::new();
        abort.abort();
        assert!(matches!(
            MetricsEngine::new(&graph, &options).compute(&abort),
            Err(PipelineError::ComputationAborted { .. })
        ));
    }
}
