//! Turns peer-nomination survey tables into a student social network and
//! scores it: centrality, communities, isolation and avoidance.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod mapping;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod result;
pub mod table;

pub use cache::ResultCache;
pub use config::{AnalysisOptions, ClosenessMode, WeightMode};
pub use error::{Diagnostic, Diagnostics, MappingError, PipelineError};
pub use graph::SocialGraph;
pub use mapping::SuggestedMapping;
pub use metrics::{
    AbortSignal, AvoidanceReport, AvoidanceRisk, AvoidanceWarning, LayerHighlights, MetricsEngine,
    WarningLevel,
};
pub use models::{RelationshipEdge, Student, StudentId};
pub use pipeline::{analyze, analyze_cached};
pub use result::{AnalysisResult, StudentKey, StudentProfile};
pub use table::RawTable;
