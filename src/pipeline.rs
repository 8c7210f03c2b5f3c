use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::config::AnalysisOptions;
use crate::error::PipelineError;
use crate::extract::extract;
use crate::graph::SocialGraph;
use crate::mapping::{validate, SuggestedMapping};
use crate::metrics::{AbortSignal, MetricsEngine};
use crate::result::{aggregate, AnalysisResult};
use crate::table::RawTable;

const RUN_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b9e_4d3a_5e70_8a41_c2d9_0b7e_3f15);
const FIELD_SEP: [u8; 1] = [0x1f];
const RECORD_SEP: [u8; 1] = [0x1e];

/// SHA-256 over the raw table, the suggested mapping, and the options.
///
/// Cells are visited in header order, so two tables with the same content
/// hash identically regardless of how their rows were assembled.
pub fn fingerprint(
    table: &RawTable,
    mapping: &SuggestedMapping,
    options: &AnalysisOptions,
) -> Result<String, PipelineError> {
    let mut hasher = Sha256::new();
    for header in &table.headers {
        hasher.update(header.as_bytes());
        hasher.update(FIELD_SEP);
    }
    hasher.update(RECORD_SEP);
    for row in &table.rows {
        for header in &table.headers {
            hasher.update(row.get(header).map(String::as_str).unwrap_or("").as_bytes());
            hasher.update(FIELD_SEP);
        }
        hasher.update(RECORD_SEP);
    }
    for (column, role) in &mapping.0 {
        hasher.update(column.as_bytes());
        hasher.update(FIELD_SEP);
        hasher.update(role.as_bytes());
        hasher.update(RECORD_SEP);
    }
    let encoded = serde_json::to_vec(options).map_err(|err| {
        PipelineError::InvariantViolation(format!("options could not be encoded: {err}"))
    })?;
    hasher.update(&encoded);
    Ok(hex::encode(hasher.finalize()))
}

pub fn run_id(fingerprint: &str) -> Uuid {
    Uuid::new_v5(&RUN_NAMESPACE, fingerprint.as_bytes())
}

fn check_options(options: &AnalysisOptions) -> Result<(), PipelineError> {
    options
        .validate()
        .map_err(|err| PipelineError::InvalidOptions(err.to_string()))
}

/// Runs validation, extraction, graph construction, metrics, and aggregation.
///
/// Nothing is returned unless every stage completes; `abort` is honoured
/// between stages and inside the metric loops.
pub fn analyze(
    table: &RawTable,
    mapping: &SuggestedMapping,
    options: &AnalysisOptions,
    abort: &AbortSignal,
) -> Result<AnalysisResult, PipelineError> {
    check_options(options)?;
    let fingerprint = fingerprint(table, mapping, options)?;
    let run_id = run_id(&fingerprint);
    let span = tracing::info_span!("analysis", %run_id);
    let _guard = span.enter();

    let input = validate(table, mapping)?;
    abort.check("extraction")?;

    let extraction = extract(&input.table, &input.descriptor, options);
    abort.check("graph construction")?;

    let graph = SocialGraph::build(extraction.students, extraction.edges)?;
    let metrics = MetricsEngine::new(&graph, options).compute(abort)?;
    abort.check("aggregation")?;

    aggregate(
        run_id,
        fingerprint,
        options.clone(),
        &graph,
        metrics,
        extraction.diagnostics,
    )
}

/// Like [`analyze`], but serves and stores snapshots through `cache`.
///
/// Failed or aborted runs leave the cache untouched.
pub fn analyze_cached(
    cache: &ResultCache,
    table: &RawTable,
    mapping: &SuggestedMapping,
    options: &AnalysisOptions,
    abort: &AbortSignal,
) -> Result<Arc<AnalysisResult>, PipelineError> {
    check_options(options)?;
    let key = fingerprint(table, mapping, options)?;
    if let Some(hit) = cache.get(&key) {
        tracing::debug!(fingerprint = %key, "serving cached analysis");
        return Ok(hit);
    }
    let result = analyze(table, mapping, options, abort)?;
    Ok(cache.insert(result))
}
