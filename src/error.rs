use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an advisory column mapping was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("no column is mapped to the respondent role")]
    MissingRespondent,
    #[error("no column is mapped to the nominee role")]
    MissingNominee,
    #[error("column '{column}' is mapped to both {first} and {second}")]
    ConflictingRoles {
        column: String,
        first: String,
        second: String,
    },
    #[error("more than one respondent column: {0:?}")]
    MultipleRespondents(Vec<String>),
    #[error("more than one weight column: {0:?}")]
    MultipleWeights(Vec<String>),
    #[error("mapping references unknown column '{0}'")]
    UnknownColumn(String),
    #[error("unrecognized role '{role}' for column '{column}'")]
    UnknownRole { column: String, role: String },
    #[error("no data rows remain after header normalization")]
    NoRows,
}

/// Fatal failures of an analysis run. No partial result accompanies any of these.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid analysis options: {0}")]
    InvalidOptions(String),
    #[error("mapping invalid: {0}")]
    MappingInvalid(#[from] MappingError),
    #[error("no relationships could be extracted; check the nominee columns and respondent names")]
    EmptyGraph,
    #[error("computation aborted during {stage}")]
    ComputationAborted { stage: &'static str },
    #[error("graph invariant violated: {0}")]
    InvariantViolation(String),
}

/// A non-fatal problem recorded while a run keeps going.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    RowSkipped {
        row: usize,
        reason: String,
    },
    NameResolutionAmbiguous {
        raw: String,
        candidate: String,
        score: f64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub rows_total: usize,
    pub rows_skipped: usize,
    pub self_loops_dropped: usize,
    pub unresolved_nominees: usize,
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn skip_row(&mut self, row: usize, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(row, %reason, "skipping survey row");
        self.rows_skipped += 1;
        self.entries.push(Diagnostic::RowSkipped { row, reason });
    }

    pub fn ambiguous_name(&mut self, raw: &str, candidate: &str, score: f64) {
        tracing::warn!(
            raw,
            candidate,
            score,
            "name is close to an existing student but below the merge threshold; keeping it distinct"
        );
        self.entries.push(Diagnostic::NameResolutionAmbiguous {
            raw: raw.to_string(),
            candidate: candidate.to_string(),
            score,
        });
    }

    pub fn ambiguous_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, Diagnostic::NameResolutionAmbiguous { .. }))
            .count()
    }
}
