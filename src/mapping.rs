use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::table::{normalize_header, RawTable};

pub const DEFAULT_RELATION: &str = "general";

const RELATION_KEYWORDS: [(&str, &str); 14] = [
    ("friend", "friendship"),
    ("avoid", "avoidance"),
    ("dislike", "avoidance"),
    ("trust", "trust"),
    ("help", "help"),
    ("team", "collaboration"),
    ("together", "collaboration"),
    ("collab", "collaboration"),
    ("lead", "leadership"),
    ("communicat", "communication"),
    ("talk", "communication"),
    ("study", "study"),
    ("prefer", "preference"),
    ("like", "preference"),
];

/// The column → role suggestion produced by the external mapping service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestedMapping(pub BTreeMap<String, String>);

impl SuggestedMapping {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(column, role)| (column.into(), role.into()))
                .collect(),
        )
    }

    pub fn from_json_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read mapping from {}", path.display()))?;
        serde_json::from_str(&raw).context("mapping must be a JSON object of column -> role")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Respondent,
    Nominee { relation: Option<String> },
    Weight,
    Ignore,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let (base, suffix) = match lowered.split_once(':') {
            Some((base, suffix)) => (base.trim(), Some(suffix.trim())),
            None => (lowered.as_str(), None),
        };

        let role = match base {
            "respondent" | "name" | "student" => Role::Respondent,
            "nominee" | "nomination" | "relationship" | "target" => Role::Nominee {
                relation: suffix.filter(|s| !s.is_empty()).map(str::to_string),
            },
            "weight" | "strength" => Role::Weight,
            "ignore" | "timestamp" | "metadata" | "none" => Role::Ignore,
            _ => return None,
        };

        if suffix.is_some() && !matches!(role, Role::Nominee { .. }) {
            return None;
        }
        Some(role)
    }

    fn label(&self) -> &'static str {
        match self {
            Role::Respondent => "respondent",
            Role::Nominee { .. } => "nominee",
            Role::Weight => "weight",
            Role::Ignore => "ignore",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Nominee {
                relation: Some(relation),
            } => write!(f, "nominee:{relation}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomineeColumn {
    pub column: String,
    pub relation: String,
}

/// Validated column roles. Constructed only through [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDescriptor {
    respondent: String,
    nominees: Vec<NomineeColumn>,
    weight: Option<String>,
}

impl MappingDescriptor {
    pub fn respondent(&self) -> &str {
        &self.respondent
    }

    pub fn nominees(&self) -> &[NomineeColumn] {
        &self.nominees
    }

    pub fn weight(&self) -> Option<&str> {
        self.weight.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedInput {
    pub descriptor: MappingDescriptor,
    pub table: RawTable,
}

pub fn infer_relation(header: &str) -> String {
    let lowered = header.to_lowercase();
    RELATION_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, relation)| relation.to_string())
        .unwrap_or_else(|| DEFAULT_RELATION.to_string())
}

/// Checks an advisory mapping against the table and normalizes the table.
///
/// Fails fast; no row content is inspected until the roles themselves are
/// consistent.
pub fn validate(
    table: &RawTable,
    suggestion: &SuggestedMapping,
) -> Result<ValidatedInput, MappingError> {
    let normalized = table.normalized();

    let mut roles: BTreeMap<String, Role> = BTreeMap::new();
    for (raw_column, raw_role) in &suggestion.0 {
        let column = normalize_header(raw_column);
        let role = Role::parse(raw_role).ok_or_else(|| MappingError::UnknownRole {
            column: raw_column.clone(),
            role: raw_role.clone(),
        })?;

        if !normalized.headers.contains(&column) {
            return Err(MappingError::UnknownColumn(raw_column.clone()));
        }

        if let Some(existing) = roles.get(&column) {
            if *existing != role {
                return Err(MappingError::ConflictingRoles {
                    column,
                    first: existing.to_string(),
                    second: role.to_string(),
                });
            }
            continue;
        }
        roles.insert(column, role);
    }

    // Header order, not suggestion order, decides column order.
    let mut respondents = Vec::new();
    let mut nominees = Vec::new();
    let mut weights = Vec::new();
    for header in &normalized.headers {
        match roles.get(header) {
            Some(Role::Respondent) => respondents.push(header.clone()),
            Some(Role::Nominee { relation }) => nominees.push(NomineeColumn {
                column: header.clone(),
                relation: relation.clone().unwrap_or_else(|| infer_relation(header)),
            }),
            Some(Role::Weight) => weights.push(header.clone()),
            Some(Role::Ignore) | None => {}
        }
    }

    if respondents.is_empty() {
        return Err(MappingError::MissingRespondent);
    }
    if respondents.len() > 1 {
        return Err(MappingError::MultipleRespondents(respondents));
    }
    if nominees.is_empty() {
        return Err(MappingError::MissingNominee);
    }
    if weights.len() > 1 {
        return Err(MappingError::MultipleWeights(weights));
    }
    if normalized.rows.is_empty() {
        return Err(MappingError::NoRows);
    }

    let descriptor = MappingDescriptor {
        respondent: respondents.remove(0),
        nominees,
        weight: weights.pop(),
    };
    tracing::info!(
        respondent = descriptor.respondent(),
        nominee_columns = descriptor.nominees().len(),
        weighted = descriptor.weight().is_some(),
        "mapping validated"
    );

    Ok(ValidatedInput {
        descriptor,
        table: normalized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn survey() -> RawTable {
        RawTable::from_records(
            ["Timestamp", "Your name", "Best friends", "Who helps you?"],
            vec![vec!["2026-03-02", "Avery Lee", "Jules Moreno", "Kiara Patel"]],
        )
    }

    #[test]
    fn accepts_respondent_and_nominees() {
        let suggestion = SuggestedMapping::from_pairs([
            ("Timestamp", "timestamp"),
            ("Your name", "respondent"),
            ("Best friends", "nominee"),
            ("Who helps you?", "nominee"),
        ]);
        let validated = validate(&survey(), &suggestion).unwrap();
        let descriptor = validated.descriptor;
        assert_eq!(descriptor.respondent(), "Your name");
        assert_eq!(descriptor.nominees().len(), 2);
        assert_eq!(descriptor.nominees()[0].relation, "friendship");
        assert_eq!(descriptor.nominees()[1].relation, "help");
        assert!(descriptor.weight().is_none());
    }

    #[test]
    fn explicit_relation_suffix_wins_over_keywords() {
        let suggestion = SuggestedMapping::from_pairs([
            ("Your name", "Respondent"),
            ("Best friends", "nominee:trust"),
        ]);
        let validated = validate(&survey(), &suggestion).unwrap();
        assert_eq!(validated.descriptor.nominees()[0].relation, "trust");
    }

    #[test]
    fn rejects_missing_nominee() {
        let suggestion = SuggestedMapping::from_pairs([("Your name", "respondent")]);
        assert_eq!(
            validate(&survey(), &suggestion).unwrap_err(),
            MappingError::MissingNominee
        );
    }

    #[test]
    fn rejects_missing_respondent() {
        let suggestion = SuggestedMapping::from_pairs([("Best friends", "nominee")]);
        assert_eq!(
            validate(&survey(), &suggestion).unwrap_err(),
            MappingError::MissingRespondent
        );
    }

    #[test]
    fn rejects_same_column_for_respondent_and_nominee() {
        let table = RawTable::from_records(
            ["Name", "Name.1", "Friends"],
            vec![vec!["Avery Lee", "Avery Lee", "Jules Moreno"]],
        );
        let suggestion = SuggestedMapping::from_pairs([
            ("Name", "respondent"),
            ("Name.1", "nominee"),
            ("Friends", "nominee"),
        ]);
        match validate(&table, &suggestion).unwrap_err() {
            MappingError::ConflictingRoles { column, .. } => assert_eq!(column, "Name"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_role_and_column() {
        let unknown_role = SuggestedMapping::from_pairs([
            ("Your name", "respondent"),
            ("Best friends", "probably friends"),
        ]);
        assert!(matches!(
            validate(&survey(), &unknown_role),
            Err(MappingError::UnknownRole { .. })
        ));

        let unknown_column = SuggestedMapping::from_pairs([
            ("Your name", "respondent"),
            ("Enemies", "nominee"),
        ]);
        assert_eq!(
            validate(&survey(), &unknown_column).unwrap_err(),
            MappingError::UnknownColumn("Enemies".to_string())
        );
    }

    #[test]
    fn rejects_table_without_rows() {
        let table = RawTable::from_records(
            ["Name", "Friends"],
            vec![vec!["", "null"]],
        );
        let suggestion =
            SuggestedMapping::from_pairs([("Name", "respondent"), ("Friends", "nominee")]);
        assert_eq!(
            validate(&table, &suggestion).unwrap_err(),
            MappingError::NoRows
        );
    }

    #[test]
    fn role_suffix_only_applies_to_nominees() {
        assert_eq!(Role::parse("weight:trust"), None);
        assert_eq!(Role::parse(" Strength "), Some(Role::Weight));
    }

    #[test]
    fn negative_questions_infer_avoidance() {
        assert_eq!(infer_relation("Who do you avoid?"), "avoidance");
        assert_eq!(infer_relation("Who do you dislike working with?"), "avoidance");
        assert_eq!(infer_relation("Who do you like to sit with?"), "preference");
    }
}
