use std::collections::{BTreeMap, BTreeSet};

use crate::config::{AnalysisOptions, WeightMode};
use crate::error::Diagnostics;
use crate::mapping::MappingDescriptor;
use crate::models::{RelationshipEdge, Student, StudentId};
use crate::resolver::NameResolver;
use crate::table::{RawRow, RawTable};

const NAME_SEPARATORS: [char; 4] = [',', ';', '/', '\n'];

/// Canonical students and aggregated edges for one dataset.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Students referenced by at least one kept edge, or respondents who
    /// answered without naming anyone. Ordered by id.
    pub students: Vec<Student>,
    /// Ordered by (from, to, relation).
    pub edges: Vec<RelationshipEdge>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug)]
struct EdgeAccumulator {
    weight: f64,
    mentions: u32,
    source_row: usize,
}

pub fn split_names(cell: &str) -> impl Iterator<Item = &str> {
    cell.split(NAME_SEPARATORS)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn row_weight(row: &RawRow, column: Option<&str>) -> Result<f64, String> {
    let Some(column) = column else {
        return Ok(1.0);
    };
    let raw = row.get(column).map(String::as_str).unwrap_or("");
    if raw.is_empty() {
        return Ok(1.0);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        Ok(value) => Err(format!("weight '{column}' must be positive, got {value}")),
        Err(_) => Err(format!("weight '{column}' is not a number: '{raw}'")),
    }
}

/// Walks rows in input order and turns every nomination into an edge.
///
/// Rows without a usable respondent or with a malformed weight are skipped and
/// counted; the rest of the batch still goes through.
pub fn extract(
    table: &RawTable,
    descriptor: &MappingDescriptor,
    options: &AnalysisOptions,
) -> Extraction {
    let mut resolver = NameResolver::new(options);
    let mut diagnostics = Diagnostics::default();
    let mut present: BTreeSet<StudentId> = BTreeSet::new();
    let mut edges: BTreeMap<(StudentId, StudentId, String), EdgeAccumulator> = BTreeMap::new();

    for (row_idx, row) in table.rows.iter().enumerate() {
        diagnostics.rows_total += 1;

        let respondent = row
            .get(descriptor.respondent())
            .map(String::as_str)
            .unwrap_or("");
        if respondent.is_empty() {
            diagnostics.skip_row(row_idx, "missing respondent name");
            continue;
        }

        let weight = match row_weight(row, descriptor.weight()) {
            Ok(weight) => weight,
            Err(reason) => {
                diagnostics.skip_row(row_idx, reason);
                continue;
            }
        };

        let Some(from) = resolver.resolve(respondent, &mut diagnostics) else {
            diagnostics.skip_row(row_idx, format!("respondent '{respondent}' has no usable name"));
            continue;
        };

        let mut named_anyone = false;
        for nominee_column in descriptor.nominees() {
            let cell = row
                .get(&nominee_column.column)
                .map(String::as_str)
                .unwrap_or("");

            for name in split_names(cell) {
                let Some(to) = resolver.resolve(name, &mut diagnostics) else {
                    diagnostics.unresolved_nominees += 1;
                    continue;
                };
                named_anyone = true;

                if to == from && !options.allow_self_loops {
                    diagnostics.self_loops_dropped += 1;
                    continue;
                }

                let entry = edges
                    .entry((from, to, nominee_column.relation.clone()))
                    .or_insert(EdgeAccumulator {
                        weight: 0.0,
                        mentions: 0,
                        source_row: row_idx,
                    });
                entry.mentions += 1;
                entry.weight = match options.weight_mode {
                    WeightMode::Binary => 1.0,
                    WeightMode::Frequency => entry.weight + weight,
                };
                present.insert(from);
                present.insert(to);
            }
        }

        // A respondent who named nobody is still part of the class.
        if !named_anyone {
            present.insert(from);
        }
    }

    let students: Vec<Student> = resolver
        .into_students()
        .into_iter()
        .filter(|student| present.contains(&student.id))
        .collect();

    let edges: Vec<RelationshipEdge> = edges
        .into_iter()
        .map(|((from, to, relation), acc)| RelationshipEdge {
            from,
            to,
            weight: acc.weight,
            relation,
            mentions: acc.mentions,
            source_row: acc.source_row,
        })
        .collect();

    tracing::info!(
        rows = diagnostics.rows_total,
        skipped = diagnostics.rows_skipped,
        students = students.len(),
        edges = edges.len(),
        self_loops_dropped = diagnostics.self_loops_dropped,
        "relationships extracted"
    );

    Extraction {
        students,
        edges,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{validate, SuggestedMapping};

    fn run(table: RawTable, options: &AnalysisOptions) -> Extraction {
        let suggestion = SuggestedMapping::from_pairs([
            ("Name", "respondent"),
            ("Friends", "nominee"),
            ("Trust", "nominee"),
        ]);
        let validated = validate(&table, &suggestion).unwrap();
        extract(&validated.table, &validated.descriptor, options)
    }

    fn names(extraction: &Extraction) -> Vec<&str> {
        extraction
            .students
            .iter()
            .map(|s| s.display_name.as_str())
            .collect()
    }

    #[test]
    fn splits_multi_name_cells() {
        let got: Vec<&str> = split_names(" Avery Lee, Jules;Kiara / \nTheo ").collect();
        assert_eq!(got, vec!["Avery Lee", "Jules", "Kiara", "Theo"]);
    }

    #[test]
    fn self_nomination_is_dropped_and_student_left_out() {
        let table = RawTable::from_records(
            ["Name", "Friends", "Trust"],
            vec![
                vec!["Kim Min-jun", "Lee Seo-yun", ""],
                vec!["Lee Seo-yun", "Kim Min-jun", ""],
                vec!["Park Ji-ho", "Park Ji-ho", ""],
            ],
        );
        let extraction = run(table, &AnalysisOptions::default());
        assert_eq!(names(&extraction), vec!["Kim Min-jun", "Lee Seo-yun"]);
        assert_eq!(extraction.edges.len(), 2);
        assert_eq!(extraction.diagnostics.self_loops_dropped, 1);
    }

    #[test]
    fn self_loops_kept_when_enabled() {
        let table = RawTable::from_records(
            ["Name", "Friends", "Trust"],
            vec![vec!["Park Ji-ho", "Park Ji-ho", ""]],
        );
        let options = AnalysisOptions {
            allow_self_loops: true,
            ..AnalysisOptions::default()
        };
        let extraction = run(table, &options);
        assert_eq!(extraction.edges.len(), 1);
        assert_eq!(extraction.edges[0].from, extraction.edges[0].to);
    }

    #[test]
    fn blank_response_keeps_respondent_as_student() {
        let table = RawTable::from_records(
            ["Name", "Friends", "Trust"],
            vec![vec!["Avery Lee", "Jules Moreno", ""], vec!["Kiara Patel", "", ""]],
        );
        let extraction = run(table, &AnalysisOptions::default());
        assert_eq!(
            names(&extraction),
            vec!["Avery Lee", "Jules Moreno", "Kiara Patel"]
        );
        assert_eq!(extraction.edges.len(), 1);
    }

    #[test]
    fn rows_without_respondent_are_skipped_not_fatal() {
        let table = RawTable::from_records(
            ["Name", "Friends", "Trust"],
            vec![vec!["", "Jules Moreno", ""], vec!["Avery Lee", "Jules Moreno", ""]],
        );
        let extraction = run(table, &AnalysisOptions::default());
        assert_eq!(extraction.diagnostics.rows_total, 2);
        assert_eq!(extraction.diagnostics.rows_skipped, 1);
        assert_eq!(extraction.edges.len(), 1);
    }

    #[test]
    fn repeated_nominations_follow_weight_mode() {
        let rows = vec![
            vec!["Avery Lee", "Jules Moreno, Jules Moreno", "Jules Moreno"],
            vec!["Avery Lee", "Jules Moreno", ""],
        ];
        let table = RawTable::from_records(["Name", "Friends", "Trust"], rows);

        let frequency = run(table.clone(), &AnalysisOptions::default());
        let friendship = frequency
            .edges
            .iter()
            .find(|e| e.relation == "friendship")
            .unwrap();
        assert_eq!(friendship.weight, 3.0);
        assert_eq!(friendship.mentions, 3);
        assert_eq!(friendship.source_row, 0);
        assert_eq!(frequency.edges.len(), 2);

        let binary = run(
            table,
            &AnalysisOptions {
                weight_mode: WeightMode::Binary,
                ..AnalysisOptions::default()
            },
        );
        assert!(binary.edges.iter().all(|e| e.weight == 1.0));
    }

    #[test]
    fn weight_column_scales_nominations() {
        let table = RawTable::from_records(
            ["Name", "Friends", "Closeness"],
            vec![
                vec!["Avery Lee", "Jules Moreno", "2.5"],
                vec!["Kiara Patel", "Jules Moreno", "-1"],
                vec!["Theo Grant", "Avery Lee", "lots"],
            ],
        );
        let suggestion = SuggestedMapping::from_pairs([
            ("Name", "respondent"),
            ("Friends", "nominee"),
            ("Closeness", "weight"),
        ]);
        let validated = validate(&table, &suggestion).unwrap();
        let extraction = extract(
            &validated.table,
            &validated.descriptor,
            &AnalysisOptions::default(),
        );
        assert_eq!(extraction.edges.len(), 1);
        assert_eq!(extraction.edges[0].weight, 2.5);
        assert_eq!(extraction.diagnostics.rows_skipped, 2);
    }
}
