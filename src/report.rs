use std::fmt::Write;

use crate::error::Diagnostic;
use crate::metrics::{AvoidanceRisk, AvoidanceWarning, ChoiceCount, WarningLevel};
use crate::models::StudentId;
use crate::result::{AnalysisResult, StudentRecord};

const TOP_STUDENTS: usize = 5;

fn top_by<F>(students: &[StudentRecord], score: F) -> Vec<&StudentRecord>
where
    F: Fn(&StudentRecord) -> f64,
{
    let mut ranked: Vec<&StudentRecord> = students.iter().collect();
    ranked.sort_by(|a, b| score(b).total_cmp(&score(a)).then(a.id.cmp(&b.id)));
    ranked.truncate(TOP_STUDENTS);
    ranked
}

fn density_note(density: f64) -> &'static str {
    if density > 0.3 {
        "Relationships are dense; most students are connected to many classmates."
    } else if density > 0.15 {
        "Relationship density is moderate."
    } else {
        "Relationship density is low; consider creating more chances for students to interact."
    }
}

fn names(result: &AnalysisResult, ids: &[StudentId]) -> String {
    ids.iter()
        .map(|id| result.name_of(*id))
        .collect::<Vec<_>>()
        .join(", ")
}

fn choice_list(result: &AnalysisResult, entries: &[ChoiceCount]) -> String {
    if entries.is_empty() {
        return "none".to_string();
    }
    entries
        .iter()
        .map(|entry| format!("{} ({})", result.name_of(entry.id), entry.count))
        .collect::<Vec<_>>()
        .join(", ")
}

fn level_label(level: WarningLevel) -> &'static str {
    match level {
        WarningLevel::Critical => "critical",
        WarningLevel::High => "high",
        WarningLevel::Moderate => "moderate",
        WarningLevel::Low => "low",
    }
}

fn describe_warning(result: &AnalysisResult, warning: &AvoidanceWarning) -> String {
    match warning {
        AvoidanceWarning::MutualAvoidance { first, second } => format!(
            "{} and {} avoid each other",
            result.name_of(*first),
            result.name_of(*second)
        ),
        AvoidanceWarning::AvoidanceTarget {
            student,
            avoided_by,
        } => format!(
            "{} is avoided by {} classmates: {}",
            result.name_of(*student),
            avoided_by.len(),
            names(result, avoided_by)
        ),
        AvoidanceWarning::AvoidanceInitiator { student, avoids } => format!(
            "{} avoids {} classmates: {}",
            result.name_of(*student),
            avoids.len(),
            names(result, avoids)
        ),
        AvoidanceWarning::IsolatedWithAvoidance {
            student,
            positive_in,
            avoidance_in,
        } => format!(
            "{} is avoided {} times and chosen only {} times",
            result.name_of(*student),
            avoidance_in,
            positive_in
        ),
        AvoidanceWarning::OneWayAvoidance { from, to } => format!(
            "{} avoids {}",
            result.name_of(*from),
            result.name_of(*to)
        ),
    }
}

pub fn build_report(label: Option<&str>, result: &AnalysisResult) -> String {
    let summary = result.summary();
    let students = result.students();
    let mut output = String::new();
    let label = label.unwrap_or("survey cohort");

    let _ = writeln!(output, "# Cohort Network Report");
    let _ = writeln!(output, "Generated for {} (run {})", label, result.run_id());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Network Overview");
    let _ = writeln!(
        output,
        "- {} students, {} directed connections, {} typed relationships",
        summary.node_count, summary.edge_count, summary.relationship_count
    );
    let _ = writeln!(
        output,
        "- density {:.3}, average degree {:.2}, reciprocity {:.2}",
        summary.density, summary.average_degree, summary.reciprocity
    );
    let _ = writeln!(
        output,
        "- {} communities (modularity {:.3}), {} weakly connected components",
        summary.community_count, summary.modularity, summary.weak_components
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", density_note(summary.density));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Relationship Types");
    for layer in result.relation_layers() {
        let _ = writeln!(
            output,
            "- {}: {} relationships (total weight {:.1})",
            layer.relation, layer.edge_count, layer.total_weight
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Central Students");
    let _ = writeln!(output, "### By degree");
    for student in top_by(students, |s| s.degree_centrality) {
        let _ = writeln!(
            output,
            "- {} ({}) {:.3}, {} in / {} out",
            student.display_name, student.id, student.degree_centrality, student.in_degree,
            student.out_degree
        );
    }
    let _ = writeln!(output, "### By betweenness");
    for student in top_by(students, |s| s.betweenness) {
        let _ = writeln!(
            output,
            "- {} ({}) {:.3}",
            student.display_name, student.id, student.betweenness
        );
    }
    let _ = writeln!(output, "### By closeness");
    for student in top_by(students, |s| s.closeness) {
        let _ = writeln!(
            output,
            "- {} ({}) {:.3}",
            student.display_name, student.id, student.closeness
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Chosen and Most Active");
    for layer in result.highlights() {
        let _ = writeln!(output, "### {}", layer.relation);
        let _ = writeln!(output, "- most chosen: {}", choice_list(result, &layer.most_chosen));
        let _ = writeln!(output, "- most active: {}", choice_list(result, &layer.most_active));
        if !layer.unchosen.is_empty() {
            let _ = writeln!(output, "- not chosen: {}", names(result, &layer.unchosen));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Communities");
    for community in result.communities() {
        let names: Vec<&str> = community
            .members
            .iter()
            .filter_map(|id| result.student(*id))
            .map(|student| student.display_name.as_str())
            .collect();
        let _ = writeln!(
            output,
            "- Group {} ({} members): {}",
            community.label + 1,
            community.member_count,
            names.join(", ")
        );
    }
    if summary.community_count > 4 {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "The class splits into many separate groups; activities that mix groups are recommended."
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Attention");
    let isolated: Vec<&StudentRecord> = result.isolated_students().collect();
    if isolated.is_empty() {
        let _ = writeln!(output, "No isolated students in this network.");
    } else {
        for student in isolated {
            let _ = writeln!(
                output,
                "- {} ({}) degree {}",
                student.display_name, student.id, student.degree
            );
        }
    }

    let avoidance = result.avoidance();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Avoidance Warnings");
    if avoidance.avoidance_edges == 0 {
        let _ = writeln!(output, "No avoidance nominations in this survey.");
    } else {
        let _ = writeln!(
            output,
            "- {} avoidance nominations involving {} students, overall risk {}",
            avoidance.avoidance_edges,
            avoidance.students_with_avoidance,
            match avoidance.risk {
                AvoidanceRisk::None => "none",
                AvoidanceRisk::Low => "low",
                AvoidanceRisk::Moderate => "moderate",
                AvoidanceRisk::High => "high",
            }
        );
        for warning in &avoidance.warnings {
            let _ = writeln!(
                output,
                "- [{}] {}",
                level_label(warning.level()),
                describe_warning(result, warning)
            );
        }
        let hidden = avoidance
            .one_way_total
            .saturating_sub(avoidance.count(WarningLevel::Low));
        if hidden > 0 {
            let _ = writeln!(output, "- {} more one-way avoidances not listed", hidden);
        }
    }

    let diagnostics = result.diagnostics();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Quality");
    let _ = writeln!(
        output,
        "- {} of {} rows skipped, {} self-nominations dropped, {} nominees unresolved",
        diagnostics.rows_skipped,
        diagnostics.rows_total,
        diagnostics.self_loops_dropped,
        diagnostics.unresolved_nominees
    );
    for entry in &diagnostics.entries {
        match entry {
            Diagnostic::RowSkipped { row, reason } => {
                let _ = writeln!(output, "- row {}: {}", row, reason);
            }
            Diagnostic::NameResolutionAmbiguous {
                raw,
                candidate,
                score,
            } => {
                let _ = writeln!(
                    output,
                    "- '{}' resembles '{}' ({:.2}) but was kept separate",
                    raw, candidate, score
                );
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisOptions;
    use crate::mapping::SuggestedMapping;
    use crate::metrics::AbortSignal;
    use crate::pipeline::analyze;
    use crate::table::RawTable;

    fn sample() -> AnalysisResult {
        let table = RawTable::from_records(
            ["Name", "Friend"],
            [
                ["Avery Lee", "Jules Moreno"],
                ["Jules Moreno", "Avery Lee"],
                ["Kiara Patel", ""],
                ["", "Avery Lee"],
            ],
        );
        let mapping = SuggestedMapping::from_pairs([("Name", "respondent"), ("Friend", "nominee")]);
        analyze(&table, &mapping, &AnalysisOptions::default(), &AbortSignal::new()).unwrap()
    }

    #[test]
    fn report_lists_sections_and_isolated_students() {
        let report = build_report(Some("Class 3-2"), &sample());
        assert!(report.starts_with("# Cohort Network Report"));
        assert!(report.contains("Generated for Class 3-2"));
        assert!(report.contains("## Communities"));
        assert!(report.contains("- Kiara Patel (S0002) degree 0"));
        assert!(report.contains("1 of 4 rows skipped"));
    }

    #[test]
    fn report_lists_avoidance_and_choices() {
        let table = RawTable::from_records(
            ["Name", "Friend", "Avoid"],
            [
                ["Avery Lee", "Jules Moreno", "Kiara Patel"],
                ["Jules Moreno", "Avery Lee", "Kiara Patel"],
                ["Kiara Patel", "", ""],
            ],
        );
        let mapping = SuggestedMapping::from_pairs([
            ("Name", "respondent"),
            ("Friend", "nominee:friendship"),
            ("Avoid", "nominee:avoidance"),
        ]);
        let result =
            analyze(&table, &mapping, &AnalysisOptions::default(), &AbortSignal::new()).unwrap();
        let report = build_report(None, &result);

        assert!(report.contains("## Avoidance Warnings"));
        assert!(report.contains("2 avoidance nominations involving 3 students, overall risk low"));
        assert!(report.contains("- [high] Kiara Patel is avoided by 2 classmates: Avery Lee, Jules Moreno"));
        assert!(report.contains("### friendship"));
        assert!(report.contains("- most chosen: Avery Lee (1), Jules Moreno (1)"));
        assert!(report.contains("- not chosen: Kiara Patel"));
        assert!(!report.contains("### avoidance"));
    }

    #[test]
    fn report_without_avoidance_says_so() {
        let report = build_report(None, &sample());
        assert!(report.contains("No avoidance nominations in this survey."));
    }

    #[test]
    fn top_by_breaks_ties_on_id() {
        let result = sample();
        let ranked = top_by(result.students(), |s| s.degree_centrality);
        let names: Vec<&str> = ranked.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, vec!["Avery Lee", "Jules Moreno", "Kiara Patel"]);
    }
}
