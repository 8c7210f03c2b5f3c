use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::models::StudentId;
use crate::result::AnalysisResult;

#[derive(Debug, Serialize)]
struct NodeRow<'a> {
    id: StudentId,
    display_name: &'a str,
    aliases: String,
    in_degree: usize,
    out_degree: usize,
    degree: usize,
    weighted_in: f64,
    weighted_out: f64,
    degree_centrality: f64,
    closeness: f64,
    betweenness: f64,
    community: usize,
    isolated: bool,
}

#[derive(Debug, Serialize)]
struct EdgeRow<'a> {
    from: StudentId,
    from_name: &'a str,
    to: StudentId,
    to_name: &'a str,
    relation: &'a str,
    weight: f64,
    mentions: u32,
    source_row: usize,
}

/// One row per student, ascending by id.
pub fn write_nodes_csv<W: Write>(result: &AnalysisResult, writer: W) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for student in result.students() {
        csv.serialize(NodeRow {
            id: student.id,
            display_name: &student.display_name,
            aliases: student.aliases.join("; "),
            in_degree: student.in_degree,
            out_degree: student.out_degree,
            degree: student.degree,
            weighted_in: student.weighted_in,
            weighted_out: student.weighted_out,
            degree_centrality: student.degree_centrality,
            closeness: student.closeness,
            betweenness: student.betweenness,
            community: student.community,
            isolated: student.isolated,
        })?;
    }
    csv.flush()?;
    Ok(())
}

/// One row per typed relationship, ordered by (from, to, relation).
pub fn write_edges_csv<W: Write>(result: &AnalysisResult, writer: W) -> anyhow::Result<()> {
    let name = |id: StudentId| {
        result
            .student(id)
            .map(|student| student.display_name.as_str())
            .unwrap_or("")
    };
    let mut csv = csv::Writer::from_writer(writer);
    for edge in result.edges() {
        csv.serialize(EdgeRow {
            from: edge.from,
            from_name: name(edge.from),
            to: edge.to,
            to_name: name(edge.to),
            relation: &edge.relation,
            weight: edge.weight,
            mentions: edge.mentions,
            source_row: edge.source_row,
        })?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(result: &AnalysisResult, mut writer: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut writer, result)?;
    writeln!(writer)?;
    Ok(())
}

/// Writes `nodes.csv`, `edges.csv`, and `result.json` into `dir`.
pub fn export_all(result: &AnalysisResult, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let nodes = dir.join("nodes.csv");
    let edges = dir.join("edges.csv");
    let json = dir.join("result.json");

    write_nodes_csv(result, create(&nodes)?)?;
    write_edges_csv(result, create(&edges)?)?;
    write_json(result, create(&json)?)?;

    tracing::info!(dir = %dir.display(), run_id = %result.run_id(), "analysis exported");
    Ok(vec![nodes, edges, json])
}

fn create(path: &Path) -> anyhow::Result<File> {
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
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
            ["Student", "Friends"],
            [
                ["Avery Lee", "Jules Moreno, Kiara Patel"],
                ["Jules Moreno", "Avery Lee"],
            ],
        );
        let mapping =
            SuggestedMapping::from_pairs([("Student", "respondent"), ("Friends", "nominee")]);
        analyze(&table, &mapping, &AnalysisOptions::default(), &AbortSignal::new()).unwrap()
    }

    #[test]
    fn nodes_csv_has_stable_header_and_one_row_per_student() {
        let mut buffer = Vec::new();
        write_nodes_csv(&sample(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,display_name,aliases,in_degree,out_degree,degree,weighted_in,weighted_out,\
             degree_centrality,closeness,betweenness,community,isolated"
        );
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn edges_csv_names_both_endpoints() {
        let mut buffer = Vec::new();
        write_edges_csv(&sample(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("from,from_name,to,to_name,relation,weight,mentions,source_row"));
        assert!(text.contains("Avery Lee"));
        assert!(text.contains("Kiara Patel"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn export_all_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample();
        let paths = export_all(&result, &dir.path().join("out")).unwrap();
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert!(path.exists());
        }
        let json = std::fs::read_to_string(&paths[2]).unwrap();
        assert_eq!(AnalysisResult::from_json(&json).unwrap(), result);
    }
}
