use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub type RawRow = BTreeMap<String, String>;

const PLACEHOLDER_VALUES: [&str; 5] = ["nan", "NaN", "null", "NULL", "None"];
const CELL_JOIN: &str = ", ";

/// Tabular survey input as handed over by the upload layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self { headers, rows }
    }

    /// Builds a table from positional records, pairing each cell with its header.
    pub fn from_records<H, R, C>(headers: H, records: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let rows = records
            .into_iter()
            .map(|record| {
                headers
                    .iter()
                    .cloned()
                    .zip(record.into_iter().map(Into::into))
                    .collect::<RawRow>()
            })
            .collect();
        Self { headers, rows }
    }

    /// Cleans headers and cells and drops rows with no content.
    ///
    /// Header normalization trims, collapses inner whitespace, and strips the
    /// `.1`, `.2` suffixes spreadsheet exports append to repeated questions.
    /// Cells of headers that collapse onto the same name are joined with
    /// `", "` in header order, skipping empty and repeated values, so a
    /// question asked over several columns keeps every answer.
    pub fn normalized(&self) -> RawTable {
        let mut headers: Vec<String> = Vec::new();
        for header in &self.headers {
            let clean = normalize_header(header);
            if !headers.contains(&clean) {
                headers.push(clean);
            }
        }

        let rows = self
            .rows
            .iter()
            .filter_map(|row| {
                let extra = row.keys().filter(|key| !self.headers.contains(key));
                let mut clean_row = RawRow::new();
                for key in self.headers.iter().chain(extra) {
                    let Some(value) = row.get(key) else {
                        continue;
                    };
                    let value = normalize_cell(value);
                    let entry = clean_row.entry(normalize_header(key)).or_default();
                    if value.is_empty() || entry.split(CELL_JOIN).any(|part| part == value) {
                        continue;
                    }
                    if !entry.is_empty() {
                        entry.push_str(CELL_JOIN);
                    }
                    entry.push_str(&value);
                }
                clean_row
                    .values()
                    .any(|value| !value.is_empty())
                    .then_some(clean_row)
            })
            .collect();

        RawTable { headers, rows }
    }
}

pub fn normalize_header(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.rsplit_once('.') {
        Some((base, suffix))
            if !base.is_empty()
                && !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_digit()) =>
        {
            base.to_string()
        }
        _ => collapsed,
    }
}

fn normalize_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    if PLACEHOLDER_VALUES.contains(&trimmed) {
        String::new()
    } else {
        trimmed.to_string()
    }
}

pub fn load_csv(csv_path: &Path) -> anyhow::Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    // Identical raw headers get `.1`, `.2` suffixes so no column is lost
    // before normalization folds them back together.
    let mut headers: Vec<String> = Vec::new();
    for header in reader.headers().context("missing CSV header row")?.iter() {
        let base = header.trim_start_matches('\u{feff}').to_string();
        let mut name = base.clone();
        let mut repeat = 0;
        while headers.contains(&name) {
            repeat += 1;
            name = format!("{base}.{repeat}");
        }
        headers.push(name);
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| (header.clone(), record.get(idx).unwrap_or("").to_string()))
            .collect();
        rows.push(row);
    }

    tracing::info!(
        path = %csv_path.display(),
        columns = headers.len(),
        rows = rows.len(),
        "loaded survey table"
    );
    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn header_normalization_strips_duplicate_suffix() {
        assert_eq!(normalize_header("  Best   friend.1 "), "Best friend");
        assert_eq!(normalize_header("Name"), "Name");
        assert_eq!(normalize_header(".5"), ".5");
    }

    #[test]
    fn normalized_drops_blank_rows_and_placeholders() {
        let table = RawTable::from_records(
            ["Name", "Friends"],
            vec![vec!["Avery Lee", "Jules"], vec!["  ", "nan"], vec!["Kiara", "NULL"]],
        );
        let clean = table.normalized();
        assert_eq!(clean.rows.len(), 2);
        assert_eq!(clean.rows[1]["Friends"], "");
    }

    #[test]
    fn repeated_question_columns_keep_every_answer() {
        let table = RawTable::from_records(
            ["Name", "Friend", "Friend.1", "Friend.2"],
            vec![
                vec!["Avery Lee", "Jules Moreno", "Kiara Patel", "Theo Grant"],
                vec!["Jules Moreno", "Avery Lee", "", "Avery Lee"],
            ],
        );
        let clean = table.normalized();
        assert_eq!(clean.headers, vec!["Name", "Friend"]);
        assert_eq!(clean.rows[0]["Friend"], "Jules Moreno, Kiara Patel, Theo Grant");
        assert_eq!(clean.rows[1]["Friend"], "Avery Lee");
    }

    #[test]
    fn load_csv_suffixes_identical_headers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Name,Friend,Friend").unwrap();
        writeln!(file, "Avery Lee,Jules Moreno,Kiara Patel").unwrap();

        let table = load_csv(file.path()).unwrap();
        assert_eq!(table.headers, vec!["Name", "Friend", "Friend.1"]);
        assert_eq!(
            table.normalized().rows[0]["Friend"],
            "Jules Moreno, Kiara Patel"
        );
    }

    #[test]
    fn load_csv_reads_headers_and_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Name,Friends").unwrap();
        writeln!(file, "Avery Lee,\"Jules Moreno, Kiara Patel\"").unwrap();
        writeln!(file, "Jules Moreno,Avery Lee").unwrap();

        let table = load_csv(file.path()).unwrap();
        assert_eq!(table.headers, vec!["Name", "Friends"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["Friends"], "Jules Moreno, Kiara Patel");
    }
}
