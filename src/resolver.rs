use std::collections::{BTreeMap, BTreeSet};

use crate::config::AnalysisOptions;
use crate::error::Diagnostics;
use crate::models::{Student, StudentId};

/// Characters dropped when comparing names, so "Min-jun" and "Minjun" share a key.
const IGNORED_PUNCTUATION: [char; 6] = ['-', '.', '_', '\'', '·', ','];

#[derive(Debug)]
struct Entry {
    student: Student,
    key: String,
    seen: u32,
}

/// Maps free-text names onto canonical students.
///
/// Resolution is order dependent: the first spelling of a person becomes the
/// display name and later spellings are compared against it. Feed rows in
/// input order to get reproducible identities.
#[derive(Debug)]
pub struct NameResolver {
    similarity_threshold: f64,
    ambiguity_margin: f64,
    min_fuzzy_length: usize,
    entries: Vec<Entry>,
    by_key: BTreeMap<String, StudentId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    id: StudentId,
    score: f64,
    seen: u32,
}

impl NameResolver {
    pub fn new(options: &AnalysisOptions) -> Self {
        Self {
            similarity_threshold: options.similarity_threshold,
            ambiguity_margin: options.ambiguity_margin,
            min_fuzzy_length: options.min_fuzzy_length,
            entries: Vec::new(),
            by_key: BTreeMap::new(),
        }
    }

    /// Returns the canonical student for `raw`, creating one when nothing matches.
    ///
    /// Blank names resolve to `None`.
    pub fn resolve(&mut self, raw: &str, diagnostics: &mut Diagnostics) -> Option<StudentId> {
        let display = collapse_whitespace(raw);
        let key = match_key(&display);
        if key.is_empty() {
            return None;
        }

        if let Some(&id) = self.by_key.get(&key) {
            self.record_alias(id, &display);
            return Some(id);
        }

        if let Some(candidate) = self.best_candidate(&key) {
            if candidate.score >= self.similarity_threshold {
                let raw_display = display.as_str();
                tracing::debug!(
                    raw = %raw_display,
                    student = %candidate.id,
                    score = candidate.score,
                    "merged name into existing student"
                );
                self.by_key.insert(key, candidate.id);
                self.record_alias(candidate.id, &display);
                return Some(candidate.id);
            }
            if candidate.score >= self.similarity_threshold - self.ambiguity_margin {
                let existing = &self.entries[candidate.id.0 as usize].student.display_name;
                diagnostics.ambiguous_name(&display, existing, candidate.score);
            }
        }

        let id = StudentId(self.entries.len() as u32);
        self.entries.push(Entry {
            student: Student {
                id,
                display_name: display.clone(),
                aliases: BTreeSet::from([display]),
            },
            key: key.clone(),
            seen: 1,
        });
        self.by_key.insert(key, id);
        Some(id)
    }

    pub fn student(&self, id: StudentId) -> Option<&Student> {
        self.entries.get(id.0 as usize).map(|entry| &entry.student)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_students(self) -> Vec<Student> {
        self.entries.into_iter().map(|entry| entry.student).collect()
    }

    fn record_alias(&mut self, id: StudentId, display: &str) {
        let entry = &mut self.entries[id.0 as usize];
        entry.seen += 1;
        if !entry.student.aliases.contains(display) {
            entry.student.aliases.insert(display.to_string());
        }
    }

    // Ties on score go to the most frequently seen student, then the lowest id.
    fn best_candidate(&self, key: &str) -> Option<Candidate> {
        if key.chars().count() < self.min_fuzzy_length {
            return None;
        }

        let mut best: Option<Candidate> = None;
        for entry in &self.entries {
            if entry.key.chars().count() < self.min_fuzzy_length {
                continue;
            }
            let candidate = Candidate {
                id: entry.student.id,
                score: similarity(key, &entry.key),
                seen: entry.seen,
            };
            let better = match best {
                None => true,
                Some(current) => {
                    candidate.score > current.score
                        || (candidate.score == current.score && candidate.seen > current.seen)
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-folded, whitespace- and punctuation-free comparison key.
pub fn match_key(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && !IGNORED_PUNCTUATION.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized edit similarity in `[0, 1]`; 1 means identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> NameResolver {
        NameResolver::new(&AnalysisOptions::default())
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("김민준", "김민주"), 1);
    }

    #[test]
    fn spacing_case_and_hyphen_variants_merge() {
        let mut resolver = resolver();
        let mut diagnostics = Diagnostics::default();
        let a = resolver.resolve("Kim Minjun", &mut diagnostics).unwrap();
        let b = resolver.resolve("Kim Min-jun", &mut diagnostics).unwrap();
        let c = resolver.resolve("kim  minjun", &mut diagnostics).unwrap();

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(resolver.len(), 1);
        let student = resolver.student(a).unwrap();
        assert_eq!(student.display_name, "Kim Minjun");
        assert_eq!(student.aliases.len(), 3);
    }

    #[test]
    fn different_given_names_stay_distinct() {
        let mut resolver = resolver();
        let mut diagnostics = Diagnostics::default();
        let minjun = resolver.resolve("Kim Minjun", &mut diagnostics).unwrap();
        let minsu = resolver.resolve("Kim Minsu", &mut diagnostics).unwrap();

        assert_ne!(minjun, minsu);
        assert_eq!(diagnostics.ambiguous_count(), 1);
    }

    #[test]
    fn typo_above_threshold_merges() {
        let mut resolver = resolver();
        let mut diagnostics = Diagnostics::default();
        let a = resolver.resolve("Jules Moreno", &mut diagnostics).unwrap();
        let b = resolver.resolve("Jules Morenno", &mut diagnostics).unwrap();
        assert_eq!(a, b);
        assert!(diagnostics.entries.is_empty());
    }

    #[test]
    fn short_names_require_exact_match() {
        let mut resolver = resolver();
        let mut diagnostics = Diagnostics::default();
        let a = resolver.resolve("김민준", &mut diagnostics).unwrap();
        let b = resolver.resolve("김민주", &mut diagnostics).unwrap();
        let c = resolver.resolve(" 김민준 ", &mut diagnostics).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert!(diagnostics.entries.is_empty());
    }

    #[test]
    fn ties_prefer_most_frequently_seen_student() {
        let mut resolver = resolver();
        let mut diagnostics = Diagnostics::default();
        let first = resolver.resolve("Avery Leeab", &mut diagnostics).unwrap();
        let second = resolver.resolve("Avery Leeba", &mut diagnostics).unwrap();
        resolver.resolve("Avery Leeba", &mut diagnostics);

        // One substitution away from both existing keys.
        let merged = resolver.resolve("Avery Leeaa", &mut diagnostics).unwrap();
        assert_ne!(first, second);
        assert_eq!(merged, second);
    }

    #[test]
    fn blank_names_do_not_resolve() {
        let mut resolver = resolver();
        let mut diagnostics = Diagnostics::default();
        assert_eq!(resolver.resolve("   ", &mut diagnostics), None);
        assert_eq!(resolver.resolve("-", &mut diagnostics), None);
        assert!(resolver.is_empty());
    }
}
