//! Warnings derived from avoidance-type nominations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::graph::Adjacency;
use crate::models::StudentId;

/// Avoided by, or avoiding, at least this many classmates.
pub const GROUP_AVOIDANCE_THRESHOLD: usize = 2;
/// Avoided students with at most this many positive nominations are flagged.
pub const LOW_POSITIVE_IN: usize = 2;
/// One-way warnings kept per run; the rest are only counted.
pub const ONE_WAY_WARNING_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    Critical,
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvoidanceRisk {
    None,
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvoidanceWarning {
    MutualAvoidance {
        first: StudentId,
        second: StudentId,
    },
    AvoidanceTarget {
        student: StudentId,
        avoided_by: Vec<StudentId>,
    },
    AvoidanceInitiator {
        student: StudentId,
        avoids: Vec<StudentId>,
    },
    IsolatedWithAvoidance {
        student: StudentId,
        positive_in: usize,
        avoidance_in: usize,
    },
    OneWayAvoidance {
        from: StudentId,
        to: StudentId,
    },
}

impl AvoidanceWarning {
    pub fn level(&self) -> WarningLevel {
        match self {
            AvoidanceWarning::MutualAvoidance { .. } => WarningLevel::Critical,
            AvoidanceWarning::AvoidanceTarget { .. }
            | AvoidanceWarning::IsolatedWithAvoidance { .. } => WarningLevel::High,
            AvoidanceWarning::AvoidanceInitiator { .. } => WarningLevel::Moderate,
            AvoidanceWarning::OneWayAvoidance { .. } => WarningLevel::Low,
        }
    }

    pub fn students(&self) -> Vec<StudentId> {
        match self {
            AvoidanceWarning::MutualAvoidance { first, second } => vec![*first, *second],
            AvoidanceWarning::OneWayAvoidance { from, to } => vec![*from, *to],
            AvoidanceWarning::AvoidanceTarget { student, .. }
            | AvoidanceWarning::AvoidanceInitiator { student, .. }
            | AvoidanceWarning::IsolatedWithAvoidance { student, .. } => vec![*student],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvoidanceReport {
    /// Most severe first; equal levels keep detection order.
    pub warnings: Vec<AvoidanceWarning>,
    pub avoidance_edges: usize,
    pub students_with_avoidance: usize,
    /// One-way avoidances not covered by any other warning, including those
    /// past the warning limit.
    pub one_way_total: usize,
    pub risk: AvoidanceRisk,
}

impl AvoidanceReport {
    pub fn count(&self, level: WarningLevel) -> usize {
        self.warnings.iter().filter(|w| w.level() == level).count()
    }

    pub fn requires_attention(&self) -> bool {
        self.count(WarningLevel::Critical) + self.count(WarningLevel::High) > 0
    }
}

fn others(arcs: &BTreeMap<usize, f64>, node: usize, ids: &[StudentId]) -> Vec<StudentId> {
    arcs.keys()
        .filter(|&&other| other != node)
        .map(|&other| ids[other])
        .collect()
}

pub(crate) fn analyze_avoidance(
    avoidance: &Adjacency,
    positive: &Adjacency,
    ids: &[StudentId],
) -> AvoidanceReport {
    let n = avoidance.len();
    let mut warnings = Vec::new();

    for a in 0..n {
        for &b in avoidance.outgoing[a].keys() {
            if a < b && avoidance.outgoing[b].contains_key(&a) {
                warnings.push(AvoidanceWarning::MutualAvoidance {
                    first: ids[a],
                    second: ids[b],
                });
            }
        }
    }
    for node in 0..n {
        if avoidance.in_degree(node) >= GROUP_AVOIDANCE_THRESHOLD {
            warnings.push(AvoidanceWarning::AvoidanceTarget {
                student: ids[node],
                avoided_by: others(&avoidance.incoming[node], node, ids),
            });
        }
    }
    for node in 0..n {
        if avoidance.out_degree(node) >= GROUP_AVOIDANCE_THRESHOLD {
            warnings.push(AvoidanceWarning::AvoidanceInitiator {
                student: ids[node],
                avoids: others(&avoidance.outgoing[node], node, ids),
            });
        }
    }
    for node in 0..n {
        let avoidance_in = avoidance.in_degree(node);
        let positive_in = positive.in_degree(node);
        if avoidance_in > 0 && positive_in <= LOW_POSITIVE_IN {
            warnings.push(AvoidanceWarning::IsolatedWithAvoidance {
                student: ids[node],
                positive_in,
                avoidance_in,
            });
        }
    }

    let warned: BTreeSet<StudentId> = warnings.iter().flat_map(|w| w.students()).collect();
    let mut one_way_total = 0;
    for a in 0..n {
        for &b in avoidance.outgoing[a].keys() {
            if a == b || avoidance.outgoing[b].contains_key(&a) {
                continue;
            }
            if warned.contains(&ids[a]) || warned.contains(&ids[b]) {
                continue;
            }
            one_way_total += 1;
            if one_way_total <= ONE_WAY_WARNING_LIMIT {
                warnings.push(AvoidanceWarning::OneWayAvoidance {
                    from: ids[a],
                    to: ids[b],
                });
            }
        }
    }

    warnings.sort_by_key(AvoidanceWarning::level);

    let avoidance_edges = (0..n).map(|node| avoidance.out_degree(node)).sum();
    let students_with_avoidance = (0..n).filter(|&node| avoidance.degree(node) > 0).count();
    let mut report = AvoidanceReport {
        warnings,
        avoidance_edges,
        students_with_avoidance,
        one_way_total,
        risk: AvoidanceRisk::None,
    };
    let critical = report.count(WarningLevel::Critical);
    let high = report.count(WarningLevel::High);
    report.risk = if critical >= 2 {
        AvoidanceRisk::High
    } else if critical >= 1 || high >= 3 {
        AvoidanceRisk::Moderate
    } else if high >= 1 {
        AvoidanceRisk::Low
    } else {
        AvoidanceRisk::None
    };

    if report.requires_attention() {
        tracing::warn!(
            warnings = report.warnings.len(),
            critical,
            high,
            "avoidance patterns need attention"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{edge, student};
    use crate::graph::SocialGraph;

    fn report(n: u32, positive: &[(u32, u32)], avoid: &[(u32, u32)]) -> AvoidanceReport {
        let students = (0..n).map(|id| student(id, &format!("Student {id}"))).collect();
        let edges = positive
            .iter()
            .map(|&(from, to)| edge(from, to, "friendship", 1.0))
            .chain(avoid.iter().map(|&(from, to)| edge(from, to, "avoidance", 1.0)))
            .collect();
        let graph = SocialGraph::build(students, edges).unwrap();
        analyze_avoidance(
            &graph.avoidance_adjacency(),
            &graph.adjacency(),
            &graph.node_ids(),
        )
    }

    #[test]
    fn mutual_avoidance_is_critical() {
        let report = report(3, &[(0, 2), (2, 0)], &[(0, 1), (1, 0)]);
        assert_eq!(
            report.warnings[0],
            AvoidanceWarning::MutualAvoidance {
                first: StudentId(0),
                second: StudentId(1),
            }
        );
        assert_eq!(report.count(WarningLevel::Critical), 1);
        assert_eq!(report.risk, AvoidanceRisk::Moderate);
    }

    #[test]
    fn avoided_by_two_is_a_target_and_isolated() {
        let report = report(3, &[(0, 1), (1, 0)], &[(0, 2), (1, 2)]);
        assert!(report.warnings.contains(&AvoidanceWarning::AvoidanceTarget {
            student: StudentId(2),
            avoided_by: vec![StudentId(0), StudentId(1)],
        }));
        assert!(report.warnings.contains(&AvoidanceWarning::IsolatedWithAvoidance {
            student: StudentId(2),
            positive_in: 0,
            avoidance_in: 2,
        }));
        assert_eq!(report.one_way_total, 0);
        assert_eq!(report.students_with_avoidance, 3);
        assert_eq!(report.risk, AvoidanceRisk::Low);
        assert!(report.requires_attention());
    }

    #[test]
    fn well_liked_student_avoided_once_is_only_one_way() {
        let report = report(
            5,
            &[(1, 0), (2, 0), (3, 0), (0, 1)],
            &[(4, 0)],
        );
        assert_eq!(
            report.warnings,
            vec![AvoidanceWarning::OneWayAvoidance {
                from: StudentId(4),
                to: StudentId(0),
            }]
        );
        assert!(!report.requires_attention());
        assert_eq!(report.risk, AvoidanceRisk::None);
    }

    #[test]
    fn one_way_warnings_are_capped() {
        let avoid: Vec<(u32, u32)> = (0..7).map(|i| (2 * i, 2 * i + 1)).collect();
        let positive: Vec<(u32, u32)> = (0..7)
            .flat_map(|i| [(14, 2 * i + 1), (15, 2 * i + 1), (16, 2 * i + 1)])
            .collect();
        let report = report(17, &positive, &avoid);
        assert_eq!(report.one_way_total, 7);
        assert_eq!(report.warnings.len(), ONE_WAY_WARNING_LIMIT);
        assert_eq!(report.avoidance_edges, 7);
    }
}
