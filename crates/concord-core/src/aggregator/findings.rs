//! Cross-backend merge of categorical findings.

use std::collections::{BTreeSet, HashMap};

use crate::types::{BackendResponse, Finding, MergedFinding, Severity};

/// Findings that share a lower-cased category.
struct FindingGroup<'a> {
    members: Vec<&'a Finding>,
    /// Indices of the responses that reported this category
    reporters: BTreeSet<usize>,
}

/// Merge findings from all responses.
///
/// Groups are discovered in input order (response order, then finding order
/// within a response) and the output is stably sorted by agreement, highest
/// first, so equal agreement keeps discovery order.
pub fn merge_findings(responses: &[BackendResponse]) -> Vec<MergedFinding> {
    if responses.is_empty() {
        return Vec::new();
    }

    let mut groups: Vec<FindingGroup<'_>> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (index, response) in responses.iter().enumerate() {
        for finding in &response.findings {
            let slot = *by_key.entry(finding.key()).or_insert_with(|| {
                groups.push(FindingGroup {
                    members: Vec::new(),
                    reporters: BTreeSet::new(),
                });
                groups.len() - 1
            });
            groups[slot].members.push(finding);
            groups[slot].reporters.insert(index);
        }
    }

    let contributors = responses.len() as f64;
    let mut merged: Vec<MergedFinding> = groups
        .into_iter()
        .map(|group| merge_group(group, contributors))
        .collect();

    merged.sort_by(|a, b| b.agreement_score.total_cmp(&a.agreement_score));
    merged
}

fn merge_group(group: FindingGroup<'_>, contributors: f64) -> MergedFinding {
    let first = group.members[0];
    let confidence =
        group.members.iter().map(|f| f.confidence).sum::<f64>() / group.members.len() as f64;

    MergedFinding {
        finding: Finding {
            category: first.category.clone(),
            severity: majority_severity(&group.members),
            confidence,
            location: first.location.clone(),
            description: first.description.clone(),
        },
        agreement_score: (group.reporters.len() as f64 / contributors).min(1.0),
    }
}

/// Majority vote; ties go to the value earliest in [`Severity::ALL`].
pub fn majority_severity(members: &[&Finding]) -> Severity {
    let mut counts = [0usize; 3];
    for finding in members {
        counts[finding.severity as usize] += 1;
    }

    let mut winner = Severity::ALL[0];
    let mut winner_count = counts[0];
    for (severity, count) in Severity::ALL.iter().zip(counts).skip(1) {
        if count > winner_count {
            winner = *severity;
            winner_count = count;
        }
    }
    winner
}
