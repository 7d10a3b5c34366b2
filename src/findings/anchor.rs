//! Anchor resolution — is a finding's claimed code location inside the
//! change under review, and how fragile is the reference?
//!
//! Rules run in priority order; the first matching rule decides the
//! finding's `anchor_status` and may demote its severity.

use std::collections::BTreeSet;

use tracing::debug;

use super::types::{AnchorStability, AnchorStatus, Finding, ReviewType, Scope, Severity};

/// Classify an anchor's fragility. `file:identifier` references a symbol;
/// `file:@@-<line>,<count>` is a diff-hunk coordinate that drifts when
/// surrounding lines change.
pub fn classify_stability(anchor: &str) -> Option<AnchorStability> {
    let (_, rest) = anchor.split_once(':')?;
    if is_hunk_coordinate(rest) {
        Some(AnchorStability::HunkHeader)
    } else {
        Some(AnchorStability::Symbol)
    }
}

fn is_hunk_coordinate(rest: &str) -> bool {
    let Some(coords) = rest.strip_prefix("@@-") else {
        return false;
    };
    match coords.split_once(',') {
        Some((line, count)) => {
            !line.is_empty()
                && !count.is_empty()
                && line.bytes().all(|b| b.is_ascii_digit())
                && count.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Resolve one finding's anchor against the changed-file set, mutating its
/// `severity`, `anchor_status`, and `anchor_stability` in place.
pub fn resolve(finding: &mut Finding, review_type: ReviewType, changed_files: &BTreeSet<String>) {
    finding.anchor_stability = finding.anchor.as_deref().and_then(classify_stability);

    // Low-severity findings are not worth anchor friction.
    if !finding.severity.anchor_enforced(review_type) {
        finding.anchor_status = AnchorStatus::Valid;
        return;
    }

    let Some(anchor_file) = finding.anchor_file().map(str::to_string) else {
        match review_type {
            ReviewType::Review => {
                debug!(id = %finding.id, "unanchored blocking finding demoted");
                finding.severity = Severity::Advisory;
                finding.anchor_status = AnchorStatus::Unresolved;
            }
            ReviewType::Audit => {
                // Audits tolerate unanchored high-severity findings
                // pending human triage.
                finding.anchor_status = AnchorStatus::NeedsTriage;
            }
        }
        return;
    };

    if finding.scope == Some(Scope::CrossFile) {
        let trigger_in_scope = finding
            .trigger_anchor_file()
            .map(|f| changed_files.contains(f))
            .unwrap_or(false);
        let justified = finding
            .cross_file_justification
            .as_deref()
            .map(|j| !j.trim().is_empty())
            .unwrap_or(false);
        if trigger_in_scope && justified {
            finding.anchor_status = AnchorStatus::CrossFile;
            return;
        }
    }

    if !changed_files.contains(&anchor_file) {
        debug!(id = %finding.id, file = %anchor_file, "anchor outside changed set, demoted");
        finding.severity = Severity::Advisory;
        finding.anchor_status = AnchorStatus::OutOfScope;
        return;
    }

    finding.anchor_status = AnchorStatus::Valid;
}
