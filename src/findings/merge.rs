//! Cross-model finding merge — content-addressed dedup with severity
//! upgrade and confirmation notes.

use sha2::{Digest, Sha256};
use tracing::debug;

use super::types::{Category, Finding};

/// Note attached to a finding that survived a cross-model collision.
pub const CROSS_MODEL_NOTE: &str = "Confirmed by cross-model review";

/// 8-hex-char prefix of the SHA-256 of `input`.
pub fn hash_prefix(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(8);
    for byte in &digest[..4] {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Deterministic content-addressed identity for a finding.
///
/// Anchored findings hash `(anchor, category)`; anchorless findings mix in
/// their batch index so no stable identity is claimed where none exists.
pub fn compute_finding_id(anchor: Option<&str>, category: Category, index: usize) -> String {
    let canonical = match anchor {
        Some(a) => format!("{}:{}", a, category.as_str()),
        None => format!("no_anchor:{}:{}", category.as_str(), index),
    };
    hash_prefix(&canonical)
}

/// Assign `finding_id` to every finding in a freshly classified batch.
pub fn assign_finding_ids(findings: &mut [Finding]) {
    for (index, finding) in findings.iter_mut().enumerate() {
        finding.finding_id = compute_finding_id(finding.anchor.as_deref(), finding.category, index);
    }
}

/// Merge `incoming` findings (tagged with `origin`) into `existing`.
///
/// A collision on `finding_id` between two anchored findings keeps the
/// higher-severity record and attaches the cross-model confirmation note;
/// ties keep the existing record, still noted. Anchorless findings carry no
/// stable identity and are always appended.
pub fn merge_findings(existing: &mut Vec<Finding>, incoming: Vec<Finding>, origin: &str) {
    for mut candidate in incoming {
        candidate.source = origin.to_string();

        let collision = if candidate.anchor.is_some() {
            existing
                .iter()
                .position(|f| f.anchor.is_some() && f.finding_id == candidate.finding_id)
        } else {
            None
        };

        match collision {
            Some(index) => {
                debug!(finding_id = %candidate.finding_id, "cross-model collision");
                let held = &mut existing[index];
                if candidate.severity.rank() > held.severity.rank() {
                    candidate.note = Some(CROSS_MODEL_NOTE.to_string());
                    *held = candidate;
                } else {
                    held.note = Some(CROSS_MODEL_NOTE.to_string());
                }
            }
            None => existing.push(candidate),
        }
    }
}
