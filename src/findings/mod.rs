//! The finding pipeline: validation, anchor resolution, cross-model merge,
//! and response classification.
//!
//! Raw model output flows through [`classifier::process_findings`], which
//! validates each finding ([`validator`]), resolves its anchor against the
//! changed-file set ([`anchor`]), and assigns content-addressed identities
//! ([`merge`]). Batches from independent models are then deduplicated with
//! [`merge::merge_findings`].

pub mod anchor;
pub mod classifier;
pub mod merge;
pub mod types;
pub mod validator;

pub use classifier::{process_findings, ClassifiedResponse, ResponseMetadata, ResponseStatus};
pub use merge::{assign_finding_ids, compute_finding_id, merge_findings, CROSS_MODEL_NOTE};
pub use types::{
    AnchorStability, AnchorStatus, Category, Finding, FindingsSummary, ReviewType, Scope,
    Severity, SeverityCounts,
};
pub use validator::{RawFinding, ValidationError};

/// Canned finding for tests across the crate.
#[cfg(test)]
pub(crate) fn test_finding(id: &str, severity: Severity) -> Finding {
    Finding {
        id: id.to_string(),
        severity,
        category: Category::Concurrency,
        description: "update races reset".to_string(),
        failure_mode: "counter increment lost under contention".to_string(),
        anchor: Some("src/a.rs:update".to_string()),
        anchor_type: None,
        scope: None,
        trigger_anchor: None,
        cross_file_justification: None,
        finding_id: String::new(),
        anchor_status: AnchorStatus::Valid,
        anchor_stability: None,
        source: "probe-7b".to_string(),
        note: None,
    }
}
