//! Response classifier — one raw model-call outcome in, one of four
//! terminal classifications out.
//!
//! The evaluation order is itself the contract: api_failure, then
//! malformed_response, then clean, then reviewed. A later state is only
//! reachable when every earlier guard failed to match.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::anchor;
use super::merge::assign_finding_ids;
use super::types::{Finding, ReviewType};
use super::validator::{self, RawFinding};

/// Terminal classification of one model response. Part of the public
/// findings contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The model call never returned usable output.
    ApiFailure,
    /// Output present but not shaped like a findings document.
    MalformedResponse,
    /// A well-formed response with zero findings.
    Clean,
    /// One or more findings survived validation.
    Reviewed,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ApiFailure => "api_failure",
            Self::MalformedResponse => "malformed_response",
            Self::Clean => "clean",
            Self::Reviewed => "reviewed",
        };
        write!(f, "{}", s)
    }
}

/// Metadata attached to every classified response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub status: ResponseStatus,
    /// Whether the missing signal degrades review quality. Audits require a
    /// model signal; reviews can legitimately proceed without dissent.
    pub degraded: bool,
    pub model: String,
    pub session_id: String,
    pub retry_count: u32,
    /// Findings present in the parsed payload.
    pub parsed: usize,
    /// Findings dropped by validation.
    pub dropped: usize,
}

/// A classified model response: validated, anchor-resolved findings plus
/// uniform metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedResponse {
    pub findings: Vec<Finding>,
    pub metadata: ResponseMetadata,
}

/// Classify one raw model response for `review_type`.
///
/// Invalid findings are dropped from the result rather than surfaced as
/// errors; one malformed item must not fail the whole batch.
pub fn process_findings(
    raw_output: &str,
    review_type: ReviewType,
    model: &str,
    session_id: &str,
    retry_count: u32,
    changed_files: &BTreeSet<String>,
) -> ClassifiedResponse {
    let meta = |status: ResponseStatus, degraded: bool, parsed: usize, dropped: usize| {
        ResponseMetadata {
            status,
            degraded,
            model: model.to_string(),
            session_id: session_id.to_string(),
            retry_count,
            parsed,
            dropped,
        }
    };

    // 1. api_failure — the call never returned.
    if raw_output.trim().is_empty() {
        let degraded = review_type == ReviewType::Audit;
        warn!(model, session_id, degraded, "empty model response");
        return ClassifiedResponse {
            findings: Vec::new(),
            metadata: meta(ResponseStatus::ApiFailure, degraded, 0, 0),
        };
    }

    // 2. malformed_response — wrong shape entirely.
    let raw_findings = match parse_findings_field(raw_output) {
        Some(items) => items,
        None => {
            warn!(model, session_id, "response missing findings field");
            return ClassifiedResponse {
                findings: Vec::new(),
                metadata: meta(ResponseStatus::MalformedResponse, false, 0, 0),
            };
        }
    };

    // 3. clean — well-formed, nothing to report.
    if raw_findings.is_empty() {
        return ClassifiedResponse {
            findings: Vec::new(),
            metadata: meta(ResponseStatus::Clean, false, 0, 0),
        };
    }

    // 4. reviewed — validate, drop failures, anchor-resolve survivors.
    let parsed = raw_findings.len();
    let mut findings = Vec::with_capacity(parsed);
    for raw in &raw_findings {
        match validator::validate(raw, review_type, model) {
            Ok(finding) => findings.push(finding),
            Err(err) => debug!(model, %err, "dropping invalid finding"),
        }
    }
    let dropped = parsed - findings.len();

    assign_finding_ids(&mut findings);
    for finding in &mut findings {
        anchor::resolve(finding, review_type, changed_files);
    }

    ClassifiedResponse {
        findings,
        metadata: meta(ResponseStatus::Reviewed, false, parsed, dropped),
    }
}

/// Extract the `findings` array from a raw payload, tolerating loosely
/// typed items. `None` means the payload is not a findings document.
fn parse_findings_field(raw_output: &str) -> Option<Vec<RawFinding>> {
    let value: serde_json::Value = serde_json::from_str(raw_output).ok()?;
    let items = value.get("findings")?.as_array()?;
    Some(
        items
            .iter()
            .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
            .collect(),
    )
}
