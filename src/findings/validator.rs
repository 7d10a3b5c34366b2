//! Finding shape contract — required fields and per-type severity scales.
//!
//! A finding that fails validation is dropped from its batch by the
//! classifier; validation never aborts the batch.

use serde::Deserialize;

use super::types::{AnchorStatus, Category, Finding, ReviewType, Scope, Severity};

/// A finding as a model emitted it, before any contract is enforced.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFinding {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub failure_mode: Option<String>,
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub anchor_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub trigger_anchor: Option<String>,
    #[serde(default)]
    pub cross_file_justification: Option<String>,
}

/// Why a single finding failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("finding `{id}`: missing required field `{field}`")]
    MissingField { id: String, field: &'static str },

    #[error("finding `{id}`: unknown category `{value}`")]
    UnknownCategory { id: String, value: String },

    #[error("finding `{id}`: unknown severity `{value}`")]
    UnknownSeverity { id: String, value: String },

    #[error("finding `{id}`: severity {severity} is not on the {review_type} scale")]
    SeverityScaleMismatch {
        id: String,
        severity: Severity,
        review_type: ReviewType,
    },
}

fn required<'a>(
    id: &str,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField {
            id: id.to_string(),
            field,
        }),
    }
}

/// Validate one raw finding against the shape contract for `review_type`
/// and build the typed record. The returned finding has no `finding_id`
/// yet and a provisional `anchor_status`; the merger and anchor resolver
/// fill those in.
pub fn validate(
    raw: &RawFinding,
    review_type: ReviewType,
    source: &str,
) -> Result<Finding, ValidationError> {
    let id = required("<unknown>", "id", &raw.id)?.to_string();
    let description = required(&id, "description", &raw.description)?.to_string();
    let failure_mode = required(&id, "failure_mode", &raw.failure_mode)?.to_string();

    let category_raw = required(&id, "category", &raw.category)?;
    let category: Category =
        category_raw
            .parse()
            .map_err(|_| ValidationError::UnknownCategory {
                id: id.clone(),
                value: category_raw.to_string(),
            })?;

    let severity_raw = required(&id, "severity", &raw.severity)?;
    let severity: Severity =
        severity_raw
            .parse()
            .map_err(|_| ValidationError::UnknownSeverity {
                id: id.clone(),
                value: severity_raw.to_string(),
            })?;
    if !severity.valid_for(review_type) {
        return Err(ValidationError::SeverityScaleMismatch {
            id,
            severity,
            review_type,
        });
    }

    let scope = match raw.scope.as_deref() {
        Some("cross_file") => Some(Scope::CrossFile),
        Some("local") => Some(Scope::Local),
        _ => None,
    };

    Ok(Finding {
        id,
        severity,
        category,
        description,
        failure_mode,
        anchor: raw.anchor.clone().filter(|a| !a.trim().is_empty()),
        anchor_type: raw.anchor_type.clone(),
        scope,
        trigger_anchor: raw.trigger_anchor.clone(),
        cross_file_justification: raw.cross_file_justification.clone(),
        finding_id: String::new(),
        anchor_status: AnchorStatus::Valid,
        anchor_stability: None,
        source: source.to_string(),
        note: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(severity: &str, category: &str) -> RawFinding {
        RawFinding {
            id: Some("f-1".to_string()),
            severity: Some(severity.to_string()),
            category: Some(category.to_string()),
            description: Some("stale read after unlock".to_string()),
            failure_mode: Some("two writers race, one update is lost".to_string()),
            anchor: Some("src/store.rs:update".to_string()),
            ..RawFinding::default()
        }
    }

    #[test]
    fn test_valid_audit_finding() {
        let finding = validate(&raw("HIGH", "concurrency"), ReviewType::Audit, "probe").unwrap();
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.category, Category::Concurrency);
        assert_eq!(finding.source, "probe");
        assert_eq!(finding.anchor_status, AnchorStatus::Valid);
        assert!(finding.finding_id.is_empty());
    }

    #[test]
    fn test_valid_review_finding_lowercase_severity() {
        let finding = validate(&raw("blocking", "authz"), ReviewType::Review, "probe").unwrap();
        assert_eq!(finding.severity, Severity::Blocking);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut r = raw("HIGH", "concurrency");
        r.description = None;
        let err = validate(&r, ReviewType::Audit, "probe").unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                id: "f-1".to_string(),
                field: "description"
            }
        );

        let mut r = raw("HIGH", "concurrency");
        r.failure_mode = Some("   ".to_string());
        assert!(matches!(
            validate(&r, ReviewType::Audit, "probe"),
            Err(ValidationError::MissingField { field: "failure_mode", .. })
        ));

        let mut r = raw("HIGH", "concurrency");
        r.id = None;
        assert!(matches!(
            validate(&r, ReviewType::Audit, "probe"),
            Err(ValidationError::MissingField { field: "id", .. })
        ));
    }

    #[test]
    fn test_unknown_enumerations_rejected() {
        let err = validate(&raw("HIGH", "vibes"), ReviewType::Audit, "probe").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownCategory { .. }));

        let err = validate(&raw("SEVERE", "authz"), ReviewType::Audit, "probe").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownSeverity { .. }));
    }

    #[test]
    fn test_cross_scale_severity_rejected() {
        // Audit severity on a review finding and vice versa.
        let err = validate(&raw("CRITICAL", "authz"), ReviewType::Review, "probe").unwrap_err();
        assert!(matches!(err, ValidationError::SeverityScaleMismatch { .. }));

        let err = validate(&raw("ADVISORY", "authz"), ReviewType::Audit, "probe").unwrap_err();
        assert!(matches!(err, ValidationError::SeverityScaleMismatch { .. }));
    }

    #[test]
    fn test_blank_anchor_treated_as_absent() {
        let mut r = raw("HIGH", "concurrency");
        r.anchor = Some("  ".to_string());
        let finding = validate(&r, ReviewType::Audit, "probe").unwrap();
        assert!(finding.anchor.is_none());
    }

    #[test]
    fn test_scope_parsing() {
        let mut r = raw("HIGH", "concurrency");
        r.scope = Some("cross_file".to_string());
        let finding = validate(&r, ReviewType::Audit, "probe").unwrap();
        assert_eq!(finding.scope, Some(Scope::CrossFile));

        r.scope = Some("galactic".to_string());
        let finding = validate(&r, ReviewType::Audit, "probe").unwrap();
        assert!(finding.scope.is_none());
    }
}
