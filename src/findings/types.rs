//! Finding records — severities, categories, anchors, and summaries.

use serde::{Deserialize, Serialize};

/// Which review contract a model was asked to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    /// PR-style review — findings are blocking or advisory.
    Review,
    /// Deep audit — findings carry a four-level severity scale.
    Audit,
}

impl std::fmt::Display for ReviewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Review => write!(f, "review"),
            Self::Audit => write!(f, "audit"),
        }
    }
}

/// Finding severity — a closed sum over the review scale (Blocking/Advisory)
/// and the audit scale (Critical/High/Medium/Low). The validator enforces
/// scale purity at intake; the anchor resolver may demote across scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Blocking,
    Advisory,
}

impl Severity {
    /// Rank used when merging colliding findings: higher rank survives.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High | Self::Blocking => 3,
            Self::Medium | Self::Advisory => 2,
            Self::Low => 1,
        }
    }

    /// Rank of a raw severity string; unknown values rank 0.
    pub fn rank_str(value: &str) -> u8 {
        value.parse::<Severity>().map(Severity::rank).unwrap_or(0)
    }

    /// Weight contributed to an iteration's severity-weighted score.
    pub fn weight(self) -> f64 {
        match self {
            Self::Critical => 10.0,
            Self::High | Self::Blocking => 5.0,
            Self::Medium | Self::Advisory => 2.0,
            Self::Low => 1.0,
        }
    }

    /// Whether this severity belongs to the given review type's scale.
    pub fn valid_for(self, review_type: ReviewType) -> bool {
        match review_type {
            ReviewType::Review => matches!(self, Self::Blocking | Self::Advisory),
            ReviewType::Audit => matches!(
                self,
                Self::Critical | Self::High | Self::Medium | Self::Low
            ),
        }
    }

    /// The severities subject to anchor enforcement for a review type.
    /// Lower severities skip enforcement entirely.
    pub fn anchor_enforced(self, review_type: ReviewType) -> bool {
        match review_type {
            ReviewType::Review => matches!(self, Self::Blocking),
            ReviewType::Audit => matches!(self, Self::Critical | Self::High),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Blocking => "BLOCKING",
            Self::Advisory => "ADVISORY",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Self::Critical),
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            "BLOCKING" => Ok(Self::Blocking),
            "ADVISORY" => Ok(Self::Advisory),
            _ => Err(()),
        }
    }
}

/// Fixed finding category vocabulary. Part of the public findings contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Injection,
    Authz,
    DataLoss,
    NullSafety,
    Concurrency,
    TypeError,
    ResourceLeak,
    ErrorHandling,
    SpecViolation,
    Performance,
    Secrets,
    Xss,
    Ssrf,
    Deserialization,
    Crypto,
    InfoDisclosure,
    RateLimiting,
    InputValidation,
    Config,
    Other,
}

impl Category {
    /// Wire form of the category, also used in the finding-id hash input.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Injection => "injection",
            Self::Authz => "authz",
            Self::DataLoss => "data-loss",
            Self::NullSafety => "null-safety",
            Self::Concurrency => "concurrency",
            Self::TypeError => "type-error",
            Self::ResourceLeak => "resource-leak",
            Self::ErrorHandling => "error-handling",
            Self::SpecViolation => "spec-violation",
            Self::Performance => "performance",
            Self::Secrets => "secrets",
            Self::Xss => "xss",
            Self::Ssrf => "ssrf",
            Self::Deserialization => "deserialization",
            Self::Crypto => "crypto",
            Self::InfoDisclosure => "info-disclosure",
            Self::RateLimiting => "rate-limiting",
            Self::InputValidation => "input-validation",
            Self::Config => "config",
            Self::Other => "other",
        }
    }

    /// All known categories, in wire order.
    pub fn all() -> &'static [Category] {
        &[
            Self::Injection,
            Self::Authz,
            Self::DataLoss,
            Self::NullSafety,
            Self::Concurrency,
            Self::TypeError,
            Self::ResourceLeak,
            Self::ErrorHandling,
            Self::SpecViolation,
            Self::Performance,
            Self::Secrets,
            Self::Xss,
            Self::Ssrf,
            Self::Deserialization,
            Self::Crypto,
            Self::InfoDisclosure,
            Self::RateLimiting,
            Self::InputValidation,
            Self::Config,
            Self::Other,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or(())
    }
}

/// Outcome of anchor resolution for one finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    /// Anchor resolved inside the changed-file set (or enforcement skipped).
    Valid,
    /// No anchor on a finding that required one; severity was demoted.
    Unresolved,
    /// No anchor on a high-severity audit finding; held for human triage.
    NeedsTriage,
    /// Justified ripple effect with an in-scope trigger anchor.
    CrossFile,
    /// Anchor points outside the changed-file set; severity was demoted.
    OutOfScope,
}

impl std::fmt::Display for AnchorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Valid => "valid",
            Self::Unresolved => "unresolved",
            Self::NeedsTriage => "needs_triage",
            Self::CrossFile => "cross_file",
            Self::OutOfScope => "out_of_scope",
        };
        write!(f, "{}", s)
    }
}

/// How fragile a finding's anchor is under surrounding edits.
///
/// Hunk-header anchors drift when nearby lines change; symbol anchors
/// survive until the symbol itself moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStability {
    Symbol,
    HunkHeader,
}

/// Declared scope of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Local,
    CrossFile,
}

/// A single validated finding. Built by the response classifier, mutated by
/// the anchor resolver and the merger, immutable after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub category: Category,
    pub description: String,
    pub failure_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_file_justification: Option<String>,
    /// Content-addressed identity; two findings with the same finding_id
    /// are the same logical issue.
    pub finding_id: String,
    pub anchor_status: AnchorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_stability: Option<AnchorStability>,
    /// Which evaluator produced this finding.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Finding {
    /// The file component of an anchor of the form `file:rest`.
    pub fn anchor_file(&self) -> Option<&str> {
        self.anchor
            .as_deref()
            .map(|a| a.split_once(':').map(|(f, _)| f).unwrap_or(a))
    }

    /// The file component of the trigger anchor, if any.
    pub fn trigger_anchor_file(&self) -> Option<&str> {
        self.trigger_anchor
            .as_deref()
            .map(|a| a.split_once(':').map(|(f, _)| f).unwrap_or(a))
    }
}

/// Per-severity finding counts for one iteration. Review-scale severities
/// fold into the audit buckets by rank; vision and praise counters are
/// filled in by the caller, not derived from findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub vision: u64,
    pub praise: u64,
}

impl SeverityCounts {
    /// Bump the bucket a severity folds into.
    pub fn bump(&mut self, severity: Severity) {
        match severity.rank() {
            4 => self.critical += 1,
            3 => self.high += 1,
            2 => self.medium += 1,
            _ => self.low += 1,
        }
    }
}

/// Aggregated view of one iteration's merged findings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingsSummary {
    pub total: u64,
    pub by_severity: SeverityCounts,
    pub severity_weighted_score: f64,
}

impl FindingsSummary {
    /// Tally counts and the weighted score over a merged finding set.
    pub fn tally(findings: &[Finding]) -> Self {
        let mut by_severity = SeverityCounts::default();
        let mut score = 0.0;
        for finding in findings {
            by_severity.bump(finding.severity);
            score += finding.severity.weight();
        }
        Self {
            total: findings.len() as u64,
            by_severity,
            severity_weighted_score: score,
        }
    }

    /// Parse a summary from a JSON document, surfacing the reason on failure.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_table() {
        assert_eq!(Severity::Critical.rank(), 4);
        assert_eq!(Severity::High.rank(), 3);
        assert_eq!(Severity::Blocking.rank(), 3);
        assert_eq!(Severity::Medium.rank(), 2);
        assert_eq!(Severity::Advisory.rank(), 2);
        assert_eq!(Severity::Low.rank(), 1);
        assert_eq!(Severity::rank_str("bogus"), 0);
    }

    #[test]
    fn test_severity_scale_membership() {
        assert!(Severity::Blocking.valid_for(ReviewType::Review));
        assert!(!Severity::Blocking.valid_for(ReviewType::Audit));
        assert!(Severity::Critical.valid_for(ReviewType::Audit));
        assert!(!Severity::Critical.valid_for(ReviewType::Review));
    }

    #[test]
    fn test_anchor_enforcement_sets() {
        assert!(Severity::Blocking.anchor_enforced(ReviewType::Review));
        assert!(!Severity::Advisory.anchor_enforced(ReviewType::Review));
        assert!(Severity::Critical.anchor_enforced(ReviewType::Audit));
        assert!(Severity::High.anchor_enforced(ReviewType::Audit));
        assert!(!Severity::Medium.anchor_enforced(ReviewType::Audit));
        assert!(!Severity::Low.anchor_enforced(ReviewType::Audit));
    }

    #[test]
    fn test_severity_parse_roundtrip() {
        for s in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Blocking,
            Severity::Advisory,
        ] {
            assert_eq!(s.to_string().parse::<Severity>().unwrap(), s);
        }
        assert!("nope".parse::<Severity>().is_err());
    }

    #[test]
    fn test_category_wire_form() {
        assert_eq!(Category::DataLoss.as_str(), "data-loss");
        assert_eq!(Category::InfoDisclosure.as_str(), "info-disclosure");
        assert_eq!("null-safety".parse::<Category>().unwrap(), Category::NullSafety);
        assert!("made-up".parse::<Category>().is_err());
        assert_eq!(Category::all().len(), 20);
    }

    #[test]
    fn test_category_serde() {
        let json = serde_json::to_string(&Category::TypeError).unwrap();
        assert_eq!(json, "\"type-error\"");
        let parsed: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Category::TypeError);
    }

    #[test]
    fn test_anchor_file_extraction() {
        let mut finding = crate::findings::test_finding("f-1", Severity::High);
        finding.anchor = Some("src/store.rs:acquire_lock".to_string());
        assert_eq!(finding.anchor_file(), Some("src/store.rs"));

        finding.anchor = Some("src/store.rs".to_string());
        assert_eq!(finding.anchor_file(), Some("src/store.rs"));

        finding.anchor = None;
        assert_eq!(finding.anchor_file(), None);
    }

    #[test]
    fn test_summary_tally_folds_review_scale() {
        let mut blocking = crate::findings::test_finding("f-1", Severity::Blocking);
        blocking.anchor = None;
        let advisory = crate::findings::test_finding("f-2", Severity::Advisory);
        let critical = crate::findings::test_finding("f-3", Severity::Critical);

        let summary = FindingsSummary::tally(&[blocking, advisory, critical]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_severity.critical, 1);
        assert_eq!(summary.by_severity.high, 1);
        assert_eq!(summary.by_severity.medium, 1);
        assert!((summary.severity_weighted_score - 17.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_from_json() {
        let good = r#"{"total":2,"by_severity":{"critical":1,"high":1,"medium":0,"low":0,"vision":0,"praise":0},"severity_weighted_score":15.0}"#;
        let summary = FindingsSummary::from_json_str(good).unwrap();
        assert_eq!(summary.total, 2);
        assert!(FindingsSummary::from_json_str("not json").is_err());
    }
}
