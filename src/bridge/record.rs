//! The persisted session record and its pure transformations.
//!
//! Every mutating operation on [`SessionRecord`] is a pure in-memory
//! transform; persistence (locking, atomic replace) wraps around these in
//! [`super::machine`]. Keeping the transforms on the record itself makes
//! the state-machine semantics testable without a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::findings::{FindingsSummary, SeverityCounts};

use super::state::BridgeState;
use super::store::PersistedRecord;
use super::BridgeError;

/// On-disk layout version. Reads of a record with any other version fail
/// with `SchemaMismatch` — silent misinterpretation of an incompatible
/// layout is worse than halting.
pub const SCHEMA_VERSION: u32 = 3;

/// Session configuration fixed at init time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Maximum review iterations.
    pub depth: u32,
    pub mode: String,
    /// Fraction of the initial score below which an iteration counts
    /// toward flatline.
    pub flatline_threshold: f64,
    pub per_sprint: bool,
    pub branch: String,
}

impl BridgeConfig {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            mode: "review".to_string(),
            flatline_threshold: 0.05,
            per_sprint: false,
            branch: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timestamps {
    pub started: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Diminishing-returns tracker across iterations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FlatlineTracker {
    pub initial_score: f64,
    pub last_score: f64,
    pub consecutive_below_threshold: u32,
}

/// Running totals over the session. Saturating; never decreasing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_sprints_executed: u64,
    pub total_files_changed: u64,
    pub total_findings_addressed: u64,
    pub total_visions_captured: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finalization {
    pub ground_truth_updated: bool,
    pub rtfm_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

/// Whether an iteration is still running or done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationState {
    InProgress,
    Completed,
}

/// Per-iteration review stats copied from the merged findings summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgebuilderStats {
    pub total_findings: u64,
    pub by_severity: SeverityCounts,
    pub severity_weighted_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_comment_url: Option<String>,
}

/// One iteration of the review loop. Keyed by `iteration`; updates for an
/// existing number mutate in place, never duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub state: IterationState,
    pub sprint_plan_source: String,
    pub sprints_executed: u64,
    pub bridgebuilder: BridgebuilderStats,
    pub visions_captured: u64,
    pub started_at: DateTime<Utc>,
}

/// The single source of truth for one bridge run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub bridge_id: String,
    pub schema_version: u32,
    pub state: BridgeState,
    pub config: BridgeConfig,
    pub timestamps: Timestamps,
    pub iterations: Vec<IterationRecord>,
    pub flatline: FlatlineTracker,
    pub metrics: SessionMetrics,
    pub finalization: Finalization,
}

impl PersistedRecord for SessionRecord {
    const SCHEMA_VERSION: u32 = SCHEMA_VERSION;

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

impl SessionRecord {
    /// Fresh record in `PREFLIGHT` with empty iterations and zeroed
    /// trackers.
    pub fn new(bridge_id: impl Into<String>, config: BridgeConfig) -> Self {
        let now = Utc::now();
        Self {
            bridge_id: bridge_id.into(),
            schema_version: SCHEMA_VERSION,
            state: BridgeState::Preflight,
            config,
            timestamps: Timestamps {
                started: now,
                last_activity: now,
            },
            iterations: Vec::new(),
            flatline: FlatlineTracker::default(),
            metrics: SessionMetrics::default(),
            finalization: Finalization::default(),
        }
    }

    fn touch(&mut self) {
        self.timestamps.last_activity = Utc::now();
    }

    /// Move to `next` if the transition table allows it; otherwise reject
    /// and leave the record unmodified.
    pub fn apply_transition(&mut self, next: BridgeState) -> Result<(), BridgeError> {
        if !self.state.can_transition_to(next) {
            return Err(BridgeError::TransitionRejected {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    /// Find iteration `n`, if recorded.
    pub fn iteration(&self, n: u32) -> Option<&IterationRecord> {
        self.iterations.iter().find(|i| i.iteration == n)
    }

    /// Create or update iteration `n`. A new iteration starts with zeroed
    /// review stats (every severity bucket, praise included).
    pub fn upsert_iteration(&mut self, n: u32, state: IterationState, sprint_plan_source: &str) {
        match self.iterations.iter().position(|i| i.iteration == n) {
            Some(index) => {
                let existing = &mut self.iterations[index];
                existing.state = state;
                existing.sprint_plan_source = sprint_plan_source.to_string();
            }
            None => self.iterations.push(IterationRecord {
                iteration: n,
                state,
                sprint_plan_source: sprint_plan_source.to_string(),
                sprints_executed: 0,
                bridgebuilder: BridgebuilderStats::default(),
                visions_captured: 0,
                started_at: Utc::now(),
            }),
        }
        self.touch();
    }

    /// Copy a findings summary into iteration `n`'s review stats. Fails
    /// without touching anything if the iteration does not exist.
    pub fn record_findings(
        &mut self,
        n: u32,
        summary: &FindingsSummary,
    ) -> Result<(), BridgeError> {
        let iteration = self
            .iterations
            .iter_mut()
            .find(|i| i.iteration == n)
            .ok_or(BridgeError::MissingIteration { iteration: n })?;
        iteration.bridgebuilder.total_findings = summary.total;
        iteration.bridgebuilder.by_severity = summary.by_severity;
        iteration.bridgebuilder.severity_weighted_score = summary.severity_weighted_score;
        self.touch();
        Ok(())
    }

    /// Feed one iteration's weighted score into the flatline tracker.
    ///
    /// Iteration 1 sets the baseline. Later iterations compare
    /// `score / initial_score` against the configured threshold; a zero
    /// baseline counts as at-or-below threshold.
    pub fn update_flatline(&mut self, score: f64, iteration_number: u32) {
        if iteration_number <= 1 {
            self.flatline.initial_score = score;
            self.flatline.last_score = score;
            self.flatline.consecutive_below_threshold = 0;
        } else {
            self.flatline.last_score = score;
            let below = if self.flatline.initial_score == 0.0 {
                true
            } else {
                score / self.flatline.initial_score < self.config.flatline_threshold
            };
            if below {
                self.flatline.consecutive_below_threshold += 1;
            } else {
                self.flatline.consecutive_below_threshold = 0;
            }
        }
        self.touch();
    }

    /// Whether the score has stayed below threshold long enough.
    pub fn is_flatlined(&self, consecutive_required: u32) -> bool {
        self.flatline.consecutive_below_threshold >= consecutive_required
    }

    /// Add to the running totals. Saturating.
    pub fn add_metrics(&mut self, sprints: u64, files: u64, findings: u64, visions: u64) {
        let m = &mut self.metrics;
        m.total_sprints_executed = m.total_sprints_executed.saturating_add(sprints);
        m.total_files_changed = m.total_files_changed.saturating_add(files);
        m.total_findings_addressed = m.total_findings_addressed.saturating_add(findings);
        m.total_visions_captured = m.total_visions_captured.saturating_add(visions);
        self.touch();
    }

    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    /// Compact status line for logging.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] bridge={} iterations={}/{} last_score={:.1} flatline_streak={}",
            self.state,
            self.bridge_id,
            self.iterations.len(),
            self.config.depth,
            self.flatline.last_score,
            self.flatline.consecutive_below_threshold,
        )
    }
}
