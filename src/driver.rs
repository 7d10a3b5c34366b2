//! Orchestration driver — runs one review iteration end-to-end.
//!
//! The driver is deliberately thin: it calls the model wave, feeds each
//! outcome through the finding pipeline, merges the dissenter's batch into
//! the primary's, records the result on the session, folds the cycle into
//! the circuit breaker, and decides whether the loop continues. All policy
//! (which breaker triggers matter, in what order; when flatline ends the
//! run) lives here, not in the bookkeeping primitives.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::bridge::{
    BridgeError, BridgeSession, BridgeState, CircuitBreaker, IterationState, StateStore,
    TriggerKind,
};
use crate::bridge::{CircuitBreakerRecord, SessionRecord};
use crate::findings::{
    merge_findings, process_findings, ClassifiedResponse, Finding, FindingsSummary, ReviewType,
};
use crate::findings::merge::hash_prefix;
use crate::model::{call_wave, ChangeSetProvider, ModelCaller, WaveRequest};

/// Driver settings for one bridge run.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub review_type: ReviewType,
    /// Primary reviewer model.
    pub primary_model: String,
    /// Cross-model dissenter.
    pub dissenter_model: String,
    pub system_prompt: String,
    pub sprint_plan_source: String,
    /// Per-call bound.
    pub call_timeout: Duration,
    /// Delay between wave starts.
    pub wave_stagger: Duration,
    /// Below-threshold iterations needed to declare flatline.
    pub flatline_consecutive: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            review_type: ReviewType::Review,
            primary_model: "bridgebuilder".to_string(),
            dissenter_model: "dissenter".to_string(),
            system_prompt: "Review the change and answer with a findings document.".to_string(),
            sprint_plan_source: "bridgebuilder".to_string(),
            call_timeout: Duration::from_secs(120),
            wave_stagger: Duration::from_secs(2),
            flatline_consecutive: 2,
        }
    }
}

/// What the loop does after an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Another iteration is warranted.
    Continue,
    /// Diminishing returns or depth exhausted; wrap up.
    Finalize { reason: String },
    /// The circuit breaker tripped; the session is halted.
    Halt { trigger: TriggerKind, reason: String },
}

impl std::fmt::Display for NextStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Finalize { reason } => write!(f, "finalize: {}", reason),
            Self::Halt { trigger, reason } => write!(f, "halt ({}): {}", trigger, reason),
        }
    }
}

/// Everything one iteration produced.
#[derive(Debug)]
pub struct IterationReport {
    pub iteration: u32,
    pub primary: ClassifiedResponse,
    pub dissenter: ClassifiedResponse,
    /// Merged, deduplicated findings from both sources.
    pub findings: Vec<Finding>,
    pub summary: FindingsSummary,
    pub next: NextStep,
}

/// Drives one session's iterations against injected capabilities.
pub struct OrchestrationDriver<S1, S2> {
    session: BridgeSession<S1>,
    breaker: CircuitBreaker<S2>,
    caller: Arc<dyn ModelCaller>,
    changes: Arc<dyn ChangeSetProvider>,
    config: DriverConfig,
}

impl<S1, S2> OrchestrationDriver<S1, S2>
where
    S1: StateStore<SessionRecord>,
    S2: StateStore<CircuitBreakerRecord>,
{
    pub fn new(
        session: BridgeSession<S1>,
        breaker: CircuitBreaker<S2>,
        caller: Arc<dyn ModelCaller>,
        changes: Arc<dyn ChangeSetProvider>,
        config: DriverConfig,
    ) -> Self {
        Self {
            session,
            breaker,
            caller,
            changes,
            config,
        }
    }

    /// Walk the session from `PREFLIGHT` into `ITERATING`.
    pub fn jack_in(&self) -> Result<(), BridgeError> {
        self.session.transition(BridgeState::JackIn)?;
        self.session.transition(BridgeState::Iterating)?;
        Ok(())
    }

    pub fn session(&self) -> &BridgeSession<S1> {
        &self.session
    }

    pub fn breaker(&self) -> &CircuitBreaker<S2> {
        &self.breaker
    }

    /// Run iteration `n` over `review_content` (the diff or change text)
    /// and `files_changed_this_cycle` (what the previous sprint touched).
    pub async fn run_iteration(
        &self,
        n: u32,
        review_content: &str,
        files_changed_this_cycle: u64,
    ) -> Result<IterationReport, BridgeError> {
        let changed_files = self.changes.changed_files();
        info!(iteration = n, files_in_scope = changed_files.len(), "iteration starting");

        self.session
            .upsert_iteration(n, IterationState::InProgress, &self.config.sprint_plan_source)?;

        // Review wave: primary and dissenter run concurrently, staggered.
        let requests = [
            WaveRequest {
                model_id: self.config.primary_model.clone(),
                system_prompt: self.config.system_prompt.clone(),
                content: review_content.to_string(),
            },
            WaveRequest {
                model_id: self.config.dissenter_model.clone(),
                system_prompt: self.config.system_prompt.clone(),
                content: review_content.to_string(),
            },
        ];
        let mut responses = call_wave(
            self.caller.as_ref(),
            &requests,
            self.config.wave_stagger,
            self.config.call_timeout,
        )
        .await;
        let dissenter_raw = responses
            .pop()
            .flatten()
            .map(|r| r.content)
            .unwrap_or_default();
        let primary_raw = responses
            .pop()
            .flatten()
            .map(|r| r.content)
            .unwrap_or_default();

        let session_id = self.session.read()?.bridge_id;
        let primary = process_findings(
            &primary_raw,
            self.config.review_type,
            &self.config.primary_model,
            &session_id,
            0,
            &changed_files,
        );
        let dissenter = process_findings(
            &dissenter_raw,
            self.config.review_type,
            &self.config.dissenter_model,
            &session_id,
            0,
            &changed_files,
        );

        let mut findings = primary.findings.clone();
        merge_findings(&mut findings, dissenter.findings.clone(), "dissenter");
        let summary = FindingsSummary::tally(&findings);

        self.session.record_findings(n, &summary)?;
        self.session
            .update_flatline(summary.severity_weighted_score, n)?;
        self.session.update_metrics(0, files_changed_this_cycle, summary.total, 0)?;
        self.session
            .upsert_iteration(n, IterationState::Completed, &self.config.sprint_plan_source)?;

        let next = self.decide(n, &findings, files_changed_this_cycle)?;
        info!(iteration = n, findings = findings.len(), next = %next, "iteration complete");

        Ok(IterationReport {
            iteration: n,
            primary,
            dissenter,
            findings,
            summary,
            next,
        })
    }

    /// Fold the cycle into the breaker and pick the next step. Trigger
    /// order: same_issue, no_progress, cycle_count, timeout.
    fn decide(
        &self,
        n: u32,
        findings: &[Finding],
        files_changed_this_cycle: u64,
    ) -> Result<NextStep, BridgeError> {
        let issue_hash = finding_set_hash(findings);
        let tripped = self
            .breaker
            .observe_cycle(&issue_hash, files_changed_this_cycle > 0)?;

        if let Some(trigger) = tripped {
            let reason = format!("trigger {} fired on iteration {}", trigger, n);
            warn!(%trigger, iteration = n, "halting session");
            self.breaker.trip(trigger, &reason)?;
            self.session.transition(BridgeState::Halted)?;
            return Ok(NextStep::Halt { trigger, reason });
        }

        if self.session.is_flatlined(self.config.flatline_consecutive)? {
            let reason = format!(
                "weighted score below threshold for {} consecutive iterations",
                self.config.flatline_consecutive
            );
            self.session.transition(BridgeState::Finalizing)?;
            return Ok(NextStep::Finalize { reason });
        }

        let record = self.session.read()?;
        if n >= record.config.depth {
            let reason = format!("depth {} reached", record.config.depth);
            self.session.transition(BridgeState::Finalizing)?;
            return Ok(NextStep::Finalize { reason });
        }

        // Self-loop: another iteration.
        self.session.transition(BridgeState::Iterating)?;
        Ok(NextStep::Continue)
    }
}

/// Stable hash of a finding set, for the breaker's same-issue streak.
/// Sorted finding ids make the hash order-independent.
pub fn finding_set_hash(findings: &[Finding]) -> String {
    let mut ids: Vec<&str> = findings.iter().map(|f| f.finding_id.as_str()).collect();
    ids.sort_unstable();
    hash_prefix(&ids.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::test_finding;
    use crate::findings::Severity;

    #[test]
    fn test_finding_set_hash_order_independent() {
        let mut a = test_finding("f-1", Severity::High);
        a.finding_id = "aaaa1111".to_string();
        let mut b = test_finding("f-2", Severity::Low);
        b.finding_id = "bbbb2222".to_string();

        let forward = finding_set_hash(&[a.clone(), b.clone()]);
        let reverse = finding_set_hash(&[b, a]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 8);
    }

    #[test]
    fn test_finding_set_hash_distinguishes_sets() {
        let mut a = test_finding("f-1", Severity::High);
        a.finding_id = "aaaa1111".to_string();
        let empty = finding_set_hash(&[]);
        assert_ne!(empty, finding_set_hash(&[a]));
    }
}
