//! The bridge session operation surface: every mutation is one locked
//! read-transform-write against the injected store.

use tracing::info;

use crate::findings::FindingsSummary;

use super::record::{BridgeConfig, IterationState, SessionRecord};
use super::state::BridgeState;
use super::store::StateStore;
use super::BridgeError;

/// Owns the persisted session record through a [`StateStore`].
#[derive(Debug)]
pub struct BridgeSession<S> {
    store: S,
}

impl<S: StateStore<SessionRecord>> BridgeSession<S> {
    /// Create a fresh session in `PREFLIGHT`. Fails if a record already
    /// exists at the store's target; the caller must explicitly remove or
    /// resume.
    pub fn init(
        store: S,
        bridge_id: impl Into<String>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let record = SessionRecord::new(bridge_id, config);
        store.init(&record)?;
        info!(bridge_id = %record.bridge_id, "bridge session created");
        Ok(Self { store })
    }

    /// Attach to an existing record, verifying it loads (and so passes the
    /// schema-version check) before any operation runs.
    pub fn resume(store: S) -> Result<Self, BridgeError> {
        let record = store.load()?;
        info!(bridge_id = %record.bridge_id, state = %record.state, "bridge session resumed");
        Ok(Self { store })
    }

    /// Validated state change; rejection leaves the record untouched.
    pub fn transition(&self, next: BridgeState) -> Result<(), BridgeError> {
        self.store.update(|r| r.apply_transition(next))?;
        Ok(())
    }

    /// Create or update iteration `n` in place.
    pub fn upsert_iteration(
        &self,
        n: u32,
        state: IterationState,
        sprint_plan_source: &str,
    ) -> Result<(), BridgeError> {
        self.store.update(|r| {
            r.upsert_iteration(n, state, sprint_plan_source);
            Ok::<(), BridgeError>(())
        })?;
        Ok(())
    }

    /// Copy a findings summary into iteration `n`. Fails without writing
    /// if the iteration does not exist.
    pub fn record_findings(&self, n: u32, summary: &FindingsSummary) -> Result<(), BridgeError> {
        self.store.update(|r| r.record_findings(n, summary))?;
        Ok(())
    }

    /// Parse and record a findings summary from a raw JSON document, the
    /// shape review artifacts are stored in. An unreadable document fails
    /// before anything is written.
    pub fn record_findings_json(&self, n: u32, raw: &str) -> Result<(), BridgeError> {
        let summary = FindingsSummary::from_json_str(raw)
            .map_err(|reason| BridgeError::UnreadableSummary { reason })?;
        self.record_findings(n, &summary)
    }

    pub fn update_flatline(&self, score: f64, iteration_number: u32) -> Result<(), BridgeError> {
        self.store.update(|r| {
            r.update_flatline(score, iteration_number);
            Ok::<(), BridgeError>(())
        })?;
        Ok(())
    }

    pub fn is_flatlined(&self, consecutive_required: u32) -> Result<bool, BridgeError> {
        Ok(self.store.load()?.is_flatlined(consecutive_required))
    }

    pub fn update_metrics(
        &self,
        sprints: u64,
        files: u64,
        findings: u64,
        visions: u64,
    ) -> Result<(), BridgeError> {
        self.store.update(|r| {
            r.add_metrics(sprints, files, findings, visions);
            Ok::<(), BridgeError>(())
        })?;
        Ok(())
    }

    pub fn read(&self) -> Result<SessionRecord, BridgeError> {
        Ok(self.store.load()?)
    }

    pub fn current_iteration_count(&self) -> Result<usize, BridgeError> {
        Ok(self.store.load()?.iteration_count())
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
