//! Runaway-loop circuit breaker.
//!
//! Four independent trigger conditions accumulate over the life of a
//! session: the same finding-set hash recurring, cycles without file
//! progress, a hard cycle ceiling, and a wall-clock timeout. The breaker
//! itself is pure bookkeeping — it never self-trips. The orchestration
//! driver evaluates the predicates after each cycle and calls [`trip`],
//! keeping trigger policy a caller concern.
//!
//! [`trip`]: CircuitBreakerRecord::trip

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::store::{PersistedRecord, StateStore, StoreError};
use super::BridgeError;

/// On-disk layout version of the breaker record.
pub const BREAKER_SCHEMA_VERSION: u32 = 1;

/// Breaker state: `Closed` is normal operation, `Open` is tripped and
/// terminal until an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
}

/// Which trigger condition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    SameIssue,
    NoProgress,
    CycleCount,
    Timeout,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SameIssue => "same_issue",
            Self::NoProgress => "no_progress",
            Self::CycleCount => "cycle_count",
            Self::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SameIssueTrigger {
    pub count: u32,
    pub threshold: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoProgressTrigger {
    pub count: u32,
    pub threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleCountTrigger {
    pub current: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutTrigger {
    pub started: DateTime<Utc>,
    pub limit_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSet {
    pub same_issue: SameIssueTrigger,
    pub no_progress: NoProgressTrigger,
    pub cycle_count: CycleCountTrigger,
    pub timeout: TimeoutTrigger,
}

/// One trip event. History is append-only and survives resets, so the
/// audit trail spans multiple trip/reset cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRecord {
    pub timestamp: DateTime<Utc>,
    pub trigger: TriggerKind,
    pub reason: String,
}

/// Defaults: three identical finding sets, five cycles without file
/// changes, twenty cycles total, eight hours of wall clock.
pub const DEFAULT_SAME_ISSUE_THRESHOLD: u32 = 3;
pub const DEFAULT_NO_PROGRESS_THRESHOLD: u32 = 5;
pub const DEFAULT_CYCLE_LIMIT: u32 = 20;
pub const DEFAULT_TIMEOUT_HOURS: f64 = 8.0;

/// Persisted breaker record, co-located with the session it guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    pub schema_version: u32,
    pub state: BreakerState,
    pub triggers: TriggerSet,
    pub history: Vec<TripRecord>,
}

impl PersistedRecord for CircuitBreakerRecord {
    const SCHEMA_VERSION: u32 = BREAKER_SCHEMA_VERSION;

    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

impl Default for CircuitBreakerRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerRecord {
    pub fn new() -> Self {
        Self {
            schema_version: BREAKER_SCHEMA_VERSION,
            state: BreakerState::Closed,
            triggers: TriggerSet {
                same_issue: SameIssueTrigger {
                    count: 0,
                    threshold: DEFAULT_SAME_ISSUE_THRESHOLD,
                    last_hash: None,
                },
                no_progress: NoProgressTrigger {
                    count: 0,
                    threshold: DEFAULT_NO_PROGRESS_THRESHOLD,
                },
                cycle_count: CycleCountTrigger {
                    current: 0,
                    limit: DEFAULT_CYCLE_LIMIT,
                },
                timeout: TimeoutTrigger {
                    started: Utc::now(),
                    limit_hours: DEFAULT_TIMEOUT_HOURS,
                },
            },
            history: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    /// Bump the repeated-identical-issue counter.
    pub fn increment_same_issue(&mut self) {
        self.triggers.same_issue.count += 1;
    }

    /// The finding-set hash changed: restart the streak at 1 and remember
    /// the new hash.
    pub fn reset_same_issue(&mut self, hash: &str) {
        self.triggers.same_issue.count = 1;
        self.triggers.same_issue.last_hash = Some(hash.to_string());
    }

    /// Fold one cycle's finding-set hash into the same-issue streak.
    pub fn record_issue_hash(&mut self, hash: &str) {
        if self.triggers.same_issue.last_hash.as_deref() == Some(hash) {
            self.increment_same_issue();
        } else {
            self.reset_same_issue(hash);
        }
    }

    pub fn increment_no_progress(&mut self) {
        self.triggers.no_progress.count += 1;
    }

    /// A cycle produced file changes: the no-progress streak restarts.
    pub fn record_file_progress(&mut self) {
        self.triggers.no_progress.count = 0;
    }

    pub fn increment_cycle(&mut self) {
        self.triggers.cycle_count.current += 1;
    }

    pub fn same_issue_tripped(&self) -> bool {
        self.triggers.same_issue.count >= self.triggers.same_issue.threshold
    }

    pub fn no_progress_tripped(&self) -> bool {
        self.triggers.no_progress.count >= self.triggers.no_progress.threshold
    }

    pub fn cycle_count_tripped(&self) -> bool {
        self.triggers.cycle_count.current >= self.triggers.cycle_count.limit
    }

    pub fn timeout_tripped(&self, now: DateTime<Utc>) -> bool {
        let limit_secs = (self.triggers.timeout.limit_hours * 3600.0) as i64;
        now.signed_duration_since(self.triggers.timeout.started)
            .num_seconds()
            >= limit_secs
    }

    /// Evaluate the four predicates in their documented order and return
    /// the first that fires.
    pub fn first_tripped(&self, now: DateTime<Utc>) -> Option<TriggerKind> {
        if self.same_issue_tripped() {
            Some(TriggerKind::SameIssue)
        } else if self.no_progress_tripped() {
            Some(TriggerKind::NoProgress)
        } else if self.cycle_count_tripped() {
            Some(TriggerKind::CycleCount)
        } else if self.timeout_tripped(now) {
            Some(TriggerKind::Timeout)
        } else {
            None
        }
    }

    /// Open the breaker and append exactly one history entry.
    pub fn trip(&mut self, trigger: TriggerKind, reason: &str) {
        warn!(%trigger, reason, "circuit breaker tripped");
        self.state = BreakerState::Open;
        self.history.push(TripRecord {
            timestamp: Utc::now(),
            trigger,
            reason: reason.to_string(),
        });
    }

    /// Re-arm: close the breaker, zero every trigger counter and hash, and
    /// restart the wall clock. History is untouched.
    pub fn reset(&mut self) {
        info!("circuit breaker reset");
        self.state = BreakerState::Closed;
        self.triggers.same_issue.count = 0;
        self.triggers.same_issue.last_hash = None;
        self.triggers.no_progress.count = 0;
        self.triggers.cycle_count.current = 0;
        self.triggers.timeout.started = Utc::now();
    }
}

/// Persistence wrapper: every counter mutation is one locked
/// read-transform-write, so parallel writers serialize and no increment
/// is lost.
pub struct CircuitBreaker<S> {
    store: S,
}

impl<S: StateStore<CircuitBreakerRecord>> CircuitBreaker<S> {
    /// Create the persisted record if it does not exist yet and wrap the
    /// store. Losing the creation race to a concurrent opener is fine; the
    /// record they wrote is the same fresh one.
    pub fn open(store: S) -> Result<Self, BridgeError> {
        if !store.exists() {
            match store.init(&CircuitBreakerRecord::new()) {
                Ok(()) | Err(StoreError::AlreadyExists { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Self { store })
    }

    pub fn read(&self) -> Result<CircuitBreakerRecord, BridgeError> {
        Ok(self.store.load()?)
    }

    pub fn increment_cycle(&self) -> Result<(), BridgeError> {
        self.store.update(|r: &mut CircuitBreakerRecord| {
            r.increment_cycle();
            Ok::<(), BridgeError>(())
        })?;
        Ok(())
    }

    pub fn reset(&self) -> Result<(), BridgeError> {
        self.store.update(|r: &mut CircuitBreakerRecord| {
            r.reset();
            Ok::<(), BridgeError>(())
        })?;
        Ok(())
    }

    pub fn trip(&self, trigger: TriggerKind, reason: &str) -> Result<(), BridgeError> {
        self.store.update(|r: &mut CircuitBreakerRecord| {
            r.trip(trigger, reason);
            Ok::<(), BridgeError>(())
        })?;
        Ok(())
    }

    /// Fold one completed cycle into the counters and report the first
    /// trigger that now fires, all under a single lock hold.
    pub fn observe_cycle(
        &self,
        issue_hash: &str,
        made_file_progress: bool,
    ) -> Result<Option<TriggerKind>, BridgeError> {
        let record = self.store.update(|r: &mut CircuitBreakerRecord| {
            r.increment_cycle();
            r.record_issue_hash(issue_hash);
            if made_file_progress {
                r.record_file_progress();
            } else {
                r.increment_no_progress();
            }
            Ok::<(), BridgeError>(())
        })?;
        Ok(record.first_tripped(Utc::now()))
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
