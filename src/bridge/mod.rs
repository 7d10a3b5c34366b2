//! The durable bridge session: state machine, persisted record, stores,
//! and the runaway-loop circuit breaker.

pub mod breaker;
pub mod machine;
pub mod record;
pub mod state;
pub mod store;

pub use breaker::{
    BreakerState, CircuitBreaker, CircuitBreakerRecord, TriggerKind, BREAKER_SCHEMA_VERSION,
};
pub use machine::BridgeSession;
pub use record::{
    BridgeConfig, BridgebuilderStats, Finalization, FlatlineTracker, IterationRecord,
    IterationState, SessionMetrics, SessionRecord, Timestamps, SCHEMA_VERSION,
};
pub use state::BridgeState;
pub use store::{FileStore, MemoryStore, PersistedRecord, StateStore, StoreError};

/// Bridge-level failures. Every variant names the failed operation's
/// context; there is no catch-all.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Illegal state change. The record is untouched; pick a legal
    /// transition and retry.
    #[error("transition rejected: {from} → {to} is not a legal bridge transition")]
    TransitionRejected { from: BridgeState, to: BridgeState },

    /// `record_findings` for an iteration that was never upserted.
    #[error("iteration {iteration} does not exist; upsert it before recording findings")]
    MissingIteration { iteration: u32 },

    /// A findings-summary document that could not be parsed.
    #[error("findings summary unreadable: {reason}")]
    UnreadableSummary { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
