//! Adversarial review bridge
//!
//! This library coordinates a multi-round, multi-model adversarial review
//! loop:
//! - A durable **bridge session** state machine with a persisted,
//!   schema-versioned record (`PREFLIGHT` → `JACK_IN` → `ITERATING` → …)
//! - A four-trigger **circuit breaker** guarding against runaway loops
//! - A **finding pipeline** (classify → validate → anchor-resolve → merge)
//!   with content-addressed deduplication across models
//! - A **consensus scoring engine** bucketing improvement items from two
//!   primary evaluators, with optional tertiary tie-breaking and skeptic
//!   blocker aggregation
//! - A thin **orchestration driver** wiring the above to an opaque
//!   `ModelCaller` capability
//!
//! Model invocation, git/PR plumbing, and report rendering live outside
//! this crate; they consume the contracts exposed here.

pub mod bridge;
pub mod consensus;
pub mod driver;
pub mod findings;
pub mod model;

// Re-export key bridge types
pub use bridge::{
    BridgeConfig, BridgeError, BridgeSession, BridgeState, CircuitBreaker, CircuitBreakerRecord,
    FileStore, IterationRecord, IterationState, MemoryStore, SessionRecord, StateStore,
    StoreError, TriggerKind,
};

// Re-export the finding pipeline surface
pub use findings::{
    compute_finding_id, merge_findings, process_findings, AnchorStability, AnchorStatus, Category,
    ClassifiedResponse, Finding, FindingsSummary, ResponseStatus, ReviewType, Severity,
};

// Re-export consensus scoring
pub use consensus::{
    ConsensusClass, ConsensusEngine, ConsensusItem, ConsensusReport, ConsensusSummary,
    EvaluatorScores, SkepticConcern,
};

// Re-export the model boundary and driver
pub use driver::{DriverConfig, IterationReport, NextStep, OrchestrationDriver};
pub use model::{
    call_wave, ChangeSetProvider, ModelCaller, ModelFailure, ModelResponse, StaticChangeSet,
    WaveRequest,
};
