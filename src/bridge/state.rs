//! Bridge session lifecycle — states and the legal transition table.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeState {
    /// Session created; environment checks not yet passed.
    Preflight,
    /// Connected to the review target, about to iterate.
    JackIn,
    /// Running review iterations (self-loops once per iteration).
    Iterating,
    /// Wrapping up: ground truth, RTFM gate, PR.
    Finalizing,
    /// Clean exit. Terminal.
    JackedOut,
    /// Stopped early; resumable back into iteration.
    Halted,
}

impl BridgeState {
    /// Legal next states. Everything absent from this table is rejected.
    pub fn valid_transitions(self) -> &'static [BridgeState] {
        match self {
            Self::Preflight => &[Self::JackIn],
            Self::JackIn => &[Self::Iterating, Self::Halted],
            Self::Iterating => &[Self::Iterating, Self::Finalizing, Self::Halted],
            Self::Finalizing => &[Self::JackedOut, Self::Halted],
            Self::Halted => &[Self::Iterating, Self::JackedOut],
            Self::JackedOut => &[],
        }
    }

    /// Whether `next` is a legal transition from this state.
    pub fn can_transition_to(self, next: BridgeState) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Whether no transition leaves this state.
    pub fn is_terminal(self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// All states, for exhaustive transition-matrix tests.
    pub fn all() -> &'static [BridgeState] {
        &[
            Self::Preflight,
            Self::JackIn,
            Self::Iterating,
            Self::Finalizing,
            Self::JackedOut,
            Self::Halted,
        ]
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Preflight => "PREFLIGHT",
            Self::JackIn => "JACK_IN",
            Self::Iterating => "ITERATING",
            Self::Finalizing => "FINALIZING",
            Self::JackedOut => "JACKED_OUT",
            Self::Halted => "HALTED",
        };
        write!(f, "{}", s)
    }
}
