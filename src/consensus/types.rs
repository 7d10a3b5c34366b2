//! Consensus records — score sets, classified items, skeptic concerns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Consensus bucket for one candidate improvement item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusClass {
    /// Both primary evaluators scored it above the high bar.
    HighConsensus,
    /// Both primary evaluators scored it below the low bar.
    LowValue,
    /// The primaries disagree and no tertiary score settles it.
    Disputed,
    /// Disputed, and the tertiary evaluator has not yet scored it.
    NeedsTertiary,
}

impl std::fmt::Display for ConsensusClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::HighConsensus => "high_consensus",
            Self::LowValue => "low_value",
            Self::Disputed => "disputed",
            Self::NeedsTertiary => "needs_tertiary",
        };
        write!(f, "{}", s)
    }
}

/// One evaluator's scores (0–1000) and evaluation text per item id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluatorScores {
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub evaluations: BTreeMap<String, String>,
}

impl EvaluatorScores {
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// A candidate item after classification. Computed fresh each scoring run;
/// never persisted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusItem {
    pub id: String,
    pub score_a: Option<f64>,
    pub score_b: Option<f64>,
    /// The tertiary evaluator's cross-score, when it scored this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tertiary_score: Option<f64>,
    pub evaluation_texts: Vec<String>,
    pub classification: ConsensusClass,
}

/// A skeptic's critique of a proposed improvement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkepticConcern {
    pub concern: String,
    pub severity_score: f64,
    pub category: String,
}

/// Headline numbers for one scoring run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsensusSummary {
    /// How many score sources actually contributed (2 or 3).
    pub models: u32,
    pub high_consensus_count: usize,
    /// Tertiary-authored items processed.
    pub tertiary_items: usize,
    pub blocker_count: usize,
}

/// Full output of one scoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub items: Vec<ConsensusItem>,
    /// Deduplicated skeptic concerns whose severity cleared the blocker bar.
    pub blockers: Vec<SkepticConcern>,
    pub summary: ConsensusSummary,
}

impl ConsensusReport {
    /// Items in a given bucket.
    pub fn in_class(&self, class: ConsensusClass) -> impl Iterator<Item = &ConsensusItem> {
        self.items.iter().filter(move |i| i.classification == class)
    }
}
