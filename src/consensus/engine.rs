//! Consensus scoring — cross-model bucket classification and skeptic
//! blocker aggregation.
//!
//! Two primary evaluators score every candidate item on a 0–1000 scale. An
//! optional tertiary evaluator cross-scores primary-authored items (used to
//! break disputes) and authors items of its own, which are classified from
//! the primaries' cross-scores of them. Missing tertiary data degrades to
//! two-model behaviour; it is never an error.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::types::{
    ConsensusClass, ConsensusItem, ConsensusReport, ConsensusSummary, EvaluatorScores,
    SkepticConcern,
};

/// Thresholds and conventions for one scoring run.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    /// Both primaries strictly above this score → high consensus.
    pub high_threshold: f64,
    /// Both primaries at or below this score → low value.
    pub low_threshold: f64,
    /// Surviving skeptic concerns above this severity become blockers.
    pub blocker_threshold: f64,
    /// Item-id prefix marking tertiary-authored items.
    pub tertiary_prefix: String,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self {
            high_threshold: 700.0,
            low_threshold: 400.0,
            blocker_threshold: 700.0,
            tertiary_prefix: "TIMP-".to_string(),
        }
    }
}

impl ConsensusEngine {
    /// Classify every item scored by either primary, fold in tertiary
    /// cross-scores where available, and aggregate skeptic blockers.
    pub fn score(
        &self,
        primary_a: &EvaluatorScores,
        primary_b: &EvaluatorScores,
        tertiary: Option<&EvaluatorScores>,
        skeptic_reports: &[Vec<SkepticConcern>],
    ) -> ConsensusReport {
        // Absent or empty tertiary input means two-model mode.
        let tertiary = tertiary.filter(|t| !t.is_empty());
        let models = if tertiary.is_some() { 3 } else { 2 };

        let ids: BTreeSet<&String> = primary_a
            .scores
            .keys()
            .chain(primary_b.scores.keys())
            .collect();

        let mut items = Vec::with_capacity(ids.len());
        let mut tertiary_items = 0usize;

        for id in ids {
            let score_a = primary_a.scores.get(id).copied();
            let score_b = primary_b.scores.get(id).copied();
            let authored_by_tertiary = id.starts_with(&self.tertiary_prefix);
            if authored_by_tertiary {
                tertiary_items += 1;
            }

            // Tertiary-authored items are judged by the primaries'
            // cross-scores; the tertiary never scores its own item.
            let tertiary_score = if authored_by_tertiary {
                None
            } else {
                tertiary.and_then(|t| t.scores.get(id).copied())
            };

            let base = self.classify_pair(score_a, score_b);
            let classification = match base {
                ConsensusClass::Disputed if !authored_by_tertiary => match tertiary_score {
                    Some(t) if t > self.high_threshold => ConsensusClass::HighConsensus,
                    Some(t) if t <= self.low_threshold => ConsensusClass::LowValue,
                    Some(_) => ConsensusClass::Disputed,
                    None if models == 3 => ConsensusClass::NeedsTertiary,
                    None => ConsensusClass::Disputed,
                },
                other => other,
            };

            debug!(item = %id, ?score_a, ?score_b, %classification, "classified item");

            let mut evaluation_texts = Vec::new();
            if let Some(text) = primary_a.evaluations.get(id) {
                evaluation_texts.push(text.clone());
            }
            if let Some(text) = primary_b.evaluations.get(id) {
                evaluation_texts.push(text.clone());
            }

            items.push(ConsensusItem {
                id: id.clone(),
                score_a,
                score_b,
                tertiary_score,
                evaluation_texts,
                classification,
            });
        }

        let blockers = self.collect_blockers(skeptic_reports);

        let summary = ConsensusSummary {
            models,
            high_consensus_count: items
                .iter()
                .filter(|i| i.classification == ConsensusClass::HighConsensus)
                .count(),
            tertiary_items,
            blocker_count: blockers.len(),
        };
        info!(
            models,
            items = items.len(),
            high = summary.high_consensus_count,
            blockers = summary.blocker_count,
            "consensus run complete"
        );

        ConsensusReport {
            items,
            blockers,
            summary,
        }
    }

    /// Bucket one item from its two primary scores. An item scored by a
    /// single primary can clear neither the both-above nor the both-below
    /// bar, so it is disputed.
    fn classify_pair(&self, a: Option<f64>, b: Option<f64>) -> ConsensusClass {
        match (a, b) {
            (Some(a), Some(b)) if a > self.high_threshold && b > self.high_threshold => {
                ConsensusClass::HighConsensus
            }
            (Some(a), Some(b)) if a <= self.low_threshold && b <= self.low_threshold => {
                ConsensusClass::LowValue
            }
            _ => ConsensusClass::Disputed,
        }
    }

    /// Deduplicate concerns across sources by exact text, keeping the
    /// maximum severity, and return those clearing the blocker bar.
    fn collect_blockers(&self, skeptic_reports: &[Vec<SkepticConcern>]) -> Vec<SkepticConcern> {
        let mut surviving: BTreeMap<String, SkepticConcern> = BTreeMap::new();
        for report in skeptic_reports {
            for concern in report {
                let superseded = surviving
                    .get(&concern.concern)
                    .map(|held| held.severity_score >= concern.severity_score)
                    .unwrap_or(false);
                if !superseded {
                    surviving.insert(concern.concern.clone(), concern.clone());
                }
            }
        }
        surviving
            .into_values()
            .filter(|c| c.severity_score > self.blocker_threshold)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> EvaluatorScores {
        EvaluatorScores {
            scores: pairs
                .iter()
                .map(|(id, s)| (id.to_string(), *s))
                .collect(),
            evaluations: BTreeMap::new(),
        }
    }

    fn concern(text: &str, severity: f64) -> SkepticConcern {
        SkepticConcern {
            concern: text.to_string(),
            severity_score: severity,
            category: "feasibility".to_string(),
        }
    }

    fn class_of(report: &ConsensusReport, id: &str) -> ConsensusClass {
        report
            .items
            .iter()
            .find(|i| i.id == id)
            .unwrap()
            .classification
    }

    #[test]
    fn test_two_model_buckets() {
        let engine = ConsensusEngine::default();
        let a = scores(&[("IMP-1", 850.0), ("IMP-2", 400.0), ("IMP-3", 900.0)]);
        let b = scores(&[("IMP-1", 800.0), ("IMP-2", 350.0), ("IMP-3", 200.0)]);
        let report = engine.score(&a, &b, None, &[]);

        assert_eq!(class_of(&report, "IMP-1"), ConsensusClass::HighConsensus);
        assert_eq!(class_of(&report, "IMP-2"), ConsensusClass::LowValue);
        assert_eq!(class_of(&report, "IMP-3"), ConsensusClass::Disputed);
        assert_eq!(report.summary.models, 2);
        assert_eq!(report.summary.high_consensus_count, 1);
    }

    #[test]
    fn test_bucket_boundaries() {
        let engine = ConsensusEngine::default();
        // 700/700 does not exceed the high bar; 401 sits above the low bar.
        let a = scores(&[("IMP-1", 700.0), ("IMP-2", 401.0)]);
        let b = scores(&[("IMP-1", 700.0), ("IMP-2", 350.0)]);
        let report = engine.score(&a, &b, None, &[]);
        assert_eq!(class_of(&report, "IMP-1"), ConsensusClass::Disputed);
        assert_eq!(class_of(&report, "IMP-2"), ConsensusClass::Disputed);
    }

    #[test]
    fn test_tertiary_authored_item_uses_primary_cross_scores() {
        let engine = ConsensusEngine::default();
        let a = scores(&[("TIMP-1", 900.0)]);
        let b = scores(&[("TIMP-1", 850.0)]);
        let t = scores(&[("irrelevant", 100.0)]);
        let report = engine.score(&a, &b, Some(&t), &[]);

        assert_eq!(class_of(&report, "TIMP-1"), ConsensusClass::HighConsensus);
        assert_eq!(report.summary.tertiary_items, 1);
        assert_eq!(report.summary.models, 3);
        // A tertiary never scores its own item.
        assert!(report.items[0].tertiary_score.is_none());
    }

    #[test]
    fn test_tertiary_breaks_dispute() {
        let engine = ConsensusEngine::default();
        let a = scores(&[("IMP-1", 900.0), ("IMP-2", 900.0)]);
        let b = scores(&[("IMP-1", 300.0), ("IMP-2", 300.0)]);
        let t = scores(&[("IMP-1", 850.0), ("IMP-2", 200.0)]);
        let report = engine.score(&a, &b, Some(&t), &[]);

        assert_eq!(class_of(&report, "IMP-1"), ConsensusClass::HighConsensus);
        assert_eq!(class_of(&report, "IMP-2"), ConsensusClass::LowValue);
    }

    #[test]
    fn test_unscored_dispute_needs_tertiary_in_three_model_mode() {
        let engine = ConsensusEngine::default();
        let a = scores(&[("IMP-1", 900.0)]);
        let b = scores(&[("IMP-1", 300.0)]);
        let t = scores(&[("IMP-other", 500.0)]);
        let report = engine.score(&a, &b, Some(&t), &[]);
        assert_eq!(class_of(&report, "IMP-1"), ConsensusClass::NeedsTertiary);
    }

    #[test]
    fn test_tertiary_does_not_alter_settled_buckets() {
        let engine = ConsensusEngine::default();
        let a = scores(&[("IMP-1", 900.0)]);
        let b = scores(&[("IMP-1", 800.0)]);
        // Tertiary hates it; both primaries already agree.
        let t = scores(&[("IMP-1", 100.0)]);
        let report = engine.score(&a, &b, Some(&t), &[]);
        assert_eq!(class_of(&report, "IMP-1"), ConsensusClass::HighConsensus);
        assert_eq!(report.items[0].tertiary_score, Some(100.0));
    }

    #[test]
    fn test_empty_tertiary_degrades_to_two_model() {
        let engine = ConsensusEngine::default();
        let a = scores(&[("IMP-1", 900.0)]);
        let b = scores(&[("IMP-1", 300.0)]);
        let t = EvaluatorScores::default();
        let report = engine.score(&a, &b, Some(&t), &[]);
        assert_eq!(report.summary.models, 2);
        assert_eq!(class_of(&report, "IMP-1"), ConsensusClass::Disputed);
    }

    #[test]
    fn test_single_source_item_is_disputed() {
        let engine = ConsensusEngine::default();
        let a = scores(&[("IMP-1", 950.0)]);
        let b = scores(&[]);
        let report = engine.score(&a, &b, None, &[]);
        assert_eq!(class_of(&report, "IMP-1"), ConsensusClass::Disputed);
    }

    #[test]
    fn test_skeptic_dedup_keeps_max_severity() {
        let engine = ConsensusEngine::default();
        let reports = vec![
            vec![concern("migration breaks replicas", 650.0)],
            vec![
                concern("migration breaks replicas", 900.0),
                concern("adds a new runtime dependency", 300.0),
            ],
        ];
        let report = engine.score(
            &scores(&[("IMP-1", 800.0)]),
            &scores(&[("IMP-1", 800.0)]),
            None,
            &reports,
        );

        assert_eq!(report.blockers.len(), 1);
        assert_eq!(report.blockers[0].concern, "migration breaks replicas");
        assert!((report.blockers[0].severity_score - 900.0).abs() < f64::EPSILON);
        assert_eq!(report.summary.blocker_count, 1);
    }

    #[test]
    fn test_blocker_bar_is_strict() {
        let engine = ConsensusEngine::default();
        let reports = vec![vec![concern("borderline", 700.0)]];
        let report = engine.score(
            &scores(&[]),
            &scores(&[]),
            None,
            &reports,
        );
        assert!(report.blockers.is_empty());
    }

    #[test]
    fn test_evaluation_texts_gathered_in_order() {
        let engine = ConsensusEngine::default();
        let mut a = scores(&[("IMP-1", 800.0)]);
        a.evaluations
            .insert("IMP-1".to_string(), "solid win".to_string());
        let mut b = scores(&[("IMP-1", 750.0)]);
        b.evaluations
            .insert("IMP-1".to_string(), "agree, cheap to land".to_string());
        let report = engine.score(&a, &b, None, &[]);
        assert_eq!(
            report.items[0].evaluation_texts,
            vec!["solid win".to_string(), "agree, cheap to land".to_string()]
        );
    }
}
