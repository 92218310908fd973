//! Relation scoring: weighted evidence fusion and triage
//!
//! The final confidence is the weighted sum of four component scores
//! (co-occurrence, LLM, source reliability, graph consistency). The weights
//! come from the validated configuration snapshot, so by the time a scorer
//! exists they sum to 1.0.

use scigraph_core::{GraphConfig, Relation, ReviewStatus, ScoreComponents};
use std::sync::Arc;

pub struct RelationScorer {
    config: Arc<GraphConfig>,
}

impl RelationScorer {
    pub fn new(config: Arc<GraphConfig>) -> Self {
        Self { config }
    }

    /// Weighted fusion of the four components.
    pub fn fuse(&self, components: &ScoreComponents) -> f64 {
        let w = self.config.weights;
        w.cooccurrence * components.cooccurrence
            + w.llm * components.llm
            + w.source_reliability * components.source_reliability
            + w.graph_consistency * components.graph_consistency
    }

    /// Route a confidence to its triage outcome.
    pub fn triage(&self, confidence: f64) -> ReviewStatus {
        let t = self.config.triage;
        if confidence >= t.auto_approve {
            ReviewStatus::Approved
        } else if confidence >= t.review {
            ReviewStatus::Pending
        } else {
            ReviewStatus::Rejected
        }
    }

    /// Score a relation in place: set its fused confidence and status from
    /// its components.
    pub fn score(&self, relation: &mut Relation) {
        relation.confidence = self.fuse(&relation.score_components);
        relation.review_status = self.triage(relation.confidence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn scorer() -> RelationScorer {
        RelationScorer::new(Arc::new(GraphConfig::default()))
    }

    #[test]
    fn fusion_matches_weighted_sum() {
        let s = scorer();
        let components = ScoreComponents {
            cooccurrence: 0.8,
            llm: 0.9,
            source_reliability: 0.7,
            graph_consistency: 0.5,
        };
        let expected = 0.3 * 0.8 + 0.3 * 0.9 + 0.2 * 0.7 + 0.2 * 0.5;
        assert_relative_eq!(s.fuse(&components), expected, epsilon = 1e-6);
    }

    #[test]
    fn triage_boundaries() {
        let s = scorer();
        assert_eq!(s.triage(0.7), ReviewStatus::Approved);
        assert_eq!(s.triage(0.69), ReviewStatus::Pending);
        assert_eq!(s.triage(0.5), ReviewStatus::Pending);
        assert_eq!(s.triage(0.49), ReviewStatus::Rejected);
    }

    proptest! {
        /// The fused confidence always reconstructs from the stored
        /// components, and the assigned status is consistent with the
        /// thresholds.
        #[test]
        fn fused_confidence_reconstructs(
            c in 0.0f64..=1.0,
            l in 0.0f64..=1.0,
            r in 0.0f64..=1.0,
            g in 0.0f64..=1.0,
        ) {
            let s = scorer();
            let components = ScoreComponents {
                cooccurrence: c,
                llm: l,
                source_reliability: r,
                graph_consistency: g,
            };
            let fused = s.fuse(&components);
            let weights = [0.3, 0.3, 0.2, 0.2];
            let manual: f64 = weights
                .iter()
                .zip(components.as_array())
                .map(|(w, s)| w * s)
                .sum();
            prop_assert!((fused - manual).abs() < 1e-6);
            prop_assert!((0.0..=1.0).contains(&fused));

            let status = s.triage(fused);
            if fused >= 0.7 {
                prop_assert_eq!(status, ReviewStatus::Approved);
            } else if fused >= 0.5 {
                prop_assert_eq!(status, ReviewStatus::Pending);
            } else {
                prop_assert_eq!(status, ReviewStatus::Rejected);
            }
        }
    }
}
