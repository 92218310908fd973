//! LLM relation inference
//!
//! Asks a chat endpoint for a relation type, confidence, and explanation
//! given two entities and their surrounding text. The reply format is
//! line-oriented and parsed tolerantly; anything the parser cannot salvage
//! becomes a typed skip, never a document failure. Out-of-vocabulary
//! relation types are dropped, not coerced.

use scigraph_core::{
    ChatModel, DocumentEntity, GenerationOptions, GraphConfig, LlmError, RelationType,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// A relation proposal produced by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmProposal {
    pub rel_type: RelationType,
    pub confidence: f64,
    pub explanation: String,
}

/// Outcome of one inference call. Skips carry the reason so evidence stays
/// auditable; they are expected, not exceptional.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Proposed(LlmProposal),
    Skipped { reason: String },
}

/// Relation inferrer over a guarded chat endpoint.
pub struct RelationInferrer {
    chat: Arc<dyn ChatModel>,
    config: Arc<GraphConfig>,
}

impl RelationInferrer {
    pub fn new(chat: Arc<dyn ChatModel>, config: Arc<GraphConfig>) -> Self {
        Self { chat, config }
    }

    /// Infer the relation between two entities in context.
    ///
    /// `Ok(Skipped)` covers graceful degradation: local admission refusals,
    /// an open breaker, unparseable or out-of-vocabulary replies. Hard
    /// endpoint faults (timeout, network, API error) surface as `Err` so
    /// the caller can record the document as failed and retry later.
    pub async fn infer(
        &self,
        source: &DocumentEntity,
        target: &DocumentEntity,
        context: &str,
    ) -> Result<InferenceOutcome, LlmError> {
        let prompt = self.build_prompt(source, target, context);
        let opts = GenerationOptions {
            max_tokens: Some(256),
            temperature: Some(0.1),
            stop_sequences: Vec::new(),
        };

        let reply = match self.chat.complete(&prompt, &opts).await {
            Ok(reply) => reply,
            Err(LlmError::AdmissionRejected) => {
                return Ok(InferenceOutcome::Skipped {
                    reason: "rate limiter refused admission".into(),
                })
            }
            Err(LlmError::CircuitOpen) => {
                return Ok(InferenceOutcome::Skipped {
                    reason: "circuit breaker open".into(),
                })
            }
            Err(e) => return Err(e),
        };

        Ok(self.parse_response(&reply))
    }

    fn build_prompt(&self, source: &DocumentEntity, target: &DocumentEntity, context: &str) -> String {
        let vocabulary: Vec<&str> = self
            .config
            .relations
            .iter()
            .filter(|def| def.extractable)
            .map(|def| def.rel_type.as_str())
            .collect();
        format!(
            "Determine the relation between two entities mentioned in a scientific text.\n\
             \n\
             Entity 1: {} (type: {})\n\
             Entity 2: {} (type: {})\n\
             \n\
             Context:\n{}\n\
             \n\
             Allowed relation types: {}\n\
             If none applies, answer NONE.\n\
             \n\
             Respond in exactly this format:\n\
             RELATION_TYPE: <one allowed type or NONE>\n\
             CONFIDENCE: <0.0-1.0>\n\
             EXPLANATION: <one sentence>",
            source.name,
            source.entity_type,
            target.name,
            target.entity_type,
            context,
            vocabulary.join(", "),
        )
    }

    /// Tolerant line-oriented parse. Public for tests.
    pub fn parse_response(&self, reply: &str) -> InferenceOutcome {
        let mut rel_type: Option<&str> = None;
        let mut confidence: Option<f64> = None;
        let mut explanation = String::new();

        for line in reply.lines() {
            let line = line.trim();
            if let Some(rest) = strip_label(line, "RELATION_TYPE:") {
                rel_type = Some(rest);
            } else if let Some(rest) = strip_label(line, "CONFIDENCE:") {
                confidence = rest.parse::<f64>().ok().map(|c| c.clamp(0.0, 1.0));
            } else if let Some(rest) = strip_label(line, "EXPLANATION:") {
                explanation = rest.to_string();
            }
        }

        let Some(raw_type) = rel_type else {
            warn!("LLM reply missing RELATION_TYPE line");
            return InferenceOutcome::Skipped {
                reason: "missing RELATION_TYPE line".into(),
            };
        };
        if raw_type.eq_ignore_ascii_case("none") {
            return InferenceOutcome::Skipped {
                reason: "model answered NONE".into(),
            };
        }
        let Ok(rel_type) = RelationType::from_str(raw_type) else {
            warn!(rel_type = raw_type, "LLM proposed out-of-vocabulary relation");
            return InferenceOutcome::Skipped {
                reason: format!("out-of-vocabulary relation type: {raw_type}"),
            };
        };
        let Some(confidence) = confidence else {
            warn!("LLM reply missing or unparseable CONFIDENCE line");
            return InferenceOutcome::Skipped {
                reason: "missing CONFIDENCE line".into(),
            };
        };

        InferenceOutcome::Proposed(LlmProposal {
            rel_type,
            confidence,
            explanation,
        })
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        Some(line[label.len()..].trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scigraph_core::EntityType;

    struct CannedChat(String);

    #[async_trait]
    impl ChatModel for CannedChat {
        async fn complete(&self, _: &str, _: &GenerationOptions) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    fn inferrer(reply: &str) -> RelationInferrer {
        RelationInferrer::new(
            Arc::new(CannedChat(reply.to_string())),
            Arc::new(GraphConfig::default()),
        )
    }

    fn entities() -> (DocumentEntity, DocumentEntity) {
        (
            DocumentEntity::new("GPT-4", EntityType::AIModel),
            DocumentEntity::new("OpenAI", EntityType::Organization),
        )
    }

    #[tokio::test]
    async fn well_formed_reply_parses() {
        let (s, t) = entities();
        let outcome = inferrer(
            "RELATION_TYPE: DEVELOPED_BY\nCONFIDENCE: 0.92\nEXPLANATION: The text states it.",
        )
        .infer(&s, &t, "GPT-4 was developed by OpenAI.")
        .await
        .unwrap();
        match outcome {
            InferenceOutcome::Proposed(p) => {
                assert_eq!(p.rel_type, RelationType::DevelopedBy);
                assert_eq!(p.confidence, 0.92);
                assert!(p.explanation.contains("states"));
            }
            other => panic!("expected proposal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parse_tolerates_case_and_padding() {
        let i = inferrer("");
        let outcome = i.parse_response(
            "  relation_type:   CITES  \n  confidence: 1.5 \nexplanation: cited throughout",
        );
        match outcome {
            InferenceOutcome::Proposed(p) => {
                assert_eq!(p.rel_type, RelationType::Cites);
                // Confidence is clamped into [0, 1].
                assert_eq!(p.confidence, 1.0);
            }
            other => panic!("expected proposal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_vocabulary_type_is_skipped() {
        let i = inferrer("");
        let outcome =
            i.parse_response("RELATION_TYPE: MARRIED_TO\nCONFIDENCE: 0.9\nEXPLANATION: no");
        assert!(matches!(outcome, InferenceOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn garbage_reply_is_skipped_not_error() {
        let (s, t) = entities();
        let outcome = inferrer("I think they are probably related somehow.")
            .infer(&s, &t, "ctx")
            .await
            .unwrap();
        assert!(matches!(outcome, InferenceOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn none_answer_is_skipped() {
        let i = inferrer("");
        let outcome = i.parse_response("RELATION_TYPE: NONE\nCONFIDENCE: 0.3\nEXPLANATION: -");
        assert!(matches!(outcome, InferenceOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn admission_refusal_degrades_to_skip() {
        struct Refused;
        #[async_trait]
        impl ChatModel for Refused {
            async fn complete(&self, _: &str, _: &GenerationOptions) -> Result<String, LlmError> {
                Err(LlmError::CircuitOpen)
            }
        }
        let (s, t) = entities();
        let i = RelationInferrer::new(Arc::new(Refused), Arc::new(GraphConfig::default()));
        let outcome = i.infer(&s, &t, "ctx").await.unwrap();
        assert!(matches!(outcome, InferenceOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn timeout_propagates_as_error() {
        struct TimedOut;
        #[async_trait]
        impl ChatModel for TimedOut {
            async fn complete(&self, _: &str, _: &GenerationOptions) -> Result<String, LlmError> {
                Err(LlmError::Timeout(30))
            }
        }
        let (s, t) = entities();
        let i = RelationInferrer::new(Arc::new(TimedOut), Arc::new(GraphConfig::default()));
        assert!(i.infer(&s, &t, "ctx").await.is_err());
    }
}
