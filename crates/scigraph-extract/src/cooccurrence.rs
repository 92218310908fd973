//! Co-occurrence analysis at document, paragraph, and sentence scope
//!
//! Given a document with a pre-tagged entity list, emit pair records for
//! entities observed in the same segment. When no entities are supplied a
//! conservative surface-form recognizer runs instead (capitalized phrases
//! and all-caps acronyms, minus a closed stopword set).
//!
//! Sentence segmentation may mis-split on abbreviations; document scope is
//! the always-valid fallback, so a bad split can only lose specificity,
//! never invent a pair.

use crate::RelationProposal;
use regex::Regex;
use scigraph_core::{
    CooccurrenceLevel, CooccurrencePair, Document, DocumentEntity, EntityType, ExtractionMethod,
    GraphConfig,
};
use std::collections::{btree_map, BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Count divisor at which raw confidence saturates.
const COUNT_SATURATION: f64 = 5.0;

/// Structural words excluded by the fallback recognizer.
const RECOGNIZER_STOPWORDS: &[&str] = &[
    "The", "This", "That", "These", "Those", "A", "An", "It", "We", "They", "In", "On", "At",
    "For", "With", "From", "However", "Therefore", "Moreover", "Furthermore", "Although", "While",
    "When", "Where", "Our", "Its", "Their", "As", "By", "To", "Of", "And", "Or", "But", "Not",
    "Is", "Are", "Was", "Were", "Section", "Figure", "Table", "Equation", "Appendix",
];

/// Scope-aware co-occurrence analyzer.
pub struct CooccurrenceAnalyzer {
    config: Arc<GraphConfig>,
    scopes: Vec<CooccurrenceLevel>,
    acronym: Regex,
    cap_phrase: Regex,
}

impl CooccurrenceAnalyzer {
    pub fn new(config: Arc<GraphConfig>) -> Self {
        Self {
            config,
            scopes: vec![
                CooccurrenceLevel::Document,
                CooccurrenceLevel::Paragraph,
                CooccurrenceLevel::Sentence,
            ],
            // Acronyms: >= 2 consecutive capitals, optionally with digits
            // (BERT, GPT4, T5 is too short on letters but GPT-4 splits).
            acronym: Regex::new(r"\b[A-Z][A-Z0-9]+\b").unwrap(),
            // Capitalized phrases: one or more capitalized words, allowing
            // internal hyphens and digits (Attention Is All You Need is
            // over-split; the stopword list trims the damage).
            cap_phrase: Regex::new(r"\b[A-Z][a-zA-Z0-9]*(?:[-\s][A-Z][a-zA-Z0-9]*)*\b").unwrap(),
        }
    }

    /// Restrict the analyzed scopes; default is all three.
    pub fn with_scopes(mut self, scopes: Vec<CooccurrenceLevel>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Analyze one document, producing deduplicated pair records with the
    /// most specific observed level.
    pub fn analyze(&self, doc: &Document) -> Vec<CooccurrencePair> {
        let entities = self.entities_for(doc);
        self.analyze_with_entities(doc, &entities)
    }

    /// Batch mode: aggregate counts across documents.
    pub fn analyze_batch(&self, docs: &[Document]) -> Vec<CooccurrencePair> {
        let mut merged: BTreeMap<(String, String), CooccurrencePair> = BTreeMap::new();
        for doc in docs {
            for pair in self.analyze(doc) {
                let key = (pair.source_id.clone(), pair.target_id.clone());
                match merged.entry(key) {
                    btree_map::Entry::Occupied(mut occupied) => {
                        let existing = occupied.get_mut();
                        existing.count += pair.count;
                        for id in pair.document_ids {
                            if !existing.document_ids.contains(&id) {
                                existing.document_ids.push(id);
                            }
                        }
                        if pair.level.specificity() > existing.level.specificity() {
                            existing.level = pair.level;
                        }
                    }
                    btree_map::Entry::Vacant(vacant) => {
                        vacant.insert(pair);
                    }
                }
            }
        }
        merged.into_values().collect()
    }

    /// Distinct pairs observed at exactly one scope. Exposed so callers can
    /// check the containment property (sentence ⊆ paragraph ⊆ document).
    pub fn pairs_at_scope(
        &self,
        doc: &Document,
        level: CooccurrenceLevel,
    ) -> HashSet<(String, String)> {
        let entities = self.entities_for(doc);
        let mut pairs = HashSet::new();
        for segment in self.segments(&doc.content, level) {
            let present = entities_in_segment(&segment, &entities);
            for (a, b) in unordered_pairs(&present) {
                pairs.insert((a, b));
            }
        }
        pairs
    }

    /// Raw confidence for a pair: saturating count scaled by the level
    /// factor.
    pub fn raw_confidence(pair: &CooccurrencePair) -> f64 {
        (pair.count as f64 / COUNT_SATURATION).min(1.0) * pair.level.factor()
    }

    /// Turn pairs into relation proposals using the entity-type seeding
    /// table. Co-occurrence alone is type-agnostic; the seeded type is a
    /// proposal, not ground truth.
    pub fn propose(
        &self,
        pairs: &[CooccurrencePair],
        entity_types: &HashMap<String, EntityType>,
        document_id: &str,
    ) -> Vec<RelationProposal> {
        pairs
            .iter()
            .map(|pair| {
                let source_type = entity_types
                    .get(&pair.source_id)
                    .copied()
                    .unwrap_or(EntityType::Concept);
                let target_type = entity_types
                    .get(&pair.target_id)
                    .copied()
                    .unwrap_or(EntityType::Concept);
                RelationProposal {
                    source_id: pair.source_id.clone(),
                    target_id: pair.target_id.clone(),
                    rel_type: self.config.seed_relation(source_type, target_type),
                    raw_confidence: Self::raw_confidence(pair),
                    method: ExtractionMethod::Cooccurrence,
                    document_id: document_id.to_string(),
                    context_snippet: format!(
                        "co-occurred {} time(s) at {} scope",
                        pair.count,
                        level_name(pair.level)
                    ),
                }
            })
            .collect()
    }

    /// Analyze with a caller-supplied entity list (the orchestrator passes
    /// either the pre-tagged list or the recognizer's output).
    pub fn analyze_with_entities(
        &self,
        doc: &Document,
        entities: &[DocumentEntity],
    ) -> Vec<CooccurrencePair> {
        if entities.len() < 2 {
            return Vec::new();
        }

        let mut merged: BTreeMap<(String, String), (usize, CooccurrenceLevel)> = BTreeMap::new();
        for &level in &self.scopes {
            for segment in self.segments(&doc.content, level) {
                let present = entities_in_segment(&segment, entities);
                for key in unordered_pairs(&present) {
                    let entry = merged.entry(key).or_insert((0, level));
                    entry.0 += 1;
                    if level.specificity() > entry.1.specificity() {
                        entry.1 = level;
                    }
                }
            }
        }

        merged
            .into_iter()
            .map(|((source_id, target_id), (count, level))| CooccurrencePair {
                source_id,
                target_id,
                count,
                document_ids: vec![doc.id.clone()],
                level,
            })
            .collect()
    }

    fn entities_for(&self, doc: &Document) -> Vec<DocumentEntity> {
        if !doc.entities.is_empty() {
            return doc.entities.clone();
        }
        self.recognize_entities(&doc.content)
    }

    /// Conservative fallback recognizer: all-caps acronyms and capitalized
    /// phrases, typed as `Concept`.
    pub fn recognize_entities(&self, text: &str) -> Vec<DocumentEntity> {
        let stopwords: HashSet<&str> = RECOGNIZER_STOPWORDS.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut entities = Vec::new();

        for m in self.acronym.find_iter(text) {
            let surface = m.as_str();
            if surface.len() >= 2 && !stopwords.contains(surface) && seen.insert(surface.to_string())
            {
                entities.push(DocumentEntity::new(surface, EntityType::Concept));
            }
        }
        for m in self.cap_phrase.find_iter(text) {
            // Strip structural lead-ins ("The BERT model" starts a sentence,
            // "The" is not part of the name).
            let words: Vec<&str> = m.as_str().split_whitespace().collect();
            let keep_from = words
                .iter()
                .position(|w| !stopwords.contains(w))
                .unwrap_or(words.len());
            let surface = words[keep_from..].join(" ");
            if surface.len() < 2 {
                continue;
            }
            if seen.insert(surface.clone()) {
                entities.push(DocumentEntity::new(surface, EntityType::Concept));
            }
        }
        entities
    }

    fn segments(&self, content: &str, level: CooccurrenceLevel) -> Vec<String> {
        match level {
            CooccurrenceLevel::Document => vec![content.to_string()],
            CooccurrenceLevel::Paragraph => content
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            CooccurrenceLevel::Sentence => split_sentences(content),
        }
    }
}

fn level_name(level: CooccurrenceLevel) -> &'static str {
    match level {
        CooccurrenceLevel::Document => "document",
        CooccurrenceLevel::Paragraph => "paragraph",
        CooccurrenceLevel::Sentence => "sentence",
    }
}

/// Sentence boundaries: terminator followed by whitespace. Known weakness:
/// abbreviations split early, which only degrades scope specificity.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            let at_end = i + 1 >= bytes.len();
            if at_end || bytes[i + 1].is_ascii_whitespace() {
                let sentence = text[start..=i].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = i + 1;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn entities_in_segment(segment: &str, entities: &[DocumentEntity]) -> Vec<DocumentEntity> {
    let lower = segment.to_lowercase();
    entities
        .iter()
        .filter(|e| lower.contains(&e.name.to_lowercase()))
        .cloned()
        .collect()
}

/// Every unordered pair of distinct present entities, normalized to
/// lexicographic id order so `(a, b)` and `(b, a)` collapse.
fn unordered_pairs(present: &[DocumentEntity]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for i in 0..present.len() {
        for j in (i + 1)..present.len() {
            let a = present[i].stable_id();
            let b = present[j].stable_id();
            if a == b {
                continue;
            }
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            pairs.push((lo.to_string(), hi.to_string()));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, entities: &[(&str, EntityType)]) -> Document {
        Document {
            id: "doc-1".into(),
            title: "t".into(),
            content: content.into(),
            source: "test".into(),
            published_at: None,
            entities: entities
                .iter()
                .map(|(name, t)| DocumentEntity::new(*name, *t))
                .collect(),
        }
    }

    fn analyzer() -> CooccurrenceAnalyzer {
        CooccurrenceAnalyzer::new(Arc::new(GraphConfig::default()))
    }

    #[test]
    fn sentence_scope_wins_over_document() {
        let d = doc(
            "GPT-4 was developed by OpenAI. It is large.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        );
        let pairs = analyzer().analyze(&d);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].level, CooccurrenceLevel::Sentence);
        // One event per scope: document + paragraph + sentence.
        assert_eq!(pairs[0].count, 3);
    }

    #[test]
    fn document_only_cooccurrence_keeps_document_level() {
        let d = doc(
            "GPT-4 is discussed first.\n\nOpenAI is discussed later.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
            ],
        );
        let pairs = analyzer().analyze(&d);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].level, CooccurrenceLevel::Document);
        assert_eq!(pairs[0].count, 1);
    }

    #[test]
    fn single_entity_produces_no_pairs() {
        let d = doc("GPT-4 is everything here.", &[("GPT-4", EntityType::AIModel)]);
        assert!(analyzer().analyze(&d).is_empty());
    }

    #[test]
    fn empty_document_produces_no_pairs() {
        let d = doc("", &[]);
        assert!(analyzer().analyze(&d).is_empty());
    }

    #[test]
    fn finer_scope_pairs_are_contained_in_coarser() {
        let a = analyzer();
        let d = doc(
            "GPT-4 uses the Transformer. OpenAI built it.\n\nThe Transformer influenced BERT.",
            &[
                ("GPT-4", EntityType::AIModel),
                ("OpenAI", EntityType::Organization),
                ("Transformer", EntityType::Architecture),
                ("BERT", EntityType::AIModel),
            ],
        );
        let sentence = a.pairs_at_scope(&d, CooccurrenceLevel::Sentence);
        let paragraph = a.pairs_at_scope(&d, CooccurrenceLevel::Paragraph);
        let document = a.pairs_at_scope(&d, CooccurrenceLevel::Document);
        assert!(sentence.is_subset(&paragraph));
        assert!(paragraph.is_subset(&document));
    }

    #[test]
    fn confidence_saturates_at_five_counts() {
        let pair = CooccurrencePair {
            source_id: "a".into(),
            target_id: "b".into(),
            count: 50,
            document_ids: vec![],
            level: CooccurrenceLevel::Sentence,
        };
        assert_eq!(CooccurrenceAnalyzer::raw_confidence(&pair), 1.0);

        let weak = CooccurrencePair {
            count: 1,
            level: CooccurrenceLevel::Document,
            ..pair
        };
        let expected = (1.0f64 / 5.0) * 0.6;
        assert!((CooccurrenceAnalyzer::raw_confidence(&weak) - expected).abs() < 1e-9);
    }

    #[test]
    fn proposals_use_type_seeding_table() {
        let a = analyzer();
        let mut types = HashMap::new();
        types.insert("GPT-4".to_string(), EntityType::AIModel);
        types.insert("OpenAI".to_string(), EntityType::Organization);
        let pairs = vec![CooccurrencePair {
            source_id: "GPT-4".into(),
            target_id: "OpenAI".into(),
            count: 2,
            document_ids: vec!["doc-1".into()],
            level: CooccurrenceLevel::Sentence,
        }];
        let proposals = a.propose(&pairs, &types, "doc-1");
        assert_eq!(proposals[0].rel_type, scigraph_core::RelationType::DevelopedBy);

        // Unknown pairs fall back to CITES.
        let mut unknown = HashMap::new();
        unknown.insert("X".to_string(), EntityType::Concept);
        unknown.insert("Y".to_string(), EntityType::Concept);
        let fallback = a.propose(
            &[CooccurrencePair {
                source_id: "X".into(),
                target_id: "Y".into(),
                count: 1,
                document_ids: vec![],
                level: CooccurrenceLevel::Document,
            }],
            &unknown,
            "doc-1",
        );
        assert_eq!(fallback[0].rel_type, scigraph_core::RelationType::Cites);
    }

    #[test]
    fn recognizer_finds_acronyms_and_capitalized_phrases() {
        let a = analyzer();
        let entities = a.recognize_entities(
            "The BERT model from Google Research outperforms earlier baselines.",
        );
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"BERT"));
        assert!(names.contains(&"Google Research"));
        assert!(!names.contains(&"The"));
    }

    #[test]
    fn batch_aggregates_counts_across_documents() {
        let a = analyzer();
        let entities = [
            ("GPT-4", EntityType::AIModel),
            ("OpenAI", EntityType::Organization),
        ];
        let d1 = doc("GPT-4 was developed by OpenAI.", &entities);
        let d2 = Document {
            id: "doc-2".into(),
            ..doc("OpenAI released GPT-4 in 2023.", &entities)
        };
        let pairs = a.analyze_batch(&[d1, d2]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].document_ids.len(), 2);
        assert_eq!(pairs[0].count, 6);
    }
}
