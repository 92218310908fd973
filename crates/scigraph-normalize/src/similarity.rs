//! Similarity stage: surface-form distance against known canonical names
//!
//! Scoring tiers:
//! - exact match → 1.0
//! - equal after folding (lowercase, alphanumeric only) → 0.92; the surface
//!   differs only in case, spacing, or punctuation
//! - otherwise normalized Levenshtein similarity over the folded forms

use std::cmp::Ordering;

/// Score for folded-equal surfaces (punctuation/case variants).
const FOLDED_MATCH_SCORE: f64 = 0.92;

/// A ranked normalization candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub canonical_id: String,
    pub canonical_name: String,
    pub similarity: f64,
}

/// Lowercase and drop every non-alphanumeric character.
fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Similarity between a surface and a canonical name.
pub fn surface_similarity(surface: &str, canonical: &str) -> f64 {
    if surface == canonical {
        return 1.0;
    }
    let folded_surface = fold(surface);
    let folded_canonical = fold(canonical);
    if folded_surface.is_empty() || folded_canonical.is_empty() {
        return 0.0;
    }
    if folded_surface == folded_canonical {
        return FOLDED_MATCH_SCORE;
    }
    levenshtein_similarity(&folded_surface, &folded_canonical)
}

fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let distance = levenshtein(a, b);
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - distance as f64 / max_len as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Rank candidates by descending similarity, ties broken by name for
/// determinism.
pub fn rank_candidates(surface: &str, candidates: &[(String, String)]) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = candidates
        .iter()
        .map(|(id, name)| Candidate {
            canonical_id: id.clone(),
            canonical_name: name.clone(),
            similarity: surface_similarity(surface, name),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.canonical_name.cmp(&b.canonical_name))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exact_match_is_one() {
        assert_eq!(surface_similarity("GPT-4", "GPT-4"), 1.0);
    }

    #[test]
    fn punctuation_variant_scores_folded_match() {
        assert_relative_eq!(surface_similarity("GPT 4", "GPT-4"), 0.92);
        assert_relative_eq!(surface_similarity("gpt-4", "GPT-4"), 0.92);
        assert_relative_eq!(surface_similarity("G.P.T.4", "GPT-4"), 0.92);
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(surface_similarity("BERT", "GPT-4") < 0.5);
    }

    #[test]
    fn close_misspelling_scores_between() {
        let s = surface_similarity("Tranformer", "Transformer");
        assert!(s > 0.8 && s < 1.0);
    }

    #[test]
    fn ranking_is_deterministic() {
        let candidates = vec![
            ("gpt-4".to_string(), "GPT-4".to_string()),
            ("gpt-3".to_string(), "GPT-3".to_string()),
            ("bert".to_string(), "BERT".to_string()),
        ];
        let ranked = rank_candidates("GPT 4", &candidates);
        assert_eq!(ranked[0].canonical_name, "GPT-4");
        assert_relative_eq!(ranked[0].similarity, 0.92);
        assert!(ranked[0].similarity > ranked[1].similarity);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
    }
}
