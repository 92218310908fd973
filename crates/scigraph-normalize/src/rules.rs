//! Rule stage: ordered regex rewrites
//!
//! Rules are `(pattern, replacement, priority)` triples applied highest
//! priority first; the first rule that changes the surface wins and yields
//! confidence 1.0. Rules encode known canonical spellings, not guesses.

use regex::Regex;
use scigraph_core::ConfigError;

pub struct NormalizationRule {
    pub pattern: Regex,
    pub replacement: String,
    pub priority: i32,
}

/// Priority-ordered rewrite rules.
pub struct RuleSet {
    rules: Vec<NormalizationRule>,
}

impl RuleSet {
    pub fn new(mut rules: Vec<NormalizationRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// Parse `(pattern, replacement, priority)` triples.
    pub fn from_entries(entries: &[(&str, &str, i32)]) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(entries.len());
        for (pattern, replacement, priority) in entries {
            let regex = Regex::new(pattern)
                .map_err(|e| ConfigError::Parse(format!("rule pattern {pattern:?}: {e}")))?;
            rules.push(NormalizationRule {
                pattern: regex,
                replacement: replacement.to_string(),
                priority: *priority,
            });
        }
        Ok(Self::new(rules))
    }

    /// Built-in rules for well-known model-name spellings.
    pub fn default_rules() -> Self {
        // Compile-time constant patterns; unwrap is safe.
        Self::from_entries(&[
            // Strip wrapping quotes.
            (r#"^["'](.+)["']$"#, "$1", 100),
            // Trailing punctuation from sentence-final mentions.
            (r"^(.+?)[.,;:]$", "$1", 90),
            // Known canonical spellings.
            (r"(?i)^gpt-?(\d+(?:\.\d+)?)$", "GPT-$1", 50),
            (r"(?i)^bert$", "BERT", 50),
            (r"(?i)^t-?5$", "T5", 50),
            (r"(?i)^resnet-?(\d+)$", "ResNet-$1", 50),
        ])
        .expect("built-in rules compile")
    }

    /// Apply the highest-priority matching rule. `None` when no rule
    /// changes the surface.
    pub fn apply(&self, surface: &str) -> Option<String> {
        for rule in &self.rules {
            if rule.pattern.is_match(surface) {
                let rewritten = rule
                    .pattern
                    .replace(surface, rule.replacement.as_str())
                    .into_owned();
                if rewritten != surface {
                    return Some(rewritten);
                }
            }
        }
        None
    }
}
