//! Alias table: surface → canonical mappings with conflict policy
//!
//! `surface` is unique. An upsert for an existing surface keeps the
//! higher-confidence entry; on a tie the earlier registration wins. Rows
//! are never implicitly deleted. Upserts serialize through one short
//! critical section, which also serializes per surface key.

use chrono::Utc;
use parking_lot::RwLock;
use scigraph_core::{Alias, AliasSource};
use std::collections::HashMap;
use tracing::debug;

/// Outcome of one alias upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    KeptExisting,
}

#[derive(Default)]
pub struct AliasTable {
    rows: RwLock<HashMap<String, Alias>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, surface: &str) -> Option<Alias> {
        self.rows.read().get(surface).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// All rows, sorted by surface for deterministic iteration.
    pub fn all(&self) -> Vec<Alias> {
        let mut rows: Vec<Alias> = self.rows.read().values().cloned().collect();
        rows.sort_by(|a, b| a.surface.cmp(&b.surface));
        rows
    }

    /// Canonical ids and names known to the table (for candidate lists).
    pub fn canonicals(&self) -> Vec<String> {
        let mut canonicals: Vec<String> = self
            .rows
            .read()
            .values()
            .map(|a| a.canonical.clone())
            .collect();
        canonicals.sort();
        canonicals.dedup();
        canonicals
    }

    pub fn register(
        &self,
        surface: &str,
        canonical: &str,
        confidence: f64,
        source: AliasSource,
    ) -> UpsertOutcome {
        let mut rows = self.rows.write();
        // Conflict policy: higher confidence wins, ties keep the earlier
        // registration.
        let outcome = match rows.get(surface) {
            Some(existing) if confidence > existing.confidence => {
                debug!(
                    surface = surface,
                    old = %existing.canonical,
                    new = canonical,
                    "alias replaced by higher-confidence source"
                );
                UpsertOutcome::Replaced
            }
            Some(_) => UpsertOutcome::KeptExisting,
            None => UpsertOutcome::Inserted,
        };
        if outcome != UpsertOutcome::KeptExisting {
            rows.insert(
                surface.to_string(),
                Alias {
                    surface: surface.to_string(),
                    canonical: canonical.to_string(),
                    confidence,
                    source,
                    created_at: Utc::now(),
                },
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup() {
        let table = AliasTable::new();
        assert_eq!(
            table.register("GPT 4", "GPT-4", 0.92, AliasSource::Similarity),
            UpsertOutcome::Inserted
        );
        let alias = table.lookup("GPT 4").unwrap();
        assert_eq!(alias.canonical, "GPT-4");
        assert_eq!(alias.source, AliasSource::Similarity);
    }

    #[test]
    fn higher_confidence_replaces() {
        let table = AliasTable::new();
        table.register("GPT 4", "GPT-3", 0.6, AliasSource::Similarity);
        assert_eq!(
            table.register("GPT 4", "GPT-4", 0.95, AliasSource::Manual),
            UpsertOutcome::Replaced
        );
        assert_eq!(table.lookup("GPT 4").unwrap().canonical, "GPT-4");
    }

    #[test]
    fn tie_keeps_earlier() {
        let table = AliasTable::new();
        table.register("GPT 4", "GPT-4", 0.9, AliasSource::Similarity);
        assert_eq!(
            table.register("GPT 4", "GPT-3", 0.9, AliasSource::Llm),
            UpsertOutcome::KeptExisting
        );
        assert_eq!(table.lookup("GPT 4").unwrap().canonical, "GPT-4");
    }

    #[test]
    fn lower_confidence_never_replaces() {
        let table = AliasTable::new();
        table.register("s", "canonical-a", 0.9, AliasSource::Manual);
        table.register("s", "canonical-b", 0.5, AliasSource::Llm);
        assert_eq!(table.lookup("s").unwrap().canonical, "canonical-a");
        assert_eq!(table.len(), 1);
    }
}
