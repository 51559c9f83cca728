use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{CrawlResult, FailureRecord, ItemId};

/// Failed items of one crawl, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureLedger(BTreeMap<ItemId, FailureRecord>);

impl FailureLedger {
    pub fn record(&mut self, record: FailureRecord) {
        self.0.insert(record.item_id.clone(), record);
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.0.contains_key(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&FailureRecord> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.0.keys()
    }

    pub fn merge(&mut self, other: FailureLedger) {
        self.0.extend(other.0);
    }
}

/// Everything a crawl produced. Every input id is in exactly one of the three collections.
#[derive(Debug)]
pub struct CrawlOutcome<T> {
    pub results: CrawlResult<T>,
    pub failures: FailureLedger,
    /// Ids never handed to a worker because the crawl was cancelled
    pub unprocessed: Vec<ItemId>,
}

impl<T> Default for CrawlOutcome<T> {
    fn default() -> Self {
        Self {
            results: CrawlResult::new(),
            failures: FailureLedger::default(),
            unprocessed: Vec::new(),
        }
    }
}

impl<T> CrawlOutcome<T> {
    pub fn absorb(&mut self, other: CrawlOutcome<T>) {
        self.results.extend(other.results);
        self.failures.merge(other.failures);
        self.unprocessed.extend(other.unprocessed);
    }

    pub fn processed(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(id: &str) -> FailureRecord {
        FailureRecord {
            item_id: ItemId::new(id),
            source_url: format!("https://www.airbnb.ca/rooms/{id}"),
            error_message: "boom".into(),
        }
    }

    #[test]
    fn absorb_merges_partial_outcomes() {
        let mut left = CrawlOutcome::default();
        left.results.insert(ItemId::new("1"), "one");
        left.failures.record(failure("2"));

        let mut right = CrawlOutcome::default();
        right.results.insert(ItemId::new("3"), "three");
        right.failures.record(failure("4"));
        right.unprocessed.push(ItemId::new("5"));

        left.absorb(right);

        assert_eq!(left.processed(), 4);
        assert!(left.failures.contains(&ItemId::new("4")));
        assert_eq!(left.unprocessed, vec![ItemId::new("5")]);
    }

    #[test]
    fn ledger_serializes_as_map() {
        let mut ledger = FailureLedger::default();
        ledger.record(failure("9"));
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["9"]["msg"], "boom");
    }
}
