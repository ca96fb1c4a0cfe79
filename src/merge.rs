//! Merge enrichment results back into the dataset and rank it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::dataset::{Method, PhraseRecord, Prominence};
use crate::scheduler::WorkItem;

/// Write each finished work item's result onto every record sharing its
/// phrase. Duplicates get independent copies of the same prominence.
/// Items without a result (nothing terminal assigned) are left alone, as
/// are records whose phrase never entered this run. A record that already
/// holds a pageviews result is never overwritten by a lower-confidence
/// outcome. Idempotent.
pub fn merge(records: &mut [PhraseRecord], items: &[WorkItem]) {
    let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        positions.entry(record.phrase.clone()).or_default().push(i);
    }

    for item in items {
        let Some(result) = &item.result else { continue };
        let Some(indices) = positions.get(item.phrase.as_str()) else {
            continue;
        };
        for &i in indices {
            if downgrades(&records[i], result) {
                continue;
            }
            records[i].prominence = Some(result.clone());
        }
    }
}

/// True when `incoming` would replace an achieved pageviews result with a
/// lower-confidence method.
fn downgrades(record: &PhraseRecord, incoming: &Prominence) -> bool {
    matches!(record.method(), Some(Method::WikiPageviews))
        && incoming.method != Method::WikiPageviews
}

/// Sort descending by score. The sort is stable: records without prominence
/// score zero, and ties keep their current relative order.
pub fn rank(records: &mut [PhraseRecord]) {
    records.sort_by_key(|r| Reverse(score_of(r)));
}

pub fn score_of(record: &PhraseRecord) -> u64 {
    record.prominence.as_ref().map(|p| p.score).unwrap_or(0)
}

/// Count records per method string, plus `"none"` for untouched records.
/// Ordered for stable display.
pub fn method_distribution(records: &[PhraseRecord]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let key = match record.method() {
            Some(m) => m.as_str(),
            None => "none",
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}
