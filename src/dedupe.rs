//! Pending-work selection: filter records needing enrichment and collapse
//! duplicate phrases into one work item each.

use std::collections::HashSet;

use clap::ValueEnum;

use crate::dataset::{Method, PhraseRecord};
use crate::scheduler::WorkItem;

/// Which records count as pending for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PendingFilter {
    /// Everything not already resolved via pageviews (default): records with
    /// no prominence, and records whose method is any non-pageviews outcome.
    #[default]
    NotPageviews,
    /// Only records that fell back to the search hit count.
    TotalhitsOnly,
    /// Only records with no prominence at all.
    Missing,
}

impl PendingFilter {
    pub fn matches(&self, record: &PhraseRecord) -> bool {
        match self {
            PendingFilter::NotPageviews => {
                !matches!(record.method(), Some(Method::WikiPageviews))
            }
            PendingFilter::TotalhitsOnly => {
                matches!(record.method(), Some(Method::WikiTotalhits))
            }
            PendingFilter::Missing => record.prominence.is_none(),
        }
    }
}

/// Selection counts for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupeStats {
    /// Records still pending under the filter.
    pub matching: usize,
    /// Unique phrases among them, i.e. actual network work.
    pub unique: usize,
}

impl DedupeStats {
    pub fn duplicates(&self) -> usize {
        self.matching - self.unique
    }
}

/// Select pending records and dedupe by exact phrase string, preserving
/// first-occurrence order. Each unique phrase becomes one work item; the
/// result is later fanned back out to every matching record. A phrase that
/// already achieved a pageviews result on any record is done: its duplicates
/// never re-enter a run, so the achieved result cannot be displaced.
pub fn pending(records: &[PhraseRecord], filter: PendingFilter) -> (Vec<WorkItem>, DedupeStats) {
    let achieved: HashSet<&str> = records
        .iter()
        .filter(|r| matches!(r.method(), Some(Method::WikiPageviews)))
        .map(|r| r.phrase.as_str())
        .collect();

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    let mut matching = 0;

    for record in records {
        if achieved.contains(record.phrase.as_str()) || !filter.matches(record) {
            continue;
        }
        matching += 1;
        if seen.insert(record.phrase.clone()) {
            items.push(WorkItem::new(record.phrase.clone()));
        }
    }

    let stats = DedupeStats {
        matching,
        unique: items.len(),
    };
    (items, stats)
}
