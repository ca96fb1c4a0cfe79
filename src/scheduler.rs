//! Rate-limited scheduler: bounded concurrency, strictly ordered batches,
//! per-batch wall-clock ceilings, and per-item failure isolation.
//!
//! The counting gate is the only mutual-exclusion primitive in the run: it
//! bounds how many enrichment operations are in flight at once. Work items
//! are private to their task, and the dataset is only touched at batch
//! boundaries through the `on_batch` callback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::RunConfig;
use crate::dataset::{Method, Prominence};
use crate::enrich::Enrich;

/// A unique phrase pending enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub phrase: String,
    pub result: Option<Prominence>,
}

impl WorkItem {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            result: None,
        }
    }
}

/// Progress for one completed batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// 1-based batch sequence number.
    pub batch_num: usize,
    pub total_batches: usize,
    /// Items in this batch.
    pub items: usize,
    /// Items force-assigned `batch_timeout` when the ceiling expired.
    pub timed_out: usize,
    pub elapsed: Duration,
}

pub struct Scheduler {
    config: RunConfig,
    gate: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(config: RunConfig) -> Self {
        let gate = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self { config, gate }
    }

    /// Drive every work item through the enricher. Batches run strictly in
    /// sequence; within a batch, completion order is unspecified. `on_batch`
    /// fires after each batch with the finished items so merging and
    /// checkpointing stay batch-aligned. Every item ends with a terminal
    /// result; a batch hitting its ceiling never aborts the run.
    pub async fn run<E, F>(
        &self,
        mut items: Vec<WorkItem>,
        enricher: &E,
        mut on_batch: F,
    ) -> Result<Vec<WorkItem>>
    where
        E: Enrich,
        F: FnMut(&BatchReport, &[WorkItem]) -> Result<()>,
    {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = items.len().div_ceil(batch_size);

        for (batch_idx, chunk) in items.chunks_mut(batch_size).enumerate() {
            let started = Instant::now();
            let timed_out = self.run_batch(chunk, enricher).await;

            let report = BatchReport {
                batch_num: batch_idx + 1,
                total_batches,
                items: chunk.len(),
                timed_out,
                elapsed: started.elapsed(),
            };
            on_batch(&report, chunk)?;
        }

        Ok(items)
    }

    /// Process one batch concurrently under the gate and the batch ceiling.
    /// Returns how many items were abandoned at the ceiling.
    async fn run_batch<E: Enrich>(&self, chunk: &mut [WorkItem], enricher: &E) -> usize {
        let mut slots: Vec<Option<Prominence>> = vec![None; chunk.len()];

        {
            let mut inflight: FuturesUnordered<_> = chunk
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let phrase = item.phrase.clone();
                    let gate = Arc::clone(&self.gate);
                    async move {
                        // Held for the whole resolve+fetch of this item.
                        let _permit = gate.acquire().await.expect("gate closed");
                        (i, enricher.enrich(&phrase).await)
                    }
                })
                .collect();

            // Record completions as they land so a ceiling expiry only
            // abandons the items still outstanding at that instant.
            let drain = async {
                while let Some((i, result)) = inflight.next().await {
                    slots[i] = Some(result);
                }
            };
            let _ = timeout(self.config.batch_timeout, drain).await;
        }

        let mut timed_out = 0;
        for (slot, item) in slots.into_iter().zip(chunk.iter_mut()) {
            item.result = Some(slot.unwrap_or_else(|| {
                timed_out += 1;
                Prominence::zero(Method::BatchTimeout)
            }));
        }
        timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items(phrases: &[&str]) -> Vec<WorkItem> {
        phrases.iter().map(|p| WorkItem::new(*p)).collect()
    }

    fn config(batch_size: usize, concurrency: usize, batch_timeout: Duration) -> RunConfig {
        RunConfig {
            batch_size,
            concurrency,
            batch_timeout,
            ..RunConfig::default()
        }
    }

    /// Tracks the max number of simultaneously in-flight enrich calls.
    struct GateProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GateProbe {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl Enrich for GateProbe {
        async fn enrich(&self, _phrase: &str) -> Prominence {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Prominence::zero(Method::NoArticle)
        }
    }

    /// Sleeps per phrase, then returns a canned pageviews result.
    struct SleepyEnricher {
        slow_phrase: String,
        slow_for: Duration,
    }

    impl Enrich for SleepyEnricher {
        async fn enrich(&self, phrase: &str) -> Prominence {
            if phrase == self.slow_phrase {
                tokio::time::sleep(self.slow_for).await;
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Prominence::pageviews(phrase.len() as u64, phrase.to_string(), 1)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_never_exceeds_concurrency_bound() {
        let probe = GateProbe::new();
        let scheduler = Scheduler::new(config(10, 2, Duration::from_secs(300)));

        let done = scheduler
            .run(
                items(&["a", "b", "c", "d", "e", "f", "g", "h"]),
                &probe,
                |_, _| Ok(()),
            )
            .await
            .unwrap();

        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
        assert!(done.iter().all(|w| w.result.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_timeout_marks_only_unfinished_items() {
        let enricher = SleepyEnricher {
            slow_phrase: "slow".into(),
            slow_for: Duration::from_secs(600),
        };
        // concurrency 3 so the slow item never blocks the fast ones.
        let scheduler = Scheduler::new(config(3, 3, Duration::from_secs(300)));

        let mut reports = Vec::new();
        let done = scheduler
            .run(items(&["fast1", "slow", "fast2", "fast3"]), &enricher, |r, _| {
                reports.push(r.clone());
                Ok(())
            })
            .await
            .unwrap();

        let by_phrase: std::collections::HashMap<_, _> = done
            .iter()
            .map(|w| (w.phrase.as_str(), w.result.as_ref().unwrap()))
            .collect();

        assert_eq!(by_phrase["slow"].method, Method::BatchTimeout);
        assert_eq!(by_phrase["fast1"].method, Method::WikiPageviews);
        assert_eq!(by_phrase["fast2"].method, Method::WikiPageviews);
        // The second batch still ran after the first hit its ceiling.
        assert_eq!(by_phrase["fast3"].method, Method::WikiPageviews);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].timed_out, 1);
        assert_eq!(reports[1].timed_out, 0);
    }

    #[tokio::test]
    async fn test_batches_run_strictly_in_sequence() {
        struct Instant0;
        impl Enrich for Instant0 {
            async fn enrich(&self, _phrase: &str) -> Prominence {
                Prominence::zero(Method::NoArticle)
            }
        }

        let scheduler = Scheduler::new(config(3, 2, Duration::from_secs(300)));
        let mut seen = Vec::new();
        scheduler
            .run(items(&["a", "b", "c", "d", "e", "f", "g"]), &Instant0, |r, batch| {
                seen.push((r.batch_num, r.total_batches, batch.len()));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![(1, 3, 3), (2, 3, 3), (3, 3, 1)]);
    }

    #[tokio::test]
    async fn test_item_failure_is_isolated_to_that_item() {
        struct OneBad;
        impl Enrich for OneBad {
            async fn enrich(&self, phrase: &str) -> Prominence {
                if phrase == "bad" {
                    Prominence::zero(Method::ApiError)
                } else {
                    Prominence::pageviews(10, phrase.to_string(), 1)
                }
            }
        }

        let scheduler = Scheduler::new(config(10, 2, Duration::from_secs(300)));
        let done = scheduler
            .run(items(&["good1", "bad", "good2"]), &OneBad, |_, _| Ok(()))
            .await
            .unwrap();

        assert_eq!(done[0].result.as_ref().unwrap().method, Method::WikiPageviews);
        assert_eq!(done[1].result.as_ref().unwrap().method, Method::ApiError);
        assert_eq!(done[2].result.as_ref().unwrap().method, Method::WikiPageviews);
    }
}
