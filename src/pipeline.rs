//! End-to-end run orchestration: load, select, enrich, merge, rank, save.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::config::RunConfig;
use crate::dataset::DatasetStore;
use crate::dedupe::{self, PendingFilter};
use crate::enrich::Enrich;
use crate::formatting::{format_count, format_duration, truncate_str};
use crate::merge;
use crate::scheduler::Scheduler;

/// Runs estimated past this ask for confirmation first (unless --yes).
const CONFIRM_THRESHOLD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct RankOptions {
    pub filter: PendingFilter,
    /// Cap on unique phrases to process this run.
    pub limit: Option<usize>,
    pub assume_yes: bool,
}

/// What a rank run did, for the caller and for tests.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Unique phrases sent through the enricher.
    pub processed: usize,
    /// Whether the dataset file was rewritten.
    pub saved: bool,
    pub backup: Option<PathBuf>,
    pub cancelled: bool,
}

impl RunSummary {
    fn untouched() -> Self {
        Self {
            processed: 0,
            saved: false,
            backup: None,
            cancelled: false,
        }
    }
}

/// The full enrichment run. Merging, checkpointing, and progress output
/// happen at batch boundaries; the primary file is backed up and rewritten
/// exactly once at the end. When nothing is pending the dataset is left
/// completely untouched.
pub async fn run_rank<E: Enrich>(
    store: &DatasetStore,
    config: &RunConfig,
    options: &RankOptions,
    enricher: &E,
) -> Result<RunSummary> {
    let mut records = store.load()?;
    eprintln!(
        "\x1b[36m..\x1b[0m Loaded {} records from {}",
        format_count(records.len() as u64),
        store.path().display()
    );
    print_distribution(&records);

    let (mut items, stats) = dedupe::pending(&records, options.filter);
    eprintln!(
        "\x1b[36m..\x1b[0m {} pending records, {} unique phrases ({} duplicates)",
        format_count(stats.matching as u64),
        format_count(stats.unique as u64),
        format_count(stats.duplicates() as u64)
    );
    if let Some(limit) = options.limit {
        if limit < items.len() {
            items.truncate(limit);
            eprintln!(
                "\x1b[36m..\x1b[0m Limited to {} of {} phrases",
                format_count(items.len() as u64),
                format_count(stats.unique as u64)
            );
        }
    }

    if items.is_empty() {
        eprintln!("\x1b[32mok\x1b[0m Nothing to do");
        return Ok(RunSummary::untouched());
    }

    let estimate = config.estimated_duration(items.len());
    eprintln!(
        "\x1b[36m..\x1b[0m Estimated duration: {}",
        format_duration(estimate)
    );
    if estimate > CONFIRM_THRESHOLD && !options.assume_yes {
        if !confirm("Proceed?")? {
            eprintln!("\x1b[33m!\x1b[0m Cancelled");
            return Ok(RunSummary {
                cancelled: true,
                ..RunSummary::untouched()
            });
        }
    }

    let started = std::time::Instant::now();
    let processed = items.len();
    let scheduler = Scheduler::new(config.clone());
    let checkpoint_every = config.checkpoint_every.max(1);

    let items = scheduler
        .run(items, enricher, |report, batch| {
            merge::merge(&mut records, batch);
            let mark = if report.timed_out > 0 {
                "\x1b[33m!\x1b[0m"
            } else {
                "\x1b[32mok\x1b[0m"
            };
            eprintln!(
                "{} Batch {}/{}: {} items in {}{}",
                mark,
                report.batch_num,
                report.total_batches,
                report.items,
                format_duration(report.elapsed),
                if report.timed_out > 0 {
                    format!(" ({} timed out)", report.timed_out)
                } else {
                    String::new()
                }
            );

            let last = report.batch_num == report.total_batches;
            if !last && report.batch_num % checkpoint_every == 0 {
                let snap =
                    store.checkpoint(&records, &format!("progress-batch-{}", report.batch_num))?;
                eprintln!("\x1b[36m..\x1b[0m Checkpoint: {}", snap.display());
            }
            Ok(())
        })
        .await?;

    merge::merge(&mut records, &items);
    merge::rank(&mut records);

    let backup = store.backup()?;
    eprintln!("\x1b[36m..\x1b[0m Backup: {}", backup.display());
    store.save(&records)?;
    eprintln!(
        "\x1b[32mok\x1b[0m Saved {} ranked records to {} in {}",
        format_count(records.len() as u64),
        store.path().display(),
        format_duration(started.elapsed())
    );

    print_distribution(&records);
    print_top(&records, 10);

    Ok(RunSummary {
        processed,
        saved: true,
        backup: Some(backup),
        cancelled: false,
    })
}

/// Read-only summary of the dataset: method distribution and top scores.
pub fn run_stats(store: &DatasetStore) -> Result<()> {
    let records = store.load()?;
    eprintln!(
        "\x1b[36m..\x1b[0m {} records in {}",
        format_count(records.len() as u64),
        store.path().display()
    );
    print_distribution(&records);

    let mut sorted = records;
    merge::rank(&mut sorted);
    print_top(&sorted, 10);
    Ok(())
}

fn print_distribution(records: &[crate::dataset::PhraseRecord]) {
    for (method, count) in merge::method_distribution(records) {
        eprintln!("    {:<24} {}", method, format_count(count as u64));
    }
}

fn print_top(records: &[crate::dataset::PhraseRecord], n: usize) {
    eprintln!("  \x1b[90mTop {}:\x1b[0m", n.min(records.len()));
    for record in records.iter().take(n) {
        eprintln!(
            "    {:>12}  {}",
            format_count(merge::score_of(record)),
            truncate_str(&record.phrase, 48)
        );
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{} [y/N] ", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use crate::dataset::{Method, Prominence};

    /// Deterministic enricher: canned result per phrase, no network.
    struct Scripted {
        results: HashMap<String, Prominence>,
    }

    impl Scripted {
        fn new(entries: &[(&str, Prominence)]) -> Self {
            Self {
                results: entries
                    .iter()
                    .map(|(p, r)| (p.to_string(), r.clone()))
                    .collect(),
            }
        }
    }

    impl Enrich for Scripted {
        async fn enrich(&self, phrase: &str) -> Prominence {
            self.results
                .get(phrase)
                .cloned()
                .unwrap_or_else(|| Prominence::zero(Method::NoArticle))
        }
    }

    fn fast_config() -> RunConfig {
        RunConfig {
            search_delay: Duration::ZERO,
            pageview_delay: Duration::ZERO,
            ..RunConfig::default()
        }
    }

    fn seed_store(dir: &std::path::Path, json: &str) -> DatasetStore {
        let path = dir.join("phrases.json");
        fs::write(&path, json).unwrap();
        DatasetStore::new(path)
    }

    #[tokio::test]
    async fn test_full_run_ranks_and_fans_out_duplicates() {
        let dir = tempdir().unwrap();
        let store = seed_store(
            dir.path(),
            r#"[
                {"phrase":"Moon Landing","category":"History"},
                {"phrase":"Obscure Thing"},
                {"phrase":"Moon Landing"},
                {"phrase":"Middling Topic"}
            ]"#,
        );
        let enricher = Scripted::new(&[
            (
                "Moon Landing",
                Prominence::pageviews(90_000, "Moon landing".into(), 400),
            ),
            ("Obscure Thing", Prominence::zero(Method::NoArticle)),
            ("Middling Topic", Prominence::totalhits(120)),
        ]);

        let summary = run_rank(&store, &fast_config(), &RankOptions::default(), &enricher)
            .await
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert!(summary.saved);
        assert!(summary.backup.as_ref().unwrap().exists());

        let records = store.load().unwrap();
        let phrases: Vec<_> = records.iter().map(|r| r.phrase.as_str()).collect();
        assert_eq!(
            phrases,
            vec!["Moon Landing", "Moon Landing", "Middling Topic", "Obscure Thing"]
        );
        // Duplicates share the identical result.
        assert_eq!(records[0].prominence, records[1].prominence);
        // Pass-through fields survive the rewrite.
        assert_eq!(records[0].extra["category"], "History");
    }

    #[tokio::test]
    async fn test_nothing_pending_leaves_dataset_untouched() {
        let dir = tempdir().unwrap();
        let store = seed_store(
            dir.path(),
            r#"[{"phrase":"Done","prominence":{"score":5,"method":"wiki_pageviews"}}]"#,
        );
        let before = fs::read_to_string(store.path()).unwrap();
        let enricher = Scripted::new(&[]);

        let summary = run_rank(&store, &fast_config(), &RankOptions::default(), &enricher)
            .await
            .unwrap();

        assert_eq!(summary.processed, 0);
        assert!(!summary.saved);
        assert!(summary.backup.is_none());
        // No write, no backup file.
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_achieved_result_survives_a_failing_duplicate() {
        let dir = tempdir().unwrap();
        let store = seed_store(
            dir.path(),
            r#"[
                {"phrase":"Apollo 11","prominence":{"score":5000,"method":"wiki_pageviews","article":"Apollo 11"}},
                {"phrase":"Apollo 11"}
            ]"#,
        );
        // Even a run that would fail the phrase cannot touch it.
        let enricher = Scripted::new(&[("Apollo 11", Prominence::zero(Method::Timeout))]);

        let summary = run_rank(&store, &fast_config(), &RankOptions::default(), &enricher)
            .await
            .unwrap();

        assert_eq!(summary.processed, 0);
        let records = store.load().unwrap();
        let kept = records[0].prominence.as_ref().unwrap();
        assert_eq!(kept.method, Method::WikiPageviews);
        assert_eq!(kept.score, 5000);
    }

    #[tokio::test]
    async fn test_checkpoints_written_on_cadence_but_not_for_final_batch() {
        let dir = tempdir().unwrap();
        let records: Vec<String> = (0..10).map(|i| format!("{{\"phrase\":\"p{}\"}}", i)).collect();
        let store = seed_store(dir.path(), &format!("[{}]", records.join(",")));
        let enricher = Scripted::new(&[]);

        let config = RunConfig {
            batch_size: 2,
            checkpoint_every: 2,
            ..fast_config()
        };
        run_rank(&store, &config, &RankOptions::default(), &enricher)
            .await
            .unwrap();

        // 5 batches, cadence 2: snapshots after batches 2 and 4 only.
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.contains("progress-batch-2")));
        assert!(names.iter().any(|n| n.contains("progress-batch-4")));
        assert!(!names.iter().any(|n| n.contains("progress-batch-5")));
    }

    #[tokio::test]
    async fn test_limit_caps_unique_phrases() {
        let dir = tempdir().unwrap();
        let store = seed_store(
            dir.path(),
            r#"[{"phrase":"a"},{"phrase":"b"},{"phrase":"c"}]"#,
        );
        let enricher = Scripted::new(&[("a", Prominence::totalhits(1))]);

        let options = RankOptions {
            limit: Some(1),
            ..RankOptions::default()
        };
        let summary = run_rank(&store, &fast_config(), &options, &enricher)
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        let records = store.load().unwrap();
        let touched = records.iter().filter(|r| r.prominence.is_some()).count();
        assert_eq!(touched, 1);
    }
}
