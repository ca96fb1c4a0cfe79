//! Dataset file store: load, backup, checkpoint, and atomic save.
//!
//! The dataset is a JSON array of phrase records. It is read once at the
//! start of a run and written back exactly once at the end, with a uniquely
//! named backup taken before any destructive write. Checkpoints are
//! non-destructive siblings used for crash recovery.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Provenance of a prominence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    WikiPageviews,
    WikiPageviewsNotfound,
    WikiTotalhits,
    NoArticle,
    /// Legacy spelling of `no_article` found in older datasets.
    NoWikipediaArticle,
    Error,
    ApiError,
    Timeout,
    BatchTimeout,
    BatchError,
    /// Any method string this version doesn't know; treated as pending.
    #[serde(other)]
    Unknown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::WikiPageviews => "wiki_pageviews",
            Method::WikiPageviewsNotfound => "wiki_pageviews_notfound",
            Method::WikiTotalhits => "wiki_totalhits",
            Method::NoArticle => "no_article",
            Method::NoWikipediaArticle => "no_wikipedia_article",
            Method::Error => "error",
            Method::ApiError => "api_error",
            Method::Timeout => "timeout",
            Method::BatchTimeout => "batch_timeout",
            Method::BatchError => "batch_error",
            Method::Unknown => "unknown",
        }
    }
}

/// Prominence result for one phrase. `score` is the sort key; `method`
/// records how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prominence {
    pub score: u64,
    pub method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_hits: Option<u64>,
}

impl Prominence {
    /// Views for a resolved article. Zero views still counts: a pageviews
    /// result always outranks a totalhits fallback in confidence.
    pub fn pageviews(score: u64, article: String, search_hits: u64) -> Self {
        Self {
            score,
            method: Method::WikiPageviews,
            article: Some(article),
            search_hits: Some(search_hits),
        }
    }

    /// Search hit count fallback when no article resolved.
    pub fn totalhits(hits: u64) -> Self {
        Self {
            score: hits,
            method: Method::WikiTotalhits,
            article: None,
            search_hits: None,
        }
    }

    /// Zero-score terminal marker (`no_article`, `timeout`, ...).
    pub fn zero(method: Method) -> Self {
        Self {
            score: 0,
            method,
            article: None,
            search_hits: None,
        }
    }

    /// Zero-score marker that still records which article was resolved
    /// (used for `wiki_pageviews_notfound`).
    pub fn zero_for_article(method: Method, article: String) -> Self {
        Self {
            score: 0,
            method,
            article: Some(article),
            search_hits: None,
        }
    }
}

/// One record of the dataset. Fields other than `phrase` and `prominence`
/// are opaque pass-through payload and survive a round trip verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseRecord {
    pub phrase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prominence: Option<Prominence>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PhraseRecord {
    #[cfg(test)]
    pub fn bare(phrase: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            prominence: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn method(&self) -> Option<Method> {
        self.prominence.as_ref().map(|p| p.method)
    }
}

/// On-disk store for the dataset file.
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full dataset. A missing file is fatal: nothing else in the
    /// pipeline may run without a dataset.
    pub fn load(&self) -> Result<Vec<PhraseRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                bail!("dataset not found: {}", self.path.display());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading {}", self.path.display()));
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))
    }

    /// Copy the current on-disk content to a uniquely named sibling.
    /// Must be called before `save` within a run; the backup is never
    /// overwritten once written.
    pub fn backup(&self) -> Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let mut dest = self.sibling(&format!("backup-{stamp}"));
        let mut n = 1;
        while dest.exists() {
            dest = self.sibling(&format!("backup-{stamp}-{n}"));
            n += 1;
        }
        fs::copy(&self.path, &dest)
            .with_context(|| format!("backing up to {}", dest.display()))?;
        Ok(dest)
    }

    /// Serialize and atomically replace the primary file. Output is pretty
    /// two-space indented JSON with non-ASCII left unescaped.
    pub fn save(&self, records: &[PhraseRecord]) -> Result<()> {
        let json = serialize_records(records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json)
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    /// Write a non-destructive progress snapshot next to the primary file.
    pub fn checkpoint(&self, records: &[PhraseRecord], tag: &str) -> Result<PathBuf> {
        let dest = self.sibling(tag);
        let json = serialize_records(records)?;
        fs::write(&dest, &json)
            .with_context(|| format!("writing checkpoint {}", dest.display()))?;
        Ok(dest)
    }

    /// Sibling path `<stem>.<tag>.json` in the same directory.
    fn sibling(&self, tag: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        self.path.with_file_name(format!("{stem}.{tag}.json"))
    }
}

fn serialize_records(records: &[PhraseRecord]) -> Result<String> {
    let mut json = serde_json::to_string_pretty(records).context("serializing dataset")?;
    json.push('\n');
    Ok(json)
}
