//! Article resolver: multi-strategy Wikipedia search with an ordered,
//! declarative match-acceptance policy.
//!
//! Query-rewrite strategies and acceptance rules are plain data so the
//! matching policy can be inspected and tested without any network.

use std::time::Duration;

use crate::wiki::{WikiClient, WikiError};

/// Candidates requested per search call.
const SEARCH_LIMIT: usize = 5;

/// One query derived from the phrase. The first strategy runs as a quoted
/// exact-phrase search for a stricter first pass; later rewrites run raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub exact: bool,
}

/// Best-matching article for a phrase, plus the informational hit count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub article: Option<String>,
    pub totalhits: u64,
}

/// Ordered query-rewrite strategies for a phrase, de-duplicated while
/// preserving order:
/// 1. the phrase verbatim (quoted exact-phrase pass),
/// 2. apostrophes stripped,
/// 3. `&` expanded to `and`,
/// 4. first word only (multi-word phrases),
/// 5. leading "The"/"the" removed,
/// 6. periods stripped.
pub fn build_queries(phrase: &str) -> Vec<SearchQuery> {
    let phrase = phrase.trim();
    let mut terms: Vec<String> = vec![phrase.to_string()];
    terms.push(phrase.replace('\'', ""));
    terms.push(phrase.replace('&', "and"));
    if phrase.split_whitespace().nth(1).is_some() {
        if let Some(first) = phrase.split_whitespace().next() {
            terms.push(first.to_string());
        }
    }
    terms.push(
        phrase
            .strip_prefix("The ")
            .or_else(|| phrase.strip_prefix("the "))
            .unwrap_or(phrase)
            .to_string(),
    );
    terms.push(phrase.replace('.', ""));

    let mut queries: Vec<SearchQuery> = Vec::new();
    for (i, term) in terms.into_iter().enumerate() {
        let term = term.trim().to_string();
        if term.is_empty() || queries.iter().any(|q| q.term == term) {
            continue;
        }
        queries.push(SearchQuery {
            term,
            exact: i == 0,
        });
    }
    queries
}

/// Pick the best candidate title, evaluating the acceptance rules in
/// priority order across all candidates:
/// (a) title equals the phrase (case-insensitive),
/// (b) title equals the query term (case-insensitive),
/// (c) the lowercased phrase is a substring of the title,
/// (d) any phrase word longer than 3 chars is a substring of the title.
/// If no rule matches, falls back to the first candidate (best effort).
pub fn pick_match<'a>(phrase: &str, term: &str, titles: &'a [String]) -> Option<&'a str> {
    let phrase_lc = phrase.to_lowercase();
    let term_lc = term.to_lowercase();
    let words: Vec<&str> = phrase_lc
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .collect();

    let rules: [&dyn Fn(&str) -> bool; 4] = [
        &|t| t == phrase_lc,
        &|t| t == term_lc,
        &|t| t.contains(phrase_lc.as_str()),
        &|t| words.iter().any(|w| t.contains(w)),
    ];

    for rule in rules {
        for title in titles {
            if rule(&title.to_lowercase()) {
                return Some(title);
            }
        }
    }
    titles.first().map(|s| s.as_str())
}

/// Walk the strategies in order and return the first usable match. Every
/// strategy search is preceded by the pacing delay so the absolute request
/// rate stays throttled even across rewrites. Strategies with zero results
/// are skipped; the largest hit count seen is retained so an unresolved
/// phrase can still fall back to `wiki_totalhits`. Rate limits are retried
/// inside the client and never advance the strategy walk; a persistent 429
/// propagates to the caller.
pub async fn resolve(
    client: &WikiClient,
    phrase: &str,
    pace: Duration,
) -> Result<Resolution, WikiError> {
    let mut best_hits = 0u64;

    for query in build_queries(phrase) {
        tokio::time::sleep(pace).await;
        let outcome = client.search(&query.term, query.exact, SEARCH_LIMIT).await?;
        best_hits = best_hits.max(outcome.totalhits);

        if outcome.titles.is_empty() {
            continue;
        }
        if let Some(title) = pick_match(phrase, &query.term, &outcome.titles) {
            return Ok(Resolution {
                article: Some(title.to_string()),
                totalhits: outcome.totalhits,
            });
        }
    }

    Ok(Resolution {
        article: None,
        totalhits: best_hits,
    })
}
