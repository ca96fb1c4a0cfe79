//! Pageviews fetcher: fixed trailing window and monthly aggregation.
//!
//! The popularity signal for an article is the sum of its monthly pageview
//! counts over a trailing window ending yesterday and starting on the first
//! day of the month roughly three months back.

use chrono::{Datelike, Days, NaiveDate, Utc};

use crate::wiki::{WikiClient, WikiError};

/// Date range for a pageviews query, already formatted for the REST API
/// (`YYYYMM01` start, `YYYYMMDD` end).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: String,
    pub end: String,
}

/// Window for a given "today": end = yesterday, start = first of the month
/// that is 90 days before the first of the current month.
pub fn trailing_window(today: NaiveDate) -> MonthWindow {
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    let first_of_month = today.with_day(1).unwrap_or(today);
    let anchor = first_of_month
        .checked_sub_days(Days::new(90))
        .unwrap_or(first_of_month);
    MonthWindow {
        start: format!("{:04}{:02}01", anchor.year(), anchor.month()),
        end: yesterday.format("%Y%m%d").to_string(),
    }
}

pub fn current_window() -> MonthWindow {
    trailing_window(Utc::now().date_naive())
}

/// Sum monthly views for an article over the current trailing window.
/// Empty results are a valid zero; a 404 propagates as `NotFound` so the
/// caller can record the distinct `wiki_pageviews_notfound` outcome.
pub async fn fetch_views(client: &WikiClient, article: &str) -> Result<u64, WikiError> {
    let window = current_window();
    let items = client
        .pageviews(article, &window.start, &window.end)
        .await?;
    Ok(items.iter().map(|m| m.views).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_mid_month() {
        let w = trailing_window(ymd(2026, 8, 23));
        // 2026-08-01 minus 90 days lands in May; start snaps to the 1st.
        assert_eq!(w.start, "20260501");
        assert_eq!(w.end, "20260822");
    }

    #[test]
    fn test_window_crosses_year_boundary() {
        let w = trailing_window(ymd(2026, 1, 15));
        assert_eq!(w.start, "20251001");
        assert_eq!(w.end, "20260114");
    }

    #[test]
    fn test_window_first_of_month_ends_in_prior_month() {
        let w = trailing_window(ymd(2026, 3, 1));
        assert_eq!(w.start, "20251201");
        assert_eq!(w.end, "20260228");
    }

    #[test]
    fn test_window_start_is_always_first_of_month() {
        for day in 1..=28 {
            let w = trailing_window(ymd(2026, 6, day));
            assert!(w.start.ends_with("01"), "start {} not month-aligned", w.start);
        }
    }
}
