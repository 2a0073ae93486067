// Date detection for the advisory "create a calendar event?" prompt.
//
// The platform's detection capability is abstracted behind a trait; a
// regex + chrono reference implementation ships for hosts without one.
// Purely advisory: nothing here affects persistence.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use uuid::Uuid;

use jotter_common::block::Block;

/// Generic date-detection capability (`find_dates(text) -> [date]`).
pub trait DateDetector: Send + Sync {
    fn find_dates(&self, text: &str) -> Vec<NaiveDate>;
}

/// One-shot prompt raised when a future-or-today date shows up in the
/// most recently focused or edited block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPrompt {
    pub block_id: Uuid,
    pub date: NaiveDate,
    /// Leading slice of the block content, for the prompt UI.
    pub snippet: String,
}

const SNIPPET_CHARS: usize = 80;

/// Scan a block for a future-or-today date.
pub fn scan_block(detector: &dyn DateDetector, block: &Block, today: NaiveDate) -> Option<EventPrompt> {
    let date = detector.find_dates(&block.content).into_iter().find(|date| *date >= today)?;
    Some(EventPrompt {
        block_id: block.id,
        date,
        snippet: block.content.trim().chars().take(SNIPPET_CHARS).collect(),
    })
}

/// Regex-based detector for explicit-year date expressions: ISO
/// `2026-03-14`, US `3/14/2026`, and written `March 14, 2026` forms.
#[derive(Debug, Default)]
pub struct RegexDateDetector;

fn date_patterns() -> &'static [(Regex, DateShape)] {
    static PATTERNS: OnceLock<Vec<(Regex, DateShape)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                (
                    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b")
                        .expect("iso date pattern should compile"),
                    DateShape::YearMonthDay,
                ),
                (
                    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b")
                        .expect("slash date pattern should compile"),
                    DateShape::MonthDayYear,
                ),
                (
                    Regex::new(
                        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
                    )
                    .expect("written date pattern should compile"),
                    DateShape::NameDayYear,
                ),
            ]
        })
        .as_slice()
}

#[derive(Debug, Clone, Copy)]
enum DateShape {
    YearMonthDay,
    MonthDayYear,
    NameDayYear,
}

impl DateDetector for RegexDateDetector {
    fn find_dates(&self, text: &str) -> Vec<NaiveDate> {
        let mut found = Vec::new();
        for (pattern, shape) in date_patterns() {
            for captures in pattern.captures_iter(text) {
                let parsed = match shape {
                    DateShape::YearMonthDay => parse_ymd(&captures[1], &captures[2], &captures[3]),
                    DateShape::MonthDayYear => parse_ymd(&captures[3], &captures[1], &captures[2]),
                    DateShape::NameDayYear => month_number(&captures[1])
                        .and_then(|month| parse_parts(&captures[3], month, &captures[2])),
                };
                // Impossible dates (2026-13-45) are simply not dates.
                if let Some(date) = parsed {
                    found.push(date);
                }
            }
        }
        found
    }
}

fn parse_ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    let month = month.parse().ok()?;
    parse_parts(year, month, day)
}

fn parse_parts(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let index = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ]
    .iter()
    .position(|m| name.eq_ignore_ascii_case(m))?;
    Some(index as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    // ── RegexDateDetector ──────────────────────────────────────────

    #[test]
    fn finds_iso_dates() {
        let dates = RegexDateDetector.find_dates("standup moved to 2026-09-02, ok?");
        assert_eq!(dates, vec![d(2026, 9, 2)]);
    }

    #[test]
    fn finds_slash_dates_as_month_day_year() {
        let dates = RegexDateDetector.find_dates("due 9/2/2026");
        assert_eq!(dates, vec![d(2026, 9, 2)]);
    }

    #[test]
    fn finds_written_dates() {
        let dates = RegexDateDetector.find_dates("Dinner on September 2nd, 2026 with Ana");
        assert_eq!(dates, vec![d(2026, 9, 2)]);
    }

    #[test]
    fn impossible_dates_are_skipped() {
        assert!(RegexDateDetector.find_dates("2026-13-45 is not real").is_empty());
    }

    #[test]
    fn plain_numbers_are_not_dates() {
        assert!(RegexDateDetector.find_dates("call 555-0142 about invoice 2026").is_empty());
    }

    // ── scan_block ─────────────────────────────────────────────────

    #[test]
    fn future_date_raises_a_prompt() {
        let block = Block::text("dentist 2026-05-01");
        let prompt = scan_block(&RegexDateDetector, &block, d(2026, 4, 1)).unwrap();
        assert_eq!(prompt.block_id, block.id);
        assert_eq!(prompt.date, d(2026, 5, 1));
        assert_eq!(prompt.snippet, "dentist 2026-05-01");
    }

    #[test]
    fn today_counts_as_future_or_today() {
        let block = Block::text("2026-04-01");
        assert!(scan_block(&RegexDateDetector, &block, d(2026, 4, 1)).is_some());
    }

    #[test]
    fn past_dates_do_not_prompt() {
        let block = Block::text("met on 2020-01-01");
        assert!(scan_block(&RegexDateDetector, &block, d(2026, 4, 1)).is_none());
    }

    #[test]
    fn snippet_is_bounded() {
        let block = Block::text(format!("{} 2026-05-01", "x".repeat(200)));
        let prompt = scan_block(&RegexDateDetector, &block, d(2026, 1, 1)).unwrap();
        assert_eq!(prompt.snippet.chars().count(), 80);
    }
}
