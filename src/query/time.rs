//! Time Range Resolver
//!
//! Turns `--age` and `--time` into `timestamp` predicates and the window used
//! later to bin histograms.
//!
//! # Timespecs
//!
//! ```text
//! 30s  15m  12h  7d  2w  1M  1y  1d12h  3600
//! ```
//!
//! A trailing number without a unit is seconds.

use crate::query::document::{FilterGroup, Predicate};
use crate::query::error::{QueryError, QueryResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use nom::{
    character::complete::{digit1, one_of},
    combinator::{all_consuming, map_res, opt},
    multi::many1,
    sequence::pair,
    IResult,
};
use regex::Regex;
use std::sync::OnceLock;

/// Timespec units in canonical order, with their length in seconds
pub const UNITS: [(char, u64); 7] = [
    ('y', 31_536_000),
    ('M', 2_592_000),
    ('w', 604_800),
    ('d', 86_400),
    ('h', 3_600),
    ('m', 60),
    ('s', 1),
];

/// Age applied when no time constraint is given
pub const DEFAULT_AGE: &str = "1M";

/// Column all time constraints apply to
pub const TIMESTAMP_COLUMN: &str = "timestamp";

fn unit_seconds(unit: char) -> u64 {
    UNITS
        .iter()
        .find(|(u, _)| *u == unit)
        .map(|(_, secs)| *secs)
        .unwrap_or(1)
}

fn parse_timespec_part(input: &str) -> IResult<&str, u64> {
    let (input, (count, unit)) = pair(
        map_res(digit1, |s: &str| s.parse::<u64>()),
        opt(one_of("yMwdhms")),
    )(input)?;

    Ok((input, count.saturating_mul(unit.map(unit_seconds).unwrap_or(1))))
}

/// Convert a timespec such as `7d` or `1d12h` to seconds
pub fn timespec_to_seconds(spec: &str) -> QueryResult<u64> {
    let trimmed = spec.trim();
    all_consuming(many1(parse_timespec_part))(trimmed)
        .map(|(_, parts)| parts.into_iter().fold(0u64, u64::saturating_add))
        .map_err(|_| QueryError::InvalidTimespec(spec.to_string()))
}

/// Render seconds as a timespec in canonical unit order
pub fn seconds_to_timespec(seconds: u64) -> String {
    if seconds == 0 {
        return "0s".to_string();
    }

    let mut remaining = seconds;
    let mut out = String::new();
    for (unit, size) in UNITS {
        let count = remaining / size;
        if count > 0 {
            out.push_str(&format!("{}{}", count, unit));
            remaining %= size;
        }
    }
    out
}

/// Resolved time bounds in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub stop: i64,
}

/// One range found in a natural-language expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateRange {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// Source of `--time` ranges
pub trait RangeSource {
    /// Every range distinguishable in `expr`, relative to `now`
    fn ranges(&self, expr: &str, now: DateTime<Utc>) -> Vec<CandidateRange>;
}

/// Default `--time` parser
///
/// Accepts `<date> to <date>`, `<date> .. <date>`, `since <date>` and bare
/// dates; several ranges may be joined with `,` or `and`. Dates are RFC 3339,
/// `YYYY-MM-DD[ HH:MM[:SS]]` (UTC), epoch seconds, `now`, `today` or
/// `yesterday`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalRangeSource;

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*,\s*|\s+and\s+").expect("valid regex"))
}

fn bounded_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:from\s+|between\s+)?(.+?)\s*(?:\s+to\s+|\s+until\s+|\.\.)\s*(.+)$")
            .expect("valid regex")
    })
}

fn open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:since|from|after)\s+(.+)$").expect("valid regex"))
}

impl NaturalRangeSource {
    fn parse_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let text = text.trim();
        let midnight = |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));

        match text.to_lowercase().as_str() {
            "now" => return Some(now),
            "today" => return midnight(now.date_naive()),
            "yesterday" => return midnight(now.date_naive() - Duration::days(1)),
            _ => {}
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
                return Some(Utc.from_utc_datetime(&dt));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return midnight(date);
        }
        if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            return text
                .parse::<i64>()
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        }
        None
    }
}

impl RangeSource for NaturalRangeSource {
    fn ranges(&self, expr: &str, now: DateTime<Utc>) -> Vec<CandidateRange> {
        separator_re()
            .split(expr.trim())
            .filter(|piece| !piece.is_empty())
            .filter_map(|piece| {
                if let Some(caps) = bounded_re().captures(piece) {
                    let start = Self::parse_date(&caps[1], now)?;
                    let end = Self::parse_date(&caps[2], now)?;
                    return Some(CandidateRange {
                        start,
                        end: Some(end),
                    });
                }
                if let Some(caps) = open_re().captures(piece) {
                    let start = Self::parse_date(&caps[1], now)?;
                    return Some(CandidateRange { start, end: None });
                }
                Self::parse_date(piece, now).map(|start| CandidateRange { start, end: None })
            })
            .collect()
    }
}

/// Resolves `--age`/`--time` into timestamp predicates
pub struct TimeRangeResolver<'a> {
    source: &'a dyn RangeSource,
    now: DateTime<Utc>,
}

impl<'a> TimeRangeResolver<'a> {
    pub fn new(source: &'a dyn RangeSource, now: DateTime<Utc>) -> Self {
        Self { source, now }
    }

    /// Add the `timestamp` constraint to `group` and return the active window
    ///
    /// Returns `None` when the caller already supplied an explicit timestamp
    /// filter and neither `--age` nor `--time` was given.
    pub fn resolve(
        &self,
        age: Option<&str>,
        time: Option<&str>,
        table: &str,
        group: &mut FilterGroup,
    ) -> QueryResult<Option<TimeWindow>> {
        let explicit = group.contains_key(TIMESTAMP_COLUMN);

        if age.is_some() && time.is_some() {
            return Err(QueryError::TimeConflict(
                "--time and --age are mutually exclusive".to_string(),
            ));
        }
        if explicit && (age.is_some() || time.is_some()) {
            return Err(QueryError::TimeConflict(
                "--age and --time cannot be combined with a timestamp filter".to_string(),
            ));
        }
        if explicit {
            return Ok(None);
        }

        let (window, mut predicates) = match time {
            Some(expr) => self.resolve_time(expr)?,
            None => self.resolve_age(age.unwrap_or(DEFAULT_AGE))?,
        };

        if table == crate::query::DEFAULT_TABLE {
            predicates.push(Predicate::new("greater-than").with_operand(0));
        }

        tracing::debug!(start = window.start, stop = window.stop, "resolved time window");
        group.insert(TIMESTAMP_COLUMN.to_string(), predicates);
        Ok(Some(window))
    }

    fn resolve_age(&self, age: &str) -> QueryResult<(TimeWindow, Vec<Predicate>)> {
        let seconds = timespec_to_seconds(age)?;
        let stop = self.now.timestamp();
        let start = stop.saturating_sub(i64::try_from(seconds).unwrap_or(i64::MAX));

        Ok((
            TimeWindow { start, stop },
            vec![Predicate::new("at-least").with_operand(start)],
        ))
    }

    fn resolve_time(&self, expr: &str) -> QueryResult<(TimeWindow, Vec<Predicate>)> {
        let ranges = self.source.ranges(expr, self.now);
        let range = match ranges.as_slice() {
            [] => {
                return Err(QueryError::InvalidTimeRange(format!(
                    "no date range found in '{}'",
                    expr
                )))
            }
            [range] => *range,
            _ => {
                return Err(QueryError::InvalidTimeRange(format!(
                    "'{}' contains {} ranges, expected one",
                    expr,
                    ranges.len()
                )))
            }
        };

        let end = range.end.ok_or_else(|| {
            QueryError::InvalidTimeRange(format!("'{}' has a start but no end", expr))
        })?;

        // Zero means unset on the service side.
        let start = match range.start.timestamp() {
            0 => 1,
            secs => secs,
        };
        let stop = end.timestamp();

        Ok((
            TimeWindow { start, stop },
            vec![
                Predicate::new("at-least").with_operand(start),
                Predicate::new("less-than").with_operand(stop),
            ],
        ))
    }
}
