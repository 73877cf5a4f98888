//! Slot strings as rendered by the booking platform, e.g.
//! `Monday, January 15, 2024 at 9:00 AM - 10:00 AM IST`.
//!
//! [`parse_time_window`] never fails loudly. Anything it cannot turn into two
//! valid timestamps comes back as [`ParsedWindow::Unparsed`] and the caller
//! picks the fallback.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

const IST_OFFSET_SECONDS: i32 = 5 * 3600 + 30 * 60;

/// Tried in order; the first description that yields both ends wins.
const DATE_TIME_FORMATS: [&str; 2] = [
    "[month repr:long] [day padding:none], [year] [hour repr:12 padding:none]:[minute] [period]",
    "[month repr:short] [day padding:none], [year] [hour repr:12 padding:none]:[minute] [period]",
];

fn slot_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            ^\s*[a-z]+,?\s+
            ([a-z]+)\.?\s+(\d{1,2}),?\s+(\d{4})
            \s+at\s+
            (\d{1,2}:\d{2})\s*([ap])\.?m\.?
            \s*[-\x{2013}\x{2014}]\s*
            (\d{1,2}:\d{2})\s*([ap])\.?m\.?
            (?:\s+(ist))?
            \s*$",
        )
        .ok()
    })
    .as_ref()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct TimeWindow {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl TimeWindow {
    #[must_use]
    pub fn has_ended(&self, now: OffsetDateTime) -> bool {
        self.end < now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnparsedReason {
    Empty,
    NoMatch,
    InvalidDate,
}

impl UnparsedReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::NoMatch => "no_match",
            Self::InvalidDate => "invalid_date",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParsedWindow {
    Window(TimeWindow),
    Unparsed { reason: UnparsedReason },
}

impl ParsedWindow {
    #[must_use]
    pub fn window(&self) -> Option<&TimeWindow> {
        match self {
            Self::Window(window) => Some(window),
            Self::Unparsed { .. } => None,
        }
    }

    #[must_use]
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Window(_))
    }
}

/// Parses a booking slot string into start and end timestamps.
///
/// `default_offset` applies when the string carries no zone token; a trailing
/// `IST` always means +05:30. The weekday is not cross-checked against the date.
/// An end time earlier than the start time belongs to the following day.
#[must_use]
pub fn parse_time_window(raw: &str, default_offset: UtcOffset) -> ParsedWindow {
    if raw.trim().is_empty() {
        return ParsedWindow::Unparsed {
            reason: UnparsedReason::Empty,
        };
    }

    let Some(captures) = slot_regex().and_then(|re| re.captures(raw)) else {
        tracing::debug!(raw, "slot text does not match the expected shape");
        return ParsedWindow::Unparsed {
            reason: UnparsedReason::NoMatch,
        };
    };

    let group = |index: usize| captures.get(index).map_or("", |m| m.as_str());
    let month = title_case(group(1));
    let start_time = format!("{} {}M", group(4), group(5).to_ascii_uppercase());
    let end_time = format!("{} {}M", group(6), group(7).to_ascii_uppercase());

    let offset = if captures.get(8).is_some() {
        UtcOffset::from_whole_seconds(IST_OFFSET_SECONDS).unwrap_or(default_offset)
    } else {
        default_offset
    };

    // "Sept" and similar are retried as their three-letter form, and kept only
    // when the written word is a prefix of the resolved month name.
    let short_month: String = month.chars().take(3).collect();
    let attempts = DATE_TIME_FORMATS
        .iter()
        .map(|description| (*description, month.as_str()))
        .chain((short_month != month).then_some((DATE_TIME_FORMATS[1], short_month.as_str())));

    for (description, month_text) in attempts {
        let Ok(items) = time::format_description::parse(description) else {
            continue;
        };
        let date = format!("{month_text} {}, {}", group(2), group(3));
        let start = PrimitiveDateTime::parse(&format!("{date} {start_time}"), &items);
        let end = PrimitiveDateTime::parse(&format!("{date} {end_time}"), &items);
        let (Ok(start), Ok(end)) = (start, end) else {
            continue;
        };
        if !start
            .month()
            .to_string()
            .to_ascii_lowercase()
            .starts_with(&month.to_ascii_lowercase())
        {
            continue;
        }

        let start = start.assume_offset(offset);
        let mut end = end.assume_offset(offset);
        if end < start {
            end += Duration::DAY;
        }
        return ParsedWindow::Window(TimeWindow { start, end });
    }

    tracing::debug!(raw, "slot text names an impossible date or time");
    ParsedWindow::Unparsed {
        reason: UnparsedReason::InvalidDate,
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
