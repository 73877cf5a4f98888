//! Per-appointment lifecycle status.
//!
//! The status is a snapshot at `now`, never written back to the booking
//! source. [`derive_status`] is the single guard chain every caller shares.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use crate::time_window::{parse_time_window, ParsedWindow};

/// Status as reported by the booking platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RawStatus {
    Confirmed,
    Cancelled,
    NoShow,
}

impl RawStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Maps free-form platform status text onto a [`RawStatus`].
    ///
    /// Case, surrounding whitespace and `_`/`-`/space separators are ignored.
    /// Missing or unrecognized values are treated as [`RawStatus::Confirmed`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let folded = value
            .trim()
            .to_ascii_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        match folded.as_str() {
            "cancelled" | "canceled" => Self::Cancelled,
            "no show" | "noshow" => Self::NoShow,
            _ => Self::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DerivedStatus {
    Scheduled,
    Completed,
    PendingNotes,
    Cancelled,
    NoShow,
}

impl DerivedStatus {
    pub const ALL: [Self; 5] = [
        Self::Scheduled,
        Self::Completed,
        Self::PendingNotes,
        Self::Cancelled,
        Self::NoShow,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::PendingNotes => "pending_notes",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            "pending_notes" => Some(Self::PendingNotes),
            "cancelled" => Some(Self::Cancelled),
            "no_show" => Some(Self::NoShow),
            _ => None,
        }
    }
}

/// Derives the lifecycle status from an already-parsed slot.
///
/// Guards run top to bottom and the first hit wins, so a cancelled booking
/// that still has session notes stays cancelled.
#[must_use]
pub fn derive_status_from_window(
    raw_status: RawStatus,
    has_session_notes: bool,
    window: &ParsedWindow,
    now: OffsetDateTime,
) -> DerivedStatus {
    if raw_status == RawStatus::Cancelled {
        return DerivedStatus::Cancelled;
    }
    if raw_status == RawStatus::NoShow {
        return DerivedStatus::NoShow;
    }
    if has_session_notes {
        return DerivedStatus::Completed;
    }
    let Some(window) = window.window() else {
        return DerivedStatus::Scheduled;
    };
    if window.has_ended(now) {
        return DerivedStatus::PendingNotes;
    }
    DerivedStatus::Scheduled
}

/// Derives the lifecycle status straight from the slot text.
///
/// An unparsable slot is reported as [`DerivedStatus::Scheduled`].
#[must_use]
pub fn derive_status(
    raw_status: RawStatus,
    has_session_notes: bool,
    raw_time_text: &str,
    now: OffsetDateTime,
    default_offset: UtcOffset,
) -> DerivedStatus {
    let window = parse_time_window(raw_time_text, default_offset);
    derive_status_from_window(raw_status, has_session_notes, &window, now)
}

/// Source fields of one booking row needed to classify it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentFacts {
    pub id: String,
    pub raw_status: RawStatus,
    pub has_session_notes: bool,
    pub raw_time_text: String,
    pub host_name: Option<String>,
    pub resource_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: String,
    pub raw_status: RawStatus,
    pub has_session_notes: bool,
    pub raw_time_text: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    pub derived_status: DerivedStatus,
    pub host_name: Option<String>,
    pub resource_name: Option<String>,
}

impl Appointment {
    /// Parses the slot once and tags the appointment as of `now`.
    #[must_use]
    pub fn classify(facts: AppointmentFacts, now: OffsetDateTime, default_offset: UtcOffset) -> Self {
        let window = parse_time_window(&facts.raw_time_text, default_offset);
        let derived_status =
            derive_status_from_window(facts.raw_status, facts.has_session_notes, &window, now);
        let (start_at, end_at) = match window.window() {
            Some(window) => (Some(window.start), Some(window.end)),
            None => (None, None),
        };

        tracing::trace!(
            appointment_id = %facts.id,
            status = derived_status.as_str(),
            parsed = window.is_parsed(),
            "classified appointment"
        );

        Self {
            id: facts.id,
            raw_status: facts.raw_status,
            has_session_notes: facts.has_session_notes,
            raw_time_text: facts.raw_time_text,
            start_at,
            end_at,
            derived_status,
            host_name: facts.host_name,
            resource_name: facts.resource_name,
        }
    }

    /// True when the status fell back to `scheduled` only because the slot
    /// text could not be parsed.
    #[must_use]
    pub fn is_unparsed_scheduled(&self) -> bool {
        self.derived_status == DerivedStatus::Scheduled && self.start_at.is_none()
    }
}
