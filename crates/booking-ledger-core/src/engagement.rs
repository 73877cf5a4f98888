//! Client engagement over a rolling window ending at `now`.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::lifecycle::{Appointment, DerivedStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EngagementStatus {
    Active,
    Inactive,
    DropOut,
}

impl EngagementStatus {
    pub const ALL: [Self; 3] = [Self::Active, Self::Inactive, Self::DropOut];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::DropOut => "drop-out",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "drop-out" | "drop_out" | "dropout" => Some(Self::DropOut),
            _ => None,
        }
    }
}

/// Classifies a client from its tagged appointments.
///
/// Cancelled appointments never count. A client is active when any remaining
/// appointment starts on or after `now - window`; later bookings count as
/// well. Otherwise a single remaining appointment marks a drop-out and
/// anything else is inactive. Appointments without a parsed start still count
/// towards history size but can never make a client active.
#[must_use]
pub fn classify_engagement(
    appointments: &[Appointment],
    now: OffsetDateTime,
    window: Duration,
) -> EngagementStatus {
    let history: Vec<&Appointment> = appointments
        .iter()
        .filter(|appointment| appointment.derived_status != DerivedStatus::Cancelled)
        .collect();

    if history.is_empty() {
        return EngagementStatus::Inactive;
    }

    let window_start = now - window;
    let recent = history
        .iter()
        .filter_map(|appointment| appointment.start_at)
        .any(|start| start >= window_start);
    if recent {
        return EngagementStatus::Active;
    }

    if history.len() == 1 {
        return EngagementStatus::DropOut;
    }

    EngagementStatus::Inactive
}

/// Latest parsed start among non-cancelled appointments.
#[must_use]
pub fn last_visit(appointments: &[Appointment]) -> Option<OffsetDateTime> {
    appointments
        .iter()
        .filter(|appointment| appointment.derived_status != DerivedStatus::Cancelled)
        .filter_map(|appointment| appointment.start_at)
        .max()
}
