//! Client identity resolution and lifecycle classification for booking rows.
//!
//! The crate is a set of pure functions over already-fetched booking data:
//! - [`time_window`] parses free-text slot strings into timestamps.
//! - [`lifecycle`] derives one [`DerivedStatus`] per appointment.
//! - [`identity`] merges contact records sharing an email or phone into
//!   [`CanonicalClient`]s.
//! - [`engagement`] tags each client active, inactive or drop-out.
//! - [`booking`] maps feed rows onto the above and runs the whole pipeline.
//!
//! Nothing here reads a clock, touches the network or persists state. Every
//! evaluation takes `now` explicitly so identical inputs always classify the
//! same way.

pub mod booking;
pub mod engagement;
pub mod identity;
pub mod lifecycle;
pub mod summary;
pub mod time_window;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime, UtcOffset};

pub use booking::{build_client_book, classify_appointments, BookingRow, ClientEngagement};
pub use engagement::{classify_engagement, EngagementStatus};
pub use identity::{
    normalize_email, normalize_phone, resolve_clients, CanonicalClient, ClientId, ContactRecord,
};
pub use lifecycle::{derive_status, Appointment, AppointmentFacts, DerivedStatus, RawStatus};
pub use summary::{filter_by_engagement, filter_by_status, EngagementSummary, StatusSummary};
pub use time_window::{parse_time_window, ParsedWindow, TimeWindow, UnparsedReason};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Exclusive bound on `|default_utc_offset_minutes|`.
const MAX_OFFSET_MINUTES: i32 = 24 * 60;

/// Tunables shared by the classifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationRuleset {
    pub ruleset_version: u32,
    /// Length of the rolling window, ending at `now`, that makes a client active.
    pub engagement_window_days: u32,
    /// Offset applied to slot strings that carry no zone token.
    pub default_utc_offset_minutes: i16,
}

impl ClassificationRuleset {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            ruleset_version: 1,
            engagement_window_days: 30,
            default_utc_offset_minutes: 330,
        }
    }

    /// Validates window and offset bounds.
    ///
    /// # Errors
    /// Returns [`LedgerError::Configuration`] when one or more
    /// ruleset fields are outside allowed bounds.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.ruleset_version == 0 {
            return Err(LedgerError::Configuration(
                "ruleset_version MUST be >= 1".to_string(),
            ));
        }

        if !(1..=3650).contains(&self.engagement_window_days) {
            return Err(LedgerError::Configuration(
                "engagement_window_days MUST be in [1, 3650]".to_string(),
            ));
        }

        if i32::from(self.default_utc_offset_minutes).abs() >= MAX_OFFSET_MINUTES {
            return Err(LedgerError::Configuration(
                "default_utc_offset_minutes MUST be within +/- 24 hours".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn engagement_window(&self) -> Duration {
        Duration::days(i64::from(self.engagement_window_days))
    }

    /// Offset for zone-less slot strings. Falls back to UTC for values that
    /// [`Self::validate`] would reject.
    #[must_use]
    pub fn default_offset(&self) -> UtcOffset {
        let minutes = i32::from(self.default_utc_offset_minutes);
        if minutes.abs() >= MAX_OFFSET_MINUTES {
            return UtcOffset::UTC;
        }
        UtcOffset::from_whole_seconds(minutes * 60).unwrap_or(UtcOffset::UTC)
    }

    /// Decodes and validates a ruleset from JSON.
    ///
    /// # Errors
    /// Returns [`LedgerError::Configuration`] when JSON decoding fails
    /// or decoded values violate ruleset constraints.
    pub fn from_json(value: &Value) -> Result<Self, LedgerError> {
        let ruleset: Self = serde_json::from_value(value.clone()).map_err(|err| {
            LedgerError::Configuration(format!("invalid ruleset JSON payload: {err}"))
        })?;
        ruleset.validate()?;
        Ok(ruleset)
    }
}

impl Default for ClassificationRuleset {
    fn default() -> Self {
        Self::v1()
    }
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`LedgerError::Validation`] when parsing fails or an input
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, LedgerError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| LedgerError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(LedgerError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`LedgerError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, LedgerError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            LedgerError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn days_since(earlier: OffsetDateTime, later: OffsetDateTime) -> f32 {
    if later <= earlier {
        return 0.0;
    }

    let elapsed = later - earlier;
    elapsed.whole_seconds() as f32 / Duration::DAY.whole_seconds() as f32
}
