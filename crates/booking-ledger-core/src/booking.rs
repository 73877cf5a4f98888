//! Booking rows as delivered by the data API, and the pipeline that turns a
//! batch of them into tagged appointments and engaged clients.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::engagement::{classify_engagement, last_visit, EngagementStatus};
use crate::identity::{resolve_clients, CanonicalClient, ContactRecord};
use crate::lifecycle::{Appointment, AppointmentFacts, RawStatus};
use crate::time_window::parse_time_window;
use crate::ClassificationRuleset;

/// One row of the booking feed. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingRow {
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub invitee_name: String,
    #[serde(default)]
    pub invitee_email: Option<String>,
    #[serde(default)]
    pub invitee_phone: Option<String>,
    #[serde(default)]
    pub booking_host_name: Option<String>,
    #[serde(default)]
    pub booking_resource_name: Option<String>,
    #[serde(default)]
    pub booking_start_at: Option<String>,
    #[serde(default)]
    pub booking_invitee_time: Option<String>,
    #[serde(default)]
    pub booking_status: Option<String>,
    #[serde(default)]
    pub has_session_notes: Option<bool>,
}

impl BookingRow {
    /// Appointment id: `booking_id` when present, else `row-<index>`.
    #[must_use]
    pub fn appointment_id(&self, index: usize) -> String {
        match non_blank(self.booking_id.as_deref()) {
            Some(id) => id.to_string(),
            None => format!("row-{index}"),
        }
    }

    /// Slot text to classify.
    ///
    /// `booking_start_at` is preferred; `booking_invitee_time` is used when the
    /// former is blank or unparsable and the latter parses.
    #[must_use]
    pub fn time_text(&self, ruleset: &ClassificationRuleset) -> String {
        let candidates = [
            non_blank(self.booking_start_at.as_deref()),
            non_blank(self.booking_invitee_time.as_deref()),
        ];
        let offset = ruleset.default_offset();
        candidates
            .iter()
            .flatten()
            .find(|text| parse_time_window(text, offset).is_parsed())
            .or_else(|| candidates.iter().flatten().next())
            .map_or_else(String::new, |text| (*text).to_string())
    }

    #[must_use]
    pub fn facts(&self, index: usize, ruleset: &ClassificationRuleset) -> AppointmentFacts {
        AppointmentFacts {
            id: self.appointment_id(index),
            raw_status: RawStatus::parse(self.booking_status.as_deref().unwrap_or_default()),
            has_session_notes: self.has_session_notes.unwrap_or(false),
            raw_time_text: self.time_text(ruleset),
            host_name: non_blank(self.booking_host_name.as_deref()).map(str::to_string),
            resource_name: non_blank(self.booking_resource_name.as_deref()).map(str::to_string),
        }
    }

    #[must_use]
    pub fn to_appointment(
        &self,
        index: usize,
        now: OffsetDateTime,
        ruleset: &ClassificationRuleset,
    ) -> Appointment {
        Appointment::classify(self.facts(index, ruleset), now, ruleset.default_offset())
    }

    #[must_use]
    pub fn to_contact_record<A>(&self, appointment: A) -> ContactRecord<A> {
        ContactRecord {
            name: self.invitee_name.trim().to_string(),
            email: self.invitee_email.clone(),
            phone: self.invitee_phone.clone(),
            appointment,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// A resolved client with its tagged appointments and engagement at `now`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientEngagement {
    #[serde(flatten)]
    pub client: CanonicalClient<Appointment>,
    pub engagement: EngagementStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_visit_at: Option<OffsetDateTime>,
}

/// Tags every row as of `now`, preserving input order.
#[must_use]
pub fn classify_appointments(
    rows: &[BookingRow],
    now: OffsetDateTime,
    ruleset: &ClassificationRuleset,
) -> Vec<Appointment> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| row.to_appointment(index, now, ruleset))
        .collect()
}

/// Tags rows, merges them into clients and classifies each client's
/// engagement. Every row's appointment ends up in exactly one client.
#[must_use]
pub fn build_client_book(
    rows: &[BookingRow],
    now: OffsetDateTime,
    ruleset: &ClassificationRuleset,
) -> Vec<ClientEngagement> {
    let window = ruleset.engagement_window();
    let records = rows
        .iter()
        .enumerate()
        .map(|(index, row)| row.to_contact_record(row.to_appointment(index, now, ruleset)))
        .collect();

    resolve_clients(records)
        .into_iter()
        .map(|client| {
            let engagement = classify_engagement(&client.appointments, now, window);
            tracing::debug!(
                client_id = %client.id,
                appointments = client.appointments.len(),
                engagement = engagement.as_str(),
                "classified client engagement"
            );
            ClientEngagement {
                last_visit_at: last_visit(&client.appointments),
                client,
                engagement,
            }
        })
        .collect()
}
