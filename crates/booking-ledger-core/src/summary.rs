//! Counts and filters consumed by status badges and client tables.

use serde::{Deserialize, Serialize};

use crate::booking::ClientEngagement;
use crate::engagement::EngagementStatus;
use crate::lifecycle::{Appointment, DerivedStatus};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSummary {
    pub total: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub pending_notes: usize,
    pub cancelled: usize,
    pub no_show: usize,
    /// Part of `scheduled` that only fell back there because the slot text
    /// could not be parsed.
    pub unparsed_time: usize,
}

impl StatusSummary {
    #[must_use]
    pub fn from_appointments(appointments: &[Appointment]) -> Self {
        let mut summary = Self::default();
        for appointment in appointments {
            summary.total += 1;
            match appointment.derived_status {
                DerivedStatus::Scheduled => summary.scheduled += 1,
                DerivedStatus::Completed => summary.completed += 1,
                DerivedStatus::PendingNotes => summary.pending_notes += 1,
                DerivedStatus::Cancelled => summary.cancelled += 1,
                DerivedStatus::NoShow => summary.no_show += 1,
            }
            if appointment.is_unparsed_scheduled() {
                summary.unparsed_time += 1;
            }
        }
        summary
    }

    #[must_use]
    pub fn count(&self, status: DerivedStatus) -> usize {
        match status {
            DerivedStatus::Scheduled => self.scheduled,
            DerivedStatus::Completed => self.completed,
            DerivedStatus::PendingNotes => self.pending_notes,
            DerivedStatus::Cancelled => self.cancelled,
            DerivedStatus::NoShow => self.no_show,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngagementSummary {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub drop_out: usize,
}

impl EngagementSummary {
    #[must_use]
    pub fn from_clients(clients: &[ClientEngagement]) -> Self {
        let mut summary = Self::default();
        for client in clients {
            summary.total += 1;
            match client.engagement {
                EngagementStatus::Active => summary.active += 1,
                EngagementStatus::Inactive => summary.inactive += 1,
                EngagementStatus::DropOut => summary.drop_out += 1,
            }
        }
        summary
    }
}

#[must_use]
pub fn filter_by_status(appointments: &[Appointment], status: DerivedStatus) -> Vec<Appointment> {
    appointments
        .iter()
        .filter(|appointment| appointment.derived_status == status)
        .cloned()
        .collect()
}

#[must_use]
pub fn filter_by_engagement(
    clients: &[ClientEngagement],
    engagement: EngagementStatus,
) -> Vec<ClientEngagement> {
    clients
        .iter()
        .filter(|client| client.engagement == engagement)
        .cloned()
        .collect()
}
