use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Token identifying one registry record, as typed by the citizen in a form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationNumber(String);

impl ApplicationNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplicationNumber {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Remote state of one application number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub status: String,
    /// Appointments already bound to the application number on the registry side.
    pub appointments: Vec<serde_json::Value>,
}

impl RemoteStatus {
    /// Case-sensitive comparison against the configured "validated" label.
    pub fn is_validated(&self, validated_status: &str) -> bool {
        self.status == validated_status
    }

    pub fn has_appointments(&self) -> bool {
        !self.appointments.is_empty()
    }
}

/// Parsed status response. An identifier missing from the map has an unknown status.
pub type StatusMap = HashMap<ApplicationNumber, RemoteStatus>;

/// Per-task configuration: where application numbers live in the booking form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub task_id: i64,
    pub form_id: i64,
    pub entry_id: i64,
}

/// Audit row written once per (history, task) execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAttemptRecord {
    pub history_id: i64,
    pub task_id: i64,
    pub is_successful: bool,
    pub application_numbers: Option<String>,
}

/// Slice of a host appointment read by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub id: i64,
    pub form_id: i64,
    /// Set when a back-office operator booked the appointment.
    pub operator_id: Option<String>,
    pub starting_date_time: NaiveDateTime,
}

/// One stored form response of an appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentResponse {
    pub entry_id: i64,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localization {
    pub address: Option<String>,
}

/// Slot an appointment occupied before being rescheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousSlot {
    pub form_id: i64,
    pub starting_date_time: NaiveDateTime,
}

/// Mutation requested on the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncAction {
    Create,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Delete => "delete",
        }
    }
}

/// Outcome of the validity predicate for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Unknown,
    ValidForCreate,
    ValidForDelete,
    Invalid,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
}
