use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::model::{ApplicationNumber, RemoteStatus, StatusMap};

/// One value of the status response object. Unknown fields are ignored.
///
/// A null or missing label is kept as an entry with an empty status: it never
/// matches the validated label, but its appointments still count.
#[derive(Deserialize, Debug)]
pub struct StatusEntry {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub appointments: Option<Vec<Value>>,
}

#[derive(Deserialize, Debug)]
pub struct AddAppointmentResp {
    pub success: bool,
}

#[derive(Deserialize, Debug)]
pub struct DeleteAppointmentResp {
    pub rowcount: i64,
}

/// Parse a status response body keyed by application number.
///
/// Any malformed entry fails the whole body: callers get no partial map.
pub fn parse_status_response(body: &str) -> Result<StatusMap, serde_json::Error> {
    let raw: HashMap<String, StatusEntry> = serde_json::from_str(body)?;
    Ok(raw
        .into_iter()
        .map(|(id, entry)| {
            (
                ApplicationNumber::new(id),
                RemoteStatus {
                    status: entry.status.unwrap_or_default(),
                    appointments: entry.appointments.unwrap_or_default(),
                },
            )
        })
        .collect())
}

pub fn parse_add_response(body: &str) -> Result<bool, serde_json::Error> {
    let resp: AddAppointmentResp = serde_json::from_str(body)?;
    Ok(resp.success)
}

/// Deletion counts as done only when the registry removed at least one row.
pub fn parse_delete_response(body: &str) -> Result<bool, serde_json::Error> {
    let resp: DeleteAppointmentResp = serde_json::from_str(body)?;
    Ok(resp.rowcount > 0)
}
