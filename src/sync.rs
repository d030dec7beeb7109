//! Decides whether a local appointment change may be pushed to the registry,
//! and pushes it one application number at a time.
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::model::{
    ApplicationNumber, Appointment, AppointmentResponse, RemoteStatus, StatusMap, SyncAction,
    Validity,
};
use crate::registry::{AddAppointment, DeleteAppointment, RegistryService};

/// Engine settings taken from the loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub validated_status: String,
    pub separator: String,
    pub management_url: String,
    pub site_name: String,
}

impl SyncSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            validated_status: cfg.registry.validated_status.clone(),
            separator: cfg.registry.separator.clone(),
            management_url: cfg.booking.management_url.clone(),
            site_name: cfg.booking.site_name.clone(),
        }
    }

    pub fn management_url_for(&self, appointment_id: i64) -> String {
        self.management_url
            .replace("{appointment_id}", &appointment_id.to_string())
    }

    /// `<site>_<appointment>_appointment`
    pub fn meeting_point_id_for(&self, appointment_id: i64) -> String {
        format!("{}_{}_appointment", self.site_name, appointment_id)
    }
}

/// Everything the engine needs about one appointment, resolved by the caller.
#[derive(Debug, Clone)]
pub struct AppointmentContext {
    pub appointment: Appointment,
    pub responses: Vec<AppointmentResponse>,
    /// Form entry holding the application numbers.
    pub entry_id: i64,
    pub meeting_point: String,
    pub appointment_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub success: bool,
    /// Raw field value(s) the numbers came from, kept for the audit trail.
    pub application_numbers: Option<String>,
}

impl SyncOutcome {
    pub fn succeeded(application_numbers: Option<String>) -> Self {
        Self {
            success: true,
            application_numbers,
        }
    }

    pub fn failed(application_numbers: Option<String>) -> Self {
        Self {
            success: false,
            application_numbers,
        }
    }
}

/// Application numbers found in an appointment's responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub raw: Option<String>,
    pub numbers: Vec<ApplicationNumber>,
}

/// Only appointments booked by the citizen themselves are synchronized:
/// no operator recorded (absent or blank).
pub fn is_front_office(appointment: &Appointment) -> bool {
    appointment
        .operator_id
        .as_deref()
        .map_or(true, |id| id.trim().is_empty())
}

/// Split a stored field value on any character of `separator`.
/// Blank input yields nothing; empty tokens are dropped.
pub fn split_application_numbers(raw: Option<&str>, separator: &str) -> Vec<ApplicationNumber> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Vec::new();
    };
    raw.split(|c: char| separator.contains(c))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ApplicationNumber::new)
        .collect()
}

/// Collect the numbers held by `entry_id`, whether stored as one delimited
/// value or as several single-valued responses. Several values are joined
/// with the first separator character for the audit trail.
pub fn extract_application_numbers(
    responses: &[AppointmentResponse],
    entry_id: i64,
    separator: &str,
) -> Extracted {
    let values: Vec<&str> = responses
        .iter()
        .filter(|r| r.entry_id == entry_id)
        .filter_map(|r| r.value.as_deref())
        .filter(|v| !v.trim().is_empty())
        .collect();
    if values.is_empty() {
        return Extracted::default();
    }
    let numbers = values
        .iter()
        .flat_map(|v| split_application_numbers(Some(*v), separator))
        .collect();
    let joiner: String = separator.chars().take(1).collect();
    Extracted {
        raw: Some(values.join(joiner.as_str())),
        numbers,
    }
}

pub fn classify(
    status: Option<&RemoteStatus>,
    action: SyncAction,
    validated_status: &str,
) -> Validity {
    let Some(status) = status else {
        return Validity::Unknown;
    };
    let validated = status.is_validated(validated_status);
    match action {
        SyncAction::Create if validated && !status.has_appointments() => Validity::ValidForCreate,
        SyncAction::Delete if validated || status.has_appointments() => Validity::ValidForDelete,
        _ => Validity::Invalid,
    }
}

fn is_valid_for(
    action: SyncAction,
    ids: &[ApplicationNumber],
    statuses: &StatusMap,
    validated_status: &str,
) -> bool {
    let wanted = match action {
        SyncAction::Create => Validity::ValidForCreate,
        SyncAction::Delete => Validity::ValidForDelete,
    };
    !ids.is_empty()
        && !statuses.is_empty()
        && ids
            .iter()
            .all(|id| classify(statuses.get(id), action, validated_status) == wanted)
}

/// Every identifier is validated and not yet bound to a remote appointment.
pub fn is_valid_for_creation(
    ids: &[ApplicationNumber],
    statuses: &StatusMap,
    validated_status: &str,
) -> bool {
    is_valid_for(SyncAction::Create, ids, statuses, validated_status)
}

/// Every identifier is still validated or has a remote appointment to remove.
pub fn is_valid_for_deletion(
    ids: &[ApplicationNumber],
    statuses: &StatusMap,
    validated_status: &str,
) -> bool {
    is_valid_for(SyncAction::Delete, ids, statuses, validated_status)
}

pub struct SyncEngine<'a> {
    registry: &'a dyn RegistryService,
    settings: &'a SyncSettings,
}

impl<'a> SyncEngine<'a> {
    pub fn new(registry: &'a dyn RegistryService, settings: &'a SyncSettings) -> Self {
        Self { registry, settings }
    }

    pub async fn create(&self, ctx: &AppointmentContext) -> SyncOutcome {
        self.run(SyncAction::Create, ctx).await
    }

    pub async fn delete(&self, ctx: &AppointmentContext) -> SyncOutcome {
        self.run(SyncAction::Delete, ctx).await
    }

    /// Validate the whole batch, then mutate identifiers in order, stopping at
    /// the first failure. Mutations already applied are not compensated.
    #[instrument(skip_all, fields(action = action.as_str(), appointment_id = ctx.appointment.id))]
    pub async fn run(&self, action: SyncAction, ctx: &AppointmentContext) -> SyncOutcome {
        if !is_front_office(&ctx.appointment) {
            info!("appointment booked in back office; nothing to synchronize");
            return SyncOutcome::succeeded(None);
        }

        let extracted =
            extract_application_numbers(&ctx.responses, ctx.entry_id, &self.settings.separator);
        if extracted.numbers.is_empty() {
            info!("no application number on appointment");
            return SyncOutcome::succeeded(None);
        }

        let statuses = self.registry.fetch_statuses(&extracted.numbers).await;
        let validated = self.settings.validated_status.as_str();
        let valid = match action {
            SyncAction::Create => is_valid_for_creation(&extracted.numbers, &statuses, validated),
            SyncAction::Delete => is_valid_for_deletion(&extracted.numbers, &statuses, validated),
        };
        if !valid {
            warn!(
                numbers = ?extracted.numbers,
                known = statuses.len(),
                "registry status forbids the change; batch skipped"
            );
            return SyncOutcome::failed(extracted.raw);
        }

        let appointment_id = ctx.appointment.id;
        for number in &extracted.numbers {
            let result = match action {
                SyncAction::Create => {
                    let request = AddAppointment {
                        application_number: number.clone(),
                        management_url: self.settings.management_url_for(appointment_id),
                        meeting_point: ctx.meeting_point.clone(),
                        appointment_date: ctx.appointment_date.clone(),
                        meeting_point_id: Some(self.settings.meeting_point_id_for(appointment_id)),
                    };
                    self.registry.add_appointment(&request).await
                }
                SyncAction::Delete => {
                    let request = DeleteAppointment {
                        application_number: number.clone(),
                        meeting_point: ctx.meeting_point.clone(),
                        appointment_date: ctx.appointment_date.clone(),
                        meeting_point_id: Some(self.settings.meeting_point_id_for(appointment_id)),
                    };
                    self.registry.delete_appointment(&request).await
                }
            };
            match result {
                Ok(true) => info!(application_number = %number, "registry updated"),
                Ok(false) => {
                    warn!(application_number = %number, "registry rejected the change; stopping");
                    return SyncOutcome::failed(extracted.raw);
                }
                Err(err) => {
                    error!(?err, application_number = %number, "registry call failed; stopping");
                    return SyncOutcome::failed(extracted.raw);
                }
            }
        }
        SyncOutcome::succeeded(extracted.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    const VALIDATED: &str = "validated";

    fn status(label: &str, appointments: usize) -> RemoteStatus {
        RemoteStatus {
            status: label.into(),
            appointments: vec![json!({"meeting_point": "x"}); appointments],
        }
    }

    fn response(entry_id: i64, value: Option<&str>) -> AppointmentResponse {
        AppointmentResponse {
            entry_id,
            value: value.map(str::to_string),
        }
    }

    fn ids(values: &[&str]) -> Vec<ApplicationNumber> {
        values.iter().map(|v| ApplicationNumber::from(*v)).collect()
    }

    fn statuses(entries: &[(&str, RemoteStatus)]) -> StatusMap {
        entries
            .iter()
            .map(|(id, s)| (ApplicationNumber::from(*id), s.clone()))
            .collect()
    }

    fn appointment(operator_id: Option<&str>) -> Appointment {
        Appointment {
            id: 1,
            form_id: 1,
            operator_id: operator_id.map(str::to_string),
            starting_date_time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn split_on_separator() {
        assert_eq!(split_application_numbers(Some("A123;B456"), ";"), ids(&["A123", "B456"]));
        assert_eq!(split_application_numbers(Some(" A123 ;; B456;"), ";"), ids(&["A123", "B456"]));
        assert_eq!(split_application_numbers(Some("A1,B2;C3"), ",;"), ids(&["A1", "B2", "C3"]));
        assert!(split_application_numbers(Some("   "), ";").is_empty());
        assert!(split_application_numbers(None, ";").is_empty());
    }

    #[test]
    fn extract_from_single_delimited_value() {
        let responses = vec![
            response(3, Some("Dupont")),
            response(7, Some("A123;B456")),
        ];
        let extracted = extract_application_numbers(&responses, 7, ";");
        assert_eq!(extracted.raw.as_deref(), Some("A123;B456"));
        assert_eq!(extracted.numbers, ids(&["A123", "B456"]));
    }

    #[test]
    fn multiple_values_joined_with_first_separator() {
        let responses = vec![
            response(7, Some("A1")),
            response(7, Some("B2;C3")),
        ];
        let extracted = extract_application_numbers(&responses, 7, ",;");
        assert_eq!(extracted.raw.as_deref(), Some("A1,B2;C3"));
        assert_eq!(extracted.numbers, ids(&["A1", "B2", "C3"]));
    }

    #[test]
    fn extract_from_multiple_values() {
        let responses = vec![
            response(7, Some("A123")),
            response(7, None),
            response(7, Some("B456")),
        ];
        let extracted = extract_application_numbers(&responses, 7, ";");
        assert_eq!(extracted.raw.as_deref(), Some("A123;B456"));
        assert_eq!(extracted.numbers, ids(&["A123", "B456"]));

        assert_eq!(extract_application_numbers(&responses, 8, ";"), Extracted::default());
    }

    #[test]
    fn front_office_predicate() {
        assert!(is_front_office(&appointment(None)));
        assert!(is_front_office(&appointment(Some(""))));
        assert!(!is_front_office(&appointment(Some("admin-42"))));
    }

    #[test]
    fn classify_states() {
        let create = |s: Option<&RemoteStatus>| classify(s, SyncAction::Create, VALIDATED);
        let delete = |s: Option<&RemoteStatus>| classify(s, SyncAction::Delete, VALIDATED);

        assert_eq!(create(None), Validity::Unknown);
        assert_eq!(create(Some(&status(VALIDATED, 0))), Validity::ValidForCreate);
        assert_eq!(create(Some(&status(VALIDATED, 1))), Validity::Invalid);
        assert_eq!(create(Some(&status("Validated", 0))), Validity::Invalid);
        assert_eq!(delete(Some(&status(VALIDATED, 0))), Validity::ValidForDelete);
        assert_eq!(delete(Some(&status("consumed", 2))), Validity::ValidForDelete);
        assert_eq!(delete(Some(&status("", 1))), Validity::ValidForDelete);
        assert_eq!(delete(Some(&status("expired", 0))), Validity::Invalid);
    }

    #[test]
    fn creation_requires_every_number_validated_and_unbound() {
        let list = ids(&["A1", "B2"]);
        let ok = statuses(&[("A1", status(VALIDATED, 0)), ("B2", status(VALIDATED, 0))]);
        assert!(is_valid_for_creation(&list, &ok, VALIDATED));

        let bound = statuses(&[("A1", status(VALIDATED, 0)), ("B2", status(VALIDATED, 1))]);
        assert!(!is_valid_for_creation(&list, &bound, VALIDATED));

        let unvalidated = statuses(&[("A1", status("unknown", 0)), ("B2", status(VALIDATED, 0))]);
        assert!(!is_valid_for_creation(&list, &unvalidated, VALIDATED));

        let missing = statuses(&[("A1", status(VALIDATED, 0))]);
        assert!(!is_valid_for_creation(&list, &missing, VALIDATED));
    }

    #[test]
    fn deletion_requires_validated_or_bound() {
        let list = ids(&["A1", "B2"]);
        let ok = statuses(&[("A1", status(VALIDATED, 0)), ("B2", status("consumed", 1))]);
        assert!(is_valid_for_deletion(&list, &ok, VALIDATED));

        let neither = statuses(&[("A1", status(VALIDATED, 0)), ("B2", status("declared", 0))]);
        assert!(!is_valid_for_deletion(&list, &neither, VALIDATED));
    }

    #[test]
    fn empty_status_map_is_invalid() {
        let empty = StatusMap::new();
        assert!(!is_valid_for_creation(&ids(&["A1"]), &empty, VALIDATED));
        assert!(!is_valid_for_deletion(&ids(&["A1"]), &empty, VALIDATED));
        assert!(!is_valid_for_creation(&[], &empty, VALIDATED));
        assert!(!is_valid_for_deletion(&[], &empty, VALIDATED));
    }

    #[test]
    fn settings_templates() {
        let settings = SyncSettings {
            validated_status: VALIDATED.into(),
            separator: ";".into(),
            management_url: "https://x/rdv?id={appointment_id}".into(),
            site_name: "paris".into(),
        };
        assert_eq!(settings.management_url_for(12), "https://x/rdv?id=12");
        assert_eq!(settings.meeting_point_id_for(12), "paris_12_appointment");
    }
}
