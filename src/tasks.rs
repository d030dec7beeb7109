//! Workflow task handlers: "add registry appointment" and "delete registry appointment".
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::db::{self, Pool};
use crate::model::{Locale, PreviousSlot, SyncAction, SyncAttemptRecord, SyncConfig};
use crate::registry::{format_appointment_date, RegistryService};
use crate::sync::{AppointmentContext, SyncEngine, SyncOutcome, SyncSettings};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskKind {
    AddAppointment,
    DeleteAppointment,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::AddAppointment => "add_registry_appointment",
            TaskKind::DeleteAppointment => "delete_registry_appointment",
        }
    }

    pub fn action(&self) -> SyncAction {
        match self {
            TaskKind::AddAppointment => SyncAction::Create,
            TaskKind::DeleteAppointment => SyncAction::Delete,
        }
    }
}

/// Local appointment change that triggered the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentEvent {
    pub appointment_id: i64,
    /// Set when the appointment is being rescheduled; deletions target this slot.
    pub previous: Option<PreviousSlot>,
}

/// Run a task for one workflow history entry and record the attempt.
///
/// Never fails: every error is logged and reported as `false`.
#[instrument(skip_all, fields(kind = kind.as_str(), task_id = task_id, history_id = history_id))]
pub async fn execute(
    pool: &Pool,
    registry: &dyn RegistryService,
    settings: &SyncSettings,
    kind: TaskKind,
    task_id: i64,
    history_id: i64,
    event: &AppointmentEvent,
) -> bool {
    let outcome = match run_task(pool, registry, settings, kind, task_id, event).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(?err, "registry task failed");
            SyncOutcome::failed(None)
        }
    };

    let record = SyncAttemptRecord {
        history_id,
        task_id,
        is_successful: outcome.success,
        application_numbers: outcome.application_numbers,
    };
    if let Err(err) = db::insert_sync_attempt(pool, &record).await {
        error!(?err, "failed to save sync attempt");
    }
    info!(success = record.is_successful, "registry task finished");
    record.is_successful
}

async fn run_task(
    pool: &Pool,
    registry: &dyn RegistryService,
    settings: &SyncSettings,
    kind: TaskKind,
    task_id: i64,
    event: &AppointmentEvent,
) -> Result<SyncOutcome> {
    let Some(config) = db::load_sync_config(pool, task_id).await? else {
        warn!("task has no configuration; skipping registry sync");
        return Ok(SyncOutcome::failed(None));
    };
    let appointment = db::find_appointment_by_id(pool, event.appointment_id)
        .await?
        .ok_or_else(|| anyhow!("appointment {} not found", event.appointment_id))?;
    let responses = db::find_appointment_responses(pool, appointment.id).await?;

    let (form_id, starting) = match (kind, &event.previous) {
        (TaskKind::DeleteAppointment, Some(previous)) => {
            (previous.form_id, previous.starting_date_time)
        }
        _ => (appointment.form_id, appointment.starting_date_time),
    };
    let meeting_point = meeting_point_for_form(pool, form_id).await?;

    let ctx = AppointmentContext {
        appointment,
        responses,
        entry_id: config.entry_id,
        meeting_point,
        appointment_date: format_appointment_date(&starting),
    };
    let engine = SyncEngine::new(registry, settings);
    Ok(engine.run(kind.action(), &ctx).await)
}

/// Address of the form's localization, or empty when the form has none.
async fn meeting_point_for_form(pool: &Pool, form_id: i64) -> Result<String> {
    Ok(db::find_localization_for_form(pool, form_id)
        .await?
        .and_then(|loc| loc.address)
        .unwrap_or_default())
}

/// Save a task configuration after checking the entry belongs to the form.
pub async fn configure_task(pool: &Pool, config: &SyncConfig) -> Result<()> {
    let entries = db::list_form_entries(pool, config.form_id).await?;
    if !entries.iter().any(|e| e.id == config.entry_id) {
        return Err(anyhow!(
            "entry {} does not belong to form {}",
            config.entry_id,
            config.form_id
        ));
    }
    db::save_sync_config(pool, config).await
}

/// Forget the attempt recorded for a deleted history entry.
pub async fn remove_task_information(pool: &Pool, history_id: i64, task_id: i64) -> Result<()> {
    db::delete_sync_attempt(pool, history_id, task_id).await
}

/// Drop a task: its configuration and every attempt it recorded.
pub async fn remove_task_config(pool: &Pool, task_id: i64) -> Result<()> {
    db::delete_sync_config(pool, task_id).await?;
    db::delete_sync_attempts_for_task(pool, task_id).await
}

pub fn task_title(kind: TaskKind, locale: Locale) -> &'static str {
    match (kind, locale) {
        (TaskKind::AddAppointment, Locale::En) => "Add the appointment to the registry",
        (TaskKind::AddAppointment, Locale::Fr) => "Ajouter le rendez-vous au registre",
        (TaskKind::DeleteAppointment, Locale::En) => "Delete the appointment from the registry",
        (TaskKind::DeleteAppointment, Locale::Fr) => "Supprimer le rendez-vous du registre",
    }
}

/// Localized history line for one execution, if the task recorded one.
pub async fn display_task_information(
    pool: &Pool,
    history_id: i64,
    task_id: i64,
    locale: Locale,
) -> Result<Option<String>> {
    let record = db::load_sync_attempt(pool, history_id, task_id).await?;
    Ok(record.map(|r| history_message(&r, locale)))
}

pub fn history_message(record: &SyncAttemptRecord, locale: Locale) -> String {
    let numbers = record
        .application_numbers
        .as_deref()
        .filter(|n| !n.trim().is_empty());
    let outcome = match (locale, record.is_successful) {
        (Locale::En, true) => "Registry synchronization succeeded",
        (Locale::En, false) => "Registry synchronization failed",
        (Locale::Fr, true) => "Synchronisation avec le registre réussie",
        (Locale::Fr, false) => "Échec de la synchronisation avec le registre",
    };
    match (locale, record.is_successful, numbers) {
        (Locale::En, _, Some(n)) => format!("{} for application number(s): {}", outcome, n),
        (Locale::En, true, None) => format!("{} (no application number)", outcome),
        (Locale::Fr, _, Some(n)) => {
            format!("{} pour le(s) numéro(s) de pré-demande : {}", outcome, n)
        }
        (Locale::Fr, true, None) => format!("{} (aucun numéro de pré-demande)", outcome),
        (_, false, None) => outcome.to_string(),
    }
}
