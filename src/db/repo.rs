use super::model::FormEntry;
use crate::model::{Appointment, AppointmentResponse, Localization, SyncAttemptRecord, SyncConfig};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", expanded_path, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---- sync configuration ----

#[instrument(skip_all, fields(task_id = config.task_id))]
pub async fn insert_sync_config(pool: &Pool, config: &SyncConfig) -> Result<()> {
    sqlx::query("INSERT INTO sync_config (task_id, form_id, entry_id) VALUES (?, ?, ?)")
        .bind(config.task_id)
        .bind(config.form_id)
        .bind(config.entry_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn load_sync_config(pool: &Pool, task_id: i64) -> Result<Option<SyncConfig>> {
    let row = sqlx::query("SELECT task_id, form_id, entry_id FROM sync_config WHERE task_id = ?")
        .bind(task_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| SyncConfig {
        task_id: row.get("task_id"),
        form_id: row.get("form_id"),
        entry_id: row.get("entry_id"),
    }))
}

#[instrument(skip_all, fields(task_id = config.task_id))]
pub async fn store_sync_config(pool: &Pool, config: &SyncConfig) -> Result<()> {
    sqlx::query("UPDATE sync_config SET form_id = ?, entry_id = ? WHERE task_id = ?")
        .bind(config.form_id)
        .bind(config.entry_id)
        .bind(config.task_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert the configuration, or update it when the task is already configured.
pub async fn save_sync_config(pool: &Pool, config: &SyncConfig) -> Result<()> {
    if load_sync_config(pool, config.task_id).await?.is_some() {
        store_sync_config(pool, config).await
    } else {
        insert_sync_config(pool, config).await
    }
}

#[instrument(skip_all)]
pub async fn delete_sync_config(pool: &Pool, task_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM sync_config WHERE task_id = ?")
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---- sync attempts ----

#[instrument(skip_all, fields(history_id = record.history_id, task_id = record.task_id))]
pub async fn insert_sync_attempt(pool: &Pool, record: &SyncAttemptRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_attempts (history_id, task_id, is_successful, application_numbers)
         VALUES (?, ?, ?, ?)",
    )
    .bind(record.history_id)
    .bind(record.task_id)
    .bind(record.is_successful)
    .bind(record.application_numbers.as_deref())
    .execute(pool)
    .await
    .context("failed to record sync attempt")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn load_sync_attempt(
    pool: &Pool,
    history_id: i64,
    task_id: i64,
) -> Result<Option<SyncAttemptRecord>> {
    let row = sqlx::query(
        "SELECT history_id, task_id, is_successful, application_numbers
         FROM sync_attempts WHERE history_id = ? AND task_id = ?",
    )
    .bind(history_id)
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| SyncAttemptRecord {
        history_id: row.get("history_id"),
        task_id: row.get("task_id"),
        is_successful: row.get("is_successful"),
        application_numbers: row.get("application_numbers"),
    }))
}

#[instrument(skip_all)]
pub async fn delete_sync_attempt(pool: &Pool, history_id: i64, task_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM sync_attempts WHERE history_id = ? AND task_id = ?")
        .bind(history_id)
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_sync_attempts_for_task(pool: &Pool, task_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM sync_attempts WHERE task_id = ?")
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---- host booking views (read-only) ----

#[instrument(skip_all)]
pub async fn find_appointment_by_id(
    pool: &Pool,
    appointment_id: i64,
) -> Result<Option<Appointment>> {
    let row = sqlx::query(
        "SELECT id, form_id, operator_id, starting_date_time FROM appointments WHERE id = ?",
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let starting_date_time: NaiveDateTime = row
        .try_get("starting_date_time")
        .with_context(|| format!("appointment {} has an unreadable start date", appointment_id))?;
    Ok(Some(Appointment {
        id: row.get("id"),
        form_id: row.get("form_id"),
        operator_id: row.get("operator_id"),
        starting_date_time,
    }))
}

/// Responses of an appointment, in storage order.
#[instrument(skip_all)]
pub async fn find_appointment_responses(
    pool: &Pool,
    appointment_id: i64,
) -> Result<Vec<AppointmentResponse>> {
    let rows = sqlx::query(
        "SELECT entry_id, value FROM appointment_responses
         WHERE appointment_id = ? ORDER BY id ASC",
    )
    .bind(appointment_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| AppointmentResponse {
            entry_id: row.get("entry_id"),
            value: row.get("value"),
        })
        .collect())
}

#[instrument(skip_all)]
pub async fn find_localization_for_form(pool: &Pool, form_id: i64) -> Result<Option<Localization>> {
    let address: Option<Option<String>> =
        sqlx::query_scalar("SELECT address FROM form_localizations WHERE form_id = ?")
            .bind(form_id)
            .fetch_optional(pool)
            .await?;
    Ok(address.map(|address| Localization { address }))
}

/// Entries of a form, for picking the field that holds application numbers.
#[instrument(skip_all)]
pub async fn list_form_entries(pool: &Pool, form_id: i64) -> Result<Vec<FormEntry>> {
    let entries = sqlx::query_as::<_, FormEntry>(
        "SELECT id, title FROM form_entries WHERE form_id = ? ORDER BY id ASC",
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}
