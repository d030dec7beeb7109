use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use registry_sync::config;
use registry_sync::db;
use registry_sync::model::{PreviousSlot, SyncConfig};
use registry_sync::registry::RegistryClient;
use registry_sync::sync::SyncSettings;
use registry_sync::tasks::{self, AppointmentEvent, TaskKind};

#[derive(Debug, Parser)]
#[command(author, version, about = "Synchronize booked appointments with the registry")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register an appointment's application numbers on the registry
    Add {
        #[arg(long)]
        task_id: i64,
        #[arg(long)]
        history_id: i64,
        #[arg(long)]
        appointment_id: i64,
    },
    /// Remove an appointment from the registry
    Delete {
        #[arg(long)]
        task_id: i64,
        #[arg(long)]
        history_id: i64,
        #[arg(long)]
        appointment_id: i64,
        /// Form of the slot being left, when rescheduling
        #[arg(long, requires = "previous_start")]
        previous_form_id: Option<i64>,
        /// Start of the slot being left, e.g. 2024-01-01T10:00:00
        #[arg(long, requires = "previous_form_id")]
        previous_start: Option<NaiveDateTime>,
    },
    /// Print the history line of one task execution
    History {
        #[arg(long)]
        task_id: i64,
        #[arg(long)]
        history_id: i64,
    },
    /// List the entries of a form
    Entries {
        #[arg(long)]
        form_id: i64,
    },
    /// Set the form entry holding application numbers for a task
    Configure {
        #[arg(long)]
        task_id: i64,
        #[arg(long)]
        form_id: i64,
        #[arg(long)]
        entry_id: i64,
    },
    /// Remove a task's configuration and recorded attempts
    RemoveTask {
        #[arg(long)]
        task_id: i64,
    },
    /// Remove the attempt recorded for one history entry
    RemoveHistory {
        #[arg(long)]
        task_id: i64,
        #[arg(long)]
        history_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::Add {
            task_id,
            history_id,
            appointment_id,
        } => {
            let event = AppointmentEvent {
                appointment_id,
                previous: None,
            };
            run(&pool, &cfg, TaskKind::AddAppointment, task_id, history_id, &event).await
        }
        Command::Delete {
            task_id,
            history_id,
            appointment_id,
            previous_form_id,
            previous_start,
        } => {
            let previous = previous_form_id.zip(previous_start).map(
                |(form_id, starting_date_time)| PreviousSlot {
                    form_id,
                    starting_date_time,
                },
            );
            let event = AppointmentEvent {
                appointment_id,
                previous,
            };
            run(&pool, &cfg, TaskKind::DeleteAppointment, task_id, history_id, &event).await
        }
        Command::History {
            task_id,
            history_id,
        } => {
            let line =
                tasks::display_task_information(&pool, history_id, task_id, cfg.app.locale)
                    .await?;
            match line {
                Some(line) => println!("{}", line),
                None => println!("no attempt recorded"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Entries { form_id } => {
            for entry in db::list_form_entries(&pool, form_id).await? {
                println!("{}\t{}", entry.id, entry.title);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Configure {
            task_id,
            form_id,
            entry_id,
        } => {
            let config = SyncConfig {
                task_id,
                form_id,
                entry_id,
            };
            tasks::configure_task(&pool, &config).await?;
            info!(task_id, form_id, entry_id, "task configured");
            Ok(ExitCode::SUCCESS)
        }
        Command::RemoveTask { task_id } => {
            tasks::remove_task_config(&pool, task_id).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::RemoveHistory {
            task_id,
            history_id,
        } => {
            tasks::remove_task_information(&pool, history_id, task_id).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(
    pool: &db::Pool,
    cfg: &config::Config,
    kind: TaskKind,
    task_id: i64,
    history_id: i64,
    event: &AppointmentEvent,
) -> Result<ExitCode> {
    let registry = RegistryClient::from_config(&cfg.registry)
        .context("failed to build registry client")?;
    let settings = SyncSettings::from_config(cfg);

    info!(
        task = tasks::task_title(kind, cfg.app.locale),
        appointment_id = event.appointment_id,
        "running task"
    );
    let success =
        tasks::execute(pool, &registry, &settings, kind, task_id, history_id, event).await;
    println!("{}", success);
    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
