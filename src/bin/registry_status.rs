use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use registry_sync::config;
use registry_sync::model::{ApplicationNumber, SyncAction};
use registry_sync::registry::RegistryClient;
use registry_sync::sync::classify;

#[derive(Parser, Debug)]
#[command(about = "Print the registry status of application numbers")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Application numbers to look up
    #[arg(required = true)]
    ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let client = RegistryClient::from_config(&cfg.registry)?;

    let ids: Vec<ApplicationNumber> = args
        .ids
        .iter()
        .map(|s| ApplicationNumber::new(s.as_str()))
        .collect();
    let statuses = client.try_fetch_statuses(&ids).await?;
    let validated = cfg.registry.validated_status.as_str();
    for id in &ids {
        match statuses.get(id) {
            Some(status) => println!(
                "{} -> {{ status: {}, appointments: {}, create: {:?}, delete: {:?} }}",
                id,
                status.status,
                status.appointments.len(),
                classify(Some(status), SyncAction::Create, validated),
                classify(Some(status), SyncAction::Delete, validated),
            ),
            None => println!("{} -> unknown", id),
        }
    }
    Ok(())
}
