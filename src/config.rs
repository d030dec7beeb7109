//! Configuration loader and validator for the registry sync plugin.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::Locale;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub registry: Registry,
    pub booking: Booking,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default)]
    pub locale: Locale,
}

/// Remote registry endpoint, credentials and wire vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registry {
    pub base_url: String,
    pub token: String,
    pub token_header: String,
    pub validated_status: String,
    pub separator: String,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    pub paths: RegistryPaths,
    pub params: RegistryParams,
}

/// Endpoint paths appended verbatim to `registry.base_url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryPaths {
    pub add: String,
    pub delete: String,
    pub status: String,
}

/// Query parameter names used by the registry API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryParams {
    pub application_id: String,
    pub application_ids: String,
    pub management_url: String,
    pub meeting_point: String,
    pub appointment_date: String,
    #[serde(default)]
    pub meeting_point_id: Option<String>,
}

/// Settings describing the host booking site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    /// Page where a citizen manages their appointment. `{appointment_id}` is substituted.
    pub management_url: String,
    #[serde(default)]
    pub site_name: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite URL for the plugin database, unless overridden by `DATABASE_URL`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/registry-sync.db", self.app.data_dir))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let r = &cfg.registry;
    if url::Url::parse(r.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("registry.base_url must be an absolute URL"));
    }
    if r.token.trim().is_empty() {
        return Err(ConfigError::Invalid("registry.token must be non-empty"));
    }
    if r.token_header.trim().is_empty() {
        return Err(ConfigError::Invalid("registry.token_header must be non-empty"));
    }
    if r.validated_status.is_empty() {
        return Err(ConfigError::Invalid("registry.validated_status must be non-empty"));
    }
    if r.separator.is_empty() {
        return Err(ConfigError::Invalid("registry.separator must be non-empty"));
    }
    if r.connect_timeout_ms == Some(0) || r.timeout_ms == Some(0) {
        return Err(ConfigError::Invalid("registry timeouts must be > 0 when set"));
    }

    if r.paths.add.trim().is_empty() {
        return Err(ConfigError::Invalid("registry.paths.add must be non-empty"));
    }
    if r.paths.delete.trim().is_empty() {
        return Err(ConfigError::Invalid("registry.paths.delete must be non-empty"));
    }
    if r.paths.status.trim().is_empty() {
        return Err(ConfigError::Invalid("registry.paths.status must be non-empty"));
    }

    let p = &r.params;
    let required = [
        (&p.application_id, "registry.params.application_id must be non-empty"),
        (&p.application_ids, "registry.params.application_ids must be non-empty"),
        (&p.management_url, "registry.params.management_url must be non-empty"),
        (&p.meeting_point, "registry.params.meeting_point must be non-empty"),
        (&p.appointment_date, "registry.params.appointment_date must be non-empty"),
    ];
    for (value, msg) in required {
        if value.trim().is_empty() {
            return Err(ConfigError::Invalid(msg));
        }
    }
    if p.meeting_point_id.as_deref().is_some_and(|v| v.trim().is_empty()) {
        return Err(ConfigError::Invalid(
            "registry.params.meeting_point_id must be non-empty when set",
        ));
    }

    if cfg.booking.management_url.trim().is_empty() {
        return Err(ConfigError::Invalid("booking.management_url must be non-empty"));
    }

    Ok(())
}

/// Returns the example YAML shipped as `config.example.yaml`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  locale: "en"

registry:
  base_url: "https://registry.example.gouv.fr/api"
  token: "YOUR_REGISTRY_TOKEN"
  token_header: "x-rdv-opt-auth-token"
  validated_status: "validated"
  separator: ";"
  connect_timeout_ms: 5000
  timeout_ms: 15000
  paths:
    add: "/appointments"
    delete: "/appointments"
    status: "/status"
  params:
    application_id: "applicationId"
    application_ids: "applicationIds"
    management_url: "managementUrl"
    meeting_point: "meetingPoint"
    appointment_date: "appointmentDate"

booking:
  management_url: "https://www.example.org/mon-compte/rendez-vous"
  site_name: "example"
"#
}
