use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, Method, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use url::form_urlencoded;

use crate::config;
use crate::model::{ApplicationNumber, StatusMap};

pub mod model;

pub use model::{parse_add_response, parse_delete_response, parse_status_response};

/// Date-time layout expected by the registry, e.g. `2024-01-01T10:00:00`.
///
/// Booking times are local wall-clock times and go out without an offset.
pub const APPOINTMENT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to reach registry: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid registry response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid registry URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Parameters of an "add appointment" call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddAppointment {
    pub application_number: ApplicationNumber,
    pub management_url: String,
    pub meeting_point: String,
    pub appointment_date: String,
    pub meeting_point_id: Option<String>,
}

/// Parameters of a "delete appointment" call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteAppointment {
    pub application_number: ApplicationNumber,
    pub meeting_point: String,
    pub appointment_date: String,
    pub meeting_point_id: Option<String>,
}

#[async_trait]
pub trait RegistryService: Send + Sync {
    /// Current remote status of every identifier, in one round trip.
    /// Transport or parse failures yield an empty map.
    async fn fetch_statuses(&self, ids: &[ApplicationNumber]) -> StatusMap;

    async fn add_appointment(&self, request: &AddAppointment) -> Result<bool, RegistryError>;

    async fn delete_appointment(&self, request: &DeleteAppointment) -> Result<bool, RegistryError>;
}

#[derive(Clone)]
pub struct RegistryClient {
    http: Client,
    settings: config::Registry,
}

impl fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.settings.base_url)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    pub fn from_config(settings: &config::Registry) -> Result<Self, RegistryError> {
        let mut builder = Client::builder().user_agent("registry-sync/0.1");
        if let Some(ms) = settings.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = settings.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Ok(Self {
            http: builder.build()?,
            settings: settings.clone(),
        })
    }

    fn build_request(&self, method: Method, url: Url) -> Result<reqwest::Request, RegistryError> {
        let request = self
            .http
            .request(method, url)
            .header(self.settings.token_header.as_str(), self.settings.token.as_str())
            .build()?;
        Ok(request)
    }

    pub fn build_status_request(
        &self,
        ids: &[ApplicationNumber],
    ) -> Result<reqwest::Request, RegistryError> {
        self.build_request(Method::GET, build_status_url(&self.settings, ids)?)
    }

    pub fn build_add_request(
        &self,
        request: &AddAppointment,
    ) -> Result<reqwest::Request, RegistryError> {
        self.build_request(Method::POST, build_add_url(&self.settings, request)?)
    }

    pub fn build_delete_request(
        &self,
        request: &DeleteAppointment,
    ) -> Result<reqwest::Request, RegistryError> {
        self.build_request(Method::DELETE, build_delete_url(&self.settings, request)?)
    }

    /// Send a request and return the body of a successful response.
    async fn execute(&self, request: reqwest::Request) -> Result<String, RegistryError> {
        debug!(method = %request.method(), url = %request.url(), "sending registry request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RegistryError::Status { status, body });
        }
        Ok(res.text().await?)
    }

    /// Status lookup that surfaces failures; a blank body is an empty result.
    pub async fn try_fetch_statuses(
        &self,
        ids: &[ApplicationNumber],
    ) -> Result<StatusMap, RegistryError> {
        let request = self.build_status_request(ids)?;
        let body = self.execute(request).await?;
        if body.trim().is_empty() {
            return Ok(StatusMap::new());
        }
        Ok(parse_status_response(&body)?)
    }
}

#[async_trait]
impl RegistryService for RegistryClient {
    #[instrument(skip_all, fields(count = ids.len()))]
    async fn fetch_statuses(&self, ids: &[ApplicationNumber]) -> StatusMap {
        if ids.is_empty() {
            return StatusMap::new();
        }
        match self.try_fetch_statuses(ids).await {
            Ok(map) => map,
            Err(err) => {
                error!(?err, "registry status lookup failed");
                StatusMap::new()
            }
        }
    }

    #[instrument(skip_all, fields(application_number = %request.application_number))]
    async fn add_appointment(&self, request: &AddAppointment) -> Result<bool, RegistryError> {
        let body = self.execute(self.build_add_request(request)?).await?;
        let created = parse_add_response(&body)?;
        if !created {
            warn!("registry refused the appointment");
        }
        Ok(created)
    }

    #[instrument(skip_all, fields(application_number = %request.application_number))]
    async fn delete_appointment(&self, request: &DeleteAppointment) -> Result<bool, RegistryError> {
        let body = self.execute(self.build_delete_request(request)?).await?;
        let deleted = parse_delete_response(&body)?;
        if !deleted {
            warn!("registry deleted no appointment");
        }
        Ok(deleted)
    }
}

pub fn format_appointment_date(date_time: &NaiveDateTime) -> String {
    date_time.format(APPOINTMENT_DATE_FORMAT).to_string()
}

/// Form-style percent-encoding (space becomes `+`).
fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Percent-encoding where spaces end up as `%20` rather than `+`.
fn encode_spaces(value: &str) -> String {
    encode(value).replace('+', "%20")
}

fn endpoint_url(
    base_url: &str,
    path: &str,
    query: &[(String, String)],
) -> Result<Url, url::ParseError> {
    let mut raw = String::from(base_url.trim_end_matches('/'));
    if !path.starts_with('/') {
        raw.push('/');
    }
    raw.push_str(path);
    if !query.is_empty() {
        let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        raw.push('?');
        raw.push_str(&pairs.join("&"));
    }
    Url::parse(&raw)
}

pub fn build_add_url(
    settings: &config::Registry,
    request: &AddAppointment,
) -> Result<Url, url::ParseError> {
    let p = &settings.params;
    let mut query = vec![
        (encode(&p.application_id), encode(request.application_number.as_str())),
        (encode(&p.management_url), encode(&request.management_url)),
        (encode(&p.meeting_point), encode_spaces(&request.meeting_point)),
        (encode(&p.appointment_date), encode_spaces(&request.appointment_date)),
    ];
    if let (Some(name), Some(value)) = (&p.meeting_point_id, &request.meeting_point_id) {
        query.push((encode(name), encode(value)));
    }
    endpoint_url(&settings.base_url, &settings.paths.add, &query)
}

pub fn build_delete_url(
    settings: &config::Registry,
    request: &DeleteAppointment,
) -> Result<Url, url::ParseError> {
    let p = &settings.params;
    let mut query = vec![
        (encode(&p.application_id), encode(request.application_number.as_str())),
        (encode(&p.meeting_point), encode_spaces(&request.meeting_point)),
        (encode(&p.appointment_date), encode_spaces(&request.appointment_date)),
    ];
    if let (Some(name), Some(value)) = (&p.meeting_point_id, &request.meeting_point_id) {
        query.push((encode(name), encode(value)));
    }
    endpoint_url(&settings.base_url, &settings.paths.delete, &query)
}

/// One repeated parameter per identifier.
pub fn build_status_url(
    settings: &config::Registry,
    ids: &[ApplicationNumber],
) -> Result<Url, url::ParseError> {
    let name = encode(&settings.params.application_ids);
    let query: Vec<(String, String)> = ids
        .iter()
        .map(|id| (name.clone(), encode(id.as_str())))
        .collect();
    endpoint_url(&settings.base_url, &settings.paths.status, &query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn settings() -> config::Registry {
        let cfg: config::Config = serde_yaml::from_str(config::example()).unwrap();
        cfg.registry
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
    }

    #[test]
    fn add_url_round_trips_values() {
        let request = AddAppointment {
            application_number: "X1".into(),
            management_url: "http://x/y".into(),
            meeting_point: "Agency 1".into(),
            appointment_date: "2024-01-01T10:00:00".into(),
            meeting_point_id: None,
        };
        let url = build_add_url(&settings(), &request).unwrap();
        assert_eq!(url.path(), "/api/appointments");
        assert_eq!(
            query(&url),
            vec![
                ("applicationId".to_string(), "X1".to_string()),
                ("managementUrl".to_string(), "http://x/y".to_string()),
                ("meetingPoint".to_string(), "Agency 1".to_string()),
                ("appointmentDate".to_string(), "2024-01-01T10:00:00".to_string()),
            ]
        );
        let raw = url.query().unwrap();
        assert!(raw.contains("meetingPoint=Agency%201"));
        assert!(raw.ends_with("appointmentDate=2024-01-01T10%3A00%3A00"));
        assert!(raw.contains("managementUrl=http%3A%2F%2Fx%2Fy"));
    }

    #[test]
    fn literal_plus_survives_encoding() {
        let request = DeleteAppointment {
            application_number: "A+1".into(),
            meeting_point: "Mairie + annexe".into(),
            appointment_date: "2024-01-01T10:00:00+01:00".into(),
            meeting_point_id: None,
        };
        let url = build_delete_url(&settings(), &request).unwrap();
        let pairs = query(&url);
        assert_eq!(pairs[0].1, "A+1");
        assert_eq!(pairs[1].1, "Mairie + annexe");
        assert_eq!(pairs[2].1, "2024-01-01T10:00:00+01:00");
        assert!(!url.query().unwrap().contains("managementUrl"));
    }

    #[test]
    fn meeting_point_id_only_when_configured() {
        let mut s = settings();
        let request = DeleteAppointment {
            application_number: "A1".into(),
            meeting_point: "".into(),
            appointment_date: "".into(),
            meeting_point_id: Some("example_12_appointment".into()),
        };
        assert_eq!(query(&build_delete_url(&s, &request).unwrap()).len(), 3);

        s.params.meeting_point_id = Some("meetingPointId".into());
        let pairs = query(&build_delete_url(&s, &request).unwrap());
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[3], ("meetingPointId".to_string(), "example_12_appointment".to_string()));
    }

    #[test]
    fn status_url_repeats_parameter() {
        let ids: Vec<ApplicationNumber> = vec!["A123".into(), "B456".into()];
        let url = build_status_url(&settings(), &ids).unwrap();
        assert_eq!(url.path(), "/api/status");
        assert_eq!(url.query(), Some("applicationIds=A123&applicationIds=B456"));
    }

    #[test]
    fn endpoint_url_joins_slashes() {
        let url = endpoint_url("http://h/api/", "/x", &[]).unwrap();
        assert_eq!(url.as_str(), "http://h/api/x");
        let url = endpoint_url("http://h/api", "x", &[]).unwrap();
        assert_eq!(url.as_str(), "http://h/api/x");
    }

    #[test]
    fn date_format_matches_registry_layout() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(format_appointment_date(&dt), "2024-01-01T10:00:00");
    }

    #[test]
    fn requests_carry_token_header_and_method() {
        let client = RegistryClient::from_config(&settings()).unwrap();
        let ids: Vec<ApplicationNumber> = vec!["A1".into()];
        let request = client.build_status_request(&ids).unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(
            request
                .headers()
                .get("x-rdv-opt-auth-token")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "YOUR_REGISTRY_TOKEN"
        );

        let add = AddAppointment {
            application_number: "A1".into(),
            management_url: "http://x".into(),
            meeting_point: "here".into(),
            appointment_date: "2024-01-01T10:00:00".into(),
            meeting_point_id: None,
        };
        assert_eq!(client.build_add_request(&add).unwrap().method(), Method::POST);

        let delete = DeleteAppointment {
            application_number: "A1".into(),
            meeting_point: "here".into(),
            appointment_date: "2024-01-01T10:00:00".into(),
            meeting_point_id: None,
        };
        assert_eq!(client.build_delete_request(&delete).unwrap().method(), Method::DELETE);
    }
}
