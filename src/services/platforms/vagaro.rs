use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::normalize::{self, Schema};
use super::{
    authentication_failure, execute, http_client, status_error, AppointmentFilters,
    AvailabilityFilters, BookingDetails, BookingPlatform, PlatformError, TokenCell,
};
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentStatus, Customer, Platform, Provider, Service, TimeSlot};
use crate::services::monitoring::IntegrationMonitor;

pub const DEFAULT_BASE_URL: &str = "https://api.vagaro.com/v1";

pub(crate) static SCHEMA: Schema = Schema {
    platform: Platform::Vagaro,
    id: &["Id", "id"],
    customer_id: &["ClientId", "customerId"],
    service_id: &["ServiceId", "serviceId"],
    provider_id: &["EmployeeId", "providerId"],
    start_time: &["StartDateTime", "startTime"],
    end_time: &["EndDateTime", "endTime"],
    status: &["Status", "status"],
    notes: &["Notes", "notes"],
    price: &["Price", "price"],
    confirmation_code: &["ConfirmationCode", "confirmationCode"],
    site_id: &[],
    branch_id: &[],
    first_name: &["FirstName", "firstName"],
    last_name: &["LastName", "lastName"],
    email: &["Email", "email"],
    phone: &["Phone", "phone"],
    member_since: &["MemberSince", "memberSince"],
    name: &["Name", "name"],
    description: &["Description", "description"],
    duration: &["Duration", "duration"],
    category_id: &["CategoryId", "categoryId"],
    title: &["Title", "title"],
    bio: &["Bio", "bio"],
    image_url: &["ImageUrl", "imageUrl"],
    statuses: &[
        ("Confirmed", AppointmentStatus::Confirmed),
        ("Completed", AppointmentStatus::Completed),
        ("Cancelled", AppointmentStatus::Cancelled),
        ("No-Show", AppointmentStatus::NoShow),
        ("Pending", AppointmentStatus::Pending),
    ],
};

#[derive(Debug, Clone)]
pub struct VagaroConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Vagaro adapter. Authenticates with OAuth client credentials.
pub struct VagaroAdapter {
    config: VagaroConfig,
    token: TokenCell,
    client: reqwest::Client,
    monitor: Option<Arc<IntegrationMonitor>>,
}

impl VagaroAdapter {
    pub fn new(config: VagaroConfig, timeout: Duration) -> Result<Self, AppError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(AppError::Config(
                "Vagaro adapter requires clientId and clientSecret".to_string(),
            ));
        }
        Ok(Self {
            config,
            token: TokenCell::default(),
            client: http_client(timeout),
            monitor: None,
        })
    }

    pub fn with_monitor(mut self, monitor: Arc<IntegrationMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn token(&self) -> Result<String, PlatformError> {
        match self.token.get() {
            Some(token) => Ok(token),
            None => self.authenticate().await,
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, PlatformError> {
        let token = self.token().await?;
        let request = self.client.get(self.url(path)).bearer_auth(token).query(query);
        execute(self, request).await
    }
}

#[async_trait]
impl BookingPlatform for VagaroAdapter {
    fn platform(&self) -> Platform {
        Platform::Vagaro
    }

    fn monitor(&self) -> Option<&IntegrationMonitor> {
        self.monitor.as_deref()
    }

    fn is_connected(&self) -> bool {
        self.token.get().is_some()
    }

    async fn authenticate(&self) -> Result<String, PlatformError> {
        tracing::info!("authenticating with Vagaro");
        let request = self.client.post(self.url("/oauth/token")).json(&json!({
            "grant_type": "client_credentials",
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
        }));

        let result = execute(self, request).await.and_then(|body| {
            normalize::text(&body, &["access_token", "AccessToken"]).ok_or_else(|| {
                PlatformError::Decode {
                    platform: Platform::Vagaro,
                    message: "token response has no access_token".to_string(),
                }
            })
        });

        match result {
            Ok(token) => {
                self.token.set(token.clone());
                tracing::info!("authenticated with Vagaro");
                Ok(token)
            }
            Err(e) => {
                self.token.clear();
                Err(authentication_failure(Platform::Vagaro, e))
            }
        }
    }

    async fn test_connection(&self) -> Result<bool, PlatformError> {
        self.get_json("/services", &[("pageSize", "1".to_string())]).await?;
        Ok(true)
    }

    async fn get_availability(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filters: &AvailabilityFilters,
    ) -> Result<Vec<TimeSlot>, PlatformError> {
        let mut query = vec![
            ("startDate", start.to_string()),
            ("endDate", end.to_string()),
        ];
        if let Some(service_id) = &filters.service_id {
            query.push(("serviceId", service_id.clone()));
        }
        if let Some(provider_id) = &filters.provider_id {
            query.push(("employeeId", provider_id.clone()));
        }

        let body = self.get_json("/appointments/availability", &query).await?;
        let slots: Vec<TimeSlot> = normalize::items(&body, &["Slots", "slots", "Availability"])
            .iter()
            .filter_map(|raw| normalize::slot(&SCHEMA, raw, filters.service_id.as_deref()))
            .filter(|slot| {
                let day = slot.start_time.date_naive();
                day >= start && day <= end && filters.matches(slot)
            })
            .collect();

        tracing::info!(count = slots.len(), %start, %end, "found available slots from Vagaro");
        Ok(slots)
    }

    async fn book_appointment(&self, details: &BookingDetails) -> Result<Appointment, PlatformError> {
        let token = self.token().await?;
        let request = self
            .client
            .post(self.url("/appointments"))
            .bearer_auth(token)
            .json(&json!({
                "ClientId": details.customer_id,
                "ServiceId": details.service_id,
                "EmployeeId": details.provider_id,
                "StartDateTime": details.start_time.to_rfc3339(),
                "Notes": details.notes.clone().unwrap_or_default(),
            }));

        let body = execute(self, request).await?;
        let raw = normalize::entity(&body, &["Appointment", "appointment"]);
        let mut appointment = self.normalize_appointment(raw);
        if normalize::lookup(raw, SCHEMA.status).is_none() {
            appointment.status = AppointmentStatus::Confirmed;
        }
        tracing::info!(appointment_id = ?appointment.id, "booked appointment with Vagaro");
        Ok(appointment)
    }

    async fn get_customer_appointments(
        &self,
        customer_id: &str,
        filters: &AppointmentFilters,
    ) -> Result<Vec<Appointment>, PlatformError> {
        let mut query = vec![("clientId", customer_id.to_string())];
        if let Some(start) = filters.start_date {
            query.push(("startDate", start.to_string()));
        }
        if let Some(end) = filters.end_date {
            query.push(("endDate", end.to_string()));
        }

        let body = self.get_json("/appointments", &query).await?;
        let appointments: Vec<Appointment> = normalize::items(&body, &["Appointments", "appointments"])
            .iter()
            .map(|raw| self.normalize_appointment(raw))
            .filter(|a| filters.status.as_ref().map_or(true, |s| *s == a.status))
            .collect();

        tracing::info!(customer_id, count = appointments.len(), "fetched appointments from Vagaro");
        Ok(appointments)
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Customer, PlatformError> {
        let body = self.get_json(&format!("/clients/{customer_id}"), &[]).await?;
        Ok(self.normalize_customer(normalize::entity(&body, &["Client", "client"])))
    }

    async fn get_service(&self, service_id: &str) -> Result<Service, PlatformError> {
        let body = self.get_json(&format!("/services/{service_id}"), &[]).await?;
        Ok(self.normalize_service(normalize::entity(&body, &["Service", "service"])))
    }

    async fn get_provider(&self, provider_id: &str) -> Result<Provider, PlatformError> {
        let body = self.get_json(&format!("/staff/{provider_id}"), &[]).await?;
        Ok(self.normalize_provider(normalize::entity(&body, &["Employee", "employee"])))
    }

    fn normalize_appointment(&self, raw: &Value) -> Appointment {
        normalize::appointment(&SCHEMA, raw)
    }

    fn normalize_customer(&self, raw: &Value) -> Customer {
        normalize::customer(&SCHEMA, raw)
    }

    fn normalize_service(&self, raw: &Value) -> Service {
        normalize::service(&SCHEMA, raw)
    }

    fn normalize_provider(&self, raw: &Value) -> Provider {
        normalize::provider(&SCHEMA, raw)
    }

    /// Vagaro errors look like `{"ErrorCode": "...", "Message": "..."}`.
    fn handle_error(&self, status: StatusCode, payload: &Value) -> PlatformError {
        let Some(code) = normalize::text(payload, &["ErrorCode"]) else {
            if status == StatusCode::UNAUTHORIZED {
                self.token.clear();
            }
            return status_error(Platform::Vagaro, status, payload);
        };

        match code.as_str() {
            "InvalidCredentials" => PlatformError::InvalidCredentials(
                "Invalid Vagaro credentials. Please check your client ID and secret.".to_string(),
            ),
            "TokenExpired" => {
                self.token.clear();
                PlatformError::Unauthorized(
                    "Vagaro authentication token expired. Please re-authenticate.".to_string(),
                )
            }
            "RateLimitExceeded" => PlatformError::RateLimitExceeded(
                "Vagaro API rate limit exceeded. Please try again later.".to_string(),
            ),
            _ => PlatformError::Api {
                platform: Platform::Vagaro,
                message: normalize::text(payload, &["Message"]).unwrap_or(code),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> VagaroAdapter {
        VagaroAdapter::new(
            VagaroConfig {
                base_url: "http://localhost:9".to_string(),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_credentials() {
        let result = VagaroAdapter::new(
            VagaroConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                client_id: String::new(),
                client_secret: "secret".to_string(),
            },
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_normalize_native_appointment() {
        let raw = json!({
            "Id": "vag-1",
            "ClientId": "client-9",
            "ServiceId": "svc-2",
            "EmployeeId": "emp-4",
            "StartDateTime": "2024-01-25T14:00:00",
            "EndDateTime": "2024-01-25T15:00:00",
            "Status": "No-Show",
            "Price": 85,
            "ConfirmationCode": "VAG-1234"
        });
        let appt = adapter().normalize_appointment(&raw);
        assert_eq!(appt.id.as_deref(), Some("vag-1"));
        assert_eq!(appt.customer_id.as_deref(), Some("client-9"));
        assert_eq!(appt.provider_id.as_deref(), Some("emp-4"));
        assert_eq!(appt.status, AppointmentStatus::NoShow);
        assert_eq!(appt.price, 85.0);
        assert_eq!(appt.notes, "");
        assert_eq!(appt.duration_minutes(), Some(60));
        assert_eq!(appt.platform_data.platform, Platform::Vagaro);
        assert_eq!(appt.platform_data.confirmation_code.as_deref(), Some("VAG-1234"));
    }

    #[test]
    fn test_normalize_is_deterministic_over_canonical_keys() {
        let a = adapter();
        let raw = json!({
            "id": "vag-1",
            "customerId": "client-9",
            "serviceId": "svc-2",
            "providerId": "emp-4",
            "startTime": "2024-01-25T14:00:00Z",
            "status": "confirmed"
        });
        let first = a.normalize_appointment(&raw);
        let second = a.normalize_appointment(&raw);
        assert_eq!(first, second);
        assert_eq!(first.status, AppointmentStatus::Confirmed);
        assert_eq!(first.provider_id.as_deref(), Some("emp-4"));
    }

    #[test]
    fn test_unmapped_status_passes_through_lowercased() {
        let appt = adapter().normalize_appointment(&json!({"Status": "CheckedIn"}));
        assert_eq!(appt.status, AppointmentStatus::Unrecognized("checkedin".to_string()));
    }

    #[test]
    fn test_error_translation() {
        let a = adapter();
        a.token.set("live".to_string());

        let err = a.handle_error(StatusCode::BAD_REQUEST, &json!({"ErrorCode": "InvalidCredentials"}));
        assert!(matches!(err, PlatformError::InvalidCredentials(_)));
        assert!(a.is_connected());

        let err = a.handle_error(StatusCode::UNAUTHORIZED, &json!({"ErrorCode": "TokenExpired"}));
        assert!(matches!(err, PlatformError::Unauthorized(_)));
        assert!(!a.is_connected());

        let err = a.handle_error(StatusCode::TOO_MANY_REQUESTS, &json!({"ErrorCode": "RateLimitExceeded"}));
        assert!(matches!(err, PlatformError::RateLimitExceeded(_)));

        let err = a.handle_error(
            StatusCode::BAD_REQUEST,
            &json!({"ErrorCode": "BadDate", "Message": "StartDate is invalid"}),
        );
        assert_eq!(err.to_string(), "vagaro API error: StartDate is invalid");
    }
}
