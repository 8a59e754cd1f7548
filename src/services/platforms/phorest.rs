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
use crate::models::{
    Appointment, AppointmentStatus, Customer, Platform, PlatformData, Provider, Service, TimeSlot,
};
use crate::services::monitoring::IntegrationMonitor;

pub const DEFAULT_BASE_URL: &str = "https://api.phorest.com/third_party_api/v1";
pub const DEFAULT_BRANCH_ID: &str = "main-branch";

pub(crate) static SCHEMA: Schema = Schema {
    platform: Platform::Phorest,
    id: &["id", "Id"],
    customer_id: &["clientId", "customerId", "ClientId"],
    service_id: &["serviceId", "ServiceId"],
    provider_id: &["staffId", "providerId", "StaffId"],
    start_time: &["startTime", "StartTime"],
    end_time: &["endTime", "EndTime"],
    status: &["status", "Status"],
    notes: &["notes", "Notes"],
    price: &["price", "Price"],
    confirmation_code: &["confirmationCode", "ConfirmationCode"],
    site_id: &[],
    branch_id: &["branchId", "BranchId"],
    first_name: &["firstName", "FirstName"],
    last_name: &["lastName", "LastName"],
    email: &["email", "Email"],
    phone: &["mobile", "Mobile", "phone", "Phone"],
    member_since: &["createdAt", "CreatedAt", "memberSince"],
    name: &["name", "Name"],
    description: &["description", "Description"],
    duration: &["duration", "Duration"],
    category_id: &["categoryId", "CategoryId"],
    title: &["title", "Title"],
    bio: &["bio", "Bio"],
    image_url: &["imageUrl", "ImageUrl"],
    statuses: &[
        ("CONFIRMED", AppointmentStatus::Confirmed),
        ("COMPLETED", AppointmentStatus::Completed),
        ("CANCELLED", AppointmentStatus::Cancelled),
        ("NO_SHOW", AppointmentStatus::NoShow),
        ("PENDING", AppointmentStatus::Pending),
    ],
};

#[derive(Debug, Clone)]
pub struct PhorestConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub branch_id: Option<String>,
}

/// Phorest adapter. Requests are scoped to a single branch.
pub struct PhorestAdapter {
    config: PhorestConfig,
    branch_id: String,
    token: TokenCell,
    client: reqwest::Client,
    monitor: Option<Arc<IntegrationMonitor>>,
}

impl PhorestAdapter {
    pub fn new(config: PhorestConfig, timeout: Duration) -> Result<Self, AppError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(AppError::Config(
                "Phorest adapter requires clientId and clientSecret".to_string(),
            ));
        }
        let branch_id = config
            .branch_id
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH_ID.to_string());
        Ok(Self {
            config,
            branch_id,
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
        let mut params = vec![("branchId", self.branch_id.clone())];
        params.extend(query.iter().cloned());
        let request = self.client.get(self.url(path)).bearer_auth(token).query(&params);
        execute(self, request).await
    }

    fn fill_branch(&self, data: &mut PlatformData) {
        if data.branch_id.is_none() {
            data.branch_id = Some(self.branch_id.clone());
        }
    }
}

#[async_trait]
impl BookingPlatform for PhorestAdapter {
    fn platform(&self) -> Platform {
        Platform::Phorest
    }

    fn monitor(&self) -> Option<&IntegrationMonitor> {
        self.monitor.as_deref()
    }

    fn is_connected(&self) -> bool {
        self.token.get().is_some()
    }

    async fn authenticate(&self) -> Result<String, PlatformError> {
        tracing::info!(branch_id = %self.branch_id, "authenticating with Phorest");
        let request = self.client.post(self.url("/oauth/token")).json(&json!({
            "grant_type": "client_credentials",
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
        }));

        let result = execute(self, request).await.and_then(|body| {
            normalize::text(&body, &["access_token", "accessToken"]).ok_or_else(|| {
                PlatformError::Decode {
                    platform: Platform::Phorest,
                    message: "token response has no access_token".to_string(),
                }
            })
        });

        match result {
            Ok(token) => {
                self.token.set(token.clone());
                tracing::info!("authenticated with Phorest");
                Ok(token)
            }
            Err(e) => {
                self.token.clear();
                Err(authentication_failure(Platform::Phorest, e))
            }
        }
    }

    async fn test_connection(&self) -> Result<bool, PlatformError> {
        self.get_json("/services", &[("size", "1".to_string())]).await?;
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
            query.push(("staffId", provider_id.clone()));
        }

        let body = self.get_json("/availability", &query).await?;
        let slots: Vec<TimeSlot> = normalize::items(&body, &["slots", "availability", "_embedded"])
            .iter()
            .filter_map(|raw| normalize::slot(&SCHEMA, raw, filters.service_id.as_deref()))
            .map(|mut slot| {
                self.fill_branch(&mut slot.platform_data);
                slot
            })
            .filter(|slot| {
                let day = slot.start_time.date_naive();
                day >= start && day <= end && filters.matches(slot)
            })
            .collect();

        tracing::info!(count = slots.len(), %start, %end, "found available slots from Phorest");
        Ok(slots)
    }

    async fn book_appointment(&self, details: &BookingDetails) -> Result<Appointment, PlatformError> {
        let token = self.token().await?;
        let request = self
            .client
            .post(self.url("/appointments"))
            .bearer_auth(token)
            .json(&json!({
                "branchId": self.branch_id,
                "clientId": details.customer_id,
                "serviceId": details.service_id,
                "staffId": details.provider_id,
                "startTime": details.start_time.to_rfc3339(),
                "notes": details.notes.clone().unwrap_or_default(),
            }));

        let body = execute(self, request).await?;
        let raw = normalize::entity(&body, &["appointment"]);
        let mut appointment = self.normalize_appointment(raw);
        if normalize::lookup(raw, SCHEMA.status).is_none() {
            appointment.status = AppointmentStatus::Confirmed;
        }
        tracing::info!(appointment_id = ?appointment.id, "booked appointment with Phorest");
        Ok(appointment)
    }

    async fn get_customer_appointments(
        &self,
        customer_id: &str,
        filters: &AppointmentFilters,
    ) -> Result<Vec<Appointment>, PlatformError> {
        let mut query = vec![("clientId", customer_id.to_string())];
        if let Some(start) = filters.start_date {
            query.push(("fromDate", start.to_string()));
        }
        if let Some(end) = filters.end_date {
            query.push(("toDate", end.to_string()));
        }

        let body = self.get_json("/appointments", &query).await?;
        let appointments: Vec<Appointment> = normalize::items(&body, &["appointments", "content"])
            .iter()
            .map(|raw| self.normalize_appointment(raw))
            .filter(|a| filters.status.as_ref().map_or(true, |s| *s == a.status))
            .collect();

        tracing::info!(customer_id, count = appointments.len(), "fetched appointments from Phorest");
        Ok(appointments)
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Customer, PlatformError> {
        let body = self.get_json(&format!("/clients/{customer_id}"), &[]).await?;
        Ok(self.normalize_customer(normalize::entity(&body, &["client"])))
    }

    async fn get_service(&self, service_id: &str) -> Result<Service, PlatformError> {
        let body = self.get_json(&format!("/services/{service_id}"), &[]).await?;
        Ok(self.normalize_service(normalize::entity(&body, &["service"])))
    }

    async fn get_provider(&self, provider_id: &str) -> Result<Provider, PlatformError> {
        let body = self.get_json(&format!("/staff/{provider_id}"), &[]).await?;
        Ok(self.normalize_provider(normalize::entity(&body, &["staff"])))
    }

    fn normalize_appointment(&self, raw: &Value) -> Appointment {
        let mut appointment = normalize::appointment(&SCHEMA, raw);
        self.fill_branch(&mut appointment.platform_data);
        appointment
    }

    fn normalize_customer(&self, raw: &Value) -> Customer {
        let mut customer = normalize::customer(&SCHEMA, raw);
        self.fill_branch(&mut customer.platform_data);
        customer
    }

    fn normalize_service(&self, raw: &Value) -> Service {
        let mut service = normalize::service(&SCHEMA, raw);
        self.fill_branch(&mut service.platform_data);
        service
    }

    fn normalize_provider(&self, raw: &Value) -> Provider {
        let mut provider = normalize::provider(&SCHEMA, raw);
        self.fill_branch(&mut provider.platform_data);
        provider
    }

    /// Phorest follows the OAuth error shape: `{"error": "...", "error_description": "..."}`.
    fn handle_error(&self, status: StatusCode, payload: &Value) -> PlatformError {
        let Some(code) = normalize::text(payload, &["error"]) else {
            if status == StatusCode::UNAUTHORIZED {
                self.token.clear();
            }
            return status_error(Platform::Phorest, status, payload);
        };

        match code.as_str() {
            "invalid_client" => PlatformError::InvalidCredentials(
                "Invalid Phorest credentials. Please check your client ID and secret.".to_string(),
            ),
            "invalid_grant" => PlatformError::InvalidCredentials(
                "Invalid Phorest authorization grant. Please check your credentials.".to_string(),
            ),
            "unauthorized" => {
                self.token.clear();
                PlatformError::Unauthorized(
                    "Phorest authentication failed. Please re-authenticate.".to_string(),
                )
            }
            "too_many_requests" => PlatformError::RateLimitExceeded(
                "Phorest API rate limit exceeded. Please try again later.".to_string(),
            ),
            _ => PlatformError::Api {
                platform: Platform::Phorest,
                message: normalize::text(payload, &["error_description"]).unwrap_or(code),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(branch_id: Option<&str>) -> PhorestAdapter {
        PhorestAdapter::new(
            PhorestConfig {
                base_url: "http://localhost:9".to_string(),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                branch_id: branch_id.map(str::to_string),
            },
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_branch_defaults_to_main() {
        let appt = adapter(None).normalize_appointment(&json!({"id": "a-1"}));
        assert_eq!(appt.platform_data.branch_id.as_deref(), Some(DEFAULT_BRANCH_ID));

        let appt = adapter(Some("dublin")).normalize_appointment(&json!({"id": "a-1"}));
        assert_eq!(appt.platform_data.branch_id.as_deref(), Some("dublin"));

        let appt = adapter(Some("dublin"))
            .normalize_appointment(&json!({"id": "a-1", "branchId": "cork"}));
        assert_eq!(appt.platform_data.branch_id.as_deref(), Some("cork"));
    }

    #[test]
    fn test_normalize_native_appointment() {
        let appt = adapter(None).normalize_appointment(&json!({
            "id": "ph-1",
            "clientId": "c-3",
            "serviceId": "haircut-basic",
            "staffId": "s-2",
            "startTime": "2024-01-25T14:00:00Z",
            "status": "NO_SHOW"
        }));
        assert_eq!(appt.customer_id.as_deref(), Some("c-3"));
        assert_eq!(appt.provider_id.as_deref(), Some("s-2"));
        assert_eq!(appt.status, AppointmentStatus::NoShow);
        assert_eq!(appt.price, 0.0);
    }

    #[test]
    fn test_normalize_client_prefers_mobile() {
        let customer = adapter(None).normalize_customer(&json!({
            "id": "c-3",
            "firstName": "Ana",
            "mobile": "087 123",
            "phone": "01 555",
            "createdAt": "2021-03-10"
        }));
        assert_eq!(customer.phone.as_deref(), Some("087 123"));
        assert_eq!(customer.platform_data.member_since.as_deref(), Some("2021-03-10"));
    }

    #[test]
    fn test_error_translation() {
        let a = adapter(None);
        a.token.set("live".to_string());

        let err = a.handle_error(StatusCode::BAD_REQUEST, &json!({"error": "invalid_grant"}));
        assert!(matches!(err, PlatformError::InvalidCredentials(_)));

        let err = a.handle_error(StatusCode::UNAUTHORIZED, &json!({"error": "unauthorized"}));
        assert!(matches!(err, PlatformError::Unauthorized(_)));
        assert!(!a.is_connected());

        let err = a.handle_error(
            StatusCode::BAD_REQUEST,
            &json!({"error": "bad_request", "error_description": "startTime is in the past"}),
        );
        assert_eq!(err.to_string(), "phorest API error: startTime is in the past");
    }
}
