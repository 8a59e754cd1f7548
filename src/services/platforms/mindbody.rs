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

pub const DEFAULT_BASE_URL: &str = "https://api.mindbodyonline.com/public/v6";

pub(crate) static SCHEMA: Schema = Schema {
    platform: Platform::Mindbody,
    id: &["Id", "id"],
    customer_id: &["ClientId", "clientId", "customerId"],
    service_id: &["SessionTypeId", "ServiceId", "sessionTypeId", "serviceId"],
    provider_id: &["StaffId", "staffId", "providerId"],
    start_time: &["StartDateTime", "startDateTime", "startTime"],
    end_time: &["EndDateTime", "endDateTime", "endTime"],
    status: &["Status", "status"],
    notes: &["Notes", "notes"],
    price: &["Price", "price"],
    confirmation_code: &["Reference", "reference", "confirmationCode"],
    site_id: &["SiteId", "siteId"],
    branch_id: &[],
    first_name: &["FirstName", "firstName"],
    last_name: &["LastName", "lastName"],
    email: &["Email", "email"],
    phone: &["MobilePhone", "mobilePhone", "phone"],
    member_since: &["CreationDate", "creationDate", "memberSince"],
    name: &["Name", "name"],
    description: &["Description", "description"],
    duration: &["DefaultTimeLength", "defaultTimeLength", "duration"],
    category_id: &["ProgramId", "programId", "categoryId"],
    title: &["Title", "title"],
    bio: &["Bio", "bio"],
    image_url: &["ImageUrl", "imageUrl"],
    statuses: &[
        ("Booked", AppointmentStatus::Confirmed),
        ("Completed", AppointmentStatus::Completed),
        ("Cancelled", AppointmentStatus::Cancelled),
        ("NoShow", AppointmentStatus::NoShow),
        ("Requested", AppointmentStatus::Pending),
    ],
};

#[derive(Debug, Clone)]
pub struct MindbodyConfig {
    pub base_url: String,
    pub api_key: String,
    pub site_id: String,
    /// Staff credentials for the user token. Without a username the adapter
    /// calls the API with the key and site headers only.
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Mindbody adapter. Every call carries the `Api-Key` and `SiteId` headers.
pub struct MindbodyAdapter {
    config: MindbodyConfig,
    token: TokenCell,
    client: reqwest::Client,
    monitor: Option<Arc<IntegrationMonitor>>,
}

impl MindbodyAdapter {
    pub fn new(config: MindbodyConfig, timeout: Duration) -> Result<Self, AppError> {
        if config.api_key.is_empty() || config.site_id.is_empty() {
            return Err(AppError::Config(
                "Mindbody adapter requires apiKey and siteId".to_string(),
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

    fn with_site(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Api-Key", &self.config.api_key)
            .header("SiteId", &self.config.site_id)
    }

    fn uses_user_token(&self) -> bool {
        self.config.username.is_some()
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, PlatformError> {
        if !self.uses_user_token() {
            return Ok(self.with_site(request));
        }
        let token = match self.token.get() {
            Some(token) => token,
            None => self.authenticate().await?,
        };
        Ok(self.with_site(request).header("Authorization", token))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, PlatformError> {
        let request = self.authorized(self.client.get(self.url(path)).query(query)).await?;
        execute(self, request).await
    }

    fn with_site_id(&self, mut appointment: Appointment) -> Appointment {
        if appointment.platform_data.site_id.is_none() {
            appointment.platform_data.site_id = Some(self.config.site_id.clone());
        }
        appointment
    }
}

#[async_trait]
impl BookingPlatform for MindbodyAdapter {
    fn platform(&self) -> Platform {
        Platform::Mindbody
    }

    fn monitor(&self) -> Option<&IntegrationMonitor> {
        self.monitor.as_deref()
    }

    fn is_connected(&self) -> bool {
        self.token.get().is_some()
    }

    /// Issues a staff user token. Without a username there is no token to
    /// issue, so the API key is checked against the site lookup instead and
    /// stands in as the session credential.
    async fn authenticate(&self) -> Result<String, PlatformError> {
        tracing::info!(site_id = %self.config.site_id, "authenticating with Mindbody");
        let result = match &self.config.username {
            Some(username) => {
                let request = self
                    .with_site(self.client.post(self.url("/usertoken/issue")))
                    .json(&json!({
                        "Username": username,
                        "Password": self.config.password.clone().unwrap_or_default(),
                    }));
                execute(self, request).await.and_then(|body| {
                    normalize::text(&body, &["AccessToken", "accessToken"]).ok_or_else(|| {
                        PlatformError::Decode {
                            platform: Platform::Mindbody,
                            message: "token response has no AccessToken".to_string(),
                        }
                    })
                })
            }
            None => {
                let request = self.with_site(self.client.get(self.url("/site/sites")));
                execute(self, request)
                    .await
                    .map(|_| self.config.api_key.clone())
            }
        };

        match result {
            Ok(token) => {
                self.token.set(token.clone());
                tracing::info!("authenticated with Mindbody");
                Ok(token)
            }
            Err(e) => {
                self.token.clear();
                Err(authentication_failure(Platform::Mindbody, e))
            }
        }
    }

    async fn test_connection(&self) -> Result<bool, PlatformError> {
        if !self.uses_user_token() {
            self.authenticate().await?;
            return Ok(true);
        }
        self.get_json("/site/sites", &[]).await?;
        Ok(true)
    }

    async fn get_availability(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filters: &AvailabilityFilters,
    ) -> Result<Vec<TimeSlot>, PlatformError> {
        let mut query = vec![
            ("StartDate", start.to_string()),
            ("EndDate", end.to_string()),
        ];
        if let Some(service_id) = &filters.service_id {
            query.push(("SessionTypeIds", service_id.clone()));
        }
        if let Some(provider_id) = &filters.provider_id {
            query.push(("StaffIds", provider_id.clone()));
        }

        let body = self.get_json("/appointment/availabilities", &query).await?;
        let slots: Vec<TimeSlot> = normalize::items(&body, &["Availabilities", "availabilities"])
            .iter()
            .filter_map(|raw| {
                let mut slot = normalize::slot(&SCHEMA, raw, filters.service_id.as_deref())?;
                // Staff arrive nested as {"Staff": {"Id": ..}} on availability rows.
                if slot.provider_id.is_empty() {
                    if let Some(staff) = raw.get("Staff") {
                        slot.provider_id = normalize::text(staff, &["Id", "id"]).unwrap_or_default();
                    }
                }
                slot.platform_data.site_id = Some(self.config.site_id.clone());
                Some(slot)
            })
            .filter(|slot| {
                let day = slot.start_time.date_naive();
                day >= start && day <= end && filters.matches(slot)
            })
            .collect();

        tracing::info!(count = slots.len(), %start, %end, "found available slots from Mindbody");
        Ok(slots)
    }

    async fn book_appointment(&self, details: &BookingDetails) -> Result<Appointment, PlatformError> {
        let request = self
            .authorized(self.client.post(self.url("/appointment/appointments")))
            .await?
            .json(&json!({
                "ClientId": details.customer_id,
                "SessionTypeId": details.service_id,
                "StaffId": details.provider_id,
                "StartDateTime": details.start_time.to_rfc3339(),
                "Notes": details.notes.clone().unwrap_or_default(),
                "LocationId": 1,
            }));

        let body = execute(self, request).await?;
        let raw = normalize::entity(&body, &["Appointment", "appointment"]);
        let mut appointment = self.normalize_appointment(raw);
        if normalize::lookup(raw, SCHEMA.status).is_none() {
            appointment.status = AppointmentStatus::Confirmed;
        }
        tracing::info!(appointment_id = ?appointment.id, "booked appointment with Mindbody");
        Ok(appointment)
    }

    async fn get_customer_appointments(
        &self,
        customer_id: &str,
        filters: &AppointmentFilters,
    ) -> Result<Vec<Appointment>, PlatformError> {
        let mut query = vec![("ClientId", customer_id.to_string())];
        if let Some(start) = filters.start_date {
            query.push(("StartDate", start.to_string()));
        }
        if let Some(end) = filters.end_date {
            query.push(("EndDate", end.to_string()));
        }

        let body = self.get_json("/appointment/appointments", &query).await?;
        let appointments: Vec<Appointment> = normalize::items(&body, &["Appointments", "appointments"])
            .iter()
            .map(|raw| self.normalize_appointment(raw))
            .filter(|a| filters.status.as_ref().map_or(true, |s| *s == a.status))
            .collect();

        tracing::info!(customer_id, count = appointments.len(), "fetched appointments from Mindbody");
        Ok(appointments)
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Customer, PlatformError> {
        let body = self
            .get_json("/client/clients", &[("ClientIds", customer_id.to_string())])
            .await?;
        let clients = normalize::items(&body, &["Clients", "clients"]);
        match clients.first() {
            Some(raw) => Ok(self.normalize_customer(raw)),
            None => Err(PlatformError::Api {
                platform: Platform::Mindbody,
                message: format!("client {customer_id} not found"),
            }),
        }
    }

    async fn get_service(&self, service_id: &str) -> Result<Service, PlatformError> {
        let body = self
            .get_json("/appointment/services", &[("SessionTypeIds", service_id.to_string())])
            .await?;
        let services = normalize::items(&body, &["SessionTypes", "Services", "services"]);
        match services.first() {
            Some(raw) => Ok(self.normalize_service(raw)),
            None => Err(PlatformError::Api {
                platform: Platform::Mindbody,
                message: format!("service {service_id} not found"),
            }),
        }
    }

    async fn get_provider(&self, provider_id: &str) -> Result<Provider, PlatformError> {
        let body = self
            .get_json("/staff/staff", &[("StaffIds", provider_id.to_string())])
            .await?;
        let staff = normalize::items(&body, &["StaffMembers", "Staff", "staff"]);
        match staff.first() {
            Some(raw) => Ok(self.normalize_provider(raw)),
            None => Err(PlatformError::Api {
                platform: Platform::Mindbody,
                message: format!("staff member {provider_id} not found"),
            }),
        }
    }

    fn normalize_appointment(&self, raw: &Value) -> Appointment {
        self.with_site_id(normalize::appointment(&SCHEMA, raw))
    }

    fn normalize_customer(&self, raw: &Value) -> Customer {
        let mut customer = normalize::customer(&SCHEMA, raw);
        customer.platform_data.site_id.get_or_insert_with(|| self.config.site_id.clone());
        customer
    }

    fn normalize_service(&self, raw: &Value) -> Service {
        normalize::service(&SCHEMA, raw)
    }

    fn normalize_provider(&self, raw: &Value) -> Provider {
        normalize::provider(&SCHEMA, raw)
    }

    /// Mindbody wraps errors as `{"Error": {"Code": "...", "Message": "..."}}`.
    fn handle_error(&self, status: StatusCode, payload: &Value) -> PlatformError {
        let error = payload.get("Error").unwrap_or(&Value::Null);
        let message = normalize::text(error, &["Message"]).unwrap_or_default();
        let Some(code) = normalize::text(error, &["Code"]) else {
            if status == StatusCode::UNAUTHORIZED {
                self.token.clear();
            }
            return status_error(Platform::Mindbody, status, payload);
        };

        match code.as_str() {
            "InvalidCredentials" => PlatformError::InvalidCredentials(
                "Invalid Mindbody credentials. Please check your API key and site ID.".to_string(),
            ),
            "InvalidParameters" => PlatformError::Api {
                platform: Platform::Mindbody,
                message: format!("Invalid parameters: {message}"),
            },
            "Unauthorized" => {
                self.token.clear();
                PlatformError::Unauthorized(
                    "Mindbody authentication failed. Please re-authenticate.".to_string(),
                )
            }
            "TooManyRequests" => PlatformError::RateLimitExceeded(
                "Mindbody API rate limit exceeded. Please try again later.".to_string(),
            ),
            _ => PlatformError::Api {
                platform: Platform::Mindbody,
                message: if message.is_empty() { code } else { message },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> MindbodyAdapter {
        MindbodyAdapter::new(
            MindbodyConfig {
                base_url: "http://localhost:9".to_string(),
                api_key: "key".to_string(),
                site_id: "-99".to_string(),
                username: None,
                password: None,
            },
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_site_id() {
        let result = MindbodyAdapter::new(
            MindbodyConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                api_key: "key".to_string(),
                site_id: String::new(),
                username: None,
                password: None,
            },
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_normalize_booked_appointment() {
        let raw = json!({
            "Id": 5521,
            "ClientId": "100015",
            "SessionTypeId": 23,
            "StaffId": 7,
            "StartDateTime": "2024-03-02T10:00:00",
            "EndDateTime": "2024-03-02T10:45:00",
            "Status": "Booked",
            "Reference": "MB-77"
        });
        let appt = adapter().normalize_appointment(&raw);
        assert_eq!(appt.id.as_deref(), Some("5521"));
        assert_eq!(appt.service_id.as_deref(), Some("23"));
        assert_eq!(appt.provider_id.as_deref(), Some("7"));
        assert_eq!(appt.status, AppointmentStatus::Confirmed);
        assert_eq!(appt.duration_minutes(), Some(45));
        assert_eq!(appt.platform_data.site_id.as_deref(), Some("-99"));
        assert_eq!(appt.platform_data.confirmation_code.as_deref(), Some("MB-77"));
    }

    #[test]
    fn test_requested_maps_to_pending() {
        let appt = adapter().normalize_appointment(&json!({"Status": "Requested"}));
        assert_eq!(appt.status, AppointmentStatus::Pending);
    }

    #[test]
    fn test_normalize_client_uses_mobile_phone() {
        let customer = adapter().normalize_customer(&json!({
            "Id": "100015",
            "FirstName": "Dana",
            "LastName": "Reyes",
            "MobilePhone": "555-0101",
            "CreationDate": "2021-06-01T00:00:00"
        }));
        assert_eq!(customer.phone.as_deref(), Some("555-0101"));
        assert_eq!(customer.full_name().as_deref(), Some("Dana Reyes"));
        assert_eq!(customer.platform_data.member_since.as_deref(), Some("2021-06-01T00:00:00"));
    }

    #[test]
    fn test_error_translation() {
        let a = adapter();
        a.token.set("live".to_string());

        let err = a.handle_error(
            StatusCode::BAD_REQUEST,
            &json!({"Error": {"Code": "InvalidParameters", "Message": "StartDate is required"}}),
        );
        assert_eq!(err.to_string(), "mindbody API error: Invalid parameters: StartDate is required");

        let err = a.handle_error(StatusCode::UNAUTHORIZED, &json!({"Error": {"Code": "Unauthorized"}}));
        assert!(matches!(err, PlatformError::Unauthorized(_)));
        assert!(!a.is_connected());

        let err = a.handle_error(StatusCode::TOO_MANY_REQUESTS, &json!({"Error": {"Code": "TooManyRequests"}}));
        assert!(err.is_retryable());

        let err = a.handle_error(StatusCode::BAD_REQUEST, &json!({"Error": {"Code": "InvalidCredentials"}}));
        assert!(err.is_auth_failure());
    }
}
