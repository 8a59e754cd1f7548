pub mod mindbody;
pub mod normalize;
pub mod phorest;
pub mod vagaro;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentStatus, Customer, Platform, Provider, Service, TimeSlot};
use crate::services::monitoring::{ApiCall, IntegrationMonitor, RateLimit};

pub use mindbody::{MindbodyAdapter, MindbodyConfig};
pub use phorest::{PhorestAdapter, PhorestConfig};
pub use vagaro::{VagaroAdapter, VagaroConfig};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{platform} authentication failed: {message}")]
    Authentication { platform: Platform, message: String },

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    RateLimitExceeded(String),

    #[error("{platform} API error: {message}")]
    Api { platform: Platform, message: String },

    #[error("{0} request timed out")]
    Timeout(Platform),

    #[error("{platform} request failed: {source}")]
    Transport {
        platform: Platform,
        #[source]
        source: reqwest::Error,
    },

    #[error("{platform} returned an unexpected response: {message}")]
    Decode { platform: Platform, message: String },
}

impl PlatformError {
    /// Transient failures a caller may retry. Bookings are never retried
    /// regardless, since they are not idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::Timeout(_)
                | PlatformError::RateLimitExceeded(_)
                | PlatformError::Transport { .. }
        )
    }

    /// Failures that say the integration itself is down, as opposed to a
    /// request the platform rejected.
    pub fn is_connectivity_failure(&self) -> bool {
        self.is_auth_failure()
            || matches!(self, PlatformError::Timeout(_) | PlatformError::Transport { .. })
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            PlatformError::Authentication { .. }
                | PlatformError::InvalidCredentials(_)
                | PlatformError::Unauthorized(_)
        )
    }

    pub(crate) fn from_reqwest(platform: Platform, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PlatformError::Timeout(platform)
        } else {
            PlatformError::Transport {
                platform,
                source: err,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Appointment,
    Customer,
    Service,
    Provider,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedEntity {
    Appointment(Appointment),
    Customer(Customer),
    Service(Service),
    Provider(Provider),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailabilityFilters {
    pub service_id: Option<String>,
    pub provider_id: Option<String>,
}

impl AvailabilityFilters {
    pub fn matches(&self, slot: &TimeSlot) -> bool {
        self.service_id.as_deref().map_or(true, |s| s == slot.service_id)
            && self.provider_id.as_deref().map_or(true, |p| p == slot.provider_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingDetails {
    pub customer_id: String,
    pub service_id: String,
    pub provider_id: String,
    pub start_time: DateTime<FixedOffset>,
    pub notes: Option<String>,
}

/// Capability every booking platform exposes to the core.
///
/// Data calls authenticate first when no token is held. `book_appointment`
/// creates a real booking and must not be retried blindly.
#[async_trait]
pub trait BookingPlatform: Send + Sync {
    fn platform(&self) -> Platform;

    fn is_connected(&self) -> bool;

    /// Where request metrics go. Adapters without one are not tracked.
    fn monitor(&self) -> Option<&IntegrationMonitor> {
        None
    }

    async fn authenticate(&self) -> Result<String, PlatformError>;

    async fn test_connection(&self) -> Result<bool, PlatformError>;

    /// Slots whose start date falls within `[start, end]` inclusive.
    async fn get_availability(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filters: &AvailabilityFilters,
    ) -> Result<Vec<TimeSlot>, PlatformError>;

    async fn book_appointment(&self, details: &BookingDetails) -> Result<Appointment, PlatformError>;

    /// Returned in whatever order the platform uses.
    async fn get_customer_appointments(
        &self,
        customer_id: &str,
        filters: &AppointmentFilters,
    ) -> Result<Vec<Appointment>, PlatformError>;

    async fn get_customer(&self, customer_id: &str) -> Result<Customer, PlatformError>;

    async fn get_service(&self, service_id: &str) -> Result<Service, PlatformError>;

    async fn get_provider(&self, provider_id: &str) -> Result<Provider, PlatformError>;

    fn normalize_appointment(&self, raw: &Value) -> Appointment;

    fn normalize_customer(&self, raw: &Value) -> Customer;

    fn normalize_service(&self, raw: &Value) -> Service;

    fn normalize_provider(&self, raw: &Value) -> Provider;

    /// Translates a platform error payload into a [`PlatformError`].
    fn handle_error(&self, status: StatusCode, payload: &Value) -> PlatformError;

    fn normalize_data(&self, raw: &Value, kind: EntityKind) -> NormalizedEntity {
        match kind {
            EntityKind::Appointment => NormalizedEntity::Appointment(self.normalize_appointment(raw)),
            EntityKind::Customer => NormalizedEntity::Customer(self.normalize_customer(raw)),
            EntityKind::Service => NormalizedEntity::Service(self.normalize_service(raw)),
            EntityKind::Provider => NormalizedEntity::Provider(self.normalize_provider(raw)),
        }
    }
}

/// Auth token held by one adapter instance.
#[derive(Debug, Default)]
pub struct TokenCell(Mutex<Option<String>>);

impl TokenCell {
    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, token: String) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub fn clear(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        })
}

/// Sends a request and decodes the JSON body, routing non-2xx responses
/// through the adapter's error translation. The outcome is recorded on the
/// adapter's monitor.
pub(crate) async fn execute<P: BookingPlatform + ?Sized>(
    adapter: &P,
    request: reqwest::RequestBuilder,
) -> Result<Value, PlatformError> {
    let platform = adapter.platform();
    let (client, request) = request.build_split();
    let request = request.map_err(|e| PlatformError::from_reqwest(platform, e))?;
    let endpoint = format!("{} {}", request.method(), request.url().path());

    let started = Instant::now();
    let (result, rate_limit) = send(adapter, &client, request).await;

    if let Some(monitor) = adapter.monitor() {
        let now = Utc::now();
        monitor.record_api_call(
            ApiCall {
                platform,
                endpoint: &endpoint,
                success: result.is_ok(),
                elapsed: started.elapsed(),
                rate_limit,
            },
            now,
        );
        match &result {
            Ok(_) => monitor.update_health(platform, true, None, now),
            Err(e) if e.is_connectivity_failure() => {
                monitor.update_health(platform, false, Some(e.to_string()), now)
            }
            Err(_) => {}
        }
    }
    result
}

async fn send<P: BookingPlatform + ?Sized>(
    adapter: &P,
    client: &reqwest::Client,
    request: reqwest::Request,
) -> (Result<Value, PlatformError>, Option<RateLimit>) {
    let platform = adapter.platform();
    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => return (Err(PlatformError::from_reqwest(platform, e)), None),
    };

    let status = response.status();
    let rate_limit = RateLimit::from_headers(response.headers());
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return (Err(PlatformError::from_reqwest(platform, e)), rate_limit),
    };
    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    if !status.is_success() {
        let err = adapter.handle_error(status, &body);
        tracing::warn!(platform = %platform, status = %status, error = %err, "platform request failed");
        return (Err(err), rate_limit);
    }

    (Ok(body), rate_limit)
}

/// Turns any failure during the token request into an authentication error,
/// keeping credential errors as they are.
pub(crate) fn authentication_failure(platform: Platform, err: PlatformError) -> PlatformError {
    match err {
        PlatformError::InvalidCredentials(_)
        | PlatformError::Unauthorized(_)
        | PlatformError::Authentication { .. } => err,
        other => PlatformError::Authentication {
            platform,
            message: other.to_string(),
        },
    }
}

/// Fallback translation for payloads with no platform-specific error shape.
pub(crate) fn status_error(platform: Platform, status: StatusCode, payload: &Value) -> PlatformError {
    let detail = match payload {
        Value::Null => status.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match status {
        StatusCode::UNAUTHORIZED => PlatformError::Unauthorized(format!(
            "{} authentication failed. Please re-authenticate.",
            platform.display_name()
        )),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimitExceeded(format!(
            "{} API rate limit exceeded. Please try again later.",
            platform.display_name()
        )),
        _ => PlatformError::Api {
            platform,
            message: detail,
        },
    }
}

/// Builds the adapter for the configured platform, validating its credentials.
/// Every request it makes is recorded on `monitor`.
pub fn build_platform(
    config: &AppConfig,
    monitor: Arc<IntegrationMonitor>,
) -> Result<Arc<dyn BookingPlatform>, AppError> {
    let platform: Platform = config.booking_platform.parse()?;
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let base_url = config.platform_base_url.clone();

    let adapter: Arc<dyn BookingPlatform> = match platform {
        Platform::Vagaro => Arc::new(VagaroAdapter::new(
            VagaroConfig {
                base_url: base_url.unwrap_or_else(|| vagaro::DEFAULT_BASE_URL.to_string()),
                client_id: config.vagaro_client_id.clone(),
                client_secret: config.vagaro_client_secret.clone(),
            },
            timeout,
        )?
        .with_monitor(monitor)),
        Platform::Mindbody => Arc::new(MindbodyAdapter::new(
            MindbodyConfig {
                base_url: base_url.unwrap_or_else(|| mindbody::DEFAULT_BASE_URL.to_string()),
                api_key: config.mindbody_api_key.clone(),
                site_id: config.mindbody_site_id.clone(),
                username: config.mindbody_username.clone(),
                password: config.mindbody_password.clone(),
            },
            timeout,
        )?
        .with_monitor(monitor)),
        Platform::Phorest => Arc::new(PhorestAdapter::new(
            PhorestConfig {
                base_url: base_url.unwrap_or_else(|| phorest::DEFAULT_BASE_URL.to_string()),
                client_id: config.phorest_client_id.clone(),
                client_secret: config.phorest_client_secret.clone(),
                branch_id: config.phorest_branch_id.clone(),
            },
            timeout,
        )?
        .with_monitor(monitor)),
    };

    tracing::info!(platform = %platform, "booking platform adapter ready");
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(platform: &str) -> AppConfig {
        AppConfig {
            port: 3000,
            database_url: ":memory:".to_string(),
            admin_token: "t".to_string(),
            booking_platform: platform.to_string(),
            platform_base_url: Some("http://localhost:9".to_string()),
            vagaro_client_id: "vid".to_string(),
            vagaro_client_secret: "vsecret".to_string(),
            mindbody_api_key: String::new(),
            mindbody_site_id: String::new(),
            mindbody_username: None,
            mindbody_password: None,
            phorest_client_id: String::new(),
            phorest_client_secret: String::new(),
            phorest_branch_id: None,
            webhook_secret: None,
            public_base_url: None,
            salon_name: "Salon".to_string(),
            templates_path: None,
            max_suggestions: 3,
            suggestion_days_ahead: 14,
            request_timeout_secs: 1,
            delivery_interval_secs: 60,
        }
    }

    fn build_platform_for(platform: &str) -> Result<Arc<dyn BookingPlatform>, AppError> {
        build_platform(&config(platform), Arc::new(IntegrationMonitor::default()))
    }

    #[test]
    fn test_build_platform_selection() {
        let adapter = build_platform_for("Vagaro").ok().unwrap();
        assert_eq!(adapter.platform(), Platform::Vagaro);
        assert!(!adapter.is_connected());
        assert!(adapter.monitor().is_some());

        assert!(matches!(
            build_platform_for("mindbody").err(),
            Some(AppError::Config(_))
        ));
        assert!(matches!(
            build_platform_for("square").err(),
            Some(AppError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn test_normalize_data_dispatches_on_kind() {
        let adapter = build_platform_for("vagaro").ok().unwrap();
        let raw = json!({"Id": "c-1", "FirstName": "Kim", "Email": "kim@example.com"});

        match adapter.normalize_data(&raw, EntityKind::Customer) {
            NormalizedEntity::Customer(c) => {
                assert_eq!(c.id.as_deref(), Some("c-1"));
                assert_eq!(c.email.as_deref(), Some("kim@example.com"));
            }
            other => panic!("expected a customer, got {other:?}"),
        }
        assert!(matches!(
            adapter.normalize_data(&raw, EntityKind::Provider),
            NormalizedEntity::Provider(_)
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(PlatformError::Timeout(Platform::Vagaro).is_retryable());
        assert!(PlatformError::RateLimitExceeded("slow down".into()).is_retryable());
        assert!(!PlatformError::InvalidCredentials("bad".into()).is_retryable());
    }

    #[test]
    fn test_status_error_fallbacks() {
        let err = status_error(Platform::Phorest, StatusCode::UNAUTHORIZED, &Value::Null);
        assert!(matches!(err, PlatformError::Unauthorized(_)));
        let err = status_error(Platform::Phorest, StatusCode::TOO_MANY_REQUESTS, &Value::Null);
        assert!(matches!(err, PlatformError::RateLimitExceeded(_)));
        let err = status_error(
            Platform::Phorest,
            StatusCode::BAD_REQUEST,
            &Value::String("nope".into()),
        );
        assert!(matches!(err, PlatformError::Api { ref message, .. } if message == "nope"));
    }

    #[test]
    fn test_token_cell() {
        let cell = TokenCell::default();
        assert_eq!(cell.get(), None);
        cell.set("abc".into());
        assert_eq!(cell.get().as_deref(), Some("abc"));
        cell.clear();
        assert_eq!(cell.get(), None);
    }
}
