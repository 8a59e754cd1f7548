//! Inbound webhook parsing and signature checks, per platform.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::errors::AppError;
use crate::models::{Appointment, Customer, Platform, PlatformData};
use crate::services::platforms::normalize::{self, Keys, Schema};
use crate::services::platforms::{mindbody, phorest, vagaro};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entity {
    Appointment,
    Client,
}

/// How one platform shapes its webhook deliveries.
struct WebhookFormat {
    schema: &'static Schema,
    signature_header: &'static str,
    event_keys: Keys,
    appointment_keys: Keys,
    client_keys: Keys,
    /// Native event name (lower-cased), dispatcher event type, payload entity.
    events: &'static [(&'static str, &'static str, Entity)],
}

static VAGARO: WebhookFormat = WebhookFormat {
    schema: &vagaro::SCHEMA,
    signature_header: "x-vagaro-signature",
    event_keys: &["eventType", "EventType"],
    appointment_keys: &["data", "Data"],
    client_keys: &["data", "Data"],
    events: &[
        ("appointment.created", "appointment.created", Entity::Appointment),
        ("appointment.updated", "appointment.updated", Entity::Appointment),
        ("appointment.cancelled", "appointment.cancelled", Entity::Appointment),
        ("appointment.completed", "appointment.completed", Entity::Appointment),
        ("client.created", "client.created", Entity::Client),
        ("client.updated", "client.updated", Entity::Client),
    ],
};

static MINDBODY: WebhookFormat = WebhookFormat {
    schema: &mindbody::SCHEMA,
    signature_header: "x-mindbodyonline-signature",
    event_keys: &["EventType", "eventType"],
    appointment_keys: &["Appointment", "appointment"],
    client_keys: &["Client", "client"],
    events: &[
        ("appointment.added", "appointment.created", Entity::Appointment),
        ("appointment.updated", "appointment.updated", Entity::Appointment),
        ("appointment.cancelled", "appointment.cancelled", Entity::Appointment),
        ("appointment.completed", "appointment.completed", Entity::Appointment),
        ("client.added", "client.created", Entity::Client),
        ("client.updated", "client.updated", Entity::Client),
    ],
};

static PHOREST: WebhookFormat = WebhookFormat {
    schema: &phorest::SCHEMA,
    signature_header: "x-phorest-signature",
    event_keys: &["eventType", "type"],
    appointment_keys: &["data", "appointment"],
    client_keys: &["data", "client"],
    events: &[
        ("appointment_created", "appointment.created", Entity::Appointment),
        ("appointment_updated", "appointment.updated", Entity::Appointment),
        ("appointment_cancelled", "appointment.cancelled", Entity::Appointment),
        ("appointment_completed", "appointment.completed", Entity::Appointment),
        ("client_created", "client.created", Entity::Client),
        ("client_updated", "client.updated", Entity::Client),
    ],
};

fn format_for(platform: Platform) -> &'static WebhookFormat {
    match platform {
        Platform::Vagaro => &VAGARO,
        Platform::Mindbody => &MINDBODY,
        Platform::Phorest => &PHOREST,
    }
}

pub fn signature_header(platform: Platform) -> &'static str {
    format_for(platform).signature_header
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum EventPayload {
    Appointment(Appointment),
    Client(Customer),
    /// Body of an event type the platform sends but nothing here handles.
    Unhandled(Value),
}

/// A webhook delivery reduced to the dispatcher's vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    /// Dispatcher event type, e.g. `appointment.cancelled`. Unknown
    /// platform events keep their native name.
    pub event_type: String,
    pub platform: Platform,
    pub payload: EventPayload,
}

impl WebhookEvent {
    pub fn appointment(&self) -> Option<&Appointment> {
        match &self.payload {
            EventPayload::Appointment(a) => Some(a),
            _ => None,
        }
    }

    pub fn client(&self) -> Option<&Customer> {
        match &self.payload {
            EventPayload::Client(c) => Some(c),
            _ => None,
        }
    }
}

/// Checks the platform's signature header. The header must be present; when
/// `secret` is set it must also hold base64(HMAC-SHA256(secret, body)).
pub fn verify_signature(
    platform: Platform,
    header_value: Option<&str>,
    body: &[u8],
    secret: Option<&str>,
) -> Result<(), AppError> {
    let Some(signature) = header_value.map(str::trim).filter(|s| !s.is_empty()) else {
        tracing::warn!(platform = %platform, header = signature_header(platform), "missing webhook signature");
        return Err(AppError::InvalidSignature);
    };
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Ok(());
    };

    let provided = base64::engine::general_purpose::STANDARD
        .decode(signature)
        .map_err(|_| AppError::InvalidSignature)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| AppError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| {
        tracing::warn!(platform = %platform, "invalid webhook signature");
        AppError::InvalidSignature
    })
}

pub fn sign(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Phorest deliveries without a branch belong to the default branch, as
/// adapter-fetched records do.
fn default_branch(platform: Platform, data: &mut PlatformData) {
    if platform == Platform::Phorest && data.branch_id.is_none() {
        data.branch_id = Some(phorest::DEFAULT_BRANCH_ID.to_string());
    }
}

/// Extracts the event type and normalizes the entity the event carries.
pub fn parse_webhook(platform: Platform, payload: &Value) -> Result<WebhookEvent, AppError> {
    let format = format_for(platform);
    let native = normalize::text(payload, format.event_keys).ok_or_else(|| {
        AppError::Validation(format!("Missing event type in {} webhook payload", platform.display_name()))
    })?;
    let lowered = native.to_lowercase();

    let Some((_, event_type, entity)) = format.events.iter().find(|(name, _, _)| *name == lowered) else {
        tracing::info!(platform = %platform, event_type = %native, "unhandled webhook event type");
        return Ok(WebhookEvent {
            event_type: native,
            platform,
            payload: EventPayload::Unhandled(payload.clone()),
        });
    };

    let data_keys = match entity {
        Entity::Appointment => format.appointment_keys,
        Entity::Client => format.client_keys,
    };
    let data = data_keys
        .iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| v.is_object())
        .ok_or_else(|| {
            let what = match entity {
                Entity::Appointment => "appointment",
                Entity::Client => "client",
            };
            AppError::Validation(format!("Missing {what} data in payload"))
        })?;

    let payload = match entity {
        Entity::Appointment => {
            let mut appointment = normalize::appointment(format.schema, data);
            default_branch(platform, &mut appointment.platform_data);
            EventPayload::Appointment(appointment)
        }
        Entity::Client => {
            let mut client = normalize::customer(format.schema, data);
            default_branch(platform, &mut client.platform_data);
            EventPayload::Client(client)
        }
    };

    tracing::info!(platform = %platform, event_type = %event_type, "parsed webhook");
    Ok(WebhookEvent {
        event_type: event_type.to_string(),
        platform,
        payload,
    })
}

/// Where and for which native events a platform delivers webhooks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub platform: Platform,
    pub webhook_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    pub registered_events: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub webhook_url: Option<String>,
    pub site_id: Option<String>,
    pub branch_id: Option<String>,
}

/// Webhook subscriptions per platform, one at a time.
#[derive(Debug, Default)]
pub struct WebhookRegistry {
    entries: Mutex<HashMap<Platform, WebhookRegistration>>,
}

impl WebhookRegistry {
    /// Records the subscription for `platform`, replacing any earlier one.
    /// The URL defaults to `{base_url}/webhooks/{platform}`; Mindbody needs a
    /// site id and Phorest falls back to its default branch.
    pub fn register(
        &self,
        platform: Platform,
        request: RegistrationRequest,
        base_url: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookRegistration, AppError> {
        let webhook_url = request
            .webhook_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("{}/webhooks/{platform}", base_url.trim_end_matches('/')));
        if !(webhook_url.starts_with("https://") || webhook_url.starts_with("http://")) {
            return Err(AppError::Validation(format!("webhook URL must be http(s): {webhook_url}")));
        }

        let (site_id, branch_id) = match platform {
            Platform::Vagaro => (None, None),
            Platform::Mindbody => {
                let site_id = request.site_id.filter(|s| !s.is_empty()).ok_or_else(|| {
                    AppError::Validation("Missing siteId in Mindbody webhook configuration".to_string())
                })?;
                (Some(site_id), None)
            }
            Platform::Phorest => (
                None,
                Some(
                    request
                        .branch_id
                        .filter(|b| !b.is_empty())
                        .unwrap_or_else(|| phorest::DEFAULT_BRANCH_ID.to_string()),
                ),
            ),
        };

        let registration = WebhookRegistration {
            platform,
            webhook_url,
            site_id,
            branch_id,
            registered_events: format_for(platform)
                .events
                .iter()
                .map(|(native, _, _)| native.to_string())
                .collect(),
            registered_at: now,
        };
        tracing::info!(
            platform = %platform,
            url = %registration.webhook_url,
            events = registration.registered_events.len(),
            "registered webhooks"
        );
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(platform, registration.clone());
        Ok(registration)
    }

    /// Drops the subscription. Returns what was registered, if anything.
    pub fn unregister(&self, platform: Platform) -> Option<WebhookRegistration> {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&platform);
        tracing::info!(platform = %platform, was_registered = removed.is_some(), "unregistered webhooks");
        removed
    }

    pub fn get(&self, platform: Platform) -> Option<WebhookRegistration> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&platform)
            .cloned()
    }
}
