//! Routes parsed webhook events to the rebooking engine and the follow-up
//! scheduler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use rand::rngs::StdRng;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Appointment, Platform, RebookingSuggestion, SalonProfile, ScheduledMessage};
use crate::services::messaging::followup::{schedule_follow_up_sequence, CompletedVisit};
use crate::services::messaging::templates::TemplateCatalog;
use crate::services::platforms::BookingPlatform;
use crate::services::rebooking::{RebookingService, SuggestionOptions};
use crate::services::webhooks::WebhookEvent;

const FALLBACK_SERVICE_NAME: &str = "your service";
const FALLBACK_STYLIST_NAME: &str = "your stylist";

/// Everything the default handlers reach for.
pub struct EventContext {
    pub platform: Arc<dyn BookingPlatform>,
    pub rebooking: Arc<RebookingService>,
    pub db: Arc<Mutex<Connection>>,
    pub catalog: Arc<TemplateCatalog>,
    pub salon: SalonProfile,
    pub max_suggestions: usize,
    pub days_ahead: i64,
    /// Tip selection source. Seed it to make follow-up content reproducible.
    pub rng: Mutex<StdRng>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<RebookingSuggestion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_messages: Option<Vec<ScheduledMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_appointment_date: Option<DateTime<FixedOffset>>,
}

impl EventOutcome {
    fn acknowledged(message: String) -> Self {
        Self {
            message,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    pub event_type: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<EventOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &EventContext,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, AppError>;
}

/// Logs and acknowledges events that need no computation.
pub struct AcknowledgeHandler;

#[async_trait]
impl EventHandler for AcknowledgeHandler {
    async fn handle(
        &self,
        _ctx: &EventContext,
        event: &WebhookEvent,
        _now: DateTime<Utc>,
    ) -> Result<EventOutcome, AppError> {
        let subject = event
            .appointment()
            .and_then(|a| a.id.clone())
            .or_else(|| event.client().and_then(|c| c.id.clone()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::info!(platform = %event.platform, event_type = %event.event_type, id = %subject, "acknowledged event");
        Ok(EventOutcome::acknowledged(format!(
            "Processed {} event for {subject}",
            event.event_type
        )))
    }
}

fn appointment_of(event: &WebhookEvent) -> Result<&Appointment, AppError> {
    event
        .appointment()
        .ok_or_else(|| AppError::Validation(format!("{} event carries no appointment", event.event_type)))
}

fn customer_id_of(appointment: &Appointment) -> Result<&str, AppError> {
    appointment
        .customer_id
        .as_deref()
        .ok_or_else(|| AppError::Validation("appointment has no customer id".to_string()))
}

/// Ranks open slots for the customer whose appointment was cancelled.
pub struct CancellationHandler;

#[async_trait]
impl EventHandler for CancellationHandler {
    async fn handle(
        &self,
        ctx: &EventContext,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, AppError> {
        let appointment = appointment_of(event)?;
        let customer_id = customer_id_of(appointment)?;
        let options = SuggestionOptions {
            days_ahead: ctx.days_ahead,
            max_suggestions: ctx.max_suggestions,
            service_id: appointment.service_id.clone(),
            ..Default::default()
        };

        let suggestions = ctx.rebooking.generate_suggestions(customer_id, &options, now).await?;
        tracing::info!(
            customer_id,
            appointment_id = ?appointment.id,
            count = suggestions.len(),
            "rebooking suggestions for cancelled appointment"
        );

        Ok(EventOutcome {
            message: format!(
                "Processed appointment cancelled event for {}",
                appointment.id.as_deref().unwrap_or("unknown")
            ),
            suggestions: Some(suggestions),
            ..Default::default()
        })
    }
}

/// Schedules the follow-up sequence and recommends the next visit.
pub struct CompletionHandler;

impl CompletionHandler {
    async fn service_name(ctx: &EventContext, service_id: Option<&str>) -> String {
        let Some(id) = service_id else {
            return FALLBACK_SERVICE_NAME.to_string();
        };
        match ctx.platform.get_service(id).await {
            Ok(service) => service.name.unwrap_or_else(|| FALLBACK_SERVICE_NAME.to_string()),
            Err(e) => {
                tracing::warn!(service_id = id, error = %e, "service lookup failed");
                FALLBACK_SERVICE_NAME.to_string()
            }
        }
    }

    async fn stylist_name(ctx: &EventContext, provider_id: Option<&str>) -> String {
        let Some(id) = provider_id else {
            return FALLBACK_STYLIST_NAME.to_string();
        };
        match ctx.platform.get_provider(id).await {
            Ok(provider) => provider
                .first_name
                .unwrap_or_else(|| FALLBACK_STYLIST_NAME.to_string()),
            Err(e) => {
                tracing::warn!(provider_id = id, error = %e, "provider lookup failed");
                FALLBACK_STYLIST_NAME.to_string()
            }
        }
    }
}

#[async_trait]
impl EventHandler for CompletionHandler {
    async fn handle(
        &self,
        ctx: &EventContext,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, AppError> {
        let appointment = appointment_of(event)?;
        let customer_id = customer_id_of(appointment)?;
        let customer = ctx.platform.get_customer(customer_id).await?;

        let start_time = match appointment.start_time {
            Some(start) => start,
            None => {
                tracing::warn!(
                    customer_id,
                    appointment_id = ?appointment.id,
                    "completed appointment has no start time, scheduling from now"
                );
                now.fixed_offset()
            }
        };
        let visit = CompletedVisit {
            appointment_id: appointment.id.clone(),
            start_time,
            service_name: Self::service_name(ctx, appointment.service_id.as_deref()).await,
            stylist_name: Self::stylist_name(ctx, appointment.provider_id.as_deref()).await,
        };

        let scheduled = {
            let mut rng = ctx.rng.lock().unwrap_or_else(PoisonError::into_inner);
            schedule_follow_up_sequence(&ctx.catalog, &visit, &customer, &ctx.salon, now, &mut *rng)?
        };
        {
            let conn = ctx.db.lock().unwrap_or_else(PoisonError::into_inner);
            queries::insert_scheduled_messages(&conn, &scheduled)?;
        }

        // The sequence is already stored; a failed history fetch only costs the recommendation.
        let next_appointment_date = match appointment.service_id.as_deref() {
            Some(service_id) => match ctx.rebooking.recommended_next_date(customer_id, service_id, now).await {
                Ok(date) => Some(date),
                Err(e) => {
                    tracing::warn!(customer_id, service_id, error = %e, "next visit recommendation failed");
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            customer_id,
            appointment_id = ?appointment.id,
            scheduled = scheduled.len(),
            next = ?next_appointment_date,
            "follow-up sequence stored"
        );

        Ok(EventOutcome {
            message: format!(
                "Processed appointment completed event for {}",
                appointment.id.as_deref().unwrap_or("unknown")
            ),
            scheduled_messages: Some(scheduled),
            next_appointment_date,
            ..Default::default()
        })
    }
}

pub struct BookingEventDispatcher {
    ctx: EventContext,
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl BookingEventDispatcher {
    pub fn new(ctx: EventContext) -> Self {
        Self {
            ctx,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Dispatcher with the stock handler for every known event type.
    pub fn with_defaults(ctx: EventContext) -> Self {
        let dispatcher = Self::new(ctx);
        let ack: Arc<dyn EventHandler> = Arc::new(AcknowledgeHandler);
        for event_type in [
            "appointment.created",
            "appointment.updated",
            "client.created",
            "client.updated",
        ] {
            dispatcher.register(event_type, ack.clone());
        }
        dispatcher.register("appointment.cancelled", Arc::new(CancellationHandler));
        dispatcher.register("appointment.completed", Arc::new(CompletionHandler));
        dispatcher
    }

    /// Installs `handler` for `event_type`, replacing any previous one.
    pub fn register(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event_type.to_string(), handler);
    }

    pub fn has_handler(&self, event_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event_type)
    }

    pub fn context(&self) -> &EventContext {
        &self.ctx
    }

    /// Runs the handler for one event. Handler failures are reported in the
    /// result, never returned.
    pub async fn dispatch(&self, event: &WebhookEvent, now: DateTime<Utc>) -> DispatchResult {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_type)
            .cloned();

        let Some(handler) = handler else {
            tracing::warn!(platform = %event.platform, event_type = %event.event_type, "no handler registered");
            return DispatchResult {
                success: false,
                event_type: event.event_type.clone(),
                platform: event.platform,
                result: None,
                message: Some(format!("No handler registered for event type: {}", event.event_type)),
                error: None,
            };
        };

        tracing::info!(platform = %event.platform, event_type = %event.event_type, "processing event");
        match handler.handle(&self.ctx, event, now).await {
            Ok(outcome) => DispatchResult {
                success: true,
                event_type: event.event_type.clone(),
                platform: event.platform,
                result: Some(outcome),
                message: None,
                error: None,
            },
            Err(e) => {
                tracing::error!(
                    platform = %event.platform,
                    event_type = %event.event_type,
                    error = %e,
                    "event processing failed"
                );
                DispatchResult {
                    success: false,
                    event_type: event.event_type.clone(),
                    platform: event.platform,
                    result: None,
                    message: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Dispatches in order. One event failing does not stop the rest.
    pub async fn dispatch_batch(&self, events: &[WebhookEvent], now: DateTime<Utc>) -> Vec<DispatchResult> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            results.push(self.dispatch(event, now).await);
        }
        results
    }
}
