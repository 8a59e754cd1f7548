//! Per-platform integration metrics: API call and webhook counters, response
//! times, rate-limit headroom, connection health and threshold alerts.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::models::Platform;

/// Alerts kept for the metrics endpoint; older ones are only in the logs.
const RECENT_ALERTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    /// Share of failed calls above which an error-rate alert fires.
    pub error_rate: f64,
    pub response_time_ms: u64,
    /// Share of the rate-limit window left below which an alert fires.
    pub rate_limit_remaining: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            error_rate: 0.1,
            response_time_ms: 2000,
            rate_limit_remaining: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    RateLimitApproaching,
    HighErrorRate,
    SlowResponseTime,
    HighWebhookErrorRate,
    IntegrationHealthIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub kind: AlertKind,
    pub platform: Platform,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CallCounts {
    pub total: u64,
    pub success: u64,
    pub error: u64,
}

impl CallCounts {
    fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.success += 1;
        } else {
            self.error += 1;
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.error as f64 / self.total as f64
        }
    }
}

/// Running average, min and max of response times in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: Option<u64>,
    pub max_ms: u64,
}

impl Timing {
    fn record(&mut self, ms: u64) {
        self.avg_ms = (self.avg_ms * self.count as f64 + ms as f64) / (self.count + 1) as f64;
        self.count += 1;
        self.min_ms = Some(self.min_ms.map_or(ms, |min| min.min(ms)));
        self.max_ms = self.max_ms.max(ms);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WebhookCounts {
    pub received: u64,
    pub processed: u64,
    pub errors: u64,
}

impl WebhookCounts {
    fn record(&mut self, success: bool) {
        self.received += 1;
        if success {
            self.processed += 1;
        } else {
            self.errors += 1;
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.errors as f64 / self.received as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub calls: CallCounts,
    pub response_times: Timing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub connected: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetrics {
    pub api_calls: CallCounts,
    pub response_times: Timing,
    pub endpoints: BTreeMap<String, EndpointStats>,
    pub webhooks: WebhookCounts,
    pub webhook_events: BTreeMap<String, WebhookCounts>,
    /// Last reported share of the rate-limit window still available.
    pub rate_limit_remaining: Option<f64>,
    pub rate_limit_reset: Option<String>,
    pub health: HealthStatus,
}

/// Rate-limit headroom reported by a platform response.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimit {
    pub remaining: f64,
    pub reset: Option<String>,
}

impl RateLimit {
    /// Reads `X-RateLimit-Remaining` against `X-RateLimit-Limit`. Responses
    /// without both headers carry no rate-limit information.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
        };
        let remaining = number("x-ratelimit-remaining")?;
        let limit = number("x-ratelimit-limit").filter(|l| *l > 0.0)?;
        Some(Self {
            remaining: (remaining / limit).clamp(0.0, 1.0),
            reset: headers
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

/// One finished platform request.
#[derive(Debug, Clone)]
pub struct ApiCall<'a> {
    pub platform: Platform,
    /// Method and path, e.g. `GET /clients/42`.
    pub endpoint: &'a str,
    pub success: bool,
    pub elapsed: Duration,
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub api_calls: CallCounts,
    pub response_times: Timing,
    pub webhooks: WebhookCounts,
    pub platforms: BTreeMap<Platform, PlatformMetrics>,
    pub alerts: Vec<Alert>,
    pub thresholds: AlertThresholds,
    pub last_check: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformHealth {
    pub status: HealthState,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub overall: HealthState,
    pub platforms: BTreeMap<Platform, PlatformHealth>,
}

#[derive(Debug)]
struct MonitorState {
    api_calls: CallCounts,
    response_times: Timing,
    webhooks: WebhookCounts,
    platforms: BTreeMap<Platform, PlatformMetrics>,
    alerts: VecDeque<Alert>,
    thresholds: AlertThresholds,
    last_check: Option<DateTime<Utc>>,
}

impl MonitorState {
    fn new(thresholds: AlertThresholds) -> Self {
        Self {
            api_calls: CallCounts::default(),
            response_times: Timing::default(),
            webhooks: WebhookCounts::default(),
            platforms: Platform::ALL
                .into_iter()
                .map(|p| (p, PlatformMetrics::default()))
                .collect(),
            alerts: VecDeque::new(),
            thresholds,
            last_check: None,
        }
    }

    fn platform(&mut self, platform: Platform) -> &mut PlatformMetrics {
        self.platforms.entry(platform).or_default()
    }

    fn raise(&mut self, kind: AlertKind, platform: Platform, detail: String, now: DateTime<Utc>) {
        tracing::warn!(alert = ?kind, platform = %platform, "integration alert: {detail}");
        if self.alerts.len() == RECENT_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(Alert {
            kind,
            platform,
            detail,
            raised_at: now,
        });
    }
}

pub struct IntegrationMonitor {
    state: Mutex<MonitorState>,
}

impl Default for IntegrationMonitor {
    fn default() -> Self {
        Self::new(AlertThresholds::default())
    }
}

impl IntegrationMonitor {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            state: Mutex::new(MonitorState::new(thresholds)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_thresholds(&self, thresholds: AlertThresholds) {
        self.lock().thresholds = thresholds;
    }

    pub fn record_api_call(&self, call: ApiCall<'_>, now: DateTime<Utc>) {
        let elapsed_ms = u64::try_from(call.elapsed.as_millis()).unwrap_or(u64::MAX);
        let mut state = self.lock();
        let thresholds = state.thresholds;

        state.api_calls.record(call.success);
        state.response_times.record(elapsed_ms);

        let metrics = state.platform(call.platform);
        metrics.api_calls.record(call.success);
        metrics.response_times.record(elapsed_ms);
        let endpoint = metrics.endpoints.entry(call.endpoint.to_string()).or_default();
        endpoint.calls.record(call.success);
        endpoint.response_times.record(elapsed_ms);

        if let Some(rate_limit) = &call.rate_limit {
            metrics.rate_limit_remaining = Some(rate_limit.remaining);
            metrics.rate_limit_reset = rate_limit.reset.clone();
        }
        let error_rate = metrics.api_calls.error_rate();

        tracing::debug!(
            platform = %call.platform,
            endpoint = call.endpoint,
            success = call.success,
            elapsed_ms,
            "platform call recorded"
        );

        if let Some(rate_limit) = call.rate_limit {
            if rate_limit.remaining < thresholds.rate_limit_remaining {
                state.raise(
                    AlertKind::RateLimitApproaching,
                    call.platform,
                    format!(
                        "{:.0}% of the rate limit left, resets {}",
                        rate_limit.remaining * 100.0,
                        rate_limit.reset.as_deref().unwrap_or("unknown")
                    ),
                    now,
                );
            }
        }
        if error_rate > thresholds.error_rate {
            state.raise(
                AlertKind::HighErrorRate,
                call.platform,
                format!("error rate {error_rate:.2} above {:.2}", thresholds.error_rate),
                now,
            );
        }
        if elapsed_ms > thresholds.response_time_ms {
            state.raise(
                AlertKind::SlowResponseTime,
                call.platform,
                format!(
                    "{} took {elapsed_ms}ms, above {}ms",
                    call.endpoint, thresholds.response_time_ms
                ),
                now,
            );
        }
    }

    pub fn record_webhook(&self, platform: Platform, event_type: &str, success: bool, now: DateTime<Utc>) {
        let mut state = self.lock();
        let threshold = state.thresholds.error_rate;

        state.webhooks.record(success);
        let metrics = state.platform(platform);
        metrics.webhooks.record(success);
        metrics
            .webhook_events
            .entry(event_type.to_string())
            .or_default()
            .record(success);
        let error_rate = metrics.webhooks.error_rate();

        if error_rate > threshold {
            state.raise(
                AlertKind::HighWebhookErrorRate,
                platform,
                format!("webhook error rate {error_rate:.2} above {threshold:.2}"),
                now,
            );
        }
    }

    /// Connection state after a call. Going unhealthy raises an alert.
    pub fn update_health(
        &self,
        platform: Platform,
        connected: bool,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) {
        let mut state = self.lock();
        state.last_check = Some(now);
        let health = &mut state.platform(platform).health;
        health.connected = connected;
        if connected {
            health.last_success = Some(now);
            health.error_message = None;
            return;
        }
        health.last_error = Some(now);
        health.error_message = error_message.clone();
        state.raise(
            AlertKind::IntegrationHealthIssue,
            platform,
            error_message.unwrap_or_else(|| "connection lost".to_string()),
            now,
        );
    }

    /// Last known status of `platforms`; degraded when any is unhealthy.
    pub fn health_report(&self, platforms: &[Platform], now: DateTime<Utc>) -> HealthReport {
        let mut state = self.lock();
        state.last_check = Some(now);

        let mut overall = HealthState::Healthy;
        let mut report = BTreeMap::new();
        for platform in platforms {
            let health = state.platform(*platform).health.clone();
            let status = if health.connected {
                HealthState::Healthy
            } else {
                overall = HealthState::Degraded;
                HealthState::Unhealthy
            };
            report.insert(
                *platform,
                PlatformHealth {
                    status,
                    last_success: health.last_success,
                    last_error: health.last_error,
                    error_message: health.error_message,
                },
            );
        }

        HealthReport {
            timestamp: now,
            overall,
            platforms: report,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        let state = self.lock();
        MetricsSnapshot {
            api_calls: state.api_calls,
            response_times: state.response_times,
            webhooks: state.webhooks,
            platforms: state.platforms.clone(),
            alerts: state.alerts.iter().cloned().collect(),
            thresholds: state.thresholds,
            last_check: state.last_check,
            timestamp: now,
        }
    }

    /// Clears counters and alerts. Health status and thresholds survive.
    pub fn reset(&self, now: DateTime<Utc>) {
        let mut state = self.lock();
        let mut fresh = MonitorState::new(state.thresholds);
        for (platform, metrics) in &state.platforms {
            fresh.platform(*platform).health = metrics.health.clone();
        }
        fresh.last_check = Some(now);
        *state = fresh;
    }
}
