//! Per-host alert state and webhook dispatch.
//!
//! A host goes DOWN once any of its endpoints reaches the failure threshold and comes back UP
//! only when no endpoint is failing. FAILURE notifications are gated by the host's cooldown;
//! RECOVERY notifications never are.
use chrono::{TimeZone, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::models::{EventType, NotificationChannel, NotificationEvent};
use super::senders::{NotificationSender, SenderError};
use crate::clock::Clock;
use crate::db::models::{Endpoint, Host, ProbeOutcome};
use crate::db::{DeliveryLogSink, MonitorRepository, StoreError};
use crate::monitoring::template;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Channel not found: {0}")]
    NotFound(i32),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Sender error: {0}")]
    Sender(#[from] SenderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostAlertState {
    pub host_id: i32,
    /// endpoint id -> consecutive failures
    pub failing_endpoints: HashMap<i32, u32>,
    pub current_status: HostStatus,
    pub last_notified_at_ms: Option<i64>,
}

impl HostAlertState {
    pub fn new(host_id: i32) -> Self {
        Self {
            host_id,
            failing_endpoints: HashMap::new(),
            current_status: HostStatus::Up,
            last_notified_at_ms: None,
        }
    }

    /// Folds one outcome into the state and returns the notification it warrants, if any.
    ///
    /// The status change is applied even when a FAILURE is suppressed by the cooldown.
    pub fn record(
        &mut self,
        endpoint_id: i32,
        success: bool,
        failure_threshold: u32,
        cooldown_ms: i64,
        now_ms: i64,
    ) -> Option<EventType> {
        if success {
            self.failing_endpoints.remove(&endpoint_id);
        } else {
            *self.failing_endpoints.entry(endpoint_id).or_insert(0) += 1;
        }

        let threshold = failure_threshold.max(1);
        let any_threshold_reached = self.failing_endpoints.values().any(|count| *count >= threshold);

        let previous = self.current_status;
        let next = if any_threshold_reached {
            HostStatus::Down
        } else if self.failing_endpoints.is_empty() {
            HostStatus::Up
        } else {
            // Failing below threshold: hold whatever the host was.
            previous
        };
        self.current_status = next;

        match (previous, next) {
            (HostStatus::Up, HostStatus::Down) => {
                if let Some(last) = self.last_notified_at_ms {
                    if now_ms - last < cooldown_ms {
                        return None;
                    }
                }
                self.last_notified_at_ms = Some(now_ms);
                Some(EventType::Failure)
            }
            (HostStatus::Down, HostStatus::Up) => {
                self.last_notified_at_ms = Some(now_ms);
                Some(EventType::Recovery)
            }
            _ => None,
        }
    }

    pub fn consecutive_failures(&self, endpoint_id: i32) -> u32 {
        self.failing_endpoints.get(&endpoint_id).copied().unwrap_or(0)
    }
}

pub struct NotificationService {
    repository: Arc<dyn MonitorRepository>,
    delivery_log: Arc<dyn DeliveryLogSink>,
    sender: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<i32, HostAlertState>>,
}

impl NotificationService {
    pub fn new(
        repository: Arc<dyn MonitorRepository>,
        delivery_log: Arc<dyn DeliveryLogSink>,
        sender: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            delivery_log,
            sender,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Feeds one probe outcome into the host's alert state, dispatching on qualifying transitions.
    pub async fn process_outcome(&self, outcome: &ProbeOutcome, endpoint: &Endpoint, host: &Host) {
        if !host.notifications_active() {
            return;
        }

        let now_ms = self.clock.now_epoch_ms();
        let cooldown_ms = i64::from(host.notification.cooldown_minutes) * 60_000;

        let (event_type, consecutive_failures) = {
            let mut states = self.states.lock().await;
            let state = states
                .entry(host.id)
                .or_insert_with(|| HostAlertState::new(host.id));
            let previous = state.current_status;
            let event_type = state.record(
                endpoint.id,
                outcome.success,
                host.notification.failure_threshold,
                cooldown_ms,
                now_ms,
            );
            if previous != state.current_status && event_type.is_none() {
                info!(
                    host_id = host.id,
                    endpoint_id = endpoint.id,
                    status = ?state.current_status,
                    "Host status changed; notification suppressed by cooldown."
                );
            }
            (event_type, state.consecutive_failures(endpoint.id))
        };

        let Some(event_type) = event_type else {
            return;
        };

        info!(
            host_id = host.id,
            endpoint_id = endpoint.id,
            event = %event_type,
            "Host status transition; dispatching notifications."
        );
        let context = build_context(event_type, outcome, endpoint, host, consecutive_failures);
        self.dispatch(event_type, &context, host, endpoint.id).await;
    }

    async fn dispatch(&self, event_type: EventType, context: &Value, host: &Host, endpoint_id: i32) {
        for channel_id in &host.notification.channel_ids {
            let channel = match self.repository.get_channel(*channel_id).await {
                Ok(Some(channel)) if channel.enabled => channel,
                Ok(Some(_)) => {
                    debug!(channel_id, "Skipping disabled notification channel.");
                    continue;
                }
                Ok(None) => {
                    warn!(channel_id, host_id = host.id, "Notification channel not found.");
                    continue;
                }
                Err(e) => {
                    error!(channel_id, error = %e, "Failed to load notification channel.");
                    continue;
                }
            };

            let rendered_body = template::render(&channel.body_template, context);
            let result = self.sender.send(&channel, &rendered_body).await;
            let error_message = match &result {
                Ok(()) => {
                    info!(channel_id, event = %event_type, "Notification delivered.");
                    None
                }
                Err(e) => {
                    warn!(channel_id, event = %event_type, error = %e, "Notification delivery failed.");
                    Some(e.to_string())
                }
            };

            let event = NotificationEvent {
                channel_id: channel.id,
                channel_name: channel.name.clone(),
                host_id: host.id,
                endpoint_id,
                event_type,
                rendered_body,
                delivery_success: result.is_ok(),
                error_message,
                created_at: Utc::now(),
            };
            if let Err(e) = self.delivery_log.record_delivery_log(&event).await {
                error!(channel_id, error = %e, "Failed to record notification delivery.");
            }
        }
    }

    /// Sends a synthetic FAILURE notification through one channel. Not written to the delivery log.
    pub async fn test_channel(&self, channel_id: i32) -> Result<(), NotificationError> {
        let channel: NotificationChannel = self
            .repository
            .get_channel(channel_id)
            .await?
            .ok_or(NotificationError::NotFound(channel_id))?;

        let context = test_context(self.clock.now_epoch_ms());
        let rendered_body = template::render(&channel.body_template, &context);
        self.sender.send(&channel, &rendered_body).await?;
        info!(channel_id, "Test notification delivered.");
        Ok(())
    }

    /// Forgets everything about a deleted host.
    pub async fn clear_host_state(&self, host_id: i32) {
        if self.states.lock().await.remove(&host_id).is_some() {
            debug!(host_id, "Cleared host alert state.");
        }
    }

    /// Forgets a deleted endpoint's failures; the host returns to UP if nothing else is failing.
    pub async fn clear_endpoint_state(&self, host_id: i32, endpoint_id: i32) {
        let mut states = self.states.lock().await;
        if let Some(state) = states.get_mut(&host_id) {
            state.failing_endpoints.remove(&endpoint_id);
            if state.failing_endpoints.is_empty() {
                state.current_status = HostStatus::Up;
            }
        }
    }

    pub async fn host_state(&self, host_id: i32) -> Option<HostAlertState> {
        self.states.lock().await.get(&host_id).cloned()
    }
}

fn build_context(
    event_type: EventType,
    outcome: &ProbeOutcome,
    endpoint: &Endpoint,
    host: &Host,
    consecutive_failures: u32,
) -> Value {
    json!({
        "eventType": event_type.as_str(),
        "endpoint": {
            "id": endpoint.id,
            "name": endpoint.name,
            "url": endpoint.configured_url(),
        },
        "service": {
            "id": host.id,
            "name": host.name,
            "url": host.base_url,
        },
        "details": {
            "status": outcome.status_code,
            "responseTime": outcome.response_time_ms,
            "message": outcome.message,
            "consecutiveFailures": consecutive_failures,
        },
        "timestamp": outcome.timestamp.to_rfc3339(),
    })
}

fn test_context(now_ms: i64) -> Value {
    let timestamp = Utc
        .timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_else(Utc::now);
    json!({
        "eventType": EventType::Failure.as_str(),
        "endpoint": {
            "id": 0,
            "name": "Test Endpoint",
            "url": "https://example.com/health",
        },
        "service": {
            "id": 0,
            "name": "Test Service",
            "url": "https://example.com",
        },
        "details": {
            "status": 500,
            "responseTime": 0,
            "message": "This is a test notification",
            "consecutiveFailures": 1,
        },
        "timestamp": timestamp.to_rfc3339(),
    })
}
