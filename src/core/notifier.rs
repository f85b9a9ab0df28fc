//! Notification seam.
//!
//! Delivery (templating, SMTP) lives outside this crate. Callers hand a structured
//! payload to a [`Notifier`] after the state change is committed; a failed
//! notification is logged and never undoes the change.

use crate::{core::status::SystemStatus, entities::maintenance_schedule};
use async_trait::async_trait;
use serde::Serialize;

/// Kind of event being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationEvent {
    /// A maintenance schedule was created
    Created,
    /// A maintenance schedule was edited or completed
    Updated,
    /// A maintenance schedule was removed from the calendar
    Cancelled,
    /// A system changed status
    StatusChanged,
}

/// Structured data handed to the notifier.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    /// System the event concerns
    pub system_id: i64,
    /// Display name of the system
    pub system_name: String,
    /// Contact for the system, if any
    pub contact: Option<String>,
    /// Schedule involved, for schedule events
    pub schedule: Option<maintenance_schedule::Model>,
    /// Status before the change, for status events
    pub old_status: Option<SystemStatus>,
    /// Status after the change, for status events
    pub new_status: Option<SystemStatus>,
    /// Human-readable summary
    pub message: String,
}

/// Sends notifications about schedule and status events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification. Returns whether delivery succeeded.
    async fn notify(&self, event: NotificationEvent, payload: &NotificationPayload) -> bool;
}

/// Notifier that records every event in the application log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotificationEvent, payload: &NotificationPayload) -> bool {
        tracing::info!(
            ?event,
            system_id = payload.system_id,
            system = %payload.system_name,
            schedule_id = payload.schedule.as_ref().map(|s| s.id),
            "Notification: {}",
            payload.message
        );
        true
    }
}

/// Sends a notification and logs, but otherwise ignores, a failed delivery.
pub async fn dispatch(
    notifier: &dyn Notifier,
    event: NotificationEvent,
    payload: NotificationPayload,
) {
    if !notifier.notify(event, &payload).await {
        tracing::warn!(
            ?event,
            system_id = payload.system_id,
            "Notification delivery failed; state change stands"
        );
    }
}
