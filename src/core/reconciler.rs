//! Status reconciler - applies health probe results to system status.
//!
//! Only three kinds of automatic transition exist: `online -> down` when a probe
//! fails, and `down`/`offline`/`archived -> online` when a probe succeeds.
//! `maintenance` is never left automatically.

use crate::{
    config::HealthSettings,
    core::{
        health::{HealthProbe, probe_all},
        notifier::{self, NotificationEvent, NotificationPayload, Notifier},
        status::SystemStatus,
        status_log::AUTOMATION_ACTOR,
        system,
    },
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Result of one health pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCheckSummary {
    /// Systems probed
    pub checked: usize,
    /// Systems whose status changed
    pub changed: usize,
    /// Systems that could not be probed or updated
    pub failed: usize,
}

/// Decides the status a system should move to after a probe, if any.
///
/// `archived -> online` is part of the table even though archived systems are not
/// selected for health checks.
#[must_use]
pub const fn decide_transition(old: SystemStatus, accessible: bool) -> Option<SystemStatus> {
    match (old, accessible) {
        (SystemStatus::Online, false) => Some(SystemStatus::Down),
        (SystemStatus::Down | SystemStatus::Offline | SystemStatus::Archived, true) => {
            Some(SystemStatus::Online)
        }
        _ => None,
    }
}

/// Whether a transition into `status` should be announced.
const fn notifies(status: SystemStatus) -> bool {
    matches!(status, SystemStatus::Down | SystemStatus::Offline)
}

/// Probes every eligible system and applies the resulting transitions at `now`.
///
/// Run [`crate::core::scheduler::run_maintenance_check`] first in the same tick so
/// that systems entering maintenance are not marked down.
///
/// # Errors
/// Only when the candidate systems cannot be read.
#[instrument(skip(db, prober, notifier, settings))]
pub async fn run_health_check(
    db: &DatabaseConnection,
    prober: Arc<dyn HealthProbe>,
    notifier: &dyn Notifier,
    settings: &HealthSettings,
    now: DateTime<Utc>,
) -> Result<HealthCheckSummary> {
    let candidates = system::health_check_candidates(db).await?;
    let outcomes = probe_all(
        prober,
        candidates,
        settings.concurrency,
        settings.probe_delay(),
    )
    .await;

    let mut summary = HealthCheckSummary {
        checked: outcomes.len(),
        ..HealthCheckSummary::default()
    };

    for outcome in outcomes {
        let record = outcome.system;
        let result = match outcome.result {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(system_id = record.id, "Health check skipped: {e}");
                summary.failed += 1;
                continue;
            }
        };

        let Some(new) = decide_transition(record.status, result.accessible) else {
            if !result.accessible {
                tracing::debug!(
                    system_id = record.id,
                    status = %record.status,
                    "Still not accessible: {}",
                    result.reason()
                );
            }
            continue;
        };

        let note = format!("Health check: {}", result.reason());
        match system::transition_status(
            db,
            record.id,
            record.status,
            new,
            AUTOMATION_ACTOR,
            &note,
            now,
        )
        .await
        {
            Ok(true) => {
                summary.changed += 1;
                tracing::info!(
                    system_id = record.id,
                    old = %record.status,
                    new = %new,
                    "{note}"
                );
                if notifies(new) {
                    notifier::dispatch(
                        notifier,
                        NotificationEvent::StatusChanged,
                        NotificationPayload {
                            system_id: record.id,
                            system_name: record.name.clone(),
                            contact: record.contact.clone(),
                            schedule: None,
                            old_status: Some(record.status),
                            new_status: Some(new),
                            message: format!("{} is {new}: {}", record.name, result.reason()),
                        },
                    )
                    .await;
                }
            }
            Ok(false) => tracing::debug!(
                system_id = record.id,
                "Status changed during the probe; result discarded"
            ),
            Err(e) => {
                tracing::error!(system_id = record.id, "Failed to apply health result: {e}");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
