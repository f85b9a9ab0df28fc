//! Service facade - wires the store, clock, prober and notifier together.
//!
//! Triggers (the daemon interval, a dashboard page load, an admin action) call into
//! [`StatusService`]. Each entry point reads the clock once and passes that instant
//! down. Notifications go out only after the underlying write has committed.

use crate::{
    config::{AppConfig, HealthSettings},
    core::{
        clock::{Clock, SystemClock},
        health::{HealthProbe, HttpProber},
        notifier::{self, LogNotifier, NotificationEvent, NotificationPayload, Notifier},
        reconciler::{self, HealthCheckSummary},
        schedule::{self, BulkOutcome, ScheduleInput, ScheduleUpdate},
        scheduler::{self, MaintenanceCheckSummary},
        status::SystemStatus,
        status_log,
        system,
        throttle::PollThrottle,
    },
    entities::{maintenance_schedule, status_log as status_log_entity},
    errors::Result,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::instrument;

/// Result of one full reconciliation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    /// Maintenance pass result
    pub maintenance: MaintenanceCheckSummary,
    /// Health pass result
    pub health: HealthCheckSummary,
}

/// Entry point for every trigger.
pub struct StatusService {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    prober: Arc<dyn HealthProbe>,
    settings: HealthSettings,
    throttle: PollThrottle,
}

impl StatusService {
    /// Builds a service from explicit collaborators.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        prober: Arc<dyn HealthProbe>,
        settings: HealthSettings,
    ) -> Self {
        let throttle = PollThrottle::new(settings.min_interval());
        Self {
            db,
            clock,
            notifier,
            prober,
            settings,
            throttle,
        }
    }

    /// Builds a production service: server clock, HTTP prober, log notifier.
    ///
    /// # Errors
    /// [`crate::errors::Error::Http`] if the HTTP client cannot be built.
    pub fn from_config(db: DatabaseConnection, config: &AppConfig) -> Result<Self> {
        let prober = HttpProber::new(&config.health)?;
        Ok(Self::new(
            db,
            Arc::new(SystemClock),
            Arc::new(LogNotifier),
            Arc::new(prober),
            config.health.clone(),
        ))
    }

    /// The underlying store connection.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Switches systems whose maintenance window is open.
    pub async fn run_maintenance_check(&self) -> Result<MaintenanceCheckSummary> {
        scheduler::run_maintenance_check(&self.db, self.clock.now()).await
    }

    /// Probes every eligible system and applies the results.
    pub async fn run_health_check(&self) -> Result<HealthCheckSummary> {
        reconciler::run_health_check(
            &self.db,
            Arc::clone(&self.prober),
            self.notifier.as_ref(),
            &self.settings,
            self.clock.now(),
        )
        .await
    }

    /// Runs a health pass unless `session` triggered one within the minimum interval.
    ///
    /// Returns `Ok(None)` when throttled.
    pub async fn run_health_check_throttled(
        &self,
        session: &str,
    ) -> Result<Option<HealthCheckSummary>> {
        if !self.throttle.try_acquire(session).await {
            tracing::debug!(session, "Health check throttled");
            return Ok(None);
        }
        self.run_health_check().await.map(Some)
    }

    /// One scheduler tick: the maintenance pass, then the health pass, at one instant.
    #[instrument(skip(self))]
    pub async fn run_full_reconciliation(&self) -> Result<ReconciliationSummary> {
        let now = self.clock.now();
        let maintenance = scheduler::run_maintenance_check(&self.db, now).await?;
        let health = reconciler::run_health_check(
            &self.db,
            Arc::clone(&self.prober),
            self.notifier.as_ref(),
            &self.settings,
            now,
        )
        .await?;

        tracing::info!(
            switched = maintenance.switched,
            checked = health.checked,
            changed = health.changed,
            failed = health.failed,
            "Reconciliation finished"
        );
        Ok(ReconciliationSummary {
            maintenance,
            health,
        })
    }

    /// Creates a schedule and announces it.
    pub async fn create_schedule(
        &self,
        system_id: i64,
        input: &ScheduleInput,
        actor: &str,
    ) -> Result<maintenance_schedule::Model> {
        let created =
            schedule::create_schedule(&self.db, system_id, input, actor, self.clock.now()).await?;
        self.announce_schedule(NotificationEvent::Created, &created, "Maintenance scheduled")
            .await;
        Ok(created)
    }

    /// Updates a schedule and announces it.
    pub async fn update_schedule(
        &self,
        schedule_id: i64,
        input: &ScheduleInput,
        actor: &str,
        set_system_online: bool,
    ) -> Result<ScheduleUpdate> {
        let update = schedule::update_schedule(
            &self.db,
            schedule_id,
            input,
            actor,
            set_system_online,
            self.clock.now(),
        )
        .await?;
        self.announce_update(&update).await;
        Ok(update)
    }

    /// Completes a schedule and announces it.
    pub async fn mark_done(
        &self,
        schedule_id: i64,
        actor: &str,
        set_system_online: bool,
    ) -> Result<ScheduleUpdate> {
        let update = schedule::mark_done(
            &self.db,
            schedule_id,
            actor,
            set_system_online,
            self.clock.now(),
        )
        .await?;
        self.announce_update(&update).await;
        Ok(update)
    }

    /// Creates one schedule per system and announces each one created.
    pub async fn bulk_create(
        &self,
        system_ids: &[i64],
        input: &ScheduleInput,
        actor: &str,
    ) -> BTreeMap<i64, BulkOutcome> {
        let results =
            schedule::bulk_create(&self.db, system_ids, input, actor, self.clock.now()).await;

        for outcome in results.values() {
            let BulkOutcome::Success { schedule_id } = outcome else {
                continue;
            };
            match schedule::get_schedule(&self.db, *schedule_id).await {
                Ok(Some(created)) => {
                    self.announce_schedule(
                        NotificationEvent::Created,
                        &created,
                        "Maintenance scheduled",
                    )
                    .await;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(schedule_id, "Could not load schedule to announce: {e}"),
            }
        }
        results
    }

    /// Removes a schedule from the calendar. Announces only the first removal.
    pub async fn delete_schedule(&self, schedule_id: i64) -> Result<maintenance_schedule::Model> {
        let (deleted, newly_deleted) =
            schedule::soft_delete(&self.db, schedule_id, self.clock.now()).await?;
        if newly_deleted {
            self.announce_schedule(NotificationEvent::Cancelled, &deleted, "Maintenance cancelled")
                .await;
        }
        Ok(deleted)
    }

    /// Changes a system's status by hand. Transitions into `down` or `offline` are announced.
    pub async fn change_system_status(
        &self,
        system_id: i64,
        new: SystemStatus,
        actor: &str,
        note: &str,
    ) -> Result<bool> {
        let before = system::get_system(&self.db, system_id).await?;
        let changed =
            system::change_status(&self.db, system_id, new, actor, note, self.clock.now()).await?;

        let announce = changed && matches!(new, SystemStatus::Down | SystemStatus::Offline);
        if let (true, Some(before)) = (announce, before) {
            notifier::dispatch(
                self.notifier.as_ref(),
                NotificationEvent::StatusChanged,
                NotificationPayload {
                    system_id,
                    system_name: before.name.clone(),
                    contact: before.contact,
                    schedule: None,
                    old_status: Some(before.status),
                    new_status: Some(new),
                    message: format!("{} was marked {new} by {actor}", before.name),
                },
            )
            .await;
        }
        Ok(changed)
    }

    /// Corrects the note of a status log entry.
    pub async fn edit_log_note(
        &self,
        entry_id: i64,
        note: &str,
    ) -> Result<status_log_entity::Model> {
        status_log::edit_note(&self.db, entry_id, note, self.clock.now()).await
    }

    async fn announce_update(&self, update: &ScheduleUpdate) {
        let message = if update.completed() {
            "Maintenance completed"
        } else {
            "Maintenance updated"
        };
        self.announce_schedule(NotificationEvent::Updated, &update.schedule, message)
            .await;
    }

    async fn announce_schedule(
        &self,
        event: NotificationEvent,
        schedule: &maintenance_schedule::Model,
        headline: &str,
    ) {
        let owner = match system::get_system(&self.db, schedule.system_id).await {
            Ok(Some(owner)) => owner,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(schedule_id = schedule.id, "Skipping notification: {e}");
                return;
            }
        };

        notifier::dispatch(
            self.notifier.as_ref(),
            event,
            NotificationPayload {
                system_id: owner.id,
                message: format!("{headline}: {} ({})", schedule.title, owner.name),
                system_name: owner.name,
                contact: owner.contact,
                schedule: Some(schedule.clone()),
                old_status: None,
                new_status: None,
            },
        )
        .await;
    }
}
