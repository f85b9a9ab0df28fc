//! Maintenance scheduler - moves systems into maintenance when a schedule window opens.
//!
//! One pass works in two steps against a single `now`:
//!
//! 1. Every active, visible schedule whose window contains `now` and whose system is
//!    not already `maintenance` or `archived` switches that system to `maintenance`
//!    (logged as the automation actor) and promotes the schedule to `InProgress`.
//! 2. Every schedule still `Scheduled` inside its window is promoted to `InProgress`,
//!    including those skipped in step 1 because the system was already in
//!    maintenance. Without this step a schedule whose system was put into
//!    maintenance by hand before the window opened would stay `Scheduled` forever.
//!
//! Only step 1 counts towards `switched`. Both steps are guarded writes, so running
//! the pass again, or from two callers at once, changes nothing the second time.
//! Maintenance is never ended here; a schedule whose window has closed leaves its
//! system in maintenance until an administrator completes it.

use crate::{
    core::{
        status::{ScheduleStatus, SystemStatus},
        status_log::AUTOMATION_ACTOR,
        system,
    },
    entities::{MaintenanceSchedule, System, maintenance_schedule},
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::instrument;

/// Result of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceCheckSummary {
    /// Systems moved into maintenance by this pass
    pub switched: usize,
    /// Schedules promoted to `InProgress` by the catch-up step only
    pub promoted: u64,
}

async fn promote_schedule<C>(db: &C, schedule_id: i64, now: DateTime<Utc>) -> Result<bool>
where
    C: ConnectionTrait,
{
    let updated = MaintenanceSchedule::update_many()
        .col_expr(
            maintenance_schedule::Column::Status,
            Expr::value(ScheduleStatus::InProgress.as_str()),
        )
        .col_expr(maintenance_schedule::Column::UpdatedAt, Expr::value(now))
        .filter(maintenance_schedule::Column::Id.eq(schedule_id))
        .filter(maintenance_schedule::Column::Status.eq(ScheduleStatus::Scheduled.as_str()))
        .exec(db)
        .await?;
    Ok(updated.rows_affected > 0)
}

async fn promote_open_windows<C>(db: &C, now: DateTime<Utc>) -> Result<u64>
where
    C: ConnectionTrait,
{
    let updated = MaintenanceSchedule::update_many()
        .col_expr(
            maintenance_schedule::Column::Status,
            Expr::value(ScheduleStatus::InProgress.as_str()),
        )
        .col_expr(maintenance_schedule::Column::UpdatedAt, Expr::value(now))
        .filter(maintenance_schedule::Column::Status.eq(ScheduleStatus::Scheduled.as_str()))
        .filter(maintenance_schedule::Column::StartTime.lte(now))
        .filter(maintenance_schedule::Column::EndTime.gte(now))
        .filter(maintenance_schedule::Column::DeletedFromCalendar.eq(false))
        .exec(db)
        .await?;
    Ok(updated.rows_affected)
}

/// Runs one maintenance pass at `now`.
///
/// # Errors
/// Only when the due schedules cannot be selected at all. Failures on individual
/// systems are logged and skipped.
#[instrument(skip(db))]
pub async fn run_maintenance_check(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
) -> Result<MaintenanceCheckSummary> {
    let due = MaintenanceSchedule::find()
        .find_also_related(System)
        .filter(maintenance_schedule::Column::StartTime.lte(now))
        .filter(maintenance_schedule::Column::EndTime.gte(now))
        .filter(
            maintenance_schedule::Column::Status
                .is_in(ScheduleStatus::ACTIVE.map(ScheduleStatus::as_str)),
        )
        .filter(maintenance_schedule::Column::DeletedFromCalendar.eq(false))
        .filter(crate::entities::system::Column::Status.is_not_in([
            SystemStatus::Maintenance.as_str(),
            SystemStatus::Archived.as_str(),
        ]))
        .order_by_asc(maintenance_schedule::Column::StartTime)
        .all(db)
        .await?;

    let mut summary = MaintenanceCheckSummary::default();

    for (schedule, owner) in due {
        let Some(owner) = owner else {
            tracing::warn!(schedule_id = schedule.id, "Schedule has no owning system");
            continue;
        };
        let old = SystemStatus::normalize(&owner.status);
        let note = format!("Auto-maintenance: schedule '{}' started.", schedule.title);

        match system::transition_status(
            db,
            owner.id,
            old,
            SystemStatus::Maintenance,
            AUTOMATION_ACTOR,
            &note,
            now,
        )
        .await
        {
            Ok(true) => {
                summary.switched += 1;
                tracing::info!(
                    system_id = owner.id,
                    schedule_id = schedule.id,
                    old = %old,
                    "System switched to maintenance"
                );
            }
            Ok(false) => {
                tracing::debug!(
                    system_id = owner.id,
                    "System changed concurrently; leaving it to the next pass"
                );
                continue;
            }
            Err(e) => {
                tracing::error!(
                    system_id = owner.id,
                    schedule_id = schedule.id,
                    "Failed to switch system to maintenance: {e}"
                );
                continue;
            }
        }

        if let Err(e) = promote_schedule(db, schedule.id, now).await {
            tracing::error!(
                schedule_id = schedule.id,
                "Failed to mark schedule in progress: {e}"
            );
        }
    }

    match promote_open_windows(db, now).await {
        Ok(promoted) => {
            summary.promoted = promoted;
            if promoted > 0 {
                tracing::debug!(
                    promoted,
                    "Promoted schedules whose system was already in maintenance"
                );
            }
        }
        Err(e) => tracing::error!("Failed to promote open maintenance windows: {e}"),
    }

    Ok(summary)
}
