//! Maintenance schedule business logic - the schedule store.
//!
//! Enforces that a system has at most one *active* schedule: status `Scheduled` or
//! `InProgress` and not soft-deleted. Completing a schedule removes it from the
//! calendar and records how far it overran its planned end. Soft-deleted rows are
//! never purged; history queries still see them.

use crate::{
    core::{
        status::{ScheduleStatus, SystemStatus},
        system,
    },
    entities::{MaintenanceSchedule, System, maintenance_schedule},
    errors::{Error, Result},
};
use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use std::collections::BTreeMap;

/// Caller-supplied fields of a schedule, before validation.
#[derive(Debug, Clone)]
pub struct ScheduleInput {
    /// Calendar title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Planned start
    pub start: DateTime<Utc>,
    /// Planned end, strictly after `start`
    pub end: DateTime<Utc>,
    /// Requested status text (`Scheduled`, `InProgress`, `Done`)
    pub status: String,
}

impl ScheduleInput {
    /// Input reproducing an existing schedule with a different status.
    #[must_use]
    pub fn from_model(model: &maintenance_schedule::Model, status: ScheduleStatus) -> Self {
        Self {
            title: model.title.clone(),
            description: model.description.clone(),
            start: model.start_time,
            end: model.end_time,
            status: status.as_str().to_string(),
        }
    }
}

#[derive(Debug)]
struct ValidInput {
    title: String,
    description: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    status: ScheduleStatus,
}

fn validate(input: &ScheduleInput) -> Result<ValidInput> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(Error::validation("Schedule title cannot be empty"));
    }
    if input.end <= input.start {
        return Err(Error::validation(
            "Schedule end time must be after its start time",
        ));
    }
    let status: ScheduleStatus = input.status.parse()?;

    Ok(ValidInput {
        title: title.to_string(),
        description: input.description.trim().to_string(),
        start: input.start,
        end: input.end,
        status,
    })
}

/// Reads the lifecycle status of a stored schedule.
#[must_use]
pub fn status_of(schedule: &maintenance_schedule::Model) -> ScheduleStatus {
    ScheduleStatus::normalize(&schedule.status)
}

/// Seconds a schedule ran past its planned end when completed at `completed_at`, never negative.
#[must_use]
pub fn exceeded_duration_seconds(end: DateTime<Utc>, completed_at: DateTime<Utc>) -> i64 {
    (completed_at - end).num_seconds().max(0)
}

/// Finds the active schedule of `system_id`, ignoring `exclude_id`.
pub async fn find_active_conflict<C>(
    db: &C,
    system_id: i64,
    exclude_id: Option<i64>,
) -> Result<Option<maintenance_schedule::Model>>
where
    C: ConnectionTrait,
{
    let mut query = MaintenanceSchedule::find()
        .filter(maintenance_schedule::Column::SystemId.eq(system_id))
        .filter(
            maintenance_schedule::Column::Status
                .is_in(ScheduleStatus::ACTIVE.map(ScheduleStatus::as_str)),
        )
        .filter(maintenance_schedule::Column::DeletedFromCalendar.eq(false));
    if let Some(id) = exclude_id {
        query = query.filter(maintenance_schedule::Column::Id.ne(id));
    }
    query.one(db).await.map_err(Into::into)
}

fn conflict(existing: maintenance_schedule::Model) -> Error {
    Error::Conflict {
        system_id: existing.system_id,
        schedule_id: existing.id,
        title: existing.title,
    }
}

/// Creates a schedule for one system.
///
/// # Errors
/// - [`Error::Validation`] for an empty title, `end <= start`, an unknown status, or `Done`
/// - [`Error::NotFound`] if the system does not exist
/// - [`Error::Conflict`] if the system already has an active schedule
pub async fn create_schedule(
    db: &DatabaseConnection,
    system_id: i64,
    input: &ScheduleInput,
    created_by: &str,
    now: DateTime<Utc>,
) -> Result<maintenance_schedule::Model> {
    let valid = validate(input)?;
    insert_validated(db, system_id, valid, created_by, now).await
}

async fn insert_validated(
    db: &DatabaseConnection,
    system_id: i64,
    valid: ValidInput,
    created_by: &str,
    now: DateTime<Utc>,
) -> Result<maintenance_schedule::Model> {
    if !valid.status.is_active() {
        return Err(Error::validation(
            "A new schedule must be Scheduled or InProgress",
        ));
    }

    let txn = db.begin().await?;

    if System::find_by_id(system_id).one(&txn).await?.is_none() {
        return Err(Error::NotFound {
            entity: "system",
            id: system_id,
        });
    }

    if let Some(existing) = find_active_conflict(&txn, system_id, None).await? {
        return Err(conflict(existing));
    }

    let model = maintenance_schedule::ActiveModel {
        system_id: Set(system_id),
        title: Set(valid.title),
        description: Set(valid.description),
        start_time: Set(valid.start),
        end_time: Set(valid.end),
        status: Set(valid.status.as_str().to_string()),
        exceeded_duration_seconds: Set(None),
        deleted_from_calendar: Set(false),
        created_by: Set(created_by.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    tracing::info!(
        schedule_id = model.id,
        system_id,
        title = %model.title,
        "Maintenance schedule created"
    );
    Ok(model)
}

/// Result of [`update_schedule`].
#[derive(Debug, Clone)]
pub struct ScheduleUpdate {
    /// The schedule as persisted
    pub schedule: maintenance_schedule::Model,
    /// Status before the update
    pub previous_status: ScheduleStatus,
    /// Whether the owning system was moved to `online` as requested
    pub system_set_online: bool,
}

impl ScheduleUpdate {
    /// Whether this update completed the schedule.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.previous_status != ScheduleStatus::Done
            && status_of(&self.schedule) == ScheduleStatus::Done
    }
}

/// Updates a schedule's fields and lifecycle.
///
/// - Entering `Done`: `exceeded_duration_seconds = max(0, now - end)` and the row
///   leaves the calendar.
/// - Leaving `Done`: the row returns to the calendar and the overrun is cleared.
/// - Staying `Done`: the recorded overrun is preserved.
///
/// With `set_system_online` and a `Done` target, the owning system is also moved to
/// `online` (and logged) by `actor`. A failure of that side effect is logged and
/// reported through [`ScheduleUpdate::system_set_online`]; the schedule update stands.
///
/// # Errors
/// - [`Error::Validation`] for invalid input
/// - [`Error::NotFound`] if the schedule does not exist
/// - [`Error::Conflict`] if the result would be a second active schedule for the system
pub async fn update_schedule(
    db: &DatabaseConnection,
    schedule_id: i64,
    input: &ScheduleInput,
    actor: &str,
    set_system_online: bool,
    now: DateTime<Utc>,
) -> Result<ScheduleUpdate> {
    let valid = validate(input)?;

    let txn = db.begin().await?;
    let existing = MaintenanceSchedule::find_by_id(schedule_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "schedule",
            id: schedule_id,
        })?;
    let previous_status = status_of(&existing);
    let was_done = previous_status == ScheduleStatus::Done;
    let is_done = valid.status == ScheduleStatus::Done;

    let (exceeded, deleted) = match (was_done, is_done) {
        (false, true) => (
            Some(exceeded_duration_seconds(valid.end, now)),
            true,
        ),
        (true, false) => (None, false),
        (true, true) => (existing.exceeded_duration_seconds, true),
        (false, false) => (
            existing.exceeded_duration_seconds,
            existing.deleted_from_calendar,
        ),
    };

    if valid.status.is_active() && !deleted {
        if let Some(other) =
            find_active_conflict(&txn, existing.system_id, Some(schedule_id)).await?
        {
            return Err(conflict(other));
        }
    }

    let system_id = existing.system_id;
    let mut active: maintenance_schedule::ActiveModel = existing.into();
    active.title = Set(valid.title);
    active.description = Set(valid.description);
    active.start_time = Set(valid.start);
    active.end_time = Set(valid.end);
    active.status = Set(valid.status.as_str().to_string());
    active.exceeded_duration_seconds = Set(exceeded);
    active.deleted_from_calendar = Set(deleted);
    active.updated_at = Set(now);
    let schedule = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(
        schedule_id,
        system_id,
        from = %previous_status,
        to = %valid.status,
        exceeded_seconds = schedule.exceeded_duration_seconds,
        "Maintenance schedule updated"
    );

    let mut system_set_online = false;
    if set_system_online && is_done {
        let note = format!("Maintenance '{}' completed; system back online.", schedule.title);
        match system::change_status(db, system_id, SystemStatus::Online, actor, &note, now).await {
            Ok(changed) => system_set_online = changed,
            Err(e) => tracing::error!(
                schedule_id,
                system_id,
                "Schedule completed but system could not be set online: {e}"
            ),
        }
    }

    Ok(ScheduleUpdate {
        schedule,
        previous_status,
        system_set_online,
    })
}

/// Marks a schedule `Done`, keeping its other fields.
pub async fn mark_done(
    db: &DatabaseConnection,
    schedule_id: i64,
    actor: &str,
    set_system_online: bool,
    now: DateTime<Utc>,
) -> Result<ScheduleUpdate> {
    let existing = get_schedule(db, schedule_id).await?.ok_or(Error::NotFound {
        entity: "schedule",
        id: schedule_id,
    })?;
    let input = ScheduleInput::from_model(&existing, ScheduleStatus::Done);
    update_schedule(db, schedule_id, &input, actor, set_system_online, now).await
}

/// Per-system result of [`bulk_create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum BulkOutcome {
    /// Schedule created
    Success {
        /// Id of the new schedule
        schedule_id: i64,
    },
    /// Skipped: the system already has an active schedule
    Conflict {
        /// Explanation naming the existing schedule
        message: String,
    },
    /// Skipped for any other reason (unknown system, store failure)
    Error {
        /// Explanation
        message: String,
    },
}

/// Creates the same schedule for several systems, independently per system.
///
/// Never fails as a whole: each distinct system id gets its own [`BulkOutcome`].
/// Invalid input yields an `Error` outcome for every id without touching the store.
pub async fn bulk_create(
    db: &DatabaseConnection,
    system_ids: &[i64],
    input: &ScheduleInput,
    created_by: &str,
    now: DateTime<Utc>,
) -> BTreeMap<i64, BulkOutcome> {
    let mut results = BTreeMap::new();

    let valid = match validate(input) {
        Ok(valid) => valid,
        Err(e) => {
            for &system_id in system_ids {
                results.insert(
                    system_id,
                    BulkOutcome::Error {
                        message: e.to_string(),
                    },
                );
            }
            return results;
        }
    };

    for &system_id in system_ids {
        if results.contains_key(&system_id) {
            continue;
        }
        let per_system = ValidInput {
            title: valid.title.clone(),
            description: valid.description.clone(),
            start: valid.start,
            end: valid.end,
            status: valid.status,
        };
        let outcome = match insert_validated(db, system_id, per_system, created_by, now).await {
            Ok(model) => BulkOutcome::Success {
                schedule_id: model.id,
            },
            Err(e @ Error::Conflict { .. }) => BulkOutcome::Conflict {
                message: e.to_string(),
            },
            Err(e) => {
                tracing::warn!(system_id, "Bulk schedule creation skipped system: {e}");
                BulkOutcome::Error {
                    message: e.to_string(),
                }
            }
        };
        results.insert(system_id, outcome);
    }

    results
}

/// Hides a schedule from the calendar without touching its status.
///
/// Returns the schedule and whether this call was the one that hid it. Deleting an
/// already-deleted schedule succeeds.
///
/// # Errors
/// [`Error::NotFound`] only if the schedule never existed.
pub async fn soft_delete(
    db: &DatabaseConnection,
    schedule_id: i64,
    now: DateTime<Utc>,
) -> Result<(maintenance_schedule::Model, bool)> {
    let updated = MaintenanceSchedule::update_many()
        .col_expr(
            maintenance_schedule::Column::DeletedFromCalendar,
            Expr::value(true),
        )
        .col_expr(maintenance_schedule::Column::UpdatedAt, Expr::value(now))
        .filter(maintenance_schedule::Column::Id.eq(schedule_id))
        .filter(maintenance_schedule::Column::DeletedFromCalendar.eq(false))
        .exec(db)
        .await?;

    let schedule = get_schedule(db, schedule_id).await?.ok_or(Error::NotFound {
        entity: "schedule",
        id: schedule_id,
    })?;

    let newly_deleted = updated.rows_affected > 0;
    if newly_deleted {
        tracing::info!(schedule_id, "Maintenance schedule removed from calendar");
    }
    Ok((schedule, newly_deleted))
}

/// Finds a schedule by id, including soft-deleted ones.
pub async fn get_schedule<C>(
    db: &C,
    schedule_id: i64,
) -> Result<Option<maintenance_schedule::Model>>
where
    C: ConnectionTrait,
{
    MaintenanceSchedule::find_by_id(schedule_id)
        .one(db)
        .await
        .map_err(Into::into)
}

fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Schedules overlapping the given month that are not `Done` and not soft-deleted.
///
/// # Errors
/// [`Error::Validation`] for an invalid year/month.
pub async fn calendar_schedules(
    db: &DatabaseConnection,
    year: i32,
    month: u32,
) -> Result<Vec<maintenance_schedule::Model>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::validation(format!("Invalid calendar month {year}-{month}")))?;
    let next = first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| Error::validation(format!("Invalid calendar month {year}-{month}")))?;

    MaintenanceSchedule::find()
        .filter(maintenance_schedule::Column::StartTime.lt(day_start(next)))
        .filter(maintenance_schedule::Column::EndTime.gte(day_start(first)))
        .filter(maintenance_schedule::Column::Status.ne(ScheduleStatus::Done.as_str()))
        .filter(maintenance_schedule::Column::DeletedFromCalendar.eq(false))
        .order_by_asc(maintenance_schedule::Column::StartTime)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Schedules overlapping the given day that are not soft-deleted, whatever their status.
pub async fn day_schedules(
    db: &DatabaseConnection,
    day: NaiveDate,
) -> Result<Vec<maintenance_schedule::Model>> {
    let next = day
        .succ_opt()
        .ok_or_else(|| Error::validation(format!("Invalid day {day}")))?;

    MaintenanceSchedule::find()
        .filter(maintenance_schedule::Column::StartTime.lt(day_start(next)))
        .filter(maintenance_schedule::Column::EndTime.gte(day_start(day)))
        .filter(maintenance_schedule::Column::DeletedFromCalendar.eq(false))
        .order_by_asc(maintenance_schedule::Column::StartTime)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Active schedules of one system.
pub async fn active_schedules_for_system(
    db: &DatabaseConnection,
    system_id: i64,
) -> Result<Vec<maintenance_schedule::Model>> {
    MaintenanceSchedule::find()
        .filter(maintenance_schedule::Column::SystemId.eq(system_id))
        .filter(
            maintenance_schedule::Column::Status
                .is_in(ScheduleStatus::ACTIVE.map(ScheduleStatus::as_str)),
        )
        .filter(maintenance_schedule::Column::DeletedFromCalendar.eq(false))
        .order_by_asc(maintenance_schedule::Column::StartTime)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Completed schedules for history and analytics, soft-deleted or not, newest end first.
pub async fn completed_schedules(
    db: &DatabaseConnection,
    system_id: Option<i64>,
) -> Result<Vec<maintenance_schedule::Model>> {
    let mut query = MaintenanceSchedule::find()
        .filter(maintenance_schedule::Column::Status.eq(ScheduleStatus::Done.as_str()));
    if let Some(id) = system_id {
        query = query.filter(maintenance_schedule::Column::SystemId.eq(id));
    }
    query
        .order_by_desc(maintenance_schedule::Column::EndTime)
        .all(db)
        .await
        .map_err(Into::into)
}
