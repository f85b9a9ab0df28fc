//! Status log business logic - the append-only audit trail of status transitions.
//!
//! Entries are written in the same database transaction as the status change they
//! describe. The only permitted mutation afterwards is [`edit_note`].

use crate::{
    core::status::SystemStatus,
    entities::{StatusLog, status_log},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};

/// Actor id recorded for transitions made by the scheduler and the health reconciler.
pub const AUTOMATION_ACTOR: &str = "system:automation";

/// Appends one log entry describing a transition from `old` to `new`.
pub async fn append_entry<C>(
    db: &C,
    system_id: i64,
    old: SystemStatus,
    new: SystemStatus,
    changed_by: &str,
    note: &str,
    changed_at: DateTime<Utc>,
) -> Result<status_log::Model>
where
    C: ConnectionTrait,
{
    let entry = status_log::ActiveModel {
        system_id: Set(system_id),
        old_status: Set(old.as_str().to_string()),
        new_status: Set(new.as_str().to_string()),
        changed_by: Set(changed_by.to_string()),
        note: Set(note.to_string()),
        changed_at: Set(changed_at),
        ..Default::default()
    };
    entry.insert(db).await.map_err(Into::into)
}

/// Returns every entry for a system, newest first.
pub async fn entries_for_system<C>(db: &C, system_id: i64) -> Result<Vec<status_log::Model>>
where
    C: ConnectionTrait,
{
    StatusLog::find()
        .filter(status_log::Column::SystemId.eq(system_id))
        .order_by_desc(status_log::Column::ChangedAt)
        .order_by_desc(status_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Returns the most recent `limit` entries across all systems.
pub async fn recent_entries<C>(db: &C, limit: u64) -> Result<Vec<status_log::Model>>
where
    C: ConnectionTrait,
{
    StatusLog::find()
        .order_by_desc(status_log::Column::ChangedAt)
        .order_by_desc(status_log::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Rewrites the note and timestamp of an existing entry.
///
/// This is an administrative correction: the recorded transition itself is untouched.
pub async fn edit_note<C>(
    db: &C,
    entry_id: i64,
    note: &str,
    now: DateTime<Utc>,
) -> Result<status_log::Model>
where
    C: ConnectionTrait,
{
    if note.trim().is_empty() {
        return Err(Error::validation("Status log note cannot be empty"));
    }

    let entry = StatusLog::find_by_id(entry_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "status log entry",
            id: entry_id,
        })?;

    let mut active: status_log::ActiveModel = entry.into();
    active.note = Set(note.trim().to_string());
    active.changed_at = Set(now);
    active.update(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_append_and_list_entries() -> Result<()> {
        let db = setup_test_db().await?;
        let system = create_test_system(&db, "Payroll").await?;
        let now = test_now();

        append_entry(
            &db,
            system.id,
            SystemStatus::Online,
            SystemStatus::Down,
            AUTOMATION_ACTOR,
            "Connection refused",
            now,
        )
        .await?;
        append_entry(
            &db,
            system.id,
            SystemStatus::Down,
            SystemStatus::Online,
            AUTOMATION_ACTOR,
            "System is now accessible",
            now + Duration::minutes(5),
        )
        .await?;

        let entries = entries_for_system(&db, system.id).await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].old_status, "down");
        assert_eq!(entries[0].new_status, "online");
        assert_eq!(entries[1].new_status, "down");
        assert_eq!(entries[1].changed_by, AUTOMATION_ACTOR);

        let recent = recent_entries(&db, 1).await?;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, entries[0].id);

        Ok(())
    }

    #[tokio::test]
    async fn test_edit_note_rewrites_text_and_time_only() -> Result<()> {
        let db = setup_test_db().await?;
        let system = create_test_system(&db, "Payroll").await?;
        let now = test_now();

        let entry = append_entry(
            &db,
            system.id,
            SystemStatus::Online,
            SystemStatus::Offline,
            "admin-7",
            "typo",
            now,
        )
        .await?;

        let later = now + Duration::hours(1);
        let edited = edit_note(&db, entry.id, "  Decommissioned for migration  ", later).await?;
        assert_eq!(edited.note, "Decommissioned for migration");
        assert_eq!(edited.changed_at, later);
        assert_eq!(edited.old_status, "online");
        assert_eq!(edited.new_status, "offline");
        assert_eq!(edited.changed_by, "admin-7");

        // Still exactly one entry
        assert_eq!(entries_for_system(&db, system.id).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_edit_note_errors() -> Result<()> {
        let db = setup_test_db().await?;

        let missing = edit_note(&db, 42, "note", test_now()).await;
        assert!(matches!(
            missing.unwrap_err(),
            Error::NotFound { id: 42, .. }
        ));

        let empty = edit_note(&db, 42, "   ", test_now()).await;
        assert!(matches!(empty.unwrap_err(), Error::Validation { .. }));

        Ok(())
    }
}
