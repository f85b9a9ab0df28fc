//! System business logic - monitored systems and their status transitions.
//!
//! Every status write is a single-row conditional update guarded on the status the
//! caller last observed, committed together with its status log entry. A writer that
//! loses a race matches zero rows and writes nothing.

use crate::{
    config::SystemConfig,
    core::{status::SystemStatus, status_log},
    entities::{System, system},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    QueryOrder, Set, TransactionTrait,
    prelude::*,
    sea_query::{Expr, SimpleExpr},
};
use serde::Serialize;

/// A system as seen by the rest of the crate, with its status already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemRecord {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Domain or endpoint probed by the health check
    pub domain: String,
    /// Current status
    pub status: SystemStatus,
    /// Contact person or mailbox
    pub contact: Option<String>,
    /// Skipped by automated health checks
    pub exclude_health_check: bool,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl From<system::Model> for SystemRecord {
    fn from(model: system::Model) -> Self {
        Self {
            status: SystemStatus::normalize(&model.status),
            id: model.id,
            name: model.name,
            domain: model.domain,
            contact: model.contact,
            exclude_health_check: model.exclude_health_check,
            updated_at: model.updated_at,
        }
    }
}

/// Input for [`create_system`].
#[derive(Debug, Clone)]
pub struct NewSystem {
    /// Display name
    pub name: String,
    /// Domain or endpoint
    pub domain: String,
    /// Contact person or mailbox
    pub contact: Option<String>,
    /// Skip automated health checks
    pub exclude_health_check: bool,
}

impl From<&SystemConfig> for NewSystem {
    fn from(config: &SystemConfig) -> Self {
        Self {
            name: config.name.clone(),
            domain: config.domain.clone(),
            contact: config.contact.clone(),
            exclude_health_check: config.exclude_health_check,
        }
    }
}

/// Row filter matching a stored status whose normalized value is `status`.
///
/// `online` also matches any unrecognized raw value, since those read as `online`.
pub(crate) fn status_guard(status: SystemStatus) -> SimpleExpr {
    match status {
        SystemStatus::Online => system::Column::Status.is_not_in(
            SystemStatus::ALL
                .into_iter()
                .filter(|s| *s != SystemStatus::Online)
                .map(SystemStatus::as_str),
        ),
        other => system::Column::Status.eq(other.as_str()),
    }
}

/// Creates a new system. New systems start `online`.
pub async fn create_system(
    db: &DatabaseConnection,
    input: NewSystem,
    now: DateTime<Utc>,
) -> Result<SystemRecord> {
    if input.name.trim().is_empty() {
        return Err(Error::validation("System name cannot be empty"));
    }
    if input.domain.trim().is_empty() {
        return Err(Error::validation("System domain cannot be empty"));
    }

    let model = system::ActiveModel {
        name: Set(input.name.trim().to_string()),
        domain: Set(input.domain.trim().to_string()),
        status: Set(SystemStatus::Online.as_str().to_string()),
        contact: Set(input.contact),
        exclude_health_check: Set(input.exclude_health_check),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(model.insert(db).await?.into())
}

/// Finds a system by id.
pub async fn get_system<C>(db: &C, system_id: i64) -> Result<Option<SystemRecord>>
where
    C: ConnectionTrait,
{
    Ok(System::find_by_id(system_id)
        .one(db)
        .await?
        .map(SystemRecord::from))
}

/// Finds a system by exact name.
pub async fn get_system_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<SystemRecord>> {
    Ok(System::find()
        .filter(system::Column::Name.eq(name))
        .one(db)
        .await?
        .map(SystemRecord::from))
}

/// Lists all systems ordered by name.
pub async fn list_systems(db: &DatabaseConnection) -> Result<Vec<SystemRecord>> {
    Ok(System::find()
        .order_by_asc(system::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(SystemRecord::from)
        .collect())
}

/// Systems eligible for the automated health pass: not archived, not excluded.
pub async fn health_check_candidates(db: &DatabaseConnection) -> Result<Vec<SystemRecord>> {
    Ok(System::find()
        .filter(system::Column::Status.ne(SystemStatus::Archived.as_str()))
        .filter(system::Column::ExcludeHealthCheck.eq(false))
        .order_by_asc(system::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(SystemRecord::from)
        .collect())
}

/// Moves a system from `expected` to `new` and logs it, atomically.
///
/// Returns `Ok(false)` without writing anything when the system is no longer in
/// `expected` (another writer got there first).
pub(crate) async fn transition_status(
    db: &DatabaseConnection,
    system_id: i64,
    expected: SystemStatus,
    new: SystemStatus,
    changed_by: &str,
    note: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let txn = db.begin().await?;

    let updated = System::update_many()
        .col_expr(system::Column::Status, Expr::value(new.as_str()))
        .col_expr(system::Column::UpdatedAt, Expr::value(now))
        .filter(system::Column::Id.eq(system_id))
        .filter(status_guard(expected))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(false);
    }

    status_log::append_entry(&txn, system_id, expected, new, changed_by, note, now).await?;
    txn.commit().await?;
    Ok(true)
}

/// Changes a system's status on behalf of a human actor.
///
/// Returns `Ok(false)` when the system is already in `new`; nothing is logged then.
///
/// # Errors
/// - [`Error::NotFound`] if the system does not exist
/// - [`Error::StaleWrite`] if the status changed between read and write
pub async fn change_status(
    db: &DatabaseConnection,
    system_id: i64,
    new: SystemStatus,
    changed_by: &str,
    note: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let current = get_system(db, system_id).await?.ok_or(Error::NotFound {
        entity: "system",
        id: system_id,
    })?;

    if current.status == new {
        return Ok(false);
    }

    let note = if note.trim().is_empty() {
        format!("Status changed from {} to {new}.", current.status)
    } else {
        note.trim().to_string()
    };

    if transition_status(db, system_id, current.status, new, changed_by, &note, now).await? {
        tracing::info!(
            system_id,
            old = %current.status,
            new = %new,
            actor = changed_by,
            "System status changed"
        );
        Ok(true)
    } else {
        Err(Error::StaleWrite {
            entity: "system",
            id: system_id,
        })
    }
}

/// Includes or excludes a system from automated health checks.
pub async fn set_health_check_exclusion(
    db: &DatabaseConnection,
    system_id: i64,
    excluded: bool,
    now: DateTime<Utc>,
) -> Result<SystemRecord> {
    let model = System::find_by_id(system_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "system",
            id: system_id,
        })?;

    let mut active: system::ActiveModel = model.into();
    active.exclude_health_check = Set(excluded);
    active.updated_at = Set(now);
    Ok(active.update(db).await?.into())
}

/// Creates every configured system whose name is not already present.
///
/// Returns the number of systems created.
pub async fn seed_systems(
    db: &DatabaseConnection,
    systems: &[SystemConfig],
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut created = 0;
    for config in systems {
        if get_system_by_name(db, &config.name).await?.is_some() {
            tracing::debug!("System '{}' already present, skipping seed", config.name);
            continue;
        }
        create_system(db, config.into(), now).await?;
        tracing::info!("Seeded system '{}'", config.name);
        created += 1;
    }
    Ok(created)
}
