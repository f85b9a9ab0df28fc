//! System entity - A monitored web application or service.
//!
//! The `status` column holds raw text; use [`crate::core::status::SystemStatus`]
//! to read it, never the string directly.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// System database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "systems")]
pub struct Model {
    /// Unique identifier for the system
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g., "Payroll Portal")
    pub name: String,
    /// Domain or endpoint probed by the health check
    pub domain: String,
    /// One of `online`, `maintenance`, `down`, `offline`, `archived`
    pub status: String,
    /// Contact person or mailbox for this system
    pub contact: Option<String>,
    /// Skip this system during automated health checks
    pub exclude_health_check: bool,
    /// When the system row was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between System and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One system has many maintenance schedules
    #[sea_orm(has_many = "super::maintenance_schedule::Entity")]
    MaintenanceSchedules,
    /// One system has many status log entries
    #[sea_orm(has_many = "super::status_log::Entity")]
    StatusLogs,
}

impl Related<super::maintenance_schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaintenanceSchedules.def()
    }
}

impl Related<super::status_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
