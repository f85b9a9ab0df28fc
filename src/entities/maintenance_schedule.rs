//! Maintenance schedule entity - A planned maintenance window for one system.
//!
//! `deleted_from_calendar` is a soft delete: rows are never purged so that
//! completed maintenance stays visible to history queries.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Maintenance schedule database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "maintenance_schedules")]
pub struct Model {
    /// Unique identifier for the schedule
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ID of the system under maintenance
    pub system_id: i64,
    /// Short title shown on the calendar
    pub title: String,
    /// Free-text description of the work
    pub description: String,
    /// Planned start of the window
    pub start_time: DateTimeUtc,
    /// Planned end of the window
    pub end_time: DateTimeUtc,
    /// `Scheduled`, `InProgress` or `Done`
    pub status: String,
    /// Seconds past `end_time` at completion, set only once the schedule is Done
    pub exceeded_duration_seconds: Option<i64>,
    /// Soft delete flag - hidden from calendar and active views
    pub deleted_from_calendar: bool,
    /// Actor who created the schedule
    pub created_by: String,
    /// When the schedule was created
    pub created_at: DateTimeUtc,
    /// When the schedule was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `MaintenanceSchedule` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each schedule belongs to one system
    #[sea_orm(
        belongs_to = "super::system::Entity",
        from = "Column::SystemId",
        to = "super::system::Column::Id"
    )]
    System,
}

impl Related<super::system::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::System.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
