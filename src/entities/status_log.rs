//! Status log entity - Append-only audit trail of system status transitions.
//! Each row records who moved a system from which status to which, and why.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "status_logs")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ID of the system whose status changed
    pub system_id: i64,
    /// Status before the transition
    pub old_status: String,
    /// Status after the transition
    pub new_status: String,
    /// Actor id, or the reserved automation actor
    pub changed_by: String,
    /// Human-readable reason for the change
    pub note: String,
    /// When the transition happened (or when the note was last edited)
    pub changed_at: DateTimeUtc,
}

/// Defines relationships between `StatusLog` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one system
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
