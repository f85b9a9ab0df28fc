//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod maintenance_schedule;
pub mod status_log;
pub mod system;

// Re-export specific types to avoid conflicts
pub use maintenance_schedule::{
    Column as MaintenanceScheduleColumn, Entity as MaintenanceSchedule,
    Model as MaintenanceScheduleModel,
};
pub use status_log::{Column as StatusLogColumn, Entity as StatusLog, Model as StatusLogModel};
pub use system::{Column as SystemColumn, Entity as System, Model as SystemModel};
