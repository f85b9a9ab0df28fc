//! Database configuration module for `StatusDesk`.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust models.

use crate::entities::{MaintenanceSchedule, StatusLog, System};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Default database location when neither `DATABASE_URL` nor `config.toml` name one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://status_desk.sqlite?mode=rwc";

/// Resolves the database URL: `DATABASE_URL` from the environment wins over the
/// configured value, which wins over [`DEFAULT_DATABASE_URL`].
#[must_use]
pub fn get_database_url(configured: Option<&str>) -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| configured.map(ToString::to_string))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the `SQLite` database at `database_url`.
///
/// The returned handle is passed explicitly to every component that needs the store.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    tracing::debug!("Connecting to database at {database_url}");
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates the systems, maintenance schedule and status log tables if they do not exist.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut system_table = schema.create_table_from_entity(System);
    let mut schedule_table = schema.create_table_from_entity(MaintenanceSchedule);
    let mut status_log_table = schema.create_table_from_entity(StatusLog);
    system_table.if_not_exists();
    schedule_table.if_not_exists();
    status_log_table.if_not_exists();

    db.execute(builder.build(&system_table)).await?;
    db.execute(builder.build(&schedule_table)).await?;
    db.execute(builder.build(&status_log_table)).await?;

    Ok(())
}
