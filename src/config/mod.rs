/// Database configuration and connection management
pub mod database;

/// Application settings and seed systems loaded from config.toml
pub mod settings;

pub use settings::{AppConfig, HealthSettings, SystemConfig};
