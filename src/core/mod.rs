//! Core business logic - framework-agnostic store operations, passes and triggers.

pub mod clock;
pub mod health;
pub mod notifier;
pub mod reconciler;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod status;
pub mod status_log;
pub mod system;
pub mod throttle;
