//! Shared test utilities for `StatusDesk`.
//!
//! This module provides common helpers for setting up test databases, creating
//! test systems and schedules with sensible defaults, and scripted stand-ins for
//! the prober and notifier.

use crate::{
    config::HealthSettings,
    core::{
        clock::FixedClock,
        health::{HealthCheckResult, HealthProbe, ProbeFailure},
        notifier::{NotificationEvent, NotificationPayload, Notifier},
        schedule::{self, ScheduleInput},
        service::StatusService,
        status::{ScheduleStatus, SystemStatus},
        system::{self, NewSystem, SystemRecord},
    },
    entities::{System, maintenance_schedule, system as system_entity},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, prelude::*, sea_query::Expr};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Fixed reference instant used by tests: Monday 2026-03-02 09:00:00 UTC.
#[allow(clippy::unwrap_used)]
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// Creates an `online` test system.
///
/// # Defaults
/// * `domain`: `"<name lowercased>.internal"`
/// * `contact`: `"ops@example.com"`
/// * `exclude_health_check`: false
pub async fn create_test_system(db: &DatabaseConnection, name: &str) -> Result<SystemRecord> {
    system::create_system(
        db,
        NewSystem {
            name: name.to_string(),
            domain: format!("{}.internal", name.to_lowercase().replace(' ', "-")),
            contact: Some("ops@example.com".to_string()),
            exclude_health_check: false,
        },
        test_now(),
    )
    .await
}

/// Creates a test database with one system named "Payroll".
pub async fn setup_with_system() -> Result<(DatabaseConnection, SystemRecord)> {
    let db = setup_test_db().await?;
    let record = create_test_system(&db, "Payroll").await?;
    Ok((db, record))
}

/// Overwrites a system's stored status text directly, bypassing the log.
pub async fn force_raw_status(db: &DatabaseConnection, system_id: i64, raw: &str) -> Result<()> {
    System::update_many()
        .col_expr(system_entity::Column::Status, Expr::value(raw))
        .filter(system_entity::Column::Id.eq(system_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Makes every status write to the system named `name` fail inside the store.
pub async fn fail_status_writes_for(db: &DatabaseConnection, name: &str) -> Result<()> {
    db.execute_unprepared(&format!(
        "CREATE TRIGGER reject_status_{name} BEFORE UPDATE OF status ON systems \
         WHEN NEW.name = '{name}' BEGIN SELECT RAISE(ABORT, 'status write rejected'); END"
    ))
    .await?;
    Ok(())
}

/// A `Scheduled` input with an empty description.
pub fn schedule_input(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ScheduleInput {
    ScheduleInput {
        title: title.to_string(),
        description: String::new(),
        start,
        end,
        status: ScheduleStatus::Scheduled.as_str().to_string(),
    }
}

/// Creates a `Scheduled` schedule by "admin", recorded as created at [`test_now`].
pub async fn create_test_schedule(
    db: &DatabaseConnection,
    system_id: i64,
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<maintenance_schedule::Model> {
    schedule::create_schedule(
        db,
        system_id,
        &schedule_input(title, start, end),
        "admin",
        test_now(),
    )
    .await
}

/// A system record that exists only in memory.
pub fn sample_record(id: i64, domain: &str) -> SystemRecord {
    SystemRecord {
        id,
        name: format!("System {id}"),
        domain: domain.to_string(),
        status: SystemStatus::Online,
        contact: None,
        exclude_health_check: false,
        updated_at: test_now(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Scripted {
    Accessible,
    Refused,
    Invalid,
    Panic,
}

/// [`HealthProbe`] answering from a per-domain script.
///
/// Domains without a script answer "connection refused".
#[derive(Debug, Default)]
pub struct ScriptedProber {
    script: Mutex<HashMap<String, Scripted>>,
    probes: AtomicUsize,
}

impl ScriptedProber {
    /// Makes `domain` accessible (HTTP 200) or refuse connections.
    #[allow(clippy::unwrap_used)]
    pub fn set(&self, domain: &str, accessible: bool) {
        let answer = if accessible {
            Scripted::Accessible
        } else {
            Scripted::Refused
        };
        self.script.lock().unwrap().insert(domain.to_string(), answer);
    }

    /// Makes probing `domain` fail with [`Error::InvalidEndpoint`].
    #[allow(clippy::unwrap_used)]
    pub fn set_invalid(&self, domain: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(domain.to_string(), Scripted::Invalid);
    }

    /// Makes the check for `domain` panic inside its task.
    #[allow(clippy::unwrap_used)]
    pub fn set_panicking(&self, domain: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(domain.to_string(), Scripted::Panic);
    }

    /// Number of probes performed so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProber {
    #[allow(clippy::unwrap_used, clippy::panic)]
    async fn check_health(&self, endpoint: &str) -> Result<HealthCheckResult> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .script
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(Scripted::Refused);

        match answer {
            Scripted::Accessible => Ok(HealthCheckResult::accessible(200, Duration::ZERO)),
            Scripted::Refused => Ok(HealthCheckResult::failed(
                ProbeFailure::ConnectionRefused,
                Duration::ZERO,
            )),
            Scripted::Invalid => Err(Error::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "scripted".to_string(),
            }),
            Scripted::Panic => panic!("scripted check failure for {endpoint}"),
        }
    }
}

/// [`Notifier`] that records every event it is handed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<(NotificationEvent, NotificationPayload)>>,
}

impl RecordingNotifier {
    /// A notifier that records events but reports every delivery as failed.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Events received so far, oldest first.
    #[allow(clippy::unwrap_used)]
    pub fn sent(&self) -> Vec<(NotificationEvent, NotificationPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    #[allow(clippy::unwrap_used)]
    async fn notify(&self, event: NotificationEvent, payload: &NotificationPayload) -> bool {
        self.sent.lock().unwrap().push((event, payload.clone()));
        !self.fail
    }
}

/// A [`StatusService`] over test doubles, with handles to drive them.
pub struct TestService {
    /// Service under test
    pub service: StatusService,
    /// Clock shared with the service, starting at [`test_now`]
    pub clock: Arc<FixedClock>,
    /// Prober shared with the service
    pub prober: Arc<ScriptedProber>,
    /// Notifier shared with the service
    pub notifier: Arc<RecordingNotifier>,
}

/// Wraps `db` in a [`StatusService`] with a fixed clock, scripted prober and
/// recording notifier. Probes run without a pause between them.
pub fn test_service(db: DatabaseConnection) -> TestService {
    let clock = Arc::new(FixedClock::new(test_now()));
    let prober = Arc::new(ScriptedProber::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = HealthSettings {
        probe_delay_ms: 0,
        ..HealthSettings::default()
    };

    let service = StatusService::new(
        db,
        clock.clone(),
        notifier.clone(),
        prober.clone(),
        settings,
    );
    TestService {
        service,
        clock,
        prober,
        notifier,
    }
}
