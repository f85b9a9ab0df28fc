//! Status vocabularies for systems and maintenance schedules.
//!
//! Both are stored as text. Reading goes through [`SystemStatus::normalize`] /
//! [`ScheduleStatus::from_str`] so the rest of the crate only sees enum values.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Status of a monitored system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    /// Reachable and in service
    #[default]
    Online,
    /// Under planned maintenance
    Maintenance,
    /// Failed its last health probe
    Down,
    /// Taken out of service
    Offline,
    /// Retired, kept for history
    Archived,
}

impl SystemStatus {
    /// Every status, in display order.
    pub const ALL: [Self; 5] = [
        Self::Online,
        Self::Maintenance,
        Self::Down,
        Self::Offline,
        Self::Archived,
    ];

    /// Stored text for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Maintenance => "maintenance",
            Self::Down => "down",
            Self::Offline => "offline",
            Self::Archived => "archived",
        }
    }

    /// Maps raw stored text to a status. Anything other than the exact stored
    /// spelling of a status reads as `online`.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .unwrap_or_default()
    }
}

impl FromStr for SystemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "maintenance" => Ok(Self::Maintenance),
            "down" => Ok(Self::Down),
            "offline" => Ok(Self::Offline),
            "archived" => Ok(Self::Archived),
            other => Err(Error::validation(format!(
                "Unknown system status: {other}. \
                 Allowed: online, maintenance, down, offline, archived"
            ))),
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a maintenance schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleStatus {
    /// Planned, window not yet entered
    Scheduled,
    /// Window entered, work under way
    InProgress,
    /// Closed by an administrator
    Done,
}

impl ScheduleStatus {
    /// Statuses that make a schedule "active" for exclusivity purposes.
    pub const ACTIVE: [Self; 2] = [Self::Scheduled, Self::InProgress];

    /// Stored text for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::InProgress => "InProgress",
            Self::Done => "Done",
        }
    }

    /// Maps raw stored text to a status. Unreadable text is logged and reads as
    /// `Scheduled`.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|_| {
            tracing::warn!(raw, "Unreadable schedule status; treating it as Scheduled");
            Self::Scheduled
        })
    }

    /// Whether this status counts towards active-schedule exclusivity.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::InProgress)
    }
}

impl FromStr for ScheduleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_lowercase();
        match folded.as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "inprogress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(Error::validation(format!(
                "Unknown schedule status: {}. Allowed: Scheduled, InProgress, Done",
                s.trim()
            ))),
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_system_status_normalize_defaults_to_online() {
        assert_eq!(SystemStatus::normalize(""), SystemStatus::Online);
        assert_eq!(SystemStatus::normalize("bogus"), SystemStatus::Online);
        assert_eq!(SystemStatus::normalize("Down"), SystemStatus::Online);
        assert_eq!(SystemStatus::normalize("down"), SystemStatus::Down);
        assert_eq!(SystemStatus::normalize("archived"), SystemStatus::Archived);
    }

    #[test]
    fn test_system_status_round_trips_through_text() {
        for status in SystemStatus::ALL {
            assert_eq!(status.as_str().parse::<SystemStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_system_status_parse_rejects_unknown() {
        let err = "sleeping".parse::<SystemStatus>().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_schedule_status_accepts_common_spellings() {
        assert_eq!(
            "In Progress".parse::<ScheduleStatus>().unwrap(),
            ScheduleStatus::InProgress
        );
        assert_eq!(
            "in_progress".parse::<ScheduleStatus>().unwrap(),
            ScheduleStatus::InProgress
        );
        assert_eq!("done".parse::<ScheduleStatus>().unwrap(), ScheduleStatus::Done);
        assert!("cancelled".parse::<ScheduleStatus>().is_err());
    }

    #[test]
    fn test_schedule_status_normalize() {
        assert_eq!(ScheduleStatus::normalize("InProgress"), ScheduleStatus::InProgress);
        assert_eq!(ScheduleStatus::normalize("Done"), ScheduleStatus::Done);
        assert_eq!(ScheduleStatus::normalize("garbage"), ScheduleStatus::Scheduled);
        assert_eq!(ScheduleStatus::normalize(""), ScheduleStatus::Scheduled);
    }

    #[test]
    fn test_schedule_status_activity() {
        assert!(ScheduleStatus::Scheduled.is_active());
        assert!(ScheduleStatus::InProgress.is_active());
        assert!(!ScheduleStatus::Done.is_active());
    }
}
