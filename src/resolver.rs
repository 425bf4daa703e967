// src/resolver.rs
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::error::EngineError;
use crate::models::{Id, Team, UserTeam, Weekday};
use crate::store::{ClockStore, StoreError};

/// Closed allow-list of IANA zone identifiers a team may use.
pub const SUPPORTED_TIMEZONES: &[&str] = &[
    "UTC",
    "Europe/Paris",
    "Europe/London",
    "Europe/Berlin",
    "Europe/Stockholm",
    "America/New_York",
    "America/Chicago",
    "America/Los_Angeles",
    "America/Sao_Paulo",
    "Asia/Tokyo",
    "Asia/Shanghai",
    "Asia/Kolkata",
    "Australia/Sydney",
];

pub fn validate_timezone(name: &str) -> Result<Tz, EngineError> {
    if !SUPPORTED_TIMEZONES.contains(&name) {
        return Err(EngineError::Validation(format!(
            "Unsupported timezone: {}",
            name
        )));
    }
    Tz::from_str(name)
        .map_err(|_| EngineError::Validation(format!("Unsupported timezone: {}", name)))
}

/// "Now" rendered as wall-clock time in the given zone and reparsed as a
/// naive timestamp. Stored timestamps use this normalization, so they
/// reflect zone-local wall time rather than the UTC instant.
pub fn local_now(tz: Tz, now_utc: DateTime<Utc>) -> NaiveDateTime {
    now_utc.with_timezone(&tz).naive_local()
}

/// Weekday name (lowercase English) for "now" in the given zone.
pub fn current_weekday(tz: Tz, now_utc: DateTime<Utc>) -> Weekday {
    now_utc.with_timezone(&tz).weekday().into()
}

/// The planning that effectively applies to a member: their personal
/// override when set, otherwise the team default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPlanning {
    pub planning_id: Id,
    pub is_team_default: bool,
}

pub fn resolve_planning(user_team: &UserTeam, team: &Team) -> Option<ResolvedPlanning> {
    match user_team.planning_id {
        Some(planning_id) => Some(ResolvedPlanning {
            planning_id,
            is_team_default: false,
        }),
        None => team.default_planning_id.map(|planning_id| ResolvedPlanning {
            planning_id,
            is_team_default: true,
        }),
    }
}

/// Clock source for "now". Production uses the system clock; tests pin a
/// fixed instant and move it explicitly.
#[derive(Clone, Default)]
pub struct TimeSource {
    fixed: Option<Arc<Mutex<DateTime<Utc>>>>,
}

impl TimeSource {
    pub fn system() -> Self {
        Self { fixed: None }
    }

    /// Fixed source pinned to a UTC timestamp, `%Y-%m-%d %H:%M:%S`.
    pub fn fixed(datetime_str: &str) -> Self {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .expect("Failed to parse datetime string in TimeSource::fixed")
            .and_utc();
        Self {
            fixed: Some(Arc::new(Mutex::new(dt))),
        }
    }

    pub fn set(&self, datetime_str: &str) {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .expect("Failed to parse datetime string in TimeSource::set")
            .and_utc();
        if let Some(fixed) = &self.fixed {
            *fixed.lock().unwrap() = dt;
        }
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        match &self.fixed {
            Some(fixed) => *fixed.lock().unwrap(),
            None => Utc::now(),
        }
    }
}

/// The attendance core: schedule resolution, planning mutation, and the
/// punch state machine all hang off this handle. Stateless between
/// requests; all shared state lives behind the store.
#[derive(Clone)]
pub struct AttendanceCore {
    pub store: Arc<dyn ClockStore>,
    pub time: TimeSource,
}

impl AttendanceCore {
    pub fn new(store: Arc<dyn ClockStore>, time: TimeSource) -> Self {
        Self { store, time }
    }

    pub fn team_zone(&self, team: &Team) -> Result<Tz, EngineError> {
        validate_timezone(&team.timezone)
    }

    /// Loads the member's team and resolves the effective planning.
    /// "No planning assigned" is a 404-equivalent.
    pub async fn resolve_member_planning(
        &self,
        user_team: &UserTeam,
    ) -> Result<(Team, ResolvedPlanning), EngineError> {
        let team = match self.store.get_team(user_team.team_id).await {
            Ok(team) => team,
            Err(StoreError::NoRows) => {
                return Err(EngineError::NotFound(format!(
                    "Team {} not found",
                    user_team.team_id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let resolved = resolve_planning(user_team, &team).ok_or_else(|| {
            EngineError::NotFound("No planning assigned to this member or their team".to_string())
        })?;
        Ok((team, resolved))
    }

    /// Schedule entry for a planning on a given weekday. Absence is a valid
    /// state (a rest day) but the punch path must refuse to open a punch on
    /// it, so it is reported as a 404-equivalent with the punch message.
    pub async fn resolve_schedule_for_day(
        &self,
        planning_id: Id,
        day: Weekday,
    ) -> Result<crate::models::Schedule, EngineError> {
        match self.store.find_schedule(planning_id, day).await {
            Ok(schedule) => Ok(schedule),
            Err(StoreError::NoRows) => Err(EngineError::NotFound(format!(
                "No schedule found for {}; cannot clock in/out on days without scheduled work",
                day
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
