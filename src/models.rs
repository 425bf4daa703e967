// src/models.rs
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub type Id = i64;

/// Weekday names as stored on schedules: lowercase English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }

    /// Case-insensitive parse; input is case-folded before matching.
    pub fn parse(value: &str) -> Option<Weekday> {
        let folded = value.to_ascii_lowercase();
        Weekday::ALL.into_iter().find(|d| d.as_str() == folded)
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(wd: chrono::Weekday) -> Self {
        match wd {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Employee,
    Manager,
}

/// A named, reusable set of weekly schedule entries.
///
/// `is_default` is informational only; nothing enforces a single default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Planning {
    pub id: Id,
    pub is_default: bool,
}

/// One weekday's expected time-in/time-out within a planning.
/// Within a planning, `day` values are unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Id,
    pub planning_id: Id,
    pub day: Weekday,
    pub time_in: NaiveTime,
    pub time_out: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Id,
    pub name: String,
    /// Minutes of lateness tolerated before the over-limit warning fires.
    pub lateness_limit: u32,
    /// IANA zone identifier, validated against the closed allow-list.
    pub timezone: String,
    pub default_planning_id: Option<Id>,
}

/// Membership/role binding of a user to a team. `planning_id`, when set,
/// overrides the team's default planning for this member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTeam {
    pub id: Id,
    pub user_id: Id,
    pub team_id: Id,
    pub role: TeamRole,
    pub planning_id: Option<Id>,
}

/// A punch record. Timestamps are zone-local wall time for the owning
/// team's zone; a null departure means the member is currently clocked in.
///
/// `work_day` is the anchor date the punch was attributed to. For a night
/// shift it can precede the arrival's calendar date, and it is what the
/// one-clock-in-per-work-day rule is keyed on: a post-midnight arrival
/// would otherwise fall outside its own work day's time range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockRecord {
    pub id: Id,
    pub user_team_id: Id,
    pub planning_id: Id,
    pub work_day: NaiveDate,
    pub arrival_time: NaiveDateTime,
    pub departure_time: Option<NaiveDateTime>,
}

// --- Request payloads ---

/// One schedule entry as submitted by a client, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInput {
    pub day: Option<String>,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
}

impl ScheduleInput {
    pub fn new(day: &str, time_in: &str, time_out: &str) -> Self {
        Self {
            day: Some(day.to_string()),
            time_in: Some(time_in.to_string()),
            time_out: Some(time_out.to_string()),
        }
    }
}

/// A validated schedule entry, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSpec {
    pub day: Weekday,
    pub time_in: NaiveTime,
    pub time_out: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanningRequest {
    pub schedules: Option<Vec<ScheduleInput>>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReplacePlanningRequest {
    pub schedules: Option<Vec<ScheduleInput>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub lateness_limit: u32,
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserTeamRequest {
    pub user_id: Id,
    pub team_id: Id,
    pub role: TeamRole,
}

#[derive(Debug, Deserialize, Default)]
pub struct PatchScheduleRequest {
    pub day: Option<String>,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
}

// --- Response payloads ---

/// Response envelope consumed by the frontend; field names are a stable
/// contract.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(rename = "isLate", skip_serializing_if = "Option::is_none")]
    pub is_late: Option<bool>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            warnings: None,
            is_late: None,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        if !warnings.is_empty() {
            self.warnings = Some(warnings);
        }
        self
    }

    pub fn with_is_late(mut self, is_late: bool) -> Self {
        self.is_late = Some(is_late);
        self
    }
}

/// A planning together with the schedules actually persisted for it.
#[derive(Debug, Clone, Serialize)]
pub struct PlanningWithSchedules {
    pub planning: Planning,
    pub schedules: Vec<Schedule>,
}

/// Audit payload for a team-default replacement.
#[derive(Debug, Serialize)]
pub struct TeamPlanningSwap {
    pub team_id: Id,
    pub previous_planning_id: Option<Id>,
    pub new_planning_id: Id,
    pub planning: PlanningWithSchedules,
}

/// Audit payload for a per-member planning replacement.
#[derive(Debug, Serialize)]
pub struct MemberPlanningSwap {
    pub user_team_id: Id,
    pub previous_planning_id: Option<Id>,
    pub new_planning_id: Id,
    #[serde(rename = "isVacationPlanning")]
    pub is_vacation_planning: bool,
    pub planning: PlanningWithSchedules,
}
