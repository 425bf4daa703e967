// src/planning.rs
//
// Planning mutation coordinator. The store offers no multi-table
// transaction, so every multi-entity write here is a forward action paired
// with a compensating delete. Compensation failures are logged with their
// own message so orphaned rows stay discoverable.

use std::collections::HashSet;

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::models::{
    Id, MemberPlanningSwap, PatchScheduleRequest, PlanningWithSchedules, Schedule, ScheduleInput,
    ScheduleSpec, Team, TeamPlanningSwap, TeamRole, UserTeam, Weekday,
};
use crate::resolver::{validate_timezone, AttendanceCore};
use crate::store::StoreError;

/// 24-hour `HH:MM:SS`, hours 00-23, minutes/seconds 00-59.
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]:[0-5][0-9]$").unwrap());

/// Number of referencing teams reported back when a deletion is refused.
const REFERENCING_TEAMS_LIMIT: usize = 10;

fn parse_time_field(value: &str) -> Result<NaiveTime, EngineError> {
    if !TIME_RE.is_match(value) {
        return Err(EngineError::Validation(format!(
            "Invalid time format: {}; expected HH:MM:SS",
            value
        )));
    }
    NaiveTime::parse_from_str(value, "%H:%M:%S").map_err(|_| {
        EngineError::Validation(format!("Invalid time format: {}; expected HH:MM:SS", value))
    })
}

/// Shared schedule-list validation, parameterized by `allow_empty`.
///
/// Per-entry checks (day validity, presence of both times, time format) run
/// in a single pass; the duplicate-day pass runs over the whole list after
/// that. All checks short-circuit on the first violation so messages are
/// deterministic.
pub fn validate_schedule_set(
    input: Option<&[ScheduleInput]>,
    allow_empty: bool,
) -> Result<Vec<ScheduleSpec>, EngineError> {
    let entries = input.ok_or_else(|| {
        EngineError::Validation("Schedules array is required".to_string())
    })?;
    if entries.is_empty() && !allow_empty {
        return Err(EngineError::Validation(
            "Schedules array must not be empty".to_string(),
        ));
    }

    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let day_raw = entry
            .day
            .as_deref()
            .ok_or_else(|| EngineError::Validation("Each schedule entry requires a day".to_string()))?;
        let day = Weekday::parse(day_raw)
            .ok_or_else(|| EngineError::Validation(format!("Invalid day: {}", day_raw)))?;
        let (time_in_raw, time_out_raw) = match (entry.time_in.as_deref(), entry.time_out.as_deref())
        {
            (Some(time_in), Some(time_out)) => (time_in, time_out),
            _ => {
                return Err(EngineError::Validation(format!(
                    "Both time_in and time_out are required for {}",
                    day
                )))
            }
        };
        let time_in = parse_time_field(time_in_raw)?;
        let time_out = parse_time_field(time_out_raw)?;
        specs.push(ScheduleSpec {
            day,
            time_in,
            time_out,
        });
    }

    let mut seen = HashSet::new();
    for spec in &specs {
        if !seen.insert(spec.day) {
            return Err(EngineError::Conflict(
                "Duplicate days are not allowed".to_string(),
            ));
        }
    }

    Ok(specs)
}

impl AttendanceCore {
    /// Creates a planning plus its schedule rows as one logical unit. If
    /// the schedule insert fails, the planning created in the same call is
    /// deleted and the original error propagated: callers never observe a
    /// planning with a partially inserted schedule set.
    pub async fn create_planning_with_schedules(
        &self,
        specs: &[ScheduleSpec],
        is_default: bool,
    ) -> Result<PlanningWithSchedules, EngineError> {
        let planning = self.store.insert_planning(is_default).await?;
        let schedules = if specs.is_empty() {
            Vec::new()
        } else {
            match self.store.insert_schedules(planning.id, specs).await {
                Ok(schedules) => schedules,
                Err(e) => {
                    warn!(
                        "Schedule insert failed for planning {}; issuing compensating delete: {}",
                        planning.id, e
                    );
                    if let Err(comp_err) = self.store.delete_planning(planning.id).await {
                        error!(
                            "Compensation failed: planning {} left orphaned after schedule insert failure: {}",
                            planning.id, comp_err
                        );
                    }
                    return Err(e.into());
                }
            }
        };
        info!(
            "Created planning {} with {} schedule(s)",
            planning.id,
            schedules.len()
        );
        Ok(PlanningWithSchedules {
            planning,
            schedules,
        })
    }

    /// Plain planning creation. An empty schedule set is allowed here (an
    /// empty planning, e.g. for a future vacation assignment).
    pub async fn create_planning(
        &self,
        schedules: Option<&[ScheduleInput]>,
        is_default: bool,
    ) -> Result<PlanningWithSchedules, EngineError> {
        let specs = validate_schedule_set(schedules, true)?;
        self.create_planning_with_schedules(&specs, is_default).await
    }

    /// Replaces a team's default planning. The previous planning is left
    /// untouched; its id is reported back for audit.
    pub async fn replace_team_default(
        &self,
        team_id: Id,
        schedules: Option<&[ScheduleInput]>,
    ) -> Result<TeamPlanningSwap, EngineError> {
        let team = match self.store.get_team(team_id).await {
            Ok(team) => team,
            Err(StoreError::NoRows) => {
                return Err(EngineError::NotFound(format!("Team {} not found", team_id)))
            }
            Err(e) => return Err(e.into()),
        };
        // A team cannot have an empty default planning.
        let specs = validate_schedule_set(schedules, false)?;
        let created = self.create_planning_with_schedules(&specs, true).await?;

        if let Err(e) = self
            .store
            .set_team_default_planning(team_id, Some(created.planning.id))
            .await
        {
            warn!(
                "Default-planning pointer update failed for team {}; rolling back planning {}: {}",
                team_id, created.planning.id, e
            );
            self.roll_back_planning(created.planning.id).await;
            return Err(match e {
                StoreError::NoRows => {
                    EngineError::NotFound(format!("Team {} not found", team_id))
                }
                other => other.into(),
            });
        }

        info!(
            "Replaced default planning for team {}: {:?} -> {}",
            team_id, team.default_planning_id, created.planning.id
        );
        Ok(TeamPlanningSwap {
            team_id,
            previous_planning_id: team.default_planning_id,
            new_planning_id: created.planning.id,
            planning: created,
        })
    }

    /// Replaces a member's personal planning override. An empty schedule
    /// set is allowed and flags the planning as a vacation planning.
    pub async fn replace_member_planning(
        &self,
        user_team_id: Id,
        schedules: Option<&[ScheduleInput]>,
    ) -> Result<MemberPlanningSwap, EngineError> {
        let user_team = match self.store.get_user_team(user_team_id).await {
            Ok(user_team) => user_team,
            Err(StoreError::NoRows) => {
                return Err(EngineError::NotFound(format!(
                    "User-team association {} not found",
                    user_team_id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let specs = validate_schedule_set(schedules, true)?;
        let is_vacation_planning = specs.is_empty();
        let created = self.create_planning_with_schedules(&specs, false).await?;

        if let Err(e) = self
            .store
            .set_user_team_planning(user_team_id, Some(created.planning.id))
            .await
        {
            warn!(
                "Planning pointer update failed for user-team {}; rolling back planning {}: {}",
                user_team_id, created.planning.id, e
            );
            self.roll_back_planning(created.planning.id).await;
            return Err(match e {
                StoreError::NoRows => EngineError::NotFound(format!(
                    "User-team association {} not found",
                    user_team_id
                )),
                other => other.into(),
            });
        }

        info!(
            "Replaced planning override for user-team {}: {:?} -> {} (vacation: {})",
            user_team_id, user_team.planning_id, created.planning.id, is_vacation_planning
        );
        Ok(MemberPlanningSwap {
            user_team_id,
            previous_planning_id: user_team.planning_id,
            new_planning_id: created.planning.id,
            is_vacation_planning,
            planning: created,
        })
    }

    async fn roll_back_planning(&self, planning_id: Id) {
        if let Err(comp_err) = self.store.delete_planning(planning_id).await {
            error!(
                "Compensation failed: planning {} left unreferenced after pointer update failure: {}",
                planning_id, comp_err
            );
        }
    }

    /// Unsets a team's default planning pointer. The planning itself is
    /// left in place.
    pub async fn clear_team_default(&self, team_id: Id) -> Result<Team, EngineError> {
        match self.store.set_team_default_planning(team_id, None).await {
            Ok(team) => Ok(team),
            Err(StoreError::NoRows) => {
                Err(EngineError::NotFound(format!("Team {} not found", team_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a planning unless a team references it as its default (the
    /// referencing teams are reported) or any clock references it
    /// (existence-only check).
    pub async fn delete_planning(&self, planning_id: Id) -> Result<(), EngineError> {
        if let Err(e) = self.store.get_planning(planning_id).await {
            return Err(match e {
                StoreError::NoRows => {
                    EngineError::NotFound(format!("Planning {} not found", planning_id))
                }
                other => other.into(),
            });
        }
        let referencing = self
            .store
            .teams_referencing_planning(planning_id, REFERENCING_TEAMS_LIMIT)
            .await?;
        if !referencing.is_empty() {
            return Err(EngineError::PlanningReferencedByTeams { teams: referencing });
        }
        if self.store.planning_has_clocks(planning_id).await? {
            return Err(EngineError::Conflict(
                "Planning is referenced by existing clocks and cannot be deleted".to_string(),
            ));
        }
        self.store.delete_planning(planning_id).await?;
        info!("Deleted planning {}", planning_id);
        Ok(())
    }

    pub async fn get_planning_with_schedules(
        &self,
        planning_id: Id,
    ) -> Result<PlanningWithSchedules, EngineError> {
        let planning = match self.store.get_planning(planning_id).await {
            Ok(planning) => planning,
            Err(StoreError::NoRows) => {
                return Err(EngineError::NotFound(format!(
                    "Planning {} not found",
                    planning_id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let schedules = self.store.schedules_for_planning(planning_id).await?;
        Ok(PlanningWithSchedules {
            planning,
            schedules,
        })
    }

    /// Single-field patch on one schedule row. A day change that collides
    /// with another day in the same planning is refused.
    pub async fn patch_schedule(
        &self,
        schedule_id: Id,
        patch: &PatchScheduleRequest,
    ) -> Result<Schedule, EngineError> {
        let mut schedule = match self.store.get_schedule(schedule_id).await {
            Ok(schedule) => schedule,
            Err(StoreError::NoRows) => {
                return Err(EngineError::NotFound(format!(
                    "Schedule {} not found",
                    schedule_id
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(day_raw) = patch.day.as_deref() {
            let day = Weekday::parse(day_raw)
                .ok_or_else(|| EngineError::Validation(format!("Invalid day: {}", day_raw)))?;
            let siblings = self
                .store
                .schedules_for_planning(schedule.planning_id)
                .await?;
            if siblings.iter().any(|s| s.id != schedule.id && s.day == day) {
                return Err(EngineError::Conflict(
                    "Duplicate days are not allowed".to_string(),
                ));
            }
            schedule.day = day;
        }
        if let Some(time_in) = patch.time_in.as_deref() {
            schedule.time_in = parse_time_field(time_in)?;
        }
        if let Some(time_out) = patch.time_out.as_deref() {
            schedule.time_out = parse_time_field(time_out)?;
        }

        Ok(self.store.update_schedule(schedule).await?)
    }

    // --- Team and membership plumbing the core needs referents for ---

    pub async fn create_team(
        &self,
        name: &str,
        lateness_limit: u32,
        timezone: &str,
    ) -> Result<Team, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("Team name is required".to_string()));
        }
        validate_timezone(timezone)?;
        Ok(self.store.insert_team(name, lateness_limit, timezone).await?)
    }

    pub async fn get_team(&self, team_id: Id) -> Result<Team, EngineError> {
        match self.store.get_team(team_id).await {
            Ok(team) => Ok(team),
            Err(StoreError::NoRows) => {
                Err(EngineError::NotFound(format!("Team {} not found", team_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One row per (user, team) pair, enforced by existence check before
    /// creation.
    pub async fn create_user_team(
        &self,
        user_id: Id,
        team_id: Id,
        role: TeamRole,
    ) -> Result<UserTeam, EngineError> {
        self.get_team(team_id).await?;
        if self.store.find_user_team(user_id, team_id).await?.is_some() {
            return Err(EngineError::Conflict(format!(
                "User {} is already a member of team {}",
                user_id, team_id
            )));
        }
        Ok(self.store.insert_user_team(user_id, team_id, role).await?)
    }

    pub async fn get_user_team(&self, user_team_id: Id) -> Result<UserTeam, EngineError> {
        match self.store.get_user_team(user_team_id).await {
            Ok(user_team) => Ok(user_team),
            Err(StoreError::NoRows) => Err(EngineError::NotFound(format!(
                "User-team association {} not found",
                user_team_id
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
