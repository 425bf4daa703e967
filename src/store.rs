// src/store.rs
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::models::{
    ClockRecord, Id, Planning, Schedule, ScheduleSpec, Team, TeamRole, UserTeam, Weekday,
};

/// Errors surfaced by the persistence collaborator. `NoRows` is the
/// sentinel that lets callers distinguish "not found" from a real failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no rows returned")]
    NoRows,
    #[error("{0}")]
    Backend(String),
}

/// Outcome of the guarded clock insert. The work-day check and the insert
/// happen under one store-side critical section, so two concurrent punches
/// for the same work day cannot both observe "no conflict".
#[derive(Debug, Clone)]
pub enum ClockInsert {
    Created(ClockRecord),
    Duplicate(Vec<ClockRecord>),
}

/// Persistence seam for the attendance core: per-entity insert/select/
/// update/delete with equality and range filtering, single-row fetch, and
/// ordering/limiting. No multi-statement transactions are assumed, which is
/// why the planning coordinator compensates by hand.
#[async_trait]
pub trait ClockStore: Send + Sync {
    // Plannings
    async fn insert_planning(&self, is_default: bool) -> Result<Planning, StoreError>;
    async fn get_planning(&self, id: Id) -> Result<Planning, StoreError>;
    /// Deletes the planning and, transitively, its schedules.
    async fn delete_planning(&self, id: Id) -> Result<(), StoreError>;

    // Schedules
    async fn insert_schedules(
        &self,
        planning_id: Id,
        specs: &[ScheduleSpec],
    ) -> Result<Vec<Schedule>, StoreError>;
    async fn schedules_for_planning(&self, planning_id: Id) -> Result<Vec<Schedule>, StoreError>;
    async fn get_schedule(&self, id: Id) -> Result<Schedule, StoreError>;
    async fn find_schedule(&self, planning_id: Id, day: Weekday) -> Result<Schedule, StoreError>;
    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError>;

    // Teams
    async fn insert_team(
        &self,
        name: &str,
        lateness_limit: u32,
        timezone: &str,
    ) -> Result<Team, StoreError>;
    async fn get_team(&self, id: Id) -> Result<Team, StoreError>;
    async fn set_team_default_planning(
        &self,
        team_id: Id,
        planning_id: Option<Id>,
    ) -> Result<Team, StoreError>;
    /// Limited lookup used by the deletion guard.
    async fn teams_referencing_planning(
        &self,
        planning_id: Id,
        limit: usize,
    ) -> Result<Vec<Team>, StoreError>;

    // User-team memberships
    async fn insert_user_team(
        &self,
        user_id: Id,
        team_id: Id,
        role: TeamRole,
    ) -> Result<UserTeam, StoreError>;
    async fn get_user_team(&self, id: Id) -> Result<UserTeam, StoreError>;
    async fn find_user_team(&self, user_id: Id, team_id: Id)
        -> Result<Option<UserTeam>, StoreError>;
    async fn set_user_team_planning(
        &self,
        user_team_id: Id,
        planning_id: Option<Id>,
    ) -> Result<UserTeam, StoreError>;

    // Clocks
    /// Most recent first by arrival time.
    async fn recent_clocks(
        &self,
        user_team_id: Id,
        limit: usize,
    ) -> Result<Vec<ClockRecord>, StoreError>;
    /// The most recent clock with a null departure, if any.
    async fn open_clock(&self, user_team_id: Id) -> Result<Option<ClockRecord>, StoreError>;
    /// Clocks attributed to `work_day` for this membership+planning. Keyed
    /// on the stored anchor, not the arrival time: a night shift's
    /// post-midnight arrival lies outside its own work day's time range.
    async fn clocks_for_work_day(
        &self,
        user_team_id: Id,
        planning_id: Id,
        work_day: NaiveDate,
    ) -> Result<Vec<ClockRecord>, StoreError>;
    /// Conditional insert: rejects with the conflicting rows if any clock
    /// for this membership+planning is already attributed to `work_day`.
    async fn create_clock(
        &self,
        user_team_id: Id,
        planning_id: Id,
        work_day: NaiveDate,
        arrival_time: NaiveDateTime,
    ) -> Result<ClockInsert, StoreError>;
    async fn close_clock(
        &self,
        clock_id: Id,
        departure_time: NaiveDateTime,
    ) -> Result<ClockRecord, StoreError>;
    /// Existence-only check used by the deletion guard.
    async fn planning_has_clocks(&self, planning_id: Id) -> Result<bool, StoreError>;

    /// Row counts for the status page: (plannings, schedules, teams,
    /// user_teams, clocks).
    async fn counts(&self) -> Result<(usize, usize, usize, usize, usize), StoreError>;
}

#[derive(Default)]
struct Tables {
    seq: Id,
    plannings: HashMap<Id, Planning>,
    schedules: HashMap<Id, Schedule>,
    teams: HashMap<Id, Team>,
    user_teams: HashMap<Id, UserTeam>,
    clocks: HashMap<Id, ClockRecord>,
}

impl Tables {
    fn next_id(&mut self) -> Id {
        self.seq += 1;
        self.seq
    }
}

/// In-memory implementation of the store. A single mutex guards all tables,
/// which is what makes the guarded clock insert atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClockStore for MemoryStore {
    async fn insert_planning(&self, is_default: bool) -> Result<Planning, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let id = tables.next_id();
        let planning = Planning { id, is_default };
        tables.plannings.insert(id, planning.clone());
        Ok(planning)
    }

    async fn get_planning(&self, id: Id) -> Result<Planning, StoreError> {
        let tables = self.inner.lock().unwrap();
        tables.plannings.get(&id).cloned().ok_or(StoreError::NoRows)
    }

    async fn delete_planning(&self, id: Id) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().unwrap();
        tables.plannings.remove(&id).ok_or(StoreError::NoRows)?;
        tables.schedules.retain(|_, s| s.planning_id != id);
        Ok(())
    }

    async fn insert_schedules(
        &self,
        planning_id: Id,
        specs: &[ScheduleSpec],
    ) -> Result<Vec<Schedule>, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        if !tables.plannings.contains_key(&planning_id) {
            return Err(StoreError::Backend(format!(
                "schedule insert references missing planning {}",
                planning_id
            )));
        }
        let mut inserted = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = tables.next_id();
            let schedule = Schedule {
                id,
                planning_id,
                day: spec.day,
                time_in: spec.time_in,
                time_out: spec.time_out,
            };
            tables.schedules.insert(id, schedule.clone());
            inserted.push(schedule);
        }
        Ok(inserted)
    }

    async fn schedules_for_planning(&self, planning_id: Id) -> Result<Vec<Schedule>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut rows: Vec<Schedule> = tables
            .schedules
            .values()
            .filter(|s| s.planning_id == planning_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.id);
        Ok(rows)
    }

    async fn get_schedule(&self, id: Id) -> Result<Schedule, StoreError> {
        let tables = self.inner.lock().unwrap();
        tables.schedules.get(&id).cloned().ok_or(StoreError::NoRows)
    }

    async fn find_schedule(&self, planning_id: Id, day: Weekday) -> Result<Schedule, StoreError> {
        let tables = self.inner.lock().unwrap();
        tables
            .schedules
            .values()
            .find(|s| s.planning_id == planning_id && s.day == day)
            .cloned()
            .ok_or(StoreError::NoRows)
    }

    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        if !tables.schedules.contains_key(&schedule.id) {
            return Err(StoreError::NoRows);
        }
        tables.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn insert_team(
        &self,
        name: &str,
        lateness_limit: u32,
        timezone: &str,
    ) -> Result<Team, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let id = tables.next_id();
        let team = Team {
            id,
            name: name.to_string(),
            lateness_limit,
            timezone: timezone.to_string(),
            default_planning_id: None,
        };
        tables.teams.insert(id, team.clone());
        Ok(team)
    }

    async fn get_team(&self, id: Id) -> Result<Team, StoreError> {
        let tables = self.inner.lock().unwrap();
        tables.teams.get(&id).cloned().ok_or(StoreError::NoRows)
    }

    async fn set_team_default_planning(
        &self,
        team_id: Id,
        planning_id: Option<Id>,
    ) -> Result<Team, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let team = tables.teams.get_mut(&team_id).ok_or(StoreError::NoRows)?;
        team.default_planning_id = planning_id;
        Ok(team.clone())
    }

    async fn teams_referencing_planning(
        &self,
        planning_id: Id,
        limit: usize,
    ) -> Result<Vec<Team>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut rows: Vec<Team> = tables
            .teams
            .values()
            .filter(|t| t.default_planning_id == Some(planning_id))
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.id);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn insert_user_team(
        &self,
        user_id: Id,
        team_id: Id,
        role: TeamRole,
    ) -> Result<UserTeam, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let id = tables.next_id();
        let user_team = UserTeam {
            id,
            user_id,
            team_id,
            role,
            planning_id: None,
        };
        tables.user_teams.insert(id, user_team.clone());
        Ok(user_team)
    }

    async fn get_user_team(&self, id: Id) -> Result<UserTeam, StoreError> {
        let tables = self.inner.lock().unwrap();
        tables.user_teams.get(&id).cloned().ok_or(StoreError::NoRows)
    }

    async fn find_user_team(
        &self,
        user_id: Id,
        team_id: Id,
    ) -> Result<Option<UserTeam>, StoreError> {
        let tables = self.inner.lock().unwrap();
        Ok(tables
            .user_teams
            .values()
            .find(|ut| ut.user_id == user_id && ut.team_id == team_id)
            .cloned())
    }

    async fn set_user_team_planning(
        &self,
        user_team_id: Id,
        planning_id: Option<Id>,
    ) -> Result<UserTeam, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let user_team = tables
            .user_teams
            .get_mut(&user_team_id)
            .ok_or(StoreError::NoRows)?;
        user_team.planning_id = planning_id;
        Ok(user_team.clone())
    }

    async fn recent_clocks(
        &self,
        user_team_id: Id,
        limit: usize,
    ) -> Result<Vec<ClockRecord>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut rows: Vec<ClockRecord> = tables
            .clocks
            .values()
            .filter(|c| c.user_team_id == user_team_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.arrival_time.cmp(&a.arrival_time).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn open_clock(&self, user_team_id: Id) -> Result<Option<ClockRecord>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut open: Vec<&ClockRecord> = tables
            .clocks
            .values()
            .filter(|c| c.user_team_id == user_team_id && c.departure_time.is_none())
            .collect();
        open.sort_by(|a, b| b.arrival_time.cmp(&a.arrival_time).then(b.id.cmp(&a.id)));
        Ok(open.first().map(|c| (*c).clone()))
    }

    async fn clocks_for_work_day(
        &self,
        user_team_id: Id,
        planning_id: Id,
        work_day: NaiveDate,
    ) -> Result<Vec<ClockRecord>, StoreError> {
        let tables = self.inner.lock().unwrap();
        let mut rows: Vec<ClockRecord> = tables
            .clocks
            .values()
            .filter(|c| {
                c.user_team_id == user_team_id
                    && c.planning_id == planning_id
                    && c.work_day == work_day
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    async fn create_clock(
        &self,
        user_team_id: Id,
        planning_id: Id,
        work_day: NaiveDate,
        arrival_time: NaiveDateTime,
    ) -> Result<ClockInsert, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let mut conflicts: Vec<ClockRecord> = tables
            .clocks
            .values()
            .filter(|c| {
                c.user_team_id == user_team_id
                    && c.planning_id == planning_id
                    && c.work_day == work_day
            })
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            conflicts.sort_by_key(|c| c.id);
            return Ok(ClockInsert::Duplicate(conflicts));
        }
        let id = tables.next_id();
        let clock = ClockRecord {
            id,
            user_team_id,
            planning_id,
            work_day,
            arrival_time,
            departure_time: None,
        };
        tables.clocks.insert(id, clock.clone());
        Ok(ClockInsert::Created(clock))
    }

    async fn close_clock(
        &self,
        clock_id: Id,
        departure_time: NaiveDateTime,
    ) -> Result<ClockRecord, StoreError> {
        let mut tables = self.inner.lock().unwrap();
        let clock = tables.clocks.get_mut(&clock_id).ok_or(StoreError::NoRows)?;
        clock.departure_time = Some(departure_time);
        Ok(clock.clone())
    }

    async fn planning_has_clocks(&self, planning_id: Id) -> Result<bool, StoreError> {
        let tables = self.inner.lock().unwrap();
        Ok(tables.clocks.values().any(|c| c.planning_id == planning_id))
    }

    async fn counts(&self) -> Result<(usize, usize, usize, usize, usize), StoreError> {
        let tables = self.inner.lock().unwrap();
        Ok((
            tables.plannings.len(),
            tables.schedules.len(),
            tables.teams.len(),
            tables.user_teams.len(),
            tables.clocks.len(),
        ))
    }
}
