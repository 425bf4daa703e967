// src/clock_engine.rs
//
// Punch state machine. There is no stored state field: the branch is
// derived per request from the most recent open clock, represented
// explicitly as `PunchState` so the two transitions stay unambiguous.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use tracing::info;

use crate::error::EngineError;
use crate::models::{ClockRecord, Id, Schedule};
use crate::resolver::{current_weekday, local_now, AttendanceCore};
use crate::store::ClockInsert;

/// How many recent clocks are scanned for never-closed punches.
const ANOMALY_SCAN_LIMIT: usize = 5;

/// Zone-local hour below which a night-shift punch is attributed to the
/// previous calendar day.
const NIGHT_SHIFT_MORNING_CUTOFF: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PunchDirection {
    In,
    Out,
}

/// Derived state of a membership's clock: either no punch is open, or the
/// most recent open punch is waiting to be closed.
#[derive(Debug, Clone)]
pub enum PunchState {
    ClockedOut,
    ClockedIn(ClockRecord),
}

#[derive(Debug, Serialize)]
pub struct PunchOutcome {
    pub direction: PunchDirection,
    pub clock: ClockRecord,
    #[serde(skip)]
    pub is_late: bool,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

fn minutes_since_midnight(t: NaiveTime) -> i64 {
    i64::from(t.hour()) * 60 + i64::from(t.minute())
}

/// A shift whose scheduled end hour precedes its start hour runs across
/// midnight.
pub(crate) fn is_night_shift(schedule: &Schedule) -> bool {
    schedule.time_out.hour() < schedule.time_in.hour()
}

/// Calendar date the current work day is anchored to. A night shift punched
/// before noon belongs to the day the shift started, so clocking in just
/// after midnight does not open a second work day.
pub(crate) fn work_day_anchor(schedule: &Schedule, now_local: NaiveDateTime) -> NaiveDate {
    if is_night_shift(schedule) && now_local.hour() < NIGHT_SHIFT_MORNING_CUTOFF {
        now_local
            .date()
            .pred_opt()
            .expect("date underflow computing work-day anchor")
    } else {
        now_local.date()
    }
}

impl AttendanceCore {
    /// Derives the punch state for a membership from the most recent open
    /// clock row.
    pub async fn punch_state(&self, user_team_id: Id) -> Result<PunchState, EngineError> {
        Ok(match self.store.open_clock(user_team_id).await? {
            Some(open) => PunchState::ClockedIn(open),
            None => PunchState::ClockedOut,
        })
    }

    /// Handles one punch request: resolves the effective planning and
    /// today's schedule in the team's zone, collects anomalies, then either
    /// closes the open punch (clock-out) or validates and opens a new one
    /// (clock-in).
    pub async fn punch(&self, user_team_id: Id) -> Result<PunchOutcome, EngineError> {
        let user_team = self.get_user_team(user_team_id).await?;
        let (team, resolved) = self.resolve_member_planning(&user_team).await?;
        let tz = self.team_zone(&team)?;
        let now_utc = self.time.now_utc();
        let now_local = local_now(tz, now_utc);
        let today = current_weekday(tz, now_utc);

        // Evaluated unconditionally at entry: a rest day blocks both
        // transitions.
        let schedule = self
            .resolve_schedule_for_day(resolved.planning_id, today)
            .await?;
        let anchor = work_day_anchor(&schedule, now_local);

        let mut warnings = self.scan_anomalies(user_team_id, anchor).await?;

        match self.punch_state(user_team_id).await? {
            PunchState::ClockedIn(open) => {
                let now_min = minutes_since_midnight(now_local.time());
                let out_min = minutes_since_midnight(schedule.time_out);
                if now_min < out_min {
                    warnings.push(format!("Leaving {} minutes early", out_min - now_min));
                } else if now_min > out_min {
                    warnings.push(format!("Working {} minutes overtime", now_min - out_min));
                }
                let closed = self.store.close_clock(open.id, now_local).await?;
                info!(
                    "Clock-out for user-team {}: clock {} closed at {}",
                    user_team_id, closed.id, now_local
                );
                Ok(PunchOutcome {
                    direction: PunchDirection::Out,
                    clock: closed,
                    is_late: false,
                    warnings,
                })
            }
            PunchState::ClockedOut => {
                let now_min = minutes_since_midnight(now_local.time());
                let in_min = minutes_since_midnight(schedule.time_in);
                let limit = i64::from(team.lateness_limit);
                let mut is_late = false;
                if now_min > in_min {
                    let diff = now_min - in_min;
                    is_late = true;
                    if diff > limit {
                        warnings.push(format!(
                            "Late by {} minutes, exceeding the team lateness limit of {} minutes",
                            diff, limit
                        ));
                    } else {
                        warnings.push(format!("Late by {} minutes", diff));
                    }
                } else if now_min < in_min {
                    warnings.push(format!("Early by {} minutes", in_min - now_min));
                }

                // The work-day check and insert run atomically in the
                // store, so concurrent punches cannot both slip past it.
                let inserted = self
                    .store
                    .create_clock(user_team_id, resolved.planning_id, anchor, now_local)
                    .await?;
                match inserted {
                    ClockInsert::Created(clock) => {
                        info!(
                            "Clock-in for user-team {}: clock {} opened at {} (work day {})",
                            user_team_id, clock.id, now_local, anchor
                        );
                        Ok(PunchOutcome {
                            direction: PunchDirection::In,
                            clock,
                            is_late,
                            warnings,
                        })
                    }
                    ClockInsert::Duplicate(conflicts) => Err(EngineError::DuplicateClockIn {
                        work_day: anchor,
                        conflicts,
                    }),
                }
            }
        }
    }

    /// Punches from an earlier work day that were never closed. Attached to
    /// every punch response regardless of the branch taken. Compared on the
    /// stored anchor so an in-progress night shift is not flagged against
    /// itself after midnight.
    async fn scan_anomalies(
        &self,
        user_team_id: Id,
        work_day: NaiveDate,
    ) -> Result<Vec<String>, EngineError> {
        let recent = self
            .store
            .recent_clocks(user_team_id, ANOMALY_SCAN_LIMIT)
            .await?;
        Ok(recent
            .iter()
            .filter(|c| c.departure_time.is_none() && c.work_day < work_day)
            .map(|c| {
                format!(
                    "Anomaly: clock-in from {} was never clocked out",
                    c.arrival_time.date()
                )
            })
            .collect())
    }

    /// Recent clock history for a membership, newest first.
    pub async fn list_clocks(
        &self,
        user_team_id: Id,
        limit: usize,
    ) -> Result<Vec<ClockRecord>, EngineError> {
        self.get_user_team(user_team_id).await?;
        Ok(self.store.recent_clocks(user_team_id, limit).await?)
    }
}
