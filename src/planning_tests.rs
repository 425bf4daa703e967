// src/planning_tests.rs

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::error::EngineError;
    use crate::models::*;
    use crate::planning::validate_schedule_set;
    use crate::resolver::{AttendanceCore, TimeSource};
    use crate::store::{ClockInsert, ClockStore, MemoryStore, StoreError};

    fn entry(day: &str, time_in: &str, time_out: &str) -> ScheduleInput {
        ScheduleInput::new(day, time_in, time_out)
    }

    fn core_with(store: Arc<dyn ClockStore>) -> AttendanceCore {
        AttendanceCore::new(store, TimeSource::fixed("2025-06-02 08:00:00"))
    }

    /// Store double that delegates to a `MemoryStore` but fails designated
    /// operations, for exercising the coordinator's compensation paths.
    struct FailingStore {
        inner: MemoryStore,
        fail_insert_schedules: bool,
        fail_set_team_default: bool,
        fail_set_user_team_planning: bool,
    }

    impl FailingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_insert_schedules: false,
                fail_set_team_default: false,
                fail_set_user_team_planning: false,
            }
        }

        fn injected() -> StoreError {
            StoreError::Backend("injected failure".to_string())
        }
    }

    #[async_trait]
    impl ClockStore for FailingStore {
        async fn insert_planning(&self, is_default: bool) -> Result<Planning, StoreError> {
            self.inner.insert_planning(is_default).await
        }
        async fn get_planning(&self, id: Id) -> Result<Planning, StoreError> {
            self.inner.get_planning(id).await
        }
        async fn delete_planning(&self, id: Id) -> Result<(), StoreError> {
            self.inner.delete_planning(id).await
        }
        async fn insert_schedules(
            &self,
            planning_id: Id,
            specs: &[ScheduleSpec],
        ) -> Result<Vec<Schedule>, StoreError> {
            if self.fail_insert_schedules {
                return Err(Self::injected());
            }
            self.inner.insert_schedules(planning_id, specs).await
        }
        async fn schedules_for_planning(
            &self,
            planning_id: Id,
        ) -> Result<Vec<Schedule>, StoreError> {
            self.inner.schedules_for_planning(planning_id).await
        }
        async fn get_schedule(&self, id: Id) -> Result<Schedule, StoreError> {
            self.inner.get_schedule(id).await
        }
        async fn find_schedule(
            &self,
            planning_id: Id,
            day: Weekday,
        ) -> Result<Schedule, StoreError> {
            self.inner.find_schedule(planning_id, day).await
        }
        async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
            self.inner.update_schedule(schedule).await
        }
        async fn insert_team(
            &self,
            name: &str,
            lateness_limit: u32,
            timezone: &str,
        ) -> Result<Team, StoreError> {
            self.inner.insert_team(name, lateness_limit, timezone).await
        }
        async fn get_team(&self, id: Id) -> Result<Team, StoreError> {
            self.inner.get_team(id).await
        }
        async fn set_team_default_planning(
            &self,
            team_id: Id,
            planning_id: Option<Id>,
        ) -> Result<Team, StoreError> {
            if self.fail_set_team_default {
                return Err(Self::injected());
            }
            self.inner
                .set_team_default_planning(team_id, planning_id)
                .await
        }
        async fn teams_referencing_planning(
            &self,
            planning_id: Id,
            limit: usize,
        ) -> Result<Vec<Team>, StoreError> {
            self.inner.teams_referencing_planning(planning_id, limit).await
        }
        async fn insert_user_team(
            &self,
            user_id: Id,
            team_id: Id,
            role: TeamRole,
        ) -> Result<UserTeam, StoreError> {
            self.inner.insert_user_team(user_id, team_id, role).await
        }
        async fn get_user_team(&self, id: Id) -> Result<UserTeam, StoreError> {
            self.inner.get_user_team(id).await
        }
        async fn find_user_team(
            &self,
            user_id: Id,
            team_id: Id,
        ) -> Result<Option<UserTeam>, StoreError> {
            self.inner.find_user_team(user_id, team_id).await
        }
        async fn set_user_team_planning(
            &self,
            user_team_id: Id,
            planning_id: Option<Id>,
        ) -> Result<UserTeam, StoreError> {
            if self.fail_set_user_team_planning {
                return Err(Self::injected());
            }
            self.inner
                .set_user_team_planning(user_team_id, planning_id)
                .await
        }
        async fn recent_clocks(
            &self,
            user_team_id: Id,
            limit: usize,
        ) -> Result<Vec<ClockRecord>, StoreError> {
            self.inner.recent_clocks(user_team_id, limit).await
        }
        async fn open_clock(&self, user_team_id: Id) -> Result<Option<ClockRecord>, StoreError> {
            self.inner.open_clock(user_team_id).await
        }
        async fn clocks_for_work_day(
            &self,
            user_team_id: Id,
            planning_id: Id,
            work_day: NaiveDate,
        ) -> Result<Vec<ClockRecord>, StoreError> {
            self.inner
                .clocks_for_work_day(user_team_id, planning_id, work_day)
                .await
        }
        async fn create_clock(
            &self,
            user_team_id: Id,
            planning_id: Id,
            work_day: NaiveDate,
            arrival_time: NaiveDateTime,
        ) -> Result<ClockInsert, StoreError> {
            self.inner
                .create_clock(user_team_id, planning_id, work_day, arrival_time)
                .await
        }
        async fn close_clock(
            &self,
            clock_id: Id,
            departure_time: NaiveDateTime,
        ) -> Result<ClockRecord, StoreError> {
            self.inner.close_clock(clock_id, departure_time).await
        }
        async fn planning_has_clocks(&self, planning_id: Id) -> Result<bool, StoreError> {
            self.inner.planning_has_clocks(planning_id).await
        }
        async fn counts(&self) -> Result<(usize, usize, usize, usize, usize), StoreError> {
            self.inner.counts().await
        }
    }

    // --- Schedule-list validation ---

    #[test]
    fn missing_schedule_list_is_rejected() {
        let err = validate_schedule_set(None, true).unwrap_err();
        assert_eq!(err.to_string(), "Schedules array is required");
    }

    #[test]
    fn empty_list_is_rejected_unless_allowed() {
        let err = validate_schedule_set(Some(&[]), false).unwrap_err();
        assert_eq!(err.to_string(), "Schedules array must not be empty");
        assert!(validate_schedule_set(Some(&[]), true).unwrap().is_empty());
    }

    #[test]
    fn invalid_day_names_the_offending_value() {
        let input = [entry("funday", "09:00:00", "17:00:00")];
        let err = validate_schedule_set(Some(&input), false).unwrap_err();
        assert_eq!(err.to_string(), "Invalid day: funday");
    }

    #[test]
    fn day_names_are_case_folded_on_input() {
        let input = [entry("MONDAY", "09:00:00", "17:00:00")];
        let specs = validate_schedule_set(Some(&input), false).unwrap();
        assert_eq!(specs[0].day, Weekday::Monday);
    }

    #[test]
    fn both_times_are_required() {
        let input = [ScheduleInput {
            day: Some("monday".to_string()),
            time_in: Some("09:00:00".to_string()),
            time_out: None,
        }];
        let err = validate_schedule_set(Some(&input), false).unwrap_err();
        assert!(err
            .to_string()
            .contains("Both time_in and time_out are required for monday"));
    }

    #[test]
    fn malformed_times_are_rejected() {
        for bad in ["25:00:00", "09:60:00", "09:00:61", "9:00:00", "09:00", "noon"] {
            let input = [entry("monday", bad, "17:00:00")];
            let err = validate_schedule_set(Some(&input), false).unwrap_err();
            assert!(
                err.to_string().contains("Invalid time format"),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn boundary_times_are_accepted() {
        let input = [entry("monday", "00:00:00", "23:59:59")];
        assert!(validate_schedule_set(Some(&input), false).is_ok());
    }

    #[test]
    fn equal_time_in_and_time_out_is_permitted() {
        let input = [entry("monday", "09:00:00", "09:00:00")];
        assert!(validate_schedule_set(Some(&input), false).is_ok());
    }

    #[test]
    fn duplicate_days_are_rejected_regardless_of_order() {
        let front = [
            entry("monday", "09:00:00", "17:00:00"),
            entry("Monday", "10:00:00", "18:00:00"),
            entry("friday", "09:00:00", "17:00:00"),
        ];
        let back = [
            entry("friday", "09:00:00", "17:00:00"),
            entry("monday", "09:00:00", "17:00:00"),
            entry("MONDAY", "10:00:00", "18:00:00"),
        ];
        for input in [&front, &back] {
            let err = validate_schedule_set(Some(input.as_slice()), false).unwrap_err();
            assert_eq!(err.to_string(), "Duplicate days are not allowed");
            assert!(matches!(err, EngineError::Conflict(_)));
        }
    }

    #[test]
    fn per_entry_checks_run_before_the_duplicate_pass() {
        // The second entry duplicates the first, but its malformed time is
        // reported first: entries are validated in a single pass before the
        // duplicate-day pass runs over the whole list.
        let input = [
            entry("monday", "09:00:00", "17:00:00"),
            entry("monday", "99:00:00", "17:00:00"),
        ];
        let err = validate_schedule_set(Some(&input), false).unwrap_err();
        assert!(err.to_string().contains("Invalid time format"));
    }

    // --- Coordinator atomicity ---

    #[tokio::test]
    async fn validation_failure_leaves_zero_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let input = [entry("monday", "09:00:00", "17:00:00"), entry("monday", "09:00:00", "17:00:00")];
        assert!(core.create_planning(Some(&input), false).await.is_err());
        let (plannings, schedules, ..) = store.counts().await.unwrap();
        assert_eq!(plannings, 0);
        assert_eq!(schedules, 0);
    }

    #[tokio::test]
    async fn schedule_insert_failure_deletes_the_planning() {
        let store = Arc::new(FailingStore {
            fail_insert_schedules: true,
            ..FailingStore::new()
        });
        let core = core_with(store.clone());
        let input = [entry("monday", "09:00:00", "17:00:00")];
        let err = core.create_planning(Some(&input), false).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        let (plannings, schedules, ..) = store.counts().await.unwrap();
        assert_eq!(plannings, 0, "no orphan planning on schedule-insert failure");
        assert_eq!(schedules, 0);
    }

    #[tokio::test]
    async fn empty_planning_is_a_valid_creation() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let created = core.create_planning(Some(&[]), false).await.unwrap();
        assert!(created.schedules.is_empty());
        assert!(!created.planning.is_default);
        let fetched = core
            .get_planning_with_schedules(created.planning.id)
            .await
            .unwrap();
        assert!(fetched.schedules.is_empty());
    }

    // --- Team default replacement ---

    #[tokio::test]
    async fn replacing_team_default_reports_previous_and_new_ids() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let team = core.create_team("Ops", 10, "UTC").await.unwrap();

        let first = core
            .replace_team_default(team.id, Some(&[entry("monday", "09:00:00", "17:00:00")]))
            .await
            .unwrap();
        assert_eq!(first.previous_planning_id, None);
        assert!(first.planning.planning.is_default);

        let second = core
            .replace_team_default(team.id, Some(&[entry("tuesday", "08:00:00", "16:00:00")]))
            .await
            .unwrap();
        assert_eq!(second.previous_planning_id, Some(first.new_planning_id));
        assert_ne!(second.new_planning_id, first.new_planning_id);

        let refreshed = core.get_team(team.id).await.unwrap();
        assert_eq!(refreshed.default_planning_id, Some(second.new_planning_id));
        // The previous default planning is left untouched.
        assert!(core
            .get_planning_with_schedules(first.new_planning_id)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn team_default_requires_a_non_empty_schedule_set() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let team = core.create_team("Ops", 10, "UTC").await.unwrap();
        let err = core.replace_team_default(team.id, Some(&[])).await.unwrap_err();
        assert_eq!(err.to_string(), "Schedules array must not be empty");
    }

    #[tokio::test]
    async fn replacing_default_of_missing_team_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let err = core
            .replace_team_default(99, Some(&[entry("monday", "09:00:00", "17:00:00")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn pointer_update_failure_rolls_back_the_new_planning() {
        let store = Arc::new(FailingStore {
            fail_set_team_default: true,
            ..FailingStore::new()
        });
        let core = core_with(store.clone());
        let team = store.insert_team("Ops", 10, "UTC").await.unwrap();

        let err = core
            .replace_team_default(team.id, Some(&[entry("monday", "09:00:00", "17:00:00")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        let (plannings, schedules, ..) = store.counts().await.unwrap();
        assert_eq!(plannings, 0, "new planning rolled back on pointer failure");
        assert_eq!(schedules, 0);
        let refreshed = store.get_team(team.id).await.unwrap();
        assert_eq!(refreshed.default_planning_id, None);
    }

    // --- Member override replacement ---

    #[tokio::test]
    async fn empty_member_planning_is_flagged_as_vacation() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let team = core.create_team("Ops", 10, "UTC").await.unwrap();
        let user_team = core
            .create_user_team(1, team.id, TeamRole::Employee)
            .await
            .unwrap();

        let swap = core
            .replace_member_planning(user_team.id, Some(&[]))
            .await
            .unwrap();
        assert!(swap.is_vacation_planning);
        assert_eq!(swap.previous_planning_id, None);
        let refreshed = core.get_user_team(user_team.id).await.unwrap();
        assert_eq!(refreshed.planning_id, Some(swap.new_planning_id));

        let swap2 = core
            .replace_member_planning(user_team.id, Some(&[entry("monday", "09:00:00", "17:00:00")]))
            .await
            .unwrap();
        assert!(!swap2.is_vacation_planning);
        assert_eq!(swap2.previous_planning_id, Some(swap.new_planning_id));
    }

    #[tokio::test]
    async fn member_pointer_failure_rolls_back_the_new_planning() {
        let store = Arc::new(FailingStore {
            fail_set_user_team_planning: true,
            ..FailingStore::new()
        });
        let core = core_with(store.clone());
        let team = store.insert_team("Ops", 10, "UTC").await.unwrap();
        let user_team = store
            .insert_user_team(1, team.id, TeamRole::Employee)
            .await
            .unwrap();

        let err = core
            .replace_member_planning(user_team.id, Some(&[entry("monday", "09:00:00", "17:00:00")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        let (plannings, ..) = store.counts().await.unwrap();
        assert_eq!(plannings, 0);
    }

    #[tokio::test]
    async fn replacing_planning_of_missing_member_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let err = core
            .replace_member_planning(404, Some(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    // --- Deletion guard ---

    #[tokio::test]
    async fn planning_referenced_by_a_team_cannot_be_deleted() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let team = core.create_team("Ops", 10, "UTC").await.unwrap();
        let swap = core
            .replace_team_default(team.id, Some(&[entry("monday", "09:00:00", "17:00:00")]))
            .await
            .unwrap();

        let err = core.delete_planning(swap.new_planning_id).await.unwrap_err();
        match err {
            EngineError::PlanningReferencedByTeams { teams } => {
                assert_eq!(teams.len(), 1);
                assert_eq!(teams[0].id, team.id);
            }
            other => panic!("expected referencing-teams conflict, got {:?}", other),
        }

        // After unsetting the reference, deletion succeeds.
        core.clear_team_default(team.id).await.unwrap();
        core.delete_planning(swap.new_planning_id).await.unwrap();
        assert!(matches!(
            core.get_planning_with_schedules(swap.new_planning_id)
                .await
                .unwrap_err(),
            EngineError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn planning_referenced_by_clocks_cannot_be_deleted() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let created = core
            .create_planning(Some(&[entry("monday", "09:00:00", "17:00:00")]), false)
            .await
            .unwrap();
        let work_day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let arrival = work_day.and_hms_opt(9, 0, 0).unwrap();
        store
            .create_clock(1, created.planning.id, work_day, arrival)
            .await
            .unwrap();

        let err = core.delete_planning(created.planning.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert!(err.to_string().contains("referenced by existing clocks"));
    }

    #[tokio::test]
    async fn deleting_a_missing_planning_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        assert!(matches!(
            core.delete_planning(123).await.unwrap_err(),
            EngineError::NotFound(_)
        ));
    }

    // --- Schedule patch ---

    #[tokio::test]
    async fn schedule_patch_rejects_duplicate_day_within_the_planning() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let created = core
            .create_planning(
                Some(&[
                    entry("monday", "09:00:00", "17:00:00"),
                    entry("tuesday", "09:00:00", "17:00:00"),
                ]),
                false,
            )
            .await
            .unwrap();
        let tuesday = created.schedules[1].clone();

        let patch = PatchScheduleRequest {
            day: Some("Monday".to_string()),
            ..Default::default()
        };
        let err = core.patch_schedule(tuesday.id, &patch).await.unwrap_err();
        assert_eq!(err.to_string(), "Duplicate days are not allowed");

        // Moving to a free day and adjusting one time field works.
        let patch = PatchScheduleRequest {
            day: Some("wednesday".to_string()),
            time_out: Some("18:30:00".to_string()),
            ..Default::default()
        };
        let updated = core.patch_schedule(tuesday.id, &patch).await.unwrap();
        assert_eq!(updated.day, Weekday::Wednesday);
        assert_eq!(updated.time_out.to_string(), "18:30:00");
        assert_eq!(updated.time_in, tuesday.time_in);
    }

    #[tokio::test]
    async fn schedule_patch_validates_inputs() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let created = core
            .create_planning(Some(&[entry("monday", "09:00:00", "17:00:00")]), false)
            .await
            .unwrap();
        let schedule = created.schedules[0].clone();

        let bad_day = PatchScheduleRequest {
            day: Some("caturday".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            core.patch_schedule(schedule.id, &bad_day).await.unwrap_err(),
            EngineError::Validation(_)
        ));

        let bad_time = PatchScheduleRequest {
            time_in: Some("24:00:00".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            core.patch_schedule(schedule.id, &bad_time).await.unwrap_err(),
            EngineError::Validation(_)
        ));

        assert!(matches!(
            core.patch_schedule(999, &PatchScheduleRequest::default())
                .await
                .unwrap_err(),
            EngineError::NotFound(_)
        ));
    }

    // --- Team and membership plumbing ---

    #[tokio::test]
    async fn team_creation_validates_the_timezone() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        assert!(matches!(
            core.create_team("Ops", 10, "Middle/Earth").await.unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            core.create_team("  ", 10, "UTC").await.unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(core.create_team("Ops", 10, "Europe/Paris").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_membership_is_a_conflict() {
        let store = Arc::new(MemoryStore::new());
        let core = core_with(store.clone());
        let team = core.create_team("Ops", 10, "UTC").await.unwrap();
        core.create_user_team(1, team.id, TeamRole::Employee)
            .await
            .unwrap();
        let err = core
            .create_user_team(1, team.id, TeamRole::Manager)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        // A different user on the same team is fine.
        assert!(core.create_user_team(2, team.id, TeamRole::Manager).await.is_ok());
    }
}
