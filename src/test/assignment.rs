#[cfg(test)]
mod tests {
    use crate::assignment::{
        accept_assignment, apply_plan, cancel_assignment, create_assignment, list_assignments,
        mark_completed, reject_assignment, sweep_overdue, withdraw_assignment,
    };
    use crate::db::{get_assignment, list_workouts_for_assignment};
    use crate::error::AppError;
    use crate::models::AssignmentStatus;
    use crate::test::test_db::{TestDb, create_standard_test_db};
    use chrono::{NaiveDate, Weekday};
    use rocket::tokio;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn create_default_assignment(test_db: &TestDb) -> i64 {
        let coach = test_db.user("coach_user").await.unwrap();
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();

        create_assignment(
            &test_db.pool,
            &coach,
            client_id,
            template_id,
            &[Weekday::Mon, Weekday::Wed],
            2,
            date(2025, 6, 2),
            date(2025, 8, 1),
            Some("Focus on form"),
        )
        .await
        .expect("Failed to create assignment")
        .id
    }

    #[tokio::test]
    async fn create_starts_in_assigned_state() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;

        let assignment = get_assignment(&test_db.pool, id).await.unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Assigned);
        assert_eq!(
            assignment.selected_weekdays,
            vec![Weekday::Mon, Weekday::Wed]
        );
        assert_eq!(assignment.notes.as_deref(), Some("Focus on form"));
        assert!(assignment.start_date.is_none());

        let workouts = list_workouts_for_assignment(&test_db.pool, id).await.unwrap();
        assert!(workouts.is_empty(), "No schedule before acceptance");
    }

    #[tokio::test]
    async fn create_rejects_due_date_before_start() {
        let test_db = create_standard_test_db().await;
        let coach = test_db.user("coach_user").await.unwrap();
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();

        let result = create_assignment(
            &test_db.pool,
            &coach,
            client_id,
            template_id,
            &[Weekday::Mon],
            2,
            date(2025, 6, 2),
            date(2025, 6, 2),
            None,
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn create_rejects_unlinked_coach() {
        let test_db = crate::test::test_db::TestDbBuilder::new()
            .coach("coach_user", None)
            .coach("other_coach", None)
            .client("client_user", None)
            .link("coach_user", "client_user")
            .template("Base Program", Some("coach_user"))
            .daily_plan("Base Program", 1, "Push day")
            .exercise("Base Program", 1, "Bench press", 3, 10)
            .build()
            .await
            .expect("Failed to build test database");

        let other_coach = test_db.user("other_coach").await.unwrap();
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();

        let result = create_assignment(
            &test_db.pool,
            &other_coach,
            client_id,
            template_id,
            &[Weekday::Mon],
            2,
            date(2025, 6, 2),
            date(2025, 8, 1),
            None,
        )
        .await;

        assert!(matches!(result, Err(AppError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn create_requires_coach_role() {
        let test_db = create_standard_test_db().await;
        let client = test_db.user("client_user").await.unwrap();
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();

        let result = create_assignment(
            &test_db.pool,
            &client,
            client_id,
            template_id,
            &[Weekday::Mon],
            2,
            date(2025, 6, 2),
            date(2025, 8, 1),
            None,
        )
        .await;

        assert!(matches!(result, Err(AppError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn accept_generates_schedule_and_applies() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let client = test_db.user("client_user").await.unwrap();

        let (assignment, workouts) = accept_assignment(
            &test_db.pool,
            &client,
            id,
            date(2025, 6, 2),
            &[Weekday::Mon, Weekday::Wed],
            2,
        )
        .await
        .expect("Failed to accept assignment");

        assert_eq!(assignment.status, AssignmentStatus::Applied);
        assert_eq!(assignment.start_date, Some(date(2025, 6, 2)));
        // Monday start, two full weeks of Monday and Wednesday.
        assert_eq!(workouts.len(), 4);
        assert!(workouts.iter().all(|w| w.assignment_id == Some(id)));
        assert!(workouts.iter().all(|w| !w.is_completed));
        for pair in workouts.windows(2) {
            assert!(pair[0].scheduled_date < pair[1].scheduled_date);
        }
    }

    #[tokio::test]
    async fn accept_is_idempotent() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let client = test_db.user("client_user").await.unwrap();

        let (_, first) = accept_assignment(
            &test_db.pool,
            &client,
            id,
            date(2025, 6, 2),
            &[Weekday::Mon, Weekday::Wed],
            2,
        )
        .await
        .unwrap();

        let (assignment, second) = accept_assignment(
            &test_db.pool,
            &client,
            id,
            date(2025, 6, 2),
            &[Weekday::Mon, Weekday::Wed],
            2,
        )
        .await
        .expect("Repeated accept should be a no-op");

        assert_eq!(assignment.status, AssignmentStatus::Applied);
        let first_ids: Vec<i64> = first.iter().map(|w| w.id).collect();
        let second_ids: Vec<i64> = second.iter().map(|w| w.id).collect();
        assert_eq!(first_ids, second_ids, "Same rows, not a duplicate set");

        let persisted = list_workouts_for_assignment(&test_db.pool, id).await.unwrap();
        assert_eq!(persisted.len(), first.len());
    }

    #[tokio::test]
    async fn accept_requires_the_assigned_client() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let coach = test_db.user("coach_user").await.unwrap();

        let result = accept_assignment(
            &test_db.pool,
            &coach,
            id,
            date(2025, 6, 2),
            &[Weekday::Mon],
            2,
        )
        .await;

        assert!(matches!(result, Err(AppError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn accept_rejects_schedule_past_due_date() {
        let test_db = create_standard_test_db().await;
        let coach = test_db.user("coach_user").await.unwrap();
        let client = test_db.user("client_user").await.unwrap();
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();

        let assignment = create_assignment(
            &test_db.pool,
            &coach,
            client_id,
            template_id,
            &[Weekday::Mon],
            1,
            date(2025, 6, 2),
            date(2025, 6, 10),
            None,
        )
        .await
        .unwrap();

        // Client stretches the plan to four weeks; the last session would
        // land past the due date.
        let result = accept_assignment(
            &test_db.pool,
            &client,
            assignment.id,
            date(2025, 6, 2),
            &[Weekday::Mon],
            4,
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));

        let current = get_assignment(&test_db.pool, assignment.id).await.unwrap();
        assert_eq!(current.status, AssignmentStatus::Assigned);
    }

    #[tokio::test]
    async fn reject_is_terminal_and_generates_nothing() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let client = test_db.user("client_user").await.unwrap();

        let assignment = reject_assignment(&test_db.pool, &client, id).await.unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Rejected);

        let workouts = list_workouts_for_assignment(&test_db.pool, id).await.unwrap();
        assert!(workouts.is_empty());

        // Accepting a rejected assignment is a stale-view error and leaves
        // the row untouched.
        let result = accept_assignment(
            &test_db.pool,
            &client,
            id,
            date(2025, 6, 2),
            &[Weekday::Mon],
            2,
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))));

        let current = get_assignment(&test_db.pool, id).await.unwrap();
        assert_eq!(current.status, AssignmentStatus::Rejected);
        assert_eq!(current.updated_at, assignment.updated_at);
    }

    #[tokio::test]
    async fn reject_after_accept_is_an_invalid_transition() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let client = test_db.user("client_user").await.unwrap();

        accept_assignment(
            &test_db.pool,
            &client,
            id,
            date(2025, 6, 2),
            &[Weekday::Mon],
            2,
        )
        .await
        .unwrap();

        let before = get_assignment(&test_db.pool, id).await.unwrap();
        let result = reject_assignment(&test_db.pool, &client, id).await;
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))));

        let after = get_assignment(&test_db.pool, id).await.unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn withdraw_deletes_a_pending_offer() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let coach = test_db.user("coach_user").await.unwrap();

        let withdrawn = withdraw_assignment(&test_db.pool, &coach, id).await.unwrap();
        assert_eq!(withdrawn.id, id);

        let result = get_assignment(&test_db.pool, id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn withdraw_after_accept_is_rejected() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let coach = test_db.user("coach_user").await.unwrap();
        let client = test_db.user("client_user").await.unwrap();

        accept_assignment(
            &test_db.pool,
            &client,
            id,
            date(2025, 6, 2),
            &[Weekday::Mon],
            2,
        )
        .await
        .unwrap();

        let result = withdraw_assignment(&test_db.pool, &coach, id).await;
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))));

        let current = get_assignment(&test_db.pool, id).await.unwrap();
        assert_eq!(current.status, AssignmentStatus::Applied);
    }

    #[tokio::test]
    async fn applied_exits_are_idempotent() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let coach = test_db.user("coach_user").await.unwrap();
        let client = test_db.user("client_user").await.unwrap();

        accept_assignment(
            &test_db.pool,
            &client,
            id,
            date(2025, 6, 2),
            &[Weekday::Mon],
            2,
        )
        .await
        .unwrap();

        let completed = mark_completed(&test_db.pool, &coach, id).await.unwrap();
        assert_eq!(completed.status, AssignmentStatus::Completed);

        let again = mark_completed(&test_db.pool, &coach, id).await.unwrap();
        assert_eq!(again.status, AssignmentStatus::Completed);

        // A different exit from a terminal state is still rejected.
        let result = cancel_assignment(&test_db.pool, &coach, id).await;
        assert!(matches!(result, Err(AppError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn sweep_marks_only_applied_past_due() {
        let test_db = create_standard_test_db().await;
        let coach = test_db.user("coach_user").await.unwrap();
        let client = test_db.user("client_user").await.unwrap();
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();

        let due_soon = create_assignment(
            &test_db.pool,
            &coach,
            client_id,
            template_id,
            &[Weekday::Mon],
            2,
            date(2025, 6, 2),
            date(2025, 6, 20),
            None,
        )
        .await
        .unwrap();
        accept_assignment(
            &test_db.pool,
            &client,
            due_soon.id,
            date(2025, 6, 2),
            &[Weekday::Mon],
            2,
        )
        .await
        .unwrap();

        // Still pending acceptance: the sweep must not touch it.
        let pending = create_assignment(
            &test_db.pool,
            &coach,
            client_id,
            template_id,
            &[Weekday::Wed],
            1,
            date(2025, 6, 2),
            date(2025, 6, 20),
            None,
        )
        .await
        .unwrap();

        let swept = sweep_overdue(&test_db.pool, &coach, date(2025, 7, 1))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let overdue = get_assignment(&test_db.pool, due_soon.id).await.unwrap();
        assert_eq!(overdue.status, AssignmentStatus::Overdue);

        let untouched = get_assignment(&test_db.pool, pending.id).await.unwrap();
        assert_eq!(untouched.status, AssignmentStatus::Assigned);

        // Sweeping again finds nothing new.
        let swept = sweep_overdue(&test_db.pool, &coach, date(2025, 7, 1))
            .await
            .unwrap();
        assert_eq!(swept, 0);
    }

    #[tokio::test]
    async fn self_applied_plans_schedule_immediately() {
        let test_db = create_standard_test_db().await;
        let client = test_db.user("client_user").await.unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();

        let workouts = apply_plan(
            &test_db.pool,
            &client,
            template_id,
            date(2025, 6, 2),
            &[Weekday::Mon, Weekday::Fri],
            2,
        )
        .await
        .expect("Failed to self-apply plan");

        assert_eq!(workouts.len(), 4);
        assert!(workouts.iter().all(|w| w.assignment_id.is_none()));
        assert!(workouts.iter().all(|w| w.client_id == client.id));

        // Re-applying the same plan over the same window duplicates nothing.
        let again = apply_plan(
            &test_db.pool,
            &client,
            template_id,
            date(2025, 6, 2),
            &[Weekday::Mon, Weekday::Fri],
            2,
        )
        .await
        .unwrap();
        assert_eq!(again.len(), 4);

        let ids: Vec<i64> = workouts.iter().map(|w| w.id).collect();
        let again_ids: Vec<i64> = again.iter().map(|w| w.id).collect();
        assert_eq!(ids, again_ids);
    }

    #[tokio::test]
    async fn list_assignments_filters_by_view_and_status() {
        let test_db = create_standard_test_db().await;
        let id = create_default_assignment(&test_db).await;
        let coach = test_db.user("coach_user").await.unwrap();
        let client = test_db.user("client_user").await.unwrap();

        let coach_view = list_assignments(&test_db.pool, &coach, Some("coach"), None)
            .await
            .unwrap();
        assert_eq!(coach_view.len(), 1);
        assert_eq!(coach_view[0].id, id);

        let client_view = list_assignments(&test_db.pool, &client, None, Some("assigned"))
            .await
            .unwrap();
        assert_eq!(client_view.len(), 1);

        let none_applied = list_assignments(&test_db.pool, &client, None, Some("applied"))
            .await
            .unwrap();
        assert!(none_applied.is_empty());

        let result = list_assignments(&test_db.pool, &client, None, Some("bogus")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        // A client cannot ask for the coach-side view.
        let result = list_assignments(&test_db.pool, &client, Some("coach"), None).await;
        assert!(matches!(result, Err(AppError::NotAuthorized(_))));
    }
}
