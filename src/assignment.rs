use chrono::{NaiveDate, Weekday};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{Permission, Role, User};
use crate::db::{
    apply_assignment_tx, coach_has_client, delete_assignment_if_assigned, get_assignment,
    get_daily_plans, get_plan_template, get_user, insert_assignment, insert_scheduled_workout_tx,
    list_assignments_for_client, list_assignments_for_coach, list_workouts_for_assignment,
    list_workouts_for_client, sweep_overdue_assignments, transition_assignment,
};
use crate::error::AppError;
use crate::models::{Assignment, AssignmentStatus, ScheduledWorkout};
use crate::schedule::{self, MAX_WEEKS, MIN_WEEKS, weekdays_to_csv};

/// Offers a plan template to a client. The assignment starts in `assigned`
/// and waits for the client to accept or reject it.
#[instrument(skip(pool, coach))]
pub async fn create_assignment(
    pool: &Pool<Sqlite>,
    coach: &User,
    client_id: i64,
    template_id: i64,
    selected_weekdays: &[Weekday],
    weeks_count: i64,
    suggested_start_date: NaiveDate,
    due_date: NaiveDate,
    notes: Option<&str>,
) -> Result<Assignment, AppError> {
    coach.require_permission(Permission::CreateAssignments)?;

    if !coach_has_client(pool, coach.id, client_id).await? {
        return Err(AppError::NotAuthorized(format!(
            "User {} is not the coach of client {}",
            coach.id, client_id
        )));
    }

    let weekdays = schedule::normalize_weekdays(selected_weekdays);
    if weekdays.is_empty() {
        return Err(AppError::Validation(
            "At least one weekday must be selected".to_string(),
        ));
    }
    if !(MIN_WEEKS..=MAX_WEEKS).contains(&weeks_count) {
        return Err(AppError::Validation(format!(
            "Weeks count must be between {} and {}, got {}",
            MIN_WEEKS, MAX_WEEKS, weeks_count
        )));
    }
    if due_date <= suggested_start_date {
        return Err(AppError::Validation(format!(
            "Due date {} must be after the suggested start date {}",
            due_date, suggested_start_date
        )));
    }

    let client = get_user(pool, client_id).await?;
    if client.role != Role::Client {
        return Err(AppError::Validation(format!(
            "User {} is not a client",
            client_id
        )));
    }

    // Referenced templates must exist before anything is persisted.
    get_plan_template(pool, template_id).await?;

    let id = insert_assignment(
        pool,
        coach.id,
        client_id,
        template_id,
        &weekdays_to_csv(&weekdays),
        weeks_count,
        suggested_start_date,
        due_date,
        notes,
    )
    .await?;

    get_assignment(pool, id).await
}

/// Client acceptance: materializes the schedule with the (possibly
/// client-adjusted) parameters and flips `assigned -> applied`. Accepting an
/// already-applied assignment returns the existing schedule unchanged.
#[instrument(skip(pool, client))]
pub async fn accept_assignment(
    pool: &Pool<Sqlite>,
    client: &User,
    assignment_id: i64,
    start_date: NaiveDate,
    selected_weekdays: &[Weekday],
    weeks_count: i64,
) -> Result<(Assignment, Vec<ScheduledWorkout>), AppError> {
    client.require_permission(Permission::AcceptAssignments)?;

    let assignment = get_assignment(pool, assignment_id).await?;
    if assignment.client_id != client.id {
        return Err(AppError::NotAuthorized(format!(
            "Assignment {} is not addressed to user {}",
            assignment_id, client.id
        )));
    }

    match assignment.status {
        AssignmentStatus::Applied => {
            let workouts = list_workouts_for_assignment(pool, assignment_id).await?;
            return Ok((assignment, workouts));
        }
        AssignmentStatus::Assigned => {}
        status => {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot accept assignment {} in state '{}'",
                assignment_id, status
            )));
        }
    }

    let daily_plans = get_daily_plans(pool, assignment.template_id).await?;
    let drafts = schedule::generate(&daily_plans, selected_weekdays, weeks_count, start_date)?;

    if let Some(last) = drafts.last() {
        if last.scheduled_date >= assignment.due_date {
            return Err(AppError::Validation(format!(
                "Schedule would end on {}, on or after the due date {}",
                last.scheduled_date, assignment.due_date
            )));
        }
    }

    let weekdays_csv = weekdays_to_csv(selected_weekdays);

    let mut tx = pool.begin().await?;

    let flipped =
        apply_assignment_tx(&mut tx, assignment_id, &weekdays_csv, weeks_count, start_date).await?;
    if flipped == 0 {
        // Lost a race: somebody else moved the assignment first. Re-read and
        // either take the idempotent path or report the stale view.
        drop(tx);
        let current = get_assignment(pool, assignment_id).await?;
        if current.status == AssignmentStatus::Applied {
            let workouts = list_workouts_for_assignment(pool, assignment_id).await?;
            return Ok((current, workouts));
        }
        return Err(AppError::InvalidStateTransition(format!(
            "Cannot accept assignment {} in state '{}'",
            assignment_id, current.status
        )));
    }

    for draft in &drafts {
        insert_scheduled_workout_tx(
            &mut tx,
            Some(assignment_id),
            assignment.client_id,
            draft.daily_plan_id,
            draft.scheduled_date,
            draft.week_number,
        )
        .await?;
    }

    tx.commit().await?;

    info!(
        assignment_id,
        sessions = drafts.len(),
        "Assignment accepted and schedule generated"
    );

    let updated = get_assignment(pool, assignment_id).await?;
    let workouts = list_workouts_for_assignment(pool, assignment_id).await?;
    Ok((updated, workouts))
}

/// Client rejection: terminal, no schedule is ever generated.
#[instrument(skip(pool, client))]
pub async fn reject_assignment(
    pool: &Pool<Sqlite>,
    client: &User,
    assignment_id: i64,
) -> Result<Assignment, AppError> {
    let assignment = get_assignment(pool, assignment_id).await?;
    if assignment.client_id != client.id {
        return Err(AppError::NotAuthorized(format!(
            "Assignment {} is not addressed to user {}",
            assignment_id, client.id
        )));
    }

    let changed = transition_assignment(
        pool,
        assignment_id,
        AssignmentStatus::Assigned.as_str(),
        AssignmentStatus::Rejected.as_str(),
    )
    .await?;

    if changed == 0 {
        let current = get_assignment(pool, assignment_id).await?;
        return Err(AppError::InvalidStateTransition(format!(
            "Cannot reject assignment {} in state '{}'",
            assignment_id, current.status
        )));
    }

    get_assignment(pool, assignment_id).await
}

/// Coach-side cancellation before the client has responded: the offer is
/// deleted outright. Returns the snapshot of what was removed.
#[instrument(skip(pool, coach))]
pub async fn withdraw_assignment(
    pool: &Pool<Sqlite>,
    coach: &User,
    assignment_id: i64,
) -> Result<Assignment, AppError> {
    coach.require_permission(Permission::WithdrawAssignments)?;

    let assignment = get_assignment(pool, assignment_id).await?;
    if assignment.coach_id != coach.id && coach.role != Role::Admin {
        return Err(AppError::NotAuthorized(format!(
            "Assignment {} was not created by user {}",
            assignment_id, coach.id
        )));
    }

    let deleted = delete_assignment_if_assigned(pool, assignment_id).await?;
    if deleted == 0 {
        let current = get_assignment(pool, assignment_id).await?;
        return Err(AppError::InvalidStateTransition(format!(
            "Cannot withdraw assignment {} in state '{}'",
            assignment_id, current.status
        )));
    }

    Ok(assignment)
}

pub async fn mark_completed(
    pool: &Pool<Sqlite>,
    actor: &User,
    assignment_id: i64,
) -> Result<Assignment, AppError> {
    transition_from_applied(pool, actor, assignment_id, AssignmentStatus::Completed).await
}

pub async fn mark_overdue(
    pool: &Pool<Sqlite>,
    actor: &User,
    assignment_id: i64,
) -> Result<Assignment, AppError> {
    transition_from_applied(pool, actor, assignment_id, AssignmentStatus::Overdue).await
}

pub async fn cancel_assignment(
    pool: &Pool<Sqlite>,
    actor: &User,
    assignment_id: i64,
) -> Result<Assignment, AppError> {
    transition_from_applied(pool, actor, assignment_id, AssignmentStatus::Cancelled).await
}

/// Shared exit path out of `applied`. Re-invocation when the assignment is
/// already in the target state is an idempotent no-op; every other source
/// state is rejected without touching the row.
#[instrument(skip(pool, actor))]
async fn transition_from_applied(
    pool: &Pool<Sqlite>,
    actor: &User,
    assignment_id: i64,
    target: AssignmentStatus,
) -> Result<Assignment, AppError> {
    actor.require_permission(Permission::ManageAssignments)?;

    let assignment = get_assignment(pool, assignment_id).await?;
    if assignment.coach_id != actor.id && actor.role != Role::Admin {
        return Err(AppError::NotAuthorized(format!(
            "Assignment {} was not created by user {}",
            assignment_id, actor.id
        )));
    }

    if assignment.status == target {
        return Ok(assignment);
    }
    if assignment.status.is_terminal() {
        return Err(AppError::InvalidStateTransition(format!(
            "Cannot move assignment {} from '{}' to '{}'",
            assignment_id, assignment.status, target
        )));
    }

    let changed = transition_assignment(
        pool,
        assignment_id,
        AssignmentStatus::Applied.as_str(),
        target.as_str(),
    )
    .await?;

    if changed == 0 {
        let current = get_assignment(pool, assignment_id).await?;
        if current.status == target {
            return Ok(current);
        }
        return Err(AppError::InvalidStateTransition(format!(
            "Cannot move assignment {} from '{}' to '{}'",
            assignment_id, current.status, target
        )));
    }

    get_assignment(pool, assignment_id).await
}

/// Externally-triggered overdue detection: there is no timer inside the
/// engine. Flips every applied assignment whose due date has passed.
#[instrument(skip(pool, actor))]
pub async fn sweep_overdue(
    pool: &Pool<Sqlite>,
    actor: &User,
    as_of: NaiveDate,
) -> Result<u64, AppError> {
    actor.require_permission(Permission::ManageAssignments)?;

    let swept = sweep_overdue_assignments(pool, as_of).await?;
    if swept > 0 {
        info!(swept, %as_of, "Marked overdue assignments");
    }

    Ok(swept)
}

/// Self-service path: a client applies a plan template to themselves and the
/// schedule is generated immediately, with no assignment row behind it.
#[instrument(skip(pool, client))]
pub async fn apply_plan(
    pool: &Pool<Sqlite>,
    client: &User,
    template_id: i64,
    start_date: NaiveDate,
    selected_weekdays: &[Weekday],
    weeks_count: i64,
) -> Result<Vec<ScheduledWorkout>, AppError> {
    client.require_permission(Permission::ApplyPlans)?;

    get_plan_template(pool, template_id).await?;
    let daily_plans = get_daily_plans(pool, template_id).await?;
    let drafts = schedule::generate(&daily_plans, selected_weekdays, weeks_count, start_date)?;

    let mut tx = pool.begin().await?;
    for draft in &drafts {
        insert_scheduled_workout_tx(
            &mut tx,
            None,
            client.id,
            draft.daily_plan_id,
            draft.scheduled_date,
            draft.week_number,
        )
        .await?;
    }
    tx.commit().await?;

    info!(
        template_id,
        sessions = drafts.len(),
        "Plan self-applied and schedule generated"
    );

    let drafted: Vec<(i64, NaiveDate)> = drafts
        .iter()
        .map(|d| (d.daily_plan_id, d.scheduled_date))
        .collect();

    let workouts = list_workouts_for_client(pool, client.id, Some(start_date), None).await?;
    Ok(workouts
        .into_iter()
        .filter(|w| {
            w.assignment_id.is_none()
                && drafted.contains(&(w.daily_plan_id, w.scheduled_date))
        })
        .collect())
}

/// Read API surfaced back to both sides of the negotiation. `role_view`
/// selects which side of the relationship to list; it defaults to the
/// caller's own role.
#[instrument(skip(pool, user))]
pub async fn list_assignments(
    pool: &Pool<Sqlite>,
    user: &User,
    role_view: Option<&str>,
    status: Option<&str>,
) -> Result<Vec<Assignment>, AppError> {
    let status = match status {
        Some(s) => Some(
            AssignmentStatus::from_str(s)
                .map_err(|e| AppError::Validation(e.to_string()))?
                .as_str(),
        ),
        None => None,
    };

    let as_coach = match role_view {
        Some("coach") => true,
        Some("client") => false,
        None => user.role != Role::Client,
        Some(other) => {
            return Err(AppError::Validation(format!(
                "Unknown role view: '{}'",
                other
            )));
        }
    };

    if as_coach {
        user.require_permission(Permission::ViewAllClients)?;
        list_assignments_for_coach(pool, user.id, status).await
    } else {
        list_assignments_for_client(pool, user.id, status).await
    }
}
