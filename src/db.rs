use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::{DbUser, DbUserSession, User, UserSession};
use crate::error::AppError;
use crate::models::{
    Assignment, DailyPlan, DbAssignment, DbDailyPlan, DbExerciseCompletion, DbExerciseSpec,
    DbPlanTemplate, DbScheduledWorkout, ExerciseCompletion, ExerciseSpec, PlanTemplate,
    ScheduledWorkout,
};

// ---------------------------------------------------------------------------
// Users and sessions
// ---------------------------------------------------------------------------

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, role, display_name, archived FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, role, display_name, archived FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument(skip_all, fields(username, role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: &str,
    display_name: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let existing = sqlx::query("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Validation(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, password, role, display_name) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hashed_password)
    .bind(role)
    .bind(display_name)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, password FROM users WHERE username = ? AND archived IS 0",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((id, hashed)) => match bcrypt::verify(password, &hashed) {
            Ok(true) => Ok(Some(get_user(pool, id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Coach/client relationships
// ---------------------------------------------------------------------------

#[instrument]
pub async fn link_coach_client(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
) -> Result<(), AppError> {
    info!("Linking client to coach");
    sqlx::query("INSERT OR IGNORE INTO coach_clients (coach_id, client_id) VALUES (?, ?)")
        .bind(coach_id)
        .bind(client_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn coach_has_client(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
) -> Result<bool, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM coach_clients WHERE coach_id = ? AND client_id = ?",
    )
    .bind(coach_id)
    .bind(client_id)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

// ---------------------------------------------------------------------------
// Plan templates (read-only to the engine; inserts exist for seeding)
// ---------------------------------------------------------------------------

#[instrument]
pub async fn create_plan_template(
    pool: &Pool<Sqlite>,
    name: &str,
    owner_id: i64,
) -> Result<i64, AppError> {
    info!("Creating plan template");
    let res = sqlx::query("INSERT INTO workout_plan_templates (name, owner_id) VALUES (?, ?)")
        .bind(name)
        .bind(owner_id)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn add_daily_plan(
    pool: &Pool<Sqlite>,
    template_id: i64,
    day_slot: i64,
    title: &str,
) -> Result<i64, AppError> {
    if !(1..=7).contains(&day_slot) {
        return Err(AppError::Validation(format!(
            "Day slot must be between 1 and 7, got {}",
            day_slot
        )));
    }

    let res =
        sqlx::query("INSERT INTO daily_plan_templates (template_id, day_slot, title) VALUES (?, ?, ?)")
            .bind(template_id)
            .bind(day_slot)
            .bind(title)
            .execute(pool)
            .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(daily_plan_id, exercise_name))]
pub async fn add_exercise_spec(
    pool: &Pool<Sqlite>,
    daily_plan_id: i64,
    exercise_name: &str,
    set_count: i64,
    rep_count: i64,
    rest_seconds: i64,
    calories: i64,
    position: i64,
) -> Result<i64, AppError> {
    if set_count < 1 {
        return Err(AppError::Validation(
            "Exercise set count must be at least 1".to_string(),
        ));
    }

    let res = sqlx::query(
        "INSERT INTO exercise_specs
         (daily_plan_id, exercise_name, set_count, rep_count, rest_seconds, calories, position)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(daily_plan_id)
    .bind(exercise_name)
    .bind(set_count)
    .bind(rep_count)
    .bind(rest_seconds)
    .bind(calories)
    .bind(position)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_plan_template(pool: &Pool<Sqlite>, id: i64) -> Result<PlanTemplate, AppError> {
    let row = sqlx::query_as::<_, DbPlanTemplate>(
        "SELECT * FROM workout_plan_templates WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(template) => Ok(PlanTemplate::from(template)),
        _ => Err(AppError::NotFound(format!(
            "Workout plan template with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn list_plan_templates(pool: &Pool<Sqlite>) -> Result<Vec<PlanTemplate>, AppError> {
    let rows =
        sqlx::query_as::<_, DbPlanTemplate>("SELECT * FROM workout_plan_templates ORDER BY name")
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(PlanTemplate::from).collect())
}

/// Daily plans in template order: the symbolic day-slot is the ordering.
#[instrument]
pub async fn get_daily_plans(
    pool: &Pool<Sqlite>,
    template_id: i64,
) -> Result<Vec<DailyPlan>, AppError> {
    let rows = sqlx::query_as::<_, DbDailyPlan>(
        "SELECT * FROM daily_plan_templates WHERE template_id = ? ORDER BY day_slot",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(DailyPlan::from).collect())
}

#[instrument]
pub async fn get_daily_plan(pool: &Pool<Sqlite>, id: i64) -> Result<DailyPlan, AppError> {
    let row = sqlx::query_as::<_, DbDailyPlan>("SELECT * FROM daily_plan_templates WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(plan) => Ok(DailyPlan::from(plan)),
        _ => Err(AppError::NotFound(format!(
            "Daily plan with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn get_exercise_specs(
    pool: &Pool<Sqlite>,
    daily_plan_id: i64,
) -> Result<Vec<ExerciseSpec>, AppError> {
    let rows = sqlx::query_as::<_, DbExerciseSpec>(
        "SELECT * FROM exercise_specs WHERE daily_plan_id = ? ORDER BY position",
    )
    .bind(daily_plan_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ExerciseSpec::from).collect())
}

#[instrument]
pub async fn get_exercise_spec(pool: &Pool<Sqlite>, id: i64) -> Result<ExerciseSpec, AppError> {
    let row = sqlx::query_as::<_, DbExerciseSpec>("SELECT * FROM exercise_specs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(spec) => Ok(ExerciseSpec::from(spec)),
        _ => Err(AppError::NotFound(format!(
            "Exercise spec with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn template_calorie_total(
    pool: &Pool<Sqlite>,
    template_id: i64,
) -> Result<i64, AppError> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(e.calories), 0)
         FROM exercise_specs e
         JOIN daily_plan_templates d ON d.id = e.daily_plan_id
         WHERE d.template_id = ?",
    )
    .bind(template_id)
    .fetch_one(pool)
    .await?;

    Ok(total)
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(coach_id, client_id, template_id))]
pub async fn insert_assignment(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    client_id: i64,
    template_id: i64,
    selected_weekdays: &str,
    weeks_count: i64,
    suggested_start_date: NaiveDate,
    due_date: NaiveDate,
    notes: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating assignment");
    let res = sqlx::query(
        "INSERT INTO assignments
         (coach_id, client_id, template_id, selected_weekdays, weeks_count,
          suggested_start_date, due_date, notes, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'assigned')",
    )
    .bind(coach_id)
    .bind(client_id)
    .bind(template_id)
    .bind(selected_weekdays)
    .bind(weeks_count)
    .bind(suggested_start_date)
    .bind(due_date)
    .bind(notes)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_assignment(pool: &Pool<Sqlite>, id: i64) -> Result<Assignment, AppError> {
    let row = sqlx::query_as::<_, DbAssignment>("SELECT * FROM assignments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(assignment) => Ok(Assignment::from(assignment)),
        _ => Err(AppError::NotFound(format!(
            "Assignment with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn list_assignments_for_coach(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    status: Option<&str>,
) -> Result<Vec<Assignment>, AppError> {
    let rows = sqlx::query_as::<_, DbAssignment>(
        "SELECT * FROM assignments
         WHERE coach_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY updated_at DESC, id DESC",
    )
    .bind(coach_id)
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Assignment::from).collect())
}

#[instrument]
pub async fn list_assignments_for_client(
    pool: &Pool<Sqlite>,
    client_id: i64,
    status: Option<&str>,
) -> Result<Vec<Assignment>, AppError> {
    let rows = sqlx::query_as::<_, DbAssignment>(
        "SELECT * FROM assignments
         WHERE client_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY updated_at DESC, id DESC",
    )
    .bind(client_id)
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Assignment::from).collect())
}

/// Conditional transition keyed on the expected source state. Returns the
/// number of rows changed: 0 means the assignment was not in `from` at the
/// moment of the update, which callers must resolve by re-reading.
#[instrument]
pub async fn transition_assignment(
    pool: &Pool<Sqlite>,
    id: i64,
    from: &str,
    to: &str,
) -> Result<u64, AppError> {
    let now = Utc::now().naive_utc();
    let res = sqlx::query(
        "UPDATE assignments SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to)
    .bind(now)
    .bind(id)
    .bind(from)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

/// The accept-time flip: `assigned -> applied` plus the client-adjusted
/// schedule parameters, in one conditional statement.
pub async fn apply_assignment_tx(
    conn: &mut SqliteConnection,
    id: i64,
    selected_weekdays: &str,
    weeks_count: i64,
    start_date: NaiveDate,
) -> Result<u64, AppError> {
    let now = Utc::now().naive_utc();
    let res = sqlx::query(
        "UPDATE assignments
         SET status = 'applied', selected_weekdays = ?, weeks_count = ?,
             start_date = ?, updated_at = ?
         WHERE id = ? AND status = 'assigned'",
    )
    .bind(selected_weekdays)
    .bind(weeks_count)
    .bind(start_date)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(res.rows_affected())
}

#[instrument]
pub async fn delete_assignment_if_assigned(pool: &Pool<Sqlite>, id: i64) -> Result<u64, AppError> {
    info!("Withdrawing assignment");
    let res = sqlx::query("DELETE FROM assignments WHERE id = ? AND status = 'assigned'")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(res.rows_affected())
}

#[instrument]
pub async fn sweep_overdue_assignments(
    pool: &Pool<Sqlite>,
    as_of: NaiveDate,
) -> Result<u64, AppError> {
    info!("Sweeping overdue assignments");
    let now = Utc::now().naive_utc();
    let res = sqlx::query(
        "UPDATE assignments SET status = 'overdue', updated_at = ?
         WHERE status = 'applied' AND due_date < ?",
    )
    .bind(now)
    .bind(as_of)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// Scheduled workouts
// ---------------------------------------------------------------------------

/// Insert-or-ignore against the schedule uniqueness indexes, which is what
/// makes re-running generation for the same aggregate a no-op.
pub async fn insert_scheduled_workout_tx(
    conn: &mut SqliteConnection,
    assignment_id: Option<i64>,
    client_id: i64,
    daily_plan_id: i64,
    scheduled_date: NaiveDate,
    week_number: i64,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT OR IGNORE INTO scheduled_workouts
         (assignment_id, client_id, daily_plan_id, scheduled_date, week_number)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(assignment_id)
    .bind(client_id)
    .bind(daily_plan_id)
    .bind(scheduled_date)
    .bind(week_number)
    .execute(conn)
    .await?;

    Ok(())
}

#[instrument]
pub async fn get_scheduled_workout(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<ScheduledWorkout, AppError> {
    let row = sqlx::query_as::<_, DbScheduledWorkout>(
        "SELECT * FROM scheduled_workouts WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(workout) => Ok(ScheduledWorkout::from(workout)),
        _ => Err(AppError::NotFound(format!(
            "Scheduled workout with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn list_workouts_for_assignment(
    pool: &Pool<Sqlite>,
    assignment_id: i64,
) -> Result<Vec<ScheduledWorkout>, AppError> {
    let rows = sqlx::query_as::<_, DbScheduledWorkout>(
        "SELECT * FROM scheduled_workouts WHERE assignment_id = ? ORDER BY scheduled_date, id",
    )
    .bind(assignment_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ScheduledWorkout::from).collect())
}

#[instrument]
pub async fn list_workouts_for_client(
    pool: &Pool<Sqlite>,
    client_id: i64,
    date_from: Option<NaiveDate>,
    completed: Option<bool>,
) -> Result<Vec<ScheduledWorkout>, AppError> {
    let rows = sqlx::query_as::<_, DbScheduledWorkout>(
        "SELECT * FROM scheduled_workouts
         WHERE client_id = ?1
           AND (?2 IS NULL OR scheduled_date >= ?2)
           AND (?3 IS NULL OR is_completed = ?3)
         ORDER BY scheduled_date, id",
    )
    .bind(client_id)
    .bind(date_from)
    .bind(completed)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ScheduledWorkout::from).collect())
}

pub async fn set_workout_completed_tx(
    conn: &mut SqliteConnection,
    workout_id: i64,
    completed: bool,
) -> Result<(), AppError> {
    sqlx::query("UPDATE scheduled_workouts SET is_completed = ? WHERE id = ?")
        .bind(completed)
        .bind(workout_id)
        .execute(conn)
        .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Exercise completion records
// ---------------------------------------------------------------------------

/// Create-or-update for one (workout, spec) pair. A `None` notes value
/// preserves whatever notes the record already carries.
pub async fn upsert_completion_tx(
    conn: &mut SqliteConnection,
    workout_id: i64,
    exercise_spec_id: i64,
    completed_sets: i64,
    notes: Option<&str>,
    is_completed: bool,
) -> Result<(), AppError> {
    let now = Utc::now().naive_utc();
    sqlx::query(
        "INSERT INTO exercise_completions
         (scheduled_workout_id, exercise_spec_id, completed_sets, notes, is_completed, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (scheduled_workout_id, exercise_spec_id) DO UPDATE SET
             completed_sets = excluded.completed_sets,
             notes = COALESCE(excluded.notes, exercise_completions.notes),
             is_completed = excluded.is_completed,
             updated_at = excluded.updated_at",
    )
    .bind(workout_id)
    .bind(exercise_spec_id)
    .bind(completed_sets)
    .bind(notes)
    .bind(is_completed)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

/// Resets an existing record to zero progress. Returns 0 when no record
/// exists, which callers treat as a no-op (absence already means zero).
pub async fn reset_completion_tx(
    conn: &mut SqliteConnection,
    workout_id: i64,
    exercise_spec_id: i64,
) -> Result<u64, AppError> {
    let now = Utc::now().naive_utc();
    let res = sqlx::query(
        "UPDATE exercise_completions
         SET completed_sets = 0, is_completed = FALSE, updated_at = ?
         WHERE scheduled_workout_id = ? AND exercise_spec_id = ?",
    )
    .bind(now)
    .bind(workout_id)
    .bind(exercise_spec_id)
    .execute(conn)
    .await?;

    Ok(res.rows_affected())
}

#[instrument]
pub async fn list_completions_for_workout(
    pool: &Pool<Sqlite>,
    workout_id: i64,
) -> Result<Vec<ExerciseCompletion>, AppError> {
    let rows = sqlx::query_as::<_, DbExerciseCompletion>(
        "SELECT * FROM exercise_completions WHERE scheduled_workout_id = ? ORDER BY id",
    )
    .bind(workout_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ExerciseCompletion::from).collect())
}

pub async fn count_specs_for_daily_plan_tx(
    conn: &mut SqliteConnection,
    daily_plan_id: i64,
) -> Result<i64, AppError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exercise_specs WHERE daily_plan_id = ?")
            .bind(daily_plan_id)
            .fetch_one(conn)
            .await?;

    Ok(count)
}

pub async fn count_fully_completed_tx(
    conn: &mut SqliteConnection,
    workout_id: i64,
) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM exercise_completions
         WHERE scheduled_workout_id = ? AND is_completed IS TRUE",
    )
    .bind(workout_id)
    .fetch_one(conn)
    .await?;

    Ok(count)
}
