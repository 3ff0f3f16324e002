use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{Permission, Role, User};
use crate::db::{
    coach_has_client, count_fully_completed_tx, count_specs_for_daily_plan_tx, get_exercise_spec,
    get_exercise_specs, get_scheduled_workout, list_completions_for_workout, reset_completion_tx,
    set_workout_completed_tx, upsert_completion_tx,
};
use crate::error::AppError;
use crate::models::{ExerciseProgress, ExerciseSpec, ScheduledWorkout, WorkoutProgress};

/// Aggregate completion is always this ratio, recomputed from the records;
/// it is never cached anywhere it could drift from its sources.
pub fn completion_percentage(fully_completed: i64, total_specs: i64) -> f64 {
    if total_specs == 0 {
        0.0
    } else {
        fully_completed as f64 / total_specs as f64 * 100.0
    }
}

/// Records the client's progress on one exercise of a scheduled session and
/// returns the recomputed aggregate for the whole session.
#[instrument(skip(pool, user))]
pub async fn record_progress(
    pool: &Pool<Sqlite>,
    user: &User,
    scheduled_workout_id: i64,
    exercise_spec_id: i64,
    completed_sets: i64,
    notes: Option<&str>,
) -> Result<WorkoutProgress, AppError> {
    let workout = owned_workout(pool, user, scheduled_workout_id).await?;
    let spec = spec_in_workout(pool, &workout, exercise_spec_id).await?;

    if completed_sets < 0 || completed_sets > spec.set_count {
        return Err(AppError::Validation(format!(
            "Completed sets must be between 0 and {}, got {}",
            spec.set_count, completed_sets
        )));
    }

    let fully_completed = completed_sets >= spec.set_count;

    let mut tx = pool.begin().await?;
    upsert_completion_tx(
        &mut tx,
        workout.id,
        spec.id,
        completed_sets,
        notes,
        fully_completed,
    )
    .await?;
    recompute_workout_flag_tx(&mut tx, &workout).await?;
    tx.commit().await?;

    info!(
        workout_id = workout.id,
        exercise_spec_id = spec.id,
        completed_sets,
        "Recorded exercise progress"
    );

    get_progress(pool, user, scheduled_workout_id).await
}

/// Winds one exercise back to zero completed sets. An exercise that was
/// never touched has no record, and stays that way (absence already reads as
/// zero progress).
#[instrument(skip(pool, user))]
pub async fn uncomplete_exercise(
    pool: &Pool<Sqlite>,
    user: &User,
    scheduled_workout_id: i64,
    exercise_spec_id: i64,
) -> Result<WorkoutProgress, AppError> {
    let workout = owned_workout(pool, user, scheduled_workout_id).await?;
    let spec = spec_in_workout(pool, &workout, exercise_spec_id).await?;

    let mut tx = pool.begin().await?;
    let reset = reset_completion_tx(&mut tx, workout.id, spec.id).await?;
    recompute_workout_flag_tx(&mut tx, &workout).await?;
    tx.commit().await?;

    if reset > 0 {
        info!(
            workout_id = workout.id,
            exercise_spec_id = spec.id,
            "Reset exercise completion"
        );
    }

    get_progress(pool, user, scheduled_workout_id).await
}

/// Bulk session completion: force-creates a fully-completed record for every
/// exercise of the daily plan and marks the session complete, all or
/// nothing. Any mid-flight failure rolls the whole batch back.
#[instrument(skip(pool, user))]
pub async fn complete_workout(
    pool: &Pool<Sqlite>,
    user: &User,
    scheduled_workout_id: i64,
) -> Result<ScheduledWorkout, AppError> {
    let workout = owned_workout(pool, user, scheduled_workout_id).await?;
    let specs = get_exercise_specs(pool, workout.daily_plan_id).await?;

    let mut tx = pool.begin().await?;
    for spec in &specs {
        if let Err(err) =
            upsert_completion_tx(&mut tx, workout.id, spec.id, spec.set_count, None, true).await
        {
            tx.rollback().await.ok();
            return Err(AppError::PartialFailure(format!(
                "Bulk completion of workout {} rolled back at exercise {}: {}",
                workout.id, spec.id, err
            )));
        }
    }
    if let Err(err) = set_workout_completed_tx(&mut tx, workout.id, true).await {
        tx.rollback().await.ok();
        return Err(AppError::PartialFailure(format!(
            "Bulk completion of workout {} rolled back: {}",
            workout.id, err
        )));
    }
    tx.commit().await?;

    info!(
        workout_id = workout.id,
        exercises = specs.len(),
        "Workout marked fully complete"
    );

    get_scheduled_workout(pool, scheduled_workout_id).await
}

/// Read-only progress view: one entry per exercise spec of the daily plan,
/// untouched specs included as zero-progress entries, plus the aggregate
/// recomputed live from the records.
#[instrument(skip(pool, user))]
pub async fn get_progress(
    pool: &Pool<Sqlite>,
    user: &User,
    scheduled_workout_id: i64,
) -> Result<WorkoutProgress, AppError> {
    let workout = readable_workout(pool, user, scheduled_workout_id).await?;

    let specs = get_exercise_specs(pool, workout.daily_plan_id).await?;
    let completions = list_completions_for_workout(pool, workout.id).await?;

    let entries: Vec<ExerciseProgress> = specs
        .iter()
        .map(|spec| {
            let record = completions.iter().find(|c| c.exercise_spec_id == spec.id);
            ExerciseProgress {
                exercise_spec_id: spec.id,
                exercise_name: spec.exercise_name.clone(),
                set_count: spec.set_count,
                completed_sets: record.map(|r| r.completed_sets).unwrap_or(0),
                notes: record.and_then(|r| r.notes.clone()),
                is_completed: record.map(|r| r.is_completed).unwrap_or(false),
            }
        })
        .collect();

    let fully_completed = entries.iter().filter(|e| e.is_completed).count() as i64;
    let total = entries.len() as i64;

    Ok(WorkoutProgress {
        scheduled_workout_id: workout.id,
        completion_percentage: completion_percentage(fully_completed, total),
        is_completed: workout.is_completed,
        entries,
    })
}

/// The persisted session flag tracks the records, not the other way around:
/// it flips exactly when every exercise of the plan has a fully-completed
/// record.
async fn recompute_workout_flag_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    workout: &ScheduledWorkout,
) -> Result<(), AppError> {
    let total = count_specs_for_daily_plan_tx(tx, workout.daily_plan_id).await?;
    let completed = count_fully_completed_tx(tx, workout.id).await?;
    set_workout_completed_tx(tx, workout.id, total > 0 && completed >= total).await
}

async fn owned_workout(
    pool: &Pool<Sqlite>,
    user: &User,
    scheduled_workout_id: i64,
) -> Result<ScheduledWorkout, AppError> {
    user.require_permission(Permission::RecordOwnProgress)?;

    let workout = get_scheduled_workout(pool, scheduled_workout_id).await?;
    if workout.client_id != user.id {
        return Err(AppError::NotAuthorized(format!(
            "Scheduled workout {} does not belong to user {}",
            scheduled_workout_id, user.id
        )));
    }

    Ok(workout)
}

/// Owner client, or a coach linked to that client, may read progress.
async fn readable_workout(
    pool: &Pool<Sqlite>,
    user: &User,
    scheduled_workout_id: i64,
) -> Result<ScheduledWorkout, AppError> {
    let workout = get_scheduled_workout(pool, scheduled_workout_id).await?;

    if workout.client_id == user.id || user.role == Role::Admin {
        return Ok(workout);
    }

    if user.has_permission(Permission::ViewAllClients)
        && coach_has_client(pool, user.id, workout.client_id).await?
    {
        return Ok(workout);
    }

    Err(AppError::NotAuthorized(format!(
        "Scheduled workout {} is not visible to user {}",
        scheduled_workout_id, user.id
    )))
}

async fn spec_in_workout(
    pool: &Pool<Sqlite>,
    workout: &ScheduledWorkout,
    exercise_spec_id: i64,
) -> Result<ExerciseSpec, AppError> {
    let spec = get_exercise_spec(pool, exercise_spec_id).await?;
    if spec.daily_plan_id != workout.daily_plan_id {
        return Err(AppError::NotFound(format!(
            "Exercise spec {} does not belong to the daily plan of workout {}",
            exercise_spec_id, workout.id
        )));
    }
    Ok(spec)
}
