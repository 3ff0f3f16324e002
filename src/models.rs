use anyhow::Error;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::Serialize;
use std::fmt;

use crate::schedule::weekdays_from_csv;

#[derive(Serialize)]
pub struct PlanTemplate {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbPlanTemplate {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub owner_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbPlanTemplate> for PlanTemplate {
    fn from(template: DbPlanTemplate) -> Self {
        Self {
            id: template.id.unwrap_or_default(),
            name: template.name.unwrap_or_default(),
            owner_id: template.owner_id.unwrap_or_default(),
            created_at: to_utc(template.created_at),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct DailyPlan {
    pub id: i64,
    pub template_id: i64,
    pub day_slot: i64,
    pub title: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbDailyPlan {
    pub id: Option<i64>,
    pub template_id: Option<i64>,
    pub day_slot: Option<i64>,
    pub title: Option<String>,
}

impl From<DbDailyPlan> for DailyPlan {
    fn from(plan: DbDailyPlan) -> Self {
        Self {
            id: plan.id.unwrap_or_default(),
            template_id: plan.template_id.unwrap_or_default(),
            day_slot: plan.day_slot.unwrap_or_default(),
            title: plan.title.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct ExerciseSpec {
    pub id: i64,
    pub daily_plan_id: i64,
    pub exercise_name: String,
    pub set_count: i64,
    pub rep_count: i64,
    pub rest_seconds: i64,
    pub calories: i64,
    pub position: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbExerciseSpec {
    pub id: Option<i64>,
    pub daily_plan_id: Option<i64>,
    pub exercise_name: Option<String>,
    pub set_count: Option<i64>,
    pub rep_count: Option<i64>,
    pub rest_seconds: Option<i64>,
    pub calories: Option<i64>,
    pub position: Option<i64>,
}

impl From<DbExerciseSpec> for ExerciseSpec {
    fn from(spec: DbExerciseSpec) -> Self {
        Self {
            id: spec.id.unwrap_or_default(),
            daily_plan_id: spec.daily_plan_id.unwrap_or_default(),
            exercise_name: spec.exercise_name.unwrap_or_default(),
            set_count: spec.set_count.unwrap_or_default(),
            rep_count: spec.rep_count.unwrap_or_default(),
            rest_seconds: spec.rest_seconds.unwrap_or_default(),
            calories: spec.calories.unwrap_or_default(),
            position: spec.position.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignmentStatus {
    Assigned,
    Applied,
    Rejected,
    Completed,
    Overdue,
    Cancelled,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Applied => "applied",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Overdue => "overdue",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "assigned" => Ok(AssignmentStatus::Assigned),
            "applied" => Ok(AssignmentStatus::Applied),
            "rejected" => Ok(AssignmentStatus::Rejected),
            "completed" => Ok(AssignmentStatus::Completed),
            "overdue" => Ok(AssignmentStatus::Overdue),
            "cancelled" => Ok(AssignmentStatus::Cancelled),
            _ => Err(Error::msg(format!("Unknown assignment status: {}", s))),
        }
    }

    /// Terminal states accept no further transitions; `assigned` and
    /// `applied` are the two states awaiting client or time-based action.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            AssignmentStatus::Assigned | AssignmentStatus::Applied
        )
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, Clone)]
pub struct Assignment {
    pub id: i64,
    pub coach_id: i64,
    pub client_id: i64,
    pub template_id: i64,
    pub selected_weekdays: Vec<Weekday>,
    pub weeks_count: i64,
    pub suggested_start_date: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbAssignment {
    pub id: Option<i64>,
    pub coach_id: Option<i64>,
    pub client_id: Option<i64>,
    pub template_id: Option<i64>,
    pub selected_weekdays: Option<String>,
    pub weeks_count: Option<i64>,
    pub suggested_start_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbAssignment> for Assignment {
    fn from(db: DbAssignment) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            coach_id: db.coach_id.unwrap_or_default(),
            client_id: db.client_id.unwrap_or_default(),
            template_id: db.template_id.unwrap_or_default(),
            selected_weekdays: weekdays_from_csv(&db.selected_weekdays.unwrap_or_default()),
            weeks_count: db.weeks_count.unwrap_or_default(),
            suggested_start_date: db.suggested_start_date.unwrap_or_default(),
            start_date: db.start_date,
            due_date: db.due_date.unwrap_or_default(),
            notes: db.notes,
            status: AssignmentStatus::from_str(&db.status.unwrap_or_default())
                .unwrap_or(AssignmentStatus::Assigned),
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct ScheduledWorkout {
    pub id: i64,
    pub assignment_id: Option<i64>,
    pub client_id: i64,
    pub daily_plan_id: i64,
    pub scheduled_date: NaiveDate,
    pub week_number: i64,
    pub is_completed: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbScheduledWorkout {
    pub id: Option<i64>,
    pub assignment_id: Option<i64>,
    pub client_id: Option<i64>,
    pub daily_plan_id: Option<i64>,
    pub scheduled_date: Option<NaiveDate>,
    pub week_number: Option<i64>,
    pub is_completed: Option<bool>,
}

impl From<DbScheduledWorkout> for ScheduledWorkout {
    fn from(db: DbScheduledWorkout) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            assignment_id: db.assignment_id,
            client_id: db.client_id.unwrap_or_default(),
            daily_plan_id: db.daily_plan_id.unwrap_or_default(),
            scheduled_date: db.scheduled_date.unwrap_or_default(),
            week_number: db.week_number.unwrap_or_default(),
            is_completed: db.is_completed.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct ExerciseCompletion {
    pub id: i64,
    pub scheduled_workout_id: i64,
    pub exercise_spec_id: i64,
    pub completed_sets: i64,
    pub notes: Option<String>,
    pub is_completed: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbExerciseCompletion {
    pub id: Option<i64>,
    pub scheduled_workout_id: Option<i64>,
    pub exercise_spec_id: Option<i64>,
    pub completed_sets: Option<i64>,
    pub notes: Option<String>,
    pub is_completed: Option<bool>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbExerciseCompletion> for ExerciseCompletion {
    fn from(db: DbExerciseCompletion) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            scheduled_workout_id: db.scheduled_workout_id.unwrap_or_default(),
            exercise_spec_id: db.exercise_spec_id.unwrap_or_default(),
            completed_sets: db.completed_sets.unwrap_or_default(),
            notes: db.notes,
            is_completed: db.is_completed.unwrap_or_default(),
            updated_at: to_utc(db.updated_at),
        }
    }
}

/// One entry per exercise spec of the workout's daily plan; specs the client
/// has never touched are surfaced with zero progress rather than omitted.
#[derive(Serialize, Clone)]
pub struct ExerciseProgress {
    pub exercise_spec_id: i64,
    pub exercise_name: String,
    pub set_count: i64,
    pub completed_sets: i64,
    pub notes: Option<String>,
    pub is_completed: bool,
}

#[derive(Serialize, Clone)]
pub struct WorkoutProgress {
    pub scheduled_workout_id: i64,
    pub entries: Vec<ExerciseProgress>,
    pub completion_percentage: f64,
    pub is_completed: bool,
}

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}
