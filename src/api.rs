use chrono::{NaiveDate, Utc};
use rocket::FromForm;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::assignment::{
    accept_assignment, apply_plan, cancel_assignment, create_assignment, list_assignments,
    mark_completed, mark_overdue, reject_assignment, sweep_overdue, withdraw_assignment,
};
use crate::auth::{Permission, User, UserSession};
use crate::db::{
    authenticate_user, coach_has_client, create_user_session, get_daily_plans, get_exercise_specs,
    get_plan_template, invalidate_session, list_plan_templates, list_workouts_for_client,
    template_calorie_total,
};
use crate::error::AppError;
use crate::models::{Assignment, ExerciseProgress, ScheduledWorkout, WorkoutProgress};
use crate::schedule::{parse_weekdays, weekday_name};
use crate::tracker::{complete_workout, get_progress, record_progress, uncomplete_exercise};
use crate::validation::{AppErrorExt, JsonValidateExt, ToValidationResponse, ValidationResponse};

type ApiResult<T> = Result<Json<T>, Custom<Json<ValidationResponse>>>;

// ---------------------------------------------------------------------------
// Session endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub archived: bool,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role.to_string(),
            archived: user.archived,
        }
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<LoginResponse> {
    use rocket::http::{Cookie, SameSite};

    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(rocket::http::Cookie::build("session_token"));

    Status::Ok
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub id: i64,
    pub coach_id: i64,
    pub client_id: i64,
    pub template_id: i64,
    pub selected_weekdays: Vec<String>,
    pub weeks_count: i64,
    pub suggested_start_date: String,
    pub start_date: Option<String>,
    pub due_date: String,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Assignment> for AssignmentResponse {
    fn from(a: Assignment) -> Self {
        Self {
            id: a.id,
            coach_id: a.coach_id,
            client_id: a.client_id,
            template_id: a.template_id,
            selected_weekdays: a
                .selected_weekdays
                .iter()
                .map(|w| weekday_name(*w).to_string())
                .collect(),
            weeks_count: a.weeks_count,
            suggested_start_date: a.suggested_start_date.to_string(),
            start_date: a.start_date.map(|d| d.to_string()),
            due_date: a.due_date.to_string(),
            notes: a.notes,
            status: a.status.to_string(),
            created_at: a.created_at.to_rfc3339(),
            updated_at: a.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ScheduledWorkoutResponse {
    pub id: i64,
    pub assignment_id: Option<i64>,
    pub client_id: i64,
    pub daily_plan_id: i64,
    pub scheduled_date: String,
    pub week_number: i64,
    pub is_completed: bool,
}

impl From<ScheduledWorkout> for ScheduledWorkoutResponse {
    fn from(w: ScheduledWorkout) -> Self {
        Self {
            id: w.id,
            assignment_id: w.assignment_id,
            client_id: w.client_id,
            daily_plan_id: w.daily_plan_id,
            scheduled_date: w.scheduled_date.to_string(),
            week_number: w.week_number,
            is_completed: w.is_completed,
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct CreateAssignmentRequest {
    client_id: i64,
    template_id: i64,
    #[validate(length(min = 1, message = "At least one weekday must be selected"))]
    selected_weekdays: Vec<String>,
    #[validate(range(min = 1, max = 52, message = "Weeks count must be between 1 and 52"))]
    weeks_count: i64,
    suggested_start_date: NaiveDate,
    due_date: NaiveDate,
    notes: Option<String>,
}

#[post("/assignments", data = "<request>")]
pub async fn api_create_assignment(
    request: Json<CreateAssignmentRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentResponse> {
    let validated = request.validate_custom()?;
    let weekdays = parse_weekdays(&validated.selected_weekdays).validate_custom()?;

    let assignment = create_assignment(
        db,
        &user,
        validated.client_id,
        validated.template_id,
        &weekdays,
        validated.weeks_count,
        validated.suggested_start_date,
        validated.due_date,
        validated.notes.as_deref(),
    )
    .await
    .validate_custom()?;

    Ok(Json(AssignmentResponse::from(assignment)))
}

#[derive(Deserialize, Validate)]
pub struct AcceptAssignmentRequest {
    start_date: NaiveDate,
    #[validate(length(min = 1, message = "At least one weekday must be selected"))]
    selected_weekdays: Vec<String>,
    #[validate(range(min = 1, max = 52, message = "Weeks count must be between 1 and 52"))]
    weeks_count: i64,
}

#[derive(Serialize, Deserialize)]
pub struct AcceptAssignmentResponse {
    pub assignment: AssignmentResponse,
    pub scheduled_workouts: Vec<ScheduledWorkoutResponse>,
}

#[post("/assignments/<id>/accept", data = "<request>")]
pub async fn api_accept_assignment(
    id: i64,
    request: Json<AcceptAssignmentRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AcceptAssignmentResponse> {
    let validated = request.validate_custom()?;
    let weekdays = parse_weekdays(&validated.selected_weekdays).validate_custom()?;

    let (assignment, workouts) = accept_assignment(
        db,
        &user,
        id,
        validated.start_date,
        &weekdays,
        validated.weeks_count,
    )
    .await
    .validate_custom()?;

    Ok(Json(AcceptAssignmentResponse {
        assignment: AssignmentResponse::from(assignment),
        scheduled_workouts: workouts
            .into_iter()
            .map(ScheduledWorkoutResponse::from)
            .collect(),
    }))
}

#[post("/assignments/<id>/reject")]
pub async fn api_reject_assignment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentResponse> {
    let assignment = reject_assignment(db, &user, id).await.validate_custom()?;
    Ok(Json(AssignmentResponse::from(assignment)))
}

#[post("/assignments/<id>/withdraw")]
pub async fn api_withdraw_assignment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentResponse> {
    let assignment = withdraw_assignment(db, &user, id).await.validate_custom()?;
    Ok(Json(AssignmentResponse::from(assignment)))
}

#[post("/assignments/<id>/complete")]
pub async fn api_complete_assignment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentResponse> {
    let assignment = mark_completed(db, &user, id).await.validate_custom()?;
    Ok(Json(AssignmentResponse::from(assignment)))
}

#[post("/assignments/<id>/cancel")]
pub async fn api_cancel_assignment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentResponse> {
    let assignment = cancel_assignment(db, &user, id).await.validate_custom()?;
    Ok(Json(AssignmentResponse::from(assignment)))
}

#[post("/assignments/<id>/overdue")]
pub async fn api_overdue_assignment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentResponse> {
    let assignment = mark_overdue(db, &user, id).await.validate_custom()?;
    Ok(Json(AssignmentResponse::from(assignment)))
}

#[derive(Deserialize)]
pub struct SweepOverdueRequest {
    as_of: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize)]
pub struct SweepOverdueResponse {
    pub marked_overdue: u64,
}

#[post("/assignments/sweep_overdue", data = "<request>")]
pub async fn api_sweep_overdue(
    request: Option<Json<SweepOverdueRequest>>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<SweepOverdueResponse> {
    let as_of = request
        .and_then(|r| r.into_inner().as_of)
        .unwrap_or_else(|| Utc::now().date_naive());

    let marked_overdue = sweep_overdue(db, &user, as_of).await.validate_custom()?;

    Ok(Json(SweepOverdueResponse { marked_overdue }))
}

#[derive(FromForm)]
pub struct AssignmentsQueryParams {
    role: Option<String>,
    status: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct AssignmentsResponse {
    pub assignments: Vec<AssignmentResponse>,
}

#[get("/assignments?<params..>")]
pub async fn api_list_assignments(
    params: AssignmentsQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentsResponse> {
    let assignments = list_assignments(db, &user, params.role.as_deref(), params.status.as_deref())
        .await
        .validate_custom()?;

    Ok(Json(AssignmentsResponse {
        assignments: assignments
            .into_iter()
            .map(AssignmentResponse::from)
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// Scheduled workouts and progress
// ---------------------------------------------------------------------------

#[derive(FromForm)]
pub struct ScheduledWorkoutsQueryParams {
    date_from: Option<String>,
    completed: Option<bool>,
    client_id: Option<i64>,
}

#[derive(Serialize, Deserialize)]
pub struct ScheduledWorkoutsResponse {
    pub scheduled_workouts: Vec<ScheduledWorkoutResponse>,
}

#[get("/scheduled_workouts?<params..>")]
pub async fn api_list_scheduled_workouts(
    params: ScheduledWorkoutsQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ScheduledWorkoutsResponse> {
    let date_from = match params.date_from.as_deref() {
        Some(raw) => Some(
            raw.parse::<NaiveDate>()
                .map_err(|_| {
                    AppError::Validation(format!("Invalid date_from value: '{}'", raw))
                })
                .validate_custom()?,
        ),
        None => None,
    };

    // A coach may list a linked client's schedule; everyone else sees only
    // their own.
    let client_id = match params.client_id {
        Some(other) if other != user.id => {
            user.require_permission(Permission::ViewAllClients)
                .validate_custom()?;
            let linked = coach_has_client(db, user.id, other).await.validate_custom()?;
            if !linked {
                return Err(AppError::NotAuthorized(format!(
                    "User {} is not the coach of client {}",
                    user.id, other
                ))
                .to_validation_response());
            }
            other
        }
        _ => user.id,
    };

    let workouts = list_workouts_for_client(db, client_id, date_from, params.completed)
        .await
        .validate_custom()?;

    Ok(Json(ScheduledWorkoutsResponse {
        scheduled_workouts: workouts
            .into_iter()
            .map(ScheduledWorkoutResponse::from)
            .collect(),
    }))
}

#[derive(Serialize, Deserialize)]
pub struct ExerciseProgressResponse {
    pub exercise_spec_id: i64,
    pub exercise_name: String,
    pub set_count: i64,
    pub completed_sets: i64,
    pub notes: Option<String>,
    pub is_completed: bool,
}

impl From<ExerciseProgress> for ExerciseProgressResponse {
    fn from(e: ExerciseProgress) -> Self {
        Self {
            exercise_spec_id: e.exercise_spec_id,
            exercise_name: e.exercise_name,
            set_count: e.set_count,
            completed_sets: e.completed_sets,
            notes: e.notes,
            is_completed: e.is_completed,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ProgressResponse {
    pub scheduled_workout_id: i64,
    pub entries: Vec<ExerciseProgressResponse>,
    pub completion_percentage: f64,
    pub is_completed: bool,
}

impl From<WorkoutProgress> for ProgressResponse {
    fn from(p: WorkoutProgress) -> Self {
        Self {
            scheduled_workout_id: p.scheduled_workout_id,
            entries: p
                .entries
                .into_iter()
                .map(ExerciseProgressResponse::from)
                .collect(),
            completion_percentage: p.completion_percentage,
            is_completed: p.is_completed,
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct RecordProgressRequest {
    #[validate(range(min = 0, message = "Completed sets cannot be negative"))]
    completed_sets: i64,
    notes: Option<String>,
}

#[post("/scheduled_workouts/<id>/exercises/<spec_id>/complete", data = "<request>")]
pub async fn api_record_progress(
    id: i64,
    spec_id: i64,
    request: Json<RecordProgressRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ProgressResponse> {
    let validated = request.validate_custom()?;

    let progress = record_progress(
        db,
        &user,
        id,
        spec_id,
        validated.completed_sets,
        validated.notes.as_deref(),
    )
    .await
    .validate_custom()?;

    Ok(Json(ProgressResponse::from(progress)))
}

#[post("/scheduled_workouts/<id>/exercises/<spec_id>/uncomplete")]
pub async fn api_uncomplete_exercise(
    id: i64,
    spec_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ProgressResponse> {
    let progress = uncomplete_exercise(db, &user, id, spec_id)
        .await
        .validate_custom()?;

    Ok(Json(ProgressResponse::from(progress)))
}

#[post("/scheduled_workouts/<id>/complete_all")]
pub async fn api_complete_all(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ScheduledWorkoutResponse> {
    let workout = complete_workout(db, &user, id).await.validate_custom()?;
    Ok(Json(ScheduledWorkoutResponse::from(workout)))
}

#[get("/scheduled_workouts/<id>/progress")]
pub async fn api_get_progress(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ProgressResponse> {
    let progress = get_progress(db, &user, id).await.validate_custom()?;
    Ok(Json(ProgressResponse::from(progress)))
}

// ---------------------------------------------------------------------------
// Plan templates (read surface + self-service apply)
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct ExerciseSpecResponse {
    pub id: i64,
    pub exercise_name: String,
    pub set_count: i64,
    pub rep_count: i64,
    pub rest_seconds: i64,
    pub calories: i64,
    pub position: i64,
}

#[derive(Serialize, Deserialize)]
pub struct DailyPlanResponse {
    pub id: i64,
    pub day_slot: i64,
    pub title: String,
    pub calories: i64,
    pub exercises: Vec<ExerciseSpecResponse>,
}

#[derive(Serialize, Deserialize)]
pub struct PlanTemplateResponse {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub total_calories: i64,
    pub days: Vec<DailyPlanResponse>,
}

#[derive(Serialize, Deserialize)]
pub struct PlanTemplatesResponse {
    pub plans: Vec<PlanTemplateResponse>,
}

async fn plan_template_response(
    db: &Pool<Sqlite>,
    template_id: i64,
) -> Result<PlanTemplateResponse, AppError> {
    let template = get_plan_template(db, template_id).await?;
    let daily_plans = get_daily_plans(db, template_id).await?;

    let mut days = Vec::with_capacity(daily_plans.len());
    for plan in daily_plans {
        let specs = get_exercise_specs(db, plan.id).await?;
        days.push(DailyPlanResponse {
            id: plan.id,
            day_slot: plan.day_slot,
            title: plan.title,
            calories: specs.iter().map(|s| s.calories).sum(),
            exercises: specs
                .into_iter()
                .map(|s| ExerciseSpecResponse {
                    id: s.id,
                    exercise_name: s.exercise_name,
                    set_count: s.set_count,
                    rep_count: s.rep_count,
                    rest_seconds: s.rest_seconds,
                    calories: s.calories,
                    position: s.position,
                })
                .collect(),
        });
    }

    Ok(PlanTemplateResponse {
        id: template.id,
        name: template.name,
        owner_id: template.owner_id,
        total_calories: template_calorie_total(db, template_id).await?,
        days,
    })
}

#[get("/plans")]
pub async fn api_list_plans(
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<PlanTemplatesResponse> {
    let templates = list_plan_templates(db).await.validate_custom()?;

    let mut plans = Vec::with_capacity(templates.len());
    for template in templates {
        plans.push(plan_template_response(db, template.id).await.validate_custom()?);
    }

    Ok(Json(PlanTemplatesResponse { plans }))
}

#[get("/plans/<id>")]
pub async fn api_get_plan(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<PlanTemplateResponse> {
    Ok(Json(plan_template_response(db, id).await.validate_custom()?))
}

#[derive(Deserialize, Validate)]
pub struct ApplyPlanRequest {
    start_date: NaiveDate,
    #[validate(length(min = 1, message = "At least one weekday must be selected"))]
    selected_weekdays: Vec<String>,
    #[validate(range(min = 1, max = 52, message = "Weeks count must be between 1 and 52"))]
    weeks_count: i64,
}

#[post("/plans/<id>/apply", data = "<request>")]
pub async fn api_apply_plan(
    id: i64,
    request: Json<ApplyPlanRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ScheduledWorkoutsResponse> {
    let validated = request.validate_custom()?;
    let weekdays = parse_weekdays(&validated.selected_weekdays).validate_custom()?;

    let workouts = apply_plan(
        db,
        &user,
        id,
        validated.start_date,
        &weekdays,
        validated.weeks_count,
    )
    .await
    .validate_custom()?;

    Ok(Json(ScheduledWorkoutsResponse {
        scheduled_workouts: workouts
            .into_iter()
            .map(ScheduledWorkoutResponse::from)
            .collect(),
    }))
}
