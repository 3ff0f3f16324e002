use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::AppError;
use crate::models::DailyPlan;

pub const MIN_WEEKS: i64 = 1;
pub const MAX_WEEKS: i64 = 52;

/// One not-yet-persisted occurrence of a daily plan on a concrete date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledWorkoutDraft {
    pub daily_plan_id: i64,
    pub scheduled_date: NaiveDate,
    pub week_number: i64,
}

/// Expands a template's daily plans across the selected weekdays.
///
/// Iteration runs over `weeks_count` Monday-based calendar weeks starting
/// with the week containing `start_date`. Within each week, every selected
/// weekday whose concrete date falls on or after `start_date` yields one
/// draft; dates before `start_date` in the partial first week are skipped,
/// never emitted early. Emitted occurrences, ordered by date, take the daily
/// plans round-robin in day-slot order: occurrence `i` gets plan
/// `i % plan_count`, cycling whichever side runs out first. The week number
/// is relative to `start_date` itself (`1 + days_since_start / 7`), not to
/// the calendar week grid.
///
/// Pure and fully deterministic for identical input, which is what makes
/// re-generation (and therefore retried accepts) idempotent.
pub fn generate(
    daily_plans: &[DailyPlan],
    selected_weekdays: &[Weekday],
    weeks_count: i64,
    start_date: NaiveDate,
) -> Result<Vec<ScheduledWorkoutDraft>, AppError> {
    let weekdays = normalize_weekdays(selected_weekdays);
    if weekdays.is_empty() {
        return Err(AppError::InvalidScheduleInput(
            "At least one weekday must be selected".to_string(),
        ));
    }
    if !(MIN_WEEKS..=MAX_WEEKS).contains(&weeks_count) {
        return Err(AppError::InvalidScheduleInput(format!(
            "Weeks count must be between {} and {}, got {}",
            MIN_WEEKS, MAX_WEEKS, weeks_count
        )));
    }
    if daily_plans.is_empty() {
        return Err(AppError::InvalidScheduleInput(
            "Template has no daily plans".to_string(),
        ));
    }

    let first_monday =
        start_date - Duration::days(start_date.weekday().num_days_from_monday() as i64);

    let mut drafts = Vec::new();
    let mut occurrence = 0usize;

    for week in 0..weeks_count {
        let week_monday = first_monday + Duration::days(7 * week);
        for weekday in &weekdays {
            let date = week_monday + Duration::days(weekday.num_days_from_monday() as i64);
            if date < start_date {
                continue;
            }

            let days_since_start = date.signed_duration_since(start_date).num_days();
            drafts.push(ScheduledWorkoutDraft {
                daily_plan_id: daily_plans[occurrence % daily_plans.len()].id,
                scheduled_date: date,
                week_number: 1 + days_since_start / 7,
            });
            occurrence += 1;
        }
    }

    Ok(drafts)
}

/// Canonical weekday ordering used everywhere: Monday-first, deduplicated.
pub fn normalize_weekdays(weekdays: &[Weekday]) -> Vec<Weekday> {
    let mut normalized: Vec<Weekday> = weekdays.to_vec();
    normalized.sort_by_key(|w| w.num_days_from_monday());
    normalized.dedup();
    normalized
}

pub fn parse_weekdays(names: &[String]) -> Result<Vec<Weekday>, AppError> {
    let mut weekdays = Vec::with_capacity(names.len());
    for name in names {
        let weekday = name.trim().parse::<Weekday>().map_err(|_| {
            AppError::Validation(format!("Unknown weekday: '{}'", name))
        })?;
        weekdays.push(weekday);
    }
    Ok(normalize_weekdays(&weekdays))
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

pub fn weekdays_to_csv(weekdays: &[Weekday]) -> String {
    normalize_weekdays(weekdays)
        .iter()
        .map(|w| weekday_name(*w))
        .collect::<Vec<_>>()
        .join(",")
}

/// Rows are only ever written through `weekdays_to_csv`; an entry that does
/// not parse back came from outside the application and is dropped.
pub fn weekdays_from_csv(csv: &str) -> Vec<Weekday> {
    let weekdays: Vec<Weekday> = csv
        .split(',')
        .filter_map(|part| part.trim().parse::<Weekday>().ok())
        .collect();
    normalize_weekdays(&weekdays)
}
