#[macro_use]
extern crate rocket;

mod api;
mod assignment;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod schedule;
mod telemetry;
mod tracker;
mod validation;
#[cfg(test)]
mod test;

use api::{
    api_accept_assignment, api_apply_plan, api_cancel_assignment, api_complete_all,
    api_complete_assignment, api_create_assignment, api_get_plan, api_get_progress,
    api_list_assignments, api_list_plans, api_list_scheduled_workouts, api_login, api_logout,
    api_me, api_me_unauthorized, api_overdue_assignment, api_record_progress,
    api_reject_assignment, api_sweep_overdue, api_uncomplete_exercise, api_withdraw_assignment,
    health,
};
use auth::unauthorized_api;
use db::clean_expired_sessions;
use error::AppError;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, tokio};
use telemetry::{TelemetryFairing, init_telemetry, shutdown_telemetry};
use thiserror::Error;

use sqlx::SqlitePool;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_telemetry();

    let pool = SqlitePool::connect(&env::database_url())
        .await
        .expect("Failed to connect to SQLite database");

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting workout tracker");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_me,
                api_me_unauthorized,
                api_create_assignment,
                api_accept_assignment,
                api_reject_assignment,
                api_withdraw_assignment,
                api_complete_assignment,
                api_cancel_assignment,
                api_overdue_assignment,
                api_sweep_overdue,
                api_list_assignments,
                api_list_scheduled_workouts,
                api_record_progress,
                api_uncomplete_exercise,
                api_complete_all,
                api_get_progress,
                api_list_plans,
                api_get_plan,
                api_apply_plan,
            ],
        )
        .register("/api", catchers![unauthorized_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async {
                shutdown_telemetry();
            })
        }))
}
