#[cfg(test)]
pub mod test_db {
    use crate::auth::{Role, User};
    use crate::db::{
        add_daily_plan, add_exercise_spec, create_plan_template, create_user, get_user,
        link_coach_client,
    };
    use crate::error::AppError;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        links: Vec<(String, String)>,
        templates: Vec<TestTemplate>,
        daily_plans: Vec<TestDailyPlan>,
        exercises: Vec<TestExercise>,
    }

    pub struct TestUser {
        pub username: String,
        pub display_name: Option<String>,
        pub role: Role,
    }

    pub struct TestTemplate {
        pub name: String,
        pub owner_username: Option<String>,
    }

    pub struct TestDailyPlan {
        pub template_name: String,
        pub day_slot: i64,
        pub title: String,
    }

    pub struct TestExercise {
        pub template_name: String,
        pub day_slot: i64,
        pub exercise_name: String,
        pub set_count: i64,
        pub rep_count: i64,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn client(mut self, username: &str, display_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                display_name: display_name.map(String::from),
                role: Role::Client,
            });
            self
        }

        pub fn coach(mut self, username: &str, display_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                display_name: display_name.map(String::from),
                role: Role::Coach,
            });
            self
        }

        pub fn admin(mut self, username: &str, display_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                display_name: display_name.map(String::from),
                role: Role::Admin,
            });
            self
        }

        pub fn link(mut self, coach_username: &str, client_username: &str) -> Self {
            self.links
                .push((coach_username.to_string(), client_username.to_string()));
            self
        }

        pub fn template(mut self, name: &str, owner_username: Option<&str>) -> Self {
            self.templates.push(TestTemplate {
                name: name.to_string(),
                owner_username: owner_username.map(String::from),
            });
            self
        }

        pub fn daily_plan(mut self, template_name: &str, day_slot: i64, title: &str) -> Self {
            self.daily_plans.push(TestDailyPlan {
                template_name: template_name.to_string(),
                day_slot,
                title: title.to_string(),
            });
            self
        }

        pub fn exercise(
            mut self,
            template_name: &str,
            day_slot: i64,
            exercise_name: &str,
            set_count: i64,
            rep_count: i64,
        ) -> Self {
            self.exercises.push(TestExercise {
                template_name: template_name.to_string(),
                day_slot,
                exercise_name: exercise_name.to_string(),
                set_count,
                rep_count,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut template_id_map: HashMap<String, i64> = HashMap::new();
            let mut daily_plan_id_map: HashMap<(String, i64), i64> = HashMap::new();

            for user in &self.users {
                let user_id = create_user(
                    &pool,
                    &user.username,
                    STANDARD_PASSWORD,
                    user.role.as_str(),
                    user.display_name.as_deref(),
                )
                .await?;

                user_id_map.insert(user.username.clone(), user_id);
            }

            for (coach_username, client_username) in &self.links {
                let coach_id = user_id_map[coach_username];
                let client_id = user_id_map[client_username];
                link_coach_client(&pool, coach_id, client_id).await?;
            }

            for template in &self.templates {
                let owner_id = match &template.owner_username {
                    Some(owner) => user_id_map.get(owner).copied(),
                    None => self
                        .users
                        .iter()
                        .find(|u| matches!(u.role, Role::Coach))
                        .map(|u| user_id_map[&u.username]),
                };

                let owner_id = owner_id.unwrap_or(1);
                let template_id = create_plan_template(&pool, &template.name, owner_id).await?;
                template_id_map.insert(template.name.clone(), template_id);
            }

            for plan in &self.daily_plans {
                let template_id = template_id_map[&plan.template_name];
                let daily_plan_id =
                    add_daily_plan(&pool, template_id, plan.day_slot, &plan.title).await?;
                daily_plan_id_map
                    .insert((plan.template_name.clone(), plan.day_slot), daily_plan_id);
            }

            let mut positions: HashMap<i64, i64> = HashMap::new();
            for exercise in &self.exercises {
                let daily_plan_id =
                    daily_plan_id_map[&(exercise.template_name.clone(), exercise.day_slot)];
                let position = positions.entry(daily_plan_id).or_insert(0);
                add_exercise_spec(
                    &pool,
                    daily_plan_id,
                    &exercise.exercise_name,
                    exercise.set_count,
                    exercise.rep_count,
                    60,
                    0,
                    *position,
                )
                .await?;
                *position += 1;
            }

            Ok(TestDb {
                pool,
                user_id_map,
                template_id_map,
                daily_plan_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub template_id_map: HashMap<String, i64>,
        pub daily_plan_id_map: HashMap<(String, i64), i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn template_id(&self, name: &str) -> Option<i64> {
            self.template_id_map.get(name).copied()
        }

        pub fn daily_plan_id(&self, template_name: &str, day_slot: i64) -> Option<i64> {
            self.daily_plan_id_map
                .get(&(template_name.to_string(), day_slot))
                .copied()
        }

        pub async fn user(&self, username: &str) -> Result<User, AppError> {
            let id = self
                .user_id(username)
                .ok_or_else(|| AppError::NotFound(format!("Test user {} not seeded", username)))?;
            get_user(&self.pool, id).await
        }
    }

    /// Coach, linked client, and one two-day template with three exercises.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .coach("coach_user", Some("Coach"))
            .client("client_user", Some("Client"))
            .link("coach_user", "client_user")
            .template("Base Program", Some("coach_user"))
            .daily_plan("Base Program", 1, "Push day")
            .daily_plan("Base Program", 2, "Pull day")
            .exercise("Base Program", 1, "Bench press", 3, 10)
            .exercise("Base Program", 1, "Overhead press", 3, 8)
            .exercise("Base Program", 2, "Deadlift", 5, 5)
            .build()
            .await
            .expect("Failed to build test database")
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::test_db::{STANDARD_PASSWORD, TestDb};
    use crate::init_rocket;
    use rocket::http::ContentType;
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    pub use super::test_db::{TestDbBuilder, create_standard_test_db};

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone()).await;
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build test client");
        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, username: &str) {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": username,
                    "password": STANDARD_PASSWORD
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status().code, 200, "Login failed for {}", username);
    }
}
