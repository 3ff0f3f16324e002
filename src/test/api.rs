#[cfg(test)]
mod tests {
    use crate::api::{
        AcceptAssignmentResponse, AssignmentResponse, LoginResponse, ProgressResponse,
        ScheduledWorkoutResponse, ScheduledWorkoutsResponse,
    };
    use crate::test::test_utils::{create_standard_test_db, login_test_user, setup_test_client};
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    #[rocket::async_test]
    async fn test_login_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "coach_user",
                    "password": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();

        assert!(login_response.success);
        assert!(login_response.user.is_some());
        assert_eq!(login_response.user.unwrap().username, "coach_user");

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "coach_user",
                    "password": "wrong_password"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();

        assert!(!login_response.success);
        assert!(login_response.error.is_some());
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let endpoints = vec![
            "/api/me",
            "/api/assignments",
            "/api/scheduled_workouts",
            "/api/plans",
        ];

        for endpoint in endpoints {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }
    }

    #[rocket::async_test]
    async fn test_health_endpoint() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }

    #[rocket::async_test]
    async fn test_assignment_lifecycle_over_http() {
        let test_db = create_standard_test_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();
        let (client, _) = setup_test_client(test_db).await;

        // Coach offers the plan.
        login_test_user(&client, "coach_user").await;

        let response = client
            .post("/api/assignments")
            .header(ContentType::JSON)
            .body(
                json!({
                    "client_id": client_id,
                    "template_id": template_id,
                    "selected_weekdays": ["monday", "wednesday"],
                    "weeks_count": 2,
                    "suggested_start_date": "2025-06-02",
                    "due_date": "2025-08-01",
                    "notes": "First block"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let assignment: AssignmentResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(assignment.status, "assigned");
        assert_eq!(assignment.selected_weekdays, vec!["monday", "wednesday"]);

        client.post("/api/logout").dispatch().await;

        // Client accepts with adjusted weekdays.
        login_test_user(&client, "client_user").await;

        let response = client
            .post(format!("/api/assignments/{}/accept", assignment.id))
            .header(ContentType::JSON)
            .body(
                json!({
                    "start_date": "2025-06-02",
                    "selected_weekdays": ["monday", "friday"],
                    "weeks_count": 2
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let accepted: AcceptAssignmentResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(accepted.assignment.status, "applied");
        assert_eq!(accepted.scheduled_workouts.len(), 4);

        // The schedule shows up in the client's listing.
        let response = client
            .get("/api/scheduled_workouts?completed=false")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let listed: ScheduledWorkoutsResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(listed.scheduled_workouts.len(), 4);

        // Record progress on the first session's first exercise.
        let workout = &accepted.scheduled_workouts[0];
        let response = client
            .get(format!("/api/scheduled_workouts/{}/progress", workout.id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let progress: ProgressResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let spec = &progress.entries[0];

        let response = client
            .post(format!(
                "/api/scheduled_workouts/{}/exercises/{}/complete",
                workout.id, spec.exercise_spec_id
            ))
            .header(ContentType::JSON)
            .body(json!({ "completed_sets": spec.set_count }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let progress: ProgressResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(progress.completion_percentage, 50.0);

        // Bulk-complete the whole session.
        let response = client
            .post(format!("/api/scheduled_workouts/{}/complete_all", workout.id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let completed: ScheduledWorkoutResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(completed.is_completed);

        // Accepting again is a no-op, not a conflict or a duplicate set.
        let response = client
            .post(format!("/api/assignments/{}/accept", assignment.id))
            .header(ContentType::JSON)
            .body(
                json!({
                    "start_date": "2025-06-02",
                    "selected_weekdays": ["monday", "friday"],
                    "weeks_count": 2
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let repeated: AcceptAssignmentResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(repeated.scheduled_workouts.len(), 4);
    }

    #[rocket::async_test]
    async fn test_reject_endpoint_reports_stale_state() {
        let test_db = create_standard_test_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, "coach_user").await;
        let response = client
            .post("/api/assignments")
            .header(ContentType::JSON)
            .body(
                json!({
                    "client_id": client_id,
                    "template_id": template_id,
                    "selected_weekdays": ["tuesday"],
                    "weeks_count": 1,
                    "suggested_start_date": "2025-06-02",
                    "due_date": "2025-08-01"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        let assignment: AssignmentResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        client.post("/api/logout").dispatch().await;
        login_test_user(&client, "client_user").await;

        let response = client
            .post(format!("/api/assignments/{}/reject", assignment.id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let rejected: AssignmentResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(rejected.status, "rejected");

        // A second reject sees the stale state and gets a conflict.
        let response = client
            .post(format!("/api/assignments/{}/reject", assignment.id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn test_validation_errors_are_field_keyed() {
        let test_db = create_standard_test_db().await;
        let client_id = test_db.user_id("client_user").unwrap();
        let template_id = test_db.template_id("Base Program").unwrap();
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, "coach_user").await;

        let response = client
            .post("/api/assignments")
            .header(ContentType::JSON)
            .body(
                json!({
                    "client_id": client_id,
                    "template_id": template_id,
                    "selected_weekdays": [],
                    "weeks_count": 0,
                    "suggested_start_date": "2025-06-02",
                    "due_date": "2025-08-01"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: serde_json::Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["status"], "error");
        assert!(body["errors"].get("selected_weekdays").is_some());
        assert!(body["errors"].get("weeks_count").is_some());
    }
}
