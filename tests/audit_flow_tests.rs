// tests/audit_flow_tests.rs
//
// End-to-end flows against a real Postgres. Run with
// `DATABASE_URL=... cargo test -- --ignored`.

use audit_backend::{
    config::Config,
    models::user::UserRole,
    routes,
    state::AppState,
    utils::{hash::hash_password, jwt::sign_jwt},
};
use serde_json::{Value, json};
use sqlx::{PgPool, postgres::PgPoolOptions};

const SECRET: &str = "audit_flow_test_secret";

struct TestApp {
    address: String,
    pool: PgPool,
    client: reqwest::Client,
    admin_token: String,
}

async fn spawn_app() -> TestApp {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        port: 0,
        cors_origins: Vec::new(),
        admin_email: None,
        admin_password: None,
    };

    let app = routes::create_router(AppState::new(pool.clone(), config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let admin_email = format!("admin_{}@example.com", unique());
    let admin_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (email, password, role) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&admin_email)
    .bind(hash_password("admin-password").unwrap())
    .bind(UserRole::Admin)
    .fetch_one(&pool)
    .await
    .unwrap();

    TestApp {
        address,
        pool,
        client: reqwest::Client::new(),
        admin_token: sign_jwt(admin_id, UserRole::Admin, SECRET, 600).unwrap(),
    }
}

fn unique() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("Failed to execute request");
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn admin_post(&self, path: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, &self.admin_token, Some(body))
            .await
    }

    /// Company, auditor account (logged in through the API), template and
    /// assignment for one audit type.
    async fn setup(&self, audit_type: &str) -> (String, Value) {
        let (status, company) = self
            .admin_post("/api/admin/companies", json!({"name": format!("Acme {}", unique())}))
            .await;
        assert_eq!(status, 201);
        let company_id = company["id"].as_i64().unwrap();

        let email = format!("auditor_{}@example.com", unique());
        let (status, _) = self
            .admin_post(
                "/api/admin/users",
                json!({
                    "email": email,
                    "password": "auditor-password",
                    "role": "AUDITOR",
                    "company_id": company_id
                }),
            )
            .await;
        assert_eq!(status, 201);

        let login: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({"email": email, "password": "auditor-password"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(login["type"], "Bearer");
        let auditor_token = login["token"].as_str().unwrap().to_string();

        let (status, template) = self
            .admin_post(
                "/api/admin/audit-templates",
                json!({
                    "name": format!("{} {}", audit_type, unique()),
                    "audit_type_definition_key": audit_type
                }),
            )
            .await;
        assert_eq!(status, 201);

        let (status, assignment) = self
            .admin_post(
                "/api/admin/audit-assignments",
                json!({
                    "title": "Monthly walk-through",
                    "audit_template_id": template["id"],
                    "company_id": company_id
                }),
            )
            .await;
        assert_eq!(status, 201);
        assert_eq!(
            assignment["assigned_questions"].as_array().unwrap().len(),
            template["question_templates"].as_array().unwrap().len()
        );

        (auditor_token, assignment)
    }
}

fn question_ids(assignment: &Value, question_type: &str) -> Vec<i64> {
    assignment["assigned_questions"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|q| q["question_type"] == question_type)
        .map(|q| q["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
#[ignore]
async fn five_s_draft_then_submit() {
    let app = spawn_app().await;
    let (auditor_token, assignment) = app.setup("FIVE_S_AUDIT").await;
    let assignment_id = assignment["id"].as_i64().unwrap();
    assert_eq!(assignment["assigned_questions"].as_array().unwrap().len(), 6);

    let ratings = question_ids(&assignment, "RATING_SCALE");
    assert_eq!(ratings.len(), 5);

    let answers: Vec<Value> = ratings
        .iter()
        .zip([5, 4, 3, 2, 1])
        .map(|(id, value)| json!({"assigned_question_id": id, "answer_value": value}))
        .collect();

    let responses_path = format!("/api/audit-assignments/{}/responses", assignment_id);
    let (status, draft) = app
        .send(
            reqwest::Method::POST,
            &responses_path,
            &auditor_token,
            Some(json!({"status": "DRAFT", "answers": answers})),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(draft["status"], "DRAFT");
    assert!(draft["score"].is_null());
    assert!(draft["submission_date"].is_null());
    assert_eq!(draft["answers"].as_array().unwrap().len(), 5);

    let (_, current) = app
        .send(
            reqwest::Method::GET,
            &format!("/api/audit-assignments/{}", assignment_id),
            &auditor_token,
            None,
        )
        .await;
    assert_eq!(current["status"], "IN_PROGRESS");

    let response_path = format!("{}/{}", responses_path, draft["id"]);
    let (status, submitted) = app
        .send(
            reqwest::Method::PUT,
            &response_path,
            &auditor_token,
            Some(json!({"status": "SUBMITTED"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(submitted["status"], "SUBMITTED");
    assert_eq!(submitted["score"].as_f64(), Some(60.0));
    assert!(submitted["submission_date"].is_string());

    let (_, current) = app
        .send(
            reqwest::Method::GET,
            &format!("/api/audit-assignments/{}", assignment_id),
            &auditor_token,
            None,
        )
        .await;
    assert_eq!(current["status"], "COMPLETED");

    // Submitted responses belong to admins now.
    let (status, _) = app
        .send(
            reqwest::Method::PUT,
            &response_path,
            &auditor_token,
            Some(json!({"overall_comments": "late edit"})),
        )
        .await;
    assert_eq!(status, 403);

    // Admin raises every rating to 5 and the score follows.
    let full: Vec<Value> = ratings
        .iter()
        .map(|id| json!({"assigned_question_id": id, "answer_value": 5}))
        .collect();
    let (status, rescored) = app
        .send(
            reqwest::Method::PUT,
            &response_path,
            &app.admin_token,
            Some(json!({"answers": full})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(rescored["score"].as_f64(), Some(100.0));

    // Moving back to draft clears the score.
    let (status, reverted) = app
        .send(
            reqwest::Method::PUT,
            &response_path,
            &app.admin_token,
            Some(json!({"status": "DRAFT"})),
        )
        .await;
    assert_eq!(status, 200);
    assert!(reverted["score"].is_null());
    assert!(reverted["submission_date"].is_null());
}

#[tokio::test]
#[ignore]
async fn five_s_out_of_range_answer_rejects_the_response() {
    let app = spawn_app().await;
    let (auditor_token, assignment) = app.setup("FIVE_S_AUDIT").await;
    let assignment_id = assignment["id"].as_i64().unwrap();
    let ratings = question_ids(&assignment, "RATING_SCALE");

    let (status, body) = app
        .send(
            reqwest::Method::POST,
            &format!("/api/audit-assignments/{}/responses", assignment_id),
            &auditor_token,
            Some(json!({
                "status": "SUBMITTED",
                "answers": [
                    {"assigned_question_id": ratings[0], "answer_value": 3},
                    {"assigned_question_id": ratings[1], "answer_value": 6}
                ]
            })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Answer for rating scale must be between 1 and 5.");

    let stored = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM audit_responses WHERE audit_assignment_id = $1",
    )
    .bind(assignment_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
#[ignore]
async fn security_checklist_submission_scores_yes_answers() {
    let app = spawn_app().await;
    let (auditor_token, assignment) = app.setup("SECURITY_CHECKLIST_AUDIT").await;
    let assignment_id = assignment["id"].as_i64().unwrap();
    assert_eq!(assignment["assigned_questions"].as_array().unwrap().len(), 5);

    let checks = question_ids(&assignment, "YES_NO");
    assert_eq!(checks.len(), 4);
    let text = question_ids(&assignment, "TEXT");

    let mut answers: Vec<Value> = checks
        .iter()
        .zip([true, true, false, true])
        .map(|(id, value)| json!({"assigned_question_id": id, "answer_value": value}))
        .collect();
    answers.push(json!({"assigned_question_id": text[0], "answer_value": "Badge reader at gate 2 is flaky"}));

    let (status, submitted) = app
        .send(
            reqwest::Method::POST,
            &format!("/api/audit-assignments/{}/responses", assignment_id),
            &auditor_token,
            Some(json!({"status": "SUBMITTED", "answers": answers})),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(submitted["score"].as_f64(), Some(75.0));

    // Admins can read the assignment but only auditors answer it.
    let (status, body) = app
        .send(
            reqwest::Method::POST,
            &format!("/api/audit-assignments/{}/responses", assignment_id),
            &app.admin_token,
            Some(json!({"status": "DRAFT"})),
        )
        .await;
    assert_eq!(status, 403, "{body}");
}

#[tokio::test]
#[ignore]
async fn security_checklist_questions_are_checked_against_the_audit_type() {
    let app = spawn_app().await;
    let (status, template) = app
        .admin_post(
            "/api/admin/audit-templates",
            json!({
                "name": format!("Security {}", unique()),
                "audit_type_definition_key": "SECURITY_CHECKLIST_AUDIT"
            }),
        )
        .await;
    assert_eq!(status, 201);
    let questions_path = format!("/api/admin/audit-templates/{}/questions", template["id"]);

    let (status, body) = app
        .admin_post(
            &questions_path,
            json!({
                "text": "Is the server room locked?",
                "question_type": "YES_NO",
                "options": ["Yes", "No"],
                "order": 10,
                "scoring_weight": 1.0
            }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "YES_NO questions should not have options defined.");

    let (status, _) = app
        .admin_post(
            &questions_path,
            json!({
                "text": "Rate the lighting",
                "question_type": "RATING_SCALE",
                "options": {"min": 1, "max": 5},
                "order": 11
            }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, created) = app
        .admin_post(
            &questions_path,
            json!({
                "text": "Is the server room locked?",
                "question_type": "YES_NO",
                "order": 12,
                "section_id": "physical_security",
                "scoring_weight": 2.0
            }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(created["scoring_weight"].as_f64(), Some(2.0));
}

#[tokio::test]
#[ignore]
async fn bogus_audit_type_writes_nothing() {
    let app = spawn_app().await;
    let name = format!("Bogus {}", unique());

    let (status, _) = app
        .admin_post(
            "/api/admin/audit-templates",
            json!({"name": name, "audit_type_definition_key": "BOGUS_TYPE"}),
        )
        .await;
    assert_eq!(status, 400);

    let stored = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_templates WHERE name = $1")
        .bind(&name)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
#[ignore]
async fn template_edits_do_not_reach_existing_assignments() {
    let app = spawn_app().await;
    let (_, assignment) = app.setup("FIVE_S_AUDIT").await;
    let template_id = assignment["audit_template_id"].as_i64().unwrap();

    let (_, template) = app
        .send(
            reqwest::Method::GET,
            &format!("/api/audit-templates/{}", template_id),
            &app.admin_token,
            None,
        )
        .await;
    let first = &template["question_templates"][0];

    let (status, _) = app
        .send(
            reqwest::Method::PUT,
            &format!("/api/admin/audit-templates/{}/questions/{}", template_id, first["id"]),
            &app.admin_token,
            Some(json!({"text": "Rewritten question"})),
        )
        .await;
    assert_eq!(status, 200);

    let (_, snapshot) = app
        .send(
            reqwest::Method::GET,
            &format!("/api/audit-assignments/{}/questions", assignment["id"]),
            &app.admin_token,
            None,
        )
        .await;
    assert_eq!(snapshot[0]["text"], first["text"]);
    assert_eq!(snapshot[0]["original_question_template_id"], first["id"]);

    let (status, _) = app
        .send(
            reqwest::Method::PUT,
            &format!(
                "/api/admin/audit-assignments/{}/questions/{}",
                assignment["id"], snapshot[0]["id"]
            ),
            &app.admin_token,
            Some(json!({"question_type": "TEXT"})),
        )
        .await;
    assert_eq!(status, 400);
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("score should be set");
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

#[tokio::test]
#[ignore]
async fn snapshot_edits_rescore_submitted_responses() {
    let app = spawn_app().await;
    let (auditor_token, assignment) = app.setup("FIVE_S_AUDIT").await;
    let assignment_id = assignment["id"].as_i64().unwrap();
    let ratings = question_ids(&assignment, "RATING_SCALE");

    let answers: Vec<Value> = ratings
        .iter()
        .zip([5, 4, 3, 2, 1])
        .map(|(id, value)| json!({"assigned_question_id": id, "answer_value": value}))
        .collect();
    let responses_path = format!("/api/audit-assignments/{}/responses", assignment_id);
    let (status, submitted) = app
        .send(
            reqwest::Method::POST,
            &responses_path,
            &auditor_token,
            Some(json!({"status": "SUBMITTED", "answers": answers})),
        )
        .await;
    assert_eq!(status, 201);
    assert_close(submitted["score"].as_f64(), 60.0);
    let response_path = format!("{}/{}", responses_path, submitted["id"]);

    // Dropping the question answered 1 leaves 14 of 20.
    let (status, _) = app
        .send(
            reqwest::Method::DELETE,
            &format!("/api/admin/audit-assignments/{}/questions/{}", assignment_id, ratings[4]),
            &app.admin_token,
            None,
        )
        .await;
    assert_eq!(status, 204);

    let (_, stored) = app
        .send(reqwest::Method::GET, &response_path, &auditor_token, None)
        .await;
    assert_eq!(stored["answers"].as_array().unwrap().len(), 4);
    assert_close(stored["score"].as_f64(), 70.0);

    // Widening the first scale to 10 makes it 14 of 25.
    let (status, _) = app
        .send(
            reqwest::Method::PUT,
            &format!("/api/admin/audit-assignments/{}/questions/{}", assignment_id, ratings[0]),
            &app.admin_token,
            Some(json!({"options": {"min": 1, "max": 10}})),
        )
        .await;
    assert_eq!(status, 200);

    let (_, stored) = app
        .send(reqwest::Method::GET, &response_path, &auditor_token, None)
        .await;
    assert_close(stored["score"].as_f64(), 56.0);
}

#[tokio::test]
#[ignore]
async fn users_manage_their_own_account() {
    let app = spawn_app().await;
    let (auditor_token, _) = app.setup("FIVE_S_AUDIT").await;

    let (status, me) = app
        .send(
            reqwest::Method::PATCH,
            "/api/users/me",
            &auditor_token,
            Some(json!({"full_name": "Ada Auditor"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(me["full_name"], "Ada Auditor");
    let email = me["email"].as_str().unwrap().to_string();

    // Taking someone else's email is a conflict.
    let (_, admin) = app
        .send(reqwest::Method::GET, "/api/users/me", &app.admin_token, None)
        .await;
    let (status, _) = app
        .send(
            reqwest::Method::PATCH,
            "/api/users/me",
            &auditor_token,
            Some(json!({"email": admin["email"]})),
        )
        .await;
    assert_eq!(status, 409);

    let password_path = "/api/users/me/password";
    let (status, body) = app
        .send(
            reqwest::Method::PATCH,
            password_path,
            &auditor_token,
            Some(json!({"current_password": "wrong-password", "new_password": "brand-new-password"})),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Incorrect password");

    let (status, body) = app
        .send(
            reqwest::Method::PATCH,
            password_path,
            &auditor_token,
            Some(json!({"current_password": "auditor-password", "new_password": "auditor-password"})),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "New password cannot be the same as the current one");

    let (status, _) = app
        .send(
            reqwest::Method::PATCH,
            password_path,
            &auditor_token,
            Some(json!({"current_password": "auditor-password", "new_password": "brand-new-password"})),
        )
        .await;
    assert_eq!(status, 200);

    let login = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({"email": email, "password": "brand-new-password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status().as_u16(), 200);

    let (status, _) = app
        .send(reqwest::Method::DELETE, "/api/users/me", &app.admin_token, None)
        .await;
    assert_eq!(status, 403);

    let (status, _) = app
        .send(reqwest::Method::DELETE, "/api/users/me", &auditor_token, None)
        .await;
    assert_eq!(status, 204);

    let (status, _) = app
        .send(reqwest::Method::GET, "/api/users/me", &auditor_token, None)
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
#[ignore]
async fn company_assignments_are_listed_per_tenant() {
    let app = spawn_app().await;
    let (_, assignment) = app.setup("FIVE_S_AUDIT").await;
    let (outsider_token, _) = app.setup("FIVE_S_AUDIT").await;
    let company_path = format!("/api/audit-assignments/company/{}", assignment["company_id"]);

    let (status, page) = app
        .send(reqwest::Method::GET, &company_path, &app.admin_token, None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(page["count"], 1);
    assert_eq!(page["data"][0]["id"], assignment["id"]);

    let (status, _) = app
        .send(reqwest::Method::GET, &company_path, &outsider_token, None)
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
#[ignore]
async fn single_questions_can_be_fetched() {
    let app = spawn_app().await;
    let (auditor_token, assignment) = app.setup("SECURITY_CHECKLIST_AUDIT").await;
    let template_id = assignment["audit_template_id"].as_i64().unwrap();
    let snapshot = &assignment["assigned_questions"][0];

    let (status, question) = app
        .send(
            reqwest::Method::GET,
            &format!(
                "/api/audit-templates/{}/questions/{}",
                template_id, snapshot["original_question_template_id"]
            ),
            &auditor_token,
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(question["text"], snapshot["text"]);

    let question_path = format!("/api/audit-assignments/{}/questions/{}", assignment["id"], snapshot["id"]);
    let (status, question) = app
        .send(reqwest::Method::GET, &question_path, &auditor_token, None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(question["id"], snapshot["id"]);

    let (status, _) = app
        .send(
            reqwest::Method::GET,
            &format!("/api/audit-assignments/{}/questions/0", assignment["id"]),
            &auditor_token,
            None,
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
#[ignore]
async fn company_with_members_cannot_be_deleted() {
    let app = spawn_app().await;
    let (_, company) = app
        .admin_post("/api/admin/companies", json!({"name": format!("Members {}", unique())}))
        .await;
    let (status, user) = app
        .admin_post(
            "/api/admin/users",
            json!({
                "email": format!("user_{}@example.com", unique()),
                "password": "user-password",
                "role": "USER",
                "company_id": company["id"]
            }),
        )
        .await;
    assert_eq!(status, 201);

    let company_path = format!("/api/admin/companies/{}", company["id"]);
    let (status, body) = app
        .send(reqwest::Method::DELETE, &company_path, &app.admin_token, None)
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Cannot delete a company that still has users");

    let (status, _) = app
        .send(
            reqwest::Method::DELETE,
            &format!("/api/admin/users/{}", user["id"]),
            &app.admin_token,
            None,
        )
        .await;
    assert_eq!(status, 204);

    let (status, _) = app
        .send(reqwest::Method::DELETE, &company_path, &app.admin_token, None)
        .await;
    assert_eq!(status, 204);
}

#[tokio::test]
#[ignore]
async fn assignment_area_and_question_section_can_be_cleared() {
    let app = spawn_app().await;
    let (_, assignment) = app.setup("FIVE_S_AUDIT").await;
    let assignment_path = format!("/api/admin/audit-assignments/{}", assignment["id"]);

    let (status, area) = app
        .admin_post(
            &format!("/api/admin/companies/{}/areas", assignment["company_id"]),
            json!({"name": "Warehouse"}),
        )
        .await;
    assert_eq!(status, 201);

    let (status, scoped) = app
        .send(
            reqwest::Method::PUT,
            &assignment_path,
            &app.admin_token,
            Some(json!({"area_id": area["id"]})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(scoped["area_id"], area["id"]);

    let (status, untouched) = app
        .send(
            reqwest::Method::PUT,
            &assignment_path,
            &app.admin_token,
            Some(json!({"title": "Renamed walk-through"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(untouched["area_id"], area["id"]);

    let (status, cleared) = app
        .send(
            reqwest::Method::PUT,
            &assignment_path,
            &app.admin_token,
            Some(json!({"area_id": null})),
        )
        .await;
    assert_eq!(status, 200);
    assert!(cleared["area_id"].is_null());

    let snapshot = &assignment["assigned_questions"][0];
    assert!(snapshot["section_id"].is_string());
    let (status, question) = app
        .send(
            reqwest::Method::PUT,
            &format!("{}/questions/{}", assignment_path, snapshot["id"]),
            &app.admin_token,
            Some(json!({"section_id": null})),
        )
        .await;
    assert_eq!(status, 200);
    assert!(question["section_id"].is_null());
}
