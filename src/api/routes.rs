use crate::analyzer::category::Category;
use crate::analyzer::metrics::InsightsReport;
use crate::analyzer::trends::Analytics;
use crate::analyzer::{self, GoalProgress};
use crate::api::ApiState;
use crate::api::auth::{self as auth_routes, AuthUser, bearer_token, required_text};
use crate::api::error::{ApiError, ApiResult};
use crate::db::{ActivityPatch, ActivityRow, GoalRow, NewActivity};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/api/auth/signup", post(auth_routes::signup))
        .route("/api/auth/login", post(auth_routes::login))
        .route("/api/activities", get(list_activities).post(create_activity))
        .route("/api/activities/insights", get(insights))
        .route("/api/activities/analytics", get(analytics))
        .route("/api/activities/goals", get(list_goals).post(set_goal))
        .route("/api/activities/goals/progress", get(goal_progress))
        .route(
            "/api/activities/:id",
            put(update_activity).delete(delete_activity),
        )
        .route("/api/admin/trigger-reports", post(trigger_reports))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

/// Hours arrive either as JSON numbers or as numeric strings such as `"1.50"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HoursInput {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityPayload {
    title: Option<String>,
    category: Option<String>,
    expected_time: Option<HoursInput>,
    actual_time: Option<HoursInput>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoalPayload {
    category: Option<String>,
    target_hours: Option<HoursInput>,
}

async fn banner() -> &'static str {
    "Personal Productivity & Focus Tracker API is running..."
}

async fn create_activity(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<ActivityPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(payload) = payload?;

    let activity = NewActivity {
        title: required_text(payload.title, "title")?,
        category: parse_category(&required_text(payload.category, "category")?)?,
        expected_time: parse_hours(require(payload.expected_time, "expectedTime")?, "expectedTime", false)?,
        actual_time: parse_hours(require(payload.actual_time, "actualTime")?, "actualTime", true)?,
        date: parse_date(&required_text(payload.date, "date")?)?,
    };

    let created = state.database.insert_activity(user.id, &activity)?;
    info!(user_id = user.id, activity_id = created.id, "activity created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Activity created successfully",
            "activityId": created.id,
            "activity": created,
        })),
    ))
}

async fn list_activities(
    State(state): State<ApiState>,
    user: AuthUser,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ActivityRow>>> {
    let Query(query) = query?;
    let date = optional_date(query.date.as_deref())?;

    Ok(Json(state.database.activities_for_user(user.id, date)?))
}

async fn update_activity(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<ActivityPayload>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let id = parse_activity_id(&id)?;
    let Json(payload) = payload?;

    let patch = ActivityPatch {
        title: payload
            .title
            .map(|title| required_text(Some(title), "title"))
            .transpose()?,
        category: payload
            .category
            .as_deref()
            .map(parse_category)
            .transpose()?,
        expected_time: payload
            .expected_time
            .map(|hours| parse_hours(hours, "expectedTime", false))
            .transpose()?,
        actual_time: payload
            .actual_time
            .map(|hours| parse_hours(hours, "actualTime", true))
            .transpose()?,
        date: payload.date.as_deref().map(parse_date).transpose()?,
    };

    if !state.database.update_activity(user.id, id, &patch)? {
        return Err(activity_not_found());
    }

    info!(user_id = user.id, activity_id = id, "activity updated");
    Ok(Json(json!({ "message": "Activity updated successfully" })))
}

async fn delete_activity(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_activity_id(&id)?;

    if !state.database.delete_activity(user.id, id)? {
        return Err(activity_not_found());
    }

    info!(user_id = user.id, activity_id = id, "activity deleted");
    Ok(Json(json!({ "message": "Activity deleted successfully" })))
}

async fn insights(
    State(state): State<ApiState>,
    user: AuthUser,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> ApiResult<Json<InsightsReport>> {
    let Query(query) = query?;
    let date = optional_date(query.date.as_deref())?;

    Ok(Json(analyzer::insights_for_user(&state.database, user.id, date)?))
}

async fn analytics(State(state): State<ApiState>, user: AuthUser) -> ApiResult<Json<Analytics>> {
    let today = Local::now().date_naive();
    Ok(Json(analyzer::analytics_for_user(&state.database, user.id, today)?))
}

async fn set_goal(
    State(state): State<ApiState>,
    user: AuthUser,
    payload: Result<Json<GoalPayload>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(payload) = payload?;

    let category = parse_category(&required_text(payload.category, "category")?)?;
    let target_hours = parse_hours(require(payload.target_hours, "targetHours")?, "targetHours", false)?;

    let goal = state.database.upsert_goal(user.id, category, target_hours)?;

    Ok(Json(json!({
        "message": "Goal updated successfully",
        "goal": goal,
    })))
}

async fn list_goals(State(state): State<ApiState>, user: AuthUser) -> ApiResult<Json<Vec<GoalRow>>> {
    Ok(Json(state.database.goals_for_user(user.id)?))
}

async fn goal_progress(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<GoalProgress>>> {
    let today = Local::now().date_naive();
    Ok(Json(analyzer::goal_progress_for_user(&state.database, user.id, today)?))
}

async fn trigger_reports(State(state): State<ApiState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    if let Some(expected) = state.admin_token.as_deref() {
        if bearer_token(&headers) != Some(expected) {
            return Err(ApiError::Forbidden("Admin token required".to_string()));
        }
    }

    let summary = state.reporter.run(Local::now().date_naive()).await?;

    Ok(Json(json!({
        "message": "Reports generation triggered",
        "sent": summary.sent,
        "skipped": summary.skipped,
        "failed": summary.failed,
    })))
}

fn require<T>(value: Option<T>, field: &str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::BadRequest(format!("Missing required field: {field}")))
}

fn parse_category(raw: &str) -> ApiResult<Category> {
    raw.parse::<Category>()
        .map_err(|error| ApiError::BadRequest(error.to_string()))
}

fn parse_hours(input: HoursInput, field: &str, allow_zero: bool) -> ApiResult<f64> {
    let hours = match input {
        HoursInput::Number(value) => value,
        HoursInput::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ApiError::BadRequest(format!("{field} must be a number")))?,
    };

    if !hours.is_finite() {
        return Err(ApiError::BadRequest(format!("{field} must be a number")));
    }
    if allow_zero && hours < 0.0 {
        return Err(ApiError::BadRequest(format!("{field} must not be negative")));
    }
    if !allow_zero && hours <= 0.0 {
        return Err(ApiError::BadRequest(format!("{field} must be greater than zero")));
    }

    Ok(hours)
}

fn parse_date(input: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid date format: {input}. Example: 2026-01-28"))
    })
}

fn optional_date(input: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    input
        .filter(|value| !value.trim().is_empty())
        .map(parse_date)
        .transpose()
}

fn parse_activity_id(raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid activity id: {raw}")))
}

fn activity_not_found() -> ApiError {
    ApiError::NotFound("Activity not found or not authorized".to_string())
}

#[cfg(test)]
mod tests {
    use super::router;
    use crate::api::ApiState;
    use crate::config::Config;
    use crate::db::Database;
    use crate::mailer::LogMailer;
    use crate::reporter::WeeklyReporter;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use chrono::{Duration, Local};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app(admin_token: Option<&str>) -> Router {
        let database = Arc::new(Database::open_in_memory().expect("db"));
        let reporter = Arc::new(WeeklyReporter::new(
            Arc::clone(&database),
            Arc::new(LogMailer),
            "noreply@example.com",
        ));
        let config = Config {
            jwt_secret: Some("route-test-secret-with-enough-length".to_string()),
            bcrypt_cost: 4,
            admin_token: admin_token.map(str::to_string),
            ..Config::default()
        };

        router(ApiState::new(&config, database, reporter).expect("state"))
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");

        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn signup(app: &Router, name: &str) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({
                "name": name,
                "email": format!("{}@example.com", name.to_lowercase()),
                "password": "secret-password",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().expect("token").to_string()
    }

    #[tokio::test]
    async fn activity_round_trip() {
        let app = test_app(None);
        let token = signup(&app, "Ada").await;

        let (status, created) = call(
            &app,
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({
                "title": "X",
                "category": "DSA",
                "expectedTime": 2,
                "actualTime": 1.5,
                "date": "2026-01-28",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["activityId"].as_i64().expect("id");

        let (status, listed) = call(
            &app,
            Method::GET,
            "/api/activities?date=2026-01-28",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let listed = listed.as_array().expect("array").clone();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["_id"], id);
        assert_eq!(listed[0]["title"], "X");
        assert_eq!(listed[0]["date"], "2026-01-28");

        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("/api/activities/{id}"),
            Some(&token),
            Some(json!({ "actualTime": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = call(&app, Method::GET, "/api/activities", Some(&token), None).await;
        assert_eq!(listed[0]["actualTime"], 3.0);
        assert_eq!(listed[0]["expectedTime"], 2.0);
        assert_eq!(listed[0]["title"], "X");
        assert_eq!(listed[0]["category"], "DSA");

        let uri = format!("/api/activities/{id}");
        let (status, _) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Activity not found or not authorized");
    }

    #[tokio::test]
    async fn validation_errors_name_the_field() {
        let app = test_app(None);
        let token = signup(&app, "Ada").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({ "title": "X", "category": "DSA", "actualTime": 1, "date": "2026-01-28" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required field: expectedTime");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({ "title": "X", "category": "Cooking", "expectedTime": 1, "actualTime": 1, "date": "2026-01-28" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().expect("message").contains("Unknown category"));

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({ "title": "X", "category": "DSA", "expectedTime": 1, "actualTime": 1, "date": "28/01/2026" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::GET,
            "/api/activities?date=yesterday",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accepts_hours_as_numeric_strings() {
        let app = test_app(None);
        let token = signup(&app, "Ada").await;

        let (status, created) = call(
            &app,
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({ "title": "Mock test", "category": "Aptitude", "expectedTime": "1.50", "actualTime": "0.00", "date": "2026-01-28" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["activity"]["expectedTime"], 1.5);
        assert_eq!(created["activity"]["actualTime"], 0.0);
    }

    #[tokio::test]
    async fn requests_without_valid_token_are_rejected() {
        let app = test_app(None);

        let (status, _) = call(&app, Method::GET, "/api/activities", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, Method::GET, "/api/activities", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn other_users_records_look_missing() {
        let app = test_app(None);
        let owner = signup(&app, "Ada").await;
        let intruder = signup(&app, "Eve").await;

        let (_, created) = call(
            &app,
            Method::POST,
            "/api/activities",
            Some(&owner),
            Some(json!({ "title": "X", "category": "Project", "expectedTime": 1, "actualTime": 1, "date": "2026-01-28" })),
        )
        .await;
        let uri = format!("/api/activities/{}", created["activityId"]);

        let (status, _) = call(
            &app,
            Method::PUT,
            &uri,
            Some(&intruder),
            Some(json!({ "title": "hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&intruder), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, listed) = call(&app, Method::GET, "/api/activities", Some(&intruder), None).await;
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn signup_and_login_flow() {
        let app = test_app(None);
        signup(&app, "Ada").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({ "name": "Ada", "email": "ada@example.com", "password": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User already exists");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "secret-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().expect("token");

        let (status, _) = call(&app, Method::GET, "/api/activities/goals", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn insights_distinguish_no_data_from_no_deviation() {
        let app = test_app(None);
        let token = signup(&app, "Ada").await;

        let (status, body) = call(&app, Method::GET, "/api/activities/insights", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totals"], Value::Null);
        assert_eq!(body["message"], "No activities found");

        call(
            &app,
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({ "title": "X", "category": "DSA", "expectedTime": 100, "actualTime": 110, "date": "2026-01-28" })),
        )
        .await;

        let (_, body) = call(
            &app,
            Method::GET,
            "/api/activities/insights?date=2026-01-28",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["status"], "On-target");
        assert_eq!(body["totals"]["efficiency"], 110.0);
        assert_eq!(body["categoryStats"][0]["actual"], 110.0);
    }

    #[tokio::test]
    async fn analytics_report_week_over_week_trend() {
        let app = test_app(None);
        let token = signup(&app, "Ada").await;
        let today = Local::now().date_naive();

        for (days_ago, actual) in [(1, 4.0), (7, 2.0), (10, 3.0)] {
            let date = (today - Duration::days(days_ago)).format("%Y-%m-%d").to_string();
            call(
                &app,
                Method::POST,
                "/api/activities",
                Some(&token),
                Some(json!({ "title": "t", "category": "Project", "expectedTime": 1, "actualTime": actual, "date": date })),
            )
            .await;
        }

        let (status, body) = call(&app, Method::GET, "/api/activities/analytics", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trends"]["currentWeek"], 6.0);
        assert_eq!(body["trends"]["previousWeek"], 3.0);
        assert_eq!(body["trends"]["trendPercent"], 100.0);
        assert_eq!(body["heatmap"].as_array().expect("heatmap").len(), 3);
        assert_eq!(body["distribution"][0]["hours"], 9.0);
    }

    #[tokio::test]
    async fn goal_upsert_keeps_latest_value() {
        let app = test_app(None);
        let token = signup(&app, "Ada").await;

        for target in [10, 14] {
            let (status, _) = call(
                &app,
                Method::POST,
                "/api/activities/goals",
                Some(&token),
                Some(json!({ "category": "DSA", "targetHours": target })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, goals) = call(&app, Method::GET, "/api/activities/goals", Some(&token), None).await;
        let goals = goals.as_array().expect("goals").clone();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0]["targetHours"], 14.0);

        let (status, progress) = call(
            &app,
            Method::GET,
            "/api/activities/goals/progress",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress[0]["percent"], 0.0);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/activities/goals",
            Some(&token),
            Some(json!({ "category": "DSA" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn manual_report_trigger_requires_admin_token_when_configured() {
        let app = test_app(Some("admin-secret"));
        let token = signup(&app, "Ada").await;
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        call(
            &app,
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({ "title": "t", "category": "DSA", "expectedTime": 1, "actualTime": 1, "date": today })),
        )
        .await;

        let (status, _) = call(&app, Method::POST, "/api/admin/trigger-reports", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/admin/trigger-reports",
            Some("admin-secret"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Reports generation triggered");
        assert_eq!(body["sent"], 1);
    }
}
