use crate::api::ApiState;
use crate::api::error::{ApiError, ApiResult};
use crate::auth::{hash_password, verify_password};
use crate::db::Database;
use axum::Json;
use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|error| panic!("bad email regex: {error}"))
});

/// The owner resolved from a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
}

#[async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Not authorized, no token".to_string()))?;

        let user_id = state.tokens.verify(token).map_err(|error| {
            debug!(error = %error, "rejected bearer token");
            ApiError::Unauthorized("Not authorized, token failed".to_string())
        })?;

        let user = state
            .database
            .user_by_id(user_id)?
            .ok_or_else(|| ApiError::Unauthorized("Not authorized, token failed".to_string()))?;

        Ok(Self { id: user.id })
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignupPayload {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginPayload {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionPayload {
    #[serde(rename = "_id")]
    id: i64,
    name: String,
    email: String,
    token: String,
}

pub(crate) async fn signup(
    State(state): State<ApiState>,
    payload: Result<Json<SignupPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionPayload>)> {
    let Json(payload) = payload?;

    let name = required_text(payload.name, "name")?;
    let email = normalize_email(&required_text(payload.email, "email")?)?;
    let password = payload
        .password
        .filter(|password| !password.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required field: password".to_string()))?;

    if state.database.user_by_email(&email)?.is_some() {
        return Err(user_exists());
    }

    let password_hash = hash_password(&password, state.bcrypt_cost).await?;
    // A concurrent signup for the same email can still win the race to the
    // unique index between the lookup above and this insert.
    let user = state
        .database
        .insert_user(&name, &email, &password_hash)
        .map_err(signup_insert_error)?;
    let token = state.tokens.issue(user.id)?;

    info!(user_id = user.id, "user signed up");

    Ok((
        StatusCode::CREATED,
        Json(SessionPayload {
            id: user.id,
            name: user.name,
            email: user.email,
            token,
        }),
    ))
}

fn user_exists() -> ApiError {
    ApiError::BadRequest("User already exists".to_string())
}

fn signup_insert_error(error: anyhow::Error) -> ApiError {
    if Database::is_constraint_violation(&error) {
        user_exists()
    } else {
        ApiError::Internal(error)
    }
}

pub(crate) async fn login(
    State(state): State<ApiState>,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> ApiResult<Json<SessionPayload>> {
    let Json(payload) = payload?;

    let email = normalize_email(&required_text(payload.email, "email")?)?;
    let password = payload
        .password
        .filter(|password| !password.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required field: password".to_string()))?;

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = state.database.user_by_email(&email)?.ok_or_else(invalid)?;
    if !verify_password(&password, &user.password_hash).await? {
        return Err(invalid());
    }

    let token = state.tokens.issue(user.id)?;

    Ok(Json(SessionPayload {
        id: user.id,
        name: user.name,
        email: user.email,
        token,
    }))
}

pub(crate) fn required_text(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing required field: {field}")))
}

fn normalize_email(raw: &str) -> ApiResult<String> {
    let email = raw.trim().to_lowercase();
    if EMAIL_PATTERN.is_match(&email) {
        Ok(email)
    } else {
        Err(ApiError::BadRequest(format!("Invalid email address: {raw}")))
    }
}
