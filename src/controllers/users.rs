use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath};
use crate::middleware::AdminUser;
use crate::services::users::{Credentials, UserUpdate};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/authenticate", post(authenticate))
        .route("/users/id/{email}", get(user_id_by_email))
        .route("/users/send-otp", post(send_otp))
        .route("/users/verify-otp", post(verify_otp))
        .route("/users/reset-password", post(reset_password))
        .route("/users", get(list_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[derive(Debug, Deserialize)]
struct OtpRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
struct VerifyOtpRequest {
    email: String,
    otp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest {
    email: String,
    otp: String,
    new_password: String,
}

// POST /api/users/register
async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(credentials): AppJson<Credentials>,
) -> AppResult<impl IntoResponse> {
    let auth = state.users.register(credentials).await?;
    Ok((StatusCode::CREATED, Json(auth)))
}

// POST /api/users/authenticate
async fn authenticate(
    State(state): State<Arc<AppState>>,
    AppJson(credentials): AppJson<Credentials>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.users.authenticate(credentials).await?))
}

// GET /api/users/id/{email}
async fn user_id_by_email(
    State(state): State<Arc<AppState>>,
    AppPath(email): AppPath<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = state.users.user_id_by_email(&email).await?;
    Ok(Json(json!({ "userId": user_id })))
}

// POST /api/users/send-otp
async fn send_otp(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<OtpRequest>,
) -> AppResult<impl IntoResponse> {
    state.users.send_otp(&req.email).await?;
    Ok(Json(json!({ "message": "OTP sent successfully" })))
}

// POST /api/users/verify-otp
async fn verify_otp(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<VerifyOtpRequest>,
) -> AppResult<impl IntoResponse> {
    if !state.users.verify_otp(&req.email, &req.otp).await? {
        return Err(AppError::Unauthorized("Invalid OTP".to_string()));
    }
    Ok(Json(json!({ "message": "OTP verified successfully" })))
}

// POST /api/users/reset-password
async fn reset_password(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    state
        .users
        .reset_password(&req.email, &req.otp, &req.new_password)
        .await?;
    Ok(Json(json!({ "message": "Password reset successfully" })))
}

// GET /api/users
async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.users.list().await?))
}

// GET /api/users/{id}
async fn get_user(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppPath(id): AppPath<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.users.get(&id).await?))
}

// PUT /api/users/{id}
async fn update_user(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppPath(id): AppPath<String>,
    AppJson(update): AppJson<UserUpdate>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.users.update(&id, update).await?))
}

// DELETE /api/users/{id}
async fn delete_user(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppPath(id): AppPath<String>,
) -> AppResult<impl IntoResponse> {
    state.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
