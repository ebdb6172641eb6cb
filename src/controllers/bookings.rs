use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath};
use crate::middleware::{AdminUser, AuthUser};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(list_all_bookings).post(create_booking))
        .route("/bookings/mine", get(list_my_bookings))
        .route("/bookings/user/{email}", get(list_user_bookings))
        .route("/bookings/{id}", get(get_booking).delete(cancel_booking))
}

/* ---------- BOOKINGS ---------- */

// POST /api/bookings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookingRequest {
    event_id: String,
    ticket_quantity: i32,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(req): AppJson<CreateBookingRequest>,
) -> AppResult<impl IntoResponse> {
    let booking = state
        .bookings
        .create_booking(&req.event_id, &user.user_id, req.ticket_quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings
async fn list_all_bookings(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.bookings.list_all_bookings().await?))
}

// GET /api/bookings/mine
async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.bookings.list_bookings_for_user(&user.email).await?))
}

// GET /api/bookings/user/{email}
async fn list_user_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(email): AppPath<String>,
) -> AppResult<impl IntoResponse> {
    if !user.is_admin() && user.email != email {
        return Err(AppError::Forbidden("Недостаточно прав".to_string()));
    }
    Ok(Json(state.bookings.list_bookings_for_user(&email).await?))
}

// GET /api/bookings/{id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<String>,
) -> AppResult<impl IntoResponse> {
    let booking = state.bookings.get_booking(&id).await?;
    user.ensure_self_or_admin(&booking.user_id)?;
    Ok(Json(booking))
}

// DELETE /api/bookings/{id}
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppPath(id): AppPath<String>,
) -> AppResult<impl IntoResponse> {
    // проверка владельца
    let booking = state.bookings.get_booking(&id).await?;
    user.ensure_self_or_admin(&booking.user_id)?;

    let cancelled = state.bookings.cancel_booking(&id).await?;
    Ok(Json(cancelled))
}
