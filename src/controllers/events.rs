use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::extract::{AppJson, AppPath};
use crate::middleware::AdminUser;
use crate::models::EventInput;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
}

// GET /api/events
async fn list_events(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.events.list().await?))
}

// POST /api/events
async fn create_event(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppJson(input): AppJson<EventInput>,
) -> AppResult<impl IntoResponse> {
    let event = state.events.create(input).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

// GET /api/events/{id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.events.get(&id).await?))
}

// PUT /api/events/{id}
async fn update_event(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppPath(id): AppPath<String>,
    AppJson(input): AppJson<EventInput>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.events.update(&id, input).await?))
}

// DELETE /api/events/{id}
async fn delete_event(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppPath(id): AppPath<String>,
) -> AppResult<impl IntoResponse> {
    state.events.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
