//! error.rs
//!
//! Единая таксономия ошибок приложения. Каждый вариант имеет стабильный код
//! (`code()`), который транспортный слой отдаёт клиенту вместе с HTTP-статусом.
//! Внутренние детали (sqlx, bcrypt, jwt) пишутся в лог и наружу не уходят.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{entity} {id} не найден")]
    NotFound { entity: &'static str, id: String },

    #[error("недостаточно билетов для события {event_id}: запрошено {requested}, доступно {available}")]
    InsufficientInventory {
        event_id: String,
        requested: i32,
        available: i32,
    },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("ошибка выделения идентификатора: {0}")]
    AllocationFailure(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound { entity, id: id.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InsufficientInventory { .. } => StatusCode::CONFLICT,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::AllocationFailure(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Стабильный код результата для клиента.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::AllocationFailure(_) => "ALLOCATION_FAILURE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Внутренняя ошибка сервера".to_string(),
            AppError::AllocationFailure(_) => "Не удалось выделить идентификатор".to_string(),
            other => other.to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::Database(e) => error!(error = ?e, "Database error"),
            AppError::Internal(msg) => error!(message = %msg, "Internal error"),
            AppError::AllocationFailure(msg) => error!(message = %msg, "Identifier allocation failed"),
            other => warn!(code = other.code(), "{}", other),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidArgument(format!("Некорректные данные запроса: {}", errors))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.code(),
                message: self.public_message(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn domain_failures_have_distinct_codes() {
        let errors = [
            AppError::not_found("event", "E00-001"),
            AppError::InsufficientInventory {
                event_id: "E00-001".into(),
                requested: 5,
                available: 2,
            },
            AppError::invalid("quantity"),
            AppError::AllocationFailure("bad".into()),
            AppError::Conflict("email".into()),
            AppError::Unauthorized("no".into()),
            AppError::Forbidden("no".into()),
            AppError::internal("boom"),
        ];

        let codes: HashSet<_> = errors.iter().map(AppError::code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = AppError::internal("connection refused at 10.0.0.3");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("10.0.0.3"));

        let db = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(db.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn inventory_failure_maps_to_conflict() {
        let err = AppError::InsufficientInventory {
            event_id: "E00-001".into(),
            requested: 8,
            available: 7,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("E00-001"));
    }
}
