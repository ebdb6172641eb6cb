use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::Role;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Доступ к чужим данным есть только у администратора.
    pub fn ensure_self_or_admin(&self, owner_id: &str) -> Result<(), AppError> {
        if self.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("Недостаточно прав".to_string()))
        }
    }
}

// Bearer JWT extractor
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let missing = || AppError::Unauthorized("Требуется авторизация".to_string());

        // Получаем заголовок Authorization
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(missing)?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(missing)?;

        let claims = state.users.tokens().verify(token.trim())?;

        Ok(AuthUser {
            user_id: claims.uid,
            email: claims.sub,
            role: claims.role,
        })
    }
}

/// Пользователь с ролью ADMIN.
///
/// Роль перечитывается из хранилища: понижение или удаление администратора
/// действует сразу, не дожидаясь истечения токена.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<Arc<crate::AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let mut user = AuthUser::from_request_parts(parts, state).await?;

        let stored = match state.users.get(&user.user_id).await {
            Ok(stored) => stored,
            Err(AppError::NotFound { .. }) => {
                return Err(AppError::Unauthorized("Учётная запись удалена".to_string()))
            }
            Err(e) => return Err(e),
        };
        user.role = stored.role;

        if !user.is_admin() {
            return Err(AppError::Forbidden("Требуются права администратора".to_string()));
        }
        Ok(AdminUser(user))
    }
}
