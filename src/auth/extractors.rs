use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;

use super::jwt::JwtKeys;
use super::repo_types::User;
use crate::state::AppState;

/// Request guard: extracts the bearer token, verifies it and loads the user.
/// Rejects tokens minted before the user's last password change.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".into(),
            ))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((StatusCode::UNAUTHORIZED, "Invalid auth scheme".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
            )
        })?;

        // The subject must still exist
        let user = User::find_by_id(&state.db, claims.sub)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "find_by_id failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".into())
            })?
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "The user for this token no longer exists".to_string(),
            ))?;

        if user.password_changed_after(claims.iat) {
            warn!(user_id = %user.id, "token predates password change");
            return Err((
                StatusCode::UNAUTHORIZED,
                "Password changed recently, please log in again".to_string(),
            ));
        }

        Ok(CurrentUser(user))
    }
}

/// Role guard layered on top of [`CurrentUser`].
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            warn!(user_id = %user.id, role = %user.role, "admin route denied");
            return Err((
                StatusCode::FORBIDDEN,
                "You do not have permission to perform this action".to_string(),
            ));
        }
        Ok(AdminUser(user))
    }
}
