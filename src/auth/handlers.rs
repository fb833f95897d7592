use axum::{
    extract::{FromRef, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, PublicUser,
            ResetPasswordRequest, SignupRequest, UpdatePasswordRequest,
        },
        extractors::{AdminUser, CurrentUser},
        jwt::JwtKeys,
        password::{check_new_password, hash_password, verify_password},
        repo_types::User,
        tokens::{generate_reset_token, hash_reset_token},
    },
    mailer::password_reset_email,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", patch(reset_password))
        .route("/auth/update-password", patch(update_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/users", get(list_users))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let secure_flag = if secure { " Secure;" } else { "" };
    format!("jwt={token}; HttpOnly;{secure_flag} SameSite=Lax; Path=/; Max-Age={max_age_secs}")
}

/// Sign a fresh JWT for the user and wrap it in the standard token response,
/// mirrored into the `jwt` cookie.
fn issue_session(
    keys: &JwtKeys,
    cookie_secure: bool,
    user: User,
    status: StatusCode,
) -> Result<Response, (StatusCode, String)> {
    let token = keys.sign(user.id).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let cookie = session_cookie(&token, keys.ttl.as_secs(), cookie_secure);
    let cookie = HeaderValue::from_str(&cookie).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create cookie: {e}"),
        )
    })?;
    Ok((
        status,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse {
            token,
            user: PublicUser::from(user),
        }),
    )
        .into_response())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<Response, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if let Err(reason) = check_new_password(&payload.password, &payload.password_confirm) {
        warn!(reason, "signup password rejected");
        return Err((StatusCode::BAD_REQUEST, reason.into()));
    }

    // Ensure email is not taken
    if let Ok(Some(_)) = User::find_by_email(&state.db, &payload.email).await {
        warn!(email = %payload.email, "email already registered");
        return Err((StatusCode::CONFLICT, "Email already registered".into()));
    }

    let hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let user = match User::create(&state.db, &payload.email, &hash).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    info!(user_id = %user.id, email = %user.email, "user signed up");
    issue_session(
        &JwtKeys::from_ref(&state),
        state.config.cookie_secure,
        user,
        StatusCode::CREATED,
    )
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Response, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Please provide email and password".into(),
        ));
    }

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let ok = match verify_password(&payload.password, &user.password_hash) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "verify_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_session(
        &JwtKeys::from_ref(&state),
        state.config.cookie_secure,
        user,
        StatusCode::OK,
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "forgot-password unknown email");
            return Err((
                StatusCode::NOT_FOUND,
                "There is no user with that email address".into(),
            ));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let (plain_token, token_hash) = generate_reset_token();
    let expires_at =
        OffsetDateTime::now_utc() + TimeDuration::minutes(state.config.reset_token_ttl_minutes);

    if let Err(e) = User::set_reset_token(&state.db, user.id, &token_hash, expires_at).await {
        error!(error = %e, user_id = %user.id, "set_reset_token failed");
        return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
    }

    let reset_url = format!(
        "{}/api/v1/auth/reset-password/{}",
        state.config.public_base_url, plain_token
    );
    let (subject, body) = password_reset_email(&reset_url);

    if let Err(e) = state.mailer.send_email(&user.email, &subject, &body).await {
        error!(error = %e, user_id = %user.id, "reset email failed");
        // Do not leave an orphaned token behind when the user never got it
        if let Err(e) = User::clear_reset_token(&state.db, user.id).await {
            error!(error = %e, user_id = %user.id, "clear_reset_token failed");
        }
        return Err((
            StatusCode::BAD_GATEWAY,
            "There was an error sending the email, try again later".into(),
        ));
    }

    info!(user_id = %user.id, "password reset token sent");
    Ok(Json(MessageResponse {
        message: "Reset token sent to email".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response, (StatusCode, String)> {
    let token_hash = hash_reset_token(&token);

    let user = match User::find_by_reset_token(&state.db, &token_hash).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!("reset token invalid or expired");
            return Err((
                StatusCode::BAD_REQUEST,
                "Reset token is invalid or has expired".into(),
            ));
        }
        Err(e) => {
            error!(error = %e, "find_by_reset_token failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if let Err(reason) = check_new_password(&payload.password, &payload.password_confirm) {
        warn!(reason, "reset password rejected");
        return Err((StatusCode::BAD_REQUEST, reason.into()));
    }

    let hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    // Clears the token columns and stamps password_changed_at
    let user = match User::update_password(&state.db, user.id, &hash).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "update_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    info!(user_id = %user.id, "password reset");
    issue_session(
        &JwtKeys::from_ref(&state),
        state.config.cookie_secure,
        user,
        StatusCode::OK,
    )
}

#[instrument(skip(state, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Response, (StatusCode, String)> {
    let ok = match verify_password(&payload.current_password, &user.password_hash) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "verify_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if !ok {
        warn!(user_id = %user.id, "update-password wrong current password");
        return Err((
            StatusCode::UNAUTHORIZED,
            "Your current password is incorrect".into(),
        ));
    }

    if let Err(reason) = check_new_password(&payload.password, &payload.password_confirm) {
        warn!(reason, "update password rejected");
        return Err((StatusCode::BAD_REQUEST, reason.into()));
    }

    let hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let user = match User::update_password(&state.db, user.id, &hash).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "update_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    info!(user_id = %user.id, "password updated");
    issue_session(
        &JwtKeys::from_ref(&state),
        state.config.cookie_secure,
        user,
        StatusCode::OK,
    )
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<PublicUser>>, (StatusCode, String)> {
    let users = User::list_all(&state.db).await.map_err(|e| {
        error!(error = %e, "list_all failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.io"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn session_cookie_shape() {
        let cookie = session_cookie("abc.def.ghi", 3600, false);
        assert!(cookie.starts_with("jwt=abc.def.ghi;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn session_cookie_secure_in_production() {
        let cookie = session_cookie("abc", 60, true);
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn session_cookie_is_a_valid_header_value() {
        let cookie = session_cookie("abc.def.ghi", 3600, true);
        assert!(HeaderValue::from_str(&cookie).is_ok());
    }
}
