// ==============================================================================
// handlers/auth.rs - Login, Registration and Logout
// ==============================================================================
// Description: Password authentication backed by server-side session rows
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{info, warn};

use exomiser_core::db::{sessions, users};
use exomiser_core::forms::{normalize_email, RegisterForm};
use exomiser_core::security::{hash_password, verify_password};

use super::AppError;
use crate::middleware::{CurrentUser, SESSION_COOKIE};
use crate::models::{ActionResponse, LoginRequest, SessionResponse};
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const ACCOUNT_DISABLED: &str = "Account is disabled. Contact admin.";

/// Log in with email and password
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let email = normalize_email(&request.email);

    let user = users::find_by_email(state.db_pool(), &email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(&request.password, &user.password_hash)? {
        warn!("Failed login for {}", email);
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    if !user.is_active {
        warn!("Login attempt on disabled account {}", email);
        return Err(AppError::Forbidden(ACCOUNT_DISABLED.to_string()));
    }

    let config = state.session_config();
    let ttl = if request.remember {
        config.remember_ttl
    } else {
        config.session_ttl
    };
    let session = sessions::create(state.db_pool(), user.id, request.remember, ttl).await?;

    let max_age = request.remember.then(|| ttl.num_seconds());
    let cookie = session_cookie(session.token, max_age, config.secure_cookies);

    info!("User {} logged in", user.email);

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            user,
            expires_at: session.expires_at,
        }),
    ))
}

/// Self-service account creation (active, non-admin)
pub async fn register(
    State(state): State<AppState>,
    Json(form): Json<RegisterForm>,
) -> Result<(StatusCode, Json<ActionResponse>), AppError> {
    let account = form.validate()?;
    let password_hash = hash_password(&account.password)?;

    let user = users::create(
        state.db_pool(),
        &account.email,
        &password_hash,
        account.full_name.as_deref(),
        account.is_active,
        account.is_admin,
    )
    .await?;

    info!("Registered new user {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(ActionResponse::ok("Registration successful. Please log in.").for_user(&user)),
    ))
}

/// End the current session
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ActionResponse>), AppError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        sessions::delete(state.db_pool(), cookie.value()).await?;
    }

    let removal = Cookie::build(SESSION_COOKIE).path("/");
    Ok((
        jar.remove(removal),
        Json(ActionResponse::ok("You have been logged out")),
    ))
}

/// Currently signed-in account
pub async fn me(current: CurrentUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        expires_at: current.session.expires_at,
        user: current.user,
    })
}

/// `HttpOnly; SameSite=Lax` session cookie; persistent when `max_age` is set
fn session_cookie(token: String, max_age: Option<i64>, secure: bool) -> Cookie<'static> {
    let cookie: Cookie<'static> = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();

    match max_age {
        Some(seconds) => Cookie::parse(format!("{}; Max-Age={}", cookie, seconds)).unwrap_or(cookie),
        None => cookie,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_session_cookie() {
        let cookie = session_cookie("abc".to_string(), None, false);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert!(cookie.max_age().is_none());
    }

    #[test]
    fn test_remembered_cookie_is_persistent() {
        let cookie = session_cookie("abc".to_string(), Some(2_592_000), true);
        let header = cookie.to_string();
        assert!(header.contains("Max-Age=2592000"));
        assert!(header.contains("Secure"));
        assert!(header.contains("HttpOnly"));
    }
}
