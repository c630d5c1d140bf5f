// ==============================================================================
// middleware/auth.rs - Session Authentication
// ==============================================================================
// Description: Resolve the session cookie to an active portal account
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
//
// Security: Every protected handler takes `CurrentUser` (or `AdminUser`).
// The cookie carries only an opaque token; the session row decides expiry.
// A user deactivated by an admin loses all sessions on their next request.
//
// ==============================================================================

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use exomiser_core::db::sessions::{self, Session};
use exomiser_core::db::users;
use exomiser_core::models::User;

use crate::handlers::AppError;
use crate::state::AppState;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "exomiser_session";

/// Signed-in, active user
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| unauthorized("Please log in to access this page"))?;

        let session = sessions::find_valid(state.db_pool(), &token)
            .await
            .map_err(|e| AppError::from(e).into_response())?
            .ok_or_else(|| unauthorized("Session expired, please log in again"))?;

        let user = users::find_by_id(state.db_pool(), session.user_id)
            .await
            .map_err(|e| AppError::from(e).into_response())?
            .ok_or_else(|| unauthorized("Session expired, please log in again"))?;

        if !user.is_active {
            let dropped = sessions::delete_for_user(state.db_pool(), user.id)
                .await
                .unwrap_or(0);
            info!("Logged out deactivated user {} ({} session(s))", user.email, dropped);
            return Err(unauthorized("Account is disabled. Contact admin."));
        }

        Ok(CurrentUser { user, session })
    }
}

/// Signed-in user with the admin flag
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser { user, .. } = CurrentUser::from_request_parts(parts, state).await?;

        if !user.is_admin {
            warn!("Non-admin user {} denied admin access", user.email);
            return Err(
                AppError::Forbidden("Admin access required".to_string()).into_response(),
            );
        }

        Ok(AdminUser(user))
    }
}

fn unauthorized(message: &str) -> Response {
    AppError::Unauthorized(message.to_string()).into_response()
}
