// ==============================================================================
// handlers/admin.rs - User Administration
// ==============================================================================
// Description: Admin-only account management; every handler re-checks the
//              admin flag through the `AdminUser` extractor
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, warn};

use exomiser_core::db::{sessions, users};
use exomiser_core::db::users::UserChanges;
use exomiser_core::forms::{EditUserForm, NewUserForm};
use exomiser_core::models::User;
use exomiser_core::security::{check_password_length, hash_password};
use exomiser_core::CoreError;

use super::AppError;
use crate::middleware::AdminUser;
use crate::models::{ActionResponse, ResetPasswordRequest, ToggleRequest};
use crate::state::AppState;

/// All accounts, newest first
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(users::list(state.db_pool()).await?))
}

pub async fn add_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(form): Json<NewUserForm>,
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

    info!("Admin {} created user {}", admin.email, user.email);
    Ok((
        StatusCode::CREATED,
        Json(ActionResponse::ok(format!("User {} has been created", user.email)).for_user(&user)),
    ))
}

/// Edit email, name and flags; an admin cannot disable or demote themself
pub async fn edit_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    Json(form): Json<EditUserForm>,
) -> Result<Json<ActionResponse>, AppError> {
    if user_id == admin.id && (form.is_active == Some(false) || form.is_admin == Some(false)) {
        return Ok(Json(ActionResponse::failed(
            "Cannot remove your own active or admin status",
        )));
    }

    let changes = UserChanges {
        email: form.email()?,
        full_name: form.full_name(),
        is_active: form.is_active,
        is_admin: form.is_admin,
    };
    let user = users::update(state.db_pool(), user_id, &changes).await?;

    if !user.is_active {
        sessions::delete_for_user(state.db_pool(), user.id).await?;
    }

    info!("Admin {} updated user {}", admin.email, user.email);
    Ok(Json(
        ActionResponse::ok(format!("User {} has been updated", user.email)).for_user(&user),
    ))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
) -> Result<Json<ActionResponse>, AppError> {
    if user_id == admin.id {
        return Ok(Json(ActionResponse::failed("Cannot delete your own account")));
    }

    let user = users::get(state.db_pool(), user_id).await?;
    users::delete(state.db_pool(), user_id).await?;

    info!("Admin {} deleted user {}", admin.email, user.email);
    Ok(Json(ActionResponse::ok(format!("User {} has been deleted", user.email))))
}

/// `{"action": "active" | "inactive"}`
pub async fn toggle_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    if user_id == admin.id {
        return Ok(Json(ActionResponse::failed("Cannot modify your own account")));
    }

    let is_active = match request.action.as_str() {
        "active" => true,
        "inactive" => false,
        _ => return Ok(Json(ActionResponse::failed("Invalid action"))),
    };

    let user = users::set_active(state.db_pool(), user_id, is_active).await?;
    let message = if is_active {
        format!("User {} has been activated", user.email)
    } else {
        let dropped = sessions::delete_for_user(state.db_pool(), user.id).await?;
        info!("Ended {} session(s) of {}", dropped, user.email);
        format!("User {} has been deactivated", user.email)
    };

    info!("Admin {}: {}", admin.email, message);
    Ok(Json(ActionResponse::ok(message).for_user(&user)))
}

/// `{"action": "admin" | "user"}`
pub async fn toggle_admin(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    if user_id == admin.id {
        return Ok(Json(ActionResponse::failed("Cannot modify your own admin status")));
    }

    let is_admin = match request.action.as_str() {
        "admin" => true,
        "user" => false,
        _ => return Ok(Json(ActionResponse::failed("Invalid action"))),
    };

    let user = users::set_admin(state.db_pool(), user_id, is_admin).await?;
    let message = if is_admin {
        format!("Admin privileges granted to {}", user.email)
    } else {
        format!("Admin privileges removed from {}", user.email)
    };

    info!("Admin {}: {}", admin.email, message);
    Ok(Json(ActionResponse::ok(message).for_user(&user)))
}

/// Force a new password; the user's sessions are ended
pub async fn reset_password(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    if let Err(CoreError::Validation(errors)) = check_password_length(&request.password) {
        warn!("Rejected password reset for user {}: too short", user_id);
        return Ok(Json(ActionResponse::failed(errors.join("; "))));
    }

    let user = users::get(state.db_pool(), user_id).await?;
    let password_hash = hash_password(&request.password)?;
    users::set_password_hash(state.db_pool(), user.id, &password_hash).await?;
    sessions::delete_for_user(state.db_pool(), user.id).await?;

    info!("Admin {} reset the password of {}", admin.email, user.email);
    Ok(Json(
        ActionResponse::ok(format!("Password for {} has been reset", user.email)).for_user(&user),
    ))
}
