// ==============================================================================
// middleware/mod.rs - Request Middleware Modules
// ==============================================================================
// Description: Session authentication extractors
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod auth;

pub use auth::{AdminUser, CurrentUser, SESSION_COOKIE};
