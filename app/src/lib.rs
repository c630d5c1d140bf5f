// ==============================================================================
// lib.rs - Exomiser Portal Core Library
// ==============================================================================
// Description: Library interface shared by the web server, runner and CLI
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod models;
pub mod phenopacket;
pub mod security;
pub mod uploads;
pub mod validator;

pub use error::{CoreError, Result};
