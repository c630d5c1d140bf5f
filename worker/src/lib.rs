// ==============================================================================
// lib.rs - Exomiser Worker Library
// ==============================================================================
// Description: Background execution of Exomiser analyses for the web server
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod error;
pub mod exomiser;
pub mod output;
pub mod report;
pub mod runner;

pub use error::RunnerError;
pub use runner::AnalysisRunner;
