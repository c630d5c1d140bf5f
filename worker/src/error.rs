// ==============================================================================
// error.rs - Runner Errors
// ==============================================================================
// Description: Failures of a single analysis run; the message is stored on
//              the analysis row
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use exomiser_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to start Exomiser: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Exomiser exited with code {0}")]
    ExitCode(i32),

    #[error("Exomiser was terminated by a signal")]
    Terminated,

    #[error("Runner is shutting down")]
    ShuttingDown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_message() {
        assert_eq!(RunnerError::ExitCode(2).to_string(), "Exomiser exited with code 2");
    }
}
