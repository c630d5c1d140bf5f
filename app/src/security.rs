// ==============================================================================
// security.rs - Security Functions (Session Tokens, Password Hashing)
// ==============================================================================
// Description: Session token generation, Argon2id hashing and verification
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

use crate::error::{CoreError, Result};

// ==============================================================================
// CONSTANTS
// ==============================================================================

/// Session token length in bytes (32 bytes = 256 bits)
const TOKEN_BYTES: usize = 32;

/// Minimum password length accepted by admin resets and account creation
pub const MIN_PASSWORD_LENGTH: usize = 8;

// ==============================================================================
// TOKEN GENERATION
// ==============================================================================

/// Generates a cryptographically secure session token
///
/// Returns a URL-safe base64-encoded string of 32 random bytes (43 chars).
pub fn generate_session_token() -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; TOKEN_BYTES];
    rng.fill(&mut bytes);

    URL_SAFE_NO_PAD.encode(bytes)
}

/// Short random hex suffix used to make stored upload names collision resistant
pub fn random_hex_suffix(len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

// ==============================================================================
// PASSWORD HASHING (ARGON2ID)
// ==============================================================================

/// Hashes a password using Argon2id with secure parameters
///
/// - Memory: 47104 KiB (46 MiB)
/// - Iterations: 3
/// - Parallelism: 4
/// - Salt: 16 bytes (cryptographically random)
///
/// The returned hash string is in PHC format and contains the algorithm,
/// parameters, salt, and hash.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(47104, 3, 4, None)
        .map_err(|e| CoreError::Security(format!("Failed to create Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CoreError::Security(format!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verifies a password against an Argon2id hash
///
/// # Errors
///
/// Returns an error if the hash string is malformed. A wrong password is
/// `Ok(false)`, not an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| CoreError::Security(format!("Failed to parse password hash: {}", e)))?;

    let argon2 = Argon2::default();

    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CoreError::Security(format!("Password verification error: {}", e))),
    }
}

/// Enforce the minimum password length
pub fn check_password_length(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CoreError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

// ==============================================================================
// TESTS
// ==============================================================================
