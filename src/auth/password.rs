use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::validation::ValidationError;

const MIN_CHARS: usize = 8;
const MAX_CHARS: usize = 128;
const SPECIAL_CHARS: &str = "@$!%*?&#^()-_=+[]{}|;:',.<>/~`\"\\";

/// Enforces length and character-class rules on a new password.
pub fn validate_strength(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < MIN_CHARS {
        return Err(ValidationError::new(
            "password",
            format!("password must be at least {MIN_CHARS} characters long"),
        ));
    }
    if len > MAX_CHARS {
        return Err(ValidationError::new(
            "password",
            format!("password is too long (max {MAX_CHARS} characters)"),
        ));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARS.contains(c));
    if !(has_upper && has_lower && has_digit && has_special) {
        return Err(ValidationError::new(
            "password",
            "password must contain at least one uppercase letter, one lowercase letter, \
             one number and one special character",
        ));
    }
    Ok(())
}

/// Argon2id hash in PHC string form.
pub fn hash(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// False for a wrong password and for a stored hash that does not parse.
pub fn verify(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
