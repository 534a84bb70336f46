//! Password hashing, password rules and one-time reset tokens.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
const RESET_TOKEN_BYTES: usize = 32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PasswordPolicyError {
    #[error("Password too short: minimum {min_length} characters required")]
    TooShort { min_length: usize },

    #[error("Password too long: maximum {max_length} characters allowed")]
    TooLong { max_length: usize },

    #[error("Password must contain at least one letter")]
    MissingLetter,

    #[error("Password must contain at least one number")]
    MissingNumber,

    #[error("Password is in the list of commonly used passwords")]
    CommonPassword,
}

lazy_static! {
    static ref COMMON_PASSWORDS: HashSet<&'static str> = [
        "password1",
        "password123",
        "passw0rd",
        "abc12345",
        "qwerty123",
        "letmein1",
        "welcome1",
        "iloveyou1",
        "12345678a",
        "1q2w3e4r",
        "1qaz2wsx",
        "q1w2e3r4",
        "asdf1234",
        "zaq1zaq1",
        "test1234",
        "admin123",
    ]
    .into_iter()
    .collect();
}

/// At least 8 characters with one letter and one digit
pub fn validate_password(password: &str) -> Result<(), PasswordPolicyError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(PasswordPolicyError::TooShort {
            min_length: MIN_PASSWORD_LENGTH,
        });
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(PasswordPolicyError::TooLong {
            max_length: MAX_PASSWORD_LENGTH,
        });
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(PasswordPolicyError::MissingLetter);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordPolicyError::MissingNumber);
    }
    if COMMON_PASSWORDS.contains(password.to_lowercase().as_str()) {
        return Err(PasswordPolicyError::CommonPassword);
    }
    Ok(())
}

/// Hashes a password into a PHC string (argon2id, random salt)
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Returns false for a wrong password and for a malformed stored hash
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Generates a reset token and the hash that gets persisted.
/// The raw token leaves the process once; only the hash is stored.
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let hash = hash_reset_token(&token);
    (token, hash)
}

pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("short1", Err(PasswordPolicyError::TooShort { min_length: 8 }))]
    #[case("onlyletters", Err(PasswordPolicyError::MissingNumber))]
    #[case("1234567890", Err(PasswordPolicyError::MissingLetter))]
    #[case("Password123", Err(PasswordPolicyError::CommonPassword))]
    #[case("soup4tuesday", Ok(()))]
    fn password_rules(#[case] password: &str, #[case] expected: Result<(), PasswordPolicyError>) {
        assert_eq!(validate_password(password), expected);
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("soup4tuesday").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("soup4tuesday", &hash));
        assert!(!verify_password("soup4wednesday", &hash));
        assert!(!verify_password("soup4tuesday", "not-a-hash"));
    }

    #[test]
    fn reset_tokens_are_random_and_hashed() {
        let (token_a, hash_a) = generate_reset_token();
        let (token_b, _) = generate_reset_token();
        assert_eq!(token_a.len(), RESET_TOKEN_BYTES * 2);
        assert_ne!(token_a, token_b);
        assert_eq!(hash_a, hash_reset_token(&token_a));
        assert_ne!(hash_a, token_a);
        assert_eq!(hash_a.len(), 64);
    }
}
