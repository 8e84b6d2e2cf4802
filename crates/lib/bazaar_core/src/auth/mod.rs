//! Authentication: password hashing, JWT access/refresh tokens, persisted
//! refresh-token rotation, external identity providers and the account use
//! cases built on them.

pub mod account;
pub mod external;
pub mod jwt;
pub mod password;
pub mod refresh_tokens;

use thiserror::Error;

use crate::error::DomainError;

/// Credential-processing faults. Never shown to clients verbatim.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Token(#[from] jwt::TokenError),
}

impl From<AuthError> for DomainError {
    fn from(e: AuthError) -> Self {
        DomainError::Unexpected(e.to_string())
    }
}
