//! Typed use-case errors.
//!
//! Use cases return `Result<T, DomainError>`; the category decides how the
//! API layer renders it. Infrastructure faults travel as `Store` and end up
//! as a generic 500.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// A stable machine-readable code plus a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub description: String,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

/// Use-case error categories.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ErrorDetail>),

    #[error("Not found: {0}")]
    NotFound(ErrorDetail),

    #[error("Conflict: {0}")]
    Conflict(ErrorDetail),

    #[error("Unauthorized: {0}")]
    Unauthorized(ErrorDetail),

    #[error("Forbidden: {0}")]
    Forbidden(ErrorDetail),

    #[error("Failure: {0}")]
    Failure(ErrorDetail),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

fn join(details: &[ErrorDetail]) -> String {
    details
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DomainError {
    pub fn validation(code: &str, description: impl Into<String>) -> Self {
        Self::Validation(vec![ErrorDetail::new(code, description)])
    }

    pub fn not_found(code: &str, description: impl Into<String>) -> Self {
        Self::NotFound(ErrorDetail::new(code, description))
    }

    pub fn conflict(code: &str, description: impl Into<String>) -> Self {
        Self::Conflict(ErrorDetail::new(code, description))
    }

    pub fn unauthorized(code: &str, description: impl Into<String>) -> Self {
        Self::Unauthorized(ErrorDetail::new(code, description))
    }

    pub fn forbidden(code: &str, description: impl Into<String>) -> Self {
        Self::Forbidden(ErrorDetail::new(code, description))
    }

    pub fn failure(code: &str, description: impl Into<String>) -> Self {
        Self::Failure(ErrorDetail::new(code, description))
    }

    /// The first error code carried by this error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Validation(details) => details.first().map(|d| d.code.as_str()),
            Self::NotFound(d)
            | Self::Conflict(d)
            | Self::Unauthorized(d)
            | Self::Forbidden(d)
            | Self::Failure(d) => Some(d.code.as_str()),
            Self::Unexpected(_) | Self::Store(_) => None,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation(what) => {
                DomainError::conflict("store.duplicate", format!("{what} already exists"))
            }
            StoreError::Conflict(msg) => DomainError::conflict("store.concurrency_conflict", msg),
            other => DomainError::Store(other),
        }
    }
}

/// Collects validation failures and turns them into one error.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ErrorDetail>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `code` unless `ok` holds.
    pub fn check(&mut self, ok: bool, code: &str, description: &str) -> &mut Self {
        if !ok {
            self.errors.push(ErrorDetail::new(code, description));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), DomainError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}
