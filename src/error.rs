// Circulation Core - School Library Circulation Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for the circulation core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors carry a stable [`ErrorKind`] tag so callers (the REST boundary, the CLI,
//! a UI) can branch on the kind without matching message text.
//!
//! ## Taxonomy
//!
//! ### Business errors (surfaced to the caller, never retried)
//! - `InvalidInput` - malformed or missing required fields
//! - `NotFound` - unknown book, copy or checkout id
//! - `Conflict` - the operation would violate an invariant
//! - `AlreadyReturned` - the checkout was already closed
//! - `NoCopiesAvailable` - every copy of the title is out
//! - `CheckoutLimitExceeded` - the student is at the configured cap
//!
//! ### Infrastructure errors
//! - `Configuration`, `MigrationFailed`, `Internal`
//! - `Database`, `Json`, `Toml`, `Io` (via `#[from]`)
//!
//! A reconciled ISBN return is not an error. It is a successful result that
//! carries a notice, see [`crate::circulation::ReconciliationNotice`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using our CirculationError type
pub type Result<T> = std::result::Result<T, CirculationError>;

/// Stable tag for every error the core can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    AlreadyReturned,
    NoCopiesAvailable,
    CheckoutLimitExceeded,
    /// Never produced by an error; attached to successful ISBN returns
    ReconciliationNotice,
    Configuration,
    Database,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::AlreadyReturned => "AlreadyReturned",
            ErrorKind::NoCopiesAvailable => "NoCopiesAvailable",
            ErrorKind::CheckoutLimitExceeded => "CheckoutLimitExceeded",
            ErrorKind::ReconciliationNotice => "ReconciliationNotice",
            ErrorKind::Configuration => "Configuration",
            ErrorKind::Database => "Database",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity named by a `NotFound` error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    Book,
    BookCopy,
    Checkout,
    Isbn,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Book => "book",
            Entity::BookCopy => "book copy",
            Entity::Checkout => "checkout",
            Entity::Isbn => "ISBN",
        };
        f.write_str(name)
    }
}

/// Main error type for the circulation core
#[derive(Error, Debug)]
pub enum CirculationError {
    // ===== Business Errors =====

    /// Required field missing or malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown book, copy, checkout or ISBN
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: Entity,
        /// Identifier as the caller supplied it
        id: String,
    },

    /// Operation would violate an invariant (deleting a checked-out copy, etc.)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Checkout was already closed by an earlier return
    #[error("Checkout {checkout_id} was already returned")]
    AlreadyReturned { checkout_id: i64 },

    /// Every copy of the title is checked out
    #[error("No copies available for book {book_id}")]
    NoCopiesAvailable { book_id: i64 },

    /// Student already holds the maximum number of books
    #[error("Student {student_id} has reached the checkout limit of {limit}")]
    CheckoutLimitExceeded { student_id: i64, limit: u32 },

    // ===== Infrastructure Errors =====

    /// Configuration file or environment is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    Internal(String),

    // ===== External Library Errors =====

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper methods for creating common errors
impl CirculationError {
    /// Create a NotFound error for an entity id
    pub fn not_found<S: ToString>(entity: Entity, id: S) -> Self {
        CirculationError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        CirculationError::InvalidInput(message.into())
    }

    /// Create a Conflict error with a message
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        CirculationError::Conflict(message.into())
    }

    /// Create an Internal error with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        CirculationError::Internal(message.into())
    }

    /// Stable kind tag for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CirculationError::InvalidInput(_) => ErrorKind::InvalidInput,
            CirculationError::NotFound { .. } => ErrorKind::NotFound,
            CirculationError::Conflict(_) => ErrorKind::Conflict,
            CirculationError::AlreadyReturned { .. } => ErrorKind::AlreadyReturned,
            CirculationError::NoCopiesAvailable { .. } => ErrorKind::NoCopiesAvailable,
            CirculationError::CheckoutLimitExceeded { .. } => ErrorKind::CheckoutLimitExceeded,
            CirculationError::Configuration(_) | CirculationError::Toml(_) => {
                ErrorKind::Configuration
            }
            CirculationError::MigrationFailed(_) | CirculationError::Database(_) => {
                ErrorKind::Database
            }
            CirculationError::Internal(_)
            | CirculationError::Json(_)
            | CirculationError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is an actionable business state rather than a failure
    ///
    /// These must never be shown to a user as a generic failure.
    pub fn is_business_state(&self) -> bool {
        matches!(
            self,
            CirculationError::Conflict(_)
                | CirculationError::AlreadyReturned { .. }
                | CirculationError::NoCopiesAvailable { .. }
                | CirculationError::CheckoutLimitExceeded { .. }
        )
    }

    /// Check if error is a conflict with current state
    ///
    /// A double return is a conflict, reported under its own kind.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CirculationError::Conflict(_) | CirculationError::AlreadyReturned { .. }
        )
    }

    /// Check if error is retryable
    ///
    /// Only transient SQLite lock contention qualifies. Copy exhaustion is a
    /// legitimate business state and is never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            CirculationError::Database(sqlx::Error::Database(db_err)) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
                db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| matches!(code & 0xff, 5 | 6))
                    .unwrap_or(false)
            }
            CirculationError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// HTTP status the REST boundary reports for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::AlreadyReturned | ErrorKind::NoCopiesAvailable => 409,
            ErrorKind::CheckoutLimitExceeded => 422,
            ErrorKind::ReconciliationNotice => 200,
            ErrorKind::Configuration | ErrorKind::Database | ErrorKind::Internal => 500,
        }
    }

    /// Get user-friendly error message suitable for display
    ///
    /// Every kind maps to its own wording. Technical details of
    /// infrastructure errors are omitted.
    pub fn user_message(&self) -> String {
        match self {
            CirculationError::InvalidInput(message) => {
                format!("Please check the form: {}", message)
            }
            CirculationError::NotFound { entity, id } => {
                format!("No {} matches '{}'. It may have been removed.", entity, id)
            }
            CirculationError::Conflict(message) => {
                format!("This can't be done right now: {}", message)
            }
            CirculationError::AlreadyReturned { .. } => {
                "This book has already been returned.".to_string()
            }
            CirculationError::NoCopiesAvailable { .. } => {
                "All copies of this book are checked out. Try again after a copy is returned."
                    .to_string()
            }
            CirculationError::CheckoutLimitExceeded { limit, .. } => {
                format!(
                    "This student already has {} books checked out. Return one before borrowing another.",
                    limit
                )
            }
            CirculationError::Configuration(_) | CirculationError::Toml(_) => {
                "The library is not configured correctly. Please contact an administrator."
                    .to_string()
            }
            _ => "Something went wrong while talking to the library database. Please try again."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(
            CirculationError::NoCopiesAvailable { book_id: 1 }.kind(),
            ErrorKind::NoCopiesAvailable
        );
        assert_eq!(
            CirculationError::AlreadyReturned { checkout_id: 3 }.kind().as_str(),
            "AlreadyReturned"
        );
        assert_eq!(
            CirculationError::not_found(Entity::Book, 42).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_kind_serializes_as_tag() {
        let json = serde_json::to_string(&ErrorKind::CheckoutLimitExceeded).unwrap();
        assert_eq!(json, "\"CheckoutLimitExceeded\"");
    }

    #[test]
    fn test_business_states_have_distinct_messages() {
        let errors = [
            CirculationError::invalid_input("title is required"),
            CirculationError::not_found(Entity::Checkout, 9),
            CirculationError::conflict("copy 2 is checked out"),
            CirculationError::AlreadyReturned { checkout_id: 1 },
            CirculationError::NoCopiesAvailable { book_id: 1 },
            CirculationError::CheckoutLimitExceeded { student_id: 1, limit: 5 },
        ];

        let messages: std::collections::HashSet<String> =
            errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), errors.len());

        for error in &errors[2..] {
            assert!(error.is_business_state(), "{:?} should be actionable", error);
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(CirculationError::invalid_input("x").status_code(), 400);
        assert_eq!(CirculationError::not_found(Entity::Isbn, "123").status_code(), 404);
        assert_eq!(CirculationError::AlreadyReturned { checkout_id: 1 }.status_code(), 409);
        assert_eq!(
            CirculationError::CheckoutLimitExceeded { student_id: 1, limit: 2 }.status_code(),
            422
        );
        assert_eq!(CirculationError::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_not_retryable_business_errors() {
        assert!(!CirculationError::NoCopiesAvailable { book_id: 1 }.is_retryable());
        assert!(!CirculationError::conflict("x").is_retryable());
        assert!(CirculationError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }
}
