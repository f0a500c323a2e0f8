//! Custom error types for the common library
//!
//! `DatabaseError` covers pool setup and migrations, `RepositoryError` is what
//! repositories in both services return to their handlers.

use sqlx::Error as SqlxError;
use thiserror::Error;

use crate::validation::FieldErrors;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors returned by repositories
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The record does not exist or is not owned by the caller
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The request is well-formed but the stored state rejects it
    #[error("Validation failed")]
    Validation(FieldErrors),

    /// A uniqueness or integrity constraint was violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// A failure outside the database, e.g. password hashing
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict`, anything else to `Database`
    pub fn from_unique_violation(err: SqlxError, message: &str) -> Self {
        if let SqlxError::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return RepositoryError::Conflict(message.to_string());
            }
        }
        RepositoryError::Database(err)
    }
}

/// Type alias for Result with RepositoryError
pub type RepositoryResult<T> = Result<T, RepositoryError>;
