//! # Database Error Types
//!
//! Error types for the ledgers and engines.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Business rule (CoreError)          │
//! │       │                                    │                            │
//! │       ▼                                    ▼                            │
//! │  DbError infra variants           DbError::Domain(CoreError)            │
//! │       │                                    │                            │
//! │       └───────────────┬────────────────────┘                            │
//! │                       ▼                                                 │
//! │              DbError::code() → ErrorCode for the presentation layer     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed operation has already rolled back when the error reaches the
//! caller: every engine drops its transaction on the `?` path.

use optica_core::{CoreError, ErrorCode, ValidationError, ValidationErrors};
use thiserror::Error;

/// Ledger and engine errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A business outcome: validation, conflict, insufficient stock, ...
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Unique constraint violation that no engine pre-check caught.
    ///
    /// ## When This Occurs
    /// - Two workstations start a shift for the same user concurrently
    /// - Inserting a duplicate SKU
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A CHECK constraint rejected the write (e.g. stock below zero).
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored value could not be decoded (bad JSON configuration, ...).
    #[error("Corrupt {column} in stored row: {reason}")]
    Decode { column: String, reason: String },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Domain(CoreError::not_found(entity, id))
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Returns the domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            _ => None,
        }
    }

    /// Machine-readable code for the presentation layer.
    ///
    /// ```text
    /// Domain(e)          → e.code()
    /// UniqueViolation    → CONFLICT
    /// CheckViolation     → VALIDATION_ERROR
    /// everything else    → DATABASE_ERROR
    /// ```
    pub fn code(&self) -> ErrorCode {
        match self {
            DbError::Domain(err) => err.code(),
            DbError::UniqueViolation { .. } => ErrorCode::Conflict,
            DbError::CheckViolation { .. } => ErrorCode::ValidationError,
            _ => ErrorCode::DatabaseError,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::from(err))
    }
}

impl From<ValidationErrors> for DbError {
    fn from(err: ValidationErrors) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → Domain(NotFound)
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(DbError::not_found("Shift", "s-1").code(), ErrorCode::NotFound);
        assert_eq!(DbError::duplicate("sku", "FR-1").code(), ErrorCode::Conflict);
        assert_eq!(
            DbError::CheckViolation {
                message: "CHECK constraint failed".to_string()
            }
            .code(),
            ErrorCode::ValidationError
        );
        assert_eq!(DbError::PoolExhausted.code(), ErrorCode::DatabaseError);
    }

    #[test]
    fn test_domain_errors_pass_through() {
        let err: DbError = CoreError::NoActiveShift {
            user_id: "u-1".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::NoActiveShift);
        assert_eq!(err.to_string(), "User u-1 has no active shift");
        assert!(err.as_domain().is_some());
    }
}
