//! # Error Types
//!
//! Domain error taxonomy for optica-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  optica-core errors (this file)                                        │
//! │  ├── CoreError         - Caller-facing business outcomes               │
//! │  ├── ValidationErrors  - Every violated rule of one request            │
//! │  └── ValidationError   - A single violated rule                        │
//! │                                                                         │
//! │  optica-db errors (separate crate)                                     │
//! │  └── DbError           - Infrastructure failures + CoreError           │
//! │                                                                         │
//! │  Presentation layer                                                    │
//! │  └── ErrorCode         - Machine-readable code for each error          │
//! │                                                                         │
//! │  Flow: ValidationError → ValidationErrors → CoreError → DbError → UI   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these are transient: the core never retries, and every error is
//! surfaced to the caller as-is.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Core Error
// =============================================================================

/// Core business errors.
///
/// Each variant is a deterministic outcome of a caller request. The
/// presentation layer maps them to messages through [`CoreError::code`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller-supplied data breaks one or more business rules.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// A uniqueness or singleton invariant would be violated.
    ///
    /// ## When This Occurs
    /// - A user already has an Active or Paused shift
    /// - A catalog name is already taken
    #[error("Conflict on {entity}: {reason}")]
    Conflict { entity: String, reason: String },

    /// A deduction or adjustment would drive quantity on hand negative.
    ///
    /// ## User Workflow
    /// ```text
    /// Add frame to order (qty: 5)
    ///      │
    ///      ▼
    /// Guarded UPDATE finds quantity_on_hand = 3
    ///      │
    ///      ▼
    /// InsufficientStock { item_id, available: 3, requested: 5 }
    /// ```
    #[error("Insufficient stock for {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: i64,
        requested: i64,
    },

    /// The requested state change is not legal from the current state.
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    /// The order's status no longer allows item composition changes.
    #[error("Order {order_id} is {status} and its items can no longer change")]
    OrderNotMutable { order_id: String, status: String },

    /// The caller lacks the authority fact the operation requires.
    #[error("User {user_id} lacks permission '{permission}'")]
    PermissionDenied { user_id: String, permission: String },

    /// A shift-linked payment was attempted without an Active shift.
    #[error("User {user_id} has no active shift")]
    NoActiveShift { user_id: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Conflict error.
    pub fn conflict(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Conflict {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Creates an InvalidTransition error from any displayable states.
    pub fn invalid_transition(
        entity: impl Into<String>,
        id: impl Into<String>,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        CoreError::InvalidTransition {
            entity: entity.into(),
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns the machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) => ErrorCode::ValidationError,
            CoreError::Conflict { .. } => ErrorCode::Conflict,
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            CoreError::OrderNotMutable { .. } => ErrorCode::OrderNotMutable,
            CoreError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            CoreError::NoActiveShift { .. } => ErrorCode::NoActiveShift,
            CoreError::NotFound { .. } => ErrorCode::NotFound,
        }
    }
}

/// A single violated rule is still a validation failure.
impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> Self {
        CoreError::Validation(ValidationErrors::from(err))
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Error codes handed to the presentation layer.
///
/// ## Usage in the UI
/// ```typescript
/// switch (e.code) {
///   case 'NOT_FOUND':
///     closeView();          // the entity is gone
///     break;
///   case 'VALIDATION_ERROR':
///     highlightFields(e);   // keep the form open
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Conflict,
    InsufficientStock,
    InvalidTransition,
    OrderNotMutable,
    PermissionDenied,
    NoActiveShift,
    NotFound,
    /// Persistence failure surfaced as-is.
    DatabaseError,
}

impl ErrorCode {
    /// Whether the view showing the entity should close.
    ///
    /// Every other error leaves the form open for correction.
    pub const fn closes_view(&self) -> bool {
        matches!(self, ErrorCode::NotFound)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single violated input rule.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, malformed configuration).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A reference does not resolve to an existing record.
    #[error("{field} does not reference an existing {entity}: {id}")]
    UnknownReference {
        field: String,
        entity: String,
        id: String,
    },

    /// Any other business rule, phrased for the user.
    #[error("{field}: {reason}")]
    Rule { field: String, reason: String },
}

impl ValidationError {
    /// Creates a free-form business rule violation.
    pub fn rule(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Rule {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Every rule a request violated, in the order they were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Creates an empty collector.
    pub fn new() -> Self {
        ValidationErrors(Vec::new())
    }

    /// Records a violation.
    pub fn push(&mut self, err: ValidationError) {
        self.0.push(err);
    }

    /// Records the violation of `result`, if any.
    pub fn check(&mut self, result: Result<(), ValidationError>) {
        if let Err(err) = result {
            self.push(err);
        }
    }

    /// Returns `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(err: ValidationError) -> Self {
        ValidationErrors(vec![err])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            item_id: "FRAME-01".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for FRAME-01: available 3, requested 5"
        );

        let err = CoreError::invalid_transition("SalesOrder", "o-1", "abandoned", "abandoned");
        assert_eq!(
            err.to_string(),
            "SalesOrder o-1 cannot move from abandoned to abandoned"
        );
    }

    #[test]
    fn test_validation_errors_collect_every_rule() {
        let mut errors = ValidationErrors::new();
        errors.check(Ok(()));
        errors.check(Err(ValidationError::Required {
            field: "description".to_string(),
        }));
        errors.check(Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }));

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.to_string(),
            "description is required; quantity must be positive"
        );
        assert!(errors.into_result().is_err());
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_single_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::Required {
            field: "reason_code".to_string(),
        }
        .into();
        match core_err {
            CoreError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CoreError::not_found("Shift", "s-1").code(),
            ErrorCode::NotFound
        );
        assert!(ErrorCode::NotFound.closes_view());
        assert!(!ErrorCode::ValidationError.closes_view());
        assert!(!ErrorCode::InsufficientStock.closes_view());

        let json = serde_json::to_string(&ErrorCode::NoActiveShift).unwrap();
        assert_eq!(json, "\"NO_ACTIVE_SHIFT\"");
    }
}
