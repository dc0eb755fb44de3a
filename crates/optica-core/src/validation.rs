//! # Validation Module
//!
//! Business rule validation for requests entering the engines.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Presentation (external)                                       │
//! │  └── Form-level checks, immediate feedback                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Field validators return one ValidationError                        │
//! │  └── Request validators collect every ValidationError                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK constraints (stock ≥ 0, total = subtotal - discount)         │
//! │  ├── Partial UNIQUE index (one open shift per user)                     │
//! │  └── Foreign key constraints                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use optica_core::validation::{validate_item_spec, validate_quantity};
//! use optica_core::ItemSpec;
//!
//! validate_quantity(5).unwrap();
//!
//! let spec = ItemSpec::Custom {
//!     description: String::new(),
//!     quantity: 0,
//!     unit_price_cents: 1500,
//!     configuration: None,
//! };
//! // Both the empty description and the zero quantity are reported.
//! assert_eq!(validate_item_spec(&spec).unwrap_err().len(), 2);
//! ```

use serde_json::Value;

use crate::error::{ValidationError, ValidationErrors};
use crate::types::ItemSpec;
use crate::{MAX_ITEM_QUANTITY, MAX_UNIT_PRICE_CENTS};

/// Result type for single-field validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted free-text description of a custom line.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Longest accepted stock adjustment reason code.
pub const MAX_REASON_CODE_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Validates that a required text field is present and short enough.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a stock adjustment reason code.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, digits, `_` and `-` only (e.g. `damaged`, `count-correction`)
pub fn validate_reason_code(code: &str) -> ValidationResult<()> {
    validate_text("reason_code", code, MAX_REASON_CODE_LEN)?;

    if !code
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "reason_code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Order: Add Item                                                        │
/// │                                                                         │
/// │  Clerk enters quantity: 2                                               │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(2) ← THIS FUNCTION                                   │
/// │       │                                                                 │
/// │       ├── qty <= 0?  → Error: "quantity must be positive"               │
/// │       ├── qty > 999? → Error: "quantity must be between 1 and 999"      │
/// │       └── OK → Inventory Ledger deducts stock                           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (warranty replacements).
///
/// ```rust
/// use optica_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// assert!(validate_price_cents(i64::MAX / 2).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit_price".to_string(),
        });
    }

    if cents > MAX_UNIT_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents. Must be strictly positive.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates an opening or closing cash float.
pub fn validate_float(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Structured Validators
// =============================================================================

/// Line configuration must be a JSON object of named attributes.
pub fn validate_configuration(configuration: Option<&Value>) -> ValidationResult<()> {
    match configuration {
        None | Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(ValidationError::InvalidFormat {
            field: "configuration".to_string(),
            reason: "must be an object of named attributes".to_string(),
        }),
    }
}

/// Validates a request to add a line, collecting every violation.
///
/// References (`inventory_item_id`, `service_product_id`) are checked for
/// presence here; whether they exist is the ledger's concern.
pub fn validate_item_spec(spec: &ItemSpec) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    errors.check(validate_quantity(spec.quantity()));

    match spec {
        ItemSpec::Stock {
            inventory_item_id,
            unit_price_cents,
            configuration,
            ..
        } => {
            if inventory_item_id.trim().is_empty() {
                errors.push(ValidationError::Required {
                    field: "inventory_item_id".to_string(),
                });
            }
            if let Some(price) = unit_price_cents {
                errors.check(validate_price_cents(*price));
            }
            errors.check(validate_configuration(configuration.as_ref()));
        }
        ItemSpec::Service {
            service_product_id,
            unit_price_cents,
            ..
        } => {
            if service_product_id.trim().is_empty() {
                errors.push(ValidationError::Required {
                    field: "service_product_id".to_string(),
                });
            }
            if let Some(price) = unit_price_cents {
                errors.check(validate_price_cents(*price));
            }
        }
        ItemSpec::Custom {
            description,
            unit_price_cents,
            configuration,
            ..
        } => {
            errors.check(validate_text("description", description, MAX_DESCRIPTION_LEN));
            errors.check(validate_price_cents(*unit_price_cents));
            errors.check(validate_configuration(configuration.as_ref()));
        }
    }

    errors.into_result()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_price_and_amount() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_price_cents(MAX_UNIT_PRICE_CENTS).is_ok());
        assert!(validate_price_cents(MAX_UNIT_PRICE_CENTS + 1).is_err());
        assert!(validate_payment_amount(1).is_ok());
        assert!(validate_payment_amount(0).is_err());
        assert!(validate_float("opening_float", 0).is_ok());
        assert!(validate_float("opening_float", -500).is_err());
    }

    #[test]
    fn test_validate_reason_code() {
        assert!(validate_reason_code("damaged").is_ok());
        assert!(validate_reason_code("count-correction").is_ok());
        assert!(validate_reason_code("").is_err());
        assert!(validate_reason_code("   ").is_err());
        assert!(validate_reason_code("has space").is_err());
        assert!(validate_reason_code(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_configuration_must_be_an_object() {
        assert!(validate_configuration(None).is_ok());
        assert!(validate_configuration(Some(&json!({"sph": -1.25, "cyl": -0.5}))).is_ok());
        assert!(validate_configuration(Some(&json!([1, 2]))).is_err());
        assert!(validate_configuration(Some(&json!("progressive"))).is_err());
    }

    #[test]
    fn test_item_spec_collects_every_violation() {
        let spec = ItemSpec::Stock {
            inventory_item_id: " ".to_string(),
            quantity: 1000,
            unit_price_cents: Some(-1),
            configuration: Some(json!(42)),
        };
        let errors = validate_item_spec(&spec).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_valid_item_specs() {
        assert!(validate_item_spec(&ItemSpec::stock("inv-1", 2)).is_ok());
        assert!(validate_item_spec(&ItemSpec::service("svc-1", 1)).is_ok());
        assert!(validate_item_spec(&ItemSpec::Custom {
            description: "Progressive lenses, index 1.67".to_string(),
            quantity: 1,
            unit_price_cents: 45_000,
            configuration: Some(json!({"index": "1.67", "coating": "AR"})),
        })
        .is_ok());
    }
}
