//! # Pricing & Discount Calculator
//!
//! Pure functions that turn lines and a discount into order totals.
//!
//! ## Totals Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  line_subtotal(qty, unit) ──► order_subtotal(Σ lines)                   │
//! │                                      │                                  │
//! │                 discount ──► apply_discount(subtotal, discount)         │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │                        total ──► balance_due(total, paid)               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts are integer cents, so multiplication is exact; rounding to
//! currency precision happens when a decimal is parsed (see
//! [`Money::parse`]).

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult, ValidationError, ValidationErrors};
use crate::money::Money;
use crate::types::{Actor, SalesOrderItem};

/// Totals of an order header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

/// `quantity × unit_price`. A product that does not fit in `i64` cents is
/// a validation failure on the unit price.
#[inline]
pub fn line_subtotal(quantity: i64, unit_price: Money) -> Result<Money, ValidationError> {
    unit_price
        .checked_multiply_quantity(quantity)
        .ok_or_else(|| {
            ValidationError::rule(
                "unit_price",
                format!("{} × {} is beyond the representable amount", unit_price, quantity),
            )
        })
}

/// Sum of every line's subtotal, recomputed from quantity and unit price.
pub fn order_subtotal<'a, I>(items: I) -> Result<Money, ValidationError>
where
    I: IntoIterator<Item = &'a SalesOrderItem>,
{
    items.into_iter().try_fold(Money::zero(), |sum, item| {
        let line = line_subtotal(item.quantity, item.unit_price())?;
        sum.checked_add(line).ok_or_else(|| {
            ValidationError::rule("subtotal", "order subtotal is beyond the representable amount")
        })
    })
}

/// Applies a discount to a subtotal and returns the total.
///
/// ## Rules
/// - discount must not be negative
/// - discount must not exceed the subtotal
///
/// Both rules are reported together when both fail.
pub fn apply_discount(subtotal: Money, discount: Money) -> Result<Money, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if discount.is_negative() {
        errors.push(ValidationError::MustNotBeNegative {
            field: "discount".to_string(),
        });
    }
    if discount > subtotal {
        errors.push(ValidationError::rule(
            "discount",
            format!("{} exceeds the order subtotal of {}", discount, subtotal),
        ));
    }

    errors.into_result()?;
    Ok(subtotal - discount)
}

/// Computes header totals for a set of lines and a discount.
pub fn compute_totals<'a, I>(items: I, discount: Money) -> Result<OrderTotals, ValidationErrors>
where
    I: IntoIterator<Item = &'a SalesOrderItem>,
{
    let subtotal = order_subtotal(items)?;
    let total = apply_discount(subtotal, discount)?;
    Ok(OrderTotals {
        subtotal,
        discount,
        total,
    })
}

/// `total - amount_paid`. Negative means the customer holds a credit.
#[inline]
pub fn balance_due(total: Money, amount_paid: Money) -> Money {
    total - amount_paid
}

/// Checks that `actor` may grant `discount` under `config`.
///
/// Discounts at or below the threshold need no authority; anything above
/// it requires the configured permission.
pub fn authorize_discount(discount: Money, config: &EngineConfig, actor: &Actor) -> CoreResult<()> {
    if discount.cents() <= config.discount_threshold_cents {
        return Ok(());
    }

    if actor.has_permission(&config.discount_permission) {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied {
            user_id: actor.user_id.clone(),
            permission: config.discount_permission.clone(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
