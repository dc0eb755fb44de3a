//! # optica-core: Pure Business Logic for Optica POS
//!
//! This crate is the **heart** of the order-fulfillment engine. It contains
//! the rules every transaction must obey as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Optica POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               Presentation layer (external)                     │   │
//! │  │    Order form ──► Payment dialog ──► Shift screen               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ optica_db::Services                    │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      optica-db (ledgers, engines, one transaction per op)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ optica-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐  │   │
//! │  │   │  types  │ │  money  │ │ pricing │ │  status  │ │ audit  │  │   │
//! │  │   │ Order   │ │ Money   │ │ totals  │ │ order /  │ │ facts  │  │   │
//! │  │   │ Shift   │ │ parse   │ │ discount│ │ shift    │ │ sink   │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (SalesOrder, Shift, Payment, InventoryItem, ...)
//! - [`money`] - Money type with integer arithmetic and half-up parsing
//! - [`pricing`] - Line/order subtotals, discount application, discount authority
//! - [`status`] - Transition tables for orders, shifts and purchase orders
//! - [`validation`] - Business rule validation (collects every violation)
//! - [`audit`] - Audit facts and the fire-and-forget sink seam
//! - [`config`] - Engine policy configuration
//! - [`error`] - Domain error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use optica_core::money::Money;
//! use optica_core::pricing::{apply_discount, line_subtotal};
//!
//! let line = line_subtotal(2, Money::parse("10.00").unwrap()).unwrap();
//! let total = apply_discount(line, Money::from_cents(500)).unwrap();
//!
//! assert_eq!(line.cents(), 2000);
//! assert_eq!(total.cents(), 1500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod config;
pub mod error;
pub mod money;
pub mod pricing;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use audit::{AuditAction, AuditEvent, AuditSink, EntityType, MemoryAuditSink, StockAdjustment};
pub use config::{EngineConfig, OverpaymentPolicy};
pub use error::{CoreError, CoreResult, ErrorCode, ValidationError, ValidationErrors};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single order line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest accepted unit price, in cents (10,000,000.00).
///
/// Together with [`MAX_ITEM_QUANTITY`] this keeps every line subtotal well
/// inside `i64` cents.
pub const MAX_UNIT_PRICE_CENTS: i64 = 1_000_000_000;

/// Permission name that authorizes discounts above the configured threshold.
pub const DEFAULT_DISCOUNT_PERMISSION: &str = "grant_discount";
