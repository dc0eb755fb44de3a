//! # Domain Types
//!
//! Core domain types used throughout Optica POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   SalesOrder    │   │ SalesOrderItem  │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  status         │──►│  line (Stock |  │   │  order_id (FK)  │       │
//! │  │  subtotal       │   │   Service |     │   │  method         │       │
//! │  │  discount       │   │   Custom)       │   │  shift_id       │       │
//! │  │  total / paid   │   │  qty × price    │   │  amount_cents   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  InventoryItem  │   │     Shift       │   │  PurchaseOrder  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  quantity ≥ 0   │   │  Active/Paused/ │   │  lines ordered/ │       │
//! │  │  min level      │   │  Ended/Interr.  │   │  received       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity is identified by a UUID v4 string so that independent
//! workstations can mint ids without coordination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Actor (current user + permission fact)
// =============================================================================

/// The current user and the permissions granted to them.
///
/// Supplied by the session layer; the core never looks it up itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub granted_permissions: Vec<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            granted_permissions: Vec::new(),
        }
    }

    /// Adds a granted permission (builder style).
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.granted_permissions.push(permission.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.granted_permissions.iter().any(|p| p == permission)
    }
}

// =============================================================================
// Patient
// =============================================================================

/// A customer of the practice. Orders may optionally reference one.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Patient {
    pub id: String,
    pub full_name: String,
    pub phone: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Inventory Item
// =============================================================================

/// A stockable or trackable catalog entry (frames, lenses, solutions...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryItem {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Never negative at any committed state.
    pub quantity_on_hand: i64,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    pub min_stock_level: i64,
    pub is_active: bool,
    /// Untracked items are sold without touching `quantity_on_hand`.
    pub stock_tracked: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    #[inline]
    pub fn selling_price(&self) -> Money {
        Money::from_cents(self.selling_price_cents)
    }

    /// Low stock means at or below the minimum level while still active.
    pub fn is_low_stock(&self) -> bool {
        self.is_active && self.quantity_on_hand <= self.min_stock_level
    }
}

// =============================================================================
// Service Product
// =============================================================================

/// A non-stock catalog entry (eye exam, fitting, repair labour).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceProduct {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl ServiceProduct {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The status of a sales order. Transition rules live in [`crate::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Being composed: items may be added and removed.
    Pending,
    /// Accepted by the customer; sent to the workshop/lab.
    Confirmed,
    /// Finished goods are waiting at the counter.
    ReadyForPickup,
    /// Handed over. Terminal.
    Completed,
    /// Cancelled, with a caller-selected restock. Terminal.
    Abandoned,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

// =============================================================================
// Order Lines
// =============================================================================

/// Storage discriminator of an order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Stock,
    Service,
    Custom,
}

/// What an order line is backed by.
///
/// Only `Stock` lines move inventory; the Order Engine dispatches on this
/// tag for both deduction and restock eligibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderLine {
    /// An inventory-tracked item; its quantity was deducted at add time.
    Stock { inventory_item_id: String },
    /// A service product (labour, exam). Never touches inventory.
    Service { service_product_id: String },
    /// A bespoke quote with a free-text description and manual price.
    Custom { description: String },
}

impl OrderLine {
    pub fn kind(&self) -> LineKind {
        match self {
            OrderLine::Stock { .. } => LineKind::Stock,
            OrderLine::Service { .. } => LineKind::Service,
            OrderLine::Custom { .. } => LineKind::Custom,
        }
    }

    /// Returns the inventory item to restock, if this line holds stock.
    pub fn restockable_item(&self) -> Option<&str> {
        match self {
            OrderLine::Stock { inventory_item_id } => Some(inventory_item_id),
            OrderLine::Service { .. } | OrderLine::Custom { .. } => None,
        }
    }
}

/// A request to add one line to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemSpec {
    /// Sell from inventory. Price defaults to the item's selling price.
    Stock {
        inventory_item_id: String,
        quantity: i64,
        unit_price_cents: Option<i64>,
        /// e.g. lens prescription attributes for a stocked blank.
        configuration: Option<Value>,
    },
    /// Sell a service. Price defaults to the product's price.
    Service {
        service_product_id: String,
        quantity: i64,
        unit_price_cents: Option<i64>,
    },
    /// Quote a bespoke product.
    Custom {
        description: String,
        quantity: i64,
        unit_price_cents: i64,
        configuration: Option<Value>,
    },
}

impl ItemSpec {
    /// Convenience constructor for the common stock case at catalog price.
    pub fn stock(inventory_item_id: impl Into<String>, quantity: i64) -> Self {
        ItemSpec::Stock {
            inventory_item_id: inventory_item_id.into(),
            quantity,
            unit_price_cents: None,
            configuration: None,
        }
    }

    /// Convenience constructor for a service at catalog price.
    pub fn service(service_product_id: impl Into<String>, quantity: i64) -> Self {
        ItemSpec::Service {
            service_product_id: service_product_id.into(),
            quantity,
            unit_price_cents: None,
        }
    }

    pub fn quantity(&self) -> i64 {
        match self {
            ItemSpec::Stock { quantity, .. }
            | ItemSpec::Service { quantity, .. }
            | ItemSpec::Custom { quantity, .. } => *quantity,
        }
    }
}

// =============================================================================
// Sales Order
// =============================================================================

/// A customer transaction header plus its lines.
///
/// ## Invariants
/// - `total = subtotal - discount` with `0 <= discount <= subtotal`
/// - `balance_due = total - amount_paid`, `amount_paid >= 0`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SalesOrder {
    pub id: String,
    pub patient_id: Option<String>,
    #[ts(as = "String")]
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub balance_due_cents: i64,
    pub created_by: String,
    pub shift_id: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Populated by the repository; empty on header-only reads.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<SalesOrderItem>,
}

impl SalesOrder {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    #[inline]
    pub fn balance_due(&self) -> Money {
        Money::from_cents(self.balance_due_cents)
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesOrderItem {
    pub id: String,
    pub order_id: String,
    pub line: OrderLine,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Always `quantity × unit_price_cents`.
    pub line_subtotal_cents: i64,
    /// Structured attributes (prescription, lens material, coatings...).
    pub configuration: Option<Value>,
    /// Manually priced or bespoke-configured.
    pub is_custom: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SalesOrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_subtotal(&self) -> Money {
        Money::from_cents(self.line_subtotal_cents)
    }
}

// =============================================================================
// Shift
// =============================================================================

/// Cash-drawer shift status. Transition rules live in [`crate::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Active,
    Paused,
    Ended,
    /// The owning session ended without closing the shift.
    Interrupted,
}

/// A cash-drawer session owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shift {
    pub id: String,
    pub user_id: String,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ShiftStatus,
    pub opening_float_cents: i64,
    pub closing_float_cents: Option<i64>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// How the session layer settles a shift found open at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ShiftResolution {
    /// Carry on with the same drawer.
    Resume,
    /// Close it now with a counted closing float.
    ForceEnd { closing_float_cents: i64 },
    /// Treat it as cancelled: closed without a count.
    Cancel,
}

// =============================================================================
// Payment
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash into the drawer.
    Cash,
    /// Card on the bank terminal.
    Card,
    /// Direct bank transfer.
    BankTransfer,
    /// Paid by an insurer or health fund.
    Insurance,
    /// Store voucher or gift card.
    Voucher,
}

impl PaymentMethod {
    /// Cash and bank methods are reconciled against a cash-drawer shift.
    pub const fn is_shift_linked(&self) -> bool {
        matches!(
            self,
            PaymentMethod::Cash | PaymentMethod::Card | PaymentMethod::BankTransfer
        )
    }
}

/// A single, immutable payment event against an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub bank_name: Option<String>,
    pub transaction_ref: Option<String>,
    pub received_by: String,
    pub shift_id: Option<String>,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// A payment request as entered at the counter.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPayment {
    pub order_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub bank_name: Option<String>,
    pub transaction_ref: Option<String>,
    pub received_by: String,
    pub shift_id: Option<String>,
}

impl NewPayment {
    pub fn new(
        order_id: impl Into<String>,
        amount_cents: i64,
        method: PaymentMethod,
        received_by: impl Into<String>,
    ) -> Self {
        NewPayment {
            order_id: order_id.into(),
            amount_cents,
            method,
            bank_name: None,
            transaction_ref: None,
            received_by: received_by.into(),
            shift_id: None,
        }
    }

    pub fn with_shift(mut self, shift_id: impl Into<String>) -> Self {
        self.shift_id = Some(shift_id.into());
        self
    }

    pub fn with_bank(mut self, bank_name: impl Into<String>, transaction_ref: impl Into<String>) -> Self {
        self.bank_name = Some(bank_name.into());
        self.transaction_ref = Some(transaction_ref.into());
        self
    }
}

/// Result of recording a payment: the payment, the recomputed order, and
/// the shift the payment was actually charged to.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub order: SalesOrder,
    pub shift_id: Option<String>,
}

// =============================================================================
// Purchasing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Ordered,
    PartiallyReceived,
    Received,
}

/// A supplier order header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: String,
    pub supplier: String,
    pub status: PurchaseOrderStatus,
    #[ts(as = "String")]
    pub ordered_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<PurchaseOrderItem>,
}

/// One line of a purchase order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub inventory_item_id: String,
    pub quantity_ordered: i64,
    pub quantity_received: i64,
    pub unit_price_cents: i64,
}

impl PurchaseOrderItem {
    /// Quantity still expected from the supplier.
    pub fn outstanding(&self) -> i64 {
        self.quantity_ordered - self.quantity_received
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received >= self.quantity_ordered
    }
}

/// A purchase order line to create.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPurchaseOrderLine {
    pub inventory_item_id: String,
    pub quantity_ordered: i64,
    pub unit_price_cents: i64,
}

// =============================================================================
// Display helpers (used in error messages)
// =============================================================================

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::Completed => "completed",
            OrderStatus::Abandoned => "abandoned",
        })
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShiftStatus::Active => "active",
            ShiftStatus::Paused => "paused",
            ShiftStatus::Ended => "ended",
            ShiftStatus::Interrupted => "interrupted",
        })
    }
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PurchaseOrderStatus::Ordered => "ordered",
            PurchaseOrderStatus::PartiallyReceived => "partially_received",
            PurchaseOrderStatus::Received => "received",
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_default() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_only_stock_lines_are_restockable() {
        let stock = OrderLine::Stock {
            inventory_item_id: "inv-1".to_string(),
        };
        let service = OrderLine::Service {
            service_product_id: "svc-1".to_string(),
        };
        let custom = OrderLine::Custom {
            description: "Progressive lenses".to_string(),
        };

        assert_eq!(stock.restockable_item(), Some("inv-1"));
        assert_eq!(service.restockable_item(), None);
        assert_eq!(custom.restockable_item(), None);
        assert_eq!(custom.kind(), LineKind::Custom);
    }

    #[test]
    fn test_shift_linked_methods() {
        assert!(PaymentMethod::Cash.is_shift_linked());
        assert!(PaymentMethod::Card.is_shift_linked());
        assert!(PaymentMethod::BankTransfer.is_shift_linked());
        assert!(!PaymentMethod::Insurance.is_shift_linked());
        assert!(!PaymentMethod::Voucher.is_shift_linked());
    }

    #[test]
    fn test_actor_permissions() {
        let actor = Actor::new("u-1").with_permission("grant_discount");
        assert!(actor.has_permission("grant_discount"));
        assert!(!actor.has_permission("void_payment"));
    }

    #[test]
    fn test_item_spec_serializes_with_kind_tag() {
        let spec = ItemSpec::stock("inv-1", 2);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"], "stock");
        assert_eq!(json["quantity"], 2);
        assert_eq!(spec.quantity(), 2);
    }

    #[test]
    fn test_purchase_line_outstanding() {
        let line = PurchaseOrderItem {
            id: "poi-1".to_string(),
            purchase_order_id: "po-1".to_string(),
            inventory_item_id: "inv-1".to_string(),
            quantity_ordered: 10,
            quantity_received: 4,
            unit_price_cents: 250,
        };
        assert_eq!(line.outstanding(), 6);
        assert!(!line.is_fully_received());
    }

    #[test]
    fn test_status_display_matches_storage_names() {
        assert_eq!(OrderStatus::ReadyForPickup.to_string(), "ready_for_pickup");
        assert_eq!(ShiftStatus::Interrupted.to_string(), "interrupted");
        assert_eq!(
            serde_json::to_string(&PurchaseOrderStatus::PartiallyReceived).unwrap(),
            "\"partially_received\""
        );
    }
}
