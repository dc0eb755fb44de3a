//! # Receiving Engine
//!
//! Books supplier deliveries against purchase order lines.
//!
//! ```text
//! receive_stock(line, po, qty_now, unit_price)
//!   │
//!   ├─ 0 < qty_now ≤ ordered − received      else ValidationError
//!   ├─ UPDATE purchase_order_items            received += qty_now, price
//!   ├─ InventoryLedger::restock_in            on_hand  += qty_now
//!   └─ UPDATE purchase_orders.status          Ordered → PartiallyReceived
//!                                             → Received (all lines full)
//! ```
//!
//! All four steps share one transaction.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use optica_core::validation::validate_price_cents;
use optica_core::{
    Actor, AuditAction, AuditEvent, AuditSink, EntityType, PurchaseOrderItem, PurchaseOrderStatus,
    ValidationError, ValidationErrors,
};

use crate::error::{DbError, DbResult};
use crate::inventory::InventoryLedger;
use crate::pool::begin_write;
use crate::repository::purchase_order;

/// Receiving Engine: goods-in against purchase orders.
#[derive(Debug, Clone)]
pub struct ReceivingEngine {
    pool: SqlitePool,
    inventory: InventoryLedger,
    audit: Arc<dyn AuditSink>,
}

impl ReceivingEngine {
    pub fn new(pool: SqlitePool, inventory: InventoryLedger, audit: Arc<dyn AuditSink>) -> Self {
        ReceivingEngine {
            pool,
            inventory,
            audit,
        }
    }

    /// Receives `quantity_now` units on one purchase order line and records
    /// the latest supplier unit price.
    ///
    /// Returns the updated line.
    pub async fn receive_stock(
        &self,
        purchase_order_item_id: &str,
        purchase_order_id: &str,
        quantity_now: i64,
        new_unit_price_cents: i64,
        actor: &Actor,
    ) -> DbResult<PurchaseOrderItem> {
        let mut errors = ValidationErrors::new();
        if quantity_now <= 0 {
            errors.push(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            });
        }
        errors.check(validate_price_cents(new_unit_price_cents));
        errors.into_result()?;

        let mut tx = begin_write(&self.pool).await?;

        let order = purchase_order::get_in(&mut tx, purchase_order_id).await?;
        let before = order
            .items
            .iter()
            .find(|line| line.id == purchase_order_item_id)
            .cloned()
            .ok_or_else(|| DbError::not_found("PurchaseOrderItem", purchase_order_item_id))?;

        if quantity_now > before.outstanding() {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max: before.outstanding(),
            }
            .into());
        }

        // Guard repeats the outstanding check against a concurrent receipt.
        let after = sqlx::query_as::<_, PurchaseOrderItem>(
            r#"
            UPDATE purchase_order_items
            SET quantity_received = quantity_received + ?3,
                unit_price_cents = ?4
            WHERE id = ?1
              AND purchase_order_id = ?2
              AND quantity_received + ?3 <= quantity_ordered
            RETURNING id, purchase_order_id, inventory_item_id,
                      quantity_ordered, quantity_received, unit_price_cents
            "#,
        )
        .bind(purchase_order_item_id)
        .bind(purchase_order_id)
        .bind(quantity_now)
        .bind(new_unit_price_cents)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            DbError::from(ValidationError::rule(
                "quantity",
                "more than the outstanding quantity has now been received",
            ))
        })?;

        let on_hand = self
            .inventory
            .restock_in(&mut tx, &after.inventory_item_id, quantity_now)
            .await?;

        let lines = purchase_order::list_items_in(&mut tx, purchase_order_id).await?;
        let outstanding_lines = lines.iter().filter(|line| !line.is_fully_received()).count() as i64;
        let any_received = lines.iter().any(|line| line.quantity_received > 0);
        let status = PurchaseOrderStatus::from_receipt(outstanding_lines, any_received);
        let received_at = (status == PurchaseOrderStatus::Received).then(Utc::now);

        sqlx::query("UPDATE purchase_orders SET status = ?2, received_at = ?3 WHERE id = ?1")
            .bind(purchase_order_id)
            .bind(status)
            .bind(received_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            po_id = %purchase_order_id,
            line_id = %purchase_order_item_id,
            item_id = %after.inventory_item_id,
            quantity_now,
            received = after.quantity_received,
            ordered = after.quantity_ordered,
            on_hand,
            po_status = %status,
            "Stock received"
        );
        self.audit.record(
            AuditEvent::new(&actor.user_id, EntityType::PurchaseOrder, purchase_order_id, AuditAction::Receive)
                .with_before(&before)
                .with_after(&after),
        );

        Ok(after)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
