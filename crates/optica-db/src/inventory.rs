//! # Inventory Ledger
//!
//! The only write path to `inventory_items.quantity_on_hand`.
//!
//! ## Guarded Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two workstations sell the last frame at the same time                  │
//! │                                                                         │
//! │  WS-1: UPDATE ... SET qty = qty - 1 WHERE id = ? AND qty >= 1  → 1 row  │
//! │  WS-2: UPDATE ... SET qty = qty - 1 WHERE id = ? AND qty >= 1  → 0 rows │
//! │                                                        │                │
//! │                                                        ▼                │
//! │                                  InsufficientStock { available: 0 }     │
//! │                                                                         │
//! │  No read-then-write, so no lost update and no explicit lock.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation has two forms: a public one that runs in its own
//! transaction, and an `*_in` form that joins the caller's transaction so
//! the Order and Receiving engines can commit stock together with their
//! own rows.

use chrono::Utc;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use optica_core::validation::validate_reason_code;
use optica_core::{Actor, AuditSink, CoreError, InventoryItem, StockAdjustment, ValidationError};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;

/// Inventory Ledger: deduction, restock, manual adjustment, low-stock scan.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
    audit: Arc<dyn AuditSink>,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool, audit: Arc<dyn AuditSink>) -> Self {
        InventoryLedger { pool, audit }
    }

    /// Gets an inventory item by ID.
    pub async fn get_item(&self, item_id: &str) -> DbResult<InventoryItem> {
        let mut conn = self.pool.acquire().await?;
        self.get_item_in(&mut conn, item_id)
            .await?
            .ok_or_else(|| DbError::not_found("InventoryItem", item_id))
    }

    /// Decrements quantity on hand by `quantity`.
    ///
    /// Returns the new quantity on hand.
    pub async fn deduct(&self, item_id: &str, quantity: i64) -> DbResult<i64> {
        let mut tx = begin_write(&self.pool).await?;
        let remaining = self.deduct_in(&mut tx, item_id, quantity).await?;
        tx.commit().await?;
        Ok(remaining)
    }

    /// Increments quantity on hand by `quantity`. No upper bound.
    pub async fn restock(&self, item_id: &str, quantity: i64) -> DbResult<i64> {
        let mut tx = begin_write(&self.pool).await?;
        let on_hand = self.restock_in(&mut tx, item_id, quantity).await?;
        tx.commit().await?;
        Ok(on_hand)
    }

    /// Signed manual correction with a reason code.
    ///
    /// ## Audit
    /// Emits a [`StockAdjustment`] fact after commit:
    /// ```text
    /// { item_id, delta, reason_code, before_qty, after_qty, actor_id }
    /// ```
    pub async fn adjust(
        &self,
        item_id: &str,
        delta: i64,
        reason_code: &str,
        actor: &Actor,
    ) -> DbResult<StockAdjustment> {
        let mut errors = optica_core::ValidationErrors::new();
        if delta == 0 {
            errors.push(ValidationError::rule("delta", "adjustment must change the quantity"));
        }
        errors.check(validate_reason_code(reason_code));
        errors.into_result()?;

        let mut tx = begin_write(&self.pool).await?;

        let after: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE inventory_items
            SET quantity_on_hand = quantity_on_hand + ?2,
                updated_at = ?3
            WHERE id = ?1 AND quantity_on_hand + ?2 >= 0
            RETURNING quantity_on_hand
            "#,
        )
        .bind(item_id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let after = match after {
            Some(after) => after,
            None => return Err(self.explain_refusal(&mut tx, item_id, -delta).await),
        };

        tx.commit().await?;

        let adjustment = StockAdjustment {
            item_id: item_id.to_string(),
            delta,
            reason_code: reason_code.trim().to_string(),
            before_qty: after - delta,
            after_qty: after,
            actor_id: actor.user_id.clone(),
        };

        info!(
            item_id = %item_id,
            delta,
            before = adjustment.before_qty,
            after = adjustment.after_qty,
            reason = %adjustment.reason_code,
            "Stock adjusted"
        );

        self.audit.record(adjustment.clone().into_event());
        Ok(adjustment)
    }

    /// Active items at or below their minimum level, by name.
    ///
    /// Lazy and restartable: every call runs a fresh query against current
    /// state; nothing is cached between calls.
    pub fn low_stock(&self) -> BoxStream<'_, DbResult<InventoryItem>> {
        sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT
                id, sku, name, quantity_on_hand, cost_price_cents,
                selling_price_cents, min_stock_level, is_active, stock_tracked,
                created_at, updated_at
            FROM inventory_items
            WHERE is_active = 1 AND quantity_on_hand <= min_stock_level
            ORDER BY name, rowid
            "#,
        )
        .fetch(&self.pool)
        .map_err(DbError::from)
        .boxed()
    }

    /// Collects [`InventoryLedger::low_stock`].
    pub async fn list_low_stock(&self) -> DbResult<Vec<InventoryItem>> {
        self.low_stock().try_collect().await
    }

    // =========================================================================
    // In-transaction primitives
    // =========================================================================

    pub(crate) async fn get_item_in(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
    ) -> DbResult<Option<InventoryItem>> {
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT
                id, sku, name, quantity_on_hand, cost_price_cents,
                selling_price_cents, min_stock_level, is_active, stock_tracked,
                created_at, updated_at
            FROM inventory_items
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(item)
    }

    /// Guarded decrement. Untracked items are left untouched.
    pub(crate) async fn deduct_in(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        quantity: i64,
    ) -> DbResult<i64> {
        ensure_positive(quantity)?;

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE inventory_items
            SET quantity_on_hand = CASE
                    WHEN stock_tracked = 1 THEN quantity_on_hand - ?2
                    ELSE quantity_on_hand
                END,
                updated_at = ?3
            WHERE id = ?1 AND (stock_tracked = 0 OR quantity_on_hand >= ?2)
            RETURNING quantity_on_hand
            "#,
        )
        .bind(item_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        match remaining {
            Some(remaining) => {
                debug!(item_id = %item_id, quantity, remaining, "Stock deducted");
                Ok(remaining)
            }
            None => Err(self.explain_refusal(conn, item_id, quantity).await),
        }
    }

    /// Unconditional increment. Untracked items are left untouched.
    pub(crate) async fn restock_in(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        quantity: i64,
    ) -> DbResult<i64> {
        ensure_positive(quantity)?;

        let on_hand: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE inventory_items
            SET quantity_on_hand = CASE
                    WHEN stock_tracked = 1 THEN quantity_on_hand + ?2
                    ELSE quantity_on_hand
                END,
                updated_at = ?3
            WHERE id = ?1
            RETURNING quantity_on_hand
            "#,
        )
        .bind(item_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        let on_hand = on_hand.ok_or_else(|| DbError::not_found("InventoryItem", item_id))?;
        debug!(item_id = %item_id, quantity, on_hand, "Stock restocked");
        Ok(on_hand)
    }

    /// Works out why a guarded update touched no row.
    async fn explain_refusal(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        requested: i64,
    ) -> DbError {
        match self.get_item_in(conn, item_id).await {
            Ok(Some(item)) => CoreError::InsufficientStock {
                item_id: item_id.to_string(),
                available: item.quantity_on_hand,
                requested,
            }
            .into(),
            Ok(None) => DbError::not_found("InventoryItem", item_id),
            Err(err) => err,
        }
    }
}

fn ensure_positive(quantity: i64) -> Result<(), ValidationError> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
