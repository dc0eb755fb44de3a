//! # Purchase Order Repository
//!
//! Supplier orders and their lines. Receipt against a line is the
//! [`crate::ReceivingEngine`]'s job; this repository creates and reads.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use optica_core::validation::{validate_price_cents, validate_quantity, validate_text};
use optica_core::{
    NewPurchaseOrderLine, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, ValidationError,
    ValidationErrors,
};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;

/// Repository for purchase order database operations.
#[derive(Debug, Clone)]
pub struct PurchaseOrderRepository {
    pool: SqlitePool,
}

impl PurchaseOrderRepository {
    /// Creates a new PurchaseOrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseOrderRepository { pool }
    }

    /// Creates a purchase order with its lines in one transaction.
    ///
    /// Every line must reference an existing inventory item.
    pub async fn create(
        &self,
        supplier: &str,
        lines: &[NewPurchaseOrderLine],
    ) -> DbResult<PurchaseOrder> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_text("supplier", supplier, 200));
        if lines.is_empty() {
            errors.push(ValidationError::Required {
                field: "lines".to_string(),
            });
        }
        for line in lines {
            errors.check(validate_quantity(line.quantity_ordered));
            errors.check(validate_price_cents(line.unit_price_cents));
        }
        errors.into_result()?;

        let mut tx = begin_write(&self.pool).await?;

        let mut order = PurchaseOrder {
            id: Uuid::new_v4().to_string(),
            supplier: supplier.trim().to_string(),
            status: PurchaseOrderStatus::Ordered,
            ordered_at: Utc::now(),
            received_at: None,
            items: Vec::with_capacity(lines.len()),
        };

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (id, supplier, status, ordered_at, received_at)
            VALUES (?1, ?2, ?3, ?4, NULL)
            "#,
        )
        .bind(&order.id)
        .bind(&order.supplier)
        .bind(order.status)
        .bind(order.ordered_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM inventory_items WHERE id = ?1")
                .bind(&line.inventory_item_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(ValidationError::UnknownReference {
                    field: "inventory_item_id".to_string(),
                    entity: "InventoryItem".to_string(),
                    id: line.inventory_item_id.clone(),
                }
                .into());
            }

            let item = PurchaseOrderItem {
                id: Uuid::new_v4().to_string(),
                purchase_order_id: order.id.clone(),
                inventory_item_id: line.inventory_item_id.clone(),
                quantity_ordered: line.quantity_ordered,
                quantity_received: 0,
                unit_price_cents: line.unit_price_cents,
            };

            sqlx::query(
                r#"
                INSERT INTO purchase_order_items (
                    id, purchase_order_id, inventory_item_id,
                    quantity_ordered, quantity_received, unit_price_cents
                ) VALUES (?1, ?2, ?3, ?4, 0, ?5)
                "#,
            )
            .bind(&item.id)
            .bind(&item.purchase_order_id)
            .bind(&item.inventory_item_id)
            .bind(item.quantity_ordered)
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await?;

            order.items.push(item);
        }

        tx.commit().await?;

        info!(po_id = %order.id, supplier = %order.supplier, lines = order.items.len(), "Purchase order created");
        Ok(order)
    }

    /// Gets a purchase order with its lines.
    pub async fn get(&self, id: &str) -> DbResult<PurchaseOrder> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, id).await
    }

    /// Lists the lines of a purchase order in creation order.
    pub async fn list_items(&self, purchase_order_id: &str) -> DbResult<Vec<PurchaseOrderItem>> {
        let mut conn = self.pool.acquire().await?;
        list_items_in(&mut conn, purchase_order_id).await
    }

    /// Gets one purchase order line.
    pub async fn get_item(&self, line_id: &str) -> DbResult<PurchaseOrderItem> {
        let item = sqlx::query_as::<_, PurchaseOrderItem>(
            r#"
            SELECT id, purchase_order_id, inventory_item_id,
                   quantity_ordered, quantity_received, unit_price_cents
            FROM purchase_order_items
            WHERE id = ?1
            "#,
        )
        .bind(line_id)
        .fetch_optional(&self.pool)
        .await?;

        item.ok_or_else(|| DbError::not_found("PurchaseOrderItem", line_id))
    }

    /// Lists purchase orders still waiting for goods, oldest first.
    pub async fn list_open(&self) -> DbResult<Vec<PurchaseOrder>> {
        let orders = sqlx::query_as::<_, PurchaseOrder>(
            r#"
            SELECT id, supplier, status, ordered_at, received_at
            FROM purchase_orders
            WHERE status != 'received'
            ORDER BY ordered_at, rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = orders.len(), "Open purchase orders");
        Ok(orders)
    }
}

pub(crate) async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<PurchaseOrder> {
    let order = sqlx::query_as::<_, PurchaseOrder>(
        "SELECT id, supplier, status, ordered_at, received_at FROM purchase_orders WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let mut order = order.ok_or_else(|| DbError::not_found("PurchaseOrder", id))?;
    order.items = list_items_in(conn, id).await?;
    Ok(order)
}

pub(crate) async fn list_items_in(
    conn: &mut SqliteConnection,
    purchase_order_id: &str,
) -> DbResult<Vec<PurchaseOrderItem>> {
    let items = sqlx::query_as::<_, PurchaseOrderItem>(
        r#"
        SELECT id, purchase_order_id, inventory_item_id,
               quantity_ordered, quantity_received, unit_price_cents
        FROM purchase_order_items
        WHERE purchase_order_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(purchase_order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::catalog::NewInventoryItem;

    #[tokio::test]
    async fn test_create_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = db
            .catalog()
            .insert_inventory_item(NewInventoryItem::new("LNS-150", "1.50 blank", 2_000))
            .await
            .unwrap();

        let po = db
            .purchase_orders()
            .create(
                "Lens Supplier Ltd",
                &[NewPurchaseOrderLine {
                    inventory_item_id: item.id.clone(),
                    quantity_ordered: 20,
                    unit_price_cents: 800,
                }],
            )
            .await
            .unwrap();

        let loaded = db.purchase_orders().get(&po.id).await.unwrap();
        assert_eq!(loaded.status, PurchaseOrderStatus::Ordered);
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].outstanding(), 20);
        assert_eq!(db.purchase_orders().list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_item_rolls_back_whole_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .purchase_orders()
            .create(
                "Frames Inc",
                &[NewPurchaseOrderLine {
                    inventory_item_id: "missing".to_string(),
                    quantity_ordered: 1,
                    unit_price_cents: 100,
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), optica_core::ErrorCode::ValidationError);
        assert!(db.purchase_orders().list_open().await.unwrap().is_empty());
    }
}
