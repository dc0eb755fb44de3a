//! # Order Engine
//!
//! Owns the sales order lifecycle and is the only writer of order totals.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create_order ──► Pending ──► Confirmed ──► ReadyForPickup ──► Completed│
//! │                       │            │               │                    │
//! │   add_item ───────────┤            │               │                    │
//! │   remove_item ────────┤            │               │                    │
//! │   set_discount ───────┴────────────┴───────────────┤                    │
//! │                                                    │                    │
//! │   abandon_order(restock ⊆ items) ──────────────────┴──► Abandoned       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transaction Shape
//! Every mutation is one transaction: read the header, change lines and
//! stock through [`InventoryLedger`], then rewrite the header totals with
//! [`OrderEngine::recalculate_in`]. Any failure drops the transaction and
//! nothing is committed.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use optica_core::pricing::{authorize_discount, balance_due, compute_totals, line_subtotal};
use optica_core::validation::validate_item_spec;
use optica_core::{
    Actor, AuditAction, AuditEvent, AuditSink, CoreError, EngineConfig, EntityType, ItemSpec,
    LineKind, Money, OrderLine, OrderStatus, OverpaymentPolicy, SalesOrder, SalesOrderItem,
    ServiceProduct, ValidationError, ValidationErrors,
};

use crate::error::{DbError, DbResult};
use crate::inventory::InventoryLedger;
use crate::pool::begin_write;
use crate::repository::patient;

// =============================================================================
// Row mapping
// =============================================================================

/// Flat storage shape of an order line.
#[derive(Debug, sqlx::FromRow)]
struct SalesOrderItemRow {
    id: String,
    order_id: String,
    line_kind: LineKind,
    inventory_item_id: Option<String>,
    service_product_id: Option<String>,
    description: Option<String>,
    quantity: i64,
    unit_price_cents: i64,
    line_subtotal_cents: i64,
    configuration: Option<String>,
    is_custom: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<SalesOrderItemRow> for SalesOrderItem {
    type Error = DbError;

    fn try_from(row: SalesOrderItemRow) -> DbResult<Self> {
        let missing = |column: &str| DbError::Decode {
            column: column.to_string(),
            reason: format!("{:?} line {} has no value", row.line_kind, row.id),
        };

        let line = match row.line_kind {
            LineKind::Stock => OrderLine::Stock {
                inventory_item_id: row
                    .inventory_item_id
                    .clone()
                    .ok_or_else(|| missing("inventory_item_id"))?,
            },
            LineKind::Service => OrderLine::Service {
                service_product_id: row
                    .service_product_id
                    .clone()
                    .ok_or_else(|| missing("service_product_id"))?,
            },
            LineKind::Custom => OrderLine::Custom {
                description: row.description.clone().ok_or_else(|| missing("description"))?,
            },
        };

        let configuration = row
            .configuration
            .map(|text| {
                serde_json::from_str(&text).map_err(|e| DbError::Decode {
                    column: "configuration".to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(SalesOrderItem {
            id: row.id,
            order_id: row.order_id,
            line,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            line_subtotal_cents: row.line_subtotal_cents,
            configuration,
            is_custom: row.is_custom,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Order Engine
// =============================================================================

/// Order Engine: composition, discounts, status changes and abandonment.
#[derive(Debug, Clone)]
pub struct OrderEngine {
    pool: SqlitePool,
    config: Arc<EngineConfig>,
    inventory: InventoryLedger,
    audit: Arc<dyn AuditSink>,
}

impl OrderEngine {
    pub fn new(
        pool: SqlitePool,
        config: Arc<EngineConfig>,
        inventory: InventoryLedger,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        OrderEngine {
            pool,
            config,
            inventory,
            audit,
        }
    }

    /// Creates an empty `Pending` order.
    ///
    /// ## Errors
    /// - `ValidationError` if `patient_id` or `shift_id` is given but does
    ///   not resolve, or `created_by` is blank
    pub async fn create_order(
        &self,
        patient_id: Option<&str>,
        created_by: &str,
        shift_id: Option<&str>,
    ) -> DbResult<SalesOrder> {
        if created_by.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "created_by".to_string(),
            }
            .into());
        }

        let mut tx = begin_write(&self.pool).await?;

        let mut errors = ValidationErrors::new();
        if let Some(patient_id) = patient_id {
            if !patient::exists_in(&mut tx, patient_id).await? {
                errors.push(unknown("patient_id", "Patient", patient_id));
            }
        }
        if let Some(shift_id) = shift_id {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM shifts WHERE id = ?1")
                .bind(shift_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                errors.push(unknown("shift_id", "Shift", shift_id));
            }
        }
        errors.into_result()?;

        let now = Utc::now();
        let order = SalesOrder {
            id: Uuid::new_v4().to_string(),
            patient_id: patient_id.map(str::to_string),
            order_date: now,
            status: OrderStatus::Pending,
            subtotal_cents: 0,
            discount_cents: 0,
            total_cents: 0,
            amount_paid_cents: 0,
            balance_due_cents: 0,
            created_by: created_by.to_string(),
            shift_id: shift_id.map(str::to_string),
            updated_at: now,
            items: Vec::new(),
        };

        sqlx::query(
            r#"
            INSERT INTO sales_orders (
                id, patient_id, order_date, status,
                subtotal_cents, discount_cents, total_cents,
                amount_paid_cents, balance_due_cents,
                created_by, shift_id, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, 0, 0, 0, 0, ?5, ?6, ?7)
            "#,
        )
        .bind(&order.id)
        .bind(&order.patient_id)
        .bind(order.order_date)
        .bind(order.status)
        .bind(&order.created_by)
        .bind(&order.shift_id)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(order_id = %order.id, created_by = %created_by, "Order created");
        self.audit.record(
            AuditEvent::new(created_by, EntityType::SalesOrder, &order.id, AuditAction::Create)
                .with_after(&order),
        );

        Ok(order)
    }

    /// Adds one line and reserves its stock immediately.
    ///
    /// ## Pricing
    /// | Spec | Unit price | `is_custom` |
    /// |---|---|---|
    /// | `Stock` | override or item selling price | override given |
    /// | `Service` | override or product price | override given |
    /// | `Custom` | required | always |
    ///
    /// ## Errors
    /// - `OrderNotMutable` once the order left its editable statuses
    /// - `InsufficientStock` if the stock deduction is refused
    /// - `ValidationError` for bad input or unknown/inactive references
    pub async fn add_item(&self, order_id: &str, spec: ItemSpec) -> DbResult<SalesOrderItem> {
        validate_item_spec(&spec)?;

        let mut tx = begin_write(&self.pool).await?;
        let order = self.editable_header_in(&mut tx, order_id).await?;

        let quantity = spec.quantity();
        let (line, unit_price_cents, configuration, is_custom) = match spec {
            ItemSpec::Stock {
                inventory_item_id,
                unit_price_cents,
                configuration,
                ..
            } => {
                let item = self
                    .inventory
                    .get_item_in(&mut tx, &inventory_item_id)
                    .await?
                    .ok_or_else(|| unknown("inventory_item_id", "InventoryItem", &inventory_item_id))?;
                if !item.is_active {
                    return Err(ValidationError::rule(
                        "inventory_item_id",
                        format!("{} is no longer sold", item.name),
                    )
                    .into());
                }

                self.inventory
                    .deduct_in(&mut tx, &inventory_item_id, quantity)
                    .await?;

                (
                    OrderLine::Stock { inventory_item_id },
                    unit_price_cents.unwrap_or(item.selling_price_cents),
                    configuration,
                    unit_price_cents.is_some(),
                )
            }
            ItemSpec::Service {
                service_product_id,
                unit_price_cents,
                ..
            } => {
                let product = service_product_in(&mut tx, &service_product_id)
                    .await?
                    .filter(|p| p.is_active)
                    .ok_or_else(|| unknown("service_product_id", "ServiceProduct", &service_product_id))?;

                (
                    OrderLine::Service { service_product_id },
                    unit_price_cents.unwrap_or(product.price_cents),
                    None,
                    unit_price_cents.is_some(),
                )
            }
            ItemSpec::Custom {
                description,
                unit_price_cents,
                configuration,
                ..
            } => (
                OrderLine::Custom {
                    description: description.trim().to_string(),
                },
                unit_price_cents,
                configuration,
                true,
            ),
        };

        let item = SalesOrderItem {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            line_subtotal_cents: line_subtotal(quantity, Money::from_cents(unit_price_cents))?.cents(),
            line,
            quantity,
            unit_price_cents,
            configuration,
            is_custom,
            created_at: Utc::now(),
        };

        insert_item_in(&mut tx, &item).await?;
        let updated = self.recalculate_in(&mut tx, order_id).await?;

        tx.commit().await?;

        info!(
            order_id = %order_id,
            item_id = %item.id,
            kind = ?item.line.kind(),
            quantity,
            subtotal_cents = updated.subtotal_cents,
            "Item added"
        );
        self.audit.record(
            AuditEvent::new(&order.created_by, EntityType::SalesOrder, order_id, AuditAction::AddItem)
                .with_after(&item),
        );

        Ok(item)
    }

    /// Removes one line, returning its stock to inventory.
    ///
    /// Once an order has left `Pending` its last line cannot be removed.
    pub async fn remove_item(&self, order_id: &str, item_id: &str) -> DbResult<SalesOrder> {
        let mut tx = begin_write(&self.pool).await?;
        let order = self.editable_header_in(&mut tx, order_id).await?;

        let items = list_items_in(&mut tx, order_id).await?;
        let item = items
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
            .ok_or_else(|| DbError::not_found("SalesOrderItem", item_id))?;

        // Past Pending the order must keep at least one line.
        if order.status != OrderStatus::Pending && items.len() == 1 {
            return Err(ValidationError::rule(
                "items",
                format!("the last item of a {} order cannot be removed", order.status),
            )
            .into());
        }

        if let Some(inventory_item_id) = item.line.restockable_item() {
            self.inventory
                .restock_in(&mut tx, inventory_item_id, item.quantity)
                .await?;
        }

        sqlx::query("DELETE FROM sales_order_items WHERE id = ?1 AND order_id = ?2")
            .bind(item_id)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        let updated = self.recalculate_in(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(order_id = %order_id, item_id = %item_id, "Item removed");
        self.audit.record(
            AuditEvent::new(&order.created_by, EntityType::SalesOrder, order_id, AuditAction::RemoveItem)
                .with_before(&item),
        );

        Ok(updated)
    }

    /// Sets the order's discount amount and recomputes totals.
    ///
    /// Discounts above `EngineConfig::discount_threshold_cents` need the
    /// actor to hold `EngineConfig::discount_permission`.
    pub async fn set_discount(
        &self,
        order_id: &str,
        discount_cents: i64,
        actor: &Actor,
    ) -> DbResult<SalesOrder> {
        if discount_cents < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "discount".to_string(),
            }
            .into());
        }
        let discount = Money::from_cents(discount_cents);
        authorize_discount(discount, &self.config, actor)?;

        let mut tx = begin_write(&self.pool).await?;
        let before = header_in(&mut tx, order_id).await?;
        if before.status.is_terminal() {
            return Err(CoreError::OrderNotMutable {
                order_id: order_id.to_string(),
                status: before.status.to_string(),
            }
            .into());
        }

        let items = list_items_in(&mut tx, order_id).await?;
        let updated = self.write_totals_in(&mut tx, &before, &items, discount).await?;
        tx.commit().await?;

        info!(
            order_id = %order_id,
            discount_cents,
            total_cents = updated.total_cents,
            user_id = %actor.user_id,
            "Discount set"
        );
        self.audit.record(
            AuditEvent::new(&actor.user_id, EntityType::SalesOrder, order_id, AuditAction::DiscountChange)
                .with_before(json!({ "discountCents": before.discount_cents }))
                .with_after(json!({ "discountCents": updated.discount_cents })),
        );

        Ok(updated)
    }

    /// Moves the order along its lifecycle.
    ///
    /// `Abandoned` is routed through [`OrderEngine::abandon_order`] with no
    /// restock, so abandonment has exactly one code path.
    pub async fn change_status(
        &self,
        order_id: &str,
        target: OrderStatus,
        actor: &Actor,
    ) -> DbResult<SalesOrder> {
        if target == OrderStatus::Abandoned {
            return self.abandon_order(order_id, &[], actor).await;
        }

        let mut tx = begin_write(&self.pool).await?;
        let before = header_in(&mut tx, order_id).await?;

        if !before.status.can_transition_to(target) {
            return Err(CoreError::invalid_transition("SalesOrder", order_id, before.status, target).into());
        }

        let items = list_items_in(&mut tx, order_id).await?;
        if target == OrderStatus::Confirmed && items.is_empty() {
            return Err(ValidationError::rule(
                "items",
                "an order needs at least one item before it can be confirmed",
            )
            .into());
        }

        let mut updated = set_status_in(&mut tx, &before, target).await?;
        tx.commit().await?;
        updated.items = items;

        info!(order_id = %order_id, from = %before.status, to = %target, "Order status changed");
        self.audit.record(
            AuditEvent::new(&actor.user_id, EntityType::SalesOrder, order_id, AuditAction::StatusChange)
                .with_before(json!({ "status": before.status }))
                .with_after(json!({ "status": target })),
        );

        Ok(updated)
    }

    /// Abandons the order, restocking the caller-selected stock lines.
    ///
    /// ## Restock Selection
    /// ```text
    /// items:     [frame (stock), lens (stock), exam (service)]
    /// selection: [frame, exam]
    ///                │      └── service line: ignored
    ///                └───────── restocked by its quantity
    /// lens:      not selected (already at the lab), left as sold
    /// ```
    ///
    /// Stock and status commit together or not at all. Ids not on the
    /// order are a `ValidationError`; abandoning an already-terminal order
    /// is an `InvalidTransition`.
    pub async fn abandon_order(
        &self,
        order_id: &str,
        restock_item_ids: &[String],
        actor: &Actor,
    ) -> DbResult<SalesOrder> {
        let mut tx = begin_write(&self.pool).await?;
        let before = header_in(&mut tx, order_id).await?;

        if !before.status.can_transition_to(OrderStatus::Abandoned) {
            return Err(CoreError::invalid_transition(
                "SalesOrder",
                order_id,
                before.status,
                OrderStatus::Abandoned,
            )
            .into());
        }

        let items = list_items_in(&mut tx, order_id).await?;
        let selected: HashSet<&str> = restock_item_ids.iter().map(String::as_str).collect();

        let mut errors = ValidationErrors::new();
        for id in &selected {
            if !items.iter().any(|item| item.id == *id) {
                errors.push(unknown("restock_item_ids", "SalesOrderItem", id));
            }
        }
        errors.into_result()?;

        let mut restocked = Vec::new();
        for item in items.iter().filter(|item| selected.contains(item.id.as_str())) {
            match item.line.restockable_item() {
                Some(inventory_item_id) => {
                    self.inventory
                        .restock_in(&mut tx, inventory_item_id, item.quantity)
                        .await?;
                    restocked.push(item.id.clone());
                }
                None => debug!(item_id = %item.id, "Non-stock line selected for restock; ignored"),
            }
        }

        let mut updated = set_status_in(&mut tx, &before, OrderStatus::Abandoned).await?;
        tx.commit().await?;
        updated.items = items;

        info!(
            order_id = %order_id,
            from = %before.status,
            restocked = restocked.len(),
            user_id = %actor.user_id,
            "Order abandoned"
        );
        self.audit.record(
            AuditEvent::new(&actor.user_id, EntityType::SalesOrder, order_id, AuditAction::Abandon)
                .with_before(json!({ "status": before.status }))
                .with_after(json!({ "status": OrderStatus::Abandoned, "restockedItemIds": restocked })),
        );

        Ok(updated)
    }

    /// Gets an order with its lines.
    pub async fn get_order(&self, order_id: &str) -> DbResult<SalesOrder> {
        let mut conn = self.pool.acquire().await?;
        let mut order = header_in(&mut conn, order_id).await?;
        order.items = list_items_in(&mut conn, order_id).await?;
        Ok(order)
    }

    /// Lines of an order in the order they were added.
    pub async fn list_items(&self, order_id: &str) -> DbResult<Vec<SalesOrderItem>> {
        let mut conn = self.pool.acquire().await?;
        list_items_in(&mut conn, order_id).await
    }

    /// Order headers in one status, oldest first.
    pub async fn list_orders_by_status(&self, status: OrderStatus) -> DbResult<Vec<SalesOrder>> {
        let orders = sqlx::query_as::<_, SalesOrder>(
            r#"
            SELECT id, patient_id, order_date, status,
                   subtotal_cents, discount_cents, total_cents,
                   amount_paid_cents, balance_due_cents,
                   created_by, shift_id, updated_at
            FROM sales_orders
            WHERE status = ?1
            ORDER BY order_date, rowid
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Recomputes and stores the order's totals from its lines and payments.
    pub async fn recalculate_totals(&self, order_id: &str) -> DbResult<SalesOrder> {
        let mut tx = begin_write(&self.pool).await?;
        let order = self.recalculate_in(&mut tx, order_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    // =========================================================================
    // In-transaction primitives
    // =========================================================================

    pub(crate) async fn header_in(
        &self,
        conn: &mut SqliteConnection,
        order_id: &str,
    ) -> DbResult<SalesOrder> {
        header_in(conn, order_id).await
    }

    /// Rewrites subtotal, total, amount paid and balance due from current
    /// lines and payments, keeping the stored discount.
    pub(crate) async fn recalculate_in(
        &self,
        conn: &mut SqliteConnection,
        order_id: &str,
    ) -> DbResult<SalesOrder> {
        let order = header_in(conn, order_id).await?;
        let items = list_items_in(conn, order_id).await?;
        self.write_totals_in(conn, &order, &items, order.discount()).await
    }

    async fn write_totals_in(
        &self,
        conn: &mut SqliteConnection,
        order: &SalesOrder,
        items: &[SalesOrderItem],
        discount: Money,
    ) -> DbResult<SalesOrder> {
        let totals = compute_totals(items, discount)?;

        let paid: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE order_id = ?1",
        )
        .bind(&order.id)
        .fetch_one(&mut *conn)
        .await?;
        let balance = balance_due(totals.total, Money::from_cents(paid));

        if balance.is_negative() && self.config.overpayment == OverpaymentPolicy::Reject {
            warn!(order_id = %order.id, total_cents = totals.total.cents(), paid, "Overpayment refused");
            return Err(ValidationError::rule(
                "amount",
                format!("payments of {} exceed the order total of {}", Money::from_cents(paid), totals.total),
            )
            .into());
        }

        let mut updated = sqlx::query_as::<_, SalesOrder>(
            r#"
            UPDATE sales_orders
            SET subtotal_cents = ?2,
                discount_cents = ?3,
                total_cents = ?4,
                amount_paid_cents = ?5,
                balance_due_cents = ?6,
                updated_at = ?7
            WHERE id = ?1
            RETURNING id, patient_id, order_date, status,
                      subtotal_cents, discount_cents, total_cents,
                      amount_paid_cents, balance_due_cents,
                      created_by, shift_id, updated_at
            "#,
        )
        .bind(&order.id)
        .bind(totals.subtotal.cents())
        .bind(totals.discount.cents())
        .bind(totals.total.cents())
        .bind(paid)
        .bind(balance.cents())
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        updated.items = items.to_vec();
        debug!(
            order_id = %order.id,
            subtotal = updated.subtotal_cents,
            total = updated.total_cents,
            balance = updated.balance_due_cents,
            "Totals recalculated"
        );
        Ok(updated)
    }

    /// Header of an order whose lines may still change.
    async fn editable_header_in(
        &self,
        conn: &mut SqliteConnection,
        order_id: &str,
    ) -> DbResult<SalesOrder> {
        let order = header_in(conn, order_id).await?;
        if !order
            .status
            .allows_item_edits(self.config.allow_item_edits_after_pending)
        {
            return Err(CoreError::OrderNotMutable {
                order_id: order_id.to_string(),
                status: order.status.to_string(),
            }
            .into());
        }
        Ok(order)
    }
}

// =============================================================================
// Queries
// =============================================================================

async fn header_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<SalesOrder> {
    let order = sqlx::query_as::<_, SalesOrder>(
        r#"
        SELECT id, patient_id, order_date, status,
               subtotal_cents, discount_cents, total_cents,
               amount_paid_cents, balance_due_cents,
               created_by, shift_id, updated_at
        FROM sales_orders
        WHERE id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;

    order.ok_or_else(|| DbError::not_found("SalesOrder", order_id))
}

async fn list_items_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<SalesOrderItem>> {
    let rows = sqlx::query_as::<_, SalesOrderItemRow>(
        r#"
        SELECT id, order_id, line_kind, inventory_item_id, service_product_id,
               description, quantity, unit_price_cents, line_subtotal_cents,
               configuration, is_custom, created_at
        FROM sales_order_items
        WHERE order_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(SalesOrderItem::try_from).collect()
}

async fn insert_item_in(conn: &mut SqliteConnection, item: &SalesOrderItem) -> DbResult<()> {
    let (inventory_item_id, service_product_id, description) = match &item.line {
        OrderLine::Stock { inventory_item_id } => (Some(inventory_item_id.as_str()), None, None),
        OrderLine::Service { service_product_id } => (None, Some(service_product_id.as_str()), None),
        OrderLine::Custom { description } => (None, None, Some(description.as_str())),
    };
    let configuration = item.configuration.as_ref().map(|v| v.to_string());

    sqlx::query(
        r#"
        INSERT INTO sales_order_items (
            id, order_id, line_kind, inventory_item_id, service_product_id,
            description, quantity, unit_price_cents, line_subtotal_cents,
            configuration, is_custom, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&item.id)
    .bind(&item.order_id)
    .bind(item.line.kind())
    .bind(inventory_item_id)
    .bind(service_product_id)
    .bind(description)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.line_subtotal_cents)
    .bind(configuration)
    .bind(item.is_custom)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Guarded status write: only applies if nobody moved the order meanwhile.
async fn set_status_in(
    conn: &mut SqliteConnection,
    before: &SalesOrder,
    target: OrderStatus,
) -> DbResult<SalesOrder> {
    let updated = sqlx::query_as::<_, SalesOrder>(
        r#"
        UPDATE sales_orders
        SET status = ?2, updated_at = ?3
        WHERE id = ?1 AND status = ?4
        RETURNING id, patient_id, order_date, status,
                  subtotal_cents, discount_cents, total_cents,
                  amount_paid_cents, balance_due_cents,
                  created_by, shift_id, updated_at
        "#,
    )
    .bind(&before.id)
    .bind(target)
    .bind(Utc::now())
    .bind(before.status)
    .fetch_optional(&mut *conn)
    .await?;

    updated.ok_or_else(|| {
        CoreError::invalid_transition("SalesOrder", &before.id, before.status, target).into()
    })
}

async fn service_product_in(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<ServiceProduct>> {
    let product = sqlx::query_as::<_, ServiceProduct>(
        "SELECT id, name, price_cents, is_active, created_at FROM service_products WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

fn unknown(field: &str, entity: &str, id: &str) -> ValidationError {
    ValidationError::UnknownReference {
        field: field.to_string(),
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::catalog::NewInventoryItem;
    use optica_core::{ErrorCode, InventoryItem, MemoryAuditSink};

    struct Fixture {
        db: Database,
        engine: OrderEngine,
        inventory: InventoryLedger,
        sink: Arc<MemoryAuditSink>,
    }

    async fn setup(config: EngineConfig) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sink = Arc::new(MemoryAuditSink::new());
        let inventory = InventoryLedger::new(db.pool().clone(), sink.clone());
        let engine = OrderEngine::new(
            db.pool().clone(),
            Arc::new(config),
            inventory.clone(),
            sink.clone(),
        );
        Fixture {
            db,
            engine,
            inventory,
            sink,
        }
    }

    async fn stock_item(db: &Database, sku: &str, qty: i64, price: i64) -> InventoryItem {
        db.catalog()
            .insert_inventory_item(NewInventoryItem::new(sku, sku, price).with_quantity(qty))
            .await
            .unwrap()
    }

    fn manager() -> Actor {
        Actor::new("manager-1").with_permission("grant_discount")
    }

    #[tokio::test]
    async fn test_add_stock_item_reserves_inventory() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();

        let item = fx
            .engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 2))
            .await
            .unwrap();

        assert_eq!(item.unit_price_cents, 1_000);
        assert_eq!(item.line_subtotal_cents, 2_000);
        assert!(!item.is_custom);
        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 3);

        let order = fx.engine.get_order(&order.id).await.unwrap();
        assert_eq!(order.subtotal_cents, 2_000);
        assert_eq!(order.balance_due_cents, 2_000);
        assert_eq!(order.items.len(), 1);
    }

    #[tokio::test]
    async fn test_add_item_insufficient_stock_changes_nothing() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 3, 1_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();

        let err = fx
            .engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 5))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);

        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 3);
        assert!(fx.engine.list_items(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_and_custom_lines() {
        let fx = setup(EngineConfig::default()).await;
        let exam = fx
            .db
            .catalog()
            .insert_service_product("Eye exam", 4_500)
            .await
            .unwrap();
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();

        let service = fx
            .engine
            .add_item(&order.id, ItemSpec::service(&exam.id, 1))
            .await
            .unwrap();
        assert_eq!(service.unit_price_cents, 4_500);

        let custom = fx
            .engine
            .add_item(
                &order.id,
                ItemSpec::Custom {
                    description: "Progressive lenses, 1.67 index".to_string(),
                    quantity: 1,
                    unit_price_cents: 32_000,
                    configuration: Some(json!({ "sphereRight": -2.25, "sphereLeft": -2.0 })),
                },
            )
            .await
            .unwrap();
        assert!(custom.is_custom);

        let items = fx.engine.list_items(&order.id).await.unwrap();
        assert_eq!(items[1].configuration, custom.configuration);

        let order = fx.engine.get_order(&order.id).await.unwrap();
        assert_eq!(order.subtotal_cents, 36_500);
    }

    #[tokio::test]
    async fn test_remove_item_restocks() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
        let item = fx
            .engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 2))
            .await
            .unwrap();

        let order = fx.engine.remove_item(&order.id, &item.id).await.unwrap();
        assert_eq!(order.subtotal_cents, 0);
        assert!(order.items.is_empty());
        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 5);
    }

    #[tokio::test]
    async fn test_remove_item_refused_when_discount_would_exceed_subtotal() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
        let item = fx
            .engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 1))
            .await
            .unwrap();
        fx.engine.set_discount(&order.id, 500, &manager()).await.unwrap();

        let err = fx.engine.remove_item(&order.id, &item.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 4);
    }

    #[tokio::test]
    async fn test_discount_needs_permission_above_threshold() {
        let fx = setup(EngineConfig::default().with_discount_threshold(1_000)).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 5_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
        fx.engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 1))
            .await
            .unwrap();

        let clerk = Actor::new("clerk-1");
        let small = fx.engine.set_discount(&order.id, 1_000, &clerk).await.unwrap();
        assert_eq!(small.total_cents, 4_000);

        let err = fx.engine.set_discount(&order.id, 1_500, &clerk).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);

        let big = fx.engine.set_discount(&order.id, 1_500, &manager()).await.unwrap();
        assert_eq!(big.total_cents, 3_500);

        let err = fx.engine.set_discount(&order.id, 6_000, &manager()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_status_flow_and_illegal_moves() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let actor = Actor::new("clerk-1");
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();

        let err = fx
            .engine
            .change_status(&order.id, OrderStatus::Confirmed, &actor)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        fx.engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 1))
            .await
            .unwrap();

        let err = fx
            .engine
            .change_status(&order.id, OrderStatus::Completed, &actor)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);

        for status in [
            OrderStatus::Confirmed,
            OrderStatus::ReadyForPickup,
            OrderStatus::Completed,
        ] {
            let updated = fx.engine.change_status(&order.id, status, &actor).await.unwrap();
            assert_eq!(updated.status, status);
        }

        let err = fx
            .engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OrderNotMutable);
    }

    #[tokio::test]
    async fn test_edits_after_pending_follow_config() {
        let strict = setup(EngineConfig::default()).await;
        let lenient = setup(EngineConfig::default().with_item_edits_after_pending(true)).await;
        let actor = Actor::new("clerk-1");

        for (fx, allowed) in [(&strict, false), (&lenient, true)] {
            let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
            let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
            fx.engine
                .add_item(&order.id, ItemSpec::stock(&frame.id, 1))
                .await
                .unwrap();
            fx.engine
                .change_status(&order.id, OrderStatus::Confirmed, &actor)
                .await
                .unwrap();

            let result = fx.engine.add_item(&order.id, ItemSpec::stock(&frame.id, 1)).await;
            assert_eq!(result.is_ok(), allowed);
        }
    }

    #[tokio::test]
    async fn test_confirmed_order_keeps_its_last_line() {
        let fx = setup(EngineConfig::default().with_item_edits_after_pending(true)).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let lens = stock_item(&fx.db, "LN-1", 5, 2_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
        let frame_line = fx
            .engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 1))
            .await
            .unwrap();
        fx.engine
            .change_status(&order.id, OrderStatus::Confirmed, &Actor::new("clerk-1"))
            .await
            .unwrap();

        let err = fx.engine.remove_item(&order.id, &frame_line.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 4);

        // With a second line in place the first one may go.
        fx.engine
            .add_item(&order.id, ItemSpec::stock(&lens.id, 1))
            .await
            .unwrap();
        let order = fx.engine.remove_item(&order.id, &frame_line.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.items.len(), 1);
        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 5);
    }

    #[tokio::test]
    async fn test_price_beyond_range_is_rejected_before_any_write() {
        let fx = setup(EngineConfig::default()).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();

        let err = fx
            .engine
            .add_item(
                &order.id,
                ItemSpec::Custom {
                    description: "Bespoke titanium frame".to_string(),
                    quantity: 3,
                    unit_price_cents: i64::MAX / 2,
                    configuration: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let order = fx.engine.get_order(&order.id).await.unwrap();
        assert!(order.items.is_empty());
        assert_eq!(order.subtotal_cents, 0);
    }

    #[tokio::test]
    async fn test_failed_abandon_rolls_back_applied_restock() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
        let line = fx
            .engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 2))
            .await
            .unwrap();

        // The status write fails after the restock has already run.
        sqlx::query(
            r#"
            CREATE TRIGGER refuse_status_change
            BEFORE UPDATE OF status ON sales_orders
            WHEN NEW.status <> OLD.status
            BEGIN
                SELECT RAISE(ABORT, 'status change refused');
            END
            "#,
        )
        .execute(fx.db.pool())
        .await
        .unwrap();

        fx.engine
            .abandon_order(&order.id, &[line.id.clone()], &Actor::new("clerk-1"))
            .await
            .unwrap_err();

        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 3);
        let order = fx.engine.get_order(&order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!fx
            .sink
            .events()
            .iter()
            .any(|e| e.action_type == AuditAction::Abandon));
    }

    #[tokio::test]
    async fn test_abandon_restocks_only_selected_stock_lines() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let lens = stock_item(&fx.db, "LN-1", 5, 2_000).await;
        let exam = fx
            .db
            .catalog()
            .insert_service_product("Eye exam", 4_500)
            .await
            .unwrap();

        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
        let frame_line = fx
            .engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 2))
            .await
            .unwrap();
        fx.engine
            .add_item(&order.id, ItemSpec::stock(&lens.id, 1))
            .await
            .unwrap();
        let exam_line = fx
            .engine
            .add_item(&order.id, ItemSpec::service(&exam.id, 1))
            .await
            .unwrap();

        let abandoned = fx
            .engine
            .abandon_order(
                &order.id,
                &[frame_line.id.clone(), exam_line.id.clone()],
                &Actor::new("clerk-1"),
            )
            .await
            .unwrap();

        assert_eq!(abandoned.status, OrderStatus::Abandoned);
        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 5);
        assert_eq!(fx.inventory.get_item(&lens.id).await.unwrap().quantity_on_hand, 4);

        let last = fx.sink.events().pop().unwrap();
        assert_eq!(last.action_type, AuditAction::Abandon);
    }

    #[tokio::test]
    async fn test_abandon_with_unknown_line_changes_nothing() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
        fx.engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 2))
            .await
            .unwrap();

        let err = fx
            .engine
            .abandon_order(&order.id, &["not-a-line".to_string()], &Actor::new("clerk-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let order = fx.engine.get_order(&order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 3);
    }

    #[tokio::test]
    async fn test_change_status_to_abandoned_restocks_nothing() {
        let fx = setup(EngineConfig::default()).await;
        let frame = stock_item(&fx.db, "FR-1", 5, 1_000).await;
        let order = fx.engine.create_order(None, "clerk-1", None).await.unwrap();
        fx.engine
            .add_item(&order.id, ItemSpec::stock(&frame.id, 2))
            .await
            .unwrap();

        let abandoned = fx
            .engine
            .change_status(&order.id, OrderStatus::Abandoned, &Actor::new("clerk-1"))
            .await
            .unwrap();
        assert_eq!(abandoned.status, OrderStatus::Abandoned);
        assert_eq!(fx.inventory.get_item(&frame.id).await.unwrap().quantity_on_hand, 3);
    }

    #[tokio::test]
    async fn test_create_order_with_unknown_patient() {
        let fx = setup(EngineConfig::default()).await;
        let err = fx
            .engine
            .create_order(Some("ghost"), "clerk-1", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let patient = fx.db.patients().insert("Ada Lovelace", None).await.unwrap();
        let order = fx
            .engine
            .create_order(Some(&patient.id), "clerk-1", None)
            .await
            .unwrap();
        assert_eq!(order.patient_id.as_deref(), Some(patient.id.as_str()));
        assert_eq!(
            fx.engine.list_orders_by_status(OrderStatus::Pending).await.unwrap().len(),
            1
        );
    }
}
