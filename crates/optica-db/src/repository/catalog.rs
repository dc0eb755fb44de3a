//! # Catalog Repository
//!
//! Inventory items and service products.
//!
//! Catalog rows are created and read here; `quantity_on_hand` is written
//! once at insert and afterwards only by the [`crate::InventoryLedger`].

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use optica_core::validation::{validate_price_cents, validate_text};
use optica_core::{InventoryItem, ServiceProduct, ValidationError, ValidationErrors};

use crate::error::{DbError, DbResult};

/// A catalog entry to create.
///
/// ## Example
/// ```rust,ignore
/// let lens = NewInventoryItem::new("LNS-167", "1.67 single vision blank", 4_500)
///     .with_cost_price(1_800)
///     .with_quantity(40)
///     .with_min_stock_level(10);
/// ```
#[derive(Debug, Clone)]
pub struct NewInventoryItem {
    pub sku: String,
    pub name: String,
    pub quantity_on_hand: i64,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    pub min_stock_level: i64,
    pub stock_tracked: bool,
}

impl NewInventoryItem {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, selling_price_cents: i64) -> Self {
        NewInventoryItem {
            sku: sku.into(),
            name: name.into(),
            quantity_on_hand: 0,
            cost_price_cents: 0,
            selling_price_cents,
            min_stock_level: 0,
            stock_tracked: true,
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity_on_hand = quantity;
        self
    }

    pub fn with_cost_price(mut self, cents: i64) -> Self {
        self.cost_price_cents = cents;
        self
    }

    pub fn with_min_stock_level(mut self, level: i64) -> Self {
        self.min_stock_level = level;
        self
    }

    /// Sold without ever touching `quantity_on_hand`.
    pub fn untracked(mut self) -> Self {
        self.stock_tracked = false;
        self
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_text("sku", &self.sku, 50));
        errors.check(validate_text("name", &self.name, 200));
        errors.check(validate_price_cents(self.selling_price_cents));
        errors.check(validate_price_cents(self.cost_price_cents));
        for (field, value) in [
            ("quantity_on_hand", self.quantity_on_hand),
            ("min_stock_level", self.min_stock_level),
        ] {
            if value < 0 {
                errors.push(ValidationError::MustNotBeNegative {
                    field: field.to_string(),
                });
            }
        }
        errors.into_result()
    }
}

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Inventory Items
    // =========================================================================

    /// Inserts an inventory item and returns it.
    ///
    /// A duplicate SKU surfaces as [`DbError::UniqueViolation`].
    pub async fn insert_inventory_item(&self, new: NewInventoryItem) -> DbResult<InventoryItem> {
        new.validate()?;

        let now = Utc::now();
        let item = InventoryItem {
            id: Uuid::new_v4().to_string(),
            sku: new.sku.trim().to_string(),
            name: new.name.trim().to_string(),
            quantity_on_hand: new.quantity_on_hand,
            cost_price_cents: new.cost_price_cents,
            selling_price_cents: new.selling_price_cents,
            min_stock_level: new.min_stock_level,
            is_active: true,
            stock_tracked: new.stock_tracked,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %item.id, sku = %item.sku, "Inserting inventory item");

        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, sku, name, quantity_on_hand, cost_price_cents,
                selling_price_cents, min_stock_level, is_active, stock_tracked,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.quantity_on_hand)
        .bind(item.cost_price_cents)
        .bind(item.selling_price_cents)
        .bind(item.min_stock_level)
        .bind(item.is_active)
        .bind(item.stock_tracked)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(item)
    }

    /// Gets an inventory item by ID.
    pub async fn get_inventory_item(&self, id: &str) -> DbResult<Option<InventoryItem>> {
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
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Gets an inventory item by SKU.
    pub async fn get_inventory_item_by_sku(&self, sku: &str) -> DbResult<Option<InventoryItem>> {
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT
                id, sku, name, quantity_on_hand, cost_price_cents,
                selling_price_cents, min_stock_level, is_active, stock_tracked,
                created_at, updated_at
            FROM inventory_items
            WHERE sku = ?1
            "#,
        )
        .bind(sku.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Searches active items by SKU or name prefix/substring.
    pub async fn search_inventory(&self, query: &str, limit: u32) -> DbResult<Vec<InventoryItem>> {
        let pattern = format!("%{}%", query.trim());

        let items = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT
                id, sku, name, quantity_on_hand, cost_price_cents,
                selling_price_cents, min_stock_level, is_active, stock_tracked,
                created_at, updated_at
            FROM inventory_items
            WHERE is_active = 1 AND (sku LIKE ?1 OR name LIKE ?1)
            ORDER BY name, rowid
            LIMIT ?2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = items.len(), "Inventory search returned items");
        Ok(items)
    }

    /// Marks an item inactive. Inactive items leave the low-stock report and
    /// can no longer be added to orders.
    pub async fn deactivate_inventory_item(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE inventory_items SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InventoryItem", id));
        }
        Ok(())
    }

    /// Counts inventory items.
    pub async fn count_inventory_items(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Service Products
    // =========================================================================

    /// Inserts a service product (exam, fitting, repair labour).
    pub async fn insert_service_product(
        &self,
        name: &str,
        price_cents: i64,
    ) -> DbResult<ServiceProduct> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_text("name", name, 200));
        errors.check(validate_price_cents(price_cents));
        errors.into_result()?;

        let product = ServiceProduct {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            price_cents,
            is_active: true,
            created_at: Utc::now(),
        };

        debug!(id = %product.id, name = %product.name, "Inserting service product");

        sqlx::query(
            r#"
            INSERT INTO service_products (id, name, price_cents, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a service product by ID.
    pub async fn get_service_product(&self, id: &str) -> DbResult<Option<ServiceProduct>> {
        let product = sqlx::query_as::<_, ServiceProduct>(
            "SELECT id, name, price_cents, is_active, created_at FROM service_products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists active service products by name.
    pub async fn list_service_products(&self) -> DbResult<Vec<ServiceProduct>> {
        let products = sqlx::query_as::<_, ServiceProduct>(
            r#"
            SELECT id, name, price_cents, is_active, created_at
            FROM service_products
            WHERE is_active = 1
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_and_get_items() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        let item = repo
            .insert_inventory_item(NewInventoryItem::new("LNS-167", "1.67 lens blank", 4_500).with_quantity(40))
            .await
            .unwrap();

        let by_id = repo.get_inventory_item(&item.id).await.unwrap().unwrap();
        assert_eq!(by_id.sku, "LNS-167");
        assert!(by_id.stock_tracked);

        let by_sku = repo.get_inventory_item_by_sku("LNS-167").await.unwrap().unwrap();
        assert_eq!(by_sku.id, item.id);

        assert_eq!(repo.search_inventory("lens", 10).await.unwrap().len(), 1);
        assert_eq!(repo.count_inventory_items().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_a_conflict() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        repo.insert_inventory_item(NewInventoryItem::new("FR-01", "Frame", 100))
            .await
            .unwrap();
        let err = repo
            .insert_inventory_item(NewInventoryItem::new("FR-01", "Other frame", 100))
            .await
            .unwrap_err();
        assert_eq!(err.code(), optica_core::ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_invalid_item_reports_every_field() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .catalog()
            .insert_inventory_item(NewInventoryItem::new("", "", -1).with_quantity(-5))
            .await
            .unwrap_err();

        match err {
            DbError::Domain(optica_core::CoreError::Validation(errors)) => {
                assert_eq!(errors.len(), 4)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_service_products() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        let exam = repo.insert_service_product("Eye exam", 6_000).await.unwrap();
        assert_eq!(repo.get_service_product(&exam.id).await.unwrap().unwrap().price_cents, 6_000);
        assert_eq!(repo.list_service_products().await.unwrap().len(), 1);
    }
}
