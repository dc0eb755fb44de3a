//! # Seed Data Generator
//!
//! Populates a development database with a small optical practice.
//!
//! ## Usage
//! ```bash
//! # Seed ./optica_dev.db
//! cargo run -p optica-db --bin seed
//!
//! # Specify database path
//! cargo run -p optica-db --bin seed -- --db ./data/optica.db
//!
//! # Or through the environment
//! OPTICA_DB_PATH=./data/optica.db cargo run -p optica-db --bin seed
//! ```
//!
//! ## Generated Data
//! - Frames and lens blanks (stock tracked, some already low)
//! - Service products (eye exam, fitting, repair)
//! - One patient, one open shift for `clerk-1`
//! - One order with a frame, lenses and an exam, part-paid in cash
//! - One purchase order, partially received

use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use optica_core::{
    Actor, EngineConfig, ItemSpec, NewPayment, NewPurchaseOrderLine, PaymentMethod,
};
use optica_db::{Database, DbConfig, NewInventoryItem, Services, SqliteAuditSink};

/// (sku, name, selling price cents, quantity, min level)
const FRAMES: &[(&str, &str, i64, i64, i64)] = &[
    ("FR-RND-01", "Round metal frame, gold", 12_000, 6, 2),
    ("FR-RND-02", "Round metal frame, silver", 12_000, 1, 2),
    ("FR-SQR-01", "Square acetate frame, black", 9_500, 10, 3),
    ("FR-SQR-02", "Square acetate frame, tortoise", 9_500, 4, 3),
    ("FR-CAT-01", "Cat-eye frame, red", 14_000, 2, 2),
    ("FR-KID-01", "Kids flexible frame, blue", 6_000, 8, 2),
];

const LENSES: &[(&str, &str, i64, i64, i64)] = &[
    ("LN-150-SV", "1.50 single vision blank", 3_000, 40, 10),
    ("LN-160-SV", "1.60 single vision blank", 5_500, 20, 8),
    ("LN-167-SV", "1.67 single vision blank", 8_000, 6, 6),
    ("LN-150-PR", "1.50 progressive blank", 11_000, 5, 4),
];

const SERVICES: &[(&str, i64)] = &[
    ("Eye exam", 4_500),
    ("Frame fitting", 1_500),
    ("Frame repair", 2_500),
    ("Contact lens consultation", 6_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,optica=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = env::var("OPTICA_DB_PATH").unwrap_or_else(|_| String::from("./optica_dev.db"));

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Optica POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./optica_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let audit = Arc::new(SqliteAuditSink::new(db.audit_log()));
    let services = Services::new(&db, EngineConfig::from_env(), audit.clone());

    let existing = db.catalog().count_inventory_items().await?;
    if existing > 0 {
        warn!(existing, "Database already has inventory; skipping seed. Delete the file to regenerate.");
        return Ok(());
    }

    // Catalog
    let mut stock = Vec::new();
    for (sku, name, price, qty, min) in FRAMES.iter().chain(LENSES) {
        let item = db
            .catalog()
            .insert_inventory_item(
                NewInventoryItem::new(*sku, *name, *price)
                    .with_cost_price(price * 45 / 100)
                    .with_quantity(*qty)
                    .with_min_stock_level(*min),
            )
            .await?;
        stock.push(item);
    }

    let mut services_by_name = Vec::new();
    for (name, price) in SERVICES {
        services_by_name.push(db.catalog().insert_service_product(name, *price).await?);
    }
    info!(
        stock_items = stock.len(),
        service_products = services_by_name.len(),
        "Catalog seeded"
    );

    // A patient walks in
    let patient = db.patients().insert("Grace Hopper", Some("+1 555 0100")).await?;
    let shift = services.shifts.start_shift("clerk-1", 20_000).await?;

    let order = services
        .orders
        .create_order(Some(&patient.id), "clerk-1", Some(&shift.id))
        .await?;
    services
        .orders
        .add_item(&order.id, ItemSpec::stock(&stock[0].id, 1))
        .await?;
    services
        .orders
        .add_item(
            &order.id,
            ItemSpec::Stock {
                inventory_item_id: stock[FRAMES.len() + 1].id.clone(),
                quantity: 2,
                unit_price_cents: None,
                configuration: Some(serde_json::json!({
                    "sphereRight": -1.75,
                    "sphereLeft": -2.00,
                    "coating": "anti-reflective"
                })),
            },
        )
        .await?;
    services
        .orders
        .add_item(&order.id, ItemSpec::service(&services_by_name[0].id, 1))
        .await?;

    let manager = Actor::new("manager-1").with_permission(services.config.discount_permission.clone());
    services.orders.set_discount(&order.id, 1_000, &manager).await?;

    let receipt = services
        .payments
        .record_payment(NewPayment::new(&order.id, 10_000, PaymentMethod::Cash, "clerk-1"))
        .await?;
    info!(
        order_id = %order.id,
        total_cents = receipt.order.total_cents,
        balance_due_cents = receipt.order.balance_due_cents,
        "Sample order seeded"
    );

    // Reorder whatever is running low
    let low: Vec<_> = services.inventory.list_low_stock().await?;
    info!(count = low.len(), "Low stock items");

    if let Some(item) = low.first() {
        let po = db
            .purchase_orders()
            .create(
                "Frame Supplier Ltd",
                &[NewPurchaseOrderLine {
                    inventory_item_id: item.id.clone(),
                    quantity_ordered: 10,
                    unit_price_cents: item.cost_price_cents,
                }],
            )
            .await?;
        services
            .receiving
            .receive_stock(
                &po.items[0].id,
                &po.id,
                4,
                item.cost_price_cents,
                &Actor::new("stock-1"),
            )
            .await?;
        info!(po_id = %po.id, "Purchase order seeded");
    }

    audit.flush().await;
    info!("Seed complete");
    Ok(())
}
