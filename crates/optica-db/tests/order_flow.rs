//! End-to-end order fulfillment through `Services`.

use std::path::PathBuf;
use std::sync::Arc;

use optica_core::{
    Actor, AuditAction, EngineConfig, EntityType, ErrorCode, InventoryItem, ItemSpec,
    MemoryAuditSink, NewPayment, NewPurchaseOrderLine, OrderStatus, PaymentMethod,
    SalesOrder,
};
use optica_db::{Database, DbConfig, NewInventoryItem, Services};

struct World {
    db: Database,
    services: Services,
    sink: Arc<MemoryAuditSink>,
}

async fn world() -> World {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let sink = Arc::new(MemoryAuditSink::new());
    let services = Services::new(&db, EngineConfig::default(), sink.clone());
    World { db, services, sink }
}

/// File-backed database so several pooled connections really contend.
async fn file_world() -> (World, PathBuf) {
    let path = std::env::temp_dir().join(format!("optica-{}.db", uuid::Uuid::new_v4()));
    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let sink = Arc::new(MemoryAuditSink::new());
    let services = Services::new(&db, EngineConfig::default(), sink.clone());
    (World { db, services, sink }, path)
}

async fn remove_world(world: World, path: PathBuf) {
    world.db.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.clone().into_os_string();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
}

async fn item(world: &World, sku: &str, qty: i64, price_cents: i64) -> InventoryItem {
    world
        .db
        .catalog()
        .insert_inventory_item(NewInventoryItem::new(sku, sku, price_cents).with_quantity(qty))
        .await
        .unwrap()
}

async fn on_hand(world: &World, item_id: &str) -> i64 {
    world
        .services
        .inventory
        .get_item(item_id)
        .await
        .unwrap()
        .quantity_on_hand
}

fn manager() -> Actor {
    Actor::new("manager-1").with_permission("grant_discount")
}

fn assert_totals_consistent(order: &SalesOrder) {
    assert_eq!(order.total_cents, order.subtotal_cents - order.discount_cents);
    assert_eq!(order.balance_due_cents, order.total_cents - order.amount_paid_cents);
}

/// Scenario A: one stock line, qty 2 at 10.00, discount 5.00.
async fn scenario_a(world: &World) -> (SalesOrder, InventoryItem) {
    let frame = item(world, "FR-1", 10, 1_000).await;
    let order = world
        .services
        .orders
        .create_order(None, "clerk-1", None)
        .await
        .unwrap();
    world
        .services
        .orders
        .add_item(&order.id, ItemSpec::stock(&frame.id, 2))
        .await
        .unwrap();
    let order = world
        .services
        .orders
        .set_discount(&order.id, 500, &manager())
        .await
        .unwrap();
    (order, frame)
}

#[tokio::test]
async fn scenario_a_discounted_order_totals() {
    let world = world().await;
    let (order, frame) = scenario_a(&world).await;

    assert_eq!(order.subtotal_cents, 2_000);
    assert_eq!(order.total_cents, 1_500);
    assert_eq!(order.balance_due_cents, 1_500);
    assert_totals_consistent(&order);
    assert_eq!(on_hand(&world, &frame.id).await, 8);
}

#[tokio::test]
async fn scenario_b_cash_payment_reduces_balance() {
    let world = world().await;
    let shift = world.services.shifts.start_shift("clerk-1", 0).await.unwrap();
    let (order, _) = scenario_a(&world).await;

    let receipt = world
        .services
        .payments
        .record_payment(
            NewPayment::new(&order.id, 1_000, PaymentMethod::Cash, "clerk-1").with_shift(&shift.id),
        )
        .await
        .unwrap();

    assert_eq!(receipt.order.amount_paid_cents, 1_000);
    assert_eq!(receipt.order.balance_due_cents, 500);
    assert_eq!(receipt.shift_id.as_deref(), Some(shift.id.as_str()));
    assert_totals_consistent(&receipt.order);
}

#[tokio::test]
async fn scenario_c_abandon_with_restock() {
    let world = world().await;
    world.services.shifts.start_shift("clerk-1", 0).await.unwrap();
    let (order, frame) = scenario_a(&world).await;
    world
        .services
        .payments
        .record_payment(NewPayment::new(&order.id, 1_000, PaymentMethod::Cash, "clerk-1"))
        .await
        .unwrap();

    let line_ids: Vec<String> = world
        .services
        .orders
        .list_items(&order.id)
        .await
        .unwrap()
        .into_iter()
        .map(|line| line.id)
        .collect();
    let before = on_hand(&world, &frame.id).await;

    let abandoned = world
        .services
        .orders
        .abandon_order(&order.id, &line_ids, &Actor::new("clerk-1"))
        .await
        .unwrap();

    assert_eq!(abandoned.status, OrderStatus::Abandoned);
    assert_eq!(on_hand(&world, &frame.id).await, before + 2);

    // A second abandon is refused and restocks nothing.
    let err = world
        .services
        .orders
        .abandon_order(&order.id, &line_ids, &Actor::new("clerk-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTransition);
    assert_eq!(on_hand(&world, &frame.id).await, before + 2);
}

#[tokio::test]
async fn scenario_d_insufficient_stock_leaves_no_trace() {
    let world = world().await;
    let frame = item(&world, "FR-1", 3, 1_000).await;
    let order = world
        .services
        .orders
        .create_order(None, "clerk-1", None)
        .await
        .unwrap();

    let err = world
        .services
        .orders
        .add_item(&order.id, ItemSpec::stock(&frame.id, 5))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::InsufficientStock);
    assert_eq!(on_hand(&world, &frame.id).await, 3);
    let order = world.services.orders.get_order(&order.id).await.unwrap();
    assert!(order.items.is_empty());
    assert_eq!(order.subtotal_cents, 0);
}

#[tokio::test]
async fn scenario_e_second_shift_conflicts() {
    let world = world().await;
    world.services.shifts.start_shift("clerk-1", 0).await.unwrap();

    let err = world.services.shifts.start_shift("clerk-1", 0).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[tokio::test]
async fn partial_restock_touches_only_selected_stock_lines() {
    let world = world().await;
    let frame = item(&world, "FR-1", 5, 9_000).await;
    let lens = item(&world, "LN-1", 5, 3_000).await;
    let exam = world
        .db
        .catalog()
        .insert_service_product("Eye exam", 4_500)
        .await
        .unwrap();

    let order = world
        .services
        .orders
        .create_order(None, "clerk-1", None)
        .await
        .unwrap();
    let orders = &world.services.orders;
    orders.add_item(&order.id, ItemSpec::stock(&frame.id, 1)).await.unwrap();
    let lens_line = orders.add_item(&order.id, ItemSpec::stock(&lens.id, 2)).await.unwrap();
    let exam_line = orders.add_item(&order.id, ItemSpec::service(&exam.id, 1)).await.unwrap();
    orders
        .change_status(&order.id, OrderStatus::Confirmed, &Actor::new("clerk-1"))
        .await
        .unwrap();

    // The frame already went to the workshop; only the lenses come back.
    orders
        .abandon_order(
            &order.id,
            &[lens_line.id.clone(), exam_line.id.clone()],
            &Actor::new("clerk-1"),
        )
        .await
        .unwrap();

    assert_eq!(on_hand(&world, &frame.id).await, 4);
    assert_eq!(on_hand(&world, &lens.id).await, 5);
}

#[tokio::test]
async fn split_payments_match_a_single_payment() {
    let world = world().await;
    world.services.shifts.start_shift("clerk-1", 0).await.unwrap();

    let (split, _) = scenario_a(&world).await;
    for amount in [400, 700] {
        world
            .services
            .payments
            .record_payment(NewPayment::new(&split.id, amount, PaymentMethod::Cash, "clerk-1"))
            .await
            .unwrap();
    }

    let lens = item(&world, "LN-1", 10, 1_000).await;
    let single = world
        .services
        .orders
        .create_order(None, "clerk-1", None)
        .await
        .unwrap();
    world
        .services
        .orders
        .add_item(&single.id, ItemSpec::stock(&lens.id, 2))
        .await
        .unwrap();
    world
        .services
        .orders
        .set_discount(&single.id, 500, &manager())
        .await
        .unwrap();
    world
        .services
        .payments
        .record_payment(NewPayment::new(&single.id, 1_100, PaymentMethod::Card, "clerk-1"))
        .await
        .unwrap();

    let split = world.services.orders.get_order(&split.id).await.unwrap();
    let single = world.services.orders.get_order(&single.id).await.unwrap();
    assert_eq!(split.balance_due_cents, single.balance_due_cents);
    assert_eq!(split.balance_due_cents, 400);
    assert_totals_consistent(&split);
}

#[tokio::test]
async fn receiving_to_full_receipt_then_refusal() {
    let world = world().await;
    let lens = item(&world, "LN-1", 2, 3_000).await;
    let po = world
        .db
        .purchase_orders()
        .create(
            "Lens Supplier Ltd",
            &[NewPurchaseOrderLine {
                inventory_item_id: lens.id.clone(),
                quantity_ordered: 9,
                unit_price_cents: 1_200,
            }],
        )
        .await
        .unwrap();
    let line_id = po.items[0].id.clone();
    let actor = Actor::new("stock-1");

    for qty in [2, 3, 4] {
        world
            .services
            .receiving
            .receive_stock(&line_id, &po.id, qty, 1_250, &actor)
            .await
            .unwrap();
    }
    assert_eq!(on_hand(&world, &lens.id).await, 11);

    let err = world
        .services
        .receiving
        .receive_stock(&line_id, &po.id, 1, 1_250, &actor)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert_eq!(on_hand(&world, &lens.id).await, 11);
}

#[tokio::test]
async fn every_mutation_leaves_an_audit_trail() {
    let world = world().await;
    world.services.shifts.start_shift("clerk-1", 0).await.unwrap();
    let (order, frame) = scenario_a(&world).await;
    world
        .services
        .inventory
        .adjust(&frame.id, -1, "damaged", &Actor::new("clerk-1"))
        .await
        .unwrap();
    world
        .services
        .orders
        .change_status(&order.id, OrderStatus::Abandoned, &Actor::new("clerk-1"))
        .await
        .unwrap();

    let events = world.sink.events();
    let order_actions: Vec<AuditAction> = events
        .iter()
        .filter(|e| e.entity_type == EntityType::SalesOrder && e.entity_id == order.id)
        .map(|e| e.action_type)
        .collect();
    assert_eq!(
        order_actions,
        vec![
            AuditAction::Create,
            AuditAction::AddItem,
            AuditAction::DiscountChange,
            AuditAction::Abandon
        ]
    );
    assert!(events
        .iter()
        .any(|e| e.action_type == AuditAction::StockAdjust && e.entity_id == frame.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_orders_cannot_both_sell_the_last_unit() {
    let (world, path) = file_world().await;
    let frame = item(&world, "FR-LAST", 1, 12_000).await;
    let orders = &world.services.orders;
    let first = orders.create_order(None, "clerk-1", None).await.unwrap();
    let second = orders.create_order(None, "clerk-2", None).await.unwrap();

    let (a, b) = tokio::join!(
        orders.add_item(&first.id, ItemSpec::stock(&frame.id, 1)),
        orders.add_item(&second.id, ItemSpec::stock(&frame.id, 1)),
    );

    let codes: Vec<ErrorCode> = [&a, &b]
        .iter()
        .filter_map(|result| result.as_ref().err().map(|e| e.code()))
        .collect();
    assert_eq!(codes, vec![ErrorCode::InsufficientStock]);
    assert_eq!(on_hand(&world, &frame.id).await, 0);

    let lines = orders.list_items(&first.id).await.unwrap().len()
        + orders.list_items(&second.id).await.unwrap().len();
    assert_eq!(lines, 1);

    remove_world(world, path).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deductions_never_oversell() {
    let (world, path) = file_world().await;
    let lens = item(&world, "LN-RACE", 3, 3_000).await;
    let inventory = &world.services.inventory;

    let results = futures::future::join_all((0..5).map(|_| inventory.deduct(&lens.id, 1))).await;

    let sold = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(sold, 3);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.code() == ErrorCode::InsufficientStock));
    assert_eq!(on_hand(&world, &lens.id).await, 0);

    remove_world(world, path).await;
}
