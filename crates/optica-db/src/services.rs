//! # Services
//!
//! Composition root: builds every ledger and engine over one pool, one
//! policy and one audit sink.
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │  InventoryLedger │◄──────────────┐
//!                 └────────▲─────────┘               │
//!                          │                         │
//! ┌──────────────┐   ┌─────┴────────┐   ┌────────────┴─────┐
//! │  ShiftLedger │◄──┤PaymentRecorder│   │  ReceivingEngine │
//! └──────────────┘   └─────┬────────┘   └──────────────────┘
//!                          │
//!                    ┌─────▼────────┐
//!                    │  OrderEngine │──► InventoryLedger
//!                    └──────────────┘
//! ```

use std::sync::Arc;

use optica_core::{AuditSink, EngineConfig};

use crate::inventory::InventoryLedger;
use crate::order::OrderEngine;
use crate::payment::PaymentRecorder;
use crate::pool::Database;
use crate::receiving::ReceivingEngine;
use crate::shift::ShiftLedger;

/// Every engine, wired together.
#[derive(Debug, Clone)]
pub struct Services {
    pub inventory: InventoryLedger,
    pub shifts: ShiftLedger,
    pub orders: OrderEngine,
    pub payments: PaymentRecorder,
    pub receiving: ReceivingEngine,
    pub config: Arc<EngineConfig>,
}

impl Services {
    pub fn new(db: &Database, config: EngineConfig, audit: Arc<dyn AuditSink>) -> Self {
        let pool = db.pool().clone();
        let config = Arc::new(config);

        let inventory = InventoryLedger::new(pool.clone(), audit.clone());
        let shifts = ShiftLedger::new(pool.clone(), audit.clone());
        let orders = OrderEngine::new(pool.clone(), config.clone(), inventory.clone(), audit.clone());
        let payments = PaymentRecorder::new(pool.clone(), orders.clone(), shifts.clone(), audit.clone());
        let receiving = ReceivingEngine::new(pool, inventory.clone(), audit);

        Services {
            inventory,
            shifts,
            orders,
            payments,
            receiving,
            config,
        }
    }
}
