//! # optica-db: Ledgers and Engines for Optica POS
//!
//! SQLite persistence plus the five stateful components of the order
//! fulfillment core. Every state-changing operation runs as one
//! transaction; rules come from `optica-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Optica POS Data Flow                             │
//! │                                                                         │
//! │  Order form / payment dialog (presentation layer)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    optica-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐  ┌───────────────┐  ┌──────────────────┐    │   │
//! │  │   │ OrderEngine  │  │PaymentRecorder│  │ ReceivingEngine  │    │   │
//! │  │   └──────┬───────┘  └──┬─────────┬──┘  └────────┬─────────┘    │   │
//! │  │          │             │         │              │              │   │
//! │  │          ▼             ▼         ▼              ▼              │   │
//! │  │   ┌─────────────────────────┐  ┌─────────────┐                 │   │
//! │  │   │    InventoryLedger      │  │ ShiftLedger │                 │   │
//! │  │   └─────────────────────────┘  └─────────────┘                 │   │
//! │  │                                                                 │   │
//! │  │   Database (pool.rs) · migrations · repositories · audit sink  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Shared SQLite database (multi-workstation)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Catalog, patient, purchase order and audit storage
//! - [`inventory`], [`shift`], [`order`], [`payment`], [`receiving`] - Engines
//! - [`services`] - Wires the engines together
//! - [`audit`] - Audit sink backed by `audit_log`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use optica_core::{EngineConfig, ItemSpec, NewPayment, PaymentMethod};
//! use optica_db::{Database, DbConfig, Services, SqliteAuditSink};
//!
//! let db = Database::new(DbConfig::new("optica.db")).await?;
//! let audit = Arc::new(SqliteAuditSink::new(db.audit_log()));
//! let services = Services::new(&db, EngineConfig::from_env(), audit.clone());
//!
//! let shift = services.shifts.start_shift("clerk-1", 10_000).await?;
//! let order = services.orders.create_order(None, "clerk-1", Some(&shift.id)).await?;
//! services.orders.add_item(&order.id, ItemSpec::stock(frame_id, 1)).await?;
//! services
//!     .payments
//!     .record_payment(NewPayment::new(&order.id, 5_000, PaymentMethod::Cash, "clerk-1"))
//!     .await?;
//!
//! audit.flush().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod error;
pub mod inventory;
pub mod migrations;
pub mod order;
pub mod payment;
pub mod pool;
pub mod receiving;
pub mod repository;
pub mod services;
pub mod shift;

// =============================================================================
// Re-exports
// =============================================================================

pub use audit::SqliteAuditSink;
pub use error::{DbError, DbResult};
pub use inventory::InventoryLedger;
pub use order::OrderEngine;
pub use payment::PaymentRecorder;
pub use pool::{Database, DbConfig};
pub use receiving::ReceivingEngine;
pub use services::Services;
pub use shift::ShiftLedger;

// Repository re-exports for convenience
pub use repository::audit::AuditLogRepository;
pub use repository::catalog::{CatalogRepository, NewInventoryItem};
pub use repository::patient::PatientRepository;
pub use repository::purchase_order::PurchaseOrderRepository;
