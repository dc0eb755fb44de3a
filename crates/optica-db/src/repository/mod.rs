//! # Repository Module
//!
//! Plain persistence for the entities no engine owns exclusively.
//!
//! ## Repository vs. Engine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Repositories (this module)          Engines (crate root)               │
//! │  ───────────────────────────         ────────────────────────────       │
//! │  CatalogRepository                   InventoryLedger                    │
//! │  PatientRepository                   ShiftLedger                        │
//! │  PurchaseOrderRepository             OrderEngine                        │
//! │  AuditLogRepository                  PaymentRecorder                    │
//! │                                      ReceivingEngine                    │
//! │                                                                         │
//! │  create / read rows                  own invariants, state machines     │
//! │  no cross-entity rules               and multi-entity transactions      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Inventory items and service products
//! - [`PatientRepository`](patient::PatientRepository) - Patients
//! - [`PurchaseOrderRepository`](purchase_order::PurchaseOrderRepository) - Supplier orders
//! - [`AuditLogRepository`](audit::AuditLogRepository) - Audit history

pub mod audit;
pub mod catalog;
pub mod patient;
pub mod purchase_order;
