//! # Audit Facts
//!
//! Every state-changing operation emits one [`AuditEvent`] after its
//! transaction commits. Emission is fire-and-forget: a sink must never fail
//! the business operation that produced the event.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Engine op ──► BEGIN ... COMMIT ──► AuditEvent ──► dyn AuditSink        │
//! │                                                        │                │
//! │                                  ┌─────────────────────┴──────────┐     │
//! │                                  ▼                                ▼     │
//! │                       SqliteAuditSink (optica-db)     MemoryAuditSink   │
//! │                       background insert, logs on       (tests)          │
//! │                       failure                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Mutex;
use ts_rs::TS;

/// Kind of entity an audit event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    SalesOrder,
    SalesOrderItem,
    Payment,
    Shift,
    InventoryItem,
    PurchaseOrder,
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    AddItem,
    RemoveItem,
    StatusChange,
    DiscountChange,
    Abandon,
    Payment,
    StockAdjust,
    Receive,
    ShiftStart,
    ShiftPause,
    ShiftResume,
    ShiftEnd,
    ShiftInterrupt,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::AddItem => "add_item",
            AuditAction::RemoveItem => "remove_item",
            AuditAction::StatusChange => "status_change",
            AuditAction::DiscountChange => "discount_change",
            AuditAction::Abandon => "abandon",
            AuditAction::Payment => "payment",
            AuditAction::StockAdjust => "stock_adjust",
            AuditAction::Receive => "receive",
            AuditAction::ShiftStart => "shift_start",
            AuditAction::ShiftPause => "shift_pause",
            AuditAction::ShiftResume => "shift_resume",
            AuditAction::ShiftEnd => "shift_end",
            AuditAction::ShiftInterrupt => "shift_interrupt",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit fact: who did what to which entity, with before/after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub actor_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action_type: AuditAction,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor_id: impl Into<String>,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        action_type: AuditAction,
    ) -> Self {
        AuditEvent {
            id: uuid::Uuid::new_v4().to_string(),
            actor_id: actor_id.into(),
            entity_type,
            entity_id: entity_id.into(),
            action_type,
            before_state: None,
            after_state: None,
            timestamp: Utc::now(),
        }
    }

    /// Snapshot before the change. Unserializable states are recorded as absent.
    pub fn with_before(mut self, state: impl Serialize) -> Self {
        self.before_state = serde_json::to_value(state).ok();
        self
    }

    /// Snapshot after the change.
    pub fn with_after(mut self, state: impl Serialize) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }
}

/// A manual inventory correction, as recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub item_id: String,
    pub delta: i64,
    pub reason_code: String,
    pub before_qty: i64,
    pub after_qty: i64,
    pub actor_id: String,
}

impl StockAdjustment {
    /// Converts to an audit event with quantity snapshots on both sides.
    pub fn into_event(self) -> AuditEvent {
        let before = serde_json::json!({ "quantityOnHand": self.before_qty });
        let after = serde_json::json!({
            "quantityOnHand": self.after_qty,
            "delta": self.delta,
            "reasonCode": self.reason_code,
        });
        AuditEvent::new(
            self.actor_id,
            EntityType::InventoryItem,
            self.item_id,
            AuditAction::StockAdjust,
        )
        .with_before(before)
        .with_after(after)
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Destination for audit events.
///
/// `record` cannot fail: implementations that do I/O must handle their own
/// errors (usually by logging them).
pub trait AuditSink: Send + Sync + fmt::Debug {
    fn record(&self, event: AuditEvent);
}

/// Keeps events in memory. Used by tests and by callers that forward
/// events elsewhere in batches.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_adjustment_event() {
        let event = StockAdjustment {
            item_id: "inv-1".to_string(),
            delta: -2,
            reason_code: "damaged".to_string(),
            before_qty: 10,
            after_qty: 8,
            actor_id: "u-1".to_string(),
        }
        .into_event();

        assert_eq!(event.entity_type, EntityType::InventoryItem);
        assert_eq!(event.action_type, AuditAction::StockAdjust);
        assert_eq!(event.before_state.unwrap()["quantityOnHand"], 10);
        assert_eq!(event.after_state.unwrap()["reasonCode"], "damaged");
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEvent::new("u-1", EntityType::Shift, "s-1", AuditAction::ShiftStart));
        sink.record(AuditEvent::new("u-1", EntityType::Shift, "s-1", AuditAction::ShiftEnd));

        let actions: Vec<_> = sink.events().iter().map(|e| e.action_type).collect();
        assert_eq!(actions, vec![AuditAction::ShiftStart, AuditAction::ShiftEnd]);
    }
}
