//! # State Machines
//!
//! Transition tables for every status field in the system. Engines ask these
//! tables before writing a status; nothing compares status strings ad hoc.
//!
//! ## Sales Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Pending ──► Confirmed ──► ReadyForPickup ──► Completed (terminal)     │
//! │      │            │               │                                     │
//! │      └────────────┴───────────────┴──────► Abandoned (terminal)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Shift
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   (none) ──start──► Active ◄──resume── Paused                           │
//! │                       │   ──pause───►    │                              │
//! │                       │                  │                              │
//! │                       ├──────end─────────┴──► Ended (terminal)          │
//! │                       │                  │        ▲                     │
//! │                       └──unclean logout──┴──► Interrupted               │
//! │                                                   │                     │
//! │                            resume at login ◄──────┘ (→ Active)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::types::{OrderStatus, PurchaseOrderStatus, ShiftStatus};

// =============================================================================
// Sales Order
// =============================================================================

impl OrderStatus {
    /// Every status this one may legally move to.
    pub const fn allowed_targets(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Abandoned],
            Confirmed => &[ReadyForPickup, Abandoned],
            ReadyForPickup => &[Completed, Abandoned],
            Completed | Abandoned => &[],
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Completed and Abandoned orders never change again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Abandoned)
    }

    /// Whether lines may be added or removed in this status.
    ///
    /// Composition is open only while `Pending`, unless the business has
    /// opted into edits on `Confirmed` orders as well.
    pub const fn allows_item_edits(self, edits_after_pending: bool) -> bool {
        match self {
            OrderStatus::Pending => true,
            OrderStatus::Confirmed => edits_after_pending,
            _ => false,
        }
    }
}

// =============================================================================
// Shift
// =============================================================================

impl ShiftStatus {
    /// Every status this one may legally move to.
    pub const fn allowed_targets(self) -> &'static [ShiftStatus] {
        use ShiftStatus::*;
        match self {
            Active => &[Paused, Ended, Interrupted],
            Paused => &[Active, Ended, Interrupted],
            Interrupted => &[Active, Ended],
            Ended => &[],
        }
    }

    pub fn can_transition_to(self, target: ShiftStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Open shifts count against the one-per-user rule.
    pub const fn is_open(self) -> bool {
        matches!(self, ShiftStatus::Active | ShiftStatus::Paused)
    }

    /// Not cleanly ended: still needs a decision from its owner.
    pub const fn is_unsettled(self) -> bool {
        !matches!(self, ShiftStatus::Ended)
    }
}

// =============================================================================
// Purchase Order
// =============================================================================

impl PurchaseOrderStatus {
    /// Status implied by how many lines are still outstanding.
    pub const fn from_receipt(outstanding_lines: i64, any_received: bool) -> Self {
        if outstanding_lines == 0 {
            PurchaseOrderStatus::Received
        } else if any_received {
            PurchaseOrderStatus::PartiallyReceived
        } else {
            PurchaseOrderStatus::Ordered
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
