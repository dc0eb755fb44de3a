//! # Payment Recorder
//!
//! Appends payments and keeps the owning order's balance in step.
//!
//! ## Record Payment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    order = header(order_id)            Abandoned → InvalidTransition    │
//! │    shift = resolve(method, receiver)   cash/card/bank without an        │
//! │                                        Active shift → NoActiveShift     │
//! │    INSERT INTO payments                                                 │
//! │    recalculate(order)                  amount_paid = Σ payments         │
//! │                                        balance_due = total - paid       │
//! │  COMMIT   (either both rows change or neither does)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payments are never updated or deleted; `amount_paid` is always re-derived
//! from the full set, so two payments of `a1` and `a2` leave the same
//! balance as one payment of `a1 + a2`.

use chrono::Utc;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use optica_core::validation::{validate_payment_amount, validate_text};
use optica_core::{
    AuditAction, AuditEvent, AuditSink, CoreError, EntityType, NewPayment, OrderStatus, Payment,
    PaymentReceipt, ShiftStatus, ValidationError, ValidationErrors,
};

use crate::error::{DbError, DbResult};
use crate::order::OrderEngine;
use crate::pool::begin_write;
use crate::shift::ShiftLedger;

/// Payment Recorder: record payments, list them per order.
#[derive(Debug, Clone)]
pub struct PaymentRecorder {
    pool: SqlitePool,
    orders: OrderEngine,
    shifts: ShiftLedger,
    audit: Arc<dyn AuditSink>,
}

impl PaymentRecorder {
    pub fn new(
        pool: SqlitePool,
        orders: OrderEngine,
        shifts: ShiftLedger,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        PaymentRecorder {
            pool,
            orders,
            shifts,
            audit,
        }
    }

    /// Records one payment and recomputes the order's balance.
    ///
    /// ## Shift Attachment
    /// - Cash, card and bank transfer must land on an Active shift owned by
    ///   the receiver: the one given, or else the receiver's current shift.
    /// - Insurance and vouchers take the receiver's Active shift if there
    ///   is one, and are recorded without a shift otherwise.
    ///
    /// ## Errors
    /// - `ValidationError` for a non-positive amount, or an overpayment
    ///   under `OverpaymentPolicy::Reject`
    /// - `NoActiveShift` for a shift-linked method without an Active shift
    /// - `InvalidTransition` for payments against an abandoned order
    pub async fn record_payment(&self, new: NewPayment) -> DbResult<PaymentReceipt> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_payment_amount(new.amount_cents));
        errors.check(validate_text("received_by", &new.received_by, 100));
        errors.into_result()?;

        let mut tx = begin_write(&self.pool).await?;

        let order = self.orders.header_in(&mut tx, &new.order_id).await?;
        if order.status == OrderStatus::Abandoned {
            return Err(CoreError::invalid_transition("SalesOrder", &order.id, order.status, "paid").into());
        }

        let shift_id = self.resolve_shift_in(&mut tx, &new).await?;

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            order_id: new.order_id.clone(),
            amount_cents: new.amount_cents,
            method: new.method,
            bank_name: new.bank_name.clone(),
            transaction_ref: new.transaction_ref.clone(),
            received_by: new.received_by.clone(),
            shift_id: shift_id.clone(),
            paid_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, amount_cents, method, bank_name,
                transaction_ref, received_by, shift_id, paid_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(&payment.bank_name)
        .bind(&payment.transaction_ref)
        .bind(&payment.received_by)
        .bind(&payment.shift_id)
        .bind(payment.paid_at)
        .execute(&mut *tx)
        .await?;

        let order = self.orders.recalculate_in(&mut tx, &payment.order_id).await?;

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            amount_cents = payment.amount_cents,
            method = ?payment.method,
            shift_id = ?payment.shift_id,
            balance_due_cents = order.balance_due_cents,
            "Payment recorded"
        );
        self.audit.record(
            AuditEvent::new(&payment.received_by, EntityType::Payment, &payment.id, AuditAction::Payment)
                .with_after(&payment),
        );

        Ok(PaymentReceipt {
            payment,
            order,
            shift_id,
        })
    }

    /// Payments of one order, oldest first.
    ///
    /// Lazy: rows are decoded as the stream is polled.
    pub fn payments_for_order<'a>(&'a self, order_id: &'a str) -> BoxStream<'a, DbResult<Payment>> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, amount_cents, method, bank_name,
                   transaction_ref, received_by, shift_id, paid_at
            FROM payments
            WHERE order_id = ?1
            ORDER BY paid_at, rowid
            "#,
        )
        .bind(order_id)
        .fetch(&self.pool)
        .map_err(DbError::from)
        .boxed()
    }

    /// Collects [`PaymentRecorder::payments_for_order`].
    pub async fn list_payments_for_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        self.payments_for_order(order_id).try_collect().await
    }

    async fn resolve_shift_in(
        &self,
        conn: &mut SqliteConnection,
        new: &NewPayment,
    ) -> DbResult<Option<String>> {
        let linked = new.method.is_shift_linked();
        let no_shift = || -> DbError {
            CoreError::NoActiveShift {
                user_id: new.received_by.clone(),
            }
            .into()
        };

        if let Some(shift_id) = new.shift_id.as_deref() {
            let shift = self.shifts.get_shift_in(conn, shift_id).await?.ok_or_else(|| {
                ValidationError::UnknownReference {
                    field: "shift_id".to_string(),
                    entity: "Shift".to_string(),
                    id: shift_id.to_string(),
                }
            })?;

            if shift.status == ShiftStatus::Active && shift.user_id == new.received_by {
                return Ok(Some(shift.id));
            }
            if linked {
                debug!(shift_id = %shift_id, status = %shift.status, "Given shift cannot take payments");
                return Err(no_shift());
            }
        }

        match self.shifts.active_shift_in(conn, &new.received_by).await? {
            Some(shift) => Ok(Some(shift.id)),
            None if linked => Err(no_shift()),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
