//! # Shift Ledger
//!
//! Cash-drawer shift lifecycle and "current shift for user" lookups.
//!
//! ## Login Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  User logs in                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  find_open_shift_for_user(user) ── None ──► start_shift(user, float)    │
//! │       │                                                                 │
//! │       │ Some(shift left open by the previous session)                   │
//! │       ▼                                                                 │
//! │  interrupt_shift(shift)   (Active|Paused → Interrupted)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  resolve_interrupted(shift, Resume | ForceEnd { float } | Cancel)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The one-open-shift-per-user rule is checked up front for a readable
//! error, and enforced by a partial unique index for concurrent starts.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

use optica_core::validation::validate_float;
use optica_core::{
    AuditAction, AuditEvent, AuditSink, CoreError, EntityType, Shift, ShiftResolution,
    ShiftStatus, ValidationError,
};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;

/// Shift Ledger: start, pause, resume, end, interrupt, resolve.
#[derive(Debug, Clone)]
pub struct ShiftLedger {
    pool: SqlitePool,
    audit: Arc<dyn AuditSink>,
}

impl ShiftLedger {
    pub fn new(pool: SqlitePool, audit: Arc<dyn AuditSink>) -> Self {
        ShiftLedger { pool, audit }
    }

    /// Opens a new Active shift for `user_id`.
    ///
    /// Fails with `Conflict` if the user already has an Active or Paused
    /// shift.
    pub async fn start_shift(&self, user_id: &str, opening_float_cents: i64) -> DbResult<Shift> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "user_id".to_string(),
            }
            .into());
        }
        validate_float("opening_float", opening_float_cents)?;

        let mut tx = begin_write(&self.pool).await?;

        if let Some(open) = open_shift_in(&mut tx, user_id).await? {
            warn!(user_id = %user_id, shift_id = %open.id, "Shift already open");
            return Err(already_open(user_id));
        }

        let now = Utc::now();
        let shift = Shift {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            started_at: now,
            ended_at: None,
            status: ShiftStatus::Active,
            opening_float_cents,
            closing_float_cents: None,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO shifts (
                id, user_id, started_at, ended_at, status,
                opening_float_cents, closing_float_cents, updated_at
            ) VALUES (?1, ?2, ?3, NULL, ?4, ?5, NULL, ?6)
            "#,
        )
        .bind(&shift.id)
        .bind(&shift.user_id)
        .bind(shift.started_at)
        .bind(shift.status)
        .bind(shift.opening_float_cents)
        .bind(shift.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| open_conflict(e.into(), user_id))?;

        tx.commit().await?;

        info!(shift_id = %shift.id, user_id = %user_id, opening_float_cents, "Shift started");
        self.audit.record(
            AuditEvent::new(user_id, EntityType::Shift, &shift.id, AuditAction::ShiftStart)
                .with_after(&shift),
        );

        Ok(shift)
    }

    /// `Active → Paused`.
    pub async fn pause_shift(&self, shift_id: &str) -> DbResult<Shift> {
        self.transition(shift_id, ShiftStatus::Paused, None, AuditAction::ShiftPause)
            .await
    }

    /// `Paused → Active`.
    pub async fn resume_shift(&self, shift_id: &str) -> DbResult<Shift> {
        let shift = self.get_shift(shift_id).await?;
        if shift.status != ShiftStatus::Paused {
            return Err(CoreError::invalid_transition(
                "Shift",
                shift_id,
                shift.status,
                ShiftStatus::Active,
            )
            .into());
        }
        self.transition(shift_id, ShiftStatus::Active, None, AuditAction::ShiftResume)
            .await
    }

    /// Closes a shift with a counted closing float. Terminal.
    ///
    /// Fails with `NotFound` for an unknown shift and `InvalidTransition`
    /// for one already `Ended`.
    pub async fn end_shift(&self, shift_id: &str, closing_float_cents: i64) -> DbResult<Shift> {
        validate_float("closing_float", closing_float_cents)?;
        self.transition(
            shift_id,
            ShiftStatus::Ended,
            Some(closing_float_cents),
            AuditAction::ShiftEnd,
        )
        .await
    }

    /// Marks a shift left open by an unclean logout. `Active|Paused → Interrupted`.
    pub async fn interrupt_shift(&self, shift_id: &str) -> DbResult<Shift> {
        self.transition(
            shift_id,
            ShiftStatus::Interrupted,
            None,
            AuditAction::ShiftInterrupt,
        )
        .await
    }

    /// Settles a shift found open at login.
    ///
    /// | Resolution | Result |
    /// |---|---|
    /// | `Resume` | `Active` (no-op if already Active) |
    /// | `ForceEnd { closing_float_cents }` | `Ended` with the counted float |
    /// | `Cancel` | `Ended` with no closing float |
    pub async fn resolve_interrupted(
        &self,
        shift_id: &str,
        resolution: ShiftResolution,
    ) -> DbResult<Shift> {
        debug!(shift_id = %shift_id, ?resolution, "Resolving open shift");

        match resolution {
            ShiftResolution::Resume => {
                let shift = self.get_shift(shift_id).await?;
                if shift.status == ShiftStatus::Active {
                    return Ok(shift);
                }
                self.transition(shift_id, ShiftStatus::Active, None, AuditAction::ShiftResume)
                    .await
            }
            ShiftResolution::ForceEnd {
                closing_float_cents,
            } => self.end_shift(shift_id, closing_float_cents).await,
            ShiftResolution::Cancel => {
                self.transition(shift_id, ShiftStatus::Ended, None, AuditAction::ShiftEnd)
                    .await
            }
        }
    }

    /// Gets a shift by ID.
    pub async fn get_shift(&self, shift_id: &str) -> DbResult<Shift> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, shift_id)
            .await?
            .ok_or_else(|| DbError::not_found("Shift", shift_id))
    }

    /// The user's newest shift that was never cleanly ended
    /// (Active, Paused or Interrupted).
    pub async fn find_open_shift_for_user(&self, user_id: &str) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            SELECT id, user_id, started_at, ended_at, status,
                   opening_float_cents, closing_float_cents, updated_at
            FROM shifts
            WHERE user_id = ?1 AND status IN ('active', 'paused', 'interrupted')
            ORDER BY started_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(shift)
    }

    /// The user's Active shift, if any. This is what shift-linked payments
    /// are charged to.
    pub async fn current_shift_for_user(&self, user_id: &str) -> DbResult<Option<Shift>> {
        let mut conn = self.pool.acquire().await?;
        self.active_shift_in(&mut conn, user_id).await
    }

    pub(crate) async fn active_shift_in(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            SELECT id, user_id, started_at, ended_at, status,
                   opening_float_cents, closing_float_cents, updated_at
            FROM shifts
            WHERE user_id = ?1 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(shift)
    }

    pub(crate) async fn get_shift_in(
        &self,
        conn: &mut SqliteConnection,
        shift_id: &str,
    ) -> DbResult<Option<Shift>> {
        get_in(conn, shift_id).await
    }

    /// One guarded status change, checked against the transition table.
    async fn transition(
        &self,
        shift_id: &str,
        target: ShiftStatus,
        closing_float_cents: Option<i64>,
        action: AuditAction,
    ) -> DbResult<Shift> {
        let mut tx = begin_write(&self.pool).await?;

        let before = get_in(&mut tx, shift_id)
            .await?
            .ok_or_else(|| DbError::not_found("Shift", shift_id))?;

        if !before.status.can_transition_to(target) {
            return Err(CoreError::invalid_transition("Shift", shift_id, before.status, target).into());
        }

        if target.is_open() && !before.status.is_open() {
            if let Some(open) = open_shift_in(&mut tx, &before.user_id).await? {
                if open.id != before.id {
                    return Err(already_open(&before.user_id));
                }
            }
        }

        let now = Utc::now();
        let ended_at = (target == ShiftStatus::Ended).then_some(now);

        let after = sqlx::query_as::<_, Shift>(
            r#"
            UPDATE shifts
            SET status = ?2,
                ended_at = ?3,
                closing_float_cents = COALESCE(?4, closing_float_cents),
                updated_at = ?5
            WHERE id = ?1 AND status = ?6
            RETURNING id, user_id, started_at, ended_at, status,
                      opening_float_cents, closing_float_cents, updated_at
            "#,
        )
        .bind(shift_id)
        .bind(target)
        .bind(ended_at)
        .bind(closing_float_cents)
        .bind(now)
        .bind(before.status)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| open_conflict(e.into(), &before.user_id))?;

        // Someone else moved it between our read and our write.
        let after = after.ok_or_else(|| {
            DbError::from(CoreError::invalid_transition("Shift", shift_id, before.status, target))
        })?;

        tx.commit().await?;

        info!(
            shift_id = %shift_id,
            from = %before.status,
            to = %after.status,
            "Shift transition"
        );
        self.audit.record(
            AuditEvent::new(&before.user_id, EntityType::Shift, shift_id, action)
                .with_before(&before)
                .with_after(&after),
        );

        Ok(after)
    }
}

async fn get_in(conn: &mut SqliteConnection, shift_id: &str) -> DbResult<Option<Shift>> {
    let shift = sqlx::query_as::<_, Shift>(
        r#"
        SELECT id, user_id, started_at, ended_at, status,
               opening_float_cents, closing_float_cents, updated_at
        FROM shifts
        WHERE id = ?1
        "#,
    )
    .bind(shift_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(shift)
}

async fn open_shift_in(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Option<Shift>> {
    let shift = sqlx::query_as::<_, Shift>(
        r#"
        SELECT id, user_id, started_at, ended_at, status,
               opening_float_cents, closing_float_cents, updated_at
        FROM shifts
        WHERE user_id = ?1 AND status IN ('active', 'paused')
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(shift)
}

fn already_open(user_id: &str) -> DbError {
    CoreError::conflict("Shift", format!("user {} already has an open shift", user_id)).into()
}

/// The partial unique index fires when a concurrent start won the race.
fn open_conflict(err: DbError, user_id: &str) -> DbError {
    match err {
        DbError::UniqueViolation { .. } => already_open(user_id),
        other => other,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
