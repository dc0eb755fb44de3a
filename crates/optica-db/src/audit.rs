//! # SQLite Audit Sink
//!
//! Persists audit events into `audit_log` without making the caller wait.
//!
//! ```text
//! engine ──record(event)──► channel ──► writer task ──► INSERT INTO audit_log
//!                                            │
//!                                            ├── failure → warn! (event dropped)
//!                                            └── Flush   → ack once every earlier
//!                                                          event is written
//! ```
//!
//! Events reach the table in the order they were recorded. Binaries call
//! [`SqliteAuditSink::flush`] before exiting so nothing is left queued.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use optica_core::{AuditEvent, AuditSink};

use crate::error::DbResult;
use crate::repository::audit::AuditLogRepository;

#[derive(Debug)]
enum Command {
    Record(AuditEvent),
    Flush(oneshot::Sender<()>),
}

/// Audit sink backed by the `audit_log` table.
///
/// Cloning shares the same writer task.
#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    repo: AuditLogRepository,
    tx: mpsc::UnboundedSender<Command>,
}

impl SqliteAuditSink {
    /// Creates the sink and spawns its writer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(repo: AuditLogRepository) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(AuditWriter { repo: repo.clone(), rx }.run());
        SqliteAuditSink { repo, tx }
    }

    /// Writes one event and waits for it, bypassing the queue.
    pub async fn write(&self, event: &AuditEvent) -> DbResult<()> {
        self.repo.insert(event).await
    }

    /// Waits until every event recorded before this call has been written
    /// (or has failed and been logged).
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_err() {
            warn!("Audit writer stopped; nothing to flush");
            return;
        }
        if done.await.is_err() {
            warn!("Audit writer stopped before the flush completed");
        }
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Err(mpsc::error::SendError(Command::Record(event))) =
            self.tx.send(Command::Record(event))
        {
            warn!(
                entity_id = %event.entity_id,
                action = %event.action_type,
                "Audit writer stopped; event dropped"
            );
        }
    }
}

/// Drains the channel, one insert at a time.
struct AuditWriter {
    repo: AuditLogRepository,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl AuditWriter {
    async fn run(mut self) {
        debug!("Audit writer starting");

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Record(event) => {
                    if let Err(e) = self.repo.insert(&event).await {
                        warn!(
                            error = %e,
                            entity_id = %event.entity_id,
                            action = %event.action_type,
                            "Failed to persist audit event"
                        );
                    }
                }
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }

        debug!("Audit writer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use optica_core::{AuditAction, EntityType};

    #[tokio::test]
    async fn test_write_persists_event() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sink = SqliteAuditSink::new(db.audit_log());

        let event = AuditEvent::new("u-1", EntityType::Payment, "pay-1", AuditAction::Payment);
        sink.write(&event).await.unwrap();

        let stored = db
            .audit_log()
            .list_for_entity(EntityType::Payment, "pay-1")
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_waits_for_recorded_events() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sink = SqliteAuditSink::new(db.audit_log());

        for action in [AuditAction::Create, AuditAction::AddItem, AuditAction::Abandon] {
            sink.record(AuditEvent::new("u-1", EntityType::SalesOrder, "o-1", action));
        }
        sink.flush().await;

        let stored = db
            .audit_log()
            .list_for_entity(EntityType::SalesOrder, "o-1")
            .await
            .unwrap();
        assert_eq!(stored.len(), 3);
    }
}
