//! Audit notifications for ledger operations
//!
//! Services emit exactly one [`AuditEvent`] per operation outcome through an
//! [`AuditHook`]. The hook never awaits: events go onto a bounded channel and a
//! worker task forwards them to the configured [`AuditSink`]. A full channel or
//! a failing sink is logged and otherwise ignored.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreateStock,
    UpdateStock,
    VoidStock,
    ApplyMovement,
    ReverseMovement,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreateStock => "create_stock",
            AuditAction::UpdateStock => "update_stock",
            AuditAction::VoidStock => "void_stock",
            AuditAction::ApplyMovement => "apply_movement",
            AuditAction::ReverseMovement => "reverse_movement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure { code: String },
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure { .. } => "failure",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub description: String,
    pub outcome: AuditOutcome,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Build the event describing how an operation ended
    pub fn for_result<T>(
        action: AuditAction,
        actor_id: Uuid,
        entity_type: &str,
        entity_id: Option<Uuid>,
        description: impl Into<String>,
        result: &AppResult<T>,
    ) -> Self {
        let outcome = match result {
            Ok(_) => AuditOutcome::Success,
            Err(e) => AuditOutcome::Failure {
                code: e.code().to_string(),
            },
        };

        Self {
            actor_id,
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            description: description.into(),
            outcome,
            occurred_at: Utc::now(),
        }
    }
}

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()>;
}

/// Non-blocking handle services use to emit audit events
#[derive(Clone, Debug)]
pub struct AuditHook {
    sender: Option<mpsc::Sender<AuditEvent>>,
}

impl AuditHook {
    /// Create a hook plus the receiving end for [`run_audit_worker`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Hook that drops every event
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: AuditEvent) {
        let Some(sender) = &self.sender else {
            tracing::debug!(action = event.action.as_str(), "Audit disabled, dropping event");
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    action = event.action.as_str(),
                    entity_id = ?event.entity_id,
                    "Audit channel full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(
                    action = event.action.as_str(),
                    entity_id = ?event.entity_id,
                    "Audit worker stopped, dropping event"
                );
            }
        }
    }
}

/// Drain audit events into the sink until every hook is dropped
pub async fn run_audit_worker(mut rx: mpsc::Receiver<AuditEvent>, sink: Arc<dyn AuditSink>) {
    tracing::info!("Starting audit worker");

    while let Some(event) = rx.recv().await {
        if let Err(e) = sink.record(&event).await {
            tracing::error!(
                action = event.action.as_str(),
                actor_id = %event.actor_id,
                entity_id = ?event.entity_id,
                "Failed to write audit event: {:#}",
                e
            );
        }
    }

    tracing::info!("Audit worker stopped");
}

/// Spawned [`run_audit_worker`] task
pub struct AuditWorker {
    handle: JoinHandle<()>,
}

impl AuditWorker {
    pub fn spawn(rx: mpsc::Receiver<AuditEvent>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            handle: tokio::spawn(run_audit_worker(rx, sink)),
        }
    }

    /// Wait for queued events to reach the sink.
    ///
    /// Every [`AuditHook`] must be dropped first, otherwise this waits out
    /// `grace`. Returns `false` when events were left behind.
    pub async fn finish(self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!("Audit worker panicked: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Audit worker did not drain in time, pending events dropped"
                );
                false
            }
        }
    }
}

/// Audit sink writing into the `audit_log` table
#[derive(Clone)]
pub struct PgAuditSink {
    db: PgPool,
}

impl PgAuditSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let error_code = match &event.outcome {
            AuditOutcome::Success => None,
            AuditOutcome::Failure { code } => Some(code.as_str()),
        };

        sqlx::query(
            r#"
            INSERT INTO audit_log (actor_id, action, entity_type, entity_id, description, outcome, error_code, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.actor_id)
        .bind(event.action.as_str())
        .bind(&event.entity_type)
        .bind(event.entity_id)
        .bind(&event.description)
        .bind(event.outcome.as_str())
        .bind(error_code)
        .bind(event.occurred_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_outcome_from_result() {
        let ok: AppResult<()> = Ok(());
        let event = AuditEvent::for_result(
            AuditAction::ApplyMovement,
            Uuid::new_v4(),
            "stock_record",
            None,
            "inbound 5",
            &ok,
        );
        assert_eq!(event.outcome, AuditOutcome::Success);

        let failed: AppResult<()> = Err(AppError::ChainedReversal);
        let event = AuditEvent::for_result(
            AuditAction::ReverseMovement,
            Uuid::new_v4(),
            "ledger_entry",
            None,
            "reverse",
            &failed,
        );
        assert_eq!(
            event.outcome,
            AuditOutcome::Failure {
                code: "CHAINED_REVERSAL".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_emit_never_blocks_when_full() {
        let (hook, mut rx) = AuditHook::channel(1);
        let ok: AppResult<()> = Ok(());
        for _ in 0..3 {
            hook.emit(AuditEvent::for_result(
                AuditAction::CreateStock,
                Uuid::new_v4(),
                "stock_record",
                None,
                "create",
                &ok,
            ));
        }
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }
}
