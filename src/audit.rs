//! Audit collaborator
//!
//! The engine reports every execution of a traced mediator to an
//! [`AuditSink`]. Recording is fire-and-forget from the pipeline's point of
//! view: a failing sink is logged and never becomes a mediation fault.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("Audit record rejected: {0}")]
    Rejected(String),
}

/// What a traced mediator did to the message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditOutcome {
    Continued,
    Stopped,
    Entered { sequence: String },
    Reentered { reinjections: u32 },
    Faulted { message: String },
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Continued => f.write_str("mediator continued"),
            AuditOutcome::Stopped => f.write_str("mediator stopped the flow"),
            AuditOutcome::Entered { sequence } => write!(f, "entered sequence '{sequence}'"),
            AuditOutcome::Reentered { reinjections } => write!(
                f,
                "message re-entered mediation at sequence root, reinjection count = {reinjections}"
            ),
            AuditOutcome::Faulted { message } => write!(f, "mediator faulted: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub mediator_kind: String,
    pub correlation_id: Uuid,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new<S: Into<String>>(mediator_kind: S, correlation_id: Uuid, outcome: AuditOutcome) -> Self {
        Self {
            mediator_kind: mediator_kind.into(),
            correlation_id,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Writes audit records as `tracing` events under the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        info!(
            target: "audit",
            mediator = %record.mediator_kind,
            correlation_id = %record.correlation_id,
            timestamp = %record.timestamp.to_rfc3339(),
            "{}",
            record.outcome
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentered_display() {
        let outcome = AuditOutcome::Reentered { reinjections: 2 };
        assert_eq!(
            outcome.to_string(),
            "message re-entered mediation at sequence root, reinjection count = 2"
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(AuditOutcome::Entered {
            sequence: "billing".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "entered");
        assert_eq!(json["sequence"], "billing");
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_records() {
        let record = AuditRecord::new("loopback", Uuid::new_v4(), AuditOutcome::Stopped);
        assert!(TracingAuditSink.record(&record).await.is_ok());
    }
}
