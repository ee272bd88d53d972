//! Terminal results of processing one message

use crate::error::{FaultReport, MediationError};
use crate::message::{Direction, Disposition, MessageContext};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// How processing of a message ended
#[derive(Debug)]
pub enum Outcome {
    Completed {
        context: MessageContext,
        disposition: Disposition,
    },
    /// A fault no handler recovered, or a terminal engine error
    Faulted {
        context: MessageContext,
        error: MediationError,
    },
}

impl Outcome {
    pub fn context(&self) -> &MessageContext {
        match self {
            Outcome::Completed { context, .. } | Outcome::Faulted { context, .. } => context,
        }
    }

    pub fn into_context(self) -> MessageContext {
        match self {
            Outcome::Completed { context, .. } | Outcome::Faulted { context, .. } => context,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Outcome::Faulted { .. })
    }

    pub fn error(&self) -> Option<&MediationError> {
        match self {
            Outcome::Faulted { error, .. } => Some(error),
            Outcome::Completed { .. } => None,
        }
    }

    pub fn disposition(&self) -> Option<Disposition> {
        match self {
            Outcome::Completed { disposition, .. } => Some(*disposition),
            Outcome::Faulted { .. } => None,
        }
    }

    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary::from(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Faulted,
}

/// Serializable view of an [`Outcome`], one line per message in the CLI
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    pub correlation_id: Uuid,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultReport>,
    pub reinjections: u32,
    pub fault_recoveries: u32,
    pub direction: Direction,
    pub payload: Value,
    pub properties: HashMap<String, Value>,
}

impl From<&Outcome> for OutcomeSummary {
    fn from(outcome: &Outcome) -> Self {
        let context = outcome.context();
        let (status, fault) = match outcome {
            Outcome::Completed { .. } => (OutcomeStatus::Completed, None),
            Outcome::Faulted { error, .. } => (
                OutcomeStatus::Faulted,
                Some(error.to_fault_report(context.correlation_id())),
            ),
        };

        Self {
            correlation_id: context.correlation_id(),
            status,
            disposition: outcome.disposition(),
            fault,
            reinjections: context.reinjection_count(),
            fault_recoveries: context.fault_recoveries(),
            direction: context.direction(),
            payload: context.payload().clone(),
            properties: context.properties().clone(),
        }
    }
}
