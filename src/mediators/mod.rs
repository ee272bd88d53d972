//! Mediator interface and the built-in mediator catalogue
//!
//! A mediator is one immutable, executable processing step. Mediators never
//! drive other mediators themselves: they report a [`Flow`] and the engine
//! moves the message's mediation stack accordingly.

use crate::engine::Sequence;
use crate::error::MediationError;
use crate::message::MessageContext;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub mod builtin;

pub use builtin::{
    DropMediator, DropMediatorFactory, FilterMediator, FilterMediatorFactory, LogMediator,
    LogMediatorFactory, LoopbackMediator, LoopbackMediatorFactory, MakeFaultMediator,
    MakeFaultMediatorFactory, PropertyMediator, PropertyMediatorFactory, RespondMediator,
    RespondMediatorFactory, SequenceMediator, SequenceMediatorFactory,
};

/// Executable processing step
#[async_trait]
pub trait Mediator: Send + Sync + fmt::Debug {
    /// Stable kind identifier, matching the local name of the configuration tag
    fn kind(&self) -> &'static str;

    /// Whether executions of this mediator are sent to the audit collaborator
    fn is_traced(&self) -> bool;

    /// Kind-specific parameters parsed from configuration
    fn parameters(&self) -> Value {
        Value::Null
    }

    /// Control-transfer class; the engine enforces the reinjection limit on
    /// every mediator that is not [`ControlTransfer::None`]
    fn control_transfer(&self) -> ControlTransfer {
        ControlTransfer::None
    }

    /// Named sequences this mediator may enter, checked when configuration loads
    fn sequence_refs(&self) -> Vec<String> {
        Vec::new()
    }

    fn describe(&self) -> MediatorDescriptor {
        MediatorDescriptor {
            kind: self.kind().to_string(),
            trace: self.is_traced(),
            parameters: self.parameters(),
        }
    }

    /// Process the message.
    ///
    /// May await I/O; the context is exclusively borrowed for the duration so
    /// its mediation stack cannot change underneath a suspended mediator.
    async fn mediate(&self, ctx: &mut MessageContext) -> Result<Flow, MediationError>;
}

/// What the engine should do after a mediator returns
#[derive(Debug, Clone)]
pub enum Flow {
    /// Advance to the next mediator in the current sequence
    Continue,
    /// Do not continue in the current sequence chain
    Stop,
    /// Advance, then push a frame for the target sequence (call/return)
    Enter(SequenceTarget),
}

/// Sequence a branching mediator asks the engine to enter
#[derive(Debug, Clone)]
pub enum SequenceTarget {
    /// Resolved against the message's pinned sequence graph
    Named(String),
    /// Anonymous sequence built from the mediator's own configuration
    Inline(Arc<Sequence>),
}

impl SequenceTarget {
    pub fn name(&self) -> &str {
        match self {
            SequenceTarget::Named(name) => name,
            SequenceTarget::Inline(sequence) => sequence.name(),
        }
    }
}

/// Control-transfer class of a mediator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTransfer {
    None,
    /// A `Stop` re-injects the message at the root entry sequence
    Reinject,
}

/// Comparable description of a built mediator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediatorDescriptor {
    pub kind: String,
    pub trace: bool,
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_target_names() {
        let named = SequenceTarget::Named("billing".to_string());
        assert_eq!(named.name(), "billing");

        let inline = SequenceTarget::Inline(Arc::new(Sequence::inline(Vec::new())));
        assert_eq!(inline.name(), "<inline>");
    }

    #[test]
    fn test_default_describe_uses_kind_and_trace() {
        let mediator = LoopbackMediator::new(true);
        let descriptor = mediator.describe();

        assert_eq!(descriptor.kind, "loopback");
        assert!(descriptor.trace);
        assert_eq!(descriptor.parameters, Value::Null);
    }
}
