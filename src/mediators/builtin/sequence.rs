//! Sequence reference: call a named sequence, then resume the caller

use crate::element::{ConfigElement, QName};
use crate::error::MediationError;
use crate::mediators::{Flow, Mediator, SequenceTarget};
use crate::message::MessageContext;
use crate::registry::factory::{reject_children, required_attribute};
use crate::registry::{FactoryContext, MediatorFactory};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const SEQUENCE_TAG: &str = "sequence";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceMediator {
    key: String,
    trace: bool,
}

impl SequenceMediator {
    pub fn new<S: Into<String>>(key: S, trace: bool) -> Self {
        Self {
            key: key.into(),
            trace,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl Mediator for SequenceMediator {
    fn kind(&self) -> &'static str {
        SEQUENCE_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    fn parameters(&self) -> Value {
        json!({"key": self.key})
    }

    fn sequence_refs(&self) -> Vec<String> {
        vec![self.key.clone()]
    }

    async fn mediate(&self, _ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        Ok(Flow::Enter(SequenceTarget::Named(self.key.clone())))
    }
}

/// Factory for `<sequence key=".."/>`
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceMediatorFactory;

impl MediatorFactory for SequenceMediatorFactory {
    fn tag(&self) -> QName {
        QName::mediation(SEQUENCE_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &["key"])?;
        reject_children(element)?;
        let key = required_attribute(element, "key")?;
        Ok(Arc::new(SequenceMediator::new(key, ctx.process_trace(element)?)))
    }
}
