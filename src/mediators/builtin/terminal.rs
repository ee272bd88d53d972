//! Terminal mediators: drop the message, or turn it around as a response

use crate::element::{ConfigElement, QName};
use crate::error::MediationError;
use crate::mediators::{Flow, Mediator};
use crate::message::{Direction, Disposition, MessageContext};
use crate::registry::factory::reject_children;
use crate::registry::{FactoryContext, MediatorFactory};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const DROP_TAG: &str = "drop";
pub const RESPOND_TAG: &str = "respond";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropMediator {
    trace: bool,
}

impl DropMediator {
    pub fn new(trace: bool) -> Self {
        Self { trace }
    }
}

#[async_trait]
impl Mediator for DropMediator {
    fn kind(&self) -> &'static str {
        DROP_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    async fn mediate(&self, ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        debug!(correlation_id = %ctx.correlation_id(), "Dropping message");
        ctx.set_disposition(Disposition::Dropped);
        Ok(Flow::Stop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespondMediator {
    trace: bool,
}

impl RespondMediator {
    pub fn new(trace: bool) -> Self {
        Self { trace }
    }
}

#[async_trait]
impl Mediator for RespondMediator {
    fn kind(&self) -> &'static str {
        RESPOND_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    async fn mediate(&self, ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        ctx.set_direction(Direction::Response);
        ctx.set_disposition(Disposition::Responded);
        Ok(Flow::Stop)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DropMediatorFactory;

impl MediatorFactory for DropMediatorFactory {
    fn tag(&self) -> QName {
        QName::mediation(DROP_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &[])?;
        reject_children(element)?;
        Ok(Arc::new(DropMediator::new(ctx.process_trace(element)?)))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RespondMediatorFactory;

impl MediatorFactory for RespondMediatorFactory {
    fn tag(&self) -> QName {
        QName::mediation(RESPOND_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &[])?;
        reject_children(element)?;
        Ok(Arc::new(RespondMediator::new(ctx.process_trace(element)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn test_drop_sets_disposition() {
        let mut ctx = MessageContext::new(Message::default(), "main");
        let flow = DropMediator::new(false).mediate(&mut ctx).await.unwrap();

        assert!(matches!(flow, Flow::Stop));
        assert_eq!(ctx.disposition(), Some(Disposition::Dropped));
    }

    #[tokio::test]
    async fn test_respond_flips_direction() {
        let mut ctx = MessageContext::new(Message::default(), "main");
        assert!(!ctx.is_response());

        let flow = RespondMediator::new(false).mediate(&mut ctx).await.unwrap();

        assert!(matches!(flow, Flow::Stop));
        assert!(ctx.is_response());
        assert_eq!(ctx.disposition(), Some(Disposition::Responded));
    }
}
