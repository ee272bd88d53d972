//! Loopback: re-inject the message at the root entry sequence
//!
//! The mediator itself only signals `Stop`. Because it reports
//! [`ControlTransfer::Reinject`], the engine replaces the whole mediation
//! stack with a fresh root frame and enforces the reinjection limit.

use crate::element::{ConfigElement, QName};
use crate::error::MediationError;
use crate::mediators::{ControlTransfer, Flow, Mediator};
use crate::message::MessageContext;
use crate::registry::factory::reject_children;
use crate::registry::{FactoryContext, MediatorFactory};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const LOOPBACK_TAG: &str = "loopback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackMediator {
    trace: bool,
}

impl LoopbackMediator {
    pub fn new(trace: bool) -> Self {
        Self { trace }
    }
}

#[async_trait]
impl Mediator for LoopbackMediator {
    fn kind(&self) -> &'static str {
        LOOPBACK_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    fn control_transfer(&self) -> ControlTransfer {
        ControlTransfer::Reinject
    }

    async fn mediate(&self, ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        debug!(
            correlation_id = %ctx.correlation_id(),
            reinjections = ctx.reinjection_count(),
            "Loopback requested re-entry at root sequence"
        );
        Ok(Flow::Stop)
    }
}

/// Factory for `<loopback/>`; accepts only the `trace` attribute
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackMediatorFactory;

impl MediatorFactory for LoopbackMediatorFactory {
    fn tag(&self) -> QName {
        QName::mediation(LOOPBACK_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &[])?;
        reject_children(element)?;
        let trace = ctx.process_trace(element)?;
        Ok(Arc::new(LoopbackMediator::new(trace)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::message::Message;
    use crate::registry::MediatorRegistry;
    use serde_json::json;

    #[test]
    fn test_factory_builds_untraced_loopback() {
        let registry = MediatorRegistry::new();
        let ctx = FactoryContext::new(&registry);

        let mediator = LoopbackMediatorFactory
            .create(&ConfigElement::new("loopback"), &ctx)
            .unwrap();

        assert_eq!(mediator.kind(), "loopback");
        assert!(!mediator.is_traced());
        assert_eq!(mediator.control_transfer(), ControlTransfer::Reinject);
    }

    #[test]
    fn test_factory_reads_trace_attribute() {
        let registry = MediatorRegistry::new();
        let ctx = FactoryContext::new(&registry);
        let element = ConfigElement::new("loopback").with_attribute("trace", "enable");

        let mediator = LoopbackMediatorFactory.create(&element, &ctx).unwrap();
        assert!(mediator.is_traced());
    }

    #[test]
    fn test_factory_rejects_children() {
        let registry = MediatorRegistry::new();
        let ctx = FactoryContext::new(&registry);
        let element = ConfigElement::new("loopback").with_child(ConfigElement::new("log"));

        let result = LoopbackMediatorFactory.create(&element, &ctx);
        assert!(matches!(
            result,
            Err(MediationError::Configuration(ConfigError::UnexpectedChild { .. }))
        ));
    }

    #[test]
    fn test_unknown_attribute_ignored_unless_strict() {
        let registry = MediatorRegistry::new();
        let element = ConfigElement::new("loopback").with_attribute("target", "main");

        assert!(LoopbackMediatorFactory
            .create(&element, &FactoryContext::new(&registry))
            .is_ok());
        assert!(LoopbackMediatorFactory
            .create(&element, &FactoryContext::new(&registry).strict(true))
            .is_err());
    }

    #[tokio::test]
    async fn test_mediate_always_stops_without_touching_context() {
        let mediator = LoopbackMediator::new(false);
        let mut ctx = MessageContext::new(
            Message::new(json!({"n": 1})).with_property("p", json!("v")),
            "main",
        );

        let flow = mediator.mediate(&mut ctx).await.unwrap();

        assert!(matches!(flow, Flow::Stop));
        assert_eq!(ctx.property("p"), Some(&json!("v")));
        assert_eq!(ctx.reinjection_count(), 0);
    }
}
