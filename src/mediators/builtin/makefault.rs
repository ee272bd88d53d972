//! MakeFault: raise a mediation fault with a configured code

use crate::element::{ConfigElement, QName};
use crate::error::MediationError;
use crate::mediators::{Flow, Mediator};
use crate::message::MessageContext;
use crate::registry::factory::{reject_children, required_attribute};
use crate::registry::{FactoryContext, MediatorFactory};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const MAKEFAULT_TAG: &str = "makefault";

const DEFAULT_REASON: &str = "fault raised by configuration";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeFaultMediator {
    code: String,
    reason: String,
    trace: bool,
}

impl MakeFaultMediator {
    pub fn new<C: Into<String>, R: Into<String>>(code: C, reason: R, trace: bool) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
            trace,
        }
    }
}

#[async_trait]
impl Mediator for MakeFaultMediator {
    fn kind(&self) -> &'static str {
        MAKEFAULT_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    fn parameters(&self) -> Value {
        json!({"code": self.code, "reason": self.reason})
    }

    async fn mediate(&self, _ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        Err(MediationError::fault(self.code.clone(), self.reason.clone()))
    }
}

/// Factory for `<makefault code=".." reason=".."/>`
#[derive(Debug, Default, Clone, Copy)]
pub struct MakeFaultMediatorFactory;

impl MediatorFactory for MakeFaultMediatorFactory {
    fn tag(&self) -> QName {
        QName::mediation(MAKEFAULT_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &["code", "reason"])?;
        reject_children(element)?;

        let code = required_attribute(element, "code")?;
        let reason = element
            .attribute("reason")
            .unwrap_or_else(|| DEFAULT_REASON.to_string());

        Ok(Arc::new(MakeFaultMediator::new(
            code,
            reason,
            ctx.process_trace(element)?,
        )))
    }
}
