//! Log: emit a structured event describing the message

use crate::element::{ConfigElement, QName};
use crate::error::MediationError;
use crate::mediators::{Flow, Mediator};
use crate::message::MessageContext;
use crate::registry::factory::{invalid_attribute, reject_children};
use crate::registry::{FactoryContext, MediatorFactory};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

pub const LOG_TAG: &str = "log";

/// How much of the message goes into the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDetail {
    Simple,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogMediator {
    detail: LogDetail,
    category: LogCategory,
    message: Option<String>,
    trace: bool,
}

impl LogMediator {
    pub fn new(detail: LogDetail, category: LogCategory, message: Option<String>, trace: bool) -> Self {
        Self {
            detail,
            category,
            message,
            trace,
        }
    }

    fn emit(&self, ctx: &MessageContext) {
        let text = self.message.as_deref().unwrap_or("mediation log");
        let correlation_id = ctx.correlation_id();
        let direction = if ctx.is_response() { "response" } else { "request" };
        let detail = match self.detail {
            LogDetail::Simple => String::new(),
            LogDetail::Full => json!({
                "properties": ctx.properties(),
                "payload": ctx.payload(),
            })
            .to_string(),
        };

        match self.category {
            LogCategory::Trace => trace!(%correlation_id, direction, detail, "{text}"),
            LogCategory::Debug => debug!(%correlation_id, direction, detail, "{text}"),
            LogCategory::Info => info!(%correlation_id, direction, detail, "{text}"),
            LogCategory::Warn => warn!(%correlation_id, direction, detail, "{text}"),
            LogCategory::Error => error!(%correlation_id, direction, detail, "{text}"),
        }
    }
}

#[async_trait]
impl Mediator for LogMediator {
    fn kind(&self) -> &'static str {
        LOG_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    fn parameters(&self) -> Value {
        json!({
            "level": self.detail,
            "category": self.category,
            "message": self.message,
        })
    }

    async fn mediate(&self, ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        self.emit(ctx);
        Ok(Flow::Continue)
    }
}

/// Factory for `<log level=".." category=".." message=".."/>`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMediatorFactory;

impl MediatorFactory for LogMediatorFactory {
    fn tag(&self) -> QName {
        QName::mediation(LOG_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &["level", "category", "message"])?;
        reject_children(element)?;

        let detail = match element.attribute("level").as_deref() {
            None | Some("simple") => LogDetail::Simple,
            Some("full") => LogDetail::Full,
            Some(other) => {
                return Err(invalid_attribute(
                    element,
                    "level",
                    format!("expected simple or full, got '{other}'"),
                ))
            }
        };

        let category = match element
            .attribute("category")
            .map(|c| c.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("info") => LogCategory::Info,
            Some("trace") => LogCategory::Trace,
            Some("debug") => LogCategory::Debug,
            Some("warn") => LogCategory::Warn,
            Some("error") => LogCategory::Error,
            Some(other) => {
                return Err(invalid_attribute(
                    element,
                    "category",
                    format!("unknown category '{other}'"),
                ))
            }
        };

        Ok(Arc::new(LogMediator::new(
            detail,
            category,
            element.attribute("message"),
            ctx.process_trace(element)?,
        )))
    }
}
