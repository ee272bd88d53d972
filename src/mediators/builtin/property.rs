//! Property: set or remove a per-message property

use crate::element::{ConfigElement, QName};
use crate::error::MediationError;
use crate::mediators::{Flow, Mediator};
use crate::message::MessageContext;
use crate::registry::factory::{invalid_attribute, reject_children, required_attribute};
use crate::registry::{FactoryContext, MediatorFactory};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const PROPERTY_TAG: &str = "property";

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyAction {
    Set(Value),
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMediator {
    name: String,
    action: PropertyAction,
    trace: bool,
}

impl PropertyMediator {
    pub fn set<S: Into<String>>(name: S, value: Value, trace: bool) -> Self {
        Self {
            name: name.into(),
            action: PropertyAction::Set(value),
            trace,
        }
    }

    pub fn remove<S: Into<String>>(name: S, trace: bool) -> Self {
        Self {
            name: name.into(),
            action: PropertyAction::Remove,
            trace,
        }
    }
}

#[async_trait]
impl Mediator for PropertyMediator {
    fn kind(&self) -> &'static str {
        PROPERTY_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    fn parameters(&self) -> Value {
        match &self.action {
            PropertyAction::Set(value) => json!({"name": self.name, "action": "set", "value": value}),
            PropertyAction::Remove => json!({"name": self.name, "action": "remove"}),
        }
    }

    async fn mediate(&self, ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        match &self.action {
            PropertyAction::Set(value) => ctx.set_property(self.name.clone(), value.clone()),
            PropertyAction::Remove => {
                ctx.remove_property(&self.name);
            }
        }
        Ok(Flow::Continue)
    }
}

/// Factory for `<property name=".." value=".." action="set|remove" type=".."/>`
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertyMediatorFactory;

impl PropertyMediatorFactory {
    fn typed_value(element: &ConfigElement, raw: &str) -> Result<Value, MediationError> {
        let kind = element.attribute("type").unwrap_or_else(|| "string".to_string());
        match kind.to_ascii_lowercase().as_str() {
            "string" => Ok(Value::String(raw.to_string())),
            "integer" => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| invalid_attribute(element, "value", format!("not an integer: {e}"))),
            "boolean" => raw
                .trim()
                .parse::<bool>()
                .map(Value::from)
                .map_err(|e| invalid_attribute(element, "value", format!("not a boolean: {e}"))),
            "json" => serde_json::from_str(raw)
                .map_err(|e| invalid_attribute(element, "value", format!("not valid JSON: {e}"))),
            other => Err(invalid_attribute(
                element,
                "type",
                format!("expected string, integer, boolean or json, got '{other}'"),
            )),
        }
    }
}

impl MediatorFactory for PropertyMediatorFactory {
    fn tag(&self) -> QName {
        QName::mediation(PROPERTY_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &["name", "value", "action", "type"])?;
        reject_children(element)?;

        let name = required_attribute(element, "name")?;
        let trace = ctx.process_trace(element)?;

        let mediator = match element.attribute("action").as_deref() {
            None | Some("set") => {
                let raw = element.attribute("value").ok_or_else(|| {
                    invalid_attribute(element, "value", "required when action is set".to_string())
                })?;
                PropertyMediator::set(name, Self::typed_value(element, &raw)?, trace)
            }
            Some("remove") => PropertyMediator::remove(name, trace),
            Some(other) => {
                return Err(invalid_attribute(
                    element,
                    "action",
                    format!("expected set or remove, got '{other}'"),
                ))
            }
        };

        Ok(Arc::new(mediator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::AttributeValue;
    use crate::message::Message;
    use crate::registry::MediatorRegistry;

    fn build(element: ConfigElement) -> Result<Arc<dyn Mediator>, MediationError> {
        let registry = MediatorRegistry::new();
        PropertyMediatorFactory.create(&element, &FactoryContext::new(&registry))
    }

    #[test]
    fn test_typed_values() {
        let integer = build(
            ConfigElement::new("property")
                .with_attribute("name", "n")
                .with_attribute("value", AttributeValue::Integer(5))
                .with_attribute("type", "integer"),
        )
        .unwrap();
        assert_eq!(integer.parameters()["value"], json!(5));

        let object = build(
            ConfigElement::new("property")
                .with_attribute("name", "n")
                .with_attribute("value", r#"{"a": [1, 2]}"#)
                .with_attribute("type", "json"),
        )
        .unwrap();
        assert_eq!(object.parameters()["value"], json!({"a": [1, 2]}));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(build(
            ConfigElement::new("property")
                .with_attribute("name", "n")
                .with_attribute("value", "abc")
                .with_attribute("type", "integer"),
        )
        .is_err());
        assert!(build(ConfigElement::new("property").with_attribute("name", "n")).is_err());
        assert!(build(ConfigElement::new("property").with_attribute("value", "v")).is_err());
    }

    #[tokio::test]
    async fn test_set_and_remove() {
        let mut ctx = MessageContext::new(Message::default(), "main");

        let set = build(
            ConfigElement::new("property")
                .with_attribute("name", "stage")
                .with_attribute("value", "ingress"),
        )
        .unwrap();
        set.mediate(&mut ctx).await.unwrap();
        assert_eq!(ctx.property("stage"), Some(&json!("ingress")));

        let remove = build(
            ConfigElement::new("property")
                .with_attribute("name", "stage")
                .with_attribute("action", "remove"),
        )
        .unwrap();
        remove.mediate(&mut ctx).await.unwrap();
        assert!(ctx.property("stage").is_none());
    }
}
