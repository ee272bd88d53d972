//! Filter: branch on a message property

use crate::element::{ConfigElement, QName};
use crate::engine::Sequence;
use crate::error::MediationError;
use crate::mediators::{Flow, Mediator, SequenceTarget};
use crate::message::MessageContext;
use crate::registry::factory::{invalid_attribute, required_attribute, restrict_children};
use crate::registry::{FactoryContext, MediatorFactory};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

pub const FILTER_TAG: &str = "filter";

/// Test applied to the source property's text form
#[derive(Debug, Clone)]
pub enum Condition {
    Matches(Regex),
    Equals(String),
}

impl Condition {
    fn evaluate(&self, value: &str) -> bool {
        match self {
            Condition::Matches(regex) => regex.is_match(value),
            Condition::Equals(expected) => value == expected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterMediator {
    source: String,
    condition: Condition,
    then_branch: Option<SequenceTarget>,
    else_branch: Option<SequenceTarget>,
    trace: bool,
}

impl FilterMediator {
    pub fn new<S: Into<String>>(
        source: S,
        condition: Condition,
        then_branch: Option<SequenceTarget>,
        else_branch: Option<SequenceTarget>,
        trace: bool,
    ) -> Self {
        Self {
            source: source.into(),
            condition,
            then_branch,
            else_branch,
            trace,
        }
    }

    /// A missing property never matches
    fn matches(&self, ctx: &MessageContext) -> bool {
        match ctx.property(&self.source) {
            None => false,
            Some(Value::String(text)) => self.condition.evaluate(text),
            Some(other) => self.condition.evaluate(&other.to_string()),
        }
    }
}

fn branch_refs(branch: &Option<SequenceTarget>, refs: &mut Vec<String>) {
    match branch {
        Some(SequenceTarget::Named(name)) => refs.push(name.clone()),
        Some(SequenceTarget::Inline(sequence)) => refs.extend(sequence.sequence_refs()),
        None => {}
    }
}

fn branch_json(branch: &Option<SequenceTarget>) -> Value {
    match branch {
        Some(SequenceTarget::Named(name)) => json!({"sequence": name}),
        Some(SequenceTarget::Inline(sequence)) => json!({
            "inline": sequence.mediators().iter().map(|m| m.describe()).collect::<Vec<_>>(),
        }),
        None => Value::Null,
    }
}

#[async_trait]
impl Mediator for FilterMediator {
    fn kind(&self) -> &'static str {
        FILTER_TAG
    }

    fn is_traced(&self) -> bool {
        self.trace
    }

    fn parameters(&self) -> Value {
        let condition = match &self.condition {
            Condition::Matches(regex) => json!({"regex": regex.as_str()}),
            Condition::Equals(expected) => json!({"equals": expected}),
        };
        json!({
            "source": self.source,
            "condition": condition,
            "then": branch_json(&self.then_branch),
            "else": branch_json(&self.else_branch),
        })
    }

    fn sequence_refs(&self) -> Vec<String> {
        let mut refs = Vec::new();
        branch_refs(&self.then_branch, &mut refs);
        branch_refs(&self.else_branch, &mut refs);
        refs
    }

    async fn mediate(&self, ctx: &mut MessageContext) -> Result<Flow, MediationError> {
        let branch = if self.matches(ctx) {
            &self.then_branch
        } else {
            &self.else_branch
        };

        Ok(match branch {
            Some(target) => Flow::Enter(target.clone()),
            None => Flow::Continue,
        })
    }
}

/// Factory for `<filter source=".." regex=".."|equals="..">` with optional
/// `<then>`/`<else>` children
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterMediatorFactory;

impl FilterMediatorFactory {
    fn condition(element: &ConfigElement) -> Result<Condition, MediationError> {
        match (element.attribute("regex"), element.attribute("equals")) {
            (Some(pattern), None) => Regex::new(&format!("^(?:{pattern})$"))
                .map(Condition::Matches)
                .map_err(|e| invalid_attribute(element, "regex", e.to_string())),
            (None, Some(expected)) => Ok(Condition::Equals(expected)),
            (Some(_), Some(_)) => Err(invalid_attribute(
                element,
                "regex",
                "regex and equals are mutually exclusive".to_string(),
            )),
            (None, None) => Err(invalid_attribute(
                element,
                "regex",
                "one of regex or equals is required".to_string(),
            )),
        }
    }

    fn branch(
        element: &ConfigElement,
        name: &str,
        ctx: &FactoryContext<'_>,
    ) -> Result<Option<SequenceTarget>, MediationError> {
        let mut branches = element.children_named(name);
        let Some(branch) = branches.next() else {
            return Ok(None);
        };
        if branches.next().is_some() {
            return Err(invalid_attribute(
                element,
                name,
                format!("at most one <{name}> branch is allowed"),
            ));
        }

        ctx.check_attributes(branch, &["sequence"])?;
        match branch.attribute("sequence") {
            Some(key) if branch.children.is_empty() => Ok(Some(SequenceTarget::Named(key))),
            Some(_) => Err(invalid_attribute(
                branch,
                "sequence",
                "a branch names a sequence or lists mediators, not both".to_string(),
            )),
            None => {
                let sequence: Arc<Sequence> = ctx.build_inline_sequence(&branch.children)?;
                Ok(Some(SequenceTarget::Inline(sequence)))
            }
        }
    }
}

impl MediatorFactory for FilterMediatorFactory {
    fn tag(&self) -> QName {
        QName::mediation(FILTER_TAG)
    }

    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError> {
        ctx.check_attributes(element, &["source", "regex", "equals"])?;
        restrict_children(element, &["then", "else"])?;

        let source = required_attribute(element, "source")?;
        let condition = Self::condition(element)?;
        let then_branch = Self::branch(element, "then", ctx)?;
        let else_branch = Self::branch(element, "else", ctx)?;

        Ok(Arc::new(FilterMediator::new(
            source,
            condition,
            then_branch,
            else_branch,
            ctx.process_trace(element)?,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::registry::MediatorRegistry;

    fn routed_filter() -> ConfigElement {
        ConfigElement::new("filter")
            .with_attribute("source", "tenant")
            .with_attribute("regex", "acme|globex")
            .with_child(ConfigElement::new("then").with_attribute("sequence", "premium"))
            .with_child(
                ConfigElement::new("else").with_child(
                    ConfigElement::new("sequence").with_attribute("key", "standard"),
                ),
            )
    }

    #[tokio::test]
    async fn test_branches_on_property() {
        let registry = MediatorRegistry::builtin();
        let mediator = FilterMediatorFactory
            .create(&routed_filter(), &FactoryContext::new(&registry))
            .unwrap();

        let mut hit = MessageContext::new(
            Message::default().with_property("tenant", json!("acme")),
            "main",
        );
        match mediator.mediate(&mut hit).await.unwrap() {
            Flow::Enter(SequenceTarget::Named(name)) => assert_eq!(name, "premium"),
            other => panic!("unexpected flow: {other:?}"),
        }

        let mut miss = MessageContext::new(
            Message::default().with_property("tenant", json!("acme-west")),
            "main",
        );
        assert!(matches!(
            mediator.mediate(&mut miss).await.unwrap(),
            Flow::Enter(SequenceTarget::Inline(_))
        ));
    }

    #[test]
    fn test_sequence_refs_include_inline_branches() {
        let registry = MediatorRegistry::builtin();
        let mediator = FilterMediatorFactory
            .create(&routed_filter(), &FactoryContext::new(&registry))
            .unwrap();

        assert_eq!(
            mediator.sequence_refs(),
            vec!["premium".to_string(), "standard".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_property_without_else_continues() {
        let registry = MediatorRegistry::builtin();
        let element = ConfigElement::new("filter")
            .with_attribute("source", "flag")
            .with_attribute("equals", "true")
            .with_child(ConfigElement::new("then").with_attribute("sequence", "flagged"));
        let mediator = FilterMediatorFactory
            .create(&element, &FactoryContext::new(&registry))
            .unwrap();

        let mut ctx = MessageContext::new(Message::default(), "main");
        assert!(matches!(mediator.mediate(&mut ctx).await.unwrap(), Flow::Continue));

        ctx.set_property("flag", json!(true));
        assert!(matches!(mediator.mediate(&mut ctx).await.unwrap(), Flow::Enter(_)));
    }

    #[test]
    fn test_condition_validation() {
        let registry = MediatorRegistry::builtin();
        let ctx = FactoryContext::new(&registry);

        let neither = ConfigElement::new("filter").with_attribute("source", "a");
        assert!(FilterMediatorFactory.create(&neither, &ctx).is_err());

        let both = ConfigElement::new("filter")
            .with_attribute("source", "a")
            .with_attribute("regex", ".*")
            .with_attribute("equals", "x");
        assert!(FilterMediatorFactory.create(&both, &ctx).is_err());

        let bad_regex = ConfigElement::new("filter")
            .with_attribute("source", "a")
            .with_attribute("regex", "(");
        assert!(FilterMediatorFactory.create(&bad_regex, &ctx).is_err());

        let bad_child = ConfigElement::new("filter")
            .with_attribute("source", "a")
            .with_attribute("equals", "x")
            .with_child(ConfigElement::new("log"));
        assert!(FilterMediatorFactory.create(&bad_child, &ctx).is_err());
    }

    #[test]
    fn test_inline_branch_with_unknown_kind_fails() {
        let registry = MediatorRegistry::builtin();
        let element = ConfigElement::new("filter")
            .with_attribute("source", "a")
            .with_attribute("equals", "x")
            .with_child(ConfigElement::new("then").with_child(ConfigElement::new("enrich")));

        let result = FilterMediatorFactory.create(&element, &FactoryContext::new(&registry));
        assert!(matches!(result, Err(MediationError::UnknownMediatorKind { .. })));
    }
}
