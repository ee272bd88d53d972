//! Factory contract and shared fragment-processing helpers

use crate::config::ConfigError;
use crate::element::{ConfigElement, QName};
use crate::engine::Sequence;
use crate::error::MediationError;
use crate::mediators::Mediator;
use crate::registry::MediatorRegistry;
use std::sync::Arc;
use tracing::warn;

/// Attribute every mediator fragment may carry
pub const TRACE_ATTRIBUTE: &str = "trace";

/// Builds mediators of one kind from configuration fragments
pub trait MediatorFactory: Send + Sync {
    /// Tag this factory answers to; the registry routes fragments on it
    fn tag(&self) -> QName;

    /// Validate the fragment and build an immutable mediator.
    ///
    /// The registry only dispatches fragments whose tag equals [`Self::tag`].
    fn create(
        &self,
        element: &ConfigElement,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Mediator>, MediationError>;
}

/// Load-time settings passed to every factory
#[derive(Clone, Copy)]
pub struct FactoryContext<'a> {
    pub registry: &'a MediatorRegistry,
    pub strict_validation: bool,
    pub trace_default: bool,
}

impl<'a> FactoryContext<'a> {
    pub fn new(registry: &'a MediatorRegistry) -> Self {
        Self {
            registry,
            strict_validation: false,
            trace_default: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    pub fn trace_default(mut self, trace: bool) -> Self {
        self.trace_default = trace;
        self
    }

    /// Check attributes against the recognized set (plus `trace`).
    ///
    /// Unknown attributes fail only in strict mode; otherwise they are logged
    /// and ignored.
    pub fn check_attributes(
        &self,
        element: &ConfigElement,
        recognized: &[&str],
    ) -> Result<(), MediationError> {
        for name in element.attributes.keys() {
            if name == TRACE_ATTRIBUTE || recognized.contains(&name.as_str()) {
                continue;
            }
            if self.strict_validation {
                return Err(ConfigError::UnexpectedAttribute {
                    tag: element.tag.clone(),
                    attribute: name.clone(),
                }
                .into());
            }
            warn!(
                tag = %element.tag,
                attribute = %name,
                "Ignoring unrecognized mediator attribute"
            );
        }
        Ok(())
    }

    /// Resolve the audit flag: explicit `trace` attribute, else the process default
    pub fn process_trace(&self, element: &ConfigElement) -> Result<bool, MediationError> {
        match element.attribute(TRACE_ATTRIBUTE) {
            None => Ok(self.trace_default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "enable" | "true" => Ok(true),
                "disable" | "false" => Ok(false),
                _ => Err(ConfigError::InvalidAttribute {
                    tag: element.tag.clone(),
                    attribute: TRACE_ATTRIBUTE.to_string(),
                    reason: format!("expected enable or disable, got '{value}'"),
                }
                .into()),
            },
        }
    }

    /// Build an anonymous sequence from mediator child fragments
    pub fn build_inline_sequence(
        &self,
        children: &[ConfigElement],
    ) -> Result<Arc<Sequence>, MediationError> {
        let mediators = children
            .iter()
            .map(|child| self.registry.build(child, self))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(Sequence::inline(mediators)))
    }
}

/// Fail if the fragment has any child elements
pub fn reject_children(element: &ConfigElement) -> Result<(), MediationError> {
    match element.children.first() {
        Some(child) => Err(ConfigError::UnexpectedChild {
            tag: element.tag.clone(),
            child: child.tag.clone(),
        }
        .into()),
        None => Ok(()),
    }
}

/// Fail unless every child is one of the allowed local names
pub fn restrict_children(element: &ConfigElement, allowed: &[&str]) -> Result<(), MediationError> {
    for child in &element.children {
        let known = child
            .qname()
            .map(|q| allowed.contains(&q.local_name.as_str()))
            .unwrap_or(false);
        if !known {
            return Err(ConfigError::UnexpectedChild {
                tag: element.tag.clone(),
                child: child.tag.clone(),
            }
            .into());
        }
    }
    Ok(())
}

pub fn required_attribute(element: &ConfigElement, name: &str) -> Result<String, MediationError> {
    element
        .attribute(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ConfigError::MissingAttribute {
                tag: element.tag.clone(),
                attribute: name.to_string(),
            }
            .into()
        })
}

pub fn invalid_attribute(element: &ConfigElement, name: &str, reason: String) -> MediationError {
    ConfigError::InvalidAttribute {
        tag: element.tag.clone(),
        attribute: name.to_string(),
        reason,
    }
    .into()
}
